use crate::errors::{AppError, AppResult};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    PastToFuture,
    FutureToPast,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PastToFuture => "past_to_future",
            Self::FutureToPast => "future_to_past",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim() {
            "past_to_future" => Ok(Self::PastToFuture),
            "future_to_past" => Ok(Self::FutureToPast),
            other => Err(AppError::InvalidRequest(format!("unknown direction `{}`", other))),
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::PastToFuture => Self::FutureToPast,
            Self::FutureToPast => Self::PastToFuture,
        }
    }

    pub fn sql_order(self) -> &'static str {
        match self {
            Self::PastToFuture => "ASC",
            Self::FutureToPast => "DESC",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<i64>,
    pub name: String,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Tag {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<i64>,
    pub name: String,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Task {}

/// One tracked interval. `lst == None` marks the running slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Option<i64>,
    pub fst: DateTime<FixedOffset>,
    pub lst: Option<DateTime<FixedOffset>>,
}

impl Slot {
    pub fn new(fst: DateTime<FixedOffset>, lst: Option<DateTime<FixedOffset>>) -> AppResult<Self> {
        if let Some(lst) = lst {
            if fst >= lst {
                return Err(AppError::InvariantViolation(format!(
                    "slot must start before it ends ({} >= {})",
                    fst.to_rfc3339(),
                    lst.to_rfc3339()
                )));
            }
        }
        Ok(Self { id: None, fst, lst })
    }

    pub fn is_active(&self) -> bool {
        self.lst.is_none()
    }

    /// Calendar date of `fst` in the zone the slot currently holds.
    pub fn date(&self) -> NaiveDate {
        self.fst.date_naive()
    }

    pub fn with_timezone(&self, tz: &FixedOffset) -> Self {
        Self {
            id: self.id,
            fst: self.fst.with_timezone(tz),
            lst: self.lst.map(|lst| lst.with_timezone(tz)),
        }
    }
}

/// Client-facing aggregate. Carries no reference back to the store session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub slot: Slot,
    pub task: Task,
    pub tags: Vec<Tag>,
}

impl Entry {
    pub fn new(slot: Slot, task: Task, tags: Vec<Tag>) -> Self {
        Self { slot, task, tags }
    }

    pub fn date(&self) -> NaiveDate {
        self.slot.date()
    }
}
