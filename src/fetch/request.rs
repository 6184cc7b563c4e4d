use crate::errors::{AppError, AppResult};
use crate::models::Direction;
use crate::store::{QuerySpec, RayQuery};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Ordering and pagination shared by both ray requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RayWindow {
    dt_offset: DateTime<FixedOffset>,
    direction: Direction,
    dates_dir: Direction,
    times_dir: Direction,
    slice_fst: usize,
    slice_lst: usize,
}

impl RayWindow {
    pub fn new(
        dt_offset: DateTime<FixedOffset>,
        direction: Direction,
        dates_dir: Direction,
        times_dir: Direction,
        slice_fst: usize,
        slice_lst: usize,
    ) -> AppResult<Self> {
        if slice_fst > slice_lst {
            return Err(AppError::InvalidRequest(format!(
                "slice_fst ({}) must not exceed slice_lst ({})",
                slice_fst, slice_lst
            )));
        }
        Ok(Self {
            dt_offset,
            direction,
            dates_dir,
            times_dir,
            slice_fst,
            slice_lst,
        })
    }

    pub fn dt_offset(&self) -> DateTime<FixedOffset> {
        self.dt_offset
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn dates_dir(&self) -> Direction {
        self.dates_dir
    }

    pub fn times_dir(&self) -> Direction {
        self.times_dir
    }

    pub fn slice_fst(&self) -> usize {
        self.slice_fst
    }

    pub fn slice_lst(&self) -> usize {
        self.slice_lst
    }

    fn query(&self, with_tags: bool) -> RayQuery {
        RayQuery {
            dt_offset: self.dt_offset,
            direction: self.direction,
            dates_dir: self.dates_dir,
            times_dir: self.times_dir,
            slice_fst: self.slice_fst,
            slice_lst: self.slice_lst,
            with_tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaySlotFetchRequest {
    window: RayWindow,
}

impl RaySlotFetchRequest {
    pub fn new(window: RayWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &RayWindow {
        &self.window
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaySlotWithTagFetchRequest {
    window: RayWindow,
    flat_tags: bool,
}

impl RaySlotWithTagFetchRequest {
    pub fn new(window: RayWindow, flat_tags: bool) -> Self {
        Self { window, flat_tags }
    }

    pub fn window(&self) -> &RayWindow {
        &self.window
    }

    /// Keep one row per (slot, tag) instead of condensing.
    pub fn flat_tags(&self) -> bool {
        self.flat_tags
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    RaySlot(RaySlotFetchRequest),
    RaySlotWithTag(RaySlotWithTagFetchRequest),
    /// The current timer, in the given display zone.
    ActiveSlot { zone: FixedOffset },
}

impl FetchRequest {
    pub fn ray_window(&self) -> Option<&RayWindow> {
        match self {
            Self::RaySlot(request) => Some(request.window()),
            Self::RaySlotWithTag(request) => Some(request.window()),
            Self::ActiveSlot { .. } => None,
        }
    }

    pub fn query_spec(&self) -> QuerySpec {
        match self {
            Self::RaySlot(request) => QuerySpec::Ray(request.window.query(false)),
            Self::RaySlotWithTag(request) => QuerySpec::Ray(request.window.query(true)),
            Self::ActiveSlot { zone } => QuerySpec::ActiveSlots { zone: *zone },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RaySlot(_) => "ray_slot",
            Self::RaySlotWithTag(_) => "ray_slot_with_tag",
            Self::ActiveSlot { .. } => "active_slot",
        }
    }
}

impl From<RaySlotFetchRequest> for FetchRequest {
    fn from(value: RaySlotFetchRequest) -> Self {
        Self::RaySlot(value)
    }
}

impl From<RaySlotWithTagFetchRequest> for FetchRequest {
    fn from(value: RaySlotWithTagFetchRequest) -> Self {
        Self::RaySlotWithTag(value)
    }
}

/// String-typed request as UI code sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RayWindowPayload {
    pub dt_offset: DateTime<FixedOffset>,
    pub direction: String,
    pub dates_dir: String,
    pub times_dir: String,
    pub slice_fst: usize,
    pub slice_lst: usize,
    #[serde(default)]
    pub with_tags: bool,
    #[serde(default)]
    pub flat_tags: bool,
}

impl TryFrom<RayWindowPayload> for FetchRequest {
    type Error = AppError;

    fn try_from(payload: RayWindowPayload) -> AppResult<Self> {
        let window = RayWindow::new(
            payload.dt_offset,
            Direction::parse(&payload.direction)?,
            Direction::parse(&payload.dates_dir)?,
            Direction::parse(&payload.times_dir)?,
            payload.slice_fst,
            payload.slice_lst,
        )?;
        if payload.with_tags {
            Ok(RaySlotWithTagFetchRequest::new(window, payload.flat_tags).into())
        } else {
            Ok(RaySlotFetchRequest::new(window).into())
        }
    }
}
