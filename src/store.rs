use crate::errors::AppResult;
use crate::models::{Direction, Entry, Slot, Tag, Task};
use chrono::{DateTime, FixedOffset};

/// Distinct-date window over slots anchored at `dt_offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RayQuery {
    pub dt_offset: DateTime<FixedOffset>,
    pub direction: Direction,
    pub dates_dir: Direction,
    pub times_dir: Direction,
    pub slice_fst: usize,
    pub slice_lst: usize,
    pub with_tags: bool,
}

impl RayQuery {
    /// Dates are bucketed in the zone carried by `dt_offset`.
    pub fn zone(&self) -> FixedOffset {
        *self.dt_offset.offset()
    }

    pub fn date_limit(&self) -> usize {
        self.slice_lst.saturating_sub(self.slice_fst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySpec {
    Ray(RayQuery),
    /// Every slot with no end, joined to task and tags.
    ActiveSlots { zone: FixedOffset },
}

/// One denormalized (slot, task, tag?) tuple as the store returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub slot: Slot,
    pub task: Task,
    pub tag: Option<Tag>,
}

impl RawRow {
    pub fn into_entry(self) -> Entry {
        Entry::new(self.slot, self.task, self.tag.into_iter().collect())
    }
}

/// Backing record store. Sessions are opened on the thread that uses them.
pub trait SlotStore: Send + Sync + 'static {
    type Session: StoreSession;

    fn open_session(&self) -> AppResult<Self::Session>;
}

pub trait StoreSession {
    fn query(&mut self, spec: &QuerySpec) -> AppResult<Vec<RawRow>>;
    fn close(self) -> AppResult<()>;
}
