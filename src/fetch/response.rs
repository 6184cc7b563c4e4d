use crate::errors::{AppError, AppResult};
use crate::fetch::request::RayWindow;
use crate::models::{Direction, Entry};
use crate::store::RawRow;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::HashSet;
use std::ops::Range;

/// Entries of one ray fetch plus the parameters that actually produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    items: Vec<Entry>,
    dates_dir: Direction,
    times_dir: Direction,
    slice_fst: usize,
    slice_lst: usize,
    dt_offset: DateTime<FixedOffset>,
    direction: Direction,
    flat_tags: bool,
}

impl FetchResponse {
    pub fn new(window: &RayWindow, flat_tags: bool, items: Vec<Entry>) -> Self {
        Self {
            items,
            dates_dir: window.dates_dir(),
            times_dir: window.times_dir(),
            slice_fst: window.slice_fst(),
            slice_lst: window.slice_lst(),
            dt_offset: window.dt_offset(),
            direction: window.direction(),
            flat_tags,
        }
    }

    pub fn from_rows(window: &RayWindow, flat_tags: bool, rows: Vec<RawRow>) -> Self {
        let items = rows.into_iter().map(RawRow::into_entry).collect();
        Self::new(window, flat_tags, items)
    }

    pub fn items(&self) -> &[Entry] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Entry> {
        self.items
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

    pub fn dt_offset(&self) -> DateTime<FixedOffset> {
        self.dt_offset
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn flat_tags(&self) -> bool {
        self.flat_tags
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Re-zones every slot and `dt_offset`. Apply once per response; this
    /// does not detect a repeated call.
    pub fn in_timezone(&mut self, tz: &FixedOffset) {
        for entry in &mut self.items {
            entry.slot = entry.slot.with_timezone(tz);
        }
        self.dt_offset = self.dt_offset.with_timezone(tz);
    }

    /// Contiguous `[i, j)` ranges whose entries share a calendar date.
    pub fn break_by_date(&self) -> DateBreaks<'_> {
        DateBreaks {
            items: &self.items,
            cursor: 0,
        }
    }

    pub fn in_times_dir(&mut self, target: Direction) {
        if self.times_dir != target {
            self.reverse_times_dir();
        }
    }

    /// Flips order inside each date, keeping dates where they are.
    pub fn reverse_times_dir(&mut self) {
        let ranges = self.break_by_date().collect::<Vec<_>>();
        for range in ranges {
            self.items[range].reverse();
        }
        self.times_dir = self.times_dir.reversed();
    }

    pub fn in_dates_dir(&mut self, target: Direction) {
        if self.dates_dir != target {
            self.reverse_dates_dir(false);
        }
    }

    /// Flips the order of dates. Intra-date order is kept unless
    /// `reverse_times_dir_too` is set.
    pub fn reverse_dates_dir(&mut self, reverse_times_dir_too: bool) {
        self.items.reverse();
        self.dates_dir = self.dates_dir.reversed();
        if reverse_times_dir_too {
            self.times_dir = self.times_dir.reversed();
        } else {
            let times_dir = self.times_dir;
            self.reverse_times_dir();
            self.times_dir = times_dir;
        }
    }

    /// Merges consecutive (slot, tag) rows into one entry per slot. No-op for
    /// flat responses.
    pub fn condense_tags(&mut self) -> AppResult<()> {
        if self.flat_tags {
            return Ok(());
        }
        let items = std::mem::take(&mut self.items);
        self.items = condense_entries(items)?;
        Ok(())
    }
}

/// Lazy two-pointer sweep over a response. Clone it to restart.
#[derive(Debug, Clone)]
pub struct DateBreaks<'a> {
    items: &'a [Entry],
    cursor: usize,
}

impl Iterator for DateBreaks<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.cursor;
        let first = self.items.get(start)?;
        let date = first.date();
        let mut end = start + 1;
        while end < self.items.len() && self.items[end].date() == date {
            end += 1;
        }
        self.cursor = end;
        Some(start..end)
    }
}

/// Collapses runs of rows that share a slot. Rows of one slot must be
/// adjacent, agree on the task, and each carry at most one tag; tag names must
/// be unique within the run.
pub fn condense_entries(rows: Vec<Entry>) -> AppResult<Vec<Entry>> {
    let mut condensed: Vec<Entry> = Vec::with_capacity(rows.len());
    let mut seen_slots = HashSet::new();

    let mut rows = rows.into_iter().peekable();
    while let Some(head) = rows.next() {
        if head.tags.len() > 1 {
            return Err(tag_violation(&head, "row carries more than one tag"));
        }
        if let Some(id) = head.slot.id {
            if !seen_slots.insert(id) {
                return Err(tag_violation(&head, "rows of one slot are not contiguous"));
            }
        }

        let mut entry = head;
        while let Some(next) = rows.next_if(|row| row.slot == entry.slot) {
            if next.task != entry.task {
                return Err(tag_violation(&next, "rows of one slot disagree on task"));
            }
            if next.tags.len() > 1 {
                return Err(tag_violation(&next, "row carries more than one tag"));
            }
            entry.tags.extend(next.tags);
        }

        let mut names = entry.tags.iter().map(|tag| tag.name.as_str()).collect::<Vec<_>>();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(tag_violation(&entry, &format!("duplicate tag `{}`", pair[0])));
        }
        condensed.push(entry);
    }

    Ok(condensed)
}

fn tag_violation(entry: &Entry, reason: &str) -> AppError {
    AppError::InvariantViolation(format!(
        "tag condensation failed for slot {:?} at {}: {}",
        entry.slot.id,
        entry.slot.fst.to_rfc3339(),
        reason
    ))
}
