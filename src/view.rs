use crate::errors::AppResult;
use crate::fetch::{
    FetchRequest, FetchResponse, RaySlotFetchRequest, RaySlotWithTagFetchRequest, RayWindow,
};
use crate::index::SortedEntryIndex;
use crate::models::{Direction, Entry};
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePage {
    pub date: NaiveDate,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Accepted { dates: usize, new_entries: usize },
    /// Echoed parameters no longer match what the view wants.
    Discarded,
}

/// Caller-side state for a paginated ray view. Responses arrive in any order;
/// only those matching the current ray and ordering are kept.
#[derive(Debug, Clone)]
pub struct RayView {
    dt_offset: DateTime<FixedOffset>,
    direction: Direction,
    dates_dir: Direction,
    times_dir: Direction,
    display_zone: FixedOffset,
    with_tags: bool,
    store_dates: usize,
    responses: Vec<FetchResponse>,
    timeline: SortedEntryIndex<DateTime<FixedOffset>>,
}

impl RayView {
    pub fn new(
        dt_offset: DateTime<FixedOffset>,
        direction: Direction,
        dates_dir: Direction,
        times_dir: Direction,
        with_tags: bool,
    ) -> Self {
        Self {
            dt_offset,
            direction,
            dates_dir,
            times_dir,
            display_zone: *dt_offset.offset(),
            with_tags,
            store_dates: 0,
            responses: Vec::new(),
            timeline: SortedEntryIndex::by_start(),
        }
    }

    pub fn with_display_zone(mut self, zone: FixedOffset) -> Self {
        self.display_zone = zone;
        self
    }

    pub fn is_current(&self, response: &FetchResponse) -> bool {
        response.direction() == self.direction
            && response.dates_dir() == self.dates_dir
            && response.times_dir() == self.times_dir
            && response.dt_offset() == self.dt_offset
    }

    pub fn accept(&mut self, mut response: FetchResponse) -> Acceptance {
        if !self.is_current(&response) {
            tracing::debug!(
                slice_fst = response.slice_fst(),
                slice_lst = response.slice_lst(),
                "discarding stale response"
            );
            return Acceptance::Discarded;
        }

        // Counted before re-zoning: the store pages by dates in `dt_offset`'s zone.
        let dates = response.break_by_date().count();
        self.store_dates = self.store_dates.max(response.slice_fst().saturating_add(dates));
        response.in_timezone(&self.display_zone);
        let new_entries = self.timeline.merge(response.items().iter().cloned());
        self.responses.push(response);
        Acceptance::Accepted { dates, new_entries }
    }

    /// Re-anchors the view. Held pages are dropped and in-flight responses for
    /// the old anchor will be discarded on arrival.
    pub fn retarget(&mut self, dt_offset: DateTime<FixedOffset>, direction: Direction) {
        self.dt_offset = dt_offset;
        self.direction = direction;
        self.store_dates = 0;
        self.responses.clear();
        self.timeline.clear();
    }

    /// Flips ordering of held responses in place, without a new query.
    pub fn reorder(&mut self, dates_dir: Direction, times_dir: Direction) {
        for response in &mut self.responses {
            response.in_dates_dir(dates_dir);
            response.in_times_dir(times_dir);
        }
        self.dates_dir = dates_dir;
        self.times_dir = times_dir;
    }

    /// Store dates delivered so far, counted in `dt_offset`'s zone. Display
    /// dates may differ when the display zone does.
    pub fn loaded_dates(&self) -> usize {
        self.store_dates
    }

    /// Request for the next `page_len` dates after those already held.
    pub fn next_page(&self, page_len: usize) -> AppResult<FetchRequest> {
        let slice_fst = self.loaded_dates();
        let window = RayWindow::new(
            self.dt_offset,
            self.direction,
            self.dates_dir,
            self.times_dir,
            slice_fst,
            slice_fst.saturating_add(page_len),
        )?;
        if self.with_tags {
            Ok(RaySlotWithTagFetchRequest::new(window, false).into())
        } else {
            Ok(RaySlotFetchRequest::new(window).into())
        }
    }

    /// One page per display date, in `dates_dir` order. Entries of a date
    /// delivered by several responses are merged without duplicates.
    pub fn pages(&self) -> Vec<DatePage> {
        let mut pages = self
            .collect_dates()
            .into_iter()
            .map(|(date, entries)| DatePage { date, entries })
            .collect::<Vec<_>>();
        if self.dates_dir == Direction::FutureToPast {
            pages.reverse();
        }
        pages
    }

    /// Every held entry ordered by slot start.
    pub fn timeline(&self) -> &[Entry] {
        self.timeline.entries()
    }

    fn collect_dates(&self) -> BTreeMap<NaiveDate, Vec<Entry>> {
        let mut dates: BTreeMap<NaiveDate, Vec<Entry>> = BTreeMap::new();
        for response in &self.responses {
            for entry in response.items() {
                let bucket = dates.entry(entry.date()).or_default();
                if !bucket.contains(entry) {
                    bucket.push(entry.clone());
                }
            }
        }
        // Stable, so rows sharing a start keep their delivered order.
        for bucket in dates.values_mut() {
            match self.times_dir {
                Direction::PastToFuture => bucket.sort_by_key(|entry| entry.slot.fst),
                Direction::FutureToPast => bucket.sort_by_key(|entry| Reverse(entry.slot.fst)),
            }
        }
        dates
    }
}

#[cfg(test)]
mod tests {
    use super::{Acceptance, RayView};
    use crate::fetch::{FetchRequest, FetchResponse, RayWindow};
    use crate::models::{Direction, Entry, Slot, Task};
    use chrono::{Duration, FixedOffset, TimeZone};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn anchor() -> chrono::DateTime<FixedOffset> {
        utc().with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap()
    }

    fn entry(id: i64, day: u32, hour: u32) -> Entry {
        let fst = utc().with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap();
        let mut slot = Slot::new(fst, Some(fst + Duration::hours(1))).unwrap();
        slot.id = Some(id);
        Entry::new(slot, Task::new("plan"), vec![])
    }

    fn response(times_dir: Direction, slice: (usize, usize), items: Vec<Entry>) -> FetchResponse {
        let window = RayWindow::new(
            anchor(),
            Direction::FutureToPast,
            Direction::FutureToPast,
            times_dir,
            slice.0,
            slice.1,
        )
        .unwrap();
        FetchResponse::new(&window, false, items)
    }

    fn view() -> RayView {
        RayView::new(
            anchor(),
            Direction::FutureToPast,
            Direction::FutureToPast,
            Direction::PastToFuture,
            false,
        )
    }

    #[test]
    fn mismatched_response_is_discarded() {
        let mut view = view();
        let stale = response(Direction::FutureToPast, (0, 1), vec![entry(1, 9, 8)]);
        assert_eq!(view.accept(stale), Acceptance::Discarded);
        assert_eq!(view.loaded_dates(), 0);
    }

    #[test]
    fn accepted_pages_follow_dates_dir() {
        let mut view = view();
        let first = response(Direction::PastToFuture, (0, 1), vec![entry(1, 9, 8), entry(2, 9, 14)]);
        let second = response(Direction::PastToFuture, (1, 2), vec![entry(3, 8, 10)]);
        assert_eq!(
            view.accept(second),
            Acceptance::Accepted { dates: 1, new_entries: 1 }
        );
        assert_eq!(
            view.accept(first),
            Acceptance::Accepted { dates: 1, new_entries: 2 }
        );

        let dates = view.pages().iter().map(|page| page.date.to_string()).collect::<Vec<_>>();
        assert_eq!(dates, vec!["2024-06-09", "2024-06-08"]);
        assert_eq!(view.timeline().len(), 3);

        let FetchRequest::RaySlot(next) = view.next_page(2).expect("next page") else {
            panic!("expected plain ray request");
        };
        assert_eq!(next.window().slice_fst(), 2);
        assert_eq!(next.window().slice_lst(), 4);
    }

    #[test]
    fn reorder_flips_without_requery() {
        let mut view = view();
        view.accept(response(Direction::PastToFuture, (0, 1), vec![entry(1, 9, 8), entry(2, 9, 14)]));
        view.reorder(Direction::PastToFuture, Direction::FutureToPast);

        let page = &view.pages()[0];
        let ids = page.entries.iter().filter_map(|entry| entry.slot.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 1]);

        let late = response(Direction::PastToFuture, (1, 2), vec![entry(3, 8, 10)]);
        assert_eq!(view.accept(late), Acceptance::Discarded);
    }

    #[test]
    fn display_zone_does_not_shift_paging() {
        let east = FixedOffset::east_opt(3 * 3600).unwrap();
        let mut view = view().with_display_zone(east);
        // 23:00Z on the 8th is the 9th at UTC+3: two store dates, one display date.
        let first = response(Direction::PastToFuture, (0, 2), vec![entry(2, 9, 10), entry(1, 8, 23)]);
        assert_eq!(
            view.accept(first),
            Acceptance::Accepted { dates: 2, new_entries: 2 }
        );
        assert_eq!(view.loaded_dates(), 2);

        let FetchRequest::RaySlot(next) = view.next_page(1).expect("next page") else {
            panic!("expected plain ray request");
        };
        assert_eq!(next.window().slice_fst(), 2);

        let repeat = response(Direction::PastToFuture, (1, 2), vec![entry(1, 8, 23)]);
        assert_eq!(
            view.accept(repeat),
            Acceptance::Accepted { dates: 1, new_entries: 0 }
        );
        let pages = view.pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].date.to_string(), "2024-06-09");
        let ids = pages[0].entries.iter().filter_map(|entry| entry.slot.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(view.timeline().len(), 2);
        assert_eq!(view.loaded_dates(), 2);
    }

    #[test]
    fn retarget_drops_held_pages() {
        let mut view = view();
        view.accept(response(Direction::PastToFuture, (0, 1), vec![entry(1, 9, 8)]));
        view.retarget(anchor() - Duration::days(30), Direction::FutureToPast);
        assert_eq!(view.loaded_dates(), 0);
        let old = response(Direction::PastToFuture, (1, 2), vec![entry(3, 8, 10)]);
        assert_eq!(view.accept(old), Acceptance::Discarded);
    }
}
