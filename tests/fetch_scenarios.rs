use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use slot_window_lib::{
    AppError, Direction, Dispatcher, FetchRequest, FetchResponse, Fetched, RaySlotFetchRequest,
    RaySlotWithTagFetchRequest, RayWindow, Slot, SlotStore, SqliteStore, StoreSession, Tag, Worker,
    WorkerSignal,
};
use std::sync::Arc;

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).expect("utc")
}

fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
    utc().with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

fn store() -> (tempfile::TempDir, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::create(&dir.path().join("slots.db")).expect("create store");
    (dir, Arc::new(store))
}

fn seed(store: &SqliteStore, slots: &[(DateTime<FixedOffset>, Option<DateTime<FixedOffset>>, Vec<&str>)]) {
    let mut session = store.open_session().expect("session");
    let task = session.add_task("timesheet").expect("task");
    for (fst, lst, tags) in slots {
        let tags = tags.iter().map(|name| Tag::new(*name)).collect::<Vec<_>>();
        session
            .add_slot(&task, &Slot::new(*fst, *lst).expect("slot"), &tags)
            .expect("add slot");
    }
    session.close().expect("close");
}

fn ray(
    dt_offset: DateTime<FixedOffset>,
    direction: Direction,
    times_dir: Direction,
    slice: (usize, usize),
) -> RayWindow {
    RayWindow::new(dt_offset, direction, direction, times_dir, slice.0, slice.1).expect("window")
}

async fn run(dispatcher: &Dispatcher, store: Arc<SqliteStore>, request: FetchRequest) -> Vec<WorkerSignal> {
    let mut receiver = dispatcher.dispatch_channel(Worker::new(store, request));
    let mut signals = Vec::new();
    while let Some(signal) = receiver.recv().await {
        signals.push(signal);
    }
    signals
}

fn expect_ray(signals: &[WorkerSignal]) -> FetchResponse {
    let names = signals.iter().map(WorkerSignal::name).collect::<Vec<_>>();
    assert_eq!(names, vec!["started", "fetched", "stopped"]);
    match &signals[1] {
        WorkerSignal::Fetched { fetched: Fetched::Ray(response), .. } => response.clone(),
        other => panic!("expected ray response, got {:?}", other),
    }
}

#[tokio::test]
async fn whole_day_slot_is_found_only_on_the_ray_side() {
    let (_dir, store) = store();
    seed(&store, &[(at(10, 0), Some(at(11, 0)), vec![])]);
    let dispatcher = Dispatcher::new(2).expect("dispatcher");

    let after = RaySlotFetchRequest::new(ray(at(11, 0), Direction::FutureToPast, Direction::PastToFuture, (0, 5)));
    let response = expect_ray(&run(&dispatcher, store.clone(), after.into()).await);
    assert_eq!(response.len(), 1);
    assert_eq!(response.items()[0].slot.fst, at(10, 0));

    let before = RaySlotFetchRequest::new(ray(at(9, 0), Direction::FutureToPast, Direction::PastToFuture, (0, 5)));
    let response = expect_ray(&run(&dispatcher, store, before.into()).await);
    assert!(response.is_empty());
}

#[tokio::test]
async fn times_dir_flips_without_requery() {
    let (_dir, store) = store();
    seed(
        &store,
        &[(at(10, 19), Some(at(10, 20)), vec![]), (at(10, 5), Some(at(10, 6)), vec![])],
    );
    let dispatcher = Dispatcher::new(1).expect("dispatcher");

    let request = RaySlotFetchRequest::new(ray(at(1, 0), Direction::PastToFuture, Direction::PastToFuture, (0, 1)));
    let mut response = expect_ray(&run(&dispatcher, store, request.into()).await);
    let starts = |response: &FetchResponse| {
        response.items().iter().map(|entry| entry.slot.fst).collect::<Vec<_>>()
    };
    assert_eq!(starts(&response), vec![at(10, 5), at(10, 19)]);

    response.in_times_dir(Direction::FutureToPast);
    assert_eq!(starts(&response), vec![at(10, 19), at(10, 5)]);
}

#[tokio::test]
async fn pagination_slices_by_date_not_row() {
    let (_dir, store) = store();
    seed(
        &store,
        &[
            (at(10, 8), Some(at(10, 9)), vec![]),
            (at(10, 13), Some(at(10, 14)), vec![]),
            (at(12, 8), Some(at(12, 9)), vec![]),
            (at(12, 13), Some(at(12, 14)), vec![]),
        ],
    );
    let dispatcher = Dispatcher::new(2).expect("dispatcher");

    let first = RaySlotFetchRequest::new(ray(at(1, 0), Direction::PastToFuture, Direction::PastToFuture, (0, 1)));
    let response = expect_ray(&run(&dispatcher, store.clone(), first.into()).await);
    assert_eq!(response.len(), 2);
    assert!(response.items().iter().all(|entry| entry.slot.fst.date_naive() == at(10, 0).date_naive()));

    let second = RaySlotFetchRequest::new(ray(at(1, 0), Direction::PastToFuture, Direction::PastToFuture, (1, 2)));
    let response = expect_ray(&run(&dispatcher, store.clone(), second.into()).await);
    assert_eq!(response.len(), 2);
    assert!(response.items().iter().all(|entry| entry.slot.fst.date_naive() == at(12, 0).date_naive()));

    let newest_first = RaySlotFetchRequest::new(ray(at(31, 0), Direction::FutureToPast, Direction::PastToFuture, (0, 1)));
    let response = expect_ray(&run(&dispatcher, store, newest_first.into()).await);
    assert_eq!(response.len(), 2);
    assert_eq!(response.items()[0].slot.fst, at(12, 8));
}

#[tokio::test]
async fn tagged_fetch_condenses_one_entry_per_slot() {
    let (_dir, store) = store();
    seed(
        &store,
        &[
            (at(10, 8), Some(at(10, 9)), vec!["billable", "client-a"]),
            (at(10, 10), Some(at(10, 11)), vec![]),
        ],
    );
    let dispatcher = Dispatcher::new(2).expect("dispatcher");
    let window = ray(at(1, 0), Direction::PastToFuture, Direction::PastToFuture, (0, 3));

    let condensed = RaySlotWithTagFetchRequest::new(window.clone(), false);
    let response = expect_ray(&run(&dispatcher, store.clone(), condensed.into()).await);
    assert_eq!(response.len(), 2);
    assert_eq!(response.items()[0].tags, vec![Tag::new("billable"), Tag::new("client-a")]);
    assert!(response.items()[1].tags.is_empty());

    let flat = RaySlotWithTagFetchRequest::new(window, true);
    let response = expect_ray(&run(&dispatcher, store, flat.into()).await);
    assert_eq!(response.len(), 3);
    assert!(response.flat_tags());
}

#[tokio::test]
async fn two_running_slots_are_an_invariant_violation() {
    let (dir, store) = store();
    {
        let mut session = store.open_session().expect("session");
        let task = session.add_task("on-call").expect("task");
        session.start_timer(&task, at(10, 8), &[]).expect("timer");
        session.close().expect("close");
    }
    // Bypass the adapter's guard to simulate a corrupted store.
    let conn = rusqlite::Connection::open(dir.path().join("slots.db")).expect("raw connection");
    conn.execute(
        "INSERT INTO slots (task_id, fst, lst) VALUES (1, '2024-05-10T09:00:00Z', NULL)",
        [],
    )
    .expect("raw insert");
    drop(conn);

    let dispatcher = Dispatcher::new(1).expect("dispatcher");
    let signals = run(&dispatcher, store, FetchRequest::ActiveSlot { zone: utc() }).await;
    let names = signals.iter().map(WorkerSignal::name).collect::<Vec<_>>();
    assert_eq!(names, vec!["started", "alerted", "stopped"]);
    let WorkerSignal::Alerted { failure, .. } = &signals[1] else {
        panic!("expected alert");
    };
    assert!(failure.is_fatal());
    assert!(matches!(failure.error, AppError::InvariantViolation(_)));
}

#[tokio::test]
async fn current_timer_is_fetched_when_unique() {
    let (_dir, store) = store();
    {
        let mut session = store.open_session().expect("session");
        let task = session.add_task("focus").expect("task");
        session
            .start_timer(&task, at(10, 8) + Duration::minutes(15), &[Tag::new("deep")])
            .expect("timer");
        session.close().expect("close");
    }
    let dispatcher = Dispatcher::new(1).expect("dispatcher");
    let signals = run(&dispatcher, store, FetchRequest::ActiveSlot { zone: utc() }).await;
    let WorkerSignal::Fetched { fetched: Fetched::ActiveSlot(Some(entry)), .. } = &signals[1] else {
        panic!("expected running entry");
    };
    assert!(entry.slot.is_active());
    assert_eq!(entry.task.name, "focus");
    assert_eq!(entry.tags, vec![Tag::new("deep")]);
}
