pub mod config;
pub mod db;
pub mod dispatcher;
pub mod errors;
pub mod fetch;
pub mod index;
pub mod models;
pub mod store;
pub mod view;
pub mod worker;

pub use crate::config::EngineConfig;
pub use crate::db::{SqliteSession, SqliteStore};
pub use crate::dispatcher::{Dispatcher, FetchContinuation};
pub use crate::errors::{AppError, AppResult};
pub use crate::fetch::{
    FetchRequest, FetchResponse, RaySlotFetchRequest, RaySlotWithTagFetchRequest, RayWindow,
    RayWindowPayload,
};
pub use crate::index::SortedEntryIndex;
pub use crate::models::{Direction, Entry, Slot, Tag, Task};
pub use crate::store::{QuerySpec, RawRow, SlotStore, StoreSession};
pub use crate::view::{Acceptance, DatePage, RayView};
pub use crate::worker::{Failure, Fetched, Worker, WorkerSignal, WorkerState};

use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the global subscriber: JSON lines to a daily file under
/// `log_dir`, or to stderr when none is configured. `RUST_LOG` wins over
/// `log_filter`.
pub fn init_tracing(config: &EngineConfig) -> AppResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));

    let Some(log_dir) = config.log_dir.as_ref() else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| AppError::Internal(error.to_string()));
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "slot-window.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
