use crate::errors::{AppError, AppResult};
use crate::fetch::{condense_entries, FetchRequest, FetchResponse};
use crate::models::Entry;
use crate::store::{RawRow, SlotStore, StoreSession};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Created,
    Started,
    Fetched,
    Alerted,
    Stopped,
}

impl WorkerState {
    pub fn can_advance_to(self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Started)
                | (Self::Started, Self::Fetched)
                | (Self::Started, Self::Alerted)
                | (Self::Fetched, Self::Stopped)
                | (Self::Alerted, Self::Stopped)
        )
    }
}

/// Successful outcome, shaped by the request variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Ray(FetchResponse),
    ActiveSlot(Option<Entry>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub worker_id: Uuid,
    pub request_kind: &'static str,
    pub error: AppError,
}

impl Failure {
    pub fn is_fatal(&self) -> bool {
        self.error.is_fatal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerSignal {
    Started { worker_id: Uuid },
    Fetched { worker_id: Uuid, fetched: Fetched },
    Alerted { worker_id: Uuid, failure: Failure },
    Stopped { worker_id: Uuid },
}

impl WorkerSignal {
    pub fn worker_id(&self) -> Uuid {
        match self {
            Self::Started { worker_id }
            | Self::Fetched { worker_id, .. }
            | Self::Alerted { worker_id, .. }
            | Self::Stopped { worker_id } => *worker_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Fetched { .. } => "fetched",
            Self::Alerted { .. } => "alerted",
            Self::Stopped { .. } => "stopped",
        }
    }
}

/// One request bound to one store. Runs once, on the thread that calls `run`.
pub struct Worker<S: SlotStore> {
    id: Uuid,
    request: FetchRequest,
    store: Arc<S>,
    state: WorkerState,
}

impl<S: SlotStore> Worker<S> {
    pub fn new(store: Arc<S>, request: FetchRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            store,
            state: WorkerState::Created,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Emits `Started`, then exactly one of `Fetched`/`Alerted`, then
    /// `Stopped`. Invariant violations are still alerted but also returned as
    /// `Err` so the caller's execution unit fails hard.
    pub fn run<F>(&mut self, mut emit: F) -> AppResult<()>
    where
        F: FnMut(WorkerSignal),
    {
        if self.state != WorkerState::Created {
            return Err(AppError::Internal(format!(
                "worker {} already ran (state {:?})",
                self.id, self.state
            )));
        }

        let worker_id = self.id;
        self.advance(WorkerState::Started);
        emit(WorkerSignal::Started { worker_id });
        tracing::debug!(worker_id = %worker_id, kind = self.request.kind(), "worker started");

        let result = match self.fetch() {
            Ok(fetched) => {
                self.advance(WorkerState::Fetched);
                emit(WorkerSignal::Fetched { worker_id, fetched });
                Ok(())
            }
            Err(error) => {
                self.advance(WorkerState::Alerted);
                if error.is_fatal() {
                    tracing::error!(worker_id = %worker_id, error = %error, "worker hit an invariant violation");
                } else {
                    tracing::warn!(worker_id = %worker_id, error = %error, "worker fetch failed");
                }
                emit(WorkerSignal::Alerted {
                    worker_id,
                    failure: Failure {
                        worker_id,
                        request_kind: self.request.kind(),
                        error: error.clone(),
                    },
                });
                if error.is_fatal() {
                    Err(error)
                } else {
                    Ok(())
                }
            }
        };

        self.advance(WorkerState::Stopped);
        emit(WorkerSignal::Stopped { worker_id });
        result
    }

    fn advance(&mut self, next: WorkerState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal worker transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// The session never outlives this call.
    fn fetch(&self) -> AppResult<Fetched> {
        let mut session = self.store.open_session()?;
        let queried = session.query(&self.request.query_spec());
        if let Err(error) = session.close() {
            tracing::warn!(worker_id = %self.id, error = %error, "failed to close store session");
        }
        reshape(&self.request, queried?)
    }
}

fn reshape(request: &FetchRequest, rows: Vec<RawRow>) -> AppResult<Fetched> {
    match request {
        FetchRequest::RaySlot(request) => Ok(Fetched::Ray(FetchResponse::from_rows(
            request.window(),
            false,
            rows,
        ))),
        FetchRequest::RaySlotWithTag(request) => {
            let mut response = FetchResponse::from_rows(request.window(), request.flat_tags(), rows);
            response.condense_tags()?;
            Ok(Fetched::Ray(response))
        }
        FetchRequest::ActiveSlot { .. } => {
            let entries = condense_entries(rows.into_iter().map(RawRow::into_entry).collect())?;
            if entries.len() > 1 {
                return Err(AppError::InvariantViolation(format!(
                    "{} slots are running at once",
                    entries.len()
                )));
            }
            Ok(Fetched::ActiveSlot(entries.into_iter().next()))
        }
    }
}
