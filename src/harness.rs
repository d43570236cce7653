//! Concurrency harness for the approve path
//!
//! Fires `workers x attempts` approvals at one document from `workers`
//! threads and tallies the outcomes. Workers report each outcome over a
//! channel to a single collector; nothing is counted through shared state.
//! With correct locking a SUBMITTED document yields exactly one success and
//! conflicts for every other attempt.
use super::document::DocumentStatus;
use super::error::{HarnessError, TransitionError, ValidationError};
use super::service::{DocumentService, ResultKind};
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

pub const HARNESS_COMMENT: &str = "concurrent test";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_HARNESS_WORKERS: usize = 256;
pub const MAX_HARNESS_ATTEMPTS: usize = 100_000;

#[derive(Debug, Clone)]
pub struct HarnessRequest {
    pub document_id: u64,
    pub workers: usize,
    pub attempts_per_worker: usize,
    pub initiator: String,
    /// Longest wait for any single outstanding call
    pub call_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConcurrencyReport {
    pub document_id: u64,
    pub total_attempts: usize,
    pub success: usize,
    pub conflict: usize,
    pub not_found: usize,
    /// Registry failures, store failures, lost workers and timeouts
    pub error: usize,
    /// `None` when the document does not exist
    pub final_status: Option<DocumentStatus>,
    pub message: String,
}

#[derive(Default)]
struct Tally {
    success: usize,
    conflict: usize,
    not_found: usize,
    error: usize,
}

impl HarnessRequest {
    pub fn new(document_id: u64, workers: usize, attempts_per_worker: usize, initiator: &str) -> Self {
        Self {
            document_id,
            workers,
            attempts_per_worker,
            initiator: initiator.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Checks the request and returns the total number of calls it makes.
    fn validate(&self) -> Result<usize, ValidationError> {
        if self.initiator.trim().is_empty() {
            return Err(ValidationError::BlankInitiator);
        }
        if self.workers == 0 {
            return Err(ValidationError::NotPositive("workers"));
        }
        if self.attempts_per_worker == 0 {
            return Err(ValidationError::NotPositive("attempts"));
        }
        if self.workers > MAX_HARNESS_WORKERS {
            return Err(ValidationError::TooManyWorkers {
                count: self.workers,
                max: MAX_HARNESS_WORKERS,
            });
        }
        self.workers
            .checked_mul(self.attempts_per_worker)
            .filter(|total| *total <= MAX_HARNESS_ATTEMPTS)
            .ok_or(ValidationError::TooManyAttempts {
                max: MAX_HARNESS_ATTEMPTS,
            })
    }
}

impl Tally {
    fn record(&mut self, kind: Option<ResultKind>) {
        match kind {
            Some(ResultKind::Success) => self.success += 1,
            Some(ResultKind::Conflict) => self.conflict += 1,
            Some(ResultKind::NotFound) => self.not_found += 1,
            Some(ResultKind::RegistryError) | None => self.error += 1,
        }
    }
}

impl ConcurrencyReport {
    /// One success, conflicts for the rest, document ends APPROVED
    pub fn is_exactly_once(&self) -> bool {
        self.success == 1
            && self.conflict == self.total_attempts - 1
            && self.final_status == Some(DocumentStatus::Approved)
    }
}

pub fn run_concurrency_test(
    service: &Arc<DocumentService>,
    request: &HarnessRequest,
) -> Result<ConcurrencyReport, HarnessError> {
    let total = request.validate()?;

    let (outcomes, collector) = crossbeam_channel::unbounded::<Option<ResultKind>>();
    // Workers wait for one release message each, sent once every thread is
    // spawned. A closed gate means the harness gave up; nothing runs then.
    let (gate, gate_rx) = crossbeam_channel::unbounded::<()>();

    for worker in 0..request.workers {
        let service = Arc::clone(service);
        let outcomes = outcomes.clone();
        let gate_rx = gate_rx.clone();
        let id = request.document_id;
        let attempts = request.attempts_per_worker;
        let initiator = request.initiator.clone();

        thread::Builder::new()
            .name(format!("approve-harness-{worker}"))
            .spawn(move || {
                if gate_rx.recv().is_err() {
                    return;
                }
                for _ in 0..attempts {
                    let kind = match service.approve_one(id, &initiator, HARNESS_COMMENT) {
                        Ok(_) => Some(ResultKind::Success),
                        Err(e) => e.kind(),
                    };
                    if outcomes.send(kind).is_err() {
                        break;
                    }
                }
            })?;
    }
    drop(outcomes);
    for _ in 0..request.workers {
        // receivers outlive this loop, the send cannot fail
        let _ = gate.send(());
    }
    drop(gate);

    let mut tally = Tally::default();
    for received in 0..total {
        match collector.recv_timeout(request.call_timeout) {
            Ok(kind) => tally.record(kind),
            Err(RecvTimeoutError::Timeout) => {
                warn!(id = request.document_id, "harness call timed out");
                tally.error += 1;
            }
            Err(RecvTimeoutError::Disconnected) => {
                // every worker is gone; whatever is missing never ran
                let missing = total - received;
                warn!(id = request.document_id, missing, "harness workers exited early");
                tally.error += missing;
                break;
            }
        }
    }

    let final_status = match service.get_document(request.document_id) {
        Ok(document) => Some(document.status),
        Err(TransitionError::NotFound(_)) => None,
        Err(e) => return Err(HarnessError::FinalState(e)),
    };

    let message = format!(
        "Expected: exactly 1 success, rest conflicts. Success={}, Conflict={}, Error={}",
        tally.success, tally.conflict, tally.error
    );
    info!(id = request.document_id, total, "{message}");

    Ok(ConcurrencyReport {
        document_id: request.document_id,
        total_attempts: total,
        success: tally.success,
        conflict: tally.conflict,
        not_found: tally.not_found,
        error: tally.error,
        final_status,
        message,
    })
}

impl DocumentService {
    /// See [`run_concurrency_test`]
    pub fn run_concurrency_test(
        self: &Arc<Self>,
        request: &HarnessRequest,
    ) -> Result<ConcurrencyReport, HarnessError> {
        run_concurrency_test(self, request)
    }
}
