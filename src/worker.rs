//! Background drain worker
//!
//! Periodically pushes pending documents through the workflow: DRAFT ids go
//! through batch submit, SUBMITTED ids through batch approve. It only calls
//! the public service operations and competes with other callers for the
//! same documents like any of them.
use super::batch::{BatchOutcome, BatchRequest};
use super::config::WorkerConfig;
use super::document::Action;
use super::error::BatchError;
use super::service::{DocumentService, ResultKind};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const SUBMIT_INITIATOR: &str = "submit-worker";
pub const APPROVE_INITIATOR: &str = "approve-worker";

#[derive(Clone)]
pub struct DrainWorker {
    service: Arc<DocumentService>,
    config: WorkerConfig,
}

/// Running worker loops. Dropping the handle without calling
/// [`WorkerHandle::shutdown`] also stops them, without waiting.
pub struct WorkerHandle {
    stop: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl DrainWorker {
    pub fn new(service: Arc<DocumentService>, config: WorkerConfig) -> Self {
        Self { service, config }
    }

    /// Runs one batch of `action` over up to `batch_size` eligible documents.
    /// `None` when nothing was pending.
    pub fn drain_once(&self, action: Action) -> Result<Option<BatchOutcome>, BatchError> {
        let ids = self
            .service
            .find_batch_with_status(action.requires(), self.config.batch_size)?;
        if ids.is_empty() {
            return Ok(None);
        }

        let size = ids.len();
        let start = Instant::now();
        let outcome = match action {
            Action::Submit => self.service.submit(&BatchRequest::new(SUBMIT_INITIATOR, ids))?,
            Action::Approve => self.service.approve(&BatchRequest::new(APPROVE_INITIATOR, ids))?,
        };

        let success = outcome.count(ResultKind::Success);
        info!(
            "{action}-worker: batch of {size} documents processed in {} ms, success={success}, failed={}",
            start.elapsed().as_millis(),
            size - success
        );
        if success < size {
            let failed: Vec<_> = outcome.failures().collect();
            warn!("{action}-worker: failed items: {failed:?}");
        }

        Ok(Some(outcome))
    }

    /// Starts one loop per action on its own thread. Returns an idle handle
    /// when the worker is disabled.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let mut threads = Vec::new();

        if self.config.enabled {
            for (action, interval) in [
                (Action::Submit, self.config.submit_interval()),
                (Action::Approve, self.config.approve_interval()),
            ] {
                let worker = self.clone();
                let stopped = stopped.clone();
                let handle = thread::Builder::new()
                    .name(format!("{action}-worker"))
                    .spawn(move || worker.run_loop(action, interval, &stopped))?;
                threads.push(handle);
            }
        }

        Ok(WorkerHandle {
            stop: Some(stop),
            threads,
        })
    }

    fn run_loop(&self, action: Action, interval: Duration, stopped: &Receiver<()>) {
        if !wait(stopped, self.config.initial_delay()) {
            return;
        }
        loop {
            if let Err(e) = self.drain_once(action) {
                error!("{action}-worker: batch failed: {e}");
            }
            if !wait(stopped, interval) {
                return;
            }
        }
    }
}

// false once the stop signal arrives
fn wait(stopped: &Receiver<()>, period: Duration) -> bool {
    matches!(stopped.recv_timeout(period), Err(RecvTimeoutError::Timeout))
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        self.threads.iter().any(|t| !t.is_finished())
    }

    /// Signals both loops and waits for the batch in flight to finish.
    pub fn shutdown(mut self) {
        self.stop.take();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("drain worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop.take();
    }
}
