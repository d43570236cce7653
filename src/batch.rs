//! Batch submit/approve with per-document isolation
//!
//! Ids are processed one after another, each in its own transaction. A
//! failure on one id is recorded in its result entry and never touches the
//! others; there is no batch-wide rollback.
use super::document::Action;
use super::error::{BatchError, TransitionError, ValidationError};
use super::service::{DocumentService, ResultKind};
use serde::Serialize;
use tracing::{info, warn};

pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub initiator: String,
    pub ids: Vec<u64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub id: u64,
    pub result: ResultKind,
    pub message: String,
}

/// Results in the same order as the request ids.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<ItemResult>,
}

impl BatchRequest {
    pub fn new(initiator: &str, ids: Vec<u64>) -> Self {
        Self {
            initiator: initiator.to_string(),
            ids,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.initiator.trim().is_empty() {
            return Err(ValidationError::BlankInitiator);
        }
        if self.ids.is_empty() {
            return Err(ValidationError::EmptyIds);
        }
        if self.ids.len() > MAX_BATCH_SIZE {
            return Err(ValidationError::TooManyIds {
                count: self.ids.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        Ok(())
    }
}

impl BatchOutcome {
    pub fn count(&self, kind: ResultKind) -> usize {
        self.results.iter().filter(|r| r.result == kind).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.results
            .iter()
            .filter(|r| r.result != ResultKind::Success)
    }
}

impl DocumentService {
    /// Submit every id in the request
    pub fn submit(&self, request: &BatchRequest) -> Result<BatchOutcome, BatchError> {
        self.run_batch(Action::Submit, request)
    }

    /// Approve every id in the request
    pub fn approve(&self, request: &BatchRequest) -> Result<BatchOutcome, BatchError> {
        self.run_batch(Action::Approve, request)
    }

    fn run_batch(&self, action: Action, request: &BatchRequest) -> Result<BatchOutcome, BatchError> {
        request.validate()?;
        let comment = request.comment.as_deref().unwrap_or("");

        let mut results = Vec::with_capacity(request.ids.len());
        for &id in &request.ids {
            let outcome = match action {
                Action::Submit => self.submit_one(id, &request.initiator, comment),
                Action::Approve => self.approve_one(id, &request.initiator, comment),
            };
            results.push(item_result(id, action, outcome)?);
        }

        let outcome = BatchOutcome { results };
        let succeeded = outcome.count(ResultKind::Success);
        info!(
            %action,
            total = request.ids.len(),
            succeeded,
            failed = request.ids.len() - succeeded,
            "batch processed"
        );
        Ok(outcome)
    }
}

fn item_result<T>(
    id: u64,
    action: Action,
    outcome: Result<T, TransitionError>,
) -> Result<ItemResult, BatchError> {
    let (result, message) = match outcome {
        Ok(_) => (
            ResultKind::Success,
            match action {
                Action::Submit => "Submitted".to_string(),
                Action::Approve => "Approved".to_string(),
            },
        ),
        Err(TransitionError::Store(e)) => {
            warn!(id, %action, error = %e, "store failure, aborting batch");
            return Err(e.into());
        }
        Err(TransitionError::NotFound(_)) => {
            (ResultKind::NotFound, "Document not found".to_string())
        }
        Err(e @ TransitionError::Conflict { .. }) => (ResultKind::Conflict, e.to_string()),
        Err(e @ TransitionError::Registry(_)) => (ResultKind::RegistryError, e.to_string()),
    };

    Ok(ItemResult {
        id,
        result,
        message,
    })
}
