use crate::document::{Action, DocumentStatus};
use crate::service::ResultKind;
use std::convert::Infallible;

/// Failures of the underlying sled store or of record encoding.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Approval already registered for document {0}")]
    Duplicate(u64),
    #[error("Approval registry unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to encode registry record: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),
}

/// Outcome of a failed submit/approve on a single document.
#[derive(thiserror::Error, Debug)]
pub enum TransitionError {
    #[error("Document {0} not found")]
    NotFound(u64),
    #[error("Document {id} must be in {expected} status to {action}. Current: {current}")]
    Conflict {
        id: u64,
        action: Action,
        expected: DocumentStatus,
        current: DocumentStatus,
    },
    #[error("Failed to register approval: {0}")]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransitionError {
    /// The workflow result kind for this error; `None` for store failures,
    /// which are not workflow outcomes.
    pub fn kind(&self) -> Option<ResultKind> {
        match self {
            TransitionError::NotFound(_) => Some(ResultKind::NotFound),
            TransitionError::Conflict { .. } => Some(ResultKind::Conflict),
            TransitionError::Registry(_) => Some(ResultKind::RegistryError),
            TransitionError::Store(_) => None,
        }
    }
}

impl From<sled::Error> for TransitionError {
    fn from(value: sled::Error) -> Self {
        TransitionError::Store(value.into())
    }
}

/// Malformed calls, rejected before any per-document work.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Initiator cannot be empty")]
    BlankInitiator,
    #[error("Author cannot be empty")]
    BlankAuthor,
    #[error("Title cannot be empty")]
    BlankTitle,
    #[error("Ids cannot be empty")]
    EmptyIds,
    #[error("Maximum {max} ids allowed, got {count}")]
    TooManyIds { count: usize, max: usize },
    #[error("Maximum {max} harness workers allowed, got {count}")]
    TooManyWorkers { count: usize, max: usize },
    #[error("Maximum {max} harness attempts allowed in total")]
    TooManyAttempts { max: usize },
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("failed to read final document state: {0}")]
    FinalState(#[source] TransitionError),
    #[error("failed to spawn harness worker: {0}")]
    Spawn(#[from] std::io::Error),
}
