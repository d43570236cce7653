//! Document approval workflow: DRAFT -> SUBMITTED -> APPROVED with an audit
//! history and an approval registry, exactly one successful transition per
//! document under concurrent callers.

pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod harness;
pub mod history;
pub mod lock;
pub mod registry;
pub mod service;
pub mod store;
pub mod utils;
pub mod worker;

pub use batch::{BatchOutcome, BatchRequest, ItemResult, MAX_BATCH_SIZE};
pub use document::{Action, Document, DocumentStatus};
pub use error::{BatchError, RegistryError, StoreError, TransitionError, ValidationError};
pub use harness::{ConcurrencyReport, HarnessRequest};
pub use service::{DocumentService, ResultKind};
