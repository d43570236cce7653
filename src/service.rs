//! Service layer API for document workflow operations
//!
//! [`DocumentService`] is the only code that mutates document status. Each
//! transition takes the document's exclusive lock, re-reads the document
//! inside a store transaction, checks the required status and then writes
//! the new status, one history entry and (for approvals) the registry
//! record. Any abort rolls all of it back.
use super::document::{Action, Document, DocumentStatus};
use super::error::{StoreError, TransitionError, ValidationError};
use super::history::HistoryEntry;
use super::registry::{RegistryRecord, RegistryWriter, SledRegistry};
use super::store::DocumentStore;
use super::utils;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sled::transaction::abort;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Per-document outcome kind, surfaced verbatim to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    Success,
    Conflict,
    NotFound,
    RegistryError,
}

pub struct DocumentService {
    store: DocumentStore,
    registry: Box<dyn RegistryWriter>,
}

#[derive(Debug, Serialize)]
pub struct DocumentWithHistory {
    pub document: Document,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Default, Clone)]
pub struct SearchCriteria {
    pub status: Option<DocumentStatus>,
    pub author: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: usize,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct Page {
    pub items: Vec<Document>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

impl DocumentService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, StoreError> {
        Self::with_registry(instance, Box::new(SledRegistry))
    }

    /// Uses `registry` for approval records instead of the default writer.
    pub fn with_registry(
        instance: Arc<sled::Db>,
        registry: Box<dyn RegistryWriter>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            store: DocumentStore::open(instance)?,
            registry,
        })
    }

    /// Create a new DRAFT document and return its id
    pub fn create_draft(&self, author: &str, title: &str) -> anyhow::Result<u64> {
        let author = author.trim();
        let title = title.trim();
        if author.is_empty() {
            return Err(ValidationError::BlankAuthor.into());
        }
        if title.is_empty() {
            return Err(ValidationError::BlankTitle.into());
        }

        let token = utils::new_document_token()?;
        let document = self
            .store
            .insert_draft(token, author.to_string(), title.to_string())?;

        debug!(id = document.id, token = %document.token, "created draft");

        Ok(document.id)
    }

    /// DRAFT -> SUBMITTED
    pub fn submit_one(
        &self,
        id: u64,
        initiator: &str,
        comment: &str,
    ) -> Result<Document, TransitionError> {
        self.transition(id, Action::Submit, initiator, comment)
    }

    /// SUBMITTED -> APPROVED, writing the approval registry record in the
    /// same unit
    pub fn approve_one(
        &self,
        id: u64,
        initiator: &str,
        comment: &str,
    ) -> Result<Document, TransitionError> {
        self.transition(id, Action::Approve, initiator, comment)
    }

    fn transition(
        &self,
        id: u64,
        action: Action,
        initiator: &str,
        comment: &str,
    ) -> Result<Document, TransitionError> {
        // Lock before the status read; released after commit or rollback.
        let _guard = self.store.lock(id);
        debug!(id, %action, "acquired document lock");
        let sequence = self.store.next_sequence()?;

        let outcome = self.store.transaction(|tx| {
            let Some(mut document) = tx.find_by_id(id)? else {
                return abort(TransitionError::NotFound(id));
            };
            if let Err(current) = document.apply(action) {
                return abort(TransitionError::Conflict {
                    id,
                    action,
                    expected: action.requires(),
                    current,
                });
            }

            tx.save(&document)?;
            tx.append_history(
                sequence,
                &HistoryEntry::new(id, action, initiator, comment),
            )?;

            let receipt = match action {
                Action::Approve => Some(tx.append_registry_record(
                    self.registry.as_ref(),
                    &RegistryRecord::new(id, initiator),
                )?),
                Action::Submit => None,
            };

            Ok((document, receipt))
        });

        match outcome {
            Ok((document, receipt)) => {
                info!(
                    id,
                    %action,
                    initiator,
                    status = %document.status,
                    receipt = receipt.as_deref().unwrap_or("-"),
                    "transition committed"
                );
                Ok(document)
            }
            Err(e) => {
                match &e {
                    TransitionError::Registry(_) => warn!(id, %action, error = %e, "rolled back"),
                    TransitionError::Store(_) => error!(id, %action, error = %e, "store failure"),
                    _ => debug!(id, %action, error = %e, "transition rejected"),
                }
                Err(e)
            }
        }
    }

    pub fn get_document(&self, id: u64) -> Result<Document, TransitionError> {
        self.store
            .find_by_id(id)?
            .ok_or(TransitionError::NotFound(id))
    }

    /// Ordered history of a document, oldest first
    pub fn get_history(&self, id: u64) -> Result<Vec<HistoryEntry>, TransitionError> {
        if self.store.find_by_id(id)?.is_none() {
            return Err(TransitionError::NotFound(id));
        }
        Ok(self.store.history_for(id)?)
    }

    pub fn get_document_with_history(
        &self,
        id: u64,
    ) -> Result<DocumentWithHistory, TransitionError> {
        let document = self.get_document(id)?;
        let history = self.store.history_for(id)?;
        Ok(DocumentWithHistory { document, history })
    }

    /// Existing documents among `ids`, in the order given. Missing ids are skipped.
    pub fn get_documents_by_ids(&self, ids: &[u64]) -> Result<Vec<Document>, StoreError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(document) = self.store.find_by_id(*id)? {
                found.push(document);
            }
        }
        Ok(found)
    }

    pub fn registry_record(&self, id: u64) -> Result<Option<RegistryRecord>, StoreError> {
        self.store.registry_record(id)
    }

    /// Filter by status, author and created range (inclusive), ordered by id
    pub fn search(&self, criteria: &SearchCriteria) -> Result<Page, StoreError> {
        let author = criteria
            .author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());

        let mut matching = Vec::new();
        for document in self.store.documents() {
            let document = document?;
            let created = document.created_at.to_datetime_utc();

            if criteria.status.is_some_and(|s| s != document.status) {
                continue;
            }
            if author.is_some_and(|a| a != document.author) {
                continue;
            }
            if criteria.from.is_some_and(|from| created < from) {
                continue;
            }
            if criteria.to.is_some_and(|to| created > to) {
                continue;
            }
            matching.push(document);
        }

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(criteria.page.saturating_mul(criteria.size))
            .take(criteria.size)
            .collect();

        Ok(Page {
            items,
            total,
            page: criteria.page,
            size: criteria.size,
        })
    }

    /// Ids of the first `limit` documents in `status`, ascending
    pub fn find_batch_with_status(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<u64>, StoreError> {
        let mut ids = Vec::new();
        for document in self.store.documents() {
            if ids.len() >= limit {
                break;
            }
            let document = document?;
            if document.status == status {
                ids.push(document.id);
            }
        }
        Ok(ids)
    }

    pub fn flush(&self) -> Result<usize, StoreError> {
        self.store.flush()
    }
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Success => "SUCCESS",
            ResultKind::Conflict => "CONFLICT",
            ResultKind::NotFound => "NOT_FOUND",
            ResultKind::RegistryError => "REGISTRY_ERROR",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
