//! sled backed persistence for documents, history and the approval registry
//!
//! Three trees live in one database so a transition can write all of them in
//! a single sled transaction:
//!
//! - `documents`: document id -> CBOR [`Document`]
//! - `history`:   document id ++ commit sequence -> CBOR [`HistoryEntry`]
//! - `registry`:  document id -> CBOR [`RegistryRecord`]
//!
//! Exclusive access to a document is taken through [`DocumentStore::lock`]
//! and must be held around the transaction that reads and rewrites it.
use super::document::Document;
use super::error::{StoreError, TransitionError};
use super::history::{HistoryEntry, history_key};
use super::lock::{DocumentGuard, LockTable};
use super::registry::{RegistryRecord, RegistryWriter};
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree, abort,
};
use std::sync::Arc;

const DOCUMENTS: &str = "documents";
const HISTORY: &str = "history";
const REGISTRY: &str = "registry";

pub type TxResult<A> = ConflictableTransactionResult<A, TransitionError>;

pub struct DocumentStore {
    db: Arc<sled::Db>,
    documents: sled::Tree,
    history: sled::Tree,
    registry: sled::Tree,
    locks: LockTable,
}

/// The three trees as seen from inside a transaction.
pub struct StoreTx<'a> {
    documents: &'a TransactionalTree,
    history: &'a TransactionalTree,
    registry: &'a TransactionalTree,
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode<T>(bytes: &[u8]) -> Result<T, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

// aborts the running transaction with a store error
fn fail<A>(e: impl Into<StoreError>) -> TxResult<A> {
    abort(TransitionError::Store(e.into()))
}

impl DocumentStore {
    pub fn open(db: Arc<sled::Db>) -> Result<Self, StoreError> {
        let documents = db.open_tree(DOCUMENTS)?;
        let history = db.open_tree(HISTORY)?;
        let registry = db.open_tree(REGISTRY)?;

        Ok(Self {
            db,
            documents,
            history,
            registry,
            locks: LockTable::new(),
        })
    }

    /// Persists a fresh DRAFT document under a newly assigned id.
    pub fn insert_draft(
        &self,
        token: String,
        author: String,
        title: String,
    ) -> Result<Document, StoreError> {
        // sled ids start at zero, ours at one
        let id = self.db.generate_id()? + 1;
        let document = Document::new(id, token, author, title);

        self.documents
            .insert(&id_key(id)[..], minicbor::to_vec(&document)?)?;

        Ok(document)
    }

    /// Plain read without taking the document lock.
    pub fn find_by_id(&self, id: u64) -> Result<Option<Document>, StoreError> {
        match self.documents.get(&id_key(id)[..])? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Blocks until the exclusive lock for `id` is held. Reads made inside
    /// [`DocumentStore::transaction`] while the guard lives see the latest
    /// committed state and cannot race another writer of the same id.
    pub fn lock(&self, id: u64) -> DocumentGuard<'_> {
        self.locks.acquire(id)
    }

    /// Commit sequence for history keys. Monotonic across the database.
    pub fn next_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }

    /// Runs `f` as one all-or-nothing unit over documents, history and
    /// registry. An abort from `f` discards every write it made.
    pub fn transaction<A, F>(&self, f: F) -> Result<A, TransitionError>
    where
        F: Fn(&StoreTx<'_>) -> TxResult<A>,
    {
        let result = (&self.documents, &self.history, &self.registry).transaction(
            |(documents, history, registry)| {
                let tx = StoreTx {
                    documents,
                    history,
                    registry,
                };
                f(&tx)
            },
        );

        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    /// History of one document in commit order.
    pub fn history_for(&self, id: u64) -> Result<Vec<HistoryEntry>, StoreError> {
        self.history
            .scan_prefix(&id_key(id)[..])
            .values()
            .map(|value| decode(&value?))
            .collect()
    }

    pub fn registry_record(&self, id: u64) -> Result<Option<RegistryRecord>, StoreError> {
        match self.registry.get(&id_key(id)[..])? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All documents in ascending id order.
    pub fn documents(&self) -> impl Iterator<Item = Result<Document, StoreError>> + '_ {
        self.documents.iter().values().map(|value| decode(&value?))
    }

    pub fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.db.flush()?)
    }
}

impl StoreTx<'_> {
    pub fn find_by_id(&self, id: u64) -> TxResult<Option<Document>> {
        match self.documents.get(&id_key(id)[..])? {
            Some(bytes) => match decode(&bytes) {
                Ok(document) => Ok(Some(document)),
                Err(e) => fail(e),
            },
            None => Ok(None),
        }
    }

    pub fn save(&self, document: &Document) -> TxResult<()> {
        let cbor = match minicbor::to_vec(document) {
            Ok(cbor) => cbor,
            Err(e) => return fail(e),
        };
        self.documents.insert(&id_key(document.id)[..], cbor)?;
        Ok(())
    }

    pub fn append_history(&self, sequence: u64, entry: &HistoryEntry) -> TxResult<()> {
        let cbor = match minicbor::to_vec(entry) {
            Ok(cbor) => cbor,
            Err(e) => return fail(e),
        };
        self.history
            .insert(&history_key(entry.document_id, sequence)[..], cbor)?;
        Ok(())
    }

    /// Hands the record to `writer`; a writer abort becomes
    /// [`TransitionError::Registry`] and rolls back the whole transaction.
    pub fn append_registry_record(
        &self,
        writer: &dyn RegistryWriter,
        record: &RegistryRecord,
    ) -> TxResult<String> {
        writer.write(self.registry, record).map_err(|e| match e {
            ConflictableTransactionError::Abort(e) => {
                ConflictableTransactionError::Abort(TransitionError::Registry(e))
            }
            ConflictableTransactionError::Conflict => ConflictableTransactionError::Conflict,
            ConflictableTransactionError::Storage(e) => ConflictableTransactionError::Storage(e),
        })
    }
}
