//! Approval registry: the append-only side store of approval facts
use super::document::TimeStamp;
use super::error::RegistryError;
use chrono::Utc;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, abort};

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, serde::Serialize, Clone)]
pub struct RegistryRecord {
    #[n(0)]
    pub document_id: u64,
    #[n(1)]
    pub approved_by: String,
    #[n(2)]
    pub approved_at: TimeStamp<Utc>,
}

impl RegistryRecord {
    pub fn new(document_id: u64, approved_by: &str) -> Self {
        Self {
            document_id,
            approved_by: approved_by.to_string(),
            approved_at: TimeStamp::new(),
        }
    }
    /// Encodes the record and derives its receipt, a sha256 digest of the
    /// encoding.
    pub fn build(&self) -> Result<(String, Vec<u8>), RegistryError> {
        let cbor = minicbor::to_vec(self)?;
        let receipt = sha256::digest(&cbor);

        Ok((receipt, cbor))
    }
}

/// Writes approval records. Runs inside the approve transaction: aborting
/// rolls back the status change and the history entry as well.
pub trait RegistryWriter: Send + Sync {
    fn write(
        &self,
        registry: &TransactionalTree,
        record: &RegistryRecord,
    ) -> ConflictableTransactionResult<String, RegistryError>;
}

/// Default writer. Keys by document id and refuses a second record for the
/// same document.
#[derive(Debug, Default)]
pub struct SledRegistry;

impl RegistryWriter for SledRegistry {
    fn write(
        &self,
        registry: &TransactionalTree,
        record: &RegistryRecord,
    ) -> ConflictableTransactionResult<String, RegistryError> {
        let key = record.document_id.to_be_bytes();
        if registry.get(&key[..])?.is_some() {
            return abort(RegistryError::Duplicate(record.document_id));
        }

        let (receipt, cbor) = match record.build() {
            Ok(built) => built,
            Err(e) => return abort(e),
        };
        registry.insert(&key[..], cbor)?;

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_is_stable_for_a_record() {
        let record = RegistryRecord::new(11, "approver");

        let (first, _) = record.build().unwrap();
        let (second, cbor) = record.build().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let decoded: RegistryRecord = minicbor::decode(&cbor).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn second_write_for_same_document_is_rejected() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tree = db.open_tree("registry").unwrap();
        let writer = SledRegistry;

        let record = RegistryRecord::new(5, "approver");
        let first: Result<String, sled::transaction::TransactionError<RegistryError>> =
            tree.transaction(|tx| writer.write(tx, &record));
        assert!(first.is_ok());

        let again: Result<String, sled::transaction::TransactionError<RegistryError>> =
            tree.transaction(|tx| writer.write(tx, &record));
        assert!(matches!(
            again,
            Err(sled::transaction::TransactionError::Abort(RegistryError::Duplicate(5)))
        ));
        assert_eq!(tree.len(), 1);
    }
}
