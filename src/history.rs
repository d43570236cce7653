use super::document::{Action, TimeStamp};
use chrono::Utc;

/// One committed transition. Written once, never updated.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, serde::Serialize, Clone)]
pub struct HistoryEntry {
    #[n(0)]
    pub document_id: u64,
    #[n(1)]
    pub action: Action,
    #[n(2)]
    pub initiator: String,
    #[n(3)]
    pub comment: String, // empty when none was given
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
}

impl HistoryEntry {
    pub fn new(document_id: u64, action: Action, initiator: &str, comment: &str) -> Self {
        Self {
            document_id,
            action,
            initiator: initiator.to_string(),
            comment: comment.to_string(),
            created_at: TimeStamp::new(),
        }
    }
}

/// History key: document id followed by the commit sequence, both
/// big-endian so a prefix scan returns entries in commit order.
pub(crate) fn history_key(document_id: u64, sequence: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&document_id.to_be_bytes());
    key[8..].copy_from_slice(&sequence.to_be_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_sort_by_document_then_sequence() {
        let a = history_key(1, 900);
        let b = history_key(2, 1);
        let c = history_key(2, 2);

        assert!(a < b);
        assert!(b < c);
        assert!(b.starts_with(&2u64.to_be_bytes()));
    }

    #[test]
    fn entry_encoding() {
        let entry = HistoryEntry::new(3, Action::Approve, "user", "");

        let encoded = minicbor::to_vec(&entry).unwrap();
        let decoded: HistoryEntry = minicbor::decode(&encoded).unwrap();

        assert_eq!(entry, decoded);
        assert_eq!(decoded.comment, "");
    }
}
