use anyhow::Context;
use document_approval::{
    Action, BatchRequest, DocumentService, DocumentStatus, RegistryError, ResultKind,
    TransitionError,
    registry::{RegistryRecord, RegistryWriter},
};
use sled::open;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, abort};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

// Sled locks its directory, so every test gets its own database under a
// temp dir which is removed when the returned guard drops.
fn open_service(name: &str) -> anyhow::Result<(TempDir, DocumentService)> {
    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join(name))?;
    let service = DocumentService::new(Arc::new(db))?;
    Ok((temp_dir, service))
}

/// Registry writer that refuses every write while `failing` is set.
#[derive(Default)]
struct FlakyRegistry {
    failing: Arc<AtomicBool>,
}

impl RegistryWriter for FlakyRegistry {
    fn write(
        &self,
        registry: &TransactionalTree,
        record: &RegistryRecord,
    ) -> ConflictableTransactionResult<String, RegistryError> {
        if self.failing.load(Ordering::SeqCst) {
            return abort(RegistryError::Unavailable("registry write failed".into()));
        }
        let (receipt, cbor) = match record.build() {
            Ok(built) => built,
            Err(e) => return abort(e),
        };
        registry.insert(&record.document_id.to_be_bytes()[..], cbor)?;
        Ok(receipt)
    }
}

#[test]
fn create_submit_and_approve_document() -> anyhow::Result<()> {
    let (_dir, service) = open_service("create_submit_approve.db")?;

    let id = service.create_draft("Author1", "Test Doc")?;
    let doc = service.get_document(id)?;
    assert_eq!(doc.status, DocumentStatus::Draft);
    assert!(!doc.token.is_empty());

    service
        .submit_one(id, "u1", "")
        .context("Document failed on submit: ")?;
    assert_eq!(service.get_document(id)?.status, DocumentStatus::Submitted);

    service
        .approve_one(id, "u2", "OK")
        .context("Document failed on approval: ")?;
    let doc = service.get_document(id)?;
    assert_eq!(doc.status, DocumentStatus::Approved);

    let record = service.registry_record(id)?.context("registry record missing")?;
    assert_eq!(record.approved_by, "u2");

    let history = service.get_history(id)?;
    let actions: Vec<Action> = history.iter().map(|h| h.action).collect();
    assert_eq!(actions, vec![Action::Submit, Action::Approve]);
    assert_eq!(history[0].initiator, "u1");
    assert_eq!(history[0].comment, "");
    assert_eq!(history[1].comment, "OK");
    assert!(history[0].created_at <= history[1].created_at);

    Ok(())
}

#[test]
fn transitions_out_of_order_conflict_and_change_nothing() -> anyhow::Result<()> {
    let (_dir, service) = open_service("out_of_order.db")?;
    let id = service.create_draft("A", "T")?;

    let err = service.approve_one(id, "u", "").unwrap_err();
    assert_eq!(err.kind(), Some(ResultKind::Conflict));
    assert_eq!(service.get_document(id)?.status, DocumentStatus::Draft);
    assert!(service.get_history(id)?.is_empty());
    assert!(service.registry_record(id)?.is_none());

    service.submit_one(id, "u", "")?;
    let err = service.submit_one(id, "u", "").unwrap_err();
    assert!(matches!(
        err,
        TransitionError::Conflict {
            current: DocumentStatus::Submitted,
            ..
        }
    ));
    assert_eq!(service.get_history(id)?.len(), 1);

    Ok(())
}

#[test]
fn approving_an_approved_document_always_conflicts() -> anyhow::Result<()> {
    let (_dir, service) = open_service("idempotent_failure.db")?;
    let id = service.create_draft("A", "T")?;
    service.submit_one(id, "u", "")?;
    service.approve_one(id, "u", "")?;

    for _ in 0..5 {
        let err = service.approve_one(id, "someone-else", "again").unwrap_err();
        assert_eq!(err.kind(), Some(ResultKind::Conflict));
    }

    assert_eq!(service.get_history(id)?.len(), 2);
    assert_eq!(service.registry_record(id)?.map(|r| r.approved_by), Some("u".into()));

    Ok(())
}

#[test]
fn registry_failure_rolls_back_approval() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join("registry_rollback.db"))?;
    let registry = FlakyRegistry::default();
    let failing = Arc::clone(&registry.failing);
    let service = DocumentService::with_registry(Arc::new(db), Box::new(registry))?;

    let id = service.create_draft("Author", "Title")?;
    service.submit(&BatchRequest::new("user", vec![id]))?;

    failing.store(true, Ordering::SeqCst);
    let outcome = service.approve(&BatchRequest::new("user", vec![id]))?;

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].result, ResultKind::RegistryError);

    let doc = service.get_document(id)?;
    assert_eq!(doc.status, DocumentStatus::Submitted);
    assert!(service.registry_record(id)?.is_none());
    let history = service.get_history(id)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, Action::Submit);

    // state is untouched, so a later attempt starts again from SUBMITTED
    failing.store(false, Ordering::SeqCst);
    let outcome = service.approve(&BatchRequest::new("user", vec![id]))?;
    assert_eq!(outcome.results[0].result, ResultKind::Success);
    assert_eq!(service.get_document(id)?.status, DocumentStatus::Approved);
    assert!(service.registry_record(id)?.is_some());
    assert_eq!(service.get_history(id)?.len(), 2);

    Ok(())
}

#[test]
fn approve_batch_isolates_each_document() -> anyhow::Result<()> {
    let (_dir, service) = open_service("approve_batch.db")?;

    let submitted = service.create_draft("A", "T1")?;
    let draft = service.create_draft("B", "T2")?;
    let missing = 99_999;
    service.submit_one(submitted, "u1", "")?;

    let outcome = service.approve(&BatchRequest::new("u1", vec![submitted, draft, missing]))?;

    let kinds: Vec<(u64, ResultKind)> = outcome.results.iter().map(|r| (r.id, r.result)).collect();
    assert_eq!(
        kinds,
        vec![
            (submitted, ResultKind::Success),
            (draft, ResultKind::Conflict),
            (missing, ResultKind::NotFound),
        ]
    );
    assert_eq!(outcome.results[0].message, "Approved");
    assert_eq!(outcome.results[2].message, "Document not found");
    assert_eq!(service.get_document(submitted)?.status, DocumentStatus::Approved);
    assert_eq!(service.get_document(draft)?.status, DocumentStatus::Draft);

    Ok(())
}

#[test]
fn submit_batch_reports_partial_results() -> anyhow::Result<()> {
    let (_dir, service) = open_service("submit_batch.db")?;

    let id1 = service.create_draft("A", "T1")?;
    let id2 = service.create_draft("B", "T2")?;
    let id3 = 99_999;
    service.submit(&BatchRequest::new("u1", vec![id1]))?;

    let outcome = service.submit(&BatchRequest::new("u1", vec![id1, id2, id3]).with_comment("second pass"))?;

    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.count(ResultKind::Success), 1);
    assert_eq!(outcome.count(ResultKind::Conflict), 1);
    assert_eq!(outcome.count(ResultKind::NotFound), 1);
    assert_eq!(outcome.results[1].id, id2);
    assert_eq!(outcome.results[1].message, "Submitted");
    assert_eq!(service.get_history(id2)?[0].comment, "second pass");

    Ok(())
}

#[test]
fn one_success_among_many_conflicts_still_commits() -> anyhow::Result<()> {
    let (_dir, service) = open_service("mostly_conflicts.db")?;

    let approved = service.create_draft("A", "done")?;
    service.submit_one(approved, "u", "")?;
    service.approve_one(approved, "u", "")?;
    let pending = service.create_draft("A", "pending")?;
    service.submit_one(pending, "u", "")?;

    let mut ids = vec![approved; 999];
    ids.insert(500, pending);
    let outcome = service.approve(&BatchRequest::new("u", ids))?;

    assert_eq!(outcome.results.len(), 1000);
    assert_eq!(outcome.count(ResultKind::Success), 1);
    assert_eq!(outcome.count(ResultKind::Conflict), 999);
    assert_eq!(outcome.results[500].result, ResultKind::Success);
    assert_eq!(service.get_document(pending)?.status, DocumentStatus::Approved);

    Ok(())
}

#[test]
fn malformed_batches_are_rejected_before_any_work() -> anyhow::Result<()> {
    let (_dir, service) = open_service("malformed.db")?;
    let id = service.create_draft("A", "T")?;

    assert!(service.submit(&BatchRequest::new(" ", vec![id])).is_err());
    assert!(service.submit(&BatchRequest::new("u", vec![])).is_err());
    assert!(service.submit(&BatchRequest::new("u", vec![id; 1001])).is_err());

    assert_eq!(service.get_document(id)?.status, DocumentStatus::Draft);
    assert!(service.get_history(id)?.is_empty());

    Ok(())
}

#[test]
fn document_with_history_view() -> anyhow::Result<()> {
    let (_dir, service) = open_service("with_history.db")?;
    let id = service.create_draft("A", "T")?;
    service.submit_one(id, "u1", "please review")?;

    let view = service.get_document_with_history(id)?;
    assert_eq!(view.document.id, id);
    assert_eq!(view.history.len(), 1);
    assert_eq!(view.history[0].comment, "please review");

    let json = serde_json::to_value(&view)?;
    assert_eq!(json["document"]["status"], "SUBMITTED");
    assert_eq!(json["history"][0]["action"], "SUBMIT");

    Ok(())
}

#[test]
fn state_survives_reopen() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("reopen.db");

    let id = {
        let service = DocumentService::new(Arc::new(open(&path)?))?;
        let id = service.create_draft("A", "T")?;
        service.submit_one(id, "u", "")?;
        service.approve_one(id, "u", "")?;
        service.flush()?;
        id
    };

    let service = DocumentService::new(Arc::new(open(&path)?))?;
    assert_eq!(service.get_document(id)?.status, DocumentStatus::Approved);
    assert_eq!(service.get_history(id)?.len(), 2);
    assert!(service.registry_record(id)?.is_some());

    let next = service.create_draft("A", "T2")?;
    assert_ne!(next, id);

    Ok(())
}
