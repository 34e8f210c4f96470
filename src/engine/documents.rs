//! Unclassified document drain.
//!
//! Each engine tick labels a bounded batch of uploaded documents through the
//! classification service. Bounded so a backlog burns down across ticks
//! instead of pinning one tick on a bulk upload.

use crate::clients::classifier::DocumentClassifier;
use crate::db::types::DbDocument;
use crate::db::ClaimDb;
use crate::error::EngineError;
use crate::types::TickSummary;

pub fn process_unclassified(
    db: &ClaimDb,
    classifier: &dyn DocumentClassifier,
    batch_size: i64,
    summary: &mut TickSummary,
) {
    let batch = match db.get_unclassified_documents(batch_size) {
        Ok(batch) => batch,
        Err(e) => {
            summary.record_error("documents", e);
            return;
        }
    };
    if batch.is_empty() {
        return;
    }
    log::info!("Classifying {} document(s)", batch.len());
    for doc in batch {
        match classify_one(db, classifier, &doc) {
            Ok(true) => summary.documents_processed += 1,
            Ok(false) => {}
            Err(e) => summary.record_error(&doc.claim_id, e),
        }
    }
}

fn classify_one(
    db: &ClaimDb,
    classifier: &dyn DocumentClassifier,
    doc: &DbDocument,
) -> Result<bool, EngineError> {
    let claim = db
        .get_claim(&doc.claim_id)?
        .ok_or_else(|| EngineError::ClaimMissing(doc.claim_id.clone()))?;
    let outcome = classifier
        .classify(&claim.claim_number, &doc.file_name)
        .map_err(|e| EngineError::collab("classifier", e))?;
    // NULL guard in the UPDATE: a concurrently labeled document stays as-is
    let recorded = db.record_classification(&doc.id, &outcome.label, outcome.confidence)?;
    if recorded {
        log::debug!(
            "Document {} on claim {} classified as {} ({:.2})",
            doc.id,
            doc.claim_id,
            outcome.label,
            outcome.confidence
        );
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{seed_claim, test_db};
    use crate::engine::test_support::CannedClassifier;
    use crate::types::{TickKind, TickSummary};

    #[test]
    fn test_drains_batch_once() {
        let db = test_db();
        seed_claim(&db, "clm-1");
        db.insert_document("clm-1", "estimate.pdf").expect("doc");
        db.insert_document("clm-1", "photos.zip").expect("doc");
        let classifier = CannedClassifier {
            label: "estimate",
            confidence: 0.9,
        };

        let mut summary = TickSummary::begin(TickKind::Engine);
        process_unclassified(&db, &classifier, 10, &mut summary);
        assert_eq!(summary.documents_processed, 2);
        assert!(summary.errors.is_empty());

        // Everything labeled; the next pass has nothing to do
        let mut summary = TickSummary::begin(TickKind::Engine);
        process_unclassified(&db, &classifier, 10, &mut summary);
        assert_eq!(summary.documents_processed, 0);

        let unlabeled: i64 = db
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM claim_documents WHERE classification IS NULL",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(unlabeled, 0);
    }

    #[test]
    fn test_batch_size_bounds_one_pass() {
        let db = test_db();
        seed_claim(&db, "clm-1");
        for n in 0..5 {
            db.insert_document("clm-1", &format!("doc-{n}.pdf")).expect("doc");
        }
        let classifier = CannedClassifier {
            label: "correspondence",
            confidence: 0.7,
        };

        let mut summary = TickSummary::begin(TickKind::Engine);
        process_unclassified(&db, &classifier, 2, &mut summary);
        assert_eq!(summary.documents_processed, 2);
    }

    #[test]
    fn test_document_for_missing_claim_recorded_as_error() {
        let db = test_db();
        db.insert_document("clm-ghost", "stray.pdf").expect("doc");
        let classifier = CannedClassifier {
            label: "estimate",
            confidence: 0.9,
        };

        let mut summary = TickSummary::begin(TickKind::Engine);
        process_unclassified(&db, &classifier, 10, &mut summary);
        assert_eq!(summary.documents_processed, 0);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("clm-ghost"));
    }
}
