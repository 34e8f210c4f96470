use rusqlite::params;

use super::*;

impl ClaimDb {
    // =========================================================================
    // Claim documents
    // =========================================================================

    fn map_document_row(row: &rusqlite::Row) -> rusqlite::Result<DbDocument> {
        Ok(DbDocument {
            id: row.get(0)?,
            claim_id: row.get(1)?,
            file_name: row.get(2)?,
            classification: row.get(3)?,
            classification_confidence: row.get(4)?,
            classified_at: row.get(5)?,
        })
    }

    pub fn insert_document(&self, claim_id: &str, file_name: &str) -> Result<String, DbError> {
        let id = format!("doc-{}", uuid::Uuid::new_v4());
        self.conn.execute(
            "INSERT INTO claim_documents (id, claim_id, file_name) VALUES (?1, ?2, ?3)",
            params![id, claim_id, file_name],
        )?;
        Ok(id)
    }

    /// Oldest unclassified documents, up to `limit`. The classifier works
    /// through this queue a batch at a time.
    pub fn get_unclassified_documents(&self, limit: i64) -> Result<Vec<DbDocument>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, claim_id, file_name, classification,
                    classification_confidence, classified_at
             FROM claim_documents
             WHERE classification IS NULL
             ORDER BY created_at, id
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Self::map_document_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Store a classification result. Never overwrites an existing label, so
    /// a re-run that raced another tick is a no-op.
    pub fn record_classification(
        &self,
        document_id: &str,
        label: &str,
        confidence: f64,
    ) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE claim_documents
             SET classification = ?2,
                 classification_confidence = ?3,
                 classified_at = datetime('now')
             WHERE id = ?1 AND classification IS NULL",
            params![document_id, label, confidence],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{seed_claim, test_db};

    #[test]
    fn test_unclassified_queue_order_and_limit() {
        let db = test_db();
        seed_claim(&db, "clm-1");

        let mut ids = Vec::new();
        for name in ["estimate.pdf", "photos.zip", "letter.pdf"] {
            ids.push(db.insert_document("clm-1", name).expect("insert"));
        }

        let queue = db.get_unclassified_documents(2).expect("queue");
        assert_eq!(queue.len(), 2);

        db.record_classification(&ids[0], "estimate", 0.93)
            .expect("classify");
        let queue = db.get_unclassified_documents(10).expect("queue");
        assert_eq!(queue.len(), 2);
        assert!(queue.iter().all(|d| d.classification.is_none()));
    }

    #[test]
    fn test_record_classification_never_overwrites() {
        let db = test_db();
        seed_claim(&db, "clm-1");
        let id = db.insert_document("clm-1", "estimate.pdf").expect("insert");

        assert!(db.record_classification(&id, "estimate", 0.93).expect("first"));
        assert!(!db
            .record_classification(&id, "correspondence", 0.50)
            .expect("second"));

        let (label, confidence): (String, f64) = db
            .conn_ref()
            .query_row(
                "SELECT classification, classification_confidence
                 FROM claim_documents WHERE id = ?1",
                [&id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("row");
        assert_eq!(label, "estimate");
        assert!((confidence - 0.93).abs() < f64::EPSILON);
    }
}
