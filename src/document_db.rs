use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const DOCUMENTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("documents");

/// Parsed machine-readable-zone fields for an identity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrzFields {
    pub document_type: String,
    pub document_number: String,
    pub surname: String,
    pub given_names: String,
    pub date_of_birth: String,
    pub nationality: String,
}

/// Denormalized document snapshot returned with search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub file_type: String,
    /// Upload timestamp, unix seconds.
    pub uploaded_at: u64,
    pub has_mrz: bool,
}

/// Everything stored per document: the snapshot plus optional MRZ fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub filename: String,
    pub file_type: String,
    pub uploaded_at: u64,
    pub has_mrz: bool,
    pub mrz: Option<MrzFields>,
}

impl DocumentRecord {
    /// The read-only snapshot exposed to search results.
    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            filename: self.filename.clone(),
            file_type: self.file_type.clone(),
            uploaded_at: self.uploaded_at,
            has_mrz: self.has_mrz,
        }
    }
}

/// Stores document summaries keyed by document ID, serialized as JSON.
pub struct DocumentDb {
    db: Database,
}

impl DocumentDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Store or replace a document summary.
    pub fn put_summary(
        &self,
        document_id: u64,
        record: &DocumentRecord,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(record).map_err(|e| {
            crate::error::Error::Config(format!(
                "failed to serialize document record: {e}"
            ))
        })?;

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.insert(document_id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch a document summary. Returns None for unknown ids and for
    /// records that fail to decode.
    pub fn get_summary(
        &self,
        document_id: u64,
    ) -> Result<Option<DocumentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;

        let Some(guard) = table.get(document_id)? else {
            return Ok(None);
        };

        match serde_json::from_slice(guard.value()) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(
                    document_id,
                    error = %e,
                    "skipping undecodable document record"
                );
                Ok(None)
            }
        }
    }

    /// Remove a document summary. Returns false (not an error) if absent.
    pub fn remove(&self, document_id: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.remove(document_id)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// List all stored document IDs.
    pub fn list_ids(&self) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _) = entry?;
            result.push(k.value());
        }
        Ok(result)
    }

    /// Number of stored documents.
    pub fn count(&self) -> Result<usize> {
        Ok(self.list_ids()?.len())
    }
}

impl std::fmt::Debug for DocumentDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, DocumentDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = DocumentDb::open(&tmp.path().join("documents.redb")).unwrap();
        (tmp, db)
    }

    fn sample_record(with_mrz: bool) -> DocumentRecord {
        DocumentRecord {
            filename: "passport.jpg".to_string(),
            file_type: "image/jpeg".to_string(),
            uploaded_at: 1_700_000_000,
            has_mrz: with_mrz,
            mrz: with_mrz.then(|| MrzFields {
                document_type: "P".to_string(),
                document_number: "X1234567".to_string(),
                surname: "DOE".to_string(),
                given_names: "JANE".to_string(),
                date_of_birth: "900101".to_string(),
                nationality: "UTO".to_string(),
            }),
        }
    }

    #[test]
    fn put_and_get() {
        let (_tmp, db) = test_db();

        let record = sample_record(true);
        db.put_summary(42, &record).unwrap();

        let loaded = db.get_summary(42).unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.mrz.as_ref().unwrap().surname, "DOE");
    }

    #[test]
    fn get_missing_returns_none() {
        let (_tmp, db) = test_db();
        assert!(db.get_summary(999).unwrap().is_none());
    }

    #[test]
    fn record_without_mrz() {
        let (_tmp, db) = test_db();

        db.put_summary(1, &sample_record(false)).unwrap();
        let loaded = db.get_summary(1).unwrap().unwrap();
        assert!(!loaded.has_mrz);
        assert!(loaded.mrz.is_none());
    }

    #[test]
    fn put_overwrites() {
        let (_tmp, db) = test_db();

        db.put_summary(1, &sample_record(false)).unwrap();
        let mut updated = sample_record(false);
        updated.filename = "renamed.pdf".to_string();
        db.put_summary(1, &updated).unwrap();

        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(db.get_summary(1).unwrap().unwrap().filename, "renamed.pdf");
    }

    #[test]
    fn remove_entry() {
        let (_tmp, db) = test_db();

        db.put_summary(1, &sample_record(false)).unwrap();
        assert!(db.remove(1).unwrap());
        assert!(!db.remove(1).unwrap());
        assert!(db.get_summary(1).unwrap().is_none());
    }

    #[test]
    fn list_ids_and_count() {
        let (_tmp, db) = test_db();

        db.put_summary(10, &sample_record(false)).unwrap();
        db.put_summary(20, &sample_record(true)).unwrap();

        let mut ids = db.list_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec![10, 20]);
        assert_eq!(db.count().unwrap(), 2);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("documents.redb");

        {
            let db = DocumentDb::open(&path).unwrap();
            db.put_summary(42, &sample_record(true)).unwrap();
        }

        {
            let db = DocumentDb::open(&path).unwrap();
            assert!(db.get_summary(42).unwrap().is_some());
        }
    }

    #[test]
    fn info_snapshot_drops_mrz_body() {
        let record = sample_record(true);
        let info = record.info();
        assert_eq!(info.filename, "passport.jpg");
        assert!(info.has_mrz);
    }
}
