use serde::Deserialize;

use crate::{
    document_db::{DocumentDb, DocumentRecord, MrzFields},
    error::{Error, Result},
    face_id::FaceId,
    face_index::FaceIndex,
    text_index::TextIndex,
};

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// One document in a batch export from the detection pipeline.
///
/// The pipeline has already run face detection, embedding inference, OCR,
/// and MRZ parsing; this is its output, ready for indexing.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentEntry {
    pub document_id: u64,
    pub filename: String,
    pub file_type: String,
    /// Upload timestamp, unix seconds.
    pub uploaded_at: u64,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default)]
    pub mrz: Option<MrzFields>,
    #[serde(default)]
    pub faces: Vec<FaceEntry>,
}

/// One detected face within a document.
#[derive(Debug, Clone, Deserialize)]
pub struct FaceEntry {
    pub face_index: u32,
    pub embedding: Vec<f32>,
}

/// Counters reported after a successful ingest.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub documents: usize,
    pub faces: usize,
}

/// Parse a JSON batch export.
pub fn parse_batch(json: &str) -> Result<Vec<DocumentEntry>> {
    serde_json::from_str(json)
        .map_err(|e| Error::Config(format!("invalid ingest batch: {e}")))
}

/// Ingest a batch: face embeddings into the face index, OCR/MRZ text into
/// the text index, summaries into the document store.
///
/// A dimension mismatch aborts the batch with the offending face named —
/// it indicates embedding-model version drift and must not be dropped
/// silently. Re-ingesting a document overwrites its earlier records.
pub fn ingest_batch(
    entries: &[DocumentEntry],
    faces: &FaceIndex,
    text: &TextIndex,
    documents: &DocumentDb,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    let mut writer = text.writer(WRITER_MEMORY_BUDGET)?;

    for entry in entries {
        for face in &entry.faces {
            let face_id = FaceId::new(entry.document_id, face.face_index);
            faces
                .insert(face_id.numeric, entry.document_id, &face.embedding)
                .inspect_err(|e| {
                    tracing::error!(
                        document_id = entry.document_id,
                        face_index = face.face_index,
                        %face_id,
                        error = %e,
                        "rejecting face embedding"
                    );
                })?;
            summary.faces += 1;
        }

        let record = DocumentRecord {
            filename: entry.filename.clone(),
            file_type: entry.file_type.clone(),
            uploaded_at: entry.uploaded_at,
            has_mrz: entry.mrz.is_some(),
            mrz: entry.mrz.clone(),
        };
        documents.put_summary(entry.document_id, &record)?;

        text.index_document(
            &writer,
            entry.document_id,
            entry.ocr_text.as_deref().unwrap_or(""),
            entry.mrz.as_ref(),
            entry.uploaded_at,
        )?;
        summary.documents += 1;

        tracing::debug!(
            document_id = entry.document_id,
            faces = entry.faces.len(),
            "ingested document"
        );
    }

    writer.commit()?;
    Ok(summary)
}

/// Cascade-delete a document: its face embeddings, its text index entry,
/// and its summary. Removing an unknown document is a no-op.
///
/// Returns how many face records were removed and whether the document
/// summary existed.
pub fn remove_document(
    document_id: u64,
    faces: &FaceIndex,
    text: &TextIndex,
    documents: &DocumentDb,
) -> Result<(usize, bool)> {
    let removed_faces = faces.remove_by_document(document_id)?;

    let mut writer = text.writer(WRITER_MEMORY_BUDGET)?;
    text.delete_document(&writer, document_id);
    writer.commit()?;

    let existed = documents.remove(document_id)?;

    tracing::debug!(
        document_id,
        removed_faces,
        existed,
        "removed document"
    );
    Ok((removed_faces, existed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_index::SearchScope;

    fn sample_batch_json() -> &'static str {
        r#"[
            {
                "document_id": 1,
                "filename": "passport.jpg",
                "file_type": "image/jpeg",
                "uploaded_at": 1700000000,
                "ocr_text": "Republic of Utopia passport",
                "mrz": {
                    "document_type": "P",
                    "document_number": "X1234567",
                    "surname": "DOE",
                    "given_names": "JANE",
                    "date_of_birth": "900101",
                    "nationality": "UTO"
                },
                "faces": [
                    {"face_index": 0, "embedding": [1.0, 0.0]},
                    {"face_index": 1, "embedding": [0.0, 1.0]}
                ]
            },
            {
                "document_id": 2,
                "filename": "scan.pdf",
                "file_type": "application/pdf",
                "uploaded_at": 1700000100,
                "faces": []
            }
        ]"#
    }

    fn setup() -> (tempfile::TempDir, FaceIndex, TextIndex, DocumentDb) {
        let tmp = tempfile::tempdir().unwrap();
        let faces =
            FaceIndex::open(&tmp.path().join("faces.redb"), 2).unwrap();
        let text = TextIndex::open_in_ram().unwrap();
        let documents =
            DocumentDb::open(&tmp.path().join("documents.redb")).unwrap();
        (tmp, faces, text, documents)
    }

    #[test]
    fn parse_batch_accepts_optional_fields() {
        let entries = parse_batch(sample_batch_json()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].faces.len(), 2);
        assert!(entries[0].mrz.is_some());
        assert!(entries[1].mrz.is_none());
        assert!(entries[1].ocr_text.is_none());
    }

    #[test]
    fn parse_batch_rejects_garbage() {
        assert!(matches!(
            parse_batch("not json").unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn ingest_populates_all_stores() {
        let (_tmp, faces, text, documents) = setup();
        let entries = parse_batch(sample_batch_json()).unwrap();

        let summary =
            ingest_batch(&entries, &faces, &text, &documents).unwrap();
        assert_eq!(summary, IngestSummary { documents: 2, faces: 2 });

        assert_eq!(faces.len().unwrap(), 2);
        assert_eq!(documents.count().unwrap(), 2);
        let record = documents.get_summary(1).unwrap().unwrap();
        assert!(record.has_mrz);

        let hits = text.search_text("doe", SearchScope::Mrz, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, 1);
    }

    #[test]
    fn reingest_overwrites_instead_of_duplicating() {
        let (_tmp, faces, text, documents) = setup();
        let entries = parse_batch(sample_batch_json()).unwrap();

        ingest_batch(&entries, &faces, &text, &documents).unwrap();
        ingest_batch(&entries, &faces, &text, &documents).unwrap();

        assert_eq!(faces.len().unwrap(), 2);
        assert_eq!(documents.count().unwrap(), 2);
        let hits =
            text.search_text("passport", SearchScope::Ocr, 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn dimension_mismatch_aborts_loudly() {
        let (_tmp, faces, text, documents) = setup();
        let entries = vec![DocumentEntry {
            document_id: 9,
            filename: "bad.jpg".to_string(),
            file_type: "image/jpeg".to_string(),
            uploaded_at: 0,
            ocr_text: None,
            mrz: None,
            faces: vec![FaceEntry {
                face_index: 0,
                embedding: vec![1.0, 0.0, 0.0],
            }],
        }];

        let err =
            ingest_batch(&entries, &faces, &text, &documents).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch { expected: 2, actual: 3 }
        ));
        assert!(faces.is_empty().unwrap());
    }

    #[test]
    fn remove_document_cascades() {
        let (_tmp, faces, text, documents) = setup();
        let entries = parse_batch(sample_batch_json()).unwrap();
        ingest_batch(&entries, &faces, &text, &documents).unwrap();

        let (removed_faces, existed) =
            remove_document(1, &faces, &text, &documents).unwrap();
        assert_eq!(removed_faces, 2);
        assert!(existed);

        assert!(faces.is_empty().unwrap());
        assert!(documents.get_summary(1).unwrap().is_none());
        assert!(documents.get_summary(2).unwrap().is_some());
        let hits =
            text.search_text("passport", SearchScope::Ocr, 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn remove_unknown_document_is_noop() {
        let (_tmp, faces, text, documents) = setup();

        let (removed_faces, existed) =
            remove_document(404, &faces, &text, &documents).unwrap();
        assert_eq!(removed_faces, 0);
        assert!(!existed);
    }
}
