use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use rayon::prelude::*;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::{Error, Result};

const FACES: TableDefinition<u64, &[u8]> = TableDefinition::new("faces");
const META: TableDefinition<&str, u32> = TableDefinition::new("meta");

const DIMENSION_KEY: &str = "dimension";

/// Header size: 8 bytes document_id + 8 bytes created_at.
const HEADER_SIZE: usize = 16;

/// Stores face embeddings keyed by numeric face ID.
///
/// The embedding dimension is fixed when the index is created and persisted
/// in a meta table; every stored vector has exactly that length.
///
/// Binary format per entry:
/// - 8 bytes: owning document ID (u64 LE)
/// - 8 bytes: creation timestamp, unix seconds (u64 LE)
/// - dim * 4 bytes: f32 LE vector components
pub struct FaceIndex {
    db: Database,
    dimension: u32,
}

/// A nearest-neighbor hit before confidence filtering and ranking.
///
/// `raw_score` is cosine similarity in `[-1, 1]`; the search engine
/// normalizes it into a confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub face_id: u64,
    pub document_id: u64,
    pub raw_score: f32,
}

impl FaceIndex {
    /// Open or create a face index at the given path.
    ///
    /// On first open the dimension is recorded in the index; reopening with
    /// a different dimension is a configuration error, since it indicates
    /// embedding-model version drift.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use faceseek::FaceIndex;
    ///
    /// let index = FaceIndex::open(&tmp.path().join("faces.redb"), 512).unwrap();
    /// assert_eq!(index.dimension(), 512);
    /// assert!(index.is_empty().unwrap());
    /// ```
    pub fn open(path: &Path, dimension: u32) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "embedding dimension must be positive".into(),
            ));
        }
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            txn.open_table(FACES)?;
            let mut meta = txn.open_table(META)?;
            let stored = meta.get(DIMENSION_KEY)?.map(|v| v.value());
            match stored {
                Some(stored) if stored != dimension => {
                    return Err(Error::Config(format!(
                        "face index was created with dimension {stored}, \
                         requested {dimension}"
                    )));
                }
                Some(_) => {}
                None => {
                    meta.insert(DIMENSION_KEY, dimension)?;
                }
            }
        }
        txn.commit()?;

        Ok(Self { db, dimension })
    }

    /// Open an existing face index, reading its persisted dimension.
    ///
    /// Fails if the index has never been initialized via [`FaceIndex::open`].
    pub fn open_existing(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let dimension = {
            let txn = db.begin_read()?;
            let meta = txn.open_table(META);
            match meta {
                Ok(meta) => meta.get(DIMENSION_KEY)?.map(|v| v.value()),
                Err(_) => None,
            }
        };

        let Some(dimension) = dimension else {
            return Err(Error::Config(format!(
                "face index at {} has not been initialized; run ingest first",
                path.display()
            )));
        };

        Ok(Self { db, dimension })
    }

    /// The fixed embedding dimension of this index.
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Store a face embedding. Overwrites any existing record with the same
    /// face ID.
    ///
    /// Fails with `DimensionMismatch` if the vector length differs from the
    /// index dimension.
    pub fn insert(
        &self,
        face_id: u64,
        document_id: u64,
        vector: &[f32],
    ) -> Result<()> {
        if vector.len() != self.dimension as usize {
            return Err(Error::DimensionMismatch {
                expected: self.dimension as usize,
                actual: vector.len(),
            });
        }

        let created_at = unix_now();
        let byte_len = HEADER_SIZE + std::mem::size_of_val(vector);

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FACES)?;
            let mut guard = table.insert_reserve(face_id, byte_len)?;
            let dest = guard.as_mut();

            dest[0..8].copy_from_slice(&document_id.to_le_bytes());
            dest[8..16].copy_from_slice(&created_at.to_le_bytes());
            dest[HEADER_SIZE..].copy_from_slice(bytemuck::cast_slice(vector));
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a face record. Returns false (not an error) if absent.
    pub fn remove(&self, face_id: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(FACES)?;
            table.remove(face_id)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Remove all faces owned by a document. Returns how many were removed.
    ///
    /// Used when the owning document is deleted.
    pub fn remove_by_document(&self, document_id: u64) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(FACES)?;

            let doomed: Vec<u64> = {
                let mut ids = Vec::new();
                for entry in table.iter()? {
                    let (k, v) = entry?;
                    if record_document_id(v.value()) == Some(document_id) {
                        ids.push(k.value());
                    }
                }
                ids
            };

            for &face_id in &doomed {
                table.remove(face_id)?;
            }
            doomed.len()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Return up to `candidate_k` candidates ordered by raw cosine
    /// similarity to the probe, descending. Exact ties order by face ID
    /// ascending.
    ///
    /// Neither the probe nor the stored vectors are assumed unit-norm; the
    /// scoring kernel normalizes explicitly. Zero-magnitude vectors score
    /// 0.0 against everything.
    pub fn query_nearest(
        &self,
        probe: &[f32],
        candidate_k: usize,
    ) -> Result<Vec<Candidate>> {
        if probe.len() != self.dimension as usize {
            return Err(Error::InvalidProbe {
                expected: self.dimension as usize,
                actual: probe.len(),
            });
        }

        let rows = self.load_rows()?;

        let mut candidates: Vec<Candidate> = rows
            .par_iter()
            .map(|(face_id, document_id, vector)| Candidate {
                face_id: *face_id,
                document_id: *document_id,
                raw_score: cosine_similarity(probe, vector),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.face_id.cmp(&b.face_id))
        });
        candidates.truncate(candidate_k);

        Ok(candidates)
    }

    /// Number of stored face records.
    pub fn len(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FACES)?;
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// List all stored face IDs.
    pub fn list_ids(&self) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FACES)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _) = entry?;
            result.push(k.value());
        }
        Ok(result)
    }

    /// Decode every record into (face_id, document_id, vector) triples.
    fn load_rows(&self) -> Result<Vec<(u64, u64, Vec<f32>)>> {
        let expected_len =
            HEADER_SIZE + self.dimension as usize * std::mem::size_of::<f32>();

        let txn = self.db.begin_read()?;
        let table = txn.open_table(FACES)?;

        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let bytes = v.value();
            if bytes.len() != expected_len {
                tracing::warn!(
                    face_id = k.value(),
                    "skipping malformed face record"
                );
                continue;
            }
            let document_id =
                u64::from_le_bytes(bytes[0..8].try_into().unwrap());
            let vector: Vec<f32> =
                bytemuck::cast_slice(&bytes[HEADER_SIZE..]).to_vec();
            rows.push((k.value(), document_id, vector));
        }

        Ok(rows)
    }
}

impl std::fmt::Debug for FaceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceIndex")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

fn record_document_id(bytes: &[u8]) -> Option<u64> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    Some(u64::from_le_bytes(bytes[0..8].try_into().unwrap()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Cosine similarity with explicit normalization of both operands.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
