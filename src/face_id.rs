use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A stable face identifier derived from (document_id, face_index).
///
/// Re-detecting face N of a document yields the same id, so re-ingesting a
/// document overwrites its face records instead of duplicating them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceId {
    /// The numeric ID used as the key in redb tables and for tie-breaking.
    pub numeric: u64,
    /// The short hex string for human display (e.g. "a1b2c3").
    pub short: String,
}

impl FaceId {
    /// Generate a stable face ID from the owning document and face index.
    pub fn new(document_id: u64, face_index: u32) -> Self {
        let numeric = Self::hash_pair(document_id, face_index);
        let short = Self::short_hex(numeric, 6);
        Self { numeric, short }
    }

    /// Recover the display form from a bare numeric id.
    pub fn from_numeric(numeric: u64) -> Self {
        Self {
            numeric,
            short: Self::short_hex(numeric, 6),
        }
    }

    fn hash_pair(document_id: u64, face_index: u32) -> u64 {
        let mut hasher = DefaultHasher::new();
        document_id.hash(&mut hasher);
        face_index.hash(&mut hasher);
        hasher.finish()
    }

    fn short_hex(value: u64, len: usize) -> String {
        let full = format!("{value:016x}");
        full[..len].to_string()
    }
}

impl std::fmt::Display for FaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}
