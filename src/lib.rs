//! faceseek - face similarity and full-text search for identity-document
//! archives.
//!
//! faceseek indexes the output of a document-processing pipeline (face
//! embeddings, OCR text, parsed MRZ fields) into embedded
//! [redb](https://github.com/cberner/redb) stores and a
//! [Tantivy](https://github.com/quickwit-oss/tantivy) text index, and
//! answers two kinds of query: nearest-face search over a probe embedding,
//! and full-text search over OCR/MRZ content. Face matches come back as a
//! deterministically ordered, threshold-filtered list enriched with
//! document and MRZ metadata.
//!
//! # Quick start
//!
//! ```no_run
//! use faceseek::{DocumentDb, FaceIndex};
//! use faceseek::search::{self, FaceSearchParams};
//!
//! let faces = FaceIndex::open("faces.redb".as_ref(), 512).unwrap();
//! let documents = DocumentDb::open("documents.redb".as_ref()).unwrap();
//!
//! let params = FaceSearchParams::new(vec![0.0; 512]);
//! let response = search::search_faces(&params, &faces, &documents).unwrap();
//! for m in &response.results {
//!     println!("{} (score: {:.3})", m.document_id, m.similarity_score);
//! }
//! ```

pub mod cli;
pub mod data_dir;
pub mod document_db;
pub mod error;
pub mod face_id;
pub mod face_index;
pub mod ingest;
pub mod search;
pub mod text_index;

pub use data_dir::DataDir;
pub use document_db::{DocumentDb, DocumentInfo, DocumentRecord, MrzFields};
pub use error::{Error, Result};
pub use face_id::FaceId;
pub use face_index::{Candidate, FaceIndex};
pub use search::{DocumentStore, EmbeddingStore};
pub use text_index::{SearchScope, TextIndex};
