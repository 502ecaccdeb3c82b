use std::time::Instant;

use serde::Serialize;

use crate::{
    document_db::{DocumentDb, DocumentInfo, DocumentRecord, MrzFields},
    error::{Error, Result},
    face_id::FaceId,
    face_index::{Candidate, FaceIndex},
    text_index::{SearchScope, TextIndex},
};

/// Default minimum confidence for face matches.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;
/// Default result cap for face search.
pub const DEFAULT_MAX_RESULTS: usize = 10;
/// Default result cap for text search.
pub const DEFAULT_TEXT_MAX_RESULTS: usize = 20;

/// Confidences closer than this are considered tied and ordered by face ID.
const SCORE_EPSILON: f32 = 1e-9;

/// Floor for the candidate over-fetch, absorbing threshold filtering losses
/// without a second round-trip to the store.
const MIN_CANDIDATE_K: usize = 50;

/// Read access to the face embedding index.
///
/// [`FaceIndex`] is the embedded implementation; a remote vector index can
/// implement this too, surfacing outages as
/// [`Error::IndexUnavailable`](crate::Error::IndexUnavailable).
pub trait EmbeddingStore {
    /// The fixed embedding dimension of the store.
    fn dimension(&self) -> usize;

    /// Up to `candidate_k` candidates ordered by raw similarity descending.
    fn query_nearest(
        &self,
        probe: &[f32],
        candidate_k: usize,
    ) -> Result<Vec<Candidate>>;
}

/// Read access to document summaries for result enrichment.
pub trait DocumentStore {
    fn get_summary(&self, document_id: u64) -> Result<Option<DocumentRecord>>;
}

impl EmbeddingStore for FaceIndex {
    fn dimension(&self) -> usize {
        FaceIndex::dimension(self) as usize
    }

    fn query_nearest(
        &self,
        probe: &[f32],
        candidate_k: usize,
    ) -> Result<Vec<Candidate>> {
        FaceIndex::query_nearest(self, probe, candidate_k)
    }
}

impl DocumentStore for DocumentDb {
    fn get_summary(&self, document_id: u64) -> Result<Option<DocumentRecord>> {
        DocumentDb::get_summary(self, document_id)
    }
}

/// A validated face search request.
#[derive(Debug, Clone)]
pub struct FaceSearchParams {
    pub probe: Vec<f32>,
    pub threshold: f32,
    pub max_results: usize,
}

impl FaceSearchParams {
    pub fn new(probe: Vec<f32>) -> Self {
        Self {
            probe,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// A single enriched face match.
///
/// `document_info` and `mrz_data` are `None` when the document summary
/// could not be fetched; the match itself is still returned.
#[derive(Debug, Clone, Serialize)]
pub struct FaceMatch {
    pub face_id: u64,
    pub document_id: u64,
    pub similarity_score: f32,
    pub document_info: Option<DocumentInfo>,
    pub mrz_data: Option<MrzFields>,
}

/// Response envelope for a face search.
#[derive(Debug, Clone, Serialize)]
pub struct FaceSearchResponse {
    pub similarity_threshold: f32,
    pub results_count: usize,
    pub execution_time_seconds: f64,
    pub results: Vec<FaceMatch>,
}

/// Execute a face similarity search.
///
/// 1. Validate probe dimensionality, threshold, and result cap
/// 2. Over-fetch `max(max_results * 3, 50)` candidates from the store
/// 3. Normalize raw cosine into a `[0, 1]` confidence
/// 4. Filter by threshold, sort by confidence descending (ties by face ID
///    ascending), truncate to `max_results`
/// 5. Enrich surviving matches with document and MRZ metadata
///
/// Finding nothing above the threshold is an empty response, not an error.
/// A store failure is an error; it is never collapsed into "no matches".
pub fn search_faces<E, D>(
    params: &FaceSearchParams,
    index: &E,
    documents: &D,
) -> Result<FaceSearchResponse>
where
    E: EmbeddingStore,
    D: DocumentStore,
{
    let start = Instant::now();

    let expected = index.dimension();
    if params.probe.len() != expected {
        return Err(Error::InvalidProbe {
            expected,
            actual: params.probe.len(),
        });
    }
    if !(0.0..=1.0).contains(&params.threshold) {
        return Err(Error::InvalidQuery(format!(
            "similarity threshold must be in [0, 1], got {}",
            params.threshold
        )));
    }
    if params.max_results == 0 {
        return Err(Error::InvalidQuery(
            "max_results must be at least 1".into(),
        ));
    }

    let candidate_k = candidate_k(params.max_results);
    let candidates = index.query_nearest(&params.probe, candidate_k)?;

    let mut scored: Vec<(Candidate, f32)> = candidates
        .into_iter()
        .map(|c| {
            let confidence = normalize_confidence(c.raw_score);
            (c, confidence)
        })
        .filter(|(_, confidence)| *confidence >= params.threshold)
        .collect();

    // The store's return order for equal scores is not guaranteed stable;
    // re-sort on confidence with a deterministic tie-break.
    scored.sort_by(|(a, ca), (b, cb)| {
        if (ca - cb).abs() <= SCORE_EPSILON {
            a.face_id.cmp(&b.face_id)
        } else {
            cb.partial_cmp(ca).unwrap_or(std::cmp::Ordering::Equal)
        }
    });
    scored.truncate(params.max_results);

    let mut results = Vec::with_capacity(scored.len());
    for (candidate, confidence) in scored {
        let (document_info, mrz_data) =
            fetch_document_metadata(documents, &candidate);
        results.push(FaceMatch {
            face_id: candidate.face_id,
            document_id: candidate.document_id,
            similarity_score: confidence,
            document_info,
            mrz_data,
        });
    }

    Ok(FaceSearchResponse {
        similarity_threshold: params.threshold,
        results_count: results.len(),
        execution_time_seconds: start.elapsed().as_secs_f64(),
        results,
    })
}

/// How many candidates to request from the store for a given result cap.
///
/// Threshold filtering can only shrink the candidate set, so over-fetch
/// enough to avoid a second round-trip.
pub fn candidate_k(max_results: usize) -> usize {
    (max_results * 3).max(MIN_CANDIDATE_K)
}

/// Map raw cosine similarity in `[-1, 1]` onto a `[0, 1]` confidence.
///
/// Monotonic; an exact probe match normalizes to 1.0. Clamped against
/// floating-point drift outside the nominal cosine range.
pub fn normalize_confidence(raw_cosine: f32) -> f32 {
    ((raw_cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Fetch document metadata for one match, degrading to `None` on failure.
///
/// A single document's metadata being unavailable (deleted between index
/// time and query time, or a store error) must not fail the whole search.
fn fetch_document_metadata<D: DocumentStore>(
    documents: &D,
    candidate: &Candidate,
) -> (Option<DocumentInfo>, Option<MrzFields>) {
    match documents.get_summary(candidate.document_id) {
        Ok(Some(record)) => {
            let mrz = record.mrz.clone();
            (Some(record.info()), mrz)
        }
        Ok(None) => {
            tracing::warn!(
                document_id = candidate.document_id,
                face_id = candidate.face_id,
                "document summary missing; returning match without metadata"
            );
            (None, None)
        }
        Err(e) => {
            tracing::warn!(
                document_id = candidate.document_id,
                face_id = candidate.face_id,
                error = %e,
                "document summary fetch failed; returning match without metadata"
            );
            (None, None)
        }
    }
}

// -- Text search --

/// A validated text search request.
#[derive(Debug, Clone)]
pub struct TextSearchParams {
    pub query: String,
    pub scope: SearchScope,
    pub max_results: usize,
}

impl TextSearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: SearchScope::All,
            max_results: DEFAULT_TEXT_MAX_RESULTS,
        }
    }
}

/// A single full-text match joined with its document summary.
#[derive(Debug, Clone, Serialize)]
pub struct TextMatch {
    pub document_id: u64,
    pub score: f32,
    pub document_info: DocumentInfo,
}

/// Response envelope for a text search.
#[derive(Debug, Clone, Serialize)]
pub struct TextSearchResponse {
    pub query: String,
    pub results_count: usize,
    pub execution_time_seconds: f64,
    pub results: Vec<TextMatch>,
}

/// Execute a full-text search over OCR text and MRZ fields.
///
/// Hits whose document summary has vanished are skipped; unlike face
/// search there is no partial-row contract here.
pub fn search_documents<D: DocumentStore>(
    params: &TextSearchParams,
    index: &TextIndex,
    documents: &D,
) -> Result<TextSearchResponse> {
    let start = Instant::now();

    if params.query.trim().is_empty() {
        return Err(Error::InvalidQuery("query must not be empty".into()));
    }
    if params.max_results == 0 {
        return Err(Error::InvalidQuery(
            "max_results must be at least 1".into(),
        ));
    }

    let hits =
        index.search_text(&params.query, params.scope, params.max_results)?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        match documents.get_summary(hit.document_id)? {
            Some(record) => results.push(TextMatch {
                document_id: hit.document_id,
                score: hit.score,
                document_info: record.info(),
            }),
            None => {
                tracing::debug!(
                    document_id = hit.document_id,
                    "text hit references a deleted document; skipping"
                );
            }
        }
    }

    Ok(TextSearchResponse {
        query: params.query.clone(),
        results_count: results.len(),
        execution_time_seconds: start.elapsed().as_secs_f64(),
        results,
    })
}

// -- Output formatting --

/// Format face matches for human-readable terminal output.
pub fn format_faces_human(response: &FaceSearchResponse) {
    if response.results.is_empty() {
        println!("No matches above threshold.");
        return;
    }

    for (i, m) in response.results.iter().enumerate() {
        let face = FaceId::from_numeric(m.face_id);
        let filename = m
            .document_info
            .as_ref()
            .map(|d| d.filename.as_str())
            .unwrap_or("<metadata unavailable>");
        println!(
            "{:>3}. [{:.3}] {face} {filename} (document {})",
            i + 1,
            m.similarity_score,
            m.document_id,
        );
        if let Some(mrz) = &m.mrz_data {
            println!(
                "     {} {}, {} ({})",
                mrz.document_number,
                mrz.surname,
                mrz.given_names,
                mrz.nationality
            );
        }
    }
    println!("\n{} match(es)", response.results.len());
}

/// Format text matches for human-readable terminal output.
pub fn format_text_human(response: &TextSearchResponse) {
    if response.results.is_empty() {
        println!("No matching documents.");
        return;
    }

    for (i, m) in response.results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {} (document {})",
            i + 1,
            m.score,
            m.document_info.filename,
            m.document_id,
        );
    }
    println!("\n{} document(s)", response.results.len());
}

/// Serialize a response as a single JSON line on stdout.
pub fn format_json<T: Serialize>(response: &T) -> Result<()> {
    let json = serde_json::to_string(response).map_err(|e| {
        Error::Config(format!("failed to serialize response: {e}"))
    })?;
    println!("{json}");
    Ok(())
}
