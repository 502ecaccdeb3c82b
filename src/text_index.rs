use std::path::Path;

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::QueryParser,
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::{document_db::MrzFields, error::Result};

/// Field names used in the schema.
pub mod fields {
    pub const DOCUMENT_ID: &str = "document_id";
    pub const FULL_TEXT: &str = "full_text";
    pub const MRZ_TEXT: &str = "mrz_text";
    pub const DOCUMENT_NUMBER: &str = "document_number";
    pub const SURNAME: &str = "surname";
    pub const GIVEN_NAMES: &str = "given_names";
    pub const UPLOADED_AT: &str = "uploaded_at";
}

/// Which document fields a text search runs against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// OCR text and MRZ fields, with MRZ identifiers boosted.
    All,
    /// OCR-extracted text only.
    Ocr,
    /// MRZ fields only.
    Mrz,
}

/// Manages the Tantivy full-text index over OCR text and MRZ fields.
pub struct TextIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub document_id: Field,
    pub full_text: Field,
    pub mrz_text: Field,
    pub document_number: Field,
    pub surname: Field,
    pub given_names: Field,
    pub uploaded_at: Field,
}

/// A raw full-text hit, before joining with document summaries.
#[derive(Debug, Clone)]
pub struct TextHit {
    pub score: f32,
    pub document_id: u64,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let document_id = builder.add_u64_field(
        fields::DOCUMENT_ID,
        NumericOptions::default()
            .set_indexed()
            .set_stored()
            .set_fast(),
    );

    let full_text_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("en_stem")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let full_text = builder.add_text_field(fields::FULL_TEXT, full_text_opts);

    // MRZ-derived fields carry codes and transliterated names; stemming
    // would mangle them, so they only get lowercasing.
    let plain_opts = || {
        TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("plain")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
    };
    let mrz_text = builder.add_text_field(fields::MRZ_TEXT, plain_opts());
    let surname = builder.add_text_field(fields::SURNAME, plain_opts());
    let given_names =
        builder.add_text_field(fields::GIVEN_NAMES, plain_opts());

    let document_number =
        builder.add_text_field(fields::DOCUMENT_NUMBER, STRING | STORED);

    let uploaded_at =
        builder.add_u64_field(fields::UPLOADED_AT, STORED | FAST);

    let schema = builder.build();
    let fields = SchemaFields {
        document_id,
        full_text,
        mrz_text,
        document_number,
        surname,
        given_names,
        uploaded_at,
    };

    (schema, fields)
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);

    let plain = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register("plain", plain);
}

impl TextIndex {
    /// Open or create a text index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, _) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                schema.clone(),
                tantivy::IndexSettings::default(),
            )?
        };

        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    /// Create an in-memory text index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    /// Get the resolved field handles.
    pub fn fields(&self) -> SchemaFields {
        let f = |name: &str| self.schema.get_field(name).unwrap();
        SchemaFields {
            document_id: f(fields::DOCUMENT_ID),
            full_text: f(fields::FULL_TEXT),
            mrz_text: f(fields::MRZ_TEXT),
            document_number: f(fields::DOCUMENT_NUMBER),
            surname: f(fields::SURNAME),
            given_names: f(fields::GIVEN_NAMES),
            uploaded_at: f(fields::UPLOADED_AT),
        }
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// Add a document to the index via the given writer.
    ///
    /// Deletes any existing entry for the document first, so re-ingesting a
    /// document replaces rather than duplicates it.
    pub fn index_document(
        &self,
        writer: &IndexWriter,
        document_id: u64,
        full_text: &str,
        mrz: Option<&MrzFields>,
        uploaded_at: u64,
    ) -> Result<()> {
        let f = self.fields();

        let term = tantivy::Term::from_field_u64(f.document_id, document_id);
        writer.delete_term(term);

        let (mrz_text, document_number, surname, given_names) = match mrz {
            Some(m) => (
                format!(
                    "{} {} {} {} {} {}",
                    m.document_type,
                    m.document_number,
                    m.surname,
                    m.given_names,
                    m.date_of_birth,
                    m.nationality,
                ),
                m.document_number.clone(),
                m.surname.clone(),
                m.given_names.clone(),
            ),
            None => Default::default(),
        };

        writer.add_document(doc!(
            f.document_id => document_id,
            f.full_text => full_text,
            f.mrz_text => mrz_text,
            f.document_number => document_number,
            f.surname => surname,
            f.given_names => given_names,
            f.uploaded_at => uploaded_at,
        ))?;

        Ok(())
    }

    /// Delete a document's entry from the index.
    pub fn delete_document(&self, writer: &IndexWriter, document_id: u64) {
        let f = self.fields();
        let term = tantivy::Term::from_field_u64(f.document_id, document_id);
        writer.delete_term(term);
    }

    /// Search the index with BM25 scoring over the requested scope.
    ///
    /// For [`SearchScope::All`], MRZ identifier fields are boosted over the
    /// OCR body: document numbers 3x, names and OCR text 2x.
    pub fn search_text(
        &self,
        query_str: &str,
        scope: SearchScope,
        limit: usize,
    ) -> Result<Vec<TextHit>> {
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let mut parser = match scope {
            SearchScope::Ocr => {
                QueryParser::for_index(&self.index, vec![f.full_text])
            }
            SearchScope::Mrz => QueryParser::for_index(
                &self.index,
                vec![
                    f.mrz_text,
                    f.document_number,
                    f.surname,
                    f.given_names,
                ],
            ),
            SearchScope::All => QueryParser::for_index(
                &self.index,
                vec![
                    f.full_text,
                    f.mrz_text,
                    f.document_number,
                    f.surname,
                    f.given_names,
                ],
            ),
        };
        if scope == SearchScope::All {
            parser.set_field_boost(f.full_text, 2.0);
            parser.set_field_boost(f.document_number, 3.0);
            parser.set_field_boost(f.surname, 2.0);
            parser.set_field_boost(f.given_names, 2.0);
        }

        let (query, _errors) = parser.parse_query_lenient(query_str);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            results.push(TextHit {
                score,
                document_id: extract_u64(&doc, f.document_id),
            });
        }

        Ok(results)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl std::fmt::Debug for TextIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextIndex").finish_non_exhaustive()
    }
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
