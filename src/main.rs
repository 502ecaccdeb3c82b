use std::io::Read;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use faceseek::{
    DataDir,
    DocumentDb,
    FaceIndex,
    TextIndex,
    cli::{Cli, Command},
    error::{Error, Result},
    ingest,
    search::{self, FaceSearchParams, TextSearchParams},
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("FACESEEK_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Ingest(args) => cmd_ingest(&data_dir, &args)?,
        Command::Remove(args) => cmd_remove(&data_dir, args.document_id)?,
        Command::Face(args) => cmd_face(&data_dir, &args)?,
        Command::Text(args) => cmd_text(&data_dir, &args)?,
        Command::Status(args) => cmd_status(&data_dir, args.json)?,
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

/// Read a file's contents, or stdin when the path is "-".
fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Parse a probe embedding from a JSON float array.
fn parse_probe(json: &str) -> Result<Vec<f32>> {
    serde_json::from_str(json).map_err(|e| {
        Error::Config(format!("probe must be a JSON array of floats: {e}"))
    })
}

fn cmd_ingest(
    data_dir: &DataDir,
    args: &faceseek::cli::IngestArgs,
) -> Result<()> {
    let json = read_input(&args.input)?;
    let entries = ingest::parse_batch(&json)?;

    let faces = FaceIndex::open(&data_dir.faces_db(), args.dimension)?;
    let text = TextIndex::open(&data_dir.text_index_dir()?)?;
    let documents = DocumentDb::open(&data_dir.documents_db())?;

    let summary = ingest::ingest_batch(&entries, &faces, &text, &documents)?;
    eprintln!(
        "Ingested {} document(s), {} face embedding(s).",
        summary.documents, summary.faces
    );
    Ok(())
}

fn cmd_remove(data_dir: &DataDir, document_id: u64) -> Result<()> {
    let faces = FaceIndex::open_existing(&data_dir.faces_db())?;
    let text = TextIndex::open(&data_dir.text_index_dir()?)?;
    let documents = DocumentDb::open(&data_dir.documents_db())?;

    let (removed_faces, existed) =
        ingest::remove_document(document_id, &faces, &text, &documents)?;

    if existed || removed_faces > 0 {
        eprintln!(
            "Removed document {document_id} ({removed_faces} face(s))."
        );
    } else {
        eprintln!("Document {document_id} was not indexed; nothing removed.");
    }
    Ok(())
}

fn cmd_face(data_dir: &DataDir, args: &faceseek::cli::FaceArgs) -> Result<()> {
    let probe = parse_probe(&read_input(&args.probe)?)?;

    let faces = FaceIndex::open_existing(&data_dir.faces_db())?;
    let documents = DocumentDb::open(&data_dir.documents_db())?;

    let params = FaceSearchParams {
        probe,
        threshold: args.threshold,
        max_results: args.count,
    };
    let response = search::search_faces(&params, &faces, &documents)?;

    if args.json {
        search::format_json(&response)?;
    } else {
        search::format_faces_human(&response);
    }
    Ok(())
}

fn cmd_text(data_dir: &DataDir, args: &faceseek::cli::TextArgs) -> Result<()> {
    let text = TextIndex::open(&data_dir.text_index_dir()?)?;
    let documents = DocumentDb::open(&data_dir.documents_db())?;

    let params = TextSearchParams {
        query: args.query.clone(),
        scope: args.scope,
        max_results: args.count,
    };
    let response = search::search_documents(&params, &text, &documents)?;

    if args.json {
        search::format_json(&response)?;
    } else {
        search::format_text_human(&response);
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct Status {
    data_dir: String,
    dimension: Option<u32>,
    documents: usize,
    faces: usize,
}

fn cmd_status(data_dir: &DataDir, json: bool) -> Result<()> {
    let documents = DocumentDb::open(&data_dir.documents_db())?;

    let (dimension, face_count) =
        match FaceIndex::open_existing(&data_dir.faces_db()) {
            Ok(index) => (Some(index.dimension()), index.len()?),
            Err(_) => (None, 0),
        };

    let status = Status {
        data_dir: data_dir.root().display().to_string(),
        dimension,
        documents: documents.count()?,
        faces: face_count,
    };

    if json {
        search::format_json(&status)?;
    } else {
        println!("Data directory: {}", status.data_dir);
        match status.dimension {
            Some(d) => println!("Embedding dimension: {d}"),
            None => println!("Embedding dimension: (not initialized)"),
        }
        println!("Documents: {}", status.documents);
        println!("Faces: {}", status.faces);
    }
    Ok(())
}
