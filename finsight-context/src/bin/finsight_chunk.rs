use clap::Parser;
use finsight_context::words::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, WindowConfig, WordChunker};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::process;

/// A CLI tool to preview how a text file is split into word-window chunks.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Source identifier attached to every chunk.
    #[arg(short, long, default_value = "stdin")]
    source: String,

    /// Number of words per chunk.
    #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Number of words shared by consecutive chunks.
    #[arg(short = 'o', long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,
}

#[derive(Serialize)]
struct ChunkPreview<'a> {
    source: &'a str,
    sequence: usize,
    word_offset: usize,
    word_count: usize,
    chunk_text: &'a str,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let raw = if let Some(input_path) = &args.input {
        fs::read(input_path)?
    } else {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        buffer
    };
    let file_content = decode_input(&raw);

    let chunker = WordChunker::new(WindowConfig::new(args.chunk_size, args.chunk_overlap)?);
    let chunks: Vec<_> = chunker.chunks(args.source, &file_content).collect();

    let previews: Vec<ChunkPreview> = chunks
        .iter()
        .map(|c| ChunkPreview {
            source: &c.source,
            sequence: c.sequence,
            word_offset: c.word_offset,
            word_count: c.word_count,
            chunk_text: &c.chunk_text,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&previews)?);
    Ok(())
}

/// Decode input the same way the retriever decodes plain-text documents.
fn decode_input(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
