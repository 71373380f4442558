use std::env;
use std::path::PathBuf;

use kb_core::data_processor::DataProcessor;
use kb_core::traits::LexicalSearcher;
use kb_text::LexicalIndex;

// Build a lexical index over a document directory and print the BM25 hits.
// Usage:
//   cargo run -p kb-text --example search -- "your query" [--dir knowledge_base] [--limit 10]

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut query = String::new();
    let mut dir = PathBuf::from("knowledge_base");
    let mut limit: usize = 10;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" => {
                if i + 1 >= args.len() { eprintln!("--dir requires a path"); std::process::exit(2); }
                dir = PathBuf::from(&args[i + 1]);
                i += 2; continue;
            }
            "--limit" => {
                if i + 1 >= args.len() { eprintln!("--limit requires a number"); std::process::exit(2); }
                limit = args[i + 1].parse().unwrap_or(limit);
                i += 2; continue;
            }
            s if s.starts_with("-") => {
                eprintln!("Unknown flag: {}", s); std::process::exit(2);
            }
            s => {
                if query.is_empty() { query = s.to_string(); }
                i += 1; continue;
            }
        }
    }

    if query.is_empty() {
        eprintln!("Usage: cargo run -p kb-text --example search -- <query> [--dir DIR] [--limit N]");
        std::process::exit(1);
    }

    let chunks = DataProcessor::new().process_directory(&dir)?;
    let index = LexicalIndex::build(&chunks)?;
    println!("Lexical search\n==============");
    println!("Dir: {} ({} chunks)", dir.display(), index.len());
    println!("Query: {} (limit {})\n", query, limit);

    for (i, h) in index.search(&query, limit)?.iter().enumerate() {
        let chunk = chunks.iter().find(|c| c.id == h.chunk_id);
        let title = chunk.map(|c| c.heading_path.join(" > ")).unwrap_or_default();
        let snippet: String = chunk.map(|c| c.text.chars().take(120).collect()).unwrap_or_default();
        println!("{:>2}. score={:.3} id={} [{}]\n    {}", i + 1, h.score, h.chunk_id, title, snippet);
    }
    Ok(())
}
