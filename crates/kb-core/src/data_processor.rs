//! Default document source: markdown/plain-text files → `Chunk`s.
//!
//! Each file is split on `##`-and-deeper headings; the heading path of a
//! chunk is the document title followed by the enclosing section headings.
//! Sections longer than `chunk_size` characters are cut into word windows
//! with `chunk_overlap` words carried over between neighbours. Runs without
//! spaces (Chinese text) are cut into character windows instead.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::language::ScriptLanguageDetector;
use crate::traits::LanguageDetector;
use crate::types::Chunk;

const EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Words (characters, for unspaced runs) repeated at the start of the
    /// next window.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 50 }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
    detector: ScriptLanguageDetector,
}

struct Section {
    heading_path: Vec<String>,
    body: String,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking_config: ChunkingConfig) -> Self {
        Self { chunking_config, detector: ScriptLanguageDetector::default() }
    }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Chunk>> {
        self.process_files(data_dir, None)
    }

    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<Chunk>> {
        self.process_files(data_dir, Some(limit))
    }

    fn process_files(&self, data_dir: &Path, limit: Option<usize>) -> Result<Vec<Chunk>> {
        if !data_dir.is_dir() {
            return Err(Error::NotFound(format!("document directory {}", data_dir.display())));
        }
        let mut files = self.list_source_files(data_dir);
        if files.is_empty() {
            warn!(dir = %data_dir.display(), "no markdown or text files found");
            return Ok(vec![]);
        }
        if let Some(limit) = limit {
            if files.len() > limit {
                files.truncate(limit);
                info!(limit, "limited to first files");
            }
        }
        let mut all_chunks = Vec::new();
        for file_path in &files {
            match self.read_file_content(file_path) {
                Ok(content) => {
                    let source = file_path.to_string_lossy().to_string();
                    let fallback_title = file_path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| source.clone());
                    let chunks = self.parse_document(&content, &source, &fallback_title);
                    info!(file = %file_path.display(), chunks = chunks.len(), "parsed document");
                    all_chunks.extend(chunks);
                }
                Err(e) => warn!(error = %e, "skipping unreadable file"),
            }
        }
        info!(files = files.len(), chunks = all_chunks.len(), "processed document directory");
        Ok(all_chunks)
    }

    /// Split one document into chunks. `fallback_title` is used when the
    /// document has no level-1 heading.
    pub fn parse_document(&self, content: &str, source: &str, fallback_title: &str) -> Vec<Chunk> {
        let sections = self.split_by_headings(content, fallback_title);
        let mut chunks = Vec::new();
        for section in sections {
            for text in self.chunk_text(&section.body) {
                let seq = chunks.len();
                let language = self.detector.detect(&text);
                chunks.push(
                    Chunk::new(chunk_id(source, seq, &text), text, source)
                        .with_heading_path(section.heading_path.clone())
                        .with_seq(seq)
                        .with_language(language),
                );
            }
        }
        chunks
    }

    fn split_by_headings(&self, content: &str, fallback_title: &str) -> Vec<Section> {
        let title = content
            .lines()
            .find_map(|l| l.strip_prefix("# ").map(|t| t.trim().to_string()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title.to_string());

        let mut sections = Vec::new();
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut current = Section { heading_path: vec![title.clone()], body: String::new() };
        for line in content.lines() {
            if let Some((level, heading)) = parse_subheading(line) {
                if !current.body.trim().is_empty() {
                    sections.push(current);
                }
                stack.retain(|(l, _)| *l < level);
                stack.push((level, heading));
                let mut heading_path = vec![title.clone()];
                heading_path.extend(stack.iter().map(|(_, h)| h.clone()));
                current = Section { heading_path, body: String::new() };
            }
            current.body.push_str(line);
            current.body.push('\n');
        }
        if !current.body.trim().is_empty() {
            sections.push(current);
        }
        sections
    }

    fn chunk_text(&self, text: &str) -> Vec<String> {
        let text = collapse_blank_lines(text);
        let text = text.trim();
        if text.is_empty() {
            return vec![];
        }
        let size = self.chunking_config.chunk_size.max(1);
        if text.chars().count() <= size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut window_len = 0usize;
        for word in text.split_whitespace() {
            if word.chars().count() > size {
                if !window.is_empty() {
                    chunks.push(window.join(" "));
                    window.clear();
                    window_len = 0;
                }
                chunks.extend(self.char_windows(word, size));
                continue;
            }
            let word_len = word.chars().count() + 1;
            if window_len + word_len > size && !window.is_empty() {
                chunks.push(window.join(" "));
                window = self.overlap_tail(&window, size);
                window_len = window.iter().map(|w| w.chars().count() + 1).sum();
            }
            window.push(word);
            window_len += word_len;
        }
        if !window.is_empty() {
            chunks.push(window.join(" "));
        }
        chunks
    }

    /// Windows over a run with no spaces (typically CJK), `size` characters
    /// each, overlapping by `chunk_overlap` characters.
    fn char_windows(&self, run: &str, size: usize) -> Vec<String> {
        let chars: Vec<char> = run.chars().collect();
        let overlap = self.chunking_config.chunk_overlap.min(size / 2);
        let step = size - overlap;
        let mut out = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                return out;
            }
            start += step;
        }
    }

    /// Trailing words carried into the next window, bounded so a window is
    /// never mostly overlap.
    fn overlap_tail<'a>(&self, window: &[&'a str], size: usize) -> Vec<&'a str> {
        let mut tail = Vec::new();
        let mut len = 0usize;
        for word in window.iter().rev().take(self.chunking_config.chunk_overlap) {
            let word_len = word.chars().count() + 1;
            if len + word_len > size / 2 {
                break;
            }
            len += word_len;
            tail.push(*word);
        }
        tail.reverse();
        tail
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => fs::read(file_path)
                .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                .map_err(|source| Error::Io { path: file_path.to_path_buf(), source }),
        }
    }

    fn list_source_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| EXTENSIONS.contains(&ext)))
            .collect();
        files.sort();
        files
    }
}

/// `## Heading` → (2, "Heading"); level-1 headings and plain lines → None.
fn parse_subheading(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level < 2 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    let heading = rest.trim();
    (!heading.is_empty()).then(|| (level, heading.to_string()))
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(c);
    }
    out
}

/// Stable chunk id: blake3 over source, position and a text prefix.
pub fn chunk_id(source: &str, seq: usize, text: &str) -> String {
    let prefix: String = text.chars().take(100).collect();
    let hash = blake3::hash(format!("{source}:{seq}:{prefix}").as_bytes());
    hash.to_hex()[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "# Company Policies\n\nIntro text.\n\n## Leave Policy\n\n### Annual Leave\nRequests need two weeks notice.\n\n### Sick Leave\nTen days per year.\n\n## Remote Work\nAllowed with approval.\n";

    #[test]
    fn heading_paths_follow_nesting() {
        let chunks = DataProcessor::new().parse_document(POLICY, "policies.md", "policies");
        let paths: Vec<Vec<String>> = chunks.iter().map(|c| c.heading_path.clone()).collect();
        assert_eq!(paths[0], vec!["Company Policies"]);
        assert!(paths.contains(&vec!["Company Policies".to_string(), "Leave Policy".into(), "Annual Leave".into()]));
        assert!(paths.contains(&vec!["Company Policies".to_string(), "Leave Policy".into(), "Sick Leave".into()]));
        assert!(paths.contains(&vec!["Company Policies".to_string(), "Remote Work".into()]));
        let seqs: Vec<usize> = chunks.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn long_sections_split_with_overlap() {
        let processor = DataProcessor::with_chunking(ChunkingConfig { chunk_size: 100, chunk_overlap: 3 });
        let text = (0..200).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = processor.chunk_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        let first_tail: Vec<&str> = chunks[0].split(' ').rev().take(3).collect();
        assert!(chunks[1].starts_with(first_tail[2]));
    }

    #[test]
    fn unspaced_chinese_splits_by_characters() {
        let processor = DataProcessor::with_chunking(ChunkingConfig { chunk_size: 100, chunk_overlap: 5 });
        let text: String = "员工每年享有十五天带薪年假申请需提前两周".chars().cycle().take(510).collect();
        let chunks = processor.chunk_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        let tail: String = chunks[0].chars().skip(95).collect();
        assert!(chunks[1].starts_with(&tail));
        let last: String = text.chars().skip(500).collect();
        assert!(chunks.last().unwrap().ends_with(&last));
    }

    #[test]
    fn long_run_between_words_keeps_both_sides() {
        let processor = DataProcessor::with_chunking(ChunkingConfig { chunk_size: 50, chunk_overlap: 2 });
        let run: String = "年假".repeat(40);
        let chunks = processor.chunk_text(&format!("intro words {run} closing words"));
        assert_eq!(chunks.first().map(String::as_str), Some("intro words"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
        assert!(chunks.last().unwrap().contains("closing words"));
    }

    #[test]
    fn ids_are_stable_and_distinct() {
        assert_eq!(chunk_id("a.md", 0, "x"), chunk_id("a.md", 0, "x"));
        assert_ne!(chunk_id("a.md", 0, "x"), chunk_id("a.md", 1, "x"));
        assert_eq!(chunk_id("a.md", 0, "x").len(), 32);
    }

    #[test]
    fn subheading_parsing() {
        assert_eq!(parse_subheading("## Leave"), Some((2, "Leave".into())));
        assert_eq!(parse_subheading("# Title"), None);
        assert_eq!(parse_subheading("##nospace"), None);
        assert_eq!(parse_subheading("plain"), None);
    }
}
