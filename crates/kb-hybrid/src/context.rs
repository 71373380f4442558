use std::fmt::Write;

use kb_core::types::FusedResult;

/// Render fused results as a numbered context block for a prompt.
/// Empty input renders as an empty string.
pub fn format_context(results: &[FusedResult]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let mut out = String::from("Knowledge base results:\n\n");
    for (i, r) in results.iter().enumerate() {
        let methods: Vec<&str> = r.methods.iter().map(|m| m.as_str()).collect();
        let similarity = r.best_vector_score.map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"));
        let _ = writeln!(
            out,
            "{}. [{}] (fused: {:.4}, similarity: {}, methods: {})",
            i + 1,
            r.chunk.title(),
            r.fused_score,
            similarity,
            methods.join("+")
        );
        let _ = writeln!(out, "   {}", r.chunk.text.trim());
        let _ = writeln!(out, "   source: {}\n", r.chunk.source);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::types::{Chunk, RetrievalMethod};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn result(id: &str, methods: &[RetrievalMethod], similarity: Option<f32>) -> FusedResult {
        let chunk = Chunk::new(id, "Annual leave needs two weeks notice.", "hr/leave.md")
            .with_heading_path(vec!["Leave Policy".into()]);
        FusedResult {
            chunk_id: id.to_string(),
            fused_score: 0.0328,
            methods: methods.iter().copied().collect::<BTreeSet<_>>(),
            contributions: vec![],
            best_vector_score: similarity,
            chunk: Arc::new(chunk),
        }
    }

    #[test]
    fn empty_results_render_nothing() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn numbered_entries_with_methods() {
        let out = format_context(&[
            result("a", &[RetrievalMethod::Vector, RetrievalMethod::Lexical], Some(0.71)),
            result("b", &[RetrievalMethod::Lexical], None),
        ]);
        assert!(out.starts_with("Knowledge base results:\n\n1. [Leave Policy]"));
        assert!(out.contains("similarity: 0.710, methods: vector+lexical"));
        assert!(out.contains("2. [Leave Policy] (fused: 0.0328, similarity: n/a, methods: lexical)"));
        assert!(out.contains("   source: hr/leave.md\n"));
    }
}
