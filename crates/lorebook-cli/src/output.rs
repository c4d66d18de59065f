//! Output formatting for query results and stats.
//!
//! Supports human-readable terminal output and JSON for scripting.

use lorebook_core::engine::EngineStats;
use lorebook_core::types::QueryResult;
use serde::Serialize;

/// Maximum characters shown in a passage snippet.
const SNIPPET_MAX_LEN: usize = 200;

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_len).collect();
    format!("{}...", truncated.trim_end())
}

/// JSON output structure for a query.
#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    result: &'a QueryResult,
}

/// Formats a query result as pretty JSON.
pub fn format_json(query: &str, result: &QueryResult) -> String {
    serde_json::to_string_pretty(&JsonOutput { query, result })
        .unwrap_or_else(|_| "{}".to_string())
}

/// Formats a query result for the terminal.
pub fn format_human(query: &str, result: &QueryResult) -> String {
    if result.citations.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let mut output = String::new();
    output.push_str(&format!(
        "Found {} passage{} for \"{}\":\n\n",
        result.citations.len(),
        if result.citations.len() == 1 { "" } else { "s" },
        query
    ));

    for (i, citation) in result.citations.iter().enumerate() {
        let score = citation
            .score
            .map(|s| format!(" (score: {s:.3})"))
            .unwrap_or_default();
        output.push_str(&format!(
            "{}. {} p.{}{}\n",
            i + 1,
            citation.doc_name,
            citation.page_number,
            score
        ));
        output.push_str(&format!(
            "   {}\n",
            truncate_text(&citation.text, SNIPPET_MAX_LEN)
        ));
    }

    if let Some(answer) = &result.generated_answer {
        output.push_str(&format!("\nAnswer:\n{answer}\n"));
    }

    output.push_str(&format!(
        "\n({} ms retrieval, {} ms total)",
        result.latency.retrieval_ms, result.latency.total_ms
    ));
    output
}

/// Formats engine stats for the terminal.
pub fn format_stats(stats: &EngineStats) -> String {
    let mut output = String::new();
    output.push_str(&format!("Documents: {}\n", stats.docs));
    output.push_str(&format!("Chunks:    {}\n", stats.chunks));
    output.push_str(&format!("Vectors:   {}\n", stats.vectors));
    output.push_str(&format!("Notes:     {}\n", stats.notes));
    output.push_str(&format!("Index:     {:?}\n", stats.snapshot_state));
    if stats.latency.count > 0 {
        output.push_str(&format!(
            "Latency:   p50 {} ms, p95 {} ms, p99 {} ms over {} queries\n",
            stats.latency.p50, stats.latency.p95, stats.latency.p99, stats.latency.count
        ));
    }
    output
}

/// Formats engine stats as pretty JSON.
pub fn format_stats_json(stats: &EngineStats) -> String {
    serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorebook_core::types::{
        ChunkId, Citation, DocId, LatencyBreakdown, QueryResult,
    };

    fn sample_result() -> QueryResult {
        QueryResult {
            chunks: Vec::new(),
            citations: vec![Citation {
                chunk_id: ChunkId::from_raw("doc-1-0-chunk-0"),
                doc_id: DocId::from_raw("doc-1-0"),
                doc_name: "notes.txt".to_string(),
                page_number: 1,
                text: "A relevant passage from the corpus.".to_string(),
                score: Some(0.75),
            }],
            scores: vec![0.75],
            latency: LatencyBreakdown {
                retrieval_ms: 3,
                generation_ms: None,
                polish_ms: None,
                total_ms: 5,
            },
            generated_answer: None,
        }
    }

    #[test]
    fn test_human_output_contains_citation() {
        let output = format_human("passage", &sample_result());
        assert!(output.contains("notes.txt"));
        assert!(output.contains("p.1"));
        assert!(output.contains("0.750"));
        assert!(output.contains("relevant passage"));
    }

    #[test]
    fn test_human_output_empty() {
        let mut result = sample_result();
        result.citations.clear();
        result.scores.clear();
        let output = format_human("nothing", &result);
        assert!(output.contains("No results"));
    }

    #[test]
    fn test_json_output_parses() {
        let output = format_json("passage", &sample_result());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["query"], "passage");
        assert_eq!(value["result"]["citations"][0]["doc_name"], "notes.txt");
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(300);
        let truncated = truncate_text(&long, 10);
        assert!(truncated.ends_with("..."));
        assert!(truncated.chars().count() <= 13);
    }
}
