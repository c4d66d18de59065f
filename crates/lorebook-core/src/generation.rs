//! Answer generation and post-processing.
//!
//! The default generator is a purely extractive composer: it stitches an
//! answer out of sentences taken verbatim from the top retrieved chunks
//! and never invents tokens. An external rewriter can replace it through
//! the [`Generator`] trait; post-processors are best-effort and a failure
//! falls back to the unprocessed answer upstream.

use crate::error::GenerationError;
use crate::types::ChunkRecord;
use async_trait::async_trait;

/// How many of the top chunks the extractive composer reads.
const COMPOSER_CHUNKS: usize = 3;
/// Sentences shorter than this (after trim) are considered fragments.
const MIN_SENTENCE_CHARS: usize = 20;
/// Sentences kept per chunk.
const SENTENCES_PER_CHUNK: usize = 2;

/// Output of a generation strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    /// The answer text
    pub answer: String,
    /// Identifier of the producing model/strategy
    pub model_id: String,
    /// Number of chunks consulted
    pub chunks_used: usize,
    /// Total characters of context consulted
    pub context_length: usize,
}

/// Answer generation strategy.
#[async_trait(?Send)]
pub trait Generator: Send + Sync {
    /// Strategy id used in configuration.
    fn id(&self) -> &'static str;

    /// Produces an answer from the question and the top retrieved chunks.
    ///
    /// MUST return within the orchestrator's deadline or fail; citation
    /// attachment is owned by the orchestrator, not the generator.
    async fn generate(
        &self,
        question: &str,
        chunks: &[ChunkRecord],
        max_tokens: usize,
    ) -> Result<GenerationOutput, GenerationError>;
}

/// Best-effort answer rewriter applied after generation.
#[async_trait(?Send)]
pub trait PostProcessor: Send + Sync {
    /// Strategy id used in configuration.
    fn id(&self) -> &'static str;

    /// Rewrites `answer`. On failure the orchestrator keeps the prior
    /// answer.
    async fn process(
        &self,
        answer: &str,
        question: &str,
        chunks: &[ChunkRecord],
    ) -> Result<String, GenerationError>;
}

/// Extractive composer: builds an answer from sentences of the top chunks.
#[derive(Debug, Default)]
pub struct ExtractiveComposer;

impl ExtractiveComposer {
    fn compose(chunks: &[ChunkRecord], max_tokens: usize) -> String {
        let mut kept: Vec<String> = Vec::new();

        for chunk in chunks.iter().take(COMPOSER_CHUNKS) {
            let sentences = chunk
                .text
                .split(|c: char| matches!(c, '.' | '!' | '?'))
                .map(str::trim)
                .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
                .take(SENTENCES_PER_CHUNK);
            for sentence in sentences {
                kept.push(sentence.to_string());
            }
        }

        let mut answer = kept.join(". ");

        let max_chars = max_tokens * 4;
        if answer.chars().count() > max_chars {
            answer = answer.chars().take(max_chars).collect();
            answer = answer.trim_end().to_string();
        }

        if !answer.is_empty() && !answer.ends_with('.') {
            answer.push('.');
        }
        answer
    }
}

#[async_trait(?Send)]
impl Generator for ExtractiveComposer {
    fn id(&self) -> &'static str {
        "simple-extractive"
    }

    async fn generate(
        &self,
        _question: &str,
        chunks: &[ChunkRecord],
        max_tokens: usize,
    ) -> Result<GenerationOutput, GenerationError> {
        let used = chunks.len().min(COMPOSER_CHUNKS);
        let context_length: usize = chunks
            .iter()
            .take(COMPOSER_CHUNKS)
            .map(|c| c.text.chars().count())
            .sum();

        Ok(GenerationOutput {
            answer: Self::compose(chunks, max_tokens),
            model_id: self.id().to_string(),
            chunks_used: used,
            context_length,
        })
    }
}

/// Whitespace/punctuation cleanup post-processor.
///
/// Collapses whitespace runs and guarantees a terminal period. Never
/// introduces new tokens.
#[derive(Debug, Default)]
pub struct PolishProcessor;

#[async_trait(?Send)]
impl PostProcessor for PolishProcessor {
    fn id(&self) -> &'static str {
        "polish"
    }

    async fn process(
        &self,
        answer: &str,
        _question: &str,
        _chunks: &[ChunkRecord],
    ) -> Result<String, GenerationError> {
        let mut polished = answer.split_whitespace().collect::<Vec<_>>().join(" ");
        if polished
            .chars()
            .last()
            .is_some_and(|c| c.is_alphanumeric())
        {
            polished.push('.');
        }
        Ok(polished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkId, DocId};

    fn chunk(ordinal: usize, text: &str) -> ChunkRecord {
        let doc_id = DocId::from_raw("doc-1-0");
        ChunkRecord {
            id: ChunkId::new(&doc_id, ordinal),
            doc_id,
            page_number: 1,
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            token_estimate: text.len().div_ceil(4),
        }
    }

    #[tokio::test]
    async fn test_composer_extracts_long_sentences() {
        let chunks = vec![chunk(
            0,
            "Short one. This sentence is clearly long enough to keep. Tiny. \
             Another sentence that comfortably exceeds the length floor.",
        )];
        let out = ExtractiveComposer
            .generate("question?", &chunks, 256)
            .await
            .unwrap();

        assert!(out
            .answer
            .contains("This sentence is clearly long enough to keep"));
        assert!(out
            .answer
            .contains("Another sentence that comfortably exceeds the length floor"));
        assert!(!out.answer.contains("Short one"));
        assert!(out.answer.ends_with('.'));
        assert_eq!(out.model_id, "simple-extractive");
        assert_eq!(out.chunks_used, 1);
    }

    #[tokio::test]
    async fn test_composer_takes_two_sentences_per_chunk() {
        let text = "First long sentence with plenty of words inside it. \
                    Second long sentence with plenty of words inside it. \
                    Third long sentence with plenty of words inside it.";
        let out = ExtractiveComposer
            .generate("q", &[chunk(0, text)], 256)
            .await
            .unwrap();
        assert!(out.answer.contains("First long sentence"));
        assert!(out.answer.contains("Second long sentence"));
        assert!(!out.answer.contains("Third long sentence"));
    }

    #[tokio::test]
    async fn test_composer_reads_at_most_three_chunks() {
        let chunks: Vec<ChunkRecord> = (0..5)
            .map(|i| {
                chunk(
                    i,
                    &format!("Chunk number {i} has a sentence long enough to keep around."),
                )
            })
            .collect();
        let out = ExtractiveComposer.generate("q", &chunks, 512).await.unwrap();
        assert_eq!(out.chunks_used, 3);
        assert!(out.answer.contains("Chunk number 0"));
        assert!(out.answer.contains("Chunk number 2"));
        assert!(!out.answer.contains("Chunk number 3"));
    }

    #[tokio::test]
    async fn test_composer_truncates_to_token_budget() {
        let long_sentence = format!(
            "This extremely repetitive sentence {} keeps going for a while.",
            "and keeps going ".repeat(30)
        );
        let out = ExtractiveComposer
            .generate("q", &[chunk(0, &long_sentence)], 10)
            .await
            .unwrap();
        // 10 tokens * 4 chars, plus at most the appended period.
        assert!(out.answer.chars().count() <= 41);
        assert!(out.answer.ends_with('.'));
    }

    #[tokio::test]
    async fn test_composer_never_invents_tokens() {
        let text = "Every word of the answer must come from this chunk verbatim.";
        let out = ExtractiveComposer
            .generate("unrelated question text", &[chunk(0, text)], 256)
            .await
            .unwrap();
        for word in out.answer.trim_end_matches('.').split_whitespace() {
            assert!(
                text.contains(word),
                "composer invented token: {word}"
            );
        }
    }

    #[tokio::test]
    async fn test_composer_empty_chunks() {
        let out = ExtractiveComposer.generate("q", &[], 256).await.unwrap();
        assert!(out.answer.is_empty());
        assert_eq!(out.chunks_used, 0);
        assert_eq!(out.context_length, 0);
    }

    #[tokio::test]
    async fn test_polish_collapses_whitespace() {
        let polished = PolishProcessor
            .process("spaced   out\n\nanswer", "q", &[])
            .await
            .unwrap();
        assert_eq!(polished, "spaced out answer.");
    }

    #[tokio::test]
    async fn test_polish_keeps_terminal_punctuation() {
        let polished = PolishProcessor
            .process("already terminated.", "q", &[])
            .await
            .unwrap();
        assert_eq!(polished, "already terminated.");
    }
}
