//! Sentence-aware sliding-window chunking.
//!
//! Pages are chunked independently with a window of `chunk_size`
//! characters and a step of `chunk_size - overlap`. Each candidate window
//! is shortened to the best boundary found in its final 100 characters:
//! sentence end, then paragraph break, then any whitespace, else the raw
//! window end. Offsets are character offsets into the producing page's
//! text and remain valid under overlap.
//!
//! Chunk ordinals are global across pages within one ingest, so chunk ids
//! sort in emission order for the whole document.

use crate::error::ChunkingError;
use crate::types::{ChunkId, ChunkRecord, DocId, PageText};
use serde::{Deserialize, Serialize};

/// Minimum allowed window size in characters.
pub const MIN_CHUNK_SIZE: usize = 100;
/// Maximum allowed window size in characters.
pub const MAX_CHUNK_SIZE: usize = 1000;
/// Maximum allowed overlap percentage.
pub const MAX_OVERLAP_PERCENT: u32 = 30;

/// How far back from the window end boundary adjustment may search.
const BOUNDARY_SEARCH_CHARS: usize = 100;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in characters, within [100, 1000]
    pub chunk_size: usize,
    /// Overlap between consecutive windows as a percentage, within [0, 30]
    pub overlap_percent: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            overlap_percent: 12,
        }
    }
}

impl ChunkingConfig {
    /// Validates parameter ranges.
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_size {} outside [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]",
                self.chunk_size
            )));
        }
        if self.overlap_percent > MAX_OVERLAP_PERCENT {
            return Err(ChunkingError::InvalidConfig(format!(
                "overlap_percent {} outside [0, {MAX_OVERLAP_PERCENT}]",
                self.overlap_percent
            )));
        }
        Ok(())
    }

    /// Overlap in characters: `floor(chunk_size * overlap_percent / 100)`.
    pub fn overlap_chars(&self) -> usize {
        self.chunk_size * self.overlap_percent as usize / 100
    }
}

/// Trait for chunking strategies.
///
/// Chunking is pure computation and must not suspend; strategies receive
/// fully extracted pages and return persisted-ready records.
pub trait ChunkerStrategy: Send + Sync {
    /// Strategy id used in configuration.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Splits pages into chunk records with stable ids and offsets.
    fn chunk(
        &self,
        doc_id: &DocId,
        pages: &[PageText],
        config: &ChunkingConfig,
    ) -> Result<Vec<ChunkRecord>, ChunkingError>;
}

/// The built-in sentence-aware sliding-window strategy.
#[derive(Debug, Default)]
pub struct SentenceWindowChunker;

impl ChunkerStrategy for SentenceWindowChunker {
    fn id(&self) -> &'static str {
        "sentence-window"
    }

    fn name(&self) -> &'static str {
        "Sentence-aware sliding window"
    }

    fn chunk(
        &self,
        doc_id: &DocId,
        pages: &[PageText],
        config: &ChunkingConfig,
    ) -> Result<Vec<ChunkRecord>, ChunkingError> {
        chunk_pages(doc_id, pages, config)
    }
}

/// Chunks all pages of a document.
///
/// Pages with empty or whitespace-only text contribute no chunks; an
/// entirely empty document yields an empty vector, which is not an error.
pub fn chunk_pages(
    doc_id: &DocId,
    pages: &[PageText],
    config: &ChunkingConfig,
) -> Result<Vec<ChunkRecord>, ChunkingError> {
    config.validate()?;

    let mut records = Vec::new();
    let mut ordinal = 0usize;

    for page in pages {
        for piece in chunk_page_text(&page.text, config) {
            records.push(ChunkRecord {
                id: ChunkId::new(doc_id, ordinal),
                doc_id: doc_id.clone(),
                page_number: page.page_number,
                token_estimate: piece.text.chars().count().div_ceil(4),
                text: piece.text,
                start_offset: piece.start_offset,
                end_offset: piece.end_offset,
            });
            ordinal += 1;
        }
    }

    Ok(records)
}

/// A chunk cut from a single page, before id assignment.
#[derive(Debug, Clone, PartialEq)]
struct PagePiece {
    text: String,
    start_offset: usize,
    end_offset: usize,
}

/// Slides the window over one page's text.
fn chunk_page_text(text: &str, config: &ChunkingConfig) -> Vec<PagePiece> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let overlap = config.overlap_chars();

    let mut pieces = Vec::new();
    let mut pos = 0usize;

    while pos < n {
        let window_end = (pos + config.chunk_size).min(n);
        // The final window swallows the remaining text whole; boundary
        // adjustment only applies when text continues past the window.
        let cut = if window_end < n {
            adjusted_cut(&chars, pos, window_end)
        } else {
            window_end
        };

        let piece_text: String = chars[pos..cut].iter().collect();
        let trimmed = piece_text.trim();
        if !trimmed.is_empty() {
            pieces.push(PagePiece {
                text: trimmed.to_string(),
                start_offset: pos,
                end_offset: cut,
            });
        }

        if cut >= n {
            break;
        }

        let next = cut.saturating_sub(overlap);
        pos = if next > pos { next } else { cut };
    }

    pieces
}

/// Picks the cut point for the window `[pos, window_end)`.
///
/// Searches only the last [`BOUNDARY_SEARCH_CHARS`] characters of the
/// window, applying the first rule that fires:
///
/// 1. sentence punctuation followed by whitespace, cut after the
///    punctuation;
/// 2. paragraph break (`"\n\n"`), cut after it;
/// 3. any whitespace, cut after it;
/// 4. the raw window end.
fn adjusted_cut(chars: &[char], pos: usize, window_end: usize) -> usize {
    let search_start = window_end.saturating_sub(BOUNDARY_SEARCH_CHARS).max(pos);

    // Rule 1: last sentence end.
    for idx in (search_start..window_end).rev() {
        if matches!(chars[idx], '.' | '!' | '?') {
            if let Some(next) = chars.get(idx + 1) {
                if next.is_whitespace() {
                    return idx + 1;
                }
            }
        }
    }

    // Rule 2: last paragraph break.
    for idx in (search_start + 1..window_end).rev() {
        if chars[idx] == '\n' && chars[idx - 1] == '\n' {
            return idx + 1;
        }
    }

    // Rule 3: last whitespace.
    for idx in (search_start..window_end).rev() {
        if chars[idx].is_whitespace() {
            return idx + 1;
        }
    }

    window_end
}
