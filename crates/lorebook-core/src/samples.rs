//! First-run sample corpus.
//!
//! Seeds a small starter corpus exactly once: only when the corpus is
//! empty AND the seeded flag is unset. Setting the flag is a postcondition
//! of seeding, so a user who deletes the samples is not re-seeded.

use crate::types::{DocKind, IngestInput};

/// Metadata flag set once samples have been ingested.
pub const SAMPLE_SEEDED_KEY: &str = "sample_seeded";

const SAMPLE_RETRIEVAL: &str = "\
# How Retrieval Works

Lorebook answers questions from your own documents. Every file you add is \
split into overlapping chunks, and each chunk is indexed twice: once for \
keyword search and once for semantic search.

Keyword search uses the BM25 ranking function over chunk text. It rewards \
chunks where your query terms appear often, and discounts terms that are \
common across the whole corpus. Semantic search embeds each chunk as a \
vector and ranks chunks by cosine similarity to the embedded query.

Hybrid mode combines both rankings. Scores from each ranker are \
normalized to a common scale and blended with an adjustable semantic \
weight, so exact phrases and paraphrases both surface.
";

const SAMPLE_CITATIONS: &str = "\
# Citations and Answers

Every answer Lorebook produces is extractive: it is stitched together \
from sentences that appear verbatim in your documents. Each retrieved \
passage becomes a citation carrying the document name, the page number, \
and the passage text, so you can always trace an answer back to its \
source.

Nothing leaves your device. Documents, indexes, and embeddings all live \
in a local database, and deleting a document removes its chunks, its \
vectors, and its stored bytes together.
";

const SAMPLE_TUNING: &str = "\
Presets trade speed for quality. The fast preset uses larger chunks and \
keyword-only retrieval, which needs no embedding work at all. The \
balanced preset enables hybrid retrieval with an even blend. The accurate \
preset shrinks chunks, raises the semantic weight, and returns more \
passages per query.

You can also tune each knob directly: chunk size, chunk overlap, result \
count, and the semantic weight all accept explicit values within their \
documented ranges.
";

/// The embedded starter documents.
pub fn sample_inputs() -> Vec<IngestInput> {
    vec![
        IngestInput {
            name: "how-retrieval-works.md".to_string(),
            kind: DocKind::Md,
            bytes: SAMPLE_RETRIEVAL.as_bytes().to_vec(),
        },
        IngestInput {
            name: "citations-and-answers.md".to_string(),
            kind: DocKind::Md,
            bytes: SAMPLE_CITATIONS.as_bytes().to_vec(),
        },
        IngestInput {
            name: "tuning-presets.txt".to_string(),
            kind: DocKind::Txt,
            bytes: SAMPLE_TUNING.as_bytes().to_vec(),
        },
    ]
}
