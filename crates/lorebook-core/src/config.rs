//! Engine configuration, presets, and versioned persistence.
//!
//! The live [`RagConfig`] names one strategy per pipeline stage plus its
//! parameters. It persists in the store's `metadata` collection stamped
//! with [`CONFIG_SCHEMA_VERSION`]; a stored config with a different
//! version is discarded in favor of defaults. Exported configs carry the
//! same version stamp and round-trip through import without loss.

use crate::chunking::ChunkingConfig;
use serde::{Deserialize, Serialize};

/// Version stamp for persisted and exported configs.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Metadata key the config persists under.
pub const CONFIG_METADATA_KEY: &str = "config";

/// Allowed `top_k` range.
pub const MIN_TOP_K: usize = 1;
/// Allowed `top_k` range.
pub const MAX_TOP_K: usize = 30;

fn default_deadline_ms() -> u64 {
    120_000
}

/// Chunking stage selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingSelection {
    /// Chunker strategy id
    pub strategy: String,
    /// Window size in characters
    pub chunk_size: usize,
    /// Overlap percentage
    pub overlap_percent: u32,
}

impl ChunkingSelection {
    /// The parameter struct handed to the chunker.
    pub fn params(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            overlap_percent: self.overlap_percent,
        }
    }
}

/// Retrieval stage selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSelection {
    /// Retriever strategy id (`lexical`, `semantic`, `hybrid`)
    pub strategy: String,
    /// Result count, within [1, 30]
    pub top_k: usize,
    /// Semantic weight for hybrid fusion, within [0, 1]
    pub alpha: f32,
}

/// Generation stage selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSelection {
    /// Generator strategy id
    pub strategy: String,
    /// Token budget for the answer
    pub max_tokens: usize,
}

/// The live engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunking selection
    pub chunking: ChunkingSelection,
    /// Embedder id
    pub embedding: String,
    /// Retrieval selection
    pub retrieval: RetrievalSelection,
    /// Generation selection
    pub generation: GenerationSelection,
    /// Enabled post-processor ids, applied in order
    pub post_process: Vec<String>,
    /// Deadline for embedder/model initialization in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub model_init_deadline_ms: u64,
}

/// Named configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Lexical-only retrieval, larger chunks, no post-processing
    Fast,
    /// Hybrid retrieval with balanced fusion
    Balanced,
    /// Hybrid retrieval weighted toward semantic, smaller chunks
    Accurate,
}

impl Preset {
    /// Parses a preset name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fast" => Some(Preset::Fast),
            "balanced" => Some(Preset::Balanced),
            "accurate" => Some(Preset::Accurate),
            _ => None,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self::preset(Preset::Balanced)
    }
}

impl RagConfig {
    /// Builds the named preset.
    pub fn preset(preset: Preset) -> Self {
        let base = |chunk_size, overlap_percent, strategy: &str, top_k, alpha, polish| Self {
            chunking: ChunkingSelection {
                strategy: "sentence-window".to_string(),
                chunk_size,
                overlap_percent,
            },
            embedding: "hash-256".to_string(),
            retrieval: RetrievalSelection {
                strategy: strategy.to_string(),
                top_k,
                alpha,
            },
            generation: GenerationSelection {
                strategy: "simple-extractive".to_string(),
                max_tokens: 256,
            },
            post_process: if polish {
                vec!["polish".to_string()]
            } else {
                Vec::new()
            },
            model_init_deadline_ms: default_deadline_ms(),
        };

        match preset {
            Preset::Fast => base(500, 10, "lexical", 5, 0.5, false),
            Preset::Balanced => base(400, 12, "hybrid", 10, 0.5, true),
            Preset::Accurate => base(300, 15, "hybrid", 15, 0.7, true),
        }
    }

    /// Validates parameter ranges (strategy ids are validated against the
    /// engine's registries separately).
    pub fn validate_ranges(&self) -> Result<(), String> {
        self.chunking
            .params()
            .validate()
            .map_err(|e| e.to_string())?;
        if !(MIN_TOP_K..=MAX_TOP_K).contains(&self.retrieval.top_k) {
            return Err(format!(
                "top_k {} outside [{MIN_TOP_K}, {MAX_TOP_K}]",
                self.retrieval.top_k
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.alpha) {
            return Err(format!("alpha {} outside [0, 1]", self.retrieval.alpha));
        }
        if self.generation.max_tokens == 0 {
            return Err("max_tokens must be positive".to_string());
        }
        Ok(())
    }

    /// Serializes for persistence in store metadata.
    pub fn to_persisted_bytes(&self) -> Vec<u8> {
        let versioned = VersionedConfig {
            version: CONFIG_SCHEMA_VERSION,
            config: self.clone(),
        };
        serde_json::to_vec(&versioned).unwrap_or_default()
    }

    /// Deserializes a persisted config.
    ///
    /// Returns `None` on parse failure or version mismatch; callers fall
    /// back to defaults.
    pub fn from_persisted_bytes(bytes: &[u8]) -> Option<Self> {
        let versioned: VersionedConfig = serde_json::from_slice(bytes).ok()?;
        (versioned.version == CONFIG_SCHEMA_VERSION).then_some(versioned.config)
    }

    /// Exports the config as pretty JSON with its version stamp.
    pub fn export_json(&self) -> String {
        let versioned = VersionedConfig {
            version: CONFIG_SCHEMA_VERSION,
            config: self.clone(),
        };
        serde_json::to_string_pretty(&versioned).unwrap_or_default()
    }

    /// Imports a previously exported config.
    pub fn import_json(json: &str) -> Result<Self, String> {
        let versioned: VersionedConfig =
            serde_json::from_str(json).map_err(|e| format!("invalid config JSON: {e}"))?;
        if versioned.version != CONFIG_SCHEMA_VERSION {
            return Err(format!(
                "config version {} does not match {}",
                versioned.version, CONFIG_SCHEMA_VERSION
            ));
        }
        versioned.config.validate_ranges()?;
        Ok(versioned.config)
    }
}

#[derive(Serialize, Deserialize)]
struct VersionedConfig {
    version: u32,
    config: RagConfig,
}
