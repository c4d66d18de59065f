//! Object store abstraction for all persisted state.
//!
//! The store is the only shared mutable resource in the engine. It owns
//! the named collections of the persisted schema: `docs`, `chunks` (with a
//! secondary index on the owning document), `vectors`, `file_blobs`,
//! `notes`, the `lexical_index` singleton, and free-form `metadata`.
//!
//! Two implementations are provided:
//!
//! - [`InMemoryObjectStore`] — `BTreeMap`-backed, deterministic iteration
//!   order, used by tests and ephemeral sessions.
//! - [`RedbObjectStore`] — redb-backed ACID persistence for real corpora.

mod redb_store;

pub use redb_store::RedbObjectStore;

use crate::index::lexical::LexicalSnapshot;
use crate::types::{ChunkId, ChunkRecord, DocId, DocRecord, NoteRecord};
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

/// Current persisted-schema version.
///
/// Bumping this value resets the derived collections (vectors and the
/// lexical snapshot) on next open; source collections are only ever
/// extended, never rewritten in place.
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata key holding the schema version.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Errors raised by object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// I/O failure
    #[error("I/O error: {0}")]
    IoError(String),
    /// Record failed to (de)serialize
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Backend database failure
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Key/value object store over the persisted schema.
///
/// Writes are serialized by the implementation; readers observe committed
/// state only. `all_chunks` and `iter_vectors` MUST iterate in ascending
/// key order so that corpus-wide rebuilds are deterministic across runs.
#[async_trait::async_trait(?Send)]
pub trait ObjectStore {
    // =========================================================================
    // Documents
    // =========================================================================

    /// Retrieves a document by id, `Ok(None)` if absent.
    async fn get_doc(&self, id: &DocId) -> Result<Option<DocRecord>, StoreError>;

    /// Inserts or replaces a document.
    async fn put_doc(&self, doc: &DocRecord) -> Result<(), StoreError>;

    /// Deletes a document row. Does not cascade; the engine owns cascade
    /// ordering.
    async fn delete_doc(&self, id: &DocId) -> Result<(), StoreError>;

    /// Lists every document in ascending id order.
    async fn list_docs(&self) -> Result<Vec<DocRecord>, StoreError>;

    /// Number of persisted documents.
    async fn doc_count(&self) -> Result<usize, StoreError>;

    // =========================================================================
    // Chunks
    // =========================================================================

    /// Retrieves a chunk by id, `Ok(None)` if absent.
    async fn get_chunk(&self, id: &ChunkId) -> Result<Option<ChunkRecord>, StoreError>;

    /// Inserts or replaces a chunk, maintaining the doc-id secondary index.
    async fn put_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError>;

    /// Deletes a chunk and its secondary-index entry.
    async fn delete_chunk(&self, id: &ChunkId) -> Result<(), StoreError>;

    /// All chunks belonging to one document, ascending id order.
    async fn chunks_for_doc(&self, doc_id: &DocId) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Every persisted chunk in ascending id order.
    async fn all_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Number of persisted chunks.
    async fn chunk_count(&self) -> Result<usize, StoreError>;

    // =========================================================================
    // Vectors
    // =========================================================================

    /// Retrieves the embedding for a chunk, `Ok(None)` if absent.
    async fn get_vector(&self, id: &ChunkId) -> Result<Option<Vec<f32>>, StoreError>;

    /// Inserts or replaces the embedding for a chunk.
    async fn put_vector(&self, id: &ChunkId, embedding: &[f32]) -> Result<(), StoreError>;

    /// Deletes the embedding for a chunk.
    async fn delete_vector(&self, id: &ChunkId) -> Result<(), StoreError>;

    /// Every persisted `(chunk id, embedding)` pair in ascending key order.
    async fn iter_vectors(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError>;

    /// Number of persisted vectors.
    async fn vector_count(&self) -> Result<usize, StoreError>;

    /// Drops every persisted vector (embedder swap, breaking migration).
    async fn clear_vectors(&self) -> Result<(), StoreError>;

    // =========================================================================
    // Blobs
    // =========================================================================

    /// Retrieves the raw original bytes for a document, `Ok(None)` if absent.
    async fn get_blob(&self, doc_id: &DocId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores the raw original bytes for a document.
    async fn put_blob(&self, doc_id: &DocId, bytes: &[u8]) -> Result<(), StoreError>;

    /// Deletes the raw bytes for a document.
    async fn delete_blob(&self, doc_id: &DocId) -> Result<(), StoreError>;

    // =========================================================================
    // Lexical snapshot (singleton)
    // =========================================================================

    /// Loads the persisted lexical snapshot, `Ok(None)` if absent.
    async fn get_lexical_snapshot(&self) -> Result<Option<LexicalSnapshot>, StoreError>;

    /// Atomically replaces the lexical snapshot.
    async fn put_lexical_snapshot(&self, snapshot: &LexicalSnapshot) -> Result<(), StoreError>;

    /// Deletes the lexical snapshot.
    async fn delete_lexical_snapshot(&self) -> Result<(), StoreError>;

    // =========================================================================
    // Notes
    // =========================================================================

    /// Retrieves a note by id, `Ok(None)` if absent.
    async fn get_note(&self, id: &str) -> Result<Option<NoteRecord>, StoreError>;

    /// Inserts or replaces a note.
    async fn put_note(&self, note: &NoteRecord) -> Result<(), StoreError>;

    /// Deletes a note.
    async fn delete_note(&self, id: &str) -> Result<(), StoreError>;

    /// Lists every note in ascending id order.
    async fn list_notes(&self) -> Result<Vec<NoteRecord>, StoreError>;

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Retrieves a free-form metadata value, `Ok(None)` if absent.
    async fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Inserts or replaces a metadata value.
    async fn put_metadata(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Deletes a metadata value.
    async fn delete_metadata(&self, key: &str) -> Result<(), StoreError>;

    // =========================================================================
    // Utility
    // =========================================================================

    /// Clears every collection. Used by the reset entry point.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory object store.
///
/// Backed by `BTreeMap`s so iteration order matches the persistent
/// backend's ascending key order, keeping rebuilds deterministic in tests.
#[derive(Default)]
pub struct InMemoryObjectStore {
    docs: RwLock<BTreeMap<String, DocRecord>>,
    chunks: RwLock<BTreeMap<String, ChunkRecord>>,
    vectors: RwLock<BTreeMap<String, Vec<f32>>>,
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    notes: RwLock<BTreeMap<String, NoteRecord>>,
    lexical: RwLock<Option<LexicalSnapshot>>,
    metadata: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::DatabaseError(format!("Lock poisoned: {e}"))
}

#[async_trait::async_trait(?Send)]
impl ObjectStore for InMemoryObjectStore {
    async fn get_doc(&self, id: &DocId) -> Result<Option<DocRecord>, StoreError> {
        let docs = self.docs.read().map_err(lock_err)?;
        Ok(docs.get(id.as_str()).cloned())
    }

    async fn put_doc(&self, doc: &DocRecord) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(lock_err)?;
        docs.insert(doc.id.as_str().to_string(), doc.clone());
        Ok(())
    }

    async fn delete_doc(&self, id: &DocId) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(lock_err)?;
        docs.remove(id.as_str());
        Ok(())
    }

    async fn list_docs(&self) -> Result<Vec<DocRecord>, StoreError> {
        let docs = self.docs.read().map_err(lock_err)?;
        Ok(docs.values().cloned().collect())
    }

    async fn doc_count(&self) -> Result<usize, StoreError> {
        let docs = self.docs.read().map_err(lock_err)?;
        Ok(docs.len())
    }

    async fn get_chunk(&self, id: &ChunkId) -> Result<Option<ChunkRecord>, StoreError> {
        let chunks = self.chunks.read().map_err(lock_err)?;
        Ok(chunks.get(id.as_str()).cloned())
    }

    async fn put_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        let mut chunks = self.chunks.write().map_err(lock_err)?;
        chunks.insert(chunk.id.as_str().to_string(), chunk.clone());
        Ok(())
    }

    async fn delete_chunk(&self, id: &ChunkId) -> Result<(), StoreError> {
        let mut chunks = self.chunks.write().map_err(lock_err)?;
        chunks.remove(id.as_str());
        Ok(())
    }

    async fn chunks_for_doc(&self, doc_id: &DocId) -> Result<Vec<ChunkRecord>, StoreError> {
        let chunks = self.chunks.read().map_err(lock_err)?;
        Ok(chunks
            .values()
            .filter(|c| &c.doc_id == doc_id)
            .cloned()
            .collect())
    }

    async fn all_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError> {
        let chunks = self.chunks.read().map_err(lock_err)?;
        Ok(chunks.values().cloned().collect())
    }

    async fn chunk_count(&self) -> Result<usize, StoreError> {
        let chunks = self.chunks.read().map_err(lock_err)?;
        Ok(chunks.len())
    }

    async fn get_vector(&self, id: &ChunkId) -> Result<Option<Vec<f32>>, StoreError> {
        let vectors = self.vectors.read().map_err(lock_err)?;
        Ok(vectors.get(id.as_str()).cloned())
    }

    async fn put_vector(&self, id: &ChunkId, embedding: &[f32]) -> Result<(), StoreError> {
        let mut vectors = self.vectors.write().map_err(lock_err)?;
        vectors.insert(id.as_str().to_string(), embedding.to_vec());
        Ok(())
    }

    async fn delete_vector(&self, id: &ChunkId) -> Result<(), StoreError> {
        let mut vectors = self.vectors.write().map_err(lock_err)?;
        vectors.remove(id.as_str());
        Ok(())
    }

    async fn iter_vectors(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError> {
        let vectors = self.vectors.read().map_err(lock_err)?;
        Ok(vectors
            .iter()
            .map(|(id, v)| (ChunkId::from_raw(id.clone()), v.clone()))
            .collect())
    }

    async fn vector_count(&self) -> Result<usize, StoreError> {
        let vectors = self.vectors.read().map_err(lock_err)?;
        Ok(vectors.len())
    }

    async fn clear_vectors(&self) -> Result<(), StoreError> {
        let mut vectors = self.vectors.write().map_err(lock_err)?;
        vectors.clear();
        Ok(())
    }

    async fn get_blob(&self, doc_id: &DocId) -> Result<Option<Vec<u8>>, StoreError> {
        let blobs = self.blobs.read().map_err(lock_err)?;
        Ok(blobs.get(doc_id.as_str()).cloned())
    }

    async fn put_blob(&self, doc_id: &DocId, bytes: &[u8]) -> Result<(), StoreError> {
        let mut blobs = self.blobs.write().map_err(lock_err)?;
        blobs.insert(doc_id.as_str().to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete_blob(&self, doc_id: &DocId) -> Result<(), StoreError> {
        let mut blobs = self.blobs.write().map_err(lock_err)?;
        blobs.remove(doc_id.as_str());
        Ok(())
    }

    async fn get_lexical_snapshot(&self) -> Result<Option<LexicalSnapshot>, StoreError> {
        let lexical = self.lexical.read().map_err(lock_err)?;
        Ok(lexical.clone())
    }

    async fn put_lexical_snapshot(&self, snapshot: &LexicalSnapshot) -> Result<(), StoreError> {
        let mut lexical = self.lexical.write().map_err(lock_err)?;
        *lexical = Some(snapshot.clone());
        Ok(())
    }

    async fn delete_lexical_snapshot(&self) -> Result<(), StoreError> {
        let mut lexical = self.lexical.write().map_err(lock_err)?;
        *lexical = None;
        Ok(())
    }

    async fn get_note(&self, id: &str) -> Result<Option<NoteRecord>, StoreError> {
        let notes = self.notes.read().map_err(lock_err)?;
        Ok(notes.get(id).cloned())
    }

    async fn put_note(&self, note: &NoteRecord) -> Result<(), StoreError> {
        let mut notes = self.notes.write().map_err(lock_err)?;
        notes.insert(note.id.clone(), note.clone());
        Ok(())
    }

    async fn delete_note(&self, id: &str) -> Result<(), StoreError> {
        let mut notes = self.notes.write().map_err(lock_err)?;
        notes.remove(id);
        Ok(())
    }

    async fn list_notes(&self) -> Result<Vec<NoteRecord>, StoreError> {
        let notes = self.notes.read().map_err(lock_err)?;
        Ok(notes.values().cloned().collect())
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let metadata = self.metadata.read().map_err(lock_err)?;
        Ok(metadata.get(key).cloned())
    }

    async fn put_metadata(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut metadata = self.metadata.write().map_err(lock_err)?;
        metadata.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete_metadata(&self, key: &str) -> Result<(), StoreError> {
        let mut metadata = self.metadata.write().map_err(lock_err)?;
        metadata.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.docs.write().map_err(lock_err)?.clear();
        self.chunks.write().map_err(lock_err)?.clear();
        self.vectors.write().map_err(lock_err)?.clear();
        self.blobs.write().map_err(lock_err)?.clear();
        self.notes.write().map_err(lock_err)?.clear();
        *self.lexical.write().map_err(lock_err)? = None;
        self.metadata.write().map_err(lock_err)?.clear();
        Ok(())
    }
}
