//! Redb-backed object store.
//!
//! Uses [redb](https://github.com/cberner/redb), a pure Rust ACID embedded
//! B-tree database. One table per collection, plus a multimap secondary
//! index from document id to chunk ids so document cascades avoid a full
//! chunk scan.
//!
//! # Tables
//!
//! - `docs`: doc id -> DocRecord (JSON)
//! - `chunks`: chunk id -> ChunkRecord (JSON)
//! - `chunks_by_doc`: doc id ->> chunk id (multimap index)
//! - `vectors`: chunk id -> embedding (raw little-endian f32 bytes)
//! - `file_blobs`: doc id -> original bytes
//! - `notes`: note id -> NoteRecord (JSON)
//! - `lexical_index`: singleton key -> LexicalSnapshot (JSON)
//! - `metadata`: key -> value bytes
//!
//! The schema version lives in `metadata`; a version mismatch on open
//! resets the derived collections (vectors, lexical snapshot) and stamps
//! the current version, leaving source collections untouched.

use super::{ObjectStore, StoreError, SCHEMA_VERSION, SCHEMA_VERSION_KEY};
use crate::index::lexical::LexicalSnapshot;
use crate::types::{ChunkId, ChunkRecord, DocId, DocRecord, NoteRecord};
use redb::{
    Database, MultimapTableDefinition, ReadableTable,
    ReadableTableMetadata, TableDefinition,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const DOCS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("docs");
const CHUNKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
const CHUNKS_BY_DOC: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("chunks_by_doc");
const VECTORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");
const BLOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("file_blobs");
const NOTES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("notes");
const LEXICAL_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("lexical_index");
const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// The singleton key under which the lexical snapshot is stored.
const LEXICAL_SNAPSHOT_KEY: &str = "snapshot";

fn db_err(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::DatabaseError(format!("{context}: {e}"))
}

fn ser_err(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::SerializationError(format!("{context}: {e}"))
}

/// Serializes an embedding as packed little-endian f32 bytes.
///
/// Embeddings are large enough (hundreds of dimensions, 4 bytes each) that
/// JSON overhead is not worth paying. Endianness MUST match
/// `deserialize_embedding`.
fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Deserializes an embedding from packed little-endian f32 bytes.
fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Redb-backed object store for persistent corpora.
pub struct RedbObjectStore {
    db: Arc<Database>,
}

impl RedbObjectStore {
    /// Opens or creates the database at `path`, ensuring all tables exist
    /// and the schema version matches.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| db_err("Failed to open database", e))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;

        for table in [
            DOCS_TABLE,
            CHUNKS_TABLE,
            VECTORS_TABLE,
            BLOBS_TABLE,
            NOTES_TABLE,
            LEXICAL_TABLE,
            METADATA_TABLE,
        ] {
            write_txn
                .open_table(table)
                .map_err(|e| db_err("Failed to create table", e))?;
        }
        write_txn
            .open_multimap_table(CHUNKS_BY_DOC)
            .map_err(|e| db_err("Failed to create chunks_by_doc index", e))?;

        // Schema version check: derived collections are reset on mismatch,
        // source collections are never rewritten.
        let stored_version: Option<u32> = {
            let metadata = write_txn
                .open_table(METADATA_TABLE)
                .map_err(|e| db_err("Failed to open metadata table", e))?;
            let version = match metadata.get(SCHEMA_VERSION_KEY) {
                Ok(Some(guard)) => serde_json::from_slice(guard.value()).ok(),
                Ok(None) => None,
                Err(e) => return Err(db_err("Failed to read schema version", e)),
            };
            version
        };

        match stored_version {
            Some(v) if v == SCHEMA_VERSION => {}
            other => {
                if let Some(v) = other {
                    warn!(
                        stored = v,
                        current = SCHEMA_VERSION,
                        "Schema version mismatch, resetting derived collections"
                    );
                    for table in [VECTORS_TABLE, LEXICAL_TABLE] {
                        write_txn
                            .delete_table(table)
                            .map_err(|e| db_err("Failed to reset table", e))?;
                        write_txn
                            .open_table(table)
                            .map_err(|e| db_err("Failed to recreate table", e))?;
                    }
                } else {
                    info!(version = SCHEMA_VERSION, "Stamping fresh store");
                }
                let version_bytes = serde_json::to_vec(&SCHEMA_VERSION)
                    .map_err(|e| ser_err("Failed to serialize schema version", e))?;
                let mut metadata = write_txn
                    .open_table(METADATA_TABLE)
                    .map_err(|e| db_err("Failed to open metadata table", e))?;
                metadata
                    .insert(SCHEMA_VERSION_KEY, version_bytes.as_slice())
                    .map_err(|e| db_err("Failed to write schema version", e))?;
            }
        }

        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit open", e))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn get_raw(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_err("Failed to begin read transaction", e))?;
        let t = read_txn
            .open_table(table)
            .map_err(|e| db_err("Failed to open table", e))?;
        match t.get(key) {
            Ok(Some(guard)) => Ok(Some(guard.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err("Failed to read key", e)),
        }
    }

    fn put_raw(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;
        {
            let mut t = write_txn
                .open_table(table)
                .map_err(|e| db_err("Failed to open table", e))?;
            t.insert(key, value)
                .map_err(|e| db_err("Failed to insert key", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit write", e))
    }

    fn remove_raw(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;
        {
            let mut t = write_txn
                .open_table(table)
                .map_err(|e| db_err("Failed to open table", e))?;
            t.remove(key)
                .map_err(|e| db_err("Failed to remove key", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit delete", e))
    }

    fn iter_raw(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_err("Failed to begin read transaction", e))?;
        let t = read_txn
            .open_table(table)
            .map_err(|e| db_err("Failed to open table", e))?;
        let iter = t
            .iter()
            .map_err(|e| db_err("Failed to iterate table", e))?;

        let mut entries = Vec::new();
        for result in iter {
            let (key, value) = result.map_err(|e| db_err("Failed to read entry", e))?;
            entries.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(entries)
    }

    fn count_raw(&self, table: TableDefinition<&str, &[u8]>) -> Result<usize, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_err("Failed to begin read transaction", e))?;
        let t = read_txn
            .open_table(table)
            .map_err(|e| db_err("Failed to open table", e))?;
        let len = t.len().map_err(|e| db_err("Failed to count table", e))?;
        Ok(len as usize)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get_raw(table, key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ser_err("Failed to deserialize record", e)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ser_err("Failed to serialize record", e))?;
        self.put_raw(table, key, &bytes)
    }
}

#[async_trait::async_trait(?Send)]
impl ObjectStore for RedbObjectStore {
    async fn get_doc(&self, id: &DocId) -> Result<Option<DocRecord>, StoreError> {
        self.get_json(DOCS_TABLE, id.as_str())
    }

    async fn put_doc(&self, doc: &DocRecord) -> Result<(), StoreError> {
        self.put_json(DOCS_TABLE, doc.id.as_str(), doc)
    }

    async fn delete_doc(&self, id: &DocId) -> Result<(), StoreError> {
        self.remove_raw(DOCS_TABLE, id.as_str())
    }

    async fn list_docs(&self) -> Result<Vec<DocRecord>, StoreError> {
        let mut docs = Vec::new();
        for (_, bytes) in self.iter_raw(DOCS_TABLE)? {
            let doc = serde_json::from_slice(&bytes)
                .map_err(|e| ser_err("Failed to deserialize doc", e))?;
            docs.push(doc);
        }
        Ok(docs)
    }

    async fn doc_count(&self) -> Result<usize, StoreError> {
        self.count_raw(DOCS_TABLE)
    }

    async fn get_chunk(&self, id: &ChunkId) -> Result<Option<ChunkRecord>, StoreError> {
        self.get_json(CHUNKS_TABLE, id.as_str())
    }

    async fn put_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(chunk)
            .map_err(|e| ser_err("Failed to serialize chunk", e))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;
        {
            let mut chunks = write_txn
                .open_table(CHUNKS_TABLE)
                .map_err(|e| db_err("Failed to open chunks table", e))?;
            chunks
                .insert(chunk.id.as_str(), bytes.as_slice())
                .map_err(|e| db_err("Failed to insert chunk", e))?;

            let mut index = write_txn
                .open_multimap_table(CHUNKS_BY_DOC)
                .map_err(|e| db_err("Failed to open chunks_by_doc index", e))?;
            index
                .insert(chunk.doc_id.as_str(), chunk.id.as_str())
                .map_err(|e| db_err("Failed to index chunk", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit chunk", e))
    }

    async fn delete_chunk(&self, id: &ChunkId) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;
        {
            let mut chunks = write_txn
                .open_table(CHUNKS_TABLE)
                .map_err(|e| db_err("Failed to open chunks table", e))?;
            let removed: Option<ChunkRecord> = match chunks.remove(id.as_str()) {
                Ok(Some(guard)) => serde_json::from_slice(guard.value()).ok(),
                Ok(None) => None,
                Err(e) => return Err(db_err("Failed to remove chunk", e)),
            };

            if let Some(chunk) = removed {
                let mut index = write_txn
                    .open_multimap_table(CHUNKS_BY_DOC)
                    .map_err(|e| db_err("Failed to open chunks_by_doc index", e))?;
                index
                    .remove(chunk.doc_id.as_str(), id.as_str())
                    .map_err(|e| db_err("Failed to unindex chunk", e))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit chunk deletion", e))
    }

    async fn chunks_for_doc(&self, doc_id: &DocId) -> Result<Vec<ChunkRecord>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_err("Failed to begin read transaction", e))?;
        let index = read_txn
            .open_multimap_table(CHUNKS_BY_DOC)
            .map_err(|e| db_err("Failed to open chunks_by_doc index", e))?;
        let chunks_table = read_txn
            .open_table(CHUNKS_TABLE)
            .map_err(|e| db_err("Failed to open chunks table", e))?;

        let mut chunks = Vec::new();
        let values = index
            .get(doc_id.as_str())
            .map_err(|e| db_err("Failed to read index", e))?;
        for value in values {
            let guard = value.map_err(|e| db_err("Failed to read index entry", e))?;
            let chunk_id = guard.value();
            if let Some(chunk_guard) = chunks_table
                .get(chunk_id)
                .map_err(|e| db_err("Failed to read chunk", e))?
            {
                let chunk = serde_json::from_slice(chunk_guard.value())
                    .map_err(|e| ser_err("Failed to deserialize chunk", e))?;
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    async fn all_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut chunks = Vec::new();
        for (_, bytes) in self.iter_raw(CHUNKS_TABLE)? {
            let chunk = serde_json::from_slice(&bytes)
                .map_err(|e| ser_err("Failed to deserialize chunk", e))?;
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    async fn chunk_count(&self) -> Result<usize, StoreError> {
        self.count_raw(CHUNKS_TABLE)
    }

    async fn get_vector(&self, id: &ChunkId) -> Result<Option<Vec<f32>>, StoreError> {
        Ok(self
            .get_raw(VECTORS_TABLE, id.as_str())?
            .map(|bytes| deserialize_embedding(&bytes)))
    }

    async fn put_vector(&self, id: &ChunkId, embedding: &[f32]) -> Result<(), StoreError> {
        self.put_raw(VECTORS_TABLE, id.as_str(), &serialize_embedding(embedding))
    }

    async fn delete_vector(&self, id: &ChunkId) -> Result<(), StoreError> {
        self.remove_raw(VECTORS_TABLE, id.as_str())
    }

    async fn iter_vectors(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError> {
        Ok(self
            .iter_raw(VECTORS_TABLE)?
            .into_iter()
            .map(|(key, bytes)| (ChunkId::from_raw(key), deserialize_embedding(&bytes)))
            .collect())
    }

    async fn vector_count(&self) -> Result<usize, StoreError> {
        self.count_raw(VECTORS_TABLE)
    }

    async fn clear_vectors(&self) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;
        write_txn
            .delete_table(VECTORS_TABLE)
            .map_err(|e| db_err("Failed to drop vectors table", e))?;
        write_txn
            .open_table(VECTORS_TABLE)
            .map_err(|e| db_err("Failed to recreate vectors table", e))?;
        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit vector clear", e))
    }

    async fn get_blob(&self, doc_id: &DocId) -> Result<Option<Vec<u8>>, StoreError> {
        self.get_raw(BLOBS_TABLE, doc_id.as_str())
    }

    async fn put_blob(&self, doc_id: &DocId, bytes: &[u8]) -> Result<(), StoreError> {
        self.put_raw(BLOBS_TABLE, doc_id.as_str(), bytes)
    }

    async fn delete_blob(&self, doc_id: &DocId) -> Result<(), StoreError> {
        self.remove_raw(BLOBS_TABLE, doc_id.as_str())
    }

    async fn get_lexical_snapshot(&self) -> Result<Option<LexicalSnapshot>, StoreError> {
        self.get_json(LEXICAL_TABLE, LEXICAL_SNAPSHOT_KEY)
    }

    async fn put_lexical_snapshot(&self, snapshot: &LexicalSnapshot) -> Result<(), StoreError> {
        self.put_json(LEXICAL_TABLE, LEXICAL_SNAPSHOT_KEY, snapshot)
    }

    async fn delete_lexical_snapshot(&self) -> Result<(), StoreError> {
        self.remove_raw(LEXICAL_TABLE, LEXICAL_SNAPSHOT_KEY)
    }

    async fn get_note(&self, id: &str) -> Result<Option<NoteRecord>, StoreError> {
        self.get_json(NOTES_TABLE, id)
    }

    async fn put_note(&self, note: &NoteRecord) -> Result<(), StoreError> {
        self.put_json(NOTES_TABLE, &note.id, note)
    }

    async fn delete_note(&self, id: &str) -> Result<(), StoreError> {
        self.remove_raw(NOTES_TABLE, id)
    }

    async fn list_notes(&self) -> Result<Vec<NoteRecord>, StoreError> {
        let mut notes = Vec::new();
        for (_, bytes) in self.iter_raw(NOTES_TABLE)? {
            let note = serde_json::from_slice(&bytes)
                .map_err(|e| ser_err("Failed to deserialize note", e))?;
            notes.push(note);
        }
        Ok(notes)
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.get_raw(METADATA_TABLE, key)
    }

    async fn put_metadata(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.put_raw(METADATA_TABLE, key, value)
    }

    async fn delete_metadata(&self, key: &str) -> Result<(), StoreError> {
        self.remove_raw(METADATA_TABLE, key)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;

        for table in [
            DOCS_TABLE,
            CHUNKS_TABLE,
            VECTORS_TABLE,
            BLOBS_TABLE,
            NOTES_TABLE,
            LEXICAL_TABLE,
            METADATA_TABLE,
        ] {
            write_txn
                .delete_table(table)
                .map_err(|e| db_err("Failed to drop table", e))?;
            write_txn
                .open_table(table)
                .map_err(|e| db_err("Failed to recreate table", e))?;
        }
        write_txn
            .delete_multimap_table(CHUNKS_BY_DOC)
            .map_err(|e| db_err("Failed to drop chunks_by_doc index", e))?;
        write_txn
            .open_multimap_table(CHUNKS_BY_DOC)
            .map_err(|e| db_err("Failed to recreate chunks_by_doc index", e))?;

        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit clear", e))
    }
}
