//! Fixed-size chunking of the extracted entity sequence.
//!
//! Chunks partition the sequence exactly: nothing duplicated, nothing
//! dropped, extraction order preserved inside each chunk. All chunks hold
//! `chunk_size` entities except possibly the last.

use super::entity::Entity;

/// A contiguous, ordered slice of the extracted entity sequence,
/// processed as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: usize,
    pub entities: Vec<Entity>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Index of this chunk's first entity in the extraction sequence.
    pub fn start_index(&self, chunk_size: usize) -> usize {
        self.id * chunk_size
    }
}

/// Partition `entities` into chunks of `chunk_size`, keeping at most
/// `max_chunks` of them (`None` = no cap).
///
/// `chunk_size` of zero is a caller bug; configuration validation rejects
/// it before any entity is extracted.
pub fn chunk_entities(
    entities: Vec<Entity>,
    chunk_size: usize,
    max_chunks: Option<usize>,
) -> Vec<Chunk> {
    assert!(chunk_size > 0, "chunk_size must be positive");

    let mut chunks: Vec<Chunk> = Vec::with_capacity(entities.len().div_ceil(chunk_size));
    let mut entities = entities.into_iter();

    loop {
        let batch: Vec<Entity> = entities.by_ref().take(chunk_size).collect();
        if batch.is_empty() {
            break;
        }
        chunks.push(Chunk {
            id: chunks.len(),
            entities: batch,
        });
    }

    if let Some(cap) = max_chunks {
        chunks.truncate(cap);
    }

    chunks
}
