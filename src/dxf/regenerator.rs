//! Per-chunk drawing regeneration.
//!
//! Rebuilds a minimal standalone DXF document containing exactly one
//! chunk's entities. Entity failures are isolated: an entity that cannot
//! be encoded is skipped and counted as a warning, never aborting the
//! chunk. `included_count + warning_count` always equals the chunk size,
//! and a document with zero included entities is still valid.

use thiserror::Error;

use super::writer::DocumentWriter;
use crate::models::Chunk;

#[derive(Debug, Error)]
pub enum RegenerationError {
    #[error("chunk {0} is empty")]
    EmptyChunk(usize),
}

/// Result of regenerating one chunk.
#[derive(Debug, Clone)]
pub struct RegeneratedDrawing {
    /// Complete DXF document text.
    pub content: String,
    /// Entities successfully written.
    pub included_count: usize,
    /// Entities skipped because they could not be encoded.
    pub warning_count: usize,
}

/// Rebuild a DXF document from one chunk, in chunk order.
pub fn regenerate_from_chunk(chunk: &Chunk) -> Result<RegeneratedDrawing, RegenerationError> {
    if chunk.is_empty() {
        return Err(RegenerationError::EmptyChunk(chunk.id));
    }

    let mut writer = DocumentWriter::new();
    let mut warning_count = 0;

    for (offset, entity) in chunk.entities.iter().enumerate() {
        if let Err(e) = writer.add_entity(entity) {
            warning_count += 1;
            tracing::warn!(
                chunk_id = chunk.id,
                entity_offset = offset,
                kind = entity.kind().as_str(),
                error = %e,
                "skipped entity during regeneration"
            );
        }
    }

    let included_count = writer.entity_count();
    debug_assert_eq!(included_count + warning_count, chunk.entities.len());

    tracing::debug!(
        chunk_id = chunk.id,
        included = included_count,
        warnings = warning_count,
        "chunk regenerated"
    );

    Ok(RegeneratedDrawing {
        content: writer.render(),
        included_count,
        warning_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dxf::extractor::DxfExtractor;
    use crate::models::{Entity, Geometry, Point};

    fn valid_line(i: usize) -> Entity {
        Entity::new(Geometry::Line {
            start: Point::new(i as f64, 0.0),
            end: Point::new(i as f64, 10.0),
        })
    }

    fn invalid_circle() -> Entity {
        Entity::new(Geometry::Circle {
            center: Point::new(0.0, 0.0),
            radius: 0.0,
        })
    }

    fn chunk_of(entities: Vec<Entity>) -> Chunk {
        Chunk { id: 0, entities }
    }

    #[test]
    fn counts_are_conserved() {
        let chunk = chunk_of(vec![valid_line(0), invalid_circle(), valid_line(1)]);
        let drawing = regenerate_from_chunk(&chunk).unwrap();
        assert_eq!(drawing.included_count, 2);
        assert_eq!(drawing.warning_count, 1);
        assert_eq!(
            drawing.included_count + drawing.warning_count,
            chunk.entities.len()
        );
    }

    #[test]
    fn all_invalid_chunk_still_produces_valid_document() {
        let chunk = chunk_of(vec![invalid_circle(), invalid_circle()]);
        let drawing = regenerate_from_chunk(&chunk).unwrap();
        assert_eq!(drawing.included_count, 0);
        assert_eq!(drawing.warning_count, 2);

        // The empty document parses cleanly.
        let reparsed: Vec<Entity> = DxfExtractor::from_source(drawing.content)
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(reparsed.is_empty());
    }

    #[test]
    fn output_preserves_chunk_order() {
        let chunk = chunk_of(vec![
            valid_line(3),
            Entity::new(Geometry::Circle {
                center: Point::new(1.0, 1.0),
                radius: 4.0,
            }),
            valid_line(7),
        ]);
        let drawing = regenerate_from_chunk(&chunk).unwrap();
        let reparsed: Vec<Entity> = DxfExtractor::from_source(drawing.content)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(reparsed.len(), 3);
        assert_eq!(reparsed[0], chunk.entities[0]);
        assert_eq!(reparsed[1], chunk.entities[1]);
        assert_eq!(reparsed[2], chunk.entities[2]);
    }

    #[test]
    fn empty_chunk_is_an_error() {
        let chunk = chunk_of(vec![]);
        assert!(matches!(
            regenerate_from_chunk(&chunk),
            Err(RegenerationError::EmptyChunk(0))
        ));
    }

    #[test]
    fn regeneration_is_deterministic() {
        let chunk = chunk_of(vec![valid_line(0), valid_line(1), invalid_circle()]);
        let a = regenerate_from_chunk(&chunk).unwrap();
        let b = regenerate_from_chunk(&chunk).unwrap();
        assert_eq!(a.content, b.content);
    }
}
