//! Core data model: normalized entities and the chunks that group them.

pub mod chunk;
pub mod entity;

pub use chunk::{chunk_entities, Chunk};
pub use entity::{Entity, EntityKind, Geometry, Point};
