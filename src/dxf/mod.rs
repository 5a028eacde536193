//! DXF format handling: the group-code tokenizer, entity extraction from
//! source drawings, and regeneration of minimal per-chunk documents.

pub mod extractor;
pub mod reader;
pub mod regenerator;
pub mod writer;

pub use extractor::{DxfExtractor, ExtractionError};
pub use regenerator::{regenerate_from_chunk, RegeneratedDrawing, RegenerationError};
pub use writer::{encode_entity, DocumentWriter, EncodeError};
