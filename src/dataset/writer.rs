//! Training-pair assembly and the append-only JSONL dataset stream.
//!
//! One record per line, keys exactly `instruction`, `input`, `output` in
//! that order; this is the compatibility contract with downstream
//! fine-tuning tooling. Records are appended whole (serialize, write,
//! flush under one lock), never rewritten or reordered. Any write failure
//! is fatal for the run: a dataset with silently dropped records is worse
//! than no dataset.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dxf::RegeneratedDrawing;

/// Fixed instruction stored on every training pair.
pub const INSTRUCTION: &str =
    "You are a CAD generation bot. Generate the DXF code for the user's request.";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to create dataset file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append dataset record: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to serialize dataset record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("training pair has an empty {0} field")]
    EmptyField(&'static str),
}

/// One dataset record. Field order here is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPair {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

impl TrainingPair {
    /// Assemble a pair from a validated label and regenerated drawing,
    /// rejecting empty fields.
    pub fn from_parts(
        label: &str,
        drawing: &RegeneratedDrawing,
    ) -> Result<Self, DatasetError> {
        if label.is_empty() {
            return Err(DatasetError::EmptyField("input"));
        }
        if drawing.content.is_empty() {
            return Err(DatasetError::EmptyField("output"));
        }
        Ok(Self {
            instruction: INSTRUCTION.to_string(),
            input: label.to_string(),
            output: drawing.content.clone(),
        })
    }
}

/// Append-only JSONL writer shared across chunk workers.
pub struct DatasetWriter {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
}

impl DatasetWriter {
    /// Create (truncating) the dataset file, making parent directories as
    /// needed.
    pub fn create(path: &Path) -> Result<Self, DatasetError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| DatasetError::Create {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = File::create(path).map_err(|source| DatasetError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line and flush it. The lock makes
    /// the append atomic with respect to other workers; the flush makes
    /// failures surface on the record that caused them.
    pub fn append(&self, chunk_id: usize, pair: &TrainingPair) -> Result<(), DatasetError> {
        let line = serde_json::to_string(pair)?;

        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        drop(file);

        tracing::debug!(chunk_id, "training pair appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawing(content: &str) -> RegeneratedDrawing {
        RegeneratedDrawing {
            content: content.to_string(),
            included_count: 1,
            warning_count: 0,
        }
    }

    #[test]
    fn pair_keys_serialize_in_contract_order() {
        let pair = TrainingPair::from_parts("Draw a wall", &drawing("0\nEOF\n")).unwrap();
        let json = serde_json::to_string(&pair).unwrap();
        let instruction_at = json.find("\"instruction\"").unwrap();
        let input_at = json.find("\"input\"").unwrap();
        let output_at = json.find("\"output\"").unwrap();
        assert!(instruction_at < input_at && input_at < output_at);
    }

    #[test]
    fn pair_carries_fixed_instruction() {
        let pair = TrainingPair::from_parts("Draw a wall", &drawing("0\nEOF\n")).unwrap();
        assert_eq!(pair.instruction, INSTRUCTION);
        assert_eq!(pair.input, "Draw a wall");
    }

    #[test]
    fn empty_label_is_rejected() {
        assert!(matches!(
            TrainingPair::from_parts("", &drawing("0\nEOF\n")),
            Err(DatasetError::EmptyField("input"))
        ));
    }

    #[test]
    fn empty_drawing_is_rejected() {
        assert!(matches!(
            TrainingPair::from_parts("Draw a wall", &drawing("")),
            Err(DatasetError::EmptyField("output"))
        ));
    }

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.jsonl");
        let writer = DatasetWriter::create(&path).unwrap();

        for i in 0..3 {
            let pair =
                TrainingPair::from_parts(&format!("Draw wall number {i}"), &drawing("0\nEOF\n"))
                    .unwrap();
            writer.append(i, &pair).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            let object = value.as_object().unwrap();
            assert_eq!(object.len(), 3);
            for key in ["instruction", "input", "output"] {
                assert!(object.contains_key(key), "missing key {key}");
            }
            // Key order within the raw line follows the struct definition.
            assert!(line.starts_with("{\"instruction\":"));
        }
    }

    #[test]
    fn records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.jsonl");
        let writer = DatasetWriter::create(&path).unwrap();

        let pair = TrainingPair::from_parts(
            "Draw a wall with\na \"window\" opening",
            &drawing("0\nSECTION\n2\nENTITIES\n0\nENDSEC\n0\nEOF\n"),
        )
        .unwrap();
        writer.append(0, &pair).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let restored: TrainingPair = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(restored, pair);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/dataset.jsonl");
        let writer = DatasetWriter::create(&path).unwrap();
        drop(writer);
        assert!(path.exists());
    }

    #[test]
    fn create_fails_on_unwritable_location() {
        let err = DatasetWriter::create(Path::new("/proc/definitely/not/writable.jsonl"));
        assert!(matches!(err, Err(DatasetError::Create { .. })));
    }
}
