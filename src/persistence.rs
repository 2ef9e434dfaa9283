use ndarray::{Array2, Dimension};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::layers::lstm_cell::ParameterSet;

/// File holding run metadata inside a checkpoint directory
pub const METADATA_FILE: &str = "metadata.json";

/// Serializable version of Array2<f64> for persistence
#[derive(Serialize, Deserialize)]
struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl SerializableArray2 {
    fn into_array(self) -> Result<Array2<f64>, PersistenceError> {
        Array2::from_shape_vec(self.shape, self.data)
            .map_err(|err| PersistenceError::SerializationError(err.to_string()))
    }
}

/// Run information stored next to the parameter files
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointMetadata {
    pub run_name: String,
    pub version: String,
    pub created_at: String,
    pub hidden_size: usize,
    pub vocabulary: Vec<char>,
    pub iteration: usize,
    pub smoothed_loss: Option<f64>,
}

impl CheckpointMetadata {
    pub fn new(run_name: &str, hidden_size: usize, vocabulary: &[char], iteration: usize, smoothed_loss: Option<f64>) -> Self {
        CheckpointMetadata {
            run_name: run_name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            hidden_size,
            vocabulary: vocabulary.to_vec(),
            iteration,
            smoothed_loss,
        }
    }
}

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("checkpoint is missing parameter {name} (expected {path})")]
    MissingParameter { name: &'static str, path: PathBuf },
}

impl From<serde_json::Error> for PersistenceError {
    fn from(error: serde_json::Error) -> Self {
        PersistenceError::SerializationError(error.to_string())
    }
}

impl From<bincode::Error> for PersistenceError {
    fn from(error: bincode::Error) -> Self {
        PersistenceError::SerializationError(error.to_string())
    }
}

/// A checkpoint directory: one bincode file per parameter key plus `metadata.json`
#[derive(Clone, Debug)]
pub struct Checkpoint {
    dir: PathBuf,
}

impl Checkpoint {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Checkpoint {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn parameter_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write every parameter and the metadata, creating the directory if needed
    pub fn save(&self, params: &ParameterSet, metadata: &CheckpointMetadata) -> Result<(), PersistenceError> {
        self.save_parameters(params)?;
        self.save_metadata(metadata)
    }

    pub fn save_parameters(&self, params: &ParameterSet) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;

        for (name, array) in params.iter() {
            let file = File::create(self.parameter_path(name))?;
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, &SerializableArray2::from(array))?;
            writer.flush()?;
        }

        debug!(dir = %self.dir.display(), "wrote checkpoint parameters");
        Ok(())
    }

    pub fn save_metadata(&self, metadata: &CheckpointMetadata) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(metadata)?;
        let mut file = File::create(self.dir.join(METADATA_FILE))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Read every parameter back.
    ///
    /// All ten files must be present; a missing one fails the whole load.
    /// Shapes are not checked here.
    pub fn load_parameters(&self) -> Result<ParameterSet, PersistenceError> {
        for name in crate::layers::lstm_cell::PARAMETER_NAMES {
            let path = self.parameter_path(name);
            if !path.is_file() {
                return Err(PersistenceError::MissingParameter { name, path });
            }
        }

        ParameterSet::try_from_fn(|name| -> Result<Array2<f64>, PersistenceError> {
            let file = File::open(self.parameter_path(name))?;
            let array: SerializableArray2 = bincode::deserialize_from(BufReader::new(file))?;
            array.into_array()
        })
    }

    /// Read `metadata.json`, if the checkpoint has one
    pub fn load_metadata(&self) -> Result<Option<CheckpointMetadata>, PersistenceError> {
        let path = self.dir.join(METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}
