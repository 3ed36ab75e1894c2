//! The tabular dataset manifest.
//!
//! One CSV row per source file: paths, split assignment and duration.
//! Written once at preparation time, read back by the windowed dataset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error on manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error in manifest {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("not a valid split name: '{0}'")]
    InvalidSplit(String),
}

/// Named partition of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
    Predict,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
            Split::Predict => "predict",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            "predict" => Ok(Split::Predict),
            other => Err(ManifestError::InvalidSplit(other.to_string())),
        }
    }
}

/// One source file in a prepared dataset.
///
/// Paths are stored relative to the dataset root. Empty cells deserialize
/// to `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRow {
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
    #[serde(default)]
    pub spect_path: Option<PathBuf>,
    #[serde(default)]
    pub annot_path: Option<PathBuf>,
    #[serde(default)]
    pub frame_labels_path: Option<PathBuf>,
    pub split: Split,
    pub duration: f64,
}

/// Read all rows of a manifest CSV.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRow>, ManifestError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| ManifestError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    reader
        .deserialize()
        .map(|row| {
            row.map_err(|source| ManifestError::Csv {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

/// Write rows to a manifest CSV, overwriting any existing file.
pub fn write_manifest(path: &Path, rows: &[ManifestRow]) -> Result<(), ManifestError> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| ManifestError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    for row in rows {
        writer.serialize(row).map_err(|source| ManifestError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    }
    writer.flush().map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Manifest filename encoding prep provenance:
/// `{data_dir_name}_prep_{yymmdd_HHMMSS}.csv`.
///
/// The metadata record validates this convention when a dataset is loaded
/// back.
pub fn prep_csv_filename(data_dir_name: &str) -> String {
    let timestamp = chrono::Local::now().format("%y%m%d_%H%M%S");
    format!("{data_dir_name}_prep_{timestamp}.csv")
}
