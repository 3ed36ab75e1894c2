//! The persisted dataset-metadata record.
//!
//! One `metadata.json` per dataset directory, created once at preparation
//! time and read back before training or evaluation. A changed dataset
//! means a new metadata file; the record is never mutated in place.

use crate::array_file::ArrayFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fixed name of the metadata file inside a dataset directory.
pub const METADATA_FILENAME: &str = "metadata.json";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error(
        "invalid dataset csv filename: {0}; filename should contain \"_prep_\" and end with .csv"
    )]
    InvalidCsvFilename(String),
    #[error("frame duration should be greater than zero, got {0}")]
    InvalidFrameDur(f64),
    #[error("dataset path not found or not recognized as a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("metadata file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed metadata in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The modality of the input frames: audio signals or spectrograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Audio,
    Spect,
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputType::Audio => f.write_str("audio"),
            InputType::Spect => f.write_str("spect"),
        }
    }
}

/// On-disk format of source audio files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Cbin,
    Wav,
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Cbin => f.write_str("cbin"),
            AudioFormat::Wav => f.write_str("wav"),
        }
    }
}

/// Metadata describing one prepared dataset directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    dataset_csv_filename: String,
    input_type: InputType,
    frame_dur: f64,
    #[serde(default)]
    audio_format: Option<AudioFormat>,
    #[serde(default)]
    spect_format: Option<ArrayFormat>,
}

impl Metadata {
    /// Build a validated metadata record. Validation happens here, before
    /// any file I/O: the manifest filename must encode prep provenance and
    /// the frame duration must be a positive, finite number of seconds.
    pub fn new(
        dataset_csv_filename: String,
        input_type: InputType,
        frame_dur: f64,
        audio_format: Option<AudioFormat>,
        spect_format: Option<ArrayFormat>,
    ) -> Result<Self, MetadataError> {
        let metadata = Self {
            dataset_csv_filename,
            input_type,
            frame_dur,
            audio_format,
            spect_format,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    fn validate(&self) -> Result<(), MetadataError> {
        if !self.dataset_csv_filename.contains("_prep_")
            || !self.dataset_csv_filename.ends_with(".csv")
        {
            return Err(MetadataError::InvalidCsvFilename(
                self.dataset_csv_filename.clone(),
            ));
        }
        if !(self.frame_dur.is_finite() && self.frame_dur > 0.0) {
            return Err(MetadataError::InvalidFrameDur(self.frame_dur));
        }
        Ok(())
    }

    pub fn dataset_csv_filename(&self) -> &str {
        &self.dataset_csv_filename
    }

    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    /// Duration of one frame in seconds: a single audio sample or a single
    /// spectrogram time bin.
    pub fn frame_dur(&self) -> f64 {
        self.frame_dur
    }

    pub fn audio_format(&self) -> Option<AudioFormat> {
        self.audio_format
    }

    pub fn spect_format(&self) -> Option<ArrayFormat> {
        self.spect_format
    }

    /// Load metadata from a json file and re-validate its fields.
    pub fn from_path(json_path: &Path) -> Result<Self, MetadataError> {
        let file = File::open(json_path).map_err(|source| MetadataError::Io {
            path: json_path.to_path_buf(),
            source,
        })?;
        let metadata: Metadata =
            serde_json::from_reader(file).map_err(|source| MetadataError::Json {
                path: json_path.to_path_buf(),
                source,
            })?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Load the `metadata.json` at the root of a dataset directory.
    pub fn from_dataset_path(dataset_path: &Path) -> Result<Self, MetadataError> {
        if !dataset_path.is_dir() {
            return Err(MetadataError::NotADirectory(dataset_path.to_path_buf()));
        }
        let json_path = dataset_path.join(METADATA_FILENAME);
        if !json_path.exists() {
            return Err(MetadataError::NotFound(json_path));
        }
        Self::from_path(&json_path)
    }

    /// Write this record to `metadata.json` at the root of a dataset
    /// directory.
    pub fn to_json(&self, dataset_path: &Path) -> Result<(), MetadataError> {
        if !dataset_path.is_dir() {
            return Err(MetadataError::NotADirectory(dataset_path.to_path_buf()));
        }
        let json_path = dataset_path.join(METADATA_FILENAME);
        let file = File::create(&json_path).map_err(|source| MetadataError::Io {
            path: json_path.clone(),
            source,
        })?;
        serde_json::to_writer_pretty(file, self).map_err(|source| MetadataError::Json {
            path: json_path,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Metadata {
        Metadata::new(
            "llb3_prep_230101_120000.csv".into(),
            InputType::Spect,
            0.002,
            None,
            Some(ArrayFormat::Npz),
        )
        .unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = metadata();
        metadata.to_json(dir.path()).unwrap();

        let back = Metadata::from_dataset_path(dir.path()).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_invalid_csv_filename() {
        let err = Metadata::new(
            "not-a-prep-file.csv".into(),
            InputType::Spect,
            0.002,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidCsvFilename(_)));

        let err = Metadata::new(
            "llb3_prep_230101.json".into(),
            InputType::Spect,
            0.002,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidCsvFilename(_)));
    }

    #[test]
    fn test_invalid_frame_dur() {
        for bad in [0.0, -1.0, f64::NAN] {
            let err = Metadata::new(
                "x_prep_1.csv".into(),
                InputType::Audio,
                bad,
                Some(AudioFormat::Wav),
                None,
            )
            .unwrap_err();
            assert!(matches!(err, MetadataError::InvalidFrameDur(_)));
        }
    }

    #[test]
    fn test_invalid_input_type_rejected_at_parse() {
        let json = r#"{
            "dataset_csv_filename": "x_prep_1.csv",
            "input_type": "video",
            "frame_dur": 0.002
        }"#;
        let result: Result<Metadata, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_directory_and_file() {
        let err = Metadata::from_dataset_path(Path::new("/no/such/dir")).unwrap_err();
        assert!(matches!(err, MetadataError::NotADirectory(_)));

        let dir = tempfile::tempdir().unwrap();
        let err = Metadata::from_dataset_path(dir.path()).unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[test]
    fn test_malformed_fields_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILENAME);
        std::fs::write(
            &path,
            r#"{
                "dataset_csv_filename": "x_prep_1.csv",
                "input_type": "spect",
                "frame_dur": -0.5
            }"#,
        )
        .unwrap();
        let err = Metadata::from_dataset_path(dir.path()).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidFrameDur(_)));
    }
}
