//! Window-indexed random access over a prepared dataset split.
//!
//! Construction reads `metadata.json` and the manifest it names, then
//! precomputes per-row window counts so a global window index maps to a
//! (row, window offset) pair by binary search, without materializing any
//! windows. `get` is stateless: every access opens the row's source file,
//! validates frame/label alignment, pads to the window multiple and slices
//! out one (spectrogram window, frame-label window) pair.

use crate::annot::UNLABELED;
use crate::array_file::{load_spect_arrays, ArrayFileError, ArrayKeys};
use crate::audio::{read_wav, AudioError};
use crate::manifest::{read_manifest, ManifestError, ManifestRow, Split};
use crate::metadata::{InputType, Metadata, MetadataError};
use crate::transforms::{pad_to_window, pad_to_window_1d, SpectScaler, TransformError};
use ndarray::{s, Array1, Array2, Axis};
use ndarray_npy::ReadNpyError;
use rand::Rng;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WindowDatasetError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    ArrayFile(#[from] ArrayFileError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("error reading frame labels {}: {source}", path.display())]
    Npy {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },
    #[error("split '{0}' has no rows in the dataset manifest")]
    EmptySplit(Split),
    #[error("window index {index} out of range for dataset with {len} windows")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("manifest row {row} is missing a spectrogram path")]
    MissingSpectPath { row: usize },
    #[error("manifest row {row} is missing an audio path")]
    MissingAudioPath { row: usize },
    #[error("manifest row {row} is missing a frame labels path")]
    MissingFrameLabels { row: usize },
    #[error("metadata has input type 'spect' but no spectrogram format")]
    MissingSpectFormat,
    #[error(
        "manifest row {row}: duration {duration} gives no frames at frame duration {frame_dur}"
    )]
    NoFrames {
        row: usize,
        duration: f64,
        frame_dur: f64,
    },
    #[error("{} has {actual} frames but the manifest duration implies {expected}", path.display())]
    FrameCountMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("{} has {n_labels} frame labels but the source has {n_frames} frames", path.display())]
    FrameLabelMismatch {
        path: PathBuf,
        n_labels: usize,
        n_frames: usize,
    },
}

/// One training sample: a spectrogram (or audio-frame) window and its
/// aligned per-frame labels.
#[derive(Debug, Clone)]
pub struct WindowSample {
    pub spect: Array2<f64>,
    pub frame_labels: Array1<i64>,
}

/// Random-access windows over the padded frame sequence of one split.
///
/// Stateless once constructed: repeated `get(i)` calls are idempotent, and
/// concurrent calls from parallel data-loading workers are safe because
/// each access operates only on its own inputs.
#[derive(Debug)]
pub struct WindowDataset {
    dataset_path: PathBuf,
    metadata: Metadata,
    split: Split,
    rows: Vec<ManifestRow>,
    frame_counts: Vec<usize>,
    /// Cumulative window counts per row; last entry is the total.
    cumulative: Vec<usize>,
    window_size: usize,
    keys: ArrayKeys,
    scaler: Option<SpectScaler>,
}

impl WindowDataset {
    /// Build a windowed view of one split of a prepared dataset directory.
    ///
    /// Frame counts are derived from manifest durations and the metadata
    /// frame duration, so construction touches only the metadata and
    /// manifest files; source arrays are opened per `get` call.
    pub fn from_dataset_path(
        dataset_path: &Path,
        split: Split,
        window_size: usize,
        scaler: Option<SpectScaler>,
    ) -> Result<Self, WindowDatasetError> {
        if window_size == 0 {
            return Err(TransformError::InvalidWindowSize(0).into());
        }

        let metadata = Metadata::from_dataset_path(dataset_path)?;
        if metadata.input_type() == InputType::Spect && metadata.spect_format().is_none() {
            return Err(WindowDatasetError::MissingSpectFormat);
        }

        let manifest_path = dataset_path.join(metadata.dataset_csv_filename());
        let all_rows = read_manifest(&manifest_path)?;

        let mut rows = Vec::new();
        let mut frame_counts = Vec::new();
        let mut cumulative = vec![0usize];
        for (row_index, row) in all_rows.into_iter().enumerate() {
            if row.split != split {
                continue;
            }
            match metadata.input_type() {
                InputType::Spect if row.spect_path.is_none() => {
                    return Err(WindowDatasetError::MissingSpectPath { row: row_index });
                }
                InputType::Audio if row.audio_path.is_none() => {
                    return Err(WindowDatasetError::MissingAudioPath { row: row_index });
                }
                _ => {}
            }
            if row.frame_labels_path.is_none() {
                return Err(WindowDatasetError::MissingFrameLabels { row: row_index });
            }

            let n_frames = (row.duration / metadata.frame_dur()).round() as usize;
            if n_frames == 0 {
                return Err(WindowDatasetError::NoFrames {
                    row: row_index,
                    duration: row.duration,
                    frame_dur: metadata.frame_dur(),
                });
            }
            let n_windows = n_frames.div_ceil(window_size);
            cumulative.push(cumulative[cumulative.len() - 1] + n_windows);
            frame_counts.push(n_frames);
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(WindowDatasetError::EmptySplit(split));
        }

        let dataset = Self {
            dataset_path: dataset_path.to_path_buf(),
            metadata,
            split,
            rows,
            frame_counts,
            cumulative,
            window_size,
            keys: ArrayKeys::default(),
            scaler,
        };
        log::info!(
            "loaded split '{}': {} files, {} windows of size {}",
            dataset.split,
            dataset.rows.len(),
            dataset.len(),
            dataset.window_size
        );
        Ok(dataset)
    }

    /// Override the key names used to read spectrogram array files.
    pub fn with_array_keys(mut self, keys: ArrayKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Total window count for the split.
    pub fn len(&self) -> usize {
        self.cumulative[self.cumulative.len() - 1]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Summed duration of the split, in seconds.
    pub fn duration(&self) -> f64 {
        self.rows.iter().map(|row| row.duration).sum()
    }

    /// Shape of one input window, for the model-facing collaborator.
    pub fn input_shape(&self) -> Result<(usize, usize), WindowDatasetError> {
        Ok(self.get(0)?.spect.dim())
    }

    /// The deterministic window at a global index.
    pub fn get(&self, index: usize) -> Result<WindowSample, WindowDatasetError> {
        let (row_index, window_index) = self.locate(index)?;
        let (padded, padded_labels) = self.load_padded(row_index)?;
        self.slice_window(&padded, &padded_labels, window_index * self.window_size)
    }

    /// A random window from the same file the global index maps to.
    ///
    /// The spectrogram and label windows share a single uniform draw over
    /// the padded extent; repeatable only under a fixed rng seed.
    pub fn get_random<R: Rng>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<WindowSample, WindowDatasetError> {
        let (row_index, _) = self.locate(index)?;
        let (padded, padded_labels) = self.load_padded(row_index)?;
        let start = rng.gen_range(0..=padded.ncols() - self.window_size);
        self.slice_window(&padded, &padded_labels, start)
    }

    /// Map a global window index to (row, window offset within the row).
    fn locate(&self, index: usize) -> Result<(usize, usize), WindowDatasetError> {
        let len = self.len();
        if index >= len {
            return Err(WindowDatasetError::IndexOutOfRange { index, len });
        }
        let row = self.cumulative.partition_point(|&c| c <= index) - 1;
        Ok((row, index - self.cumulative[row]))
    }

    /// One row's frames and labels, padded to a window multiple.
    fn load_padded(
        &self,
        row_index: usize,
    ) -> Result<(Array2<f64>, Array1<i64>), WindowDatasetError> {
        let (frames, labels) = self.load_frames(row_index)?;
        let (padded, _) = pad_to_window(&frames, self.window_size, 0.0)?;
        let (padded_labels, _) = pad_to_window_1d(&labels, self.window_size, UNLABELED)?;
        Ok((padded, padded_labels))
    }

    fn slice_window(
        &self,
        padded: &Array2<f64>,
        padded_labels: &Array1<i64>,
        start: usize,
    ) -> Result<WindowSample, WindowDatasetError> {
        let w = self.window_size;
        let spect = padded.slice(s![.., start..start + w]).to_owned();
        let frame_labels = padded_labels.slice(s![start..start + w]).to_owned();

        let spect = match &self.scaler {
            Some(scaler) => scaler.transform(&spect)?,
            None => spect,
        };
        Ok(WindowSample {
            spect,
            frame_labels,
        })
    }

    /// Load one row's frames and frame labels, re-validating the counts the
    /// window index was derived from. Files are opened per access and
    /// released immediately; nothing is cached across calls.
    fn load_frames(
        &self,
        row_index: usize,
    ) -> Result<(Array2<f64>, Array1<i64>), WindowDatasetError> {
        let row = &self.rows[row_index];
        let expected = self.frame_counts[row_index];

        let (frames, source_path) = match self.metadata.input_type() {
            InputType::Spect => {
                let format = self
                    .metadata
                    .spect_format()
                    .ok_or(WindowDatasetError::MissingSpectFormat)?;
                let path = self.resolve(row.spect_path.as_deref().ok_or(
                    WindowDatasetError::MissingSpectPath { row: row_index },
                )?);
                let arrays = load_spect_arrays(&path, format, &self.keys)?;
                (arrays.spect, path)
            }
            InputType::Audio => {
                let path = self.resolve(row.audio_path.as_deref().ok_or(
                    WindowDatasetError::MissingAudioPath { row: row_index },
                )?);
                let audio = read_wav(&path)?;
                (Array1::from_vec(audio.samples).insert_axis(Axis(0)), path)
            }
        };

        let actual = frames.ncols();
        if actual != expected {
            return Err(WindowDatasetError::FrameCountMismatch {
                path: source_path,
                expected,
                actual,
            });
        }

        let labels_path = self.resolve(row.frame_labels_path.as_deref().ok_or(
            WindowDatasetError::MissingFrameLabels { row: row_index },
        )?);
        let labels: Array1<i64> =
            ndarray_npy::read_npy(&labels_path).map_err(|source| WindowDatasetError::Npy {
                path: labels_path.clone(),
                source,
            })?;
        if labels.len() != actual {
            return Err(WindowDatasetError::FrameLabelMismatch {
                path: labels_path,
                n_labels: labels.len(),
                n_frames: actual,
            });
        }

        Ok((frames, labels))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dataset_path.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_file::ArrayFormat;
    use crate::manifest::write_manifest;
    use ndarray::Array2;
    use ndarray_npy::{write_npy, NpzWriter};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs::File;

    const N_FREQ: usize = 4;
    const TIMEBIN: f64 = 0.002;

    /// Spectrogram cell values encode (file, row, column) so window
    /// contents can be checked against slices.
    fn spect_value(file: usize, row: usize, col: usize) -> f64 {
        (file * 1000 + row * 100 + col) as f64
    }

    fn label_value(col: usize) -> i64 {
        (col % 5) as i64 + 1
    }

    fn write_fixture_dataset(root: &Path, n_times: &[usize], splits: &[Split]) -> String {
        std::fs::create_dir(root.join("spect")).unwrap();
        std::fs::create_dir(root.join("labels")).unwrap();

        let mut rows = Vec::new();
        for (i, (&n_time, &split)) in n_times.iter().zip(splits.iter()).enumerate() {
            let spect_rel = format!("spect/v{i}.npz");
            let labels_rel = format!("labels/v{i}.npy");

            let mut npz = NpzWriter::new(File::create(root.join(&spect_rel)).unwrap());
            let spect = Array2::from_shape_fn((N_FREQ, n_time), |(r, c)| spect_value(i, r, c));
            let freq = Array1::from_iter((0..N_FREQ).map(|k| k as f64 * 1000.0));
            let time = Array1::from_iter((0..n_time).map(|k| k as f64 * TIMEBIN));
            npz.add_array("s", &spect).unwrap();
            npz.add_array("f", &freq).unwrap();
            npz.add_array("t", &time).unwrap();
            npz.finish().unwrap();

            let labels = Array1::from_iter((0..n_time).map(label_value));
            write_npy(root.join(&labels_rel), &labels).unwrap();

            rows.push(ManifestRow {
                audio_path: None,
                spect_path: Some(PathBuf::from(&spect_rel)),
                annot_path: None,
                frame_labels_path: Some(PathBuf::from(&labels_rel)),
                split,
                duration: n_time as f64 * TIMEBIN,
            });
        }

        let csv_name = "fixture_prep_230101_120000.csv".to_string();
        write_manifest(&root.join(&csv_name), &rows).unwrap();
        Metadata::new(
            csv_name.clone(),
            InputType::Spect,
            TIMEBIN,
            None,
            Some(ArrayFormat::Npz),
        )
        .unwrap()
        .to_json(root)
        .unwrap();
        csv_name
    }

    fn fixture(
        root: &Path,
        split: Split,
        window_size: usize,
    ) -> Result<WindowDataset, WindowDatasetError> {
        write_fixture_dataset(
            root,
            &[7, 6, 12],
            &[Split::Train, Split::Train, Split::Val],
        );
        WindowDataset::from_dataset_path(root, split, window_size, None)
    }

    #[test]
    fn test_window_counts() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), Split::Train, 4).unwrap();
        // ceil(7/4) + ceil(6/4) = 2 + 2
        assert_eq!(dataset.len(), 4);
        assert!((dataset.duration() - 13.0 * TIMEBIN).abs() < 1e-12);

        let val = WindowDataset::from_dataset_path(dir.path(), Split::Val, 4, None).unwrap();
        assert_eq!(val.len(), 3);
    }

    #[test]
    fn test_get_first_window() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), Split::Train, 4).unwrap();

        let sample = dataset.get(0).unwrap();
        assert_eq!(sample.spect.dim(), (N_FREQ, 4));
        for r in 0..N_FREQ {
            for c in 0..4 {
                assert_eq!(sample.spect[[r, c]], spect_value(0, r, c));
            }
        }
        assert_eq!(
            sample.frame_labels,
            Array1::from_iter((0..4).map(label_value))
        );
    }

    #[test]
    fn test_last_window_of_file_is_padded() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), Split::Train, 4).unwrap();

        // window 1 covers columns 4..8 of the 7-column first file
        let sample = dataset.get(1).unwrap();
        assert_eq!(sample.spect[[0, 0]], spect_value(0, 0, 4));
        assert_eq!(sample.spect[[0, 2]], spect_value(0, 0, 6));
        // column 7 is padding
        assert_eq!(sample.spect[[0, 3]], 0.0);
        assert_eq!(sample.frame_labels[3], UNLABELED);
    }

    #[test]
    fn test_index_crosses_file_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), Split::Train, 4).unwrap();

        // window 2 is the first window of the second file
        let sample = dataset.get(2).unwrap();
        assert_eq!(sample.spect[[0, 0]], spect_value(1, 0, 0));
    }

    #[test]
    fn test_get_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), Split::Train, 4).unwrap();
        let a = dataset.get(1).unwrap();
        let b = dataset.get(1).unwrap();
        assert_eq!(a.spect, b.spect);
        assert_eq!(a.frame_labels, b.frame_labels);
    }

    #[test]
    fn test_index_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), Split::Train, 4).unwrap();
        let err = dataset.get(4).unwrap_err();
        assert!(matches!(
            err,
            WindowDatasetError::IndexOutOfRange { index: 4, len: 4 }
        ));
    }

    #[test]
    fn test_empty_split() {
        let dir = tempfile::tempdir().unwrap();
        let err = fixture(dir.path(), Split::Test, 4).unwrap_err();
        assert!(matches!(err, WindowDatasetError::EmptySplit(Split::Test)));
    }

    #[test]
    fn test_get_random_is_seedable() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), Split::Train, 4).unwrap();

        let a = dataset.get_random(0, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = dataset.get_random(0, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a.spect, b.spect);
        assert_eq!(a.frame_labels, b.frame_labels);
        assert_eq!(a.spect.dim(), (N_FREQ, 4));
    }

    #[test]
    fn test_frame_label_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_dataset(dir.path(), &[8], &[Split::Train]);
        // overwrite with a label vector of the wrong length
        let labels = Array1::from_iter((0..5).map(|c| c as i64));
        write_npy(dir.path().join("labels/v0.npy"), &labels).unwrap();

        let dataset = WindowDataset::from_dataset_path(dir.path(), Split::Train, 4, None).unwrap();
        let err = dataset.get(0).unwrap_err();
        assert!(matches!(
            err,
            WindowDatasetError::FrameLabelMismatch {
                n_labels: 5,
                n_frames: 8,
                ..
            }
        ));
    }

    #[test]
    fn test_scaler_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_dataset(dir.path(), &[8], &[Split::Train]);

        let spect = Array2::from_shape_fn((N_FREQ, 8), |(r, c)| spect_value(0, r, c));
        let scaler = SpectScaler::fit([spect.view()]).unwrap();
        let dataset =
            WindowDataset::from_dataset_path(dir.path(), Split::Train, 8, Some(scaler)).unwrap();

        let sample = dataset.get(0).unwrap();
        // each row of the single full-file window is standardized
        for row in sample.spect.rows() {
            assert!(row.mean().unwrap().abs() < 1e-9);
        }
    }

    #[test]
    fn test_input_shape() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), Split::Train, 4).unwrap();
        assert_eq!(dataset.input_shape().unwrap(), (N_FREQ, 4));
    }

    #[test]
    fn test_audio_frames_modality() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("audio")).unwrap();
        std::fs::create_dir(dir.path().join("labels")).unwrap();

        let n_samples = 100usize;
        let sample_rate = 32000u32;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer =
            hound::WavWriter::create(dir.path().join("audio/v0.wav"), spec).unwrap();
        for i in 0..n_samples {
            writer.write_sample((i as i16) * 100).unwrap();
        }
        writer.finalize().unwrap();

        let labels = Array1::from_iter((0..n_samples).map(|c| (c % 2) as i64 + 1));
        write_npy(dir.path().join("labels/v0.npy"), &labels).unwrap();

        let frame_dur = 1.0 / sample_rate as f64;
        let rows = vec![ManifestRow {
            audio_path: Some(PathBuf::from("audio/v0.wav")),
            spect_path: None,
            annot_path: None,
            frame_labels_path: Some(PathBuf::from("labels/v0.npy")),
            split: Split::Train,
            duration: n_samples as f64 * frame_dur,
        }];
        let csv_name = "audio_prep_230101_120000.csv";
        write_manifest(&dir.path().join(csv_name), &rows).unwrap();
        Metadata::new(
            csv_name.into(),
            InputType::Audio,
            frame_dur,
            Some(crate::metadata::AudioFormat::Wav),
            None,
        )
        .unwrap()
        .to_json(dir.path())
        .unwrap();

        let dataset = WindowDataset::from_dataset_path(dir.path(), Split::Train, 40, None).unwrap();
        // ceil(100 / 40) windows
        assert_eq!(dataset.len(), 3);
        let sample = dataset.get(0).unwrap();
        assert_eq!(sample.spect.dim(), (1, 40));
        assert_eq!(sample.frame_labels.len(), 40);
        // last window is mostly padding
        let last = dataset.get(2).unwrap();
        assert_eq!(last.frame_labels[39], UNLABELED);
    }
}
