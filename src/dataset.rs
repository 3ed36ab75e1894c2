//! Vocalization records and the assembled dataset.

use crate::annot::Annotation;
use crate::array_file::{load_spect_arrays, ArrayFileError, ArrayFormat, ArrayKeys};
use crate::spect::{Spectrogram, SpectError};
use ndarray::Array1;
use std::borrow::Cow;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpectLoadError {
    #[error(transparent)]
    ArrayFile(#[from] ArrayFileError),
    #[error(transparent)]
    Spect(#[from] SpectError),
}

/// Where a vocalization's spectrogram lives: loaded into memory at assembly
/// time, or still on disk for lazy loading.
#[derive(Debug, Clone)]
pub enum SpectSource {
    Loaded(Spectrogram),
    File(PathBuf),
}

/// One annotated vocalization: an annotation paired with its spectrogram
/// (or a reference to it) and its source audio.
#[derive(Debug, Clone)]
pub struct Vocalization {
    pub annot: Annotation,
    pub spect_path: PathBuf,
    pub spect: SpectSource,
    pub audio_path: Option<PathBuf>,
    /// Duration in seconds: time bin count times timebin duration.
    pub duration: f64,
}

impl Vocalization {
    /// The spectrogram if it was loaded eagerly.
    pub fn spect(&self) -> Option<&Spectrogram> {
        match &self.spect {
            SpectSource::Loaded(s) => Some(s),
            SpectSource::File(_) => None,
        }
    }
}

/// An ordered collection of vocalizations sharing one frequency-bin vector
/// and timebin duration.
///
/// Order is the manifest row order and is significant: it drives split
/// assignment and deterministic window indexing. The shared bin vector and
/// timebin duration are established by the assembly-time consistency check
/// across the whole collection.
#[derive(Debug, Clone)]
pub struct VocalDataset {
    vocals: Vec<Vocalization>,
    freq_bins: Array1<f64>,
    timebin_dur: f64,
}

impl VocalDataset {
    pub(crate) fn new(
        vocals: Vec<Vocalization>,
        freq_bins: Array1<f64>,
        timebin_dur: f64,
    ) -> Self {
        Self {
            vocals,
            freq_bins,
            timebin_dur,
        }
    }

    pub fn len(&self) -> usize {
        self.vocals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocals.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Vocalization> {
        self.vocals.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Vocalization> {
        self.vocals.iter()
    }

    pub fn freq_bins(&self) -> &Array1<f64> {
        &self.freq_bins
    }

    pub fn timebin_dur(&self) -> f64 {
        self.timebin_dur
    }

    /// Summed duration of all vocalizations, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.vocals.iter().map(|v| v.duration).sum()
    }

    /// Spectrogram for one vocalization.
    ///
    /// Borrows the in-memory spectrogram when it was loaded eagerly;
    /// otherwise opens the source file for this access only, so lazy
    /// datasets never hold file contents across calls.
    pub fn spectrogram(
        &self,
        index: usize,
        format: ArrayFormat,
        keys: &ArrayKeys,
    ) -> Result<Option<Cow<'_, Spectrogram>>, SpectLoadError> {
        let Some(vocal) = self.vocals.get(index) else {
            return Ok(None);
        };
        match &vocal.spect {
            SpectSource::Loaded(s) => Ok(Some(Cow::Borrowed(s))),
            SpectSource::File(path) => {
                let arrays = load_spect_arrays(path, format, keys)?;
                let spect = Spectrogram::new(
                    arrays.freq_bins,
                    arrays.time_bins,
                    self.timebin_dur,
                    arrays.spect,
                )?;
                Ok(Some(Cow::Owned(spect)))
            }
        }
    }
}

impl std::ops::Index<usize> for VocalDataset {
    type Output = Vocalization;

    fn index(&self, index: usize) -> &Self::Output {
        &self.vocals[index]
    }
}

impl<'a> IntoIterator for &'a VocalDataset {
    type Item = &'a Vocalization;
    type IntoIter = std::slice::Iter<'a, Vocalization>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
