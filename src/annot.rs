//! Parsed annotations and per-frame label vectors.
//!
//! Annotation files are parsed by external libraries; this module receives
//! already-parsed segment records and converts them to the per-timebin label
//! vectors that frame-classification training consumes.

use ndarray::Array1;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use thiserror::Error;

/// Label id reserved for time bins outside every annotated segment.
pub const UNLABELED: i64 = 0;

#[derive(Error, Debug)]
pub enum AnnotError {
    #[error("annotation has {labels} labels but {onsets} onsets and {offsets} offsets")]
    LengthMismatch {
        labels: usize,
        onsets: usize,
        offsets: usize,
    },
    #[error("segment {index}: onset {onset} is not before offset {offset}")]
    BadSegment {
        index: usize,
        onset: f64,
        offset: f64,
    },
    #[error("label '{0}' is not in the label map")]
    UnknownLabel(String),
}

/// An annotated sequence of segments for one vocalization.
#[derive(Debug, Clone)]
pub struct Annotation {
    labels: Vec<String>,
    onsets_s: Vec<f64>,
    offsets_s: Vec<f64>,
    audio_path: Option<PathBuf>,
}

impl Annotation {
    pub fn new(
        labels: Vec<String>,
        onsets_s: Vec<f64>,
        offsets_s: Vec<f64>,
        audio_path: Option<PathBuf>,
    ) -> Result<Self, AnnotError> {
        if labels.len() != onsets_s.len() || labels.len() != offsets_s.len() {
            return Err(AnnotError::LengthMismatch {
                labels: labels.len(),
                onsets: onsets_s.len(),
                offsets: offsets_s.len(),
            });
        }
        for (index, (&onset, &offset)) in onsets_s.iter().zip(offsets_s.iter()).enumerate() {
            if onset >= offset {
                return Err(AnnotError::BadSegment {
                    index,
                    onset,
                    offset,
                });
            }
        }
        Ok(Self {
            labels,
            onsets_s,
            offsets_s,
            audio_path,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn onsets_s(&self) -> &[f64] {
        &self.onsets_s
    }

    pub fn offsets_s(&self) -> &[f64] {
        &self.offsets_s
    }

    pub fn audio_path(&self) -> Option<&PathBuf> {
        self.audio_path.as_ref()
    }

    pub fn num_segments(&self) -> usize {
        self.labels.len()
    }

    /// The set of labels this annotation uses.
    pub fn labelset(&self) -> BTreeSet<&str> {
        self.labels.iter().map(String::as_str).collect()
    }
}

/// Map a label set to consecutive integer classes starting at 1.
///
/// Class 0 is reserved for [`UNLABELED`]. Labels are assigned in sorted
/// order so the mapping is deterministic across runs.
pub fn labelmap(labelset: &BTreeSet<String>) -> BTreeMap<String, i64> {
    labelset
        .iter()
        .enumerate()
        .map(|(i, label)| (label.clone(), i as i64 + 1))
        .collect()
}

/// Label each time bin with the class of the segment containing its center,
/// or [`UNLABELED`] when no segment does.
///
/// Later segments overwrite earlier ones where they overlap.
pub fn frame_labels(
    annot: &Annotation,
    time_bins: &Array1<f64>,
    map: &BTreeMap<String, i64>,
) -> Result<Array1<i64>, AnnotError> {
    let mut labels = Array1::from_elem(time_bins.len(), UNLABELED);
    for ((label, &onset), &offset) in annot
        .labels
        .iter()
        .zip(annot.onsets_s.iter())
        .zip(annot.offsets_s.iter())
    {
        let id = *map
            .get(label)
            .ok_or_else(|| AnnotError::UnknownLabel(label.clone()))?;
        for (i, &t) in time_bins.iter().enumerate() {
            if t >= onset && t <= offset {
                labels[i] = id;
            }
        }
    }
    Ok(labels)
}
