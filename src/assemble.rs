//! Parallel assembly of vocalization datasets from array files.
//!
//! Architecture:
//! feeder thread -> task channel -> worker threads -> result channel -> main
//!
//! Workers load and validate files independently; results are keyed by input
//! index and re-ordered after the join barrier, so the final dataset order is
//! the input order regardless of worker scheduling. Per-file skip conditions
//! drop only the offending file; consistency violations abort the whole
//! assembly.

use crate::annot::Annotation;
use crate::array_file::{load_spect_arrays, ArrayFileError, ArrayFormat, ArrayKeys};
use crate::dataset::{SpectSource, VocalDataset, Vocalization};
use crate::spect::{timebin_dur_from_vec, SpectError, Spectrogram};
use crossbeam::channel::bounded;
use ndarray::Array1;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("received more than one of dir, files, and map; unclear which to use")]
    ConflictingInputs,
    #[error("must provide one of dir, files, or map")]
    NoInput,
    #[error("must provide labelset when skip_files_with_labels_not_in_labelset is true")]
    LabelsetRequired,
    #[error("annotations are required with dir and files input modes")]
    AnnotsRequired,
    #[error("got {n_files} files but {n_annots} annotations")]
    AnnotCountMismatch { n_files: usize, n_annots: usize },
    #[error("no .{extension} files found in {}", dir.display())]
    NoFilesFound {
        dir: PathBuf,
        extension: &'static str,
    },
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    ArrayFile(#[from] ArrayFileError),
    #[error(transparent)]
    Spect(#[from] SpectError),
    #[error("freq_bins in {} do not match freq_bins from other array files", path.display())]
    FreqBinsDiffer { path: PathBuf },
    #[error(
        "timebin duration {timebin_dur} in {} does not match duration {expected} from other array files",
        path.display()
    )]
    TimebinDurDiffer {
        path: PathBuf,
        timebin_dur: f64,
        expected: f64,
    },
    #[error("worker thread panicked during assembly")]
    WorkerPanic,
}

/// Why a file was dropped from the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingSpectKey { key: String },
    LabelsNotInLabelset { extra: Vec<String> },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingSpectKey { key } => {
                write!(f, "did not find a spectrogram under key '{key}'")
            }
            SkipReason::LabelsNotInLabelset { extra } => {
                write!(f, "found labels {extra:?} that are not in the labelset")
            }
        }
    }
}

/// One dropped file and the reason it was dropped.
#[derive(Debug, Clone)]
pub struct Skip {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Counts and per-file skip records from one assembly run.
///
/// Returned alongside the dataset so callers can detect dropped files
/// without scraping logs.
#[derive(Debug, Clone, Default)]
pub struct PrepReport {
    pub n_files: usize,
    pub n_assembled: usize,
    pub skips: Vec<Skip>,
}

impl PrepReport {
    pub fn n_skipped(&self) -> usize {
        self.skips.len()
    }
}

/// Options for [`assemble`].
///
/// Exactly one of `dir`, `files`, and `map` selects the input mode; the
/// first two pair files with `annots` positionally.
#[derive(Debug, Clone)]
pub struct AssembleOpts {
    pub dir: Option<PathBuf>,
    pub files: Option<Vec<PathBuf>>,
    pub map: Option<Vec<(PathBuf, Annotation)>>,
    pub annots: Option<Vec<Annotation>>,
    pub labelset: Option<BTreeSet<String>>,
    pub skip_files_with_labels_not_in_labelset: bool,
    /// Load spectrograms into memory. Set false to defer loading and bound
    /// memory use over large datasets.
    pub load_spects: bool,
    /// Decimal places kept when truncating the timebin duration.
    pub n_decimals_trunc: u32,
    /// Absolute tolerance when comparing truncated timebin durations
    /// across files.
    pub timebin_dur_tol: f64,
    pub keys: ArrayKeys,
    pub n_workers: usize,
}

impl Default for AssembleOpts {
    fn default() -> Self {
        Self {
            dir: None,
            files: None,
            map: None,
            annots: None,
            labelset: None,
            skip_files_with_labels_not_in_labelset: false,
            load_spects: true,
            n_decimals_trunc: 3,
            timebin_dur_tol: 1e-6,
            keys: ArrayKeys::default(),
            n_workers: 4,
        }
    }
}

impl AssembleOpts {
    fn validate(&self) -> Result<(), AssembleError> {
        let n_modes = [self.dir.is_some(), self.files.is_some(), self.map.is_some()]
            .iter()
            .filter(|m| **m)
            .count();
        if n_modes == 0 {
            return Err(AssembleError::NoInput);
        }
        if n_modes > 1 {
            return Err(AssembleError::ConflictingInputs);
        }
        if self.map.is_some() && self.annots.is_some() {
            return Err(AssembleError::ConflictingInputs);
        }
        if self.skip_files_with_labels_not_in_labelset && self.labelset.is_none() {
            return Err(AssembleError::LabelsetRequired);
        }
        Ok(())
    }
}

struct Built {
    vocal: Vocalization,
    freq_bins: Array1<f64>,
    timebin_dur: f64,
}

enum BuildOutcome {
    Built(Box<Built>),
    Skipped(SkipReason),
}

/// Assemble a [`VocalDataset`] from array files and their annotations.
///
/// Per-file loading and validation run on a bounded worker pool; the final
/// record order is re-derived from the input order once all workers have
/// finished. Fatal errors abort the whole assembly, so no partially
/// consistent dataset is ever returned.
pub fn assemble(
    format: ArrayFormat,
    opts: AssembleOpts,
) -> Result<(VocalDataset, PrepReport), AssembleError> {
    opts.validate()?;
    let items = build_work_list(format, &opts)?;
    let n = items.len();
    let paths: Vec<PathBuf> = items.iter().map(|(path, _)| path.clone()).collect();

    log::info!("creating vocal dataset from {} .{} files", n, format);

    let n_workers = opts.n_workers.clamp(1, n.max(1));
    let slots = thread::scope(|s| {
        let (task_tx, task_rx) = bounded::<(usize, PathBuf, Annotation)>(n_workers * 2);
        let (result_tx, result_rx) =
            bounded::<(usize, Result<BuildOutcome, AssembleError>)>(n_workers * 2);

        for _ in 0..n_workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let opts = &opts;
            s.spawn(move || {
                for (index, path, annot) in task_rx.iter() {
                    let out = build_vocal(&path, annot, format, opts);
                    if result_tx.send((index, out)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        s.spawn(move || {
            for (index, (path, annot)) in items.into_iter().enumerate() {
                if task_tx.send((index, path, annot)).is_err() {
                    break;
                }
            }
        });

        let mut slots: Vec<Option<Result<BuildOutcome, AssembleError>>> =
            (0..n).map(|_| None).collect();
        for _ in 0..n {
            match result_rx.recv() {
                Ok((index, out)) => slots[index] = Some(out),
                Err(_) => break,
            }
        }
        slots
    });

    // Join barrier has passed; apply the skip/fatal split in input order.
    let mut vocals = Vec::new();
    let mut skips = Vec::new();
    let mut reference: Option<(Array1<f64>, f64)> = None;
    for (index, slot) in slots.into_iter().enumerate() {
        let path = &paths[index];
        let outcome = slot.ok_or(AssembleError::WorkerPanic)??;
        match outcome {
            BuildOutcome::Skipped(reason) => {
                log::info!("skipping {}: {}", path.display(), reason);
                skips.push(Skip {
                    path: path.clone(),
                    reason,
                });
            }
            BuildOutcome::Built(built) => {
                let Built {
                    vocal,
                    freq_bins,
                    timebin_dur,
                } = *built;
                match &reference {
                    Some((ref_freq_bins, ref_dur)) => {
                        if &freq_bins != ref_freq_bins {
                            return Err(AssembleError::FreqBinsDiffer { path: path.clone() });
                        }
                        if (timebin_dur - ref_dur).abs() > opts.timebin_dur_tol {
                            return Err(AssembleError::TimebinDurDiffer {
                                path: path.clone(),
                                timebin_dur,
                                expected: *ref_dur,
                            });
                        }
                    }
                    None => reference = Some((freq_bins, timebin_dur)),
                }
                vocals.push(vocal);
            }
        }
    }

    let (freq_bins, timebin_dur) = match reference {
        Some(reference) => reference,
        None => {
            if n > 0 {
                log::warn!("all {n} files were skipped; dataset is empty");
            }
            (Array1::zeros(0), 0.0)
        }
    };

    let report = PrepReport {
        n_files: n,
        n_assembled: vocals.len(),
        skips,
    };
    log::info!(
        "assembled {} vocalizations ({} skipped)",
        report.n_assembled,
        report.n_skipped()
    );

    Ok((VocalDataset::new(vocals, freq_bins, timebin_dur), report))
}

fn build_work_list(
    format: ArrayFormat,
    opts: &AssembleOpts,
) -> Result<Vec<(PathBuf, Annotation)>, AssembleError> {
    if let Some(map) = &opts.map {
        return Ok(map.clone());
    }

    let files: Vec<PathBuf> = if let Some(dir) = &opts.dir {
        let entries = std::fs::read_dir(dir).map_err(|source| AssembleError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| AssembleError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(format.extension()) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(AssembleError::NoFilesFound {
                dir: dir.clone(),
                extension: format.extension(),
            });
        }
        files.sort();
        files
    } else if let Some(files) = &opts.files {
        files.clone()
    } else {
        return Err(AssembleError::NoInput);
    };

    let annots = opts.annots.as_ref().ok_or(AssembleError::AnnotsRequired)?;
    if files.len() != annots.len() {
        return Err(AssembleError::AnnotCountMismatch {
            n_files: files.len(),
            n_annots: annots.len(),
        });
    }
    Ok(files.into_iter().zip(annots.iter().cloned()).collect())
}

fn build_vocal(
    path: &Path,
    annot: Annotation,
    format: ArrayFormat,
    opts: &AssembleOpts,
) -> Result<BuildOutcome, AssembleError> {
    let arrays = match load_spect_arrays(path, format, &opts.keys) {
        Ok(arrays) => arrays,
        Err(ArrayFileError::MissingKey { key, .. }) if key == opts.keys.spect => {
            return Ok(BuildOutcome::Skipped(SkipReason::MissingSpectKey { key }));
        }
        Err(e) => return Err(e.into()),
    };

    if opts.skip_files_with_labels_not_in_labelset {
        if let Some(allowed) = &opts.labelset {
            let extra: Vec<String> = annot
                .labelset()
                .into_iter()
                .filter(|label| !allowed.contains(*label))
                .map(|label| label.to_string())
                .collect();
            if !extra.is_empty() {
                return Ok(BuildOutcome::Skipped(SkipReason::LabelsNotInLabelset {
                    extra,
                }));
            }
        }
    }

    let timebin_dur = timebin_dur_from_vec(&arrays.time_bins, opts.n_decimals_trunc)?;
    let duration = arrays.time_bins.len() as f64 * timebin_dur;
    let freq_bins = arrays.freq_bins.clone();

    let spect = if opts.load_spects {
        SpectSource::Loaded(Spectrogram::new(
            arrays.freq_bins,
            arrays.time_bins,
            timebin_dur,
            arrays.spect,
        )?)
    } else {
        SpectSource::File(path.to_path_buf())
    };

    let audio_path = annot.audio_path().cloned();
    Ok(BuildOutcome::Built(Box::new(Built {
        vocal: Vocalization {
            annot,
            spect_path: path.to_path_buf(),
            spect,
            audio_path,
            duration,
        },
        freq_bins,
        timebin_dur,
    })))
}
