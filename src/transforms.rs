//! Windowing transforms.
//!
//! Pure functions over arrays, no hidden state: per-frequency-bin
//! standardization, seeded random windows, padding to a window multiple
//! with a reconstruction mask, and zero-copy window-batch views.

use ndarray::{s, Array1, Array2, ArrayView2, ArrayView3, Axis, ShapeBuilder};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("window size must be a positive integer, got {0}")]
    InvalidWindowSize(usize),
    #[error(
        "requested window size {window_size} is larger than the number of time bins {num_timebins}"
    )]
    WindowTooLarge {
        window_size: usize,
        num_timebins: usize,
    },
    #[error(
        "window size {window_size} does not divide evenly into array width {width}; pad the array first"
    )]
    DoesNotDivide { window_size: usize, width: usize },
    #[error("array must be contiguous in standard layout to view as windows")]
    NotContiguous,
    #[error("cannot fit a scaler on zero spectrograms")]
    EmptyFit,
    #[error("spectrogram has {rows} frequency rows but the scaler statistics have {expected}")]
    RowCountMismatch { rows: usize, expected: usize },
}

/// Z-score a spectrogram per frequency bin.
///
/// Every row is mean-subtracted; rows flagged in `non_zero_std` are also
/// divided by their standard deviation. Rows with zero deviation are left
/// unscaled so no NaN or Inf is introduced.
pub fn standardize_spect(
    spect: &Array2<f64>,
    mean_freqs: &Array1<f64>,
    std_freqs: &Array1<f64>,
    non_zero_std: &Array1<bool>,
) -> Result<Array2<f64>, TransformError> {
    let rows = spect.nrows();
    if rows != mean_freqs.len() || rows != std_freqs.len() || rows != non_zero_std.len() {
        return Err(TransformError::RowCountMismatch {
            rows,
            expected: mean_freqs.len(),
        });
    }
    let mut tfm = spect - &mean_freqs.view().insert_axis(Axis(1));
    for (i, nz) in non_zero_std.iter().enumerate() {
        if *nz {
            let std = std_freqs[i];
            tfm.row_mut(i).mapv_inplace(|v| v / std);
        }
    }
    Ok(tfm)
}

/// Per-frequency-bin statistics fitted on a set of spectrograms, used to
/// standardize spectrograms at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectScaler {
    mean_freqs: Array1<f64>,
    std_freqs: Array1<f64>,
    non_zero_std: Array1<bool>,
}

impl SpectScaler {
    /// Fit mean and standard deviation per frequency bin across the
    /// concatenated time axis of all given spectrograms.
    pub fn fit<'a, I>(spects: I) -> Result<Self, TransformError>
    where
        I: IntoIterator<Item = ArrayView2<'a, f64>>,
    {
        let mut sums: Option<(Array1<f64>, Array1<f64>)> = None;
        let mut n_cols = 0usize;

        for spect in spects {
            let rows = spect.nrows();
            let (sum, sumsq) =
                sums.get_or_insert_with(|| (Array1::zeros(rows), Array1::zeros(rows)));
            if spect.nrows() != sum.len() {
                return Err(TransformError::RowCountMismatch {
                    rows: spect.nrows(),
                    expected: sum.len(),
                });
            }
            for (i, row) in spect.rows().into_iter().enumerate() {
                for &v in row {
                    sum[i] += v;
                    sumsq[i] += v * v;
                }
            }
            n_cols += spect.ncols();
        }

        let (sum, sumsq) = sums.ok_or(TransformError::EmptyFit)?;
        if n_cols == 0 {
            return Err(TransformError::EmptyFit);
        }

        let count = n_cols as f64;
        let mean_freqs = &sum / count;
        let var = &sumsq / count - &mean_freqs * &mean_freqs;
        let std_freqs = var.mapv(|v| v.max(0.0).sqrt());
        let non_zero_std = std_freqs.mapv(|v| v > 0.0);

        Ok(Self {
            mean_freqs,
            std_freqs,
            non_zero_std,
        })
    }

    pub fn transform(&self, spect: &Array2<f64>) -> Result<Array2<f64>, TransformError> {
        standardize_spect(spect, &self.mean_freqs, &self.std_freqs, &self.non_zero_std)
    }

    pub fn mean_freqs(&self) -> &Array1<f64> {
        &self.mean_freqs
    }

    pub fn std_freqs(&self) -> &Array1<f64> {
        &self.std_freqs
    }

    pub fn non_zero_std(&self) -> &Array1<bool> {
        &self.non_zero_std
    }
}

/// A random contiguous window of `window_size` time bins.
///
/// Returns the whole array as a view when `window_size` equals the number
/// of time bins; otherwise the start offset is drawn uniformly from
/// `[0, T - window_size]` inclusive. Pass a seeded rng for reproducibility.
pub fn random_window<'a, R: Rng>(
    spect: &'a Array2<f64>,
    window_size: usize,
    rng: &mut R,
) -> Result<ArrayView2<'a, f64>, TransformError> {
    if window_size == 0 {
        return Err(TransformError::InvalidWindowSize(0));
    }
    let num_timebins = spect.ncols();
    if window_size > num_timebins {
        return Err(TransformError::WindowTooLarge {
            window_size,
            num_timebins,
        });
    }
    if window_size == num_timebins {
        return Ok(spect.view());
    }
    let start = rng.gen_range(0..=num_timebins - window_size);
    Ok(spect.slice(s![.., start..start + window_size]))
}

/// Pad a 2-D array along its trailing axis up to the next multiple of
/// `window_size`, filling with `padval` at the end only.
///
/// The returned mask has the padded width: `true` over original columns,
/// `false` over padding, so `padded[.., mask]` reconstructs the input.
pub fn pad_to_window<T: Copy>(
    arr: &Array2<T>,
    window_size: usize,
    padval: T,
) -> Result<(Array2<T>, Array1<bool>), TransformError> {
    if window_size == 0 {
        return Err(TransformError::InvalidWindowSize(0));
    }
    let (height, width) = arr.dim();
    let target_width = width.div_ceil(window_size) * window_size;

    let mut padded = Array2::from_elem((height, target_width), padval);
    padded.slice_mut(s![.., ..width]).assign(arr);

    Ok((padded, padding_mask(width, target_width)))
}

/// 1-D counterpart of [`pad_to_window`], e.g. for a frame-label vector.
pub fn pad_to_window_1d<T: Copy>(
    arr: &Array1<T>,
    window_size: usize,
    padval: T,
) -> Result<(Array1<T>, Array1<bool>), TransformError> {
    if window_size == 0 {
        return Err(TransformError::InvalidWindowSize(0));
    }
    let width = arr.len();
    let target_width = width.div_ceil(window_size) * window_size;

    let mut padded = Array1::from_elem(target_width, padval);
    padded.slice_mut(s![..width]).assign(arr);

    Ok((padded, padding_mask(width, target_width)))
}

fn padding_mask(width: usize, target_width: usize) -> Array1<bool> {
    Array1::from_iter((0..target_width).map(|i| i < width))
}

/// View a 2-D array as a batch of non-overlapping windows along the
/// trailing axis, shape (batch, height, window width), without copying.
///
/// The window width must divide the array width evenly; pad with
/// [`pad_to_window`] first.
pub fn view_as_window_batch<T>(
    arr: &Array2<T>,
    window_width: usize,
) -> Result<ArrayView3<'_, T>, TransformError> {
    if window_width == 0 {
        return Err(TransformError::InvalidWindowSize(0));
    }
    let (height, width) = arr.dim();
    if width % window_width != 0 {
        return Err(TransformError::DoesNotDivide {
            window_size: window_width,
            width,
        });
    }
    let slice = arr.as_slice().ok_or(TransformError::NotContiguous)?;
    let batch = width / window_width;
    let view = ArrayView3::from_shape(
        (batch, height, window_width).strides((window_width, width, 1)),
        slice,
    )
    .expect("window batch shape is valid");
    Ok(view)
}

/// 1-D counterpart of [`view_as_window_batch`]: shape (batch, window width).
pub fn view_as_window_batch_1d<T>(
    arr: &Array1<T>,
    window_width: usize,
) -> Result<ArrayView2<'_, T>, TransformError> {
    if window_width == 0 {
        return Err(TransformError::InvalidWindowSize(0));
    }
    let width = arr.len();
    if width % window_width != 0 {
        return Err(TransformError::DoesNotDivide {
            window_size: window_width,
            width,
        });
    }
    let slice = arr.as_slice().ok_or(TransformError::NotContiguous)?;
    let batch = width / window_width;
    let view = ArrayView2::from_shape((batch, window_width).strides((window_width, 1)), slice)
        .expect("window batch shape is valid");
    Ok(view)
}
