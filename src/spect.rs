//! Spectrogram record and STFT computation.
//!
//! A `Spectrogram` pairs a 2-D array with the frequency-bin and time-bin
//! vectors describing its axes. The STFT path (Hann window -> real FFT ->
//! log power) generates one from raw audio during dataset preparation.

use crate::audio::Audio;
use ndarray::{Array1, Array2};
use realfft::{RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpectError {
    #[error(
        "spectrogram array is {rows}x{cols} but there are {n_freq} freq bins and {n_time} time bins"
    )]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        n_freq: usize,
        n_time: usize,
    },
    #[error("need at least two time bins to compute timebin duration, got {0}")]
    TooFewTimeBins(usize),
    #[error("signal with {n_samples} samples is shorter than one FFT frame of {n_fft}")]
    ShortSignal { n_samples: usize, n_fft: usize },
}

/// A spectrogram and the bin vectors describing its axes.
///
/// The array has shape (freq bins, time bins); the constructor enforces this
/// and the record is immutable afterwards.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    freq_bins: Array1<f64>,
    time_bins: Array1<f64>,
    timebin_dur: f64,
    array: Array2<f64>,
}

impl Spectrogram {
    pub fn new(
        freq_bins: Array1<f64>,
        time_bins: Array1<f64>,
        timebin_dur: f64,
        array: Array2<f64>,
    ) -> Result<Self, SpectError> {
        let (rows, cols) = array.dim();
        if rows != freq_bins.len() || cols != time_bins.len() {
            return Err(SpectError::ShapeMismatch {
                rows,
                cols,
                n_freq: freq_bins.len(),
                n_time: time_bins.len(),
            });
        }
        Ok(Self {
            freq_bins,
            time_bins,
            timebin_dur,
            array,
        })
    }

    pub fn freq_bins(&self) -> &Array1<f64> {
        &self.freq_bins
    }

    pub fn time_bins(&self) -> &Array1<f64> {
        &self.time_bins
    }

    pub fn timebin_dur(&self) -> f64 {
        self.timebin_dur
    }

    pub fn array(&self) -> &Array2<f64> {
        &self.array
    }

    pub fn num_time_bins(&self) -> usize {
        self.time_bins.len()
    }

    /// Duration in seconds: time bin count times timebin duration.
    pub fn duration(&self) -> f64 {
        self.time_bins.len() as f64 * self.timebin_dur
    }
}

/// Timebin duration from a vector of time-bin centers: the median of the
/// consecutive differences, truncated to `n_decimals_trunc` decimal places.
pub fn timebin_dur_from_vec(
    time_bins: &Array1<f64>,
    n_decimals_trunc: u32,
) -> Result<f64, SpectError> {
    if time_bins.len() < 2 {
        return Err(SpectError::TooFewTimeBins(time_bins.len()));
    }
    let mut diffs: Vec<f64> = time_bins
        .iter()
        .zip(time_bins.iter().skip(1))
        .map(|(a, b)| b - a)
        .collect();
    diffs.sort_by(|a, b| a.total_cmp(b));
    let mid = diffs.len() / 2;
    let median = if diffs.len() % 2 == 1 {
        diffs[mid]
    } else {
        (diffs[mid - 1] + diffs[mid]) / 2.0
    };
    let scale = 10f64.powi(n_decimals_trunc as i32);
    // a median like 1.9999999999999998 * 1e-3 must truncate as 2, not 1
    Ok(((median * scale) + 1e-9).trunc() / scale)
}

/// STFT parameters.
#[derive(Debug, Clone)]
pub struct StftConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32000,
            n_fft: 512,
            hop_length: 64, // 2ms at 32kHz
        }
    }
}

/// Precomputed STFT transform: Hann window -> real FFT -> log power.
pub struct StftTransform {
    config: StftConfig,
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
}

impl StftTransform {
    pub fn new(config: StftConfig) -> Self {
        let mut planner = RealFftPlanner::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        // Hann window
        let window: Vec<f64> = (0..config.n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / config.n_fft as f64).cos()))
            .collect();

        Self {
            config,
            fft,
            window,
        }
    }

    /// Output shape (freq bins, time bins) for a given input length.
    pub fn output_shape(&self, n_samples: usize) -> (usize, usize) {
        let n_frames = if n_samples >= self.config.n_fft {
            (n_samples - self.config.n_fft) / self.config.hop_length + 1
        } else {
            0
        };
        (self.config.n_fft / 2 + 1, n_frames)
    }

    /// Compute a log-power spectrogram with frequency bins in Hz and time
    /// bins in seconds at frame centers.
    pub fn transform(&self, audio: &Audio) -> Result<Spectrogram, SpectError> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let sr = self.config.sample_rate as f64;
        let samples = &audio.samples;

        let (n_bins, n_frames) = self.output_shape(samples.len());
        if n_frames == 0 {
            return Err(SpectError::ShortSignal {
                n_samples: samples.len(),
                n_fft,
            });
        }

        let mut array = Array2::<f64>::zeros((n_bins, n_frames));

        // Scratch buffers
        let mut input = vec![0.0f64; n_fft];
        let mut spectrum = self.fft.make_output_vec();

        for frame in 0..n_frames {
            let start = frame * hop;
            for i in 0..n_fft {
                input[i] = samples[start + i] * self.window[i];
            }
            self.fft
                .process(&mut input, &mut spectrum)
                .expect("FFT failed");
            for (bin, c) in spectrum.iter().enumerate() {
                // Log with floor to avoid -inf
                array[[bin, frame]] = c.norm_sqr().max(1e-10).ln();
            }
        }

        let freq_bins = Array1::from_iter((0..n_bins).map(|k| k as f64 * sr / n_fft as f64));
        let time_bins =
            Array1::from_iter((0..n_frames).map(|t| (t * hop + n_fft / 2) as f64 / sr));
        let timebin_dur = hop as f64 / sr;

        Spectrogram::new(freq_bins, time_bins, timebin_dur, array)
    }
}
