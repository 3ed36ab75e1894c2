//! WAV audio reading.
//!
//! Source recordings are uncompressed lab WAVs; multi-channel files are
//! averaged down to mono.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("WAV error reading {}: {source}", path.display())]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("Unsupported sample format in {}: {bits} bits per sample", path.display())]
    UnsupportedFormat { path: PathBuf, bits: u16 },
    #[error("No samples in {}", .0.display())]
    Empty(PathBuf),
}

/// Mono audio samples plus their sample rate.
#[derive(Debug, Clone)]
pub struct Audio {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

impl Audio {
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Duration of a single sample in seconds, the frame duration for
    /// audio-frames input.
    pub fn sample_dur(&self) -> f64 {
        1.0 / self.sample_rate as f64
    }
}

/// Read a WAV file into mono f64 samples.
///
/// Supports 16- and 32-bit integer PCM and 32-bit float. Channels are
/// averaged per frame.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<Audio, AudioError> {
    let path = path.as_ref();
    let wav_err = |source| AudioError::Wav {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f64> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f64 / 32768.0))
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
        (hound::SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f64 / 8388608.0))
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
        (hound::SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f64 / 2147483648.0))
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
        (_, bits) => {
            return Err(AudioError::UnsupportedFormat {
                path: path.to_path_buf(),
                bits,
            })
        }
    };

    if interleaved.is_empty() {
        return Err(AudioError::Empty(path.to_path_buf()));
    }

    let samples = if channels <= 1 {
        interleaved
    } else {
        // Average channels per frame
        let n_frames = interleaved.len() / channels;
        let mut mono = Vec::with_capacity(n_frames);
        for frame in 0..n_frames {
            let mut sum = 0.0;
            for ch in 0..channels {
                sum += interleaved[frame * channels + ch];
            }
            mono.push(sum / channels as f64);
        }
        mono
    };

    Ok(Audio {
        samples,
        sample_rate: spec.sample_rate,
    })
}
