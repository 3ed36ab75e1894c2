//! Array-file loading for precomputed spectrograms.
//!
//! Two on-disk formats are supported, numpy `.npz` archives and MATLAB
//! `.mat` files. Both are dictionary-like containers; the spectrogram
//! matrix and its two bin vectors are looked up by configurable key names
//! and returned behind one typed contract, so callers never branch on
//! format after load.

use ndarray::{Array1, Array2, ShapeBuilder};
use ndarray_npy::{NpzReader, ReadNpzError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArrayFileError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("npz error reading {}: {source}", path.display())]
    Npz {
        path: PathBuf,
        #[source]
        source: ReadNpzError,
    },
    #[error("mat error reading {}: {source}", path.display())]
    Mat {
        path: PathBuf,
        #[source]
        source: matfile::Error,
    },
    #[error("did not find key '{key}' in array file {}", path.display())]
    MissingKey { path: PathBuf, key: String },
    #[error("array '{key}' in {} is not a 2-D matrix", path.display())]
    NotAMatrix { path: PathBuf, key: String },
    #[error("array '{key}' in {} is not a vector", path.display())]
    NotAVector { path: PathBuf, key: String },
    #[error("array '{key}' in {} has an unsupported numeric class", path.display())]
    UnsupportedClass { path: PathBuf, key: String },
    #[error("array '{key}' in {} has inconsistent data size for its shape", path.display())]
    InconsistentData { path: PathBuf, key: String },
    #[error(
        "length of frequency bins ({n_freq_bins}) in {} does not match number of rows ({n_rows}) in spectrogram",
        path.display()
    )]
    FreqBinMismatch {
        path: PathBuf,
        n_freq_bins: usize,
        n_rows: usize,
    },
    #[error(
        "length of time bins ({n_time_bins}) in {} does not match number of columns ({n_cols}) in spectrogram",
        path.display()
    )]
    TimeBinMismatch {
        path: PathBuf,
        n_time_bins: usize,
        n_cols: usize,
    },
}

/// On-disk format of spectrogram array files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayFormat {
    Npz,
    Mat,
}

impl ArrayFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArrayFormat::Npz => "npz",
            ArrayFormat::Mat => "mat",
        }
    }
}

impl fmt::Display for ArrayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Key names for the spectrogram and bin vectors inside an array file.
#[derive(Debug, Clone)]
pub struct ArrayKeys {
    pub spect: String,
    pub freq_bins: String,
    pub time_bins: String,
}

impl Default for ArrayKeys {
    fn default() -> Self {
        Self {
            spect: "s".into(),
            freq_bins: "f".into(),
            time_bins: "t".into(),
        }
    }
}

/// The three arrays loaded from one file, shape-checked.
#[derive(Debug, Clone)]
pub struct SpectArrays {
    pub spect: Array2<f64>,
    pub freq_bins: Array1<f64>,
    pub time_bins: Array1<f64>,
}

/// Load spectrogram, frequency-bin and time-bin arrays from one file.
///
/// Enforces that the frequency-bin length equals the spectrogram row count
/// and the time-bin length equals its column count; violations are fatal.
/// A missing key is reported as `ArrayFileError::MissingKey` so callers can
/// apply their skip policy for the spectrogram key.
pub fn load_spect_arrays(
    path: &Path,
    format: ArrayFormat,
    keys: &ArrayKeys,
) -> Result<SpectArrays, ArrayFileError> {
    let arrays = match format {
        ArrayFormat::Npz => load_npz(path, keys)?,
        ArrayFormat::Mat => load_mat(path, keys)?,
    };

    if arrays.freq_bins.len() != arrays.spect.nrows() {
        return Err(ArrayFileError::FreqBinMismatch {
            path: path.to_path_buf(),
            n_freq_bins: arrays.freq_bins.len(),
            n_rows: arrays.spect.nrows(),
        });
    }
    if arrays.time_bins.len() != arrays.spect.ncols() {
        return Err(ArrayFileError::TimeBinMismatch {
            path: path.to_path_buf(),
            n_time_bins: arrays.time_bins.len(),
            n_cols: arrays.spect.ncols(),
        });
    }

    Ok(arrays)
}

fn load_npz(path: &Path, keys: &ArrayKeys) -> Result<SpectArrays, ArrayFileError> {
    let file = File::open(path).map_err(|source| ArrayFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let npz_err = |source| ArrayFileError::Npz {
        path: path.to_path_buf(),
        source,
    };
    let mut npz = NpzReader::new(file).map_err(npz_err)?;
    let names = npz.names().map_err(npz_err)?;

    // numpy's savez stores entries with a .npy suffix
    let resolve = |key: &str| {
        names
            .iter()
            .find(|n| n.as_str() == key || n.trim_end_matches(".npy") == key)
            .cloned()
            .ok_or_else(|| ArrayFileError::MissingKey {
                path: path.to_path_buf(),
                key: key.to_string(),
            })
    };

    let spect_name = resolve(&keys.spect)?;
    let freq_name = resolve(&keys.freq_bins)?;
    let time_name = resolve(&keys.time_bins)?;

    let spect: Array2<f64> = npz.by_name(&spect_name).map_err(npz_err)?;
    let freq_bins: Array1<f64> = npz.by_name(&freq_name).map_err(npz_err)?;
    let time_bins: Array1<f64> = npz.by_name(&time_name).map_err(npz_err)?;

    Ok(SpectArrays {
        spect,
        freq_bins,
        time_bins,
    })
}

fn load_mat(path: &Path, keys: &ArrayKeys) -> Result<SpectArrays, ArrayFileError> {
    let file = File::open(path).map_err(|source| ArrayFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mat = matfile::MatFile::parse(file).map_err(|source| ArrayFileError::Mat {
        path: path.to_path_buf(),
        source,
    })?;

    let find = |key: &str| {
        mat.find_by_name(key).ok_or_else(|| ArrayFileError::MissingKey {
            path: path.to_path_buf(),
            key: key.to_string(),
        })
    };

    let spect = mat_matrix(path, &keys.spect, find(&keys.spect)?)?;
    let freq_bins = mat_vector(path, &keys.freq_bins, find(&keys.freq_bins)?)?;
    let time_bins = mat_vector(path, &keys.time_bins, find(&keys.time_bins)?)?;

    Ok(SpectArrays {
        spect,
        freq_bins,
        time_bins,
    })
}

fn mat_data(path: &Path, key: &str, arr: &matfile::Array) -> Result<Vec<f64>, ArrayFileError> {
    match arr.data() {
        matfile::NumericData::Double { real, .. } => Ok(real.clone()),
        matfile::NumericData::Single { real, .. } => {
            Ok(real.iter().map(|&v| v as f64).collect())
        }
        _ => Err(ArrayFileError::UnsupportedClass {
            path: path.to_path_buf(),
            key: key.to_string(),
        }),
    }
}

/// MATLAB stores matrices column-major; rewrite to standard layout so
/// downstream window views can be taken without copying.
fn mat_matrix(path: &Path, key: &str, arr: &matfile::Array) -> Result<Array2<f64>, ArrayFileError> {
    let dims = arr.size();
    if dims.len() != 2 {
        return Err(ArrayFileError::NotAMatrix {
            path: path.to_path_buf(),
            key: key.to_string(),
        });
    }
    let (rows, cols) = (dims[0], dims[1]);
    let data = mat_data(path, key, arr)?;
    let col_major =
        Array2::from_shape_vec((rows, cols).f(), data).map_err(|_| {
            ArrayFileError::InconsistentData {
                path: path.to_path_buf(),
                key: key.to_string(),
            }
        })?;
    Ok(col_major.as_standard_layout().into_owned())
}

fn mat_vector(path: &Path, key: &str, arr: &matfile::Array) -> Result<Array1<f64>, ArrayFileError> {
    let dims = arr.size();
    let is_vector = match dims.len() {
        1 => true,
        2 => dims[0] == 1 || dims[1] == 1,
        _ => false,
    };
    if !is_vector {
        return Err(ArrayFileError::NotAVector {
            path: path.to_path_buf(),
            key: key.to_string(),
        });
    }
    let data = mat_data(path, key, arr)?;
    Ok(Array1::from_vec(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_npy::NpzWriter;

    fn write_npz(path: &Path, spect: &Array2<f64>, freq: &Array1<f64>, time: &Array1<f64>) {
        let mut npz = NpzWriter::new(File::create(path).unwrap());
        npz.add_array("s", spect).unwrap();
        npz.add_array("f", freq).unwrap();
        npz.add_array("t", time).unwrap();
        npz.finish().unwrap();
    }

    #[test]
    fn test_load_npz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.npz");
        let spect = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let freq = array![100.0, 200.0];
        let time = array![0.0, 0.002, 0.004];
        write_npz(&path, &spect, &freq, &time);

        let arrays = load_spect_arrays(&path, ArrayFormat::Npz, &ArrayKeys::default()).unwrap();
        assert_eq!(arrays.spect, spect);
        assert_eq!(arrays.freq_bins, freq);
        assert_eq!(arrays.time_bins, time);
    }

    #[test]
    fn test_missing_spect_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("f", &array![100.0, 200.0]).unwrap();
        npz.add_array("t", &array![0.0, 0.002]).unwrap();
        npz.finish().unwrap();

        let err = load_spect_arrays(&path, ArrayFormat::Npz, &ArrayKeys::default()).unwrap_err();
        match err {
            ArrayFileError::MissingKey { key, .. } => assert_eq!(key, "s"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn test_freq_bin_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npz");
        // 5x10 spectrogram paired with 4 freq bins
        let spect = Array2::<f64>::zeros((5, 10));
        let freq = Array1::<f64>::zeros(4);
        let time = Array1::from_iter((0..10).map(|i| i as f64 * 0.002));
        write_npz(&path, &spect, &freq, &time);

        let err = load_spect_arrays(&path, ArrayFormat::Npz, &ArrayKeys::default()).unwrap_err();
        assert!(matches!(
            err,
            ArrayFileError::FreqBinMismatch {
                n_freq_bins: 4,
                n_rows: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_time_bin_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npz");
        let spect = Array2::<f64>::zeros((2, 10));
        let freq = Array1::<f64>::zeros(2);
        let time = Array1::<f64>::zeros(9);
        write_npz(&path, &spect, &freq, &time);

        let err = load_spect_arrays(&path, ArrayFormat::Npz, &ArrayKeys::default()).unwrap_err();
        assert!(matches!(err, ArrayFileError::TimeBinMismatch { .. }));
    }

    #[test]
    fn test_custom_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("spect", &Array2::<f64>::zeros((2, 3))).unwrap();
        npz.add_array("freqs", &Array1::<f64>::zeros(2)).unwrap();
        npz.add_array("times", &Array1::<f64>::zeros(3)).unwrap();
        npz.finish().unwrap();

        let keys = ArrayKeys {
            spect: "spect".into(),
            freq_bins: "freqs".into(),
            time_bins: "times".into(),
        };
        let arrays = load_spect_arrays(&path, ArrayFormat::Npz, &keys).unwrap();
        assert_eq!(arrays.spect.dim(), (2, 3));
    }
}
