//! Dataset preparation for birdsong frame-classification models.
//!
//! Pipeline:
//! array files (.npz / .mat) -> loader -> vocalization records -> manifest + metadata
//! -> window-indexed dataset serving (spectrogram window, frame-label window) pairs
//!
//! - Parallel per-file loading and validation (bounded worker pool)
//! - Cross-file consistency checks (frequency bins, timebin duration)
//! - Pure windowing transforms: pad-to-window, window-batch views, seeded
//!   random windows, per-frequency-bin standardization
//! - CSV manifest + JSON metadata persistence

pub mod annot;
pub mod array_file;
pub mod assemble;
pub mod audio;
pub mod dataset;
pub mod manifest;
pub mod metadata;
pub mod spect;
pub mod transforms;
pub mod window_dataset;

pub use annot::Annotation;
pub use array_file::{ArrayFormat, ArrayKeys};
pub use assemble::{assemble, AssembleOpts, PrepReport};
pub use dataset::{SpectSource, VocalDataset, Vocalization};
pub use manifest::{ManifestRow, Split};
pub use metadata::{InputType, Metadata};
pub use spect::Spectrogram;
pub use transforms::SpectScaler;
pub use window_dataset::{WindowDataset, WindowSample};
