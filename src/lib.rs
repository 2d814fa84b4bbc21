//! Real-time musical feature extraction.
//!
//! An [`Analyzer`] is driven once per display tick with the current playback
//! position. It reads one chunk of samples at that position and returns an
//! [`AnalysisFrame`]: smoothed band energies, beat/onset flags and a set of
//! slower musical descriptors (tempo, genre indicators, the seven-axis
//! musical DNA, instrument transients, visual mapping parameters).

pub mod audio;
pub mod config;
pub mod error;
pub mod identity;
pub mod smoothing;
pub mod stats;

pub use audio::analysis::Analyzer;
pub use audio::buffer::{Chunk, PlaybackClock, SampleBuffer, SteppedClock, WallClock};
pub use audio::features::{AnalysisFrame, BandSpectrum, OnsetEvent};
pub use config::{AnalysisConfig, Mode};
pub use error::{AnalysisError, ConfigError};
