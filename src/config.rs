//! Calibration tables and the TOML configuration file.
//!
//! Every heuristic constant the spectrum and onset stages depend on lives here
//! as a named table, selected by [`Mode`] and optionally overridden from
//! `sonicdna.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Analysis resolution. Picks chunk length, band count and the matching tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// 1024-sample chunks, 8 perceptual bands, fast per-band smoothing
    #[default]
    Dashboard,
    /// 512-sample chunks, 16 equal-width bands, very slow triple smoothing
    Delicate,
}

impl Mode {
    pub fn chunk_size(self) -> usize {
        match self {
            Mode::Dashboard => 1024,
            Mode::Delicate => 512,
        }
    }

    pub fn band_count(self) -> usize {
        match self {
            Mode::Dashboard => 8,
            Mode::Delicate => 16,
        }
    }

    pub fn spectrum_tables(self) -> SpectrumTables {
        match self {
            Mode::Dashboard => SpectrumTables {
                layout: BandLayout::Edges(DASHBOARD_BAND_EDGES.to_vec()),
                aggregation: Aggregation::Rms,
                boost: DASHBOARD_BOOST.to_vec(),
                compression: DASHBOARD_COMPRESSION.to_vec(),
                band_alpha: DASHBOARD_BAND_ALPHA.to_vec(),
                medium_alpha: 0.5,
                slow_alpha: 1.0,
            },
            Mode::Delicate => SpectrumTables {
                layout: BandLayout::Linear(16),
                aggregation: Aggregation::Mean,
                boost: vec![1.0; 16],
                compression: vec![1.0; 16],
                band_alpha: vec![0.02; 16],
                medium_alpha: 0.05,
                slow_alpha: 0.1,
            },
        }
    }
}

/// Band edges in Hz for the 8-band layout (sub-bass and low bass merged).
pub const DASHBOARD_BAND_EDGES: [f32; 9] =
    [20.0, 80.0, 110.0, 165.0, 360.0, 630.0, 960.0, 2400.0, 20000.0];

/// Gain per band; the lowest band gets the most.
pub const DASHBOARD_BOOST: [f32; 8] = [3.0, 2.2, 1.9, 1.7, 1.5, 1.7, 2.0, 2.8];

/// Power-law exponents, softer on the low and mid bands.
pub const DASHBOARD_COMPRESSION: [f32; 8] = [0.70, 0.68, 0.68, 0.66, 0.68, 0.72, 0.75, 0.80];

/// First-stage EMA coefficients; low bands respond faster to kicks.
pub const DASHBOARD_BAND_ALPHA: [f32; 8] = [0.50, 0.40, 0.35, 0.32, 0.35, 0.42, 0.50, 0.60];

/// How frequency bins are grouped into bands.
#[derive(Debug, Clone, PartialEq)]
pub enum BandLayout {
    /// Contiguous bands between consecutive edges (Hz); `edges.len() == bands + 1`
    Edges(Vec<f32>),
    /// `n` equal-width slices of the positive-frequency axis
    Linear(usize),
}

impl BandLayout {
    pub fn band_count(&self) -> usize {
        match self {
            BandLayout::Edges(edges) => edges.len().saturating_sub(1),
            BandLayout::Linear(n) => *n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Rms,
    Mean,
}

/// Everything the spectral band analyzer needs besides the FFT size.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumTables {
    pub layout: BandLayout,
    pub aggregation: Aggregation,
    pub boost: Vec<f32>,
    pub compression: Vec<f32>,
    pub band_alpha: Vec<f32>,
    pub medium_alpha: f32,
    pub slow_alpha: f32,
}

impl SpectrumTables {
    pub fn band_count(&self) -> usize {
        self.layout.band_count()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bands = self.band_count();
        if bands == 0 {
            return Err(ConfigError::InvalidValue {
                field: "layout",
                reason: "at least one band is required".into(),
            });
        }
        if let BandLayout::Edges(edges) = &self.layout {
            if edges.windows(2).any(|w| w[1] <= w[0]) || edges[0] < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "layout",
                    reason: "band edges must be non-negative and strictly ascending".into(),
                });
            }
        }
        check_len("boost", &self.boost, bands)?;
        check_len("compression", &self.compression, bands)?;
        check_len("band_alpha", &self.band_alpha, bands)?;
        if self.boost.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(invalid("boost", "gains must be finite and non-negative"));
        }
        if self.compression.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(invalid("compression", "exponents must be positive"));
        }
        for &alpha in self
            .band_alpha
            .iter()
            .chain([&self.medium_alpha, &self.slow_alpha])
        {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(invalid("alpha", "smoothing coefficients must be in (0, 1]"));
            }
        }
        Ok(())
    }
}

fn check_len(table: &'static str, values: &[f32], expected: usize) -> Result<(), ConfigError> {
    if values.len() != expected {
        return Err(ConfigError::TableLength {
            table,
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

/// Energy-envelope beat detector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetParams {
    /// Bounded energy history length
    pub history_len: usize,
    /// Entries required before any result is emitted
    pub warmup: usize,
    /// Beat fires when energy exceeds `threshold_ratio * mean`
    pub threshold_ratio: f32,
    /// Minimum seconds between two beats
    pub refractory_secs: f64,
    /// Chunk energies below this never fire
    pub energy_floor: f32,
}

impl Default for OnsetParams {
    fn default() -> Self {
        Self {
            history_len: 20,
            warmup: 10,
            threshold_ratio: 1.5,
            refractory_secs: 0.2,
            energy_floor: 1e-8,
        }
    }
}

impl OnsetParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.warmup < 2 || self.history_len < self.warmup {
            return Err(invalid(
                "onset_history",
                "history must hold at least `warmup` entries and warmup must be >= 2",
            ));
        }
        if !(self.threshold_ratio.is_finite() && self.threshold_ratio > 0.0) {
            return Err(invalid("beat_threshold", "must be a positive number"));
        }
        if !(self.refractory_secs.is_finite() && self.refractory_secs >= 0.0) {
            return Err(invalid("refractory_secs", "must be a non-negative number"));
        }
        Ok(())
    }
}

/// Fully resolved analysis parameters for one [`crate::audio::analysis::Analyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub mode: Mode,
    pub chunk_size: usize,
    pub spectrum: SpectrumTables,
    pub onset: OnsetParams,
    /// Chunks whose peak amplitude stays below this are treated as silence
    pub silence_threshold: f32,
}

impl AnalysisConfig {
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            mode,
            chunk_size: mode.chunk_size(),
            spectrum: mode.spectrum_tables(),
            onset: OnsetParams::default(),
            silence_threshold: 1e-6,
        }
    }

    pub fn band_count(&self) -> usize {
        self.spectrum.band_count()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size < 16 {
            return Err(invalid("chunk_size", "must be at least 16 samples"));
        }
        self.spectrum.validate()?;
        self.onset.validate()
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::for_mode(Mode::default())
    }
}

// ---------------------------------------------------------------------------
// sonicdna.toml
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub spectrum: SpectrumOverrides,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisSection {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_refractory")]
    pub refractory_secs: f64,
    #[serde(default = "default_beat_threshold")]
    pub beat_threshold: f32,
    #[serde(default = "default_onset_history")]
    pub onset_history: usize,
    #[serde(default = "default_onset_warmup")]
    pub onset_warmup: usize,
}

/// Optional replacements for the mode's built-in tables.
#[derive(Debug, Default, Deserialize)]
pub struct SpectrumOverrides {
    pub boost: Option<Vec<f32>>,
    pub compression: Option<Vec<f32>>,
    pub band_alpha: Option<Vec<f32>>,
    pub medium_alpha: Option<f32>,
    pub slow_alpha: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default)]
    pub pretty: bool,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            refractory_secs: default_refractory(),
            beat_threshold: default_beat_threshold(),
            onset_history: default_onset_history(),
            onset_warmup: default_onset_warmup(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            stride: default_stride(),
            pretty: false,
        }
    }
}

fn default_refractory() -> f64 { 0.2 }
fn default_beat_threshold() -> f32 { 1.5 }
fn default_onset_history() -> usize { 20 }
fn default_onset_warmup() -> usize { 10 }
fn default_fps() -> u32 { 60 }
fn default_stride() -> usize { 1 }

impl Config {
    /// Resolve the analysis parameters for `mode`, applying file overrides.
    pub fn analysis_config(&self, mode: Mode) -> Result<AnalysisConfig, ConfigError> {
        let mut cfg = AnalysisConfig::for_mode(mode);
        cfg.onset.refractory_secs = self.analysis.refractory_secs;
        cfg.onset.threshold_ratio = self.analysis.beat_threshold;
        cfg.onset.history_len = self.analysis.onset_history;
        cfg.onset.warmup = self.analysis.onset_warmup;

        let tables = &mut cfg.spectrum;
        if let Some(boost) = &self.spectrum.boost {
            tables.boost = boost.clone();
        }
        if let Some(compression) = &self.spectrum.compression {
            tables.compression = compression.clone();
        }
        if let Some(alpha) = &self.spectrum.band_alpha {
            tables.band_alpha = alpha.clone();
        }
        if let Some(alpha) = self.spectrum.medium_alpha {
            tables.medium_alpha = alpha;
        }
        if let Some(alpha) = self.spectrum.slow_alpha {
            tables.slow_alpha = alpha;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

pub fn parse_config(content: &str, path: &Path) -> Result<Config, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, path)
}
