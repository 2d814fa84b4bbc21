use serde::Serialize;

use crate::identity::dna::MusicalDna;
use crate::identity::extractor::IdentityRecord;
use crate::identity::instruments::InstrumentEvents;
use crate::identity::serenity::SerenityState;
use crate::identity::visual::VisualMapping;

/// Per-tick band energies with every smoothing stage exposed.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BandSpectrum {
    /// Per-band EMA, fastest responding
    pub fast: Vec<f32>,
    /// Uniform EMA over `fast`
    pub medium: Vec<f32>,
    /// Uniform EMA over `medium`; what downstream extractors read
    pub slow: Vec<f32>,
    /// Boosted, compressed and max-normalized bands before smoothing (0.0-1.0)
    pub normalized: Vec<f32>,
    /// Center frequency of each band in Hz
    pub band_centers: Vec<f32>,
    /// Frequency of the strongest FFT bin in Hz
    pub dominant_freq: f32,
    /// Peak-density score of the full magnitude spectrum (0.0-1.0)
    pub harmonic_richness: f32,
    /// True when the transform was skipped for a silent chunk
    pub silent: bool,
}

impl BandSpectrum {
    /// Defined state for a silent chunk: every band zero.
    pub fn silent(band_centers: &[f32]) -> Self {
        let bands = band_centers.len();
        Self {
            fast: vec![0.0; bands],
            medium: vec![0.0; bands],
            slow: vec![0.0; bands],
            normalized: vec![0.0; bands],
            band_centers: band_centers.to_vec(),
            dominant_freq: 0.0,
            harmonic_richness: 0.0,
            silent: true,
        }
    }

    /// The spectrum consumers should use.
    pub fn current(&self) -> &[f32] {
        &self.slow
    }

    pub fn total_energy(&self) -> f32 {
        self.slow.iter().sum()
    }

    /// Sum of absolute differences between adjacent bands.
    pub fn spectral_flux(&self) -> f32 {
        self.slow.windows(2).map(|w| (w[1] - w[0]).abs()).sum()
    }
}

/// Result of the energy-envelope detector for one chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OnsetEvent {
    pub beat: bool,
    /// `max(0, (energy - mean) / mean)`; unbounded above
    pub onset_strength: f32,
}

/// Read-only snapshot handed to consumers once per tick.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisFrame {
    /// Playback position the chunk was read at, in seconds
    pub time: f64,
    /// Number of completed ticks
    pub tick: u64,
    /// The chunk read landed past the end of the sample data
    pub exhausted: bool,
    pub spectrum: BandSpectrum,
    pub beat: bool,
    pub onset_strength: f32,
    pub total_energy: f32,
    pub spectral_flux: f32,
    pub identity: IdentityRecord,
    pub dna: MusicalDna,
    pub instruments: InstrumentEvents,
    pub visual: VisualMapping,
    pub serenity: SerenityState,
}
