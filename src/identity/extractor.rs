use serde::Serialize;

use crate::smoothing::{Ema, EmaArray, RingBuffer};
use crate::stats::{self, EPSILON};

const BEAT_HISTORY: usize = 100;
const ENERGY_HISTORY: usize = 200;
const CENTROID_HISTORY: usize = 100;
/// Timestamps used per tempo estimate (three intervals).
const TEMPO_WINDOW: usize = 4;
pub const MIN_TEMPO: f32 = 40.0;
pub const MAX_TEMPO: f32 = 200.0;

/// Independent, non-exclusive style scores, each in 0.0-1.0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct GenreIndicators {
    pub percussive: f32,
    pub melodic: f32,
    pub harmonic: f32,
    pub rhythmic: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IdentityRecord {
    /// Beats per minute, always within 40-200
    pub tempo: f32,
    pub energy_level: f32,
    pub spectral_signature: [f32; 12],
    pub harmonic_profile: [f32; 7],
    pub genre: GenreIndicators,
    /// Mean normalized spectral centroid; 0.5 before any energy was seen
    pub brightness: f32,
}

impl Default for IdentityRecord {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            energy_level: 0.3,
            spectral_signature: [0.0; 12],
            harmonic_profile: [0.0; 7],
            genre: GenreIndicators::default(),
            brightness: 0.5,
        }
    }
}

/// Long-horizon descriptors accumulated from the smoothed spectrum and the
/// beat detector output.
pub struct IdentityExtractor {
    beat_times: RingBuffer<f64>,
    energy_history: RingBuffer,
    centroid_history: RingBuffer,
    tempo: Ema,
    energy: Ema,
    signature: EmaArray<12>,
    profile: EmaArray<7>,
    percussive: Ema,
    melodic: Ema,
    harmonic: Ema,
    rhythmic: Ema,
}

impl Default for IdentityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityExtractor {
    pub fn new() -> Self {
        let unit = |retention: f32| Ema::with_retention(0.0, retention).bounded(0.0, 1.0);
        Self {
            beat_times: RingBuffer::new(BEAT_HISTORY),
            energy_history: RingBuffer::new(ENERGY_HISTORY),
            centroid_history: RingBuffer::new(CENTROID_HISTORY),
            tempo: Ema::with_retention(120.0, 0.9).bounded(MIN_TEMPO, MAX_TEMPO),
            energy: Ema::with_retention(0.3, 0.98).bounded(0.0, 1.0),
            signature: EmaArray::with_retention(0.0, 0.98).bounded(0.0, 1.0),
            profile: EmaArray::with_retention(0.0, 0.95).bounded(0.0, 1.0),
            percussive: unit(0.85),
            melodic: unit(0.99),
            harmonic: unit(0.98),
            rhythmic: unit(0.97),
        }
    }

    /// Fold one tick into the accumulators. `now` is the playback position
    /// in seconds and only matters on beat ticks.
    pub fn update(&mut self, spectrum: &[f32], beat: bool, onset_strength: f32, now: f64) {
        let bands = spectrum.len();
        if bands == 0 {
            return;
        }

        let total: f32 = spectrum.iter().sum();
        if total > EPSILON {
            self.centroid_history
                .push(stats::centroid(spectrum) / bands as f32);
        }

        let energy = spectrum.iter().map(|v| v * v).sum::<f32>() / bands as f32;
        self.energy_history.push(energy);

        for i in 0..12 {
            let value = stats::mean_range(spectrum, i * bands / 12, (i + 1) * bands / 12);
            self.signature.update_at(i, value);
        }
        for i in 0..7 {
            let value = stats::mean_range(spectrum, i * bands / 7, (i + 1) * bands / 7);
            self.profile.update_at(i, value);
        }

        if beat {
            self.beat_times.push(now);
            self.update_tempo();
        }

        if self.energy_history.len() > 10 {
            let recent = self.energy_history.recent_vec(10);
            let variance = stats::variance(&recent);
            let bass = stats::mean_range(spectrum, 0, 3);

            let current = recent[recent.len() - 1];
            let previous = (recent[recent.len() - 3] + recent[recent.len() - 2]) * 0.5;
            let transient = if current > previous * 1.3 {
                ((current - previous) / (previous + 0.01)).min(1.0)
            } else {
                0.0
            };

            self.percussive
                .update(variance * 0.3 + bass * 0.4 + transient * 0.3);
            self.melodic.update(1.0 - variance);
        }

        if spectrum.iter().any(|&v| v > 0.0) {
            // std/mean peaks at sqrt(B - 1) when one band holds all energy
            let spread = stats::coefficient_of_variation(spectrum)
                / ((bands.max(2) - 1) as f32).sqrt();
            self.harmonic.update(spread);
        }

        self.rhythmic.update(onset_strength.min(1.0));
        self.energy.update(self.energy_history.mean_recent(20));
    }

    fn update_tempo(&mut self) {
        if self.beat_times.len() < TEMPO_WINDOW {
            return;
        }
        let stamps = self.beat_times.recent_vec(TEMPO_WINDOW);
        let mean_interval =
            stamps.windows(2).map(|w| w[1] - w[0]).sum::<f64>() / (TEMPO_WINDOW - 1) as f64;
        if mean_interval <= 0.0 {
            return;
        }
        let bpm = (60.0 / mean_interval) as f32;
        if (MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
            let tempo = self.tempo.update(bpm);
            log::debug!("tempo sample {:.1} BPM accepted, estimate {:.1}", bpm, tempo);
        } else {
            log::trace!("tempo sample {:.1} BPM rejected", bpm);
        }
    }

    pub fn tempo(&self) -> f32 {
        self.tempo.value()
    }

    pub fn record(&self) -> IdentityRecord {
        IdentityRecord {
            tempo: self.tempo.value(),
            energy_level: self.energy.value(),
            spectral_signature: *self.signature.values(),
            harmonic_profile: *self.profile.values(),
            genre: GenreIndicators {
                percussive: self.percussive.value(),
                melodic: self.melodic.value(),
                harmonic: self.harmonic.value(),
                rhythmic: self.rhythmic.value(),
            },
            brightness: if self.centroid_history.is_empty() {
                0.5
            } else {
                self.centroid_history.mean()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bass_heavy() -> Vec<f32> {
        vec![1.0, 0.8, 0.6, 0.2, 0.1, 0.05, 0.0, 0.0]
    }

    #[test]
    fn defaults_before_any_input() {
        let rec = IdentityExtractor::new().record();
        assert_eq!(rec.tempo, 120.0);
        assert_eq!(rec.brightness, 0.5);
        assert_eq!(rec, IdentityRecord::default());
    }

    #[test]
    fn steady_beats_pull_tempo() {
        let mut ex = IdentityExtractor::new();
        let spec = bass_heavy();
        // 0.4 s spacing = 150 BPM
        for i in 0..800 {
            let t = i as f64 * 0.05;
            let beat = i % 8 == 0;
            ex.update(&spec, beat, if beat { 1.0 } else { 0.0 }, t);
        }
        assert!((ex.tempo() - 150.0).abs() < 2.0, "tempo {}", ex.tempo());
    }

    #[test]
    fn out_of_range_tempo_is_ignored() {
        let mut ex = IdentityExtractor::new();
        let spec = bass_heavy();
        // 0.1 s spacing = 600 BPM
        for i in 0..20 {
            ex.update(&spec, true, 2.0, i as f64 * 0.1);
        }
        assert_eq!(ex.tempo(), 120.0);
        // 5 s spacing = 12 BPM
        for i in 0..20 {
            ex.update(&spec, true, 2.0, 10.0 + i as f64 * 5.0);
        }
        assert_eq!(ex.tempo(), 120.0);
    }

    #[test]
    fn indicators_stay_in_unit_range() {
        let mut ex = IdentityExtractor::new();
        for i in 0..2000 {
            let spec: Vec<f32> = (0..8)
                .map(|b| if (i + b) % 3 == 0 { 1.0 } else { (i as f32 * 0.37 + b as f32).sin().abs() })
                .collect();
            ex.update(&spec, i % 5 == 0, (i % 7) as f32 * 3.0, i as f64 * 0.016);
            let rec = ex.record();
            for v in [
                rec.genre.percussive,
                rec.genre.melodic,
                rec.genre.harmonic,
                rec.genre.rhythmic,
                rec.energy_level,
                rec.brightness,
            ] {
                assert!((0.0..=1.0).contains(&v), "out of range: {v}");
            }
            assert!((MIN_TEMPO..=MAX_TEMPO).contains(&rec.tempo));
        }
    }

    #[test]
    fn signature_fills_short_spectra() {
        let mut ex = IdentityExtractor::new();
        for _ in 0..500 {
            ex.update(&[1.0; 8], false, 0.0, 0.0);
        }
        let rec = ex.record();
        assert!(rec.spectral_signature.iter().all(|&v| v > 0.99));
        assert!(rec.harmonic_profile.iter().all(|&v| v > 0.99));
        // Flat spectrum has no spread
        assert!(rec.genre.harmonic < 0.01);
    }

    #[test]
    fn low_band_energy_lowers_brightness() {
        let mut ex = IdentityExtractor::new();
        let mut spec = vec![0.0; 8];
        spec[0] = 1.0;
        for _ in 0..50 {
            ex.update(&spec, false, 0.0, 0.0);
        }
        assert_eq!(ex.record().brightness, 0.0);
    }
}
