use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::buffer::Chunk;
use super::features::BandSpectrum;
use crate::config::{Aggregation, AnalysisConfig, BandLayout, SpectrumTables};
use crate::error::Result;
use crate::smoothing::Ema;
use crate::stats::{self, EPSILON};

/// Turns one chunk into B smoothed perceptual band energies.
///
/// Pipeline per chunk: FFT magnitude, band aggregation, per-band boost,
/// power-law compression, max-normalization, then three EMA stages (per-band
/// coefficients, then two uniform ones).
pub struct SpectralBandAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
    sample_rate: u32,
    fft_size: usize,
    tables: SpectrumTables,
    silence_threshold: f32,
    band_bins: Vec<(usize, usize)>,
    band_centers: Vec<f32>,
    fast: Vec<Ema>,
    medium: Vec<Ema>,
    slow: Vec<Ema>,
}

impl SpectralBandAnalyzer {
    pub fn new(config: &AnalysisConfig, sample_rate: u32) -> Result<Self> {
        config.validate()?;
        let fft_size = config.chunk_size;
        let tables = config.spectrum.clone();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        let band_bins = band_bin_ranges(&tables.layout, fft_size, sample_rate);
        let band_centers = band_center_freqs(&tables.layout, &band_bins, fft_size, sample_rate);

        let unit = |alpha: f32| Ema::new(0.0, alpha).bounded(0.0, 1.0);
        let fast = tables.band_alpha.iter().map(|&a| unit(a)).collect();
        let medium = (0..tables.band_count()).map(|_| unit(tables.medium_alpha)).collect();
        let slow = (0..tables.band_count()).map(|_| unit(tables.slow_alpha)).collect();

        log::debug!(
            "Spectral analyzer: fft={} bands={} bins={:?}",
            fft_size,
            tables.band_count(),
            band_bins
        );

        Ok(Self {
            fft,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            magnitude: vec![0.0; fft_size / 2 + 1],
            sample_rate,
            fft_size,
            tables,
            silence_threshold: config.silence_threshold,
            band_bins,
            band_centers,
            fast,
            medium,
            slow,
        })
    }

    pub fn band_count(&self) -> usize {
        self.band_bins.len()
    }

    pub fn band_centers(&self) -> &[f32] {
        &self.band_centers
    }

    pub fn analyze(&mut self, chunk: &Chunk) -> BandSpectrum {
        if chunk.is_silent(self.silence_threshold) {
            // Skip the transform; let the stages fall toward zero so a
            // resumption starts from a decayed state.
            for stage in [&mut self.fast, &mut self.medium, &mut self.slow] {
                for ema in stage.iter_mut() {
                    ema.update(0.0);
                }
            }
            return BandSpectrum::silent(&self.band_centers);
        }

        self.transform(chunk.samples());

        let normalized = self.band_energies();

        for (ema, &v) in self.fast.iter_mut().zip(&normalized) {
            ema.update(v);
        }
        for (ema, fast) in self.medium.iter_mut().zip(&self.fast) {
            ema.update(fast.value());
        }
        for (ema, medium) in self.slow.iter_mut().zip(&self.medium) {
            ema.update(medium.value());
        }

        let bin_hz = self.sample_rate as f32 / self.fft_size as f32;
        BandSpectrum {
            fast: self.fast.iter().map(Ema::value).collect(),
            medium: self.medium.iter().map(Ema::value).collect(),
            slow: self.slow.iter().map(Ema::value).collect(),
            normalized,
            band_centers: self.band_centers.clone(),
            dominant_freq: stats::argmax(&self.magnitude) as f32 * bin_hz,
            harmonic_richness: magnitude_richness(&self.magnitude),
            silent: false,
        }
    }

    fn transform(&mut self, samples: &[f32]) {
        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            *slot = Complex::new(samples.get(i).copied().unwrap_or(0.0), 0.0);
        }
        self.fft.process(&mut self.fft_buffer);
        for (m, c) in self.magnitude.iter_mut().zip(&self.fft_buffer) {
            *m = c.norm();
        }
    }

    /// Aggregate, boost, compress and normalize the current magnitudes.
    fn band_energies(&self) -> Vec<f32> {
        let mut bands: Vec<f32> = self
            .band_bins
            .iter()
            .map(|&(lo, hi)| {
                if hi <= lo {
                    return 0.0;
                }
                let bins = &self.magnitude[lo..hi];
                match self.tables.aggregation {
                    Aggregation::Rms => {
                        (bins.iter().map(|m| m * m).sum::<f32>() / bins.len() as f32).sqrt()
                    }
                    Aggregation::Mean => stats::mean(bins),
                }
            })
            .collect();

        for ((v, boost), exp) in bands
            .iter_mut()
            .zip(&self.tables.boost)
            .zip(&self.tables.compression)
        {
            *v = (*v * boost).max(0.0).powf(*exp);
        }

        let max = bands.iter().copied().fold(0.0f32, f32::max);
        if max > EPSILON && max.is_finite() {
            for v in &mut bands {
                *v = (*v / max).clamp(0.0, 1.0);
            }
        } else {
            bands.iter_mut().for_each(|v| *v = 0.0);
        }
        bands
    }
}

/// Half-open FFT bin ranges per band over bins `0..=fft_size/2`.
fn band_bin_ranges(layout: &BandLayout, fft_size: usize, sample_rate: u32) -> Vec<(usize, usize)> {
    let num_bins = fft_size / 2 + 1;
    let bin_hz = sample_rate as f32 / fft_size as f32;
    // First bin whose frequency is >= `freq`
    let first_bin_at = |freq: f32| -> usize { ((freq / bin_hz).ceil().max(0.0) as usize).min(num_bins) };

    match layout {
        BandLayout::Edges(edges) => edges
            .windows(2)
            .map(|w| (first_bin_at(w[0]), first_bin_at(w[1])))
            .collect(),
        BandLayout::Linear(n) => (0..*n)
            .map(|i| (i * num_bins / n, (i + 1) * num_bins / n))
            .collect(),
    }
}

fn band_center_freqs(
    layout: &BandLayout,
    band_bins: &[(usize, usize)],
    fft_size: usize,
    sample_rate: u32,
) -> Vec<f32> {
    let bin_hz = sample_rate as f32 / fft_size as f32;
    band_bins
        .iter()
        .enumerate()
        .map(|(i, &(lo, hi))| {
            if hi > lo {
                (lo + hi - 1) as f32 * 0.5 * bin_hz
            } else if let BandLayout::Edges(edges) = layout {
                (edges[i] + edges[i + 1]) * 0.5
            } else {
                lo as f32 * bin_hz
            }
        })
        .collect()
}

/// Density and spread of prominent peaks in the raw magnitude spectrum.
fn magnitude_richness(magnitude: &[f32]) -> f32 {
    if magnitude.len() < 5 {
        return 0.0;
    }
    let floor = stats::mean(magnitude) * 1.2;
    let peaks: Vec<f32> = (2..magnitude.len() - 2)
        .filter(|&i| {
            magnitude[i] > magnitude[i - 1] && magnitude[i] > magnitude[i + 1] && magnitude[i] > floor
        })
        .map(|i| magnitude[i])
        .collect();

    if peaks.is_empty() {
        return 0.1;
    }

    let density = (peaks.len() as f32 / 20.0).min(1.0);
    let spread = stats::std_dev(&peaks) / (stats::mean(&peaks) + EPSILON);
    (density * spread * 0.3 + 0.2).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::hann_window;
    use crate::config::Mode;

    const SR: u32 = 44100;

    fn sine_chunk(freq: f32, amp: f32, len: usize) -> Chunk {
        let window = hann_window(len);
        Chunk::from_samples(
            (0..len)
                .map(|i| {
                    amp * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin()
                        * window[i]
                })
                .collect(),
        )
    }

    fn analyzer(mode: Mode) -> SpectralBandAnalyzer {
        SpectralBandAnalyzer::new(&AnalysisConfig::for_mode(mode), SR).unwrap()
    }

    #[test]
    fn dashboard_bins_cover_every_band() {
        let a = analyzer(Mode::Dashboard);
        assert_eq!(a.band_count(), 8);
        for &(lo, hi) in &a.band_bins {
            assert!(hi > lo, "empty band {lo}..{hi}");
        }
        // 20-80 Hz at 43 Hz per bin is just bin 1
        assert_eq!(a.band_bins[0], (1, 2));
    }

    #[test]
    fn delicate_layout_is_linear() {
        let a = analyzer(Mode::Delicate);
        assert_eq!(a.band_count(), 16);
        assert_eq!(a.band_bins[0].0, 0);
        assert_eq!(a.band_bins[15].1, 512 / 2 + 1);
    }

    #[test]
    fn silent_chunk_gives_zero_spectrum() {
        let mut a = analyzer(Mode::Dashboard);
        let spec = a.analyze(&Chunk::silent(1024, false));
        assert!(spec.silent);
        assert!(spec.slow.iter().all(|&v| v == 0.0));
        assert!(spec.normalized.iter().all(|&v| v == 0.0));
        assert_eq!(spec.total_energy(), 0.0);
    }

    #[test]
    fn low_sine_lands_in_lowest_band() {
        let mut a = analyzer(Mode::Dashboard);
        let spec = a.analyze(&sine_chunk(50.0, 0.8, 1024));
        assert_eq!(spec.normalized[0], 1.0);
        assert!(spec.dominant_freq < 100.0);
    }

    #[test]
    fn high_sine_lands_in_top_band() {
        let mut a = analyzer(Mode::Dashboard);
        let spec = a.analyze(&sine_chunk(8000.0, 0.8, 1024));
        assert_eq!(stats::argmax(&spec.normalized), 7);
    }

    #[test]
    fn values_stay_in_unit_range() {
        let mut a = analyzer(Mode::Dashboard);
        for (i, freq) in [60.0, 440.0, 3000.0, 12000.0, 95.0].iter().cycle().take(40).enumerate() {
            let amp = if i % 3 == 0 { 1.0 } else { 0.05 };
            let spec = a.analyze(&sine_chunk(*freq, amp, 1024));
            for v in spec.fast.iter().chain(&spec.medium).chain(&spec.slow).chain(&spec.normalized) {
                assert!((0.0..=1.0).contains(v), "out of range: {v}");
            }
        }
    }

    #[test]
    fn repeated_chunk_converges() {
        let mut a = analyzer(Mode::Delicate);
        let chunk = sine_chunk(1000.0, 0.5, 512);
        let mut prev = a.analyze(&chunk).slow;
        let mut delta = f32::MAX;
        for _ in 0..2000 {
            let next = a.analyze(&chunk).slow;
            delta = stats::abs_diff_sum(&next, &prev);
            prev = next;
        }
        assert!(delta < 1e-5, "still moving: {delta}");
        assert_eq!(stats::argmax(&prev), stats::argmax(&a.analyze(&chunk).normalized));
    }

    #[test]
    fn silence_decays_internal_state() {
        let mut a = analyzer(Mode::Dashboard);
        for _ in 0..10 {
            a.analyze(&sine_chunk(50.0, 0.8, 1024));
        }
        let before = a.fast[0].value();
        a.analyze(&Chunk::silent(1024, false));
        assert!(a.fast[0].value() < before);
    }

    #[test]
    fn richness_floor_without_peaks() {
        assert_eq!(magnitude_richness(&[1.0; 32]), 0.1);
        assert_eq!(magnitude_richness(&[1.0; 3]), 0.0);
    }
}
