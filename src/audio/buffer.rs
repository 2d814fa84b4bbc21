use std::time::{Duration, Instant};

use crate::error::{AnalysisError, Result};

/// Mono, normalized samples plus their rate. Immutable once built.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidInput("sample rate must be > 0".into()));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(AnalysisError::InvalidInput(
                "sample data contains non-finite values".into(),
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Scale so the loudest sample sits at ±1. Silent input is left untouched.
    pub fn peak_normalized(mut self) -> Self {
        let peak = self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        if peak > 0.0 {
            for s in &mut self.samples {
                *s /= peak;
            }
        }
        self
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Sample offset for a playback position; negative positions clamp to 0.
    pub fn offset_at(&self, elapsed_secs: f64) -> usize {
        if !(elapsed_secs > 0.0) {
            return 0;
        }
        (elapsed_secs * self.sample_rate as f64).round() as usize
    }

    /// Extract the windowed chunk starting at `elapsed_secs`.
    ///
    /// Past the end of the data this returns an all-zero chunk of the full
    /// window length rather than a short one.
    pub fn chunk_at(&self, elapsed_secs: f64, window: &[f32]) -> Chunk {
        let len = window.len();
        let offset = self.offset_at(elapsed_secs);
        match offset.checked_add(len) {
            Some(end) if end <= self.samples.len() => {
                let samples = self.samples[offset..end]
                    .iter()
                    .zip(window)
                    .map(|(s, w)| s * w)
                    .collect();
                Chunk {
                    samples,
                    exhausted: false,
                }
            }
            _ => Chunk::silent(len, true),
        }
    }
}

/// One windowed slice of the waveform, recomputed every tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    samples: Vec<f32>,
    exhausted: bool,
}

impl Chunk {
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self {
            samples,
            exhausted: false,
        }
    }

    pub fn silent(len: usize, exhausted: bool) -> Self {
        Self {
            samples: vec![0.0; len],
            exhausted,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when the read landed past the end of the sample data.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    /// Sum of squared samples.
    pub fn energy(&self) -> f32 {
        self.samples.iter().map(|s| s * s).sum()
    }

    pub fn mean_square(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.energy() / self.samples.len() as f32
    }

    pub fn is_silent(&self, threshold: f32) -> bool {
        self.peak() < threshold
    }
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Source of the playback position. `None` means playback is paused or not
/// started, in which case no chunk is read.
pub trait PlaybackClock {
    fn position(&self) -> Option<f64>;
}

/// Wall-clock position measured from the moment playback started, excluding
/// paused spans.
#[derive(Debug, Default)]
pub struct WallClock {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl WallClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
    }

    pub fn pause(&mut self) {
        if self.started.is_some() && self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += at.elapsed();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }
}

impl PlaybackClock for WallClock {
    fn position(&self) -> Option<f64> {
        let started = self.started?;
        if self.paused_at.is_some() {
            return None;
        }
        Some(started.elapsed().saturating_sub(self.paused_total).as_secs_f64())
    }
}

/// Deterministic clock that advances a fixed step per tick.
#[derive(Debug, Clone)]
pub struct SteppedClock {
    step: f64,
    ticks: u64,
}

impl SteppedClock {
    pub fn new(fps: u32) -> Self {
        Self {
            step: 1.0 / fps.max(1) as f64,
            ticks: 0,
        }
    }

    pub fn advance(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl PlaybackClock for SteppedClock {
    fn position(&self) -> Option<f64> {
        Some(self.ticks as f64 * self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> SampleBuffer {
        SampleBuffer::new((0..len).map(|i| i as f32 / len as f32).collect(), 1000).unwrap()
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(SampleBuffer::new(vec![0.0; 4], 0).is_err());
        assert!(SampleBuffer::new(vec![f32::NAN], 44100).is_err());
    }

    #[test]
    fn offset_rounds_and_clamps() {
        let buf = ramp(100);
        assert_eq!(buf.offset_at(0.0106), 11);
        assert_eq!(buf.offset_at(-1.0), 0);
    }

    #[test]
    fn chunk_applies_window() {
        let buf = SampleBuffer::new(vec![1.0; 64], 1000).unwrap();
        let window = hann_window(16);
        let chunk = buf.chunk_at(0.0, &window);
        assert_eq!(chunk.len(), 16);
        assert_eq!(chunk.samples()[0], 0.0);
        assert!(chunk.samples()[8] > 0.9);
        assert!(!chunk.is_exhausted());
    }

    #[test]
    fn past_end_returns_full_length_zero_chunk() {
        let buf = ramp(100);
        let window = hann_window(32);
        let chunk = buf.chunk_at(0.08, &window);
        assert_eq!(chunk.len(), 32);
        assert!(chunk.samples().iter().all(|&s| s == 0.0));
        assert!(chunk.is_exhausted());
        assert!(chunk.is_silent(1e-6));
    }

    #[test]
    fn exact_fit_is_not_exhausted() {
        let buf = ramp(64);
        let chunk = buf.chunk_at(0.032, &hann_window(32));
        assert!(!chunk.is_exhausted());
    }

    #[test]
    fn peak_normalization() {
        let buf = SampleBuffer::new(vec![0.25, -0.5, 0.1], 8000)
            .unwrap()
            .peak_normalized();
        assert_eq!(buf.samples(), &[0.5, -1.0, 0.2]);
        let silent = SampleBuffer::new(vec![0.0; 3], 8000).unwrap().peak_normalized();
        assert_eq!(silent.samples(), &[0.0; 3]);
    }

    #[test]
    fn stepped_clock_advances_by_frame() {
        let mut clock = SteppedClock::new(50);
        assert_eq!(clock.position(), Some(0.0));
        clock.advance();
        clock.advance();
        assert!((clock.position().unwrap() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn wall_clock_reports_none_until_started_or_while_paused() {
        let mut clock = WallClock::new();
        assert_eq!(clock.position(), None);
        clock.start();
        assert!(clock.position().is_some());
        clock.pause();
        assert!(clock.is_paused());
        assert_eq!(clock.position(), None);
        clock.resume();
        assert!(clock.position().is_some());
    }
}
