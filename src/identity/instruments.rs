use serde::Serialize;
use std::ops::Range;

use crate::audio::buffer::Chunk;
use crate::smoothing::{FrameRing, RingBuffer};
use crate::stats::{self, EPSILON};

const TRANSIENT_MEMORY: usize = 20;
/// Entries a transient detector needs: the current value plus seven before it.
const TRANSIENT_WINDOW: usize = 8;
const SUSTAIN_MEMORY: usize = 40;
const SUSTAIN_WINDOW: usize = 10;
const MELODY_MEMORY: usize = 20;
const MELODY_WINDOW: usize = 8;
const CHORD_MEMORY: usize = 20;
const CHORD_MIN_HISTORY: usize = 15;
/// Frames between the two spectra a chord change compares.
const CHORD_LOOKBACK: usize = 9;
/// Piano and strings ranges as sixteenths of the band axis.
const PIANO_SIXTEENTHS: (usize, usize) = (4, 10);
const STRINGS_SIXTEENTHS: (usize, usize) = (6, 12);
const BASS_MEMORY: usize = 30;
const BASS_WINDOW: usize = 10;

const KICK_THRESHOLD: f32 = 0.3;
const SNARE_THRESHOLD: f32 = 0.25;
const HIHAT_THRESHOLD: f32 = 0.15;
const CRASH_RATIO: f32 = 2.5;
const CRASH_FLOOR: f32 = 0.05;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DrumEvents {
    pub kick: f32,
    pub snare: f32,
    pub hihat: f32,
    pub crash: f32,
    pub overall: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MelodicEvents {
    pub piano: f32,
    pub strings: f32,
    pub harmony: f32,
    pub melody_strength: f32,
    pub chord_change: f32,
}

/// Per-tick instrument scores, each in 0.0-1.0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct InstrumentEvents {
    pub drums: DrumEvents,
    pub melodic: MelodicEvents,
    pub bass_line: f32,
    pub rhythm_intensity: f32,
}

/// Fires when a value jumps above the mean of the seven values before it by
/// more than `threshold`.
struct TransientDetector {
    memory: RingBuffer,
    threshold: f32,
}

impl TransientDetector {
    fn new(threshold: f32) -> Self {
        Self {
            memory: RingBuffer::new(TRANSIENT_MEMORY),
            threshold,
        }
    }

    /// Mean of the entries before the newest one, once the window is full.
    fn baseline(&self) -> Option<f32> {
        if self.memory.len() < TRANSIENT_WINDOW {
            return None;
        }
        let prior = (1..TRANSIENT_WINDOW).filter_map(|k| self.memory.back(k));
        Some(stats::mean_iter(prior))
    }

    fn detect(&mut self, energy: f32) -> f32 {
        self.memory.push(energy);
        match self.baseline() {
            Some(avg) if energy > avg + self.threshold => {
                ((energy - avg) / (self.threshold + EPSILON) * 0.7).min(1.0)
            }
            _ => 0.0,
        }
    }
}

struct DrumDetector {
    kick: TransientDetector,
    snare: TransientDetector,
    hihat: TransientDetector,
}

impl DrumDetector {
    fn new() -> Self {
        Self {
            kick: TransientDetector::new(KICK_THRESHOLD),
            snare: TransientDetector::new(SNARE_THRESHOLD),
            hihat: TransientDetector::new(HIHAT_THRESHOLD),
        }
    }

    fn detect(&mut self, spectrum: &[f32]) -> DrumEvents {
        let bands = spectrum.len();
        if bands < 8 {
            return DrumEvents::default();
        }

        let kick = self.kick.detect(stats::mean(&spectrum[..2]));
        let snare = self.snare.detect(stats::mean(&spectrum[3..5]));
        let hihat = self.hihat.detect(stats::mean(&spectrum[bands - 3..]));

        let high = stats::mean(&spectrum[bands - 4..]);
        let crash = match self.hihat.baseline() {
            Some(base) if high > base * CRASH_RATIO && high > CRASH_FLOOR => (high * 2.0).min(1.0),
            _ => 0.0,
        };

        DrumEvents {
            kick,
            snare,
            hihat,
            crash,
            overall: (kick * 0.4 + snare * 0.4 + hihat * 0.2 + crash * 0.3).min(1.0),
        }
    }
}

struct MelodicDetector {
    piano_bands: Range<usize>,
    strings_bands: Range<usize>,
    sustain_memory: FrameRing,
    melody_memory: RingBuffer,
    chord_memory: FrameRing,
}

impl MelodicDetector {
    fn new(bands: usize) -> Self {
        let piano_bands = scaled_range(bands, PIANO_SIXTEENTHS, 3);
        let strings_bands = scaled_range(bands, STRINGS_SIXTEENTHS, 4);
        Self {
            sustain_memory: FrameRing::new(SUSTAIN_MEMORY, strings_bands.len()),
            piano_bands,
            strings_bands,
            melody_memory: RingBuffer::new(MELODY_MEMORY),
            chord_memory: FrameRing::new(CHORD_MEMORY, bands),
        }
    }

    fn detect(&mut self, spectrum: &[f32]) -> MelodicEvents {
        let bands = spectrum.len();
        if bands < 8 {
            return MelodicEvents::default();
        }

        let piano = spectrum
            .get(self.piano_bands.clone())
            .map_or(0.0, harmonic_clarity);
        let strings = match spectrum.get(self.strings_bands.clone()) {
            Some(range) => self.sustain_quality(range),
            None => 0.0,
        };
        let harmony = harmonic_spread(spectrum);
        let melody_strength = self.melodic_strength(spectrum);
        let chord_change = self.chord_change(spectrum);

        MelodicEvents {
            piano,
            strings,
            harmony,
            melody_strength,
            chord_change,
        }
    }

    /// Low temporal variation with steady energy across a band range.
    fn sustain_quality(&mut self, range: &[f32]) -> f32 {
        if range.len() < 4 {
            return 0.0;
        }
        self.sustain_memory.push(range);
        if self.sustain_memory.len() < SUSTAIN_WINDOW {
            return 0.0;
        }

        let recent: Vec<&[f32]> = self.sustain_memory.recent(SUSTAIN_WINDOW).collect();
        let scores: Vec<f32> = (0..range.len())
            .map(|band| {
                let column: Vec<f32> = recent.iter().map(|frame| frame[band]).collect();
                let consistency = 1.0 / (1.0 + stats::coefficient_of_variation(&column) * 3.0);
                consistency * stats::mean(&column)
            })
            .collect();
        (stats::mean(&scores) * 0.8).min(1.0)
    }

    /// Movement of the dominant band over the last few frames.
    fn melodic_strength(&mut self, spectrum: &[f32]) -> f32 {
        self.melody_memory.push(stats::argmax(spectrum) as f32);
        if self.melody_memory.len() < MELODY_WINDOW {
            return 0.0;
        }
        let spread = stats::std_dev(&self.melody_memory.recent_vec(MELODY_WINDOW));
        (spread / spectrum.len() as f32 * 4.0).min(1.0) * 0.6
    }

    /// Normalized difference against a frame several ticks back; only the
    /// mid range counts, so noise and wholesale jumps do not register.
    fn chord_change(&mut self, spectrum: &[f32]) -> f32 {
        self.chord_memory.push(spectrum);
        if self.chord_memory.len() < CHORD_MIN_HISTORY {
            return 0.0;
        }
        let (Some(current), Some(past)) = (
            self.chord_memory.back(0),
            self.chord_memory.back(CHORD_LOOKBACK),
        ) else {
            return 0.0;
        };

        let diff = stats::abs_diff_sum(current, past);
        let total: f32 = current.iter().chain(past).sum();
        let normalized = diff / (total + EPSILON);
        if normalized > 0.2 && normalized < 0.8 {
            (normalized * 1.5).min(1.0)
        } else {
            0.0
        }
    }
}

/// Band range covering `sixteenths` of the spectrum, widened to at least
/// `min_width` bands (or all of them when there are fewer).
fn scaled_range(bands: usize, sixteenths: (usize, usize), min_width: usize) -> Range<usize> {
    let width = min_width.min(bands);
    let hi = (bands * sixteenths.1 / 16).max(width).min(bands);
    let lo = (bands * sixteenths.0 / 16).min(hi - width);
    lo..hi
}

/// Count and definition of peaks clearly above the range mean.
fn harmonic_clarity(range: &[f32]) -> f32 {
    if range.len() < 3 {
        return 0.0;
    }
    let floor = stats::mean(range) * 1.3;
    let peaks: Vec<f32> = stats::find_peaks(range, floor)
        .into_iter()
        .map(|i| range[i])
        .collect();
    if peaks.is_empty() {
        return 0.0;
    }
    let clarity =
        (peaks.len() as f32 / 4.0).min(1.0) * (stats::mean(&peaks) / (stats::std_dev(range) + EPSILON));
    (clarity * 0.3).min(1.0)
}

fn harmonic_spread(spectrum: &[f32]) -> f32 {
    if spectrum.len() < 6 {
        return 0.0;
    }
    let active = spectrum.iter().filter(|&&v| v > 0.1).count() as f32 / spectrum.len() as f32;
    (active * stats::coefficient_of_variation(spectrum) * 0.5).min(1.0)
}

/// Drum and melodic sub-detectors plus bass tracking, all fed from the same
/// smoothed spectrum.
pub struct InstrumentDetector {
    drums: DrumDetector,
    melodic: MelodicDetector,
    bass_memory: RingBuffer,
}

impl InstrumentDetector {
    pub fn new(bands: usize) -> Self {
        Self {
            drums: DrumDetector::new(),
            melodic: MelodicDetector::new(bands),
            bass_memory: RingBuffer::new(BASS_MEMORY),
        }
    }

    /// Score one tick. A chunk read past the end of the data yields an
    /// all-zero record and leaves the detector memories untouched.
    pub fn detect(&mut self, spectrum: &[f32], chunk: &Chunk) -> InstrumentEvents {
        if chunk.is_exhausted() {
            return InstrumentEvents::default();
        }

        let drums = self.drums.detect(spectrum);
        let melodic = self.melodic.detect(spectrum);

        let bass_line = if spectrum.len() >= 4 {
            let bass = stats::mean(&spectrum[..4]);
            self.bass_memory.push(bass);
            (bass * 3.0).min(1.0)
        } else {
            0.0
        };

        InstrumentEvents {
            drums,
            melodic,
            bass_line,
            rhythm_intensity: self.rhythm_intensity(),
        }
    }

    fn rhythm_intensity(&self) -> f32 {
        if self.bass_memory.len() < BASS_WINDOW {
            return 0.0;
        }
        stats::coefficient_of_variation(&self.bass_memory.recent_vec(BASS_WINDOW)).min(1.0)
    }
}
