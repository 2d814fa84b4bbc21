//! Multi-axis "musical DNA" accumulated over the whole session.
//!
//! Every scalar is blended through a bounded [`Ema`] with its own retention;
//! stable properties (tonal center, chromatic signature) move slowly,
//! volatile ones (attack, flux) quickly. Nothing here is ever reset.

use serde::Serialize;

use crate::audio::buffer::Chunk;
use crate::smoothing::{Ema, EmaArray, FrameRing, RingBuffer};
use crate::stats::{self, EPSILON};

const SPECTRAL_HISTORY: usize = 20;
const CHROMA_HISTORY: usize = 16;
const RHYTHM_HISTORY: usize = 32;
const ENERGY_HISTORY: usize = 32;

const GROOVE_FLOW: usize = 32;
const HARMONIC_RHYTHM_FLOW: usize = 20;
const TENSION_FLOW: usize = 40;
const TEXTURE_FLOW: usize = 30;
const RHYTHMIC_FLOW: usize = 60;
const HARMONIC_FLOW: usize = 40;
const ENERGY_FLOW: usize = 50;

/// Band energy above which a band counts as active or significant.
const ACTIVE_BAND: f32 = 0.1;
/// Pitch classes treated as the "major" set for mode brightness.
const MAJOR_CLASSES: [usize; 7] = [0, 2, 4, 5, 7, 9, 11];

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TonalAxis {
    /// Dominant pseudo-chroma bin, 0.0-11.0
    pub tonal_center: f32,
    /// Major-set share of chroma energy
    pub mode_brightness: f32,
    pub chromatic_signature: [f32; 12],
    pub scale_stability: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RhythmicAxis {
    pub tempo_stability: f32,
    pub rhythmic_complexity: f32,
    pub beat_pattern: [f32; 16],
    pub syncopation_index: f32,
    /// Sample-derivative onset of the latest chunk, 0.0-1.0
    pub onset_strength: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HarmonicAxis {
    pub harmonic_richness: f32,
    pub consonance_ratio: f32,
    pub chord_complexity: f32,
    pub tension: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MelodicAxis {
    pub melodic_range: f32,
    /// -1.0 (descending) to 1.0 (ascending)
    pub direction_bias: f32,
    pub interval_signature: [f32; 12],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimbralAxis {
    pub spectral_centroid: f32,
    pub spectral_rolloff: f32,
    pub spectral_flatness: f32,
    pub timbral_flux: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DynamicAxis {
    pub dynamic_range: f32,
    pub energy_variance: f32,
    pub attack_sharpness: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StructuralAxis {
    pub repetition_density: f32,
    pub surprise_quotient: f32,
}

/// Recent values per axis, oldest first. Kept for animation smoothing only.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlowSeries {
    pub groove_signature: Vec<f32>,
    pub harmonic_rhythm: Vec<f32>,
    pub tension_release: Vec<f32>,
    pub texture_evolution: Vec<f32>,
    pub rhythmic_flow: Vec<f32>,
    /// Summed band energy averaged over the last 5 frames (0.0-B)
    pub harmonic_flow: Vec<f32>,
    pub energy_flow: Vec<f32>,
}

/// Descriptors the visual mapping can use when some producer supplies them.
/// Nothing in this crate fills them in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OptionalDescriptors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tonal_complexity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beat_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rms_energy_mean: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase_complexity: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MusicalDna {
    pub tonal: TonalAxis,
    pub rhythmic: RhythmicAxis,
    pub harmonic: HarmonicAxis,
    pub melodic: MelodicAxis,
    pub timbral: TimbralAxis,
    pub dynamic: DynamicAxis,
    pub structural: StructuralAxis,
    pub flow: FlowSeries,
    pub extras: OptionalDescriptors,
}

impl MusicalDna {
    /// Every scalar that is documented as living in 0.0-1.0.
    pub fn unit_scalars(&self) -> [f32; 19] {
        [
            self.tonal.mode_brightness,
            self.tonal.scale_stability,
            self.rhythmic.tempo_stability,
            self.rhythmic.rhythmic_complexity,
            self.rhythmic.syncopation_index,
            self.rhythmic.onset_strength,
            self.harmonic.harmonic_richness,
            self.harmonic.consonance_ratio,
            self.harmonic.chord_complexity,
            self.harmonic.tension,
            self.melodic.melodic_range,
            self.timbral.spectral_centroid,
            self.timbral.spectral_rolloff,
            self.timbral.spectral_flatness,
            self.timbral.timbral_flux,
            self.dynamic.dynamic_range,
            self.dynamic.energy_variance,
            self.structural.repetition_density,
            self.structural.surprise_quotient,
        ]
    }
}

fn unit(initial: f32, retention: f32) -> Ema {
    Ema::with_retention(initial, retention).bounded(0.0, 1.0)
}

struct TonalState {
    center: Ema,
    brightness: Ema,
    signature: EmaArray<12>,
    stability: Ema,
}

struct RhythmicState {
    tempo_stability: Ema,
    complexity: Ema,
    pattern: EmaArray<16>,
    syncopation: Ema,
    previous_tempo: Option<f32>,
    onset: f32,
}

struct HarmonicState {
    richness: Ema,
    consonance: Ema,
    complexity: Ema,
}

struct MelodicState {
    range: Ema,
    direction: Ema,
    intervals: EmaArray<12>,
}

struct TimbralState {
    centroid: Ema,
    rolloff: Ema,
    flatness: Ema,
    flux: Ema,
}

struct DynamicState {
    range: Ema,
    variance: Ema,
    attack: Ema,
}

struct StructuralState {
    repetition: Ema,
    surprise: Ema,
}

struct Flows {
    groove: RingBuffer,
    harmonic_rhythm: RingBuffer,
    tension: RingBuffer,
    texture: RingBuffer,
    rhythmic: RingBuffer,
    harmonic: RingBuffer,
    energy: RingBuffer,
}

pub struct MusicalDnaExtractor {
    bands: usize,
    tick: u64,
    spectral_memory: FrameRing,
    chroma_memory: FrameRing,
    rhythm_memory: RingBuffer,
    energy_memory: RingBuffer,
    tonal: TonalState,
    rhythmic: RhythmicState,
    harmonic: HarmonicState,
    melodic: MelodicState,
    timbral: TimbralState,
    dynamic: DynamicState,
    structural: StructuralState,
    flows: Flows,
}

impl MusicalDnaExtractor {
    pub fn new(bands: usize) -> Self {
        let bands = bands.max(1);
        Self {
            bands,
            tick: 0,
            spectral_memory: FrameRing::new(SPECTRAL_HISTORY, bands),
            chroma_memory: FrameRing::new(CHROMA_HISTORY, 12),
            rhythm_memory: RingBuffer::new(RHYTHM_HISTORY),
            energy_memory: RingBuffer::new(ENERGY_HISTORY),
            tonal: TonalState {
                center: Ema::with_retention(0.0, 0.98).bounded(0.0, 11.0),
                brightness: unit(0.5, 0.95),
                signature: EmaArray::with_retention(0.0, 0.99).bounded(0.0, 1.0),
                stability: unit(0.0, 0.9),
            },
            rhythmic: RhythmicState {
                tempo_stability: unit(0.0, 0.95),
                complexity: unit(0.0, 0.95),
                pattern: EmaArray::with_retention(0.0, 0.9).bounded(0.0, 1.0),
                syncopation: unit(0.0, 0.9),
                previous_tempo: None,
                onset: 0.0,
            },
            harmonic: HarmonicState {
                richness: unit(0.0, 0.95),
                consonance: unit(0.5, 0.92),
                complexity: unit(0.0, 0.9),
            },
            melodic: MelodicState {
                range: unit(0.0, 0.9),
                direction: Ema::with_retention(0.0, 0.95).bounded(-1.0, 1.0),
                intervals: EmaArray::with_retention(0.0, 0.9).bounded(0.0, 1.0),
            },
            timbral: TimbralState {
                centroid: unit(0.0, 0.9),
                rolloff: unit(0.0, 0.9),
                flatness: unit(0.0, 0.9),
                flux: unit(0.0, 0.9),
            },
            dynamic: DynamicState {
                range: unit(0.0, 0.9),
                variance: unit(0.0, 0.9),
                attack: unit(0.0, 0.9),
            },
            structural: StructuralState {
                repetition: unit(0.0, 0.95),
                surprise: unit(0.0, 0.9),
            },
            flows: Flows {
                groove: RingBuffer::new(GROOVE_FLOW),
                harmonic_rhythm: RingBuffer::new(HARMONIC_RHYTHM_FLOW),
                tension: RingBuffer::new(TENSION_FLOW),
                texture: RingBuffer::new(TEXTURE_FLOW),
                rhythmic: RingBuffer::new(RHYTHMIC_FLOW),
                harmonic: RingBuffer::new(HARMONIC_FLOW),
                energy: RingBuffer::new(ENERGY_FLOW),
            },
        }
    }

    /// Fold one tick into every axis and return the resulting snapshot.
    pub fn update(&mut self, spectrum: &[f32], chunk: &Chunk, tempo_estimate: f32) -> MusicalDna {
        // Fixed width for every history; extra bands are dropped, missing
        // ones read as zero.
        let mut frame = vec![0.0; self.bands];
        let n = spectrum.len().min(self.bands);
        frame[..n].copy_from_slice(&spectrum[..n]);

        self.spectral_memory.push(&frame);
        let mean_energy = stats::mean(&frame);
        self.energy_memory.push(mean_energy);

        let chroma = chroma_fold(&frame);
        self.chroma_memory.push(&chroma);

        self.tonal_identity(&chroma);
        self.rhythmic_identity(chunk, tempo_estimate);
        self.harmonic_identity(&frame);
        self.melodic_identity(&frame);
        self.timbral_identity(&frame);
        self.dynamic_identity();
        self.structural_identity();
        self.temporal_flows();

        self.tick += 1;
        self.snapshot()
    }

    fn tonal_identity(&mut self, chroma: &[f32; 12]) {
        let total: f32 = chroma.iter().sum();
        if total > EPSILON {
            self.tonal.center.update(stats::argmax(chroma) as f32);

            let major: f32 = MAJOR_CLASSES.iter().map(|&i| chroma[i]).sum();
            self.tonal.brightness.update(major / total);
        }
        self.tonal.signature.update(chroma);

        if self.chroma_memory.len() > 10 {
            let recent: Vec<&[f32]> = self.chroma_memory.recent(10).collect();
            let spread = (0..12)
                .map(|bin| {
                    let column: Vec<f32> = recent.iter().map(|c| c[bin]).collect();
                    stats::std_dev(&column)
                })
                .sum::<f32>()
                / 12.0;
            self.tonal.stability.update(1.0 - spread);
        }
    }

    fn rhythmic_identity(&mut self, chunk: &Chunk, tempo_estimate: f32) {
        let onset = derivative_onset(chunk.samples());
        self.rhythmic.onset = onset;
        self.rhythm_memory.push(onset);

        if self.rhythm_memory.len() > 20 {
            let complexity = (self.rhythm_memory.variance_recent(20) * 10.0).min(1.0);
            self.rhythmic.complexity.update(complexity);
        }

        let slot = (self.tick % 16) as usize;
        self.rhythmic.pattern.update_at(slot, onset);

        if self.rhythm_memory.len() >= 8 {
            let recent = self.rhythm_memory.recent_vec(8);
            let on_beat: f32 = recent.iter().step_by(2).sum();
            let off_beat: f32 = recent.iter().skip(1).step_by(2).sum();
            if on_beat + off_beat > EPSILON {
                self.rhythmic
                    .syncopation
                    .update(off_beat / (on_beat + off_beat));
            }
        }

        let groove = onset * (1.0 + self.rhythmic.syncopation.value());
        self.flows.groove.push(groove);

        if tempo_estimate.is_finite() && tempo_estimate > 0.0 {
            if let Some(prev) = self.rhythmic.previous_tempo {
                let drift = ((tempo_estimate - prev).abs() / prev).min(1.0);
                self.rhythmic.tempo_stability.update(1.0 - drift);
            }
            self.rhythmic.previous_tempo = Some(tempo_estimate);
        }
    }

    fn harmonic_identity(&mut self, frame: &[f32]) {
        let bands = frame.len();
        let active = frame.iter().filter(|&&v| v > ACTIVE_BAND).count();
        self.harmonic.richness.update(active as f32 / bands as f32);

        if bands >= 8 {
            let consonant = stats::mean(&frame[..4]);
            let dissonant = stats::mean(&frame[4..]);
            if consonant + dissonant > EPSILON {
                self.harmonic
                    .consonance
                    .update(consonant / (consonant + dissonant));
            }
        }

        let dispersion = stats::coefficient_of_variation(frame) / ((bands.max(2) - 1) as f32).sqrt();
        self.harmonic.complexity.update(dispersion);

        if let Some(prev) = self.spectral_memory.back(1) {
            let change = stats::abs_diff_sum(frame, prev) / bands as f32;
            self.flows.harmonic_rhythm.push(change);
        }

        self.flows
            .tension
            .push(1.0 - self.harmonic.consonance.value());
    }

    fn melodic_identity(&mut self, frame: &[f32]) {
        let bands = frame.len() as f32;
        let significant: Vec<usize> = frame
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > ACTIVE_BAND)
            .map(|(i, _)| i)
            .collect();
        if let (Some(&lo), Some(&hi)) = (significant.first(), significant.last()) {
            if significant.len() > 1 {
                self.melodic.range.update((hi - lo) as f32 / bands);
            }
        }

        if let Some(prev) = self.spectral_memory.back(1) {
            let delta = (stats::centroid(frame) - stats::centroid(prev)) / bands;
            self.melodic.direction.update((delta * 5.0).tanh());
        }

        if self.spectral_memory.len() >= 5 {
            let mut counts = [0.0f32; 12];
            for spectrum in self.spectral_memory.recent(5) {
                let peaks = stats::find_peaks(spectrum, ACTIVE_BAND);
                for pair in peaks.windows(2) {
                    counts[(pair[1] - pair[0]) % 12] += 1.0;
                }
            }
            let total: f32 = counts.iter().sum();
            if total > 0.0 {
                counts.iter_mut().for_each(|c| *c /= total);
                self.melodic.intervals.update(&counts);
            }
        }
    }

    fn timbral_identity(&mut self, frame: &[f32]) {
        let bands = frame.len() as f32;
        self.timbral.centroid.update(stats::centroid(frame) / bands);

        let total: f32 = frame.iter().sum();
        let rolloff = if total > EPSILON {
            let target = 0.85 * total;
            let mut cumulative = 0.0;
            frame
                .iter()
                .position(|&v| {
                    cumulative += v;
                    cumulative >= target
                })
                .unwrap_or(frame.len() - 1) as f32
                / bands
        } else {
            0.0
        };
        self.timbral.rolloff.update(rolloff);

        let flatness = if total > EPSILON {
            let log_mean = frame.iter().map(|v| (v + EPSILON).ln()).sum::<f32>() / bands;
            log_mean.exp() / stats::mean(frame)
        } else {
            0.0
        };
        self.timbral.flatness.update(flatness);
        self.flows.texture.push(self.timbral.flatness.value());

        if let Some(prev) = self.spectral_memory.back(1) {
            let flux = stats::abs_diff_sum(frame, prev) / bands;
            self.timbral.flux.update(flux);
        }
    }

    fn dynamic_identity(&mut self) {
        if self.energy_memory.len() < 10 {
            return;
        }
        let recent = self.energy_memory.recent_vec(20);
        let max = recent.iter().copied().fold(f32::MIN, f32::max);
        let min = recent.iter().copied().fold(f32::MAX, f32::min);

        self.dynamic.range.update((max - min) / (max + EPSILON));
        self.dynamic
            .variance
            .update(stats::variance(&recent) / (stats::mean(&recent) + EPSILON));

        let attack = stats::mean_iter(recent.windows(2).map(|w| (w[1] - w[0]).max(0.0)));
        self.dynamic.attack.update(attack);
    }

    fn structural_identity(&mut self) {
        if self.spectral_memory.len() >= SPECTRAL_HISTORY {
            let recent: Vec<&[f32]> = self.spectral_memory.recent(SPECTRAL_HISTORY).collect();
            let mut sum = 0.0;
            let mut pairs = 0;
            for i in 0..recent.len() {
                for j in i + 1..recent.len() {
                    sum += stats::cosine_similarity(recent[i], recent[j]);
                    pairs += 1;
                }
            }
            if pairs > 0 {
                self.structural.repetition.update(sum / pairs as f32);
            }
        }

        if self.energy_memory.len() >= 10 {
            let recent = self.energy_memory.recent_vec(10);
            let (before, last) = recent.split_at(recent.len() - 1);
            let expected = stats::mean(before);
            let surprise = ((last[0] - expected).abs() / (expected + EPSILON)).min(1.0);
            self.structural.surprise.update(surprise);
        }
    }

    fn temporal_flows(&mut self) {
        if self.rhythm_memory.len() >= 10 {
            self.flows.rhythmic.push(self.rhythm_memory.mean_recent(10));
        }
        if self.spectral_memory.len() >= 5 {
            let totals = self.spectral_memory.recent(5).map(|frame| frame.iter().sum::<f32>());
            self.flows.harmonic.push(stats::mean_iter(totals));
        }
        if self.energy_memory.len() >= 10 {
            self.flows.energy.push(self.energy_memory.mean_recent(10));
        }
    }

    pub fn snapshot(&self) -> MusicalDna {
        MusicalDna {
            tonal: TonalAxis {
                tonal_center: self.tonal.center.value(),
                mode_brightness: self.tonal.brightness.value(),
                chromatic_signature: *self.tonal.signature.values(),
                scale_stability: self.tonal.stability.value(),
            },
            rhythmic: RhythmicAxis {
                tempo_stability: self.rhythmic.tempo_stability.value(),
                rhythmic_complexity: self.rhythmic.complexity.value(),
                beat_pattern: *self.rhythmic.pattern.values(),
                syncopation_index: self.rhythmic.syncopation.value(),
                onset_strength: self.rhythmic.onset,
            },
            harmonic: HarmonicAxis {
                harmonic_richness: self.harmonic.richness.value(),
                consonance_ratio: self.harmonic.consonance.value(),
                chord_complexity: self.harmonic.complexity.value(),
                tension: 1.0 - self.harmonic.consonance.value(),
            },
            melodic: MelodicAxis {
                melodic_range: self.melodic.range.value(),
                direction_bias: self.melodic.direction.value(),
                interval_signature: *self.melodic.intervals.values(),
            },
            timbral: TimbralAxis {
                spectral_centroid: self.timbral.centroid.value(),
                spectral_rolloff: self.timbral.rolloff.value(),
                spectral_flatness: self.timbral.flatness.value(),
                timbral_flux: self.timbral.flux.value(),
            },
            dynamic: DynamicAxis {
                dynamic_range: self.dynamic.range.value(),
                energy_variance: self.dynamic.variance.value(),
                attack_sharpness: self.dynamic.attack.value(),
            },
            structural: StructuralAxis {
                repetition_density: self.structural.repetition.value(),
                surprise_quotient: self.structural.surprise.value(),
            },
            flow: FlowSeries {
                groove_signature: self.flows.groove.iter().collect(),
                harmonic_rhythm: self.flows.harmonic_rhythm.iter().collect(),
                tension_release: self.flows.tension.iter().collect(),
                texture_evolution: self.flows.texture.iter().collect(),
                rhythmic_flow: self.flows.rhythmic.iter().collect(),
                harmonic_flow: self.flows.harmonic.iter().collect(),
                energy_flow: self.flows.energy.iter().collect(),
            },
            extras: OptionalDescriptors::default(),
        }
    }
}

/// Fold bands into 12 pseudo pitch classes by index modulo 12, normalized to
/// sum 1 (all zero when the input carries no energy).
pub fn chroma_fold(spectrum: &[f32]) -> [f32; 12] {
    let mut chroma = [0.0f32; 12];
    for (i, &v) in spectrum.iter().enumerate() {
        chroma[i % 12] += v.max(0.0);
    }
    let total: f32 = chroma.iter().sum();
    if total > EPSILON {
        chroma.iter_mut().for_each(|c| *c /= total);
    }
    chroma
}

/// Mean positive step of the rectified waveform, scaled into 0.0-1.0.
fn derivative_onset(samples: &[f32]) -> f32 {
    if samples.len() < 10 {
        return 0.0;
    }
    let rises = samples
        .windows(2)
        .map(|w| (w[1].abs() - w[0].abs()).max(0.0));
    (stats::mean_iter(rises) * 1000.0).min(1.0)
}
