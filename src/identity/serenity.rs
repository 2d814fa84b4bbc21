use serde::Serialize;
use std::f32::consts::TAU;

use crate::audio::buffer::Chunk;
use crate::smoothing::RingBuffer;
use crate::stats::EPSILON;

const ENERGY_MEMORY: usize = 60;
const CHUNK_MEMORY: usize = 8;
const GENTLE_WINDOW: usize = 30;
const VARIANCE_WINDOW: usize = 20;
const DIRECTION_WINDOW: usize = 16;

/// Slow ambient measures of how calm the music is.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SerenityState {
    /// Mean band energy over the last 30 ticks (0.0-1.0)
    pub gentle_energy: f32,
    /// 0.3 (restless) to 0.9 (steady)
    pub serenity_level: f32,
    /// Phase in radians, advances faster with more energy
    pub flow_rhythm: f32,
    /// Phase in radians, advances faster when calm
    pub breath_cycle: f32,
    /// Chunk loudness jump against the last few chunks (0.0-1.0)
    pub beat_energy: f32,
    /// Energy trend over the last 16 ticks (-0.5 to 0.5)
    pub melodic_direction: f32,
}

impl Default for SerenityState {
    fn default() -> Self {
        Self {
            gentle_energy: 0.0,
            serenity_level: 0.5,
            flow_rhythm: 0.0,
            breath_cycle: 0.0,
            beat_energy: 0.0,
            melodic_direction: 0.0,
        }
    }
}

pub struct SerenityTracker {
    energy_memory: RingBuffer,
    chunk_memory: RingBuffer,
    state: SerenityState,
}

impl Default for SerenityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SerenityTracker {
    pub fn new() -> Self {
        Self {
            energy_memory: RingBuffer::new(ENERGY_MEMORY),
            chunk_memory: RingBuffer::new(CHUNK_MEMORY),
            state: SerenityState::default(),
        }
    }

    pub fn update(&mut self, spectrum: &[f32], chunk: &Chunk) -> SerenityState {
        let band_energy = if spectrum.is_empty() {
            0.0
        } else {
            spectrum.iter().sum::<f32>() / spectrum.len() as f32
        };
        self.energy_memory.push(band_energy);

        let s = &mut self.state;
        if self.energy_memory.len() > 10 {
            s.gentle_energy = self.energy_memory.mean_recent(GENTLE_WINDOW);
            let variance = self.energy_memory.variance_recent(VARIANCE_WINDOW);
            s.serenity_level = (0.9 - 0.6 * (variance * 10.0).min(1.0)).clamp(0.3, 0.9);
        }

        s.flow_rhythm = (s.flow_rhythm + 0.01 * (1.0 + s.gentle_energy)) % TAU;
        s.breath_cycle = (s.breath_cycle + 0.005 * (0.5 + s.serenity_level * 0.5)) % TAU;

        let loudness = chunk.mean_square();
        s.beat_energy = if self.chunk_memory.len() >= CHUNK_MEMORY {
            let recent = self.chunk_memory.mean();
            (((loudness - recent) / (recent + EPSILON)).max(0.0) * 0.5).min(1.0)
        } else {
            0.0
        };
        self.chunk_memory.push(loudness);

        s.melodic_direction = if self.energy_memory.len() >= DIRECTION_WINDOW {
            let recent = self.energy_memory.recent_vec(DIRECTION_WINDOW);
            let (first, second) = recent.split_at(DIRECTION_WINDOW / 2);
            let first = first.iter().sum::<f32>() / first.len() as f32;
            let second = second.iter().sum::<f32>() / second.len() as f32;
            ((second - first) / (first + EPSILON) * 3.0).tanh() * 0.5
        } else {
            0.0
        };

        self.state
    }

    pub fn state(&self) -> SerenityState {
        self.state
    }
}
