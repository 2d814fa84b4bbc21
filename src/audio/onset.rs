use super::buffer::Chunk;
use super::features::OnsetEvent;
use crate::config::OnsetParams;
use crate::smoothing::RingBuffer;
use crate::stats::EPSILON;

/// Energy-envelope beat detector.
///
/// Keeps the last `history_len` chunk energies (sum of squares). A beat fires
/// when the newest energy exceeds `threshold_ratio` times the mean of the
/// entries before it and at least `refractory_secs` of playback time have
/// passed since the previous beat.
pub struct OnsetBeatDetector {
    params: OnsetParams,
    silence_threshold: f32,
    history: RingBuffer,
    last_beat: Option<f64>,
    beat_count: u64,
}

impl OnsetBeatDetector {
    pub fn new(params: OnsetParams, silence_threshold: f32) -> Self {
        Self {
            history: RingBuffer::new(params.history_len),
            params,
            silence_threshold,
            last_beat: None,
            beat_count: 0,
        }
    }

    /// `now` is the playback position of the chunk in seconds.
    pub fn detect(&mut self, chunk: &Chunk, now: f64) -> OnsetEvent {
        // Silent chunks leave the history untouched.
        if chunk.is_silent(self.silence_threshold) {
            return OnsetEvent::default();
        }

        let energy = chunk.energy();
        self.history.push(energy);
        if self.history.len() < self.params.warmup {
            return OnsetEvent::default();
        }

        let preceding = self.history.len() - 1;
        let mean = (self.history.iter().sum::<f32>() - energy) / preceding as f32;
        let onset_strength = ((energy - mean) / (mean + EPSILON)).max(0.0);

        let rested = self
            .last_beat
            .map_or(true, |t| now - t >= self.params.refractory_secs);
        let beat = energy > mean * self.params.threshold_ratio
            && energy > self.params.energy_floor
            && rested;

        if beat {
            self.last_beat = Some(now);
            self.beat_count += 1;
            log::trace!("beat at {:.3}s (onset {:.2})", now, onset_strength);
        }

        OnsetEvent {
            beat,
            onset_strength: if onset_strength.is_finite() { onset_strength } else { 0.0 },
        }
    }

    pub fn last_beat(&self) -> Option<f64> {
        self.last_beat
    }

    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(amp: f32) -> Chunk {
        Chunk::from_samples(vec![amp; 256])
    }

    fn detector() -> OnsetBeatDetector {
        OnsetBeatDetector::new(OnsetParams::default(), 1e-6)
    }

    #[test]
    fn cold_start_is_quiet() {
        let mut det = detector();
        for i in 0..9 {
            let ev = det.detect(&level(if i == 8 { 1.0 } else { 0.1 }), i as f64 * 0.05);
            assert_eq!(ev, OnsetEvent::default());
        }
    }

    #[test]
    fn spike_after_warmup_fires() {
        let mut det = detector();
        for i in 0..12 {
            assert!(!det.detect(&level(0.1), i as f64 * 0.05).beat);
        }
        let ev = det.detect(&level(0.5), 0.6);
        assert!(ev.beat);
        assert!(ev.onset_strength > 1.0);
        assert_eq!(det.last_beat(), Some(0.6));
    }

    #[test]
    fn steady_signal_has_no_onset() {
        let mut det = detector();
        let mut last = OnsetEvent::default();
        for i in 0..40 {
            last = det.detect(&level(0.3), i as f64 * 0.02);
            assert!(!last.beat);
        }
        assert!(last.onset_strength < 1e-4);
    }

    #[test]
    fn refractory_blocks_close_beats() {
        let mut det = detector();
        let mut t = 0.0;
        for _ in 0..12 {
            det.detect(&level(0.05), t);
            t += 0.05;
        }
        assert!(det.detect(&level(1.0), t).beat);
        det.detect(&level(0.05), t + 0.05);
        assert!(!det.detect(&level(1.0), t + 0.1).beat);
        assert!(det.detect(&level(1.0), t + 0.25).beat);
        assert_eq!(det.beat_count(), 2);
    }

    #[test]
    fn silence_never_fires_or_touches_history() {
        let mut det = detector();
        for i in 0..15 {
            det.detect(&level(0.2), i as f64 * 0.05);
        }
        for i in 15..40 {
            let ev = det.detect(&Chunk::silent(256, false), i as f64 * 0.05);
            assert_eq!(ev, OnsetEvent::default());
        }
        assert_eq!(det.history.len(), 15);
    }
}
