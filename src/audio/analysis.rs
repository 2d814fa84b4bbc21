use super::buffer::{hann_window, PlaybackClock, SampleBuffer};
use super::features::{AnalysisFrame, BandSpectrum};
use super::onset::OnsetBeatDetector;
use super::spectrum::SpectralBandAnalyzer;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::identity::{
    IdentityExtractor, InstrumentDetector, InstrumentEvents, MusicalDnaExtractor, SerenityTracker,
    VisualMapping,
};

/// Tick-driven pipeline: one playback position in, one snapshot out.
///
/// Per tick the chunk at the current position is windowed, turned into a
/// band spectrum, then handed to every extractor in a fixed order. The
/// extractors only read the spectrum and the chunk; none of them sees
/// another's state.
pub struct Analyzer {
    buffer: SampleBuffer,
    window: Vec<f32>,
    spectrum: SpectralBandAnalyzer,
    onset: OnsetBeatDetector,
    identity: IdentityExtractor,
    dna: MusicalDnaExtractor,
    instruments: InstrumentDetector,
    serenity: SerenityTracker,
    position: f64,
    ticks: u64,
    finished: bool,
    paused: bool,
    frame: AnalysisFrame,
}

impl Analyzer {
    pub fn new(buffer: SampleBuffer, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let spectrum = SpectralBandAnalyzer::new(&config, buffer.sample_rate())?;
        let bands = spectrum.band_count();

        if buffer.len() < config.chunk_size {
            log::warn!(
                "Input holds {} samples, fewer than one {}-sample chunk; every tick will be silent",
                buffer.len(),
                config.chunk_size
            );
        }

        log::debug!(
            "Analyzer: mode={:?} chunk={} bands={} sr={}Hz duration={:.2}s",
            config.mode,
            config.chunk_size,
            bands,
            buffer.sample_rate(),
            buffer.duration_secs()
        );

        let identity = IdentityExtractor::new();
        let dna = MusicalDnaExtractor::new(bands);
        let serenity = SerenityTracker::new();
        let dna_snapshot = dna.snapshot();
        let frame = AnalysisFrame {
            time: 0.0,
            tick: 0,
            exhausted: false,
            spectrum: BandSpectrum::silent(spectrum.band_centers()),
            beat: false,
            onset_strength: 0.0,
            total_energy: 0.0,
            spectral_flux: 0.0,
            identity: identity.record(),
            visual: VisualMapping::from_dna(&dna_snapshot),
            dna: dna_snapshot,
            instruments: InstrumentEvents::default(),
            serenity: serenity.state(),
        };

        Ok(Self {
            window: hann_window(config.chunk_size),
            onset: OnsetBeatDetector::new(config.onset, config.silence_threshold),
            instruments: InstrumentDetector::new(bands),
            buffer,
            spectrum,
            identity,
            dna,
            serenity,
            position: 0.0,
            ticks: 0,
            finished: false,
            paused: false,
            frame,
        })
    }

    /// Advance one tick.
    ///
    /// `position` is the playback position in seconds; `None` means playback
    /// is paused, in which case no chunk is read and the previous snapshot is
    /// returned unchanged. Positions never move backwards: a smaller value
    /// than the last one seen is treated as the last one.
    pub fn tick(&mut self, position: Option<f64>) -> &AnalysisFrame {
        let Some(requested) = position else {
            if !self.paused {
                log::debug!("Playback paused at {:.3}s", self.position);
                self.paused = true;
            }
            return &self.frame;
        };
        if self.paused {
            log::debug!("Playback resumed at {:.3}s", requested);
            self.paused = false;
        }
        if requested.is_finite() {
            self.position = self.position.max(requested);
        }
        let now = self.position;

        let chunk = self.buffer.chunk_at(now, &self.window);
        if chunk.is_exhausted() && !self.finished {
            log::debug!("End of sample data reached at {:.3}s", now);
            self.finished = true;
        }

        let spectrum = self.spectrum.analyze(&chunk);
        let current = spectrum.current();

        let onset = self.onset.detect(&chunk, now);
        self.identity
            .update(current, onset.beat, onset.onset_strength, now);
        let dna = self.dna.update(current, &chunk, self.identity.tempo());
        let instruments = self.instruments.detect(current, &chunk);
        let serenity = self.serenity.update(current, &chunk);

        self.ticks += 1;
        log::trace!(
            "tick {} t={:.3}s beat={} onset={:.2} energy={:.3}",
            self.ticks,
            now,
            onset.beat,
            onset.onset_strength,
            spectrum.total_energy()
        );

        self.frame = AnalysisFrame {
            time: now,
            tick: self.ticks,
            exhausted: chunk.is_exhausted(),
            total_energy: spectrum.total_energy(),
            spectral_flux: spectrum.spectral_flux(),
            spectrum,
            beat: onset.beat,
            onset_strength: onset.onset_strength,
            identity: self.identity.record(),
            visual: VisualMapping::from_dna(&dna),
            dna,
            instruments,
            serenity,
        };
        &self.frame
    }

    /// Advance one tick at whatever position `clock` reports.
    pub fn tick_with(&mut self, clock: &impl PlaybackClock) -> &AnalysisFrame {
        self.tick(clock.position())
    }

    /// The most recent snapshot.
    pub fn snapshot(&self) -> &AnalysisFrame {
        &self.frame
    }

    /// True once a tick has landed past the end of the sample data.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn beat_count(&self) -> u64 {
        self.onset.beat_count()
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    fn tone(secs: f64) -> SampleBuffer {
        let sr = 22050;
        let n = (secs * sr as f64) as usize;
        let samples = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sr as f32).sin() * 0.5)
            .collect();
        SampleBuffer::new(samples, sr).unwrap()
    }

    #[test]
    fn initial_snapshot_is_silent() {
        let analyzer = Analyzer::new(tone(1.0), AnalysisConfig::for_mode(Mode::Dashboard)).unwrap();
        let frame = analyzer.snapshot();
        assert_eq!(frame.tick, 0);
        assert_eq!(frame.spectrum.slow, vec![0.0; 8]);
        assert_eq!(frame.identity.tempo, 120.0);
    }

    #[test]
    fn position_never_moves_backwards() {
        let mut analyzer = Analyzer::new(tone(1.0), AnalysisConfig::default()).unwrap();
        analyzer.tick(Some(0.5));
        let frame = analyzer.tick(Some(0.2));
        assert_eq!(frame.time, 0.5);
        analyzer.tick(Some(f64::NAN));
        assert_eq!(analyzer.position(), 0.5);
    }

    #[test]
    fn pause_returns_previous_snapshot() {
        let mut analyzer = Analyzer::new(tone(1.0), AnalysisConfig::default()).unwrap();
        for i in 0..5 {
            analyzer.tick(Some(i as f64 * 0.02));
        }
        let before = analyzer.snapshot().clone();
        let during = analyzer.tick(None).clone();
        assert!(analyzer.is_paused());
        assert_eq!(during.tick, before.tick);
        assert_eq!(during.spectrum.slow, before.spectrum.slow);
        assert_eq!(analyzer.ticks(), 5);
        analyzer.tick(Some(0.2));
        assert!(!analyzer.is_paused());
        assert_eq!(analyzer.ticks(), 6);
    }

    #[test]
    fn finishes_past_end_of_data() {
        let mut analyzer = Analyzer::new(tone(0.1), AnalysisConfig::default()).unwrap();
        analyzer.tick(Some(0.0));
        assert!(!analyzer.is_finished());
        let frame = analyzer.tick(Some(0.5));
        assert!(frame.exhausted);
        assert!(!frame.beat);
        assert!(frame.spectrum.slow.iter().all(|&v| v == 0.0));
        assert!(analyzer.is_finished());
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = AnalysisConfig::default();
        config.spectrum.boost.pop();
        assert!(Analyzer::new(tone(0.1), config).is_err());
    }
}
