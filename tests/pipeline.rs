//! End-to-end behaviour of the tick pipeline on synthetic signals.

use std::f32::consts::PI;

use sonicdna::identity::extractor::{MAX_TEMPO, MIN_TEMPO};
use sonicdna::{AnalysisConfig, AnalysisFrame, Analyzer, Mode, PlaybackClock, SampleBuffer, SteppedClock};

const SR: u32 = 22050;

/// Phase is computed in f64 so periodic signals repeat sample-exactly over
/// long buffers.
fn sine(freq: f32, amp: f32, secs: f32) -> Vec<f32> {
    let n = (secs * SR as f32) as usize;
    (0..n)
        .map(|i| (2.0 * std::f64::consts::PI * freq as f64 * i as f64 / SR as f64).sin() as f32 * amp)
        .collect()
}

/// Deterministic pseudo-noise in -1..1.
fn noise(len: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(747_796_405).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 23) as f32 - 1.0
        })
        .collect()
}

/// A quiet 1050 Hz bed (period 21 samples) with a 60 Hz kick every
/// `interval` seconds starting at `interval`.
fn kick_track(interval: f32, secs: f32) -> Vec<f32> {
    let mut samples = sine(SR as f32 / 21.0, 0.01, secs);
    let kick_len = (0.05 * SR as f32) as usize;
    let period = (interval * SR as f32).round() as usize;
    let mut start = period;
    while start + kick_len < samples.len() {
        for j in 0..kick_len {
            let t = j as f32 / SR as f32;
            let env = 1.0 - j as f32 / kick_len as f32;
            samples[start + j] += (2.0 * PI * 60.0 * t).sin() * 0.9 * env;
        }
        start += period;
    }
    samples
}

fn analyzer(samples: Vec<f32>, mode: Mode) -> Analyzer {
    let buffer = SampleBuffer::new(samples, SR).unwrap();
    Analyzer::new(buffer, AnalysisConfig::for_mode(mode)).unwrap()
}

/// Replay the whole buffer at `fps`, collecting every non-exhausted snapshot.
fn replay(analyzer: &mut Analyzer, fps: u32) -> Vec<AnalysisFrame> {
    let mut clock = SteppedClock::new(fps);
    let mut frames = Vec::new();
    while !analyzer.is_finished() {
        let frame = analyzer.tick_with(&clock);
        if !frame.exhausted {
            frames.push(frame.clone());
        }
        clock.advance();
    }
    frames
}

fn in_unit(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

fn assert_bounded(frame: &AnalysisFrame) {
    let s = &frame.spectrum;
    for stage in [&s.fast, &s.medium, &s.slow, &s.normalized] {
        assert!(stage.iter().all(|&v| in_unit(v)), "spectrum out of range at {}", frame.time);
    }
    assert!(frame.onset_strength >= 0.0);
    assert!((MIN_TEMPO..=MAX_TEMPO).contains(&frame.identity.tempo));

    let id = &frame.identity;
    let genre = &id.genre;
    for v in [genre.percussive, genre.melodic, genre.harmonic, genre.rhythmic, id.energy_level, id.brightness] {
        assert!(in_unit(v), "identity out of range at {}", frame.time);
    }

    for (i, v) in frame.dna.unit_scalars().iter().enumerate() {
        assert!(in_unit(*v), "dna scalar {} = {} at {}", i, v, frame.time);
    }
    assert!((0.0..=11.0).contains(&frame.dna.tonal.tonal_center));
    assert!((-1.0..=1.0).contains(&frame.dna.melodic.direction_bias));

    let drums = &frame.instruments.drums;
    let melodic = &frame.instruments.melodic;
    for v in [
        drums.kick,
        drums.snare,
        drums.hihat,
        drums.crash,
        drums.overall,
        melodic.piano,
        melodic.strings,
        melodic.harmony,
        melodic.melody_strength,
        melodic.chord_change,
        frame.instruments.bass_line,
        frame.instruments.rhythm_intensity,
    ] {
        assert!(in_unit(v), "instrument score {} at {}", v, frame.time);
    }

    assert!((0.3..=0.9).contains(&frame.serenity.serenity_level));
    assert!((-0.5..=0.5).contains(&frame.serenity.melodic_direction));
}

#[test]
fn silence_yields_zero_spectrum_and_no_beats() {
    let mut analyzer = analyzer(vec![0.0; SR as usize * 2], Mode::Dashboard);
    let frames = replay(&mut analyzer, 60);
    assert!(frames.len() > 100);
    for frame in &frames {
        assert!(frame.spectrum.slow.iter().all(|&v| v == 0.0));
        assert!(!frame.beat);
        assert_eq!(frame.onset_strength, 0.0);
        assert_eq!(frame.spectrum.dominant_freq, 0.0);
        assert_bounded(frame);
    }
    assert_eq!(analyzer.beat_count(), 0);
}

#[test]
fn noisy_input_stays_in_range_in_both_modes() {
    let len = SR as usize * 4;
    let envelope: Vec<f32> = (0..len)
        .map(|i| 0.2 + 0.8 * ((i as f32 / SR as f32) * 1.7).sin().abs())
        .collect();
    let samples: Vec<f32> = noise(len, 7)
        .iter()
        .zip(&envelope)
        .zip(sine(330.0, 0.3, 4.0).iter().chain(std::iter::repeat(&0.0)))
        .map(|((n, e), s)| n * e * 0.6 + s)
        .collect();

    for mode in [Mode::Dashboard, Mode::Delicate] {
        let mut analyzer = analyzer(samples.clone(), mode);
        let frames = replay(&mut analyzer, 60);
        for frame in &frames {
            assert_eq!(frame.spectrum.slow.len(), mode.band_count());
            assert_bounded(frame);
        }
    }
}

#[test]
fn kicks_produce_spaced_beats_and_pull_tempo() {
    let mut analyzer = analyzer(kick_track(0.4, 10.0), Mode::Dashboard);
    let frames = replay(&mut analyzer, 60);

    let beats: Vec<f64> = frames.iter().filter(|f| f.beat).map(|f| f.time).collect();
    assert!(beats.len() >= 20, "only {} beats", beats.len());
    for pair in beats.windows(2) {
        assert!(pair[1] - pair[0] >= 0.2 - 1e-9);
        assert!((pair[1] - pair[0] - 0.4).abs() < 0.02, "interval {}", pair[1] - pair[0]);
    }

    let last = frames.last().unwrap();
    assert!(last.identity.tempo > 140.0 && last.identity.tempo <= 150.5);
    for frame in &frames {
        assert_bounded(frame);
    }
}

#[test]
fn repeated_input_converges() {
    // 450 Hz has a 49-sample period; at 50 ticks/s every chunk starts on a
    // multiple of it, so every tick reads the same samples.
    let mut analyzer = analyzer(sine(450.0, 0.5, 10.0), Mode::Dashboard);
    let frames = replay(&mut analyzer, 50);
    assert!(frames.len() > 400);

    let tail = &frames[380..];
    let start = tail[0].time * SR as f64;
    assert_eq!(start.round() as usize % 49, 0);
    for pair in tail.windows(2) {
        for (a, b) in pair[0].spectrum.slow.iter().zip(&pair[1].spectrum.slow) {
            assert!((a - b).abs() < 1e-4);
        }
        assert!((pair[0].identity.energy_level - pair[1].identity.energy_level).abs() < 1e-3);
    }
    assert!(tail.iter().all(|f| !f.beat));
}

#[test]
fn tonal_center_follows_a_new_tone() {
    let mut samples = sine(1000.0, 0.5, 10.0);
    samples.extend(sine(3000.0, 0.5, 10.0));
    let mut analyzer = analyzer(samples, Mode::Delicate);
    let frames = replay(&mut analyzer, 60);

    let switch = frames.iter().position(|f| f.time >= 10.0).unwrap();
    let before = frames[switch - 1].dna.tonal.tonal_center;
    let after = frames.last().unwrap().dna.tonal.tonal_center;
    assert!((before - 1.0).abs() < 0.2, "center before switch {}", before);
    assert!(after > 3.0, "center after switch {}", after);
}

#[test]
fn decays_after_the_music_stops() {
    let mut samples = kick_track(0.5, 3.0);
    samples.extend(std::iter::repeat(0.0).take(SR as usize * 3));
    let mut analyzer = analyzer(samples, Mode::Dashboard);
    let frames = replay(&mut analyzer, 60);

    let quiet_from = 3.0 + 1024.0 / SR as f64;
    let quiet: Vec<&AnalysisFrame> = frames.iter().filter(|f| f.time > quiet_from).collect();
    assert!(quiet.len() > 100);
    for pair in quiet.windows(2) {
        assert!(!pair[1].beat);
        assert_eq!(pair[1].onset_strength, 0.0);
        assert_eq!(pair[1].total_energy, 0.0);
        assert!(pair[1].serenity.gentle_energy <= pair[0].serenity.gentle_energy + 1e-6);
    }
    let last = quiet.last().unwrap();
    assert!(last.serenity.gentle_energy < 1e-6);
    assert!(last.instruments.drums.overall < 1e-6);
}

#[test]
fn end_of_data_snapshot_is_silent() {
    let mut analyzer = analyzer(sine(220.0, 0.5, 0.5), Mode::Dashboard);
    for i in 0..20 {
        analyzer.tick(Some(i as f64 / 60.0));
    }
    let frame = analyzer.tick(Some(5.0));
    assert!(frame.exhausted);
    assert!(!frame.beat);
    assert!(frame.spectrum.slow.iter().all(|&v| v == 0.0));
    assert_eq!(frame.instruments.drums.overall, 0.0);
    assert!(analyzer.is_finished());
}

struct ManualClock(Option<f64>);

impl PlaybackClock for ManualClock {
    fn position(&self) -> Option<f64> {
        self.0
    }
}

#[test]
fn paused_clock_repeats_last_snapshot() {
    let mut analyzer = analyzer(kick_track(0.4, 3.0), Mode::Dashboard);
    let mut clock = ManualClock(Some(0.0));
    for i in 0..60 {
        clock.0 = Some(i as f64 / 60.0);
        analyzer.tick_with(&clock);
    }
    let before = analyzer.snapshot().clone();

    clock.0 = None;
    for _ in 0..10 {
        let frame = analyzer.tick_with(&clock);
        assert_eq!(frame.tick, before.tick);
        assert_eq!(frame.time, before.time);
        assert_eq!(frame.spectrum.slow, before.spectrum.slow);
    }

    clock.0 = Some(1.0);
    let resumed = analyzer.tick_with(&clock);
    assert_eq!(resumed.tick, before.tick + 1);
    assert_eq!(resumed.time, 1.0);
}
