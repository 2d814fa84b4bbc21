mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use cli::Cli;
use sonicdna::audio::decode::decode_audio;
use sonicdna::config::{self, Config, Mode};
use sonicdna::{AnalysisFrame, Analyzer, SteppedClock, WallClock};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect sonicdna.toml / global config
    let config_path = cli.config.clone().or_else(find_config);
    let file_config = match config_path {
        Some(ref path) => {
            let cfg = config::load_config(path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    // Merge: config values apply only when CLI is at its default
    if cli.mode == Mode::Dashboard {
        cli.mode = file_config.analysis.mode;
    }
    if cli.fps == 60 {
        cli.fps = file_config.output.fps;
    }
    if cli.stride == 1 {
        cli.stride = file_config.output.stride;
    }
    if !cli.pretty {
        cli.pretty = file_config.output.pretty;
    }

    if cli.fps == 0 {
        anyhow::bail!("--fps must be at least 1");
    }
    if cli.stride == 0 {
        anyhow::bail!("--stride must be at least 1");
    }
    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    let analysis_config = file_config
        .analysis_config(cli.mode)
        .context("Invalid analysis configuration")?;

    log::info!("sonicdna - streaming musical feature extraction");
    log::info!("Input: {}", cli.input.display());
    log::info!(
        "Mode: {:?} ({} samples/chunk, {} bands) @ {} ticks/s",
        cli.mode,
        analysis_config.chunk_size,
        analysis_config.band_count(),
        cli.fps
    );

    log::info!("Decoding audio...");
    let buffer = decode_audio(&cli.input)?;
    let mut analyzer = Analyzer::new(buffer, analysis_config)?;

    let mut sink: Box<dyn Write> = match cli.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        )),
        None if cli.quiet => Box::new(io::sink()),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let started = Instant::now();
    if cli.realtime {
        run_realtime(&mut analyzer, &cli, &mut sink)?;
    } else {
        run_replay(&mut analyzer, &cli, &mut sink)?;
    }
    sink.flush().context("Failed to flush output")?;

    summarize(&analyzer, started.elapsed());
    if let Some(ref path) = cli.output {
        log::info!("Done! Output: {}", path.display());
    }
    Ok(())
}

fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("sonicdna.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonicdna").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonicdna").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Step a deterministic clock through the whole file as fast as possible.
fn run_replay(analyzer: &mut Analyzer, cli: &Cli, sink: &mut dyn Write) -> Result<()> {
    let expected = (analyzer.duration_secs() * cli.fps as f64).ceil() as u64 + 1;
    let pb = ProgressBar::new(expected);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ticks ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let mut clock = SteppedClock::new(cli.fps);
    while !analyzer.is_finished() {
        let frame = analyzer.tick_with(&clock);
        if !frame.exhausted {
            emit(frame, cli, sink)?;
        }
        clock.advance();
        pb.set_position(clock.ticks().min(expected));
    }

    pb.finish_with_message("Analysis complete");
    Ok(())
}

/// Tick against the wall clock at the requested rate.
fn run_realtime(analyzer: &mut Analyzer, cli: &Cli, sink: &mut dyn Write) -> Result<()> {
    let period = Duration::from_secs_f64(1.0 / cli.fps as f64);
    let mut clock = WallClock::new();
    clock.start();

    let mut next = Instant::now();
    while !analyzer.is_finished() {
        let frame = analyzer.tick_with(&clock);
        if !frame.exhausted {
            emit(frame, cli, sink)?;
        }
        next += period;
        let now = Instant::now();
        if next > now {
            std::thread::sleep(next - now);
        } else {
            log::trace!("Tick overran its period by {:?}", now - next);
            next = now;
        }
    }
    Ok(())
}

fn emit(frame: &AnalysisFrame, cli: &Cli, sink: &mut dyn Write) -> Result<()> {
    if cli.quiet || (frame.tick - 1) % cli.stride as u64 != 0 {
        return Ok(());
    }
    if cli.pretty {
        serde_json::to_writer_pretty(&mut *sink, frame)?;
    } else {
        serde_json::to_writer(&mut *sink, frame)?;
    }
    writeln!(sink)?;
    Ok(())
}

fn summarize(analyzer: &Analyzer, elapsed: Duration) {
    let frame = analyzer.snapshot();
    let genre = &frame.identity.genre;
    log::info!(
        "Processed {} ticks over {:.1}s of audio in {:.2}s",
        analyzer.ticks(),
        analyzer.duration_secs(),
        elapsed.as_secs_f64()
    );
    log::info!(
        "Tempo: {:.1} BPM, beats: {}, tonal center: {:.0}, flow: {}",
        frame.identity.tempo,
        analyzer.beat_count(),
        frame.dna.tonal.tonal_center,
        frame.visual.flow_dynamics
    );
    log::info!(
        "Genre indicators: percussive {:.2}, melodic {:.2}, harmonic {:.2}, rhythmic {:.2}",
        genre.percussive,
        genre.melodic,
        genre.harmonic,
        genre.rhythmic
    );
}
