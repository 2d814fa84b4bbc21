use clap::Parser;
use std::path::PathBuf;

use sonicdna::config::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "sonicdna",
    about = "Streams per-tick spectral, rhythmic and musical-identity analysis of an audio file"
)]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Analysis resolution
    #[arg(short, long, value_enum, default_value_t = Mode::Dashboard)]
    pub mode: Mode,

    /// Ticks per second of playback
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Write JSON lines here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Tick against the wall clock instead of replaying as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Emit every Nth snapshot
    #[arg(long, default_value_t = 1)]
    pub stride: usize,

    /// Config file (defaults to sonicdna.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pretty-print each snapshot
    #[arg(long)]
    pub pretty: bool,

    /// Print only the end-of-run summary
    #[arg(short, long)]
    pub quiet: bool,
}
