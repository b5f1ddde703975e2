use clap::Parser;
use std::path::PathBuf;

/// Video feed playback demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing the feed's video assets
    #[arg(value_name = "DIR", default_value = "videos")]
    pub feed_dir: PathBuf,

    /// Load configuration from JSON file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Worker threads for thumbnail decoding (default: cores - 1)
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Number of simulated scroll passes over the feed
    #[arg(short = 'p', long = "passes", value_name = "N", default_value = "1")]
    pub passes: usize,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
