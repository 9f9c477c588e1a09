//! Uses clap to define the CLI interface declaratively.
use std::path::PathBuf;

use clap::{command, Parser};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML file describing the timers, signals, and eventfds to watch
    #[arg(short, default_value = "adelie.toml", long, value_name = "FILE")]
    pub config: PathBuf,
}
