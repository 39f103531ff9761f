// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: The agent is configured through the environment, flags only tune startup.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "easydep")]
#[command(about = "GitHub release deployment agent")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long)]
    pub verbose: bool,

    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}
