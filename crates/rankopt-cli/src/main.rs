//! rankopt
//!
//! Inspect and manage rank optimization jobs.
//!
//! # Usage
//!
//! ```bash
//! rankopt track VIDEO_ID --topic "rust async tutorial" --title "Async Rust" [--rank N]
//! rankopt stop VIDEO_ID
//! rankopt start VIDEO_ID [--target-rank N]
//! rankopt status VIDEO_ID
//! rankopt versions VIDEO_ID
//! rankopt keyword add VIDEO_ID "tokio tutorial"
//! rankopt admin stats
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/rankopt/config.toml)
//! 3. Environment variables (RANKOPT_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use rankopt_cli::{run, Cli};

fn main() -> Result<()> {
    run(Cli::parse())
}
