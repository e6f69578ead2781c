//! rankopt command-line library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations over the job store

pub mod cli;
pub mod commands;

pub use cli::{AdminCommands, Cli, Commands, KeywordCommands, StatusFilter};
pub use commands::{execute, init_logging, load_settings, open_storage, run};
