//! CLI module
//!
//! Command-line interface for the sync.
//!
//! # Commands
//!
//! - `check` - Obtain a token and fetch the lists once
//! - `discover` - Print the stream catalog
//! - `read` - Sync the selected streams to stdout

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
