//! Command line front end for the chord ring.
//!
//! Starts a local ring and feeds it commands from:
//! - An interactive prompt
//! - A command file, or a file of bare inserts or queries

pub mod commands;
pub mod config;
pub mod driver;

pub use commands::{Command, CommandError, CommandResult, InputFormat};
pub use config::CliConfig;
pub use driver::Driver;
