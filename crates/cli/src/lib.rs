//! Command line tool for the resource distributor.
//!
//! Provides commands for:
//! - Printing the effective distributor configuration
//! - Running an in-process simulation of ingest, list and watch

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
