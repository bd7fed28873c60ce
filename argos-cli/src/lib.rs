//! CLI interface for Argos
//!
//! This crate provides the `argos` command-line interface: argument
//! parsing, logging setup and the subcommand handlers.

pub mod args;
pub mod commands;
pub mod logging;

pub use args::{Cli, Commands};
