//! CLI module for remindr - command-line interface and subcommands.
//!
//! Provides reminder management commands, one-shot and daemon sweeps,
//! settings and a transport check.

pub mod commands;

pub use commands::Cli;
