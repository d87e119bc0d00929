//! CLI subcommand implementations.

pub mod commands;
