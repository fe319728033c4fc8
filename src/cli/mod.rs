//! Command-line interface for inspecting and maintaining a cache

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
