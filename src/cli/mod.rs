//! Command-line interface: the adapter build steps invoke

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
