//! Building savings predictor CLI
//!
//! Talks to a running `savings-server` to request predictions, inspect
//! the served model generation and drive training jobs.

pub mod cli;
pub mod client;
pub mod commands;
pub mod output;

pub use cli::Cli;
