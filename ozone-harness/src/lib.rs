//! Library half of the `ozone-harness` binary.
//!
//! Exposed so the command handlers can be tested without spawning the
//! binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod metrics_server;
pub mod output;
