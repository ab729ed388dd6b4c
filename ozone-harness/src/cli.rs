//! CLI argument parsing using clap derive API
//!
//! Purely declarative, no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use ozone_harness_core::AppId;
use ozone_harness_core::config::HarnessConfig;

/// Ozone harness -- provisions a disposable Ozone test stack.
///
/// Use `ozone-harness <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ozone-harness", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ozone-harness.toml configuration file.
    #[arg(short, long, default_value = "ozone-harness.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl Cli {
    /// Applies the flag layer on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut HarnessConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a stack, wait until it is ready and hold it until interrupted.
    Up(UpArgs),

    /// Print the stack file list for a set of apps.
    Files(AppsArgs),

    /// Probe each app's health endpoint once.
    Check(AppsArgs),

    /// List the application catalogue.
    Apps,
}

// ---- up ----

#[derive(Args, Debug)]
pub struct UpArgs {
    /// App to start (repeatable): openmrs, odoo, keycloak.
    #[arg(long = "app", value_name = "ID")]
    pub apps: Vec<AppId>,

    /// Use the single sign-on start script instead of the app selection.
    #[arg(long, conflicts_with = "demo")]
    pub sso: bool,

    /// Use the demo data start script instead of the app selection.
    #[arg(long)]
    pub demo: bool,

    /// Start script timeout in seconds (default: scripts.startup_timeout_secs).
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Readiness wait in seconds (default: readiness.timeout_secs).
    #[arg(long)]
    pub wait_secs: Option<u64>,

    /// Environment file override applied before the start script (repeatable).
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,
}

/// Which start script `up` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Apps,
    Sso,
    Demo,
}

impl UpArgs {
    pub fn mode(&self) -> StartMode {
        if self.sso {
            StartMode::Sso
        } else if self.demo {
            StartMode::Demo
        } else {
            StartMode::Apps
        }
    }
}

// ---- files / check ----

#[derive(Args, Debug)]
pub struct AppsArgs {
    /// App id (repeatable): openmrs, odoo, keycloak.
    #[arg(long = "app", value_name = "ID", required = true)]
    pub apps: Vec<AppId>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
