//! Shared types for the Ozone test harness.
//!
//! - [`app`]: application catalogue (`AppId`, `AppDescriptor`, `AppRegistry`)
//! - [`stack`]: stack definition file selection (`select`, `StackFileList`)
//! - [`probe`]: readiness probe seam (`HealthProbe`)
//! - [`config`]: `ozone-harness.toml` loading and validation
//! - [`error`]: error taxonomy
//! - [`metrics`]: metric names

pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod stack;

// --- re-exports ---

pub use app::{AppDescriptor, AppId, AppRegistry, COMMON_STACK_FILES, Credentials};
pub use config::HarnessConfig;
pub use error::{ConfigError, HarnessError, ReadinessError, ScriptError, WorkspaceError};
pub use probe::HealthProbe;
pub use stack::{StackFileList, select, select_with_common};
