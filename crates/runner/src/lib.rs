//! Ozone test stack runner.
//!
//! - [`workspace`]: project root discovery and workspace directories (`WorkspaceManager`)
//! - [`script`]: lifecycle script execution with timeouts (`ScriptRunner`)
//! - [`env_file`]: `KEY=VALUE` environment file overrides
//! - [`readiness`]: health probing and readiness waits (`HttpHealthProbe`, `ReadinessPoller`)
//! - [`orchestrator`]: composition root (`Orchestrator`)
//!
//! # Flow
//!
//! ```text
//! Orchestrator::start(apps)
//!     -> WorkspaceManager::refresh_stack_tree()
//!     -> select(apps) -> control file
//!     -> ScriptRunner::run("start.sh")
//! caller
//!     -> ReadinessPoller::await_all_ready(apps)
//! Orchestrator::close()
//!     -> ScriptRunner::run("destroy-demo.sh")
//!     -> WorkspaceManager::destroy()
//! ```

pub mod env_file;
#[cfg(unix)]
mod interrupt;
pub mod orchestrator;
pub mod readiness;
pub mod script;
pub mod workspace;

// --- re-exports ---

pub use env_file::override_environment;
pub use orchestrator::{Orchestrator, OrchestratorState};
pub use readiness::{HttpHealthProbe, ReadinessPoller};
pub use script::ScriptRunner;
pub use workspace::{WorkspaceManager, find_project_root};
