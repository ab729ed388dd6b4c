//! Orchestrator -- workspace, lifecycle scripts and running-app set
//!
//! ```text
//! Idle -> Preparing -> Starting -> Running -> Stopping -> Idle
//!            |            |
//!            +-> Error <--+
//! ```
//!
//! All operations take `&mut self`, so one instance is driven by one caller
//! at a time. Readiness is not part of `start`; callers gate on
//! [`ReadinessPoller`](crate::readiness::ReadinessPoller) afterwards.
//!
//! Release with [`Orchestrator::close`]. An instance dropped without `close`
//! tears down synchronously in `Drop`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use ozone_harness_core::config::HarnessConfig;
use ozone_harness_core::error::{ConfigError, HarnessError, WorkspaceError};
use ozone_harness_core::{AppDescriptor, select};

use crate::env_file;
use crate::script::ScriptRunner;
use crate::workspace::{WorkspaceManager, find_project_root};

pub const START_SCRIPT: &str = "start.sh";
pub const START_WITH_SSO_SCRIPT: &str = "start-with-sso.sh";
pub const START_DEMO_SCRIPT: &str = "start-demo.sh";
pub const STOP_SCRIPT: &str = "stop-demo.sh";
pub const DESTROY_SCRIPT: &str = "destroy-demo.sh";

/// Lifecycle state of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Preparing,
    Starting,
    Running,
    Stopping,
    /// A start or teardown step failed. Retry the operation or close.
    Error,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Owns one workspace and drives the external lifecycle scripts in it.
pub struct Orchestrator {
    project_root: PathBuf,
    template_dir: PathBuf,
    workspace: WorkspaceManager,
    scripts_dir: PathBuf,
    env_file: PathBuf,
    control_file: String,
    runner: ScriptRunner,
    startup_timeout: Duration,
    teardown_timeout: Duration,
    env_overrides: BTreeMap<String, String>,
    running: Vec<AppDescriptor>,
    state: OrchestratorState,
    /// Set while a start or teardown step is in progress. Still set once
    /// the caller can look again means that step's future was dropped.
    in_flight: bool,
    closed: bool,
}

impl Orchestrator {
    /// Discovers the project root from the current directory and prepares
    /// an empty workspace under it.
    pub async fn new(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let cwd = std::env::current_dir()?;
        let root = find_project_root(&cwd, &config.workspace.manifest_marker)?;
        info!(root = %root.display(), "found project root");
        Self::with_root(root, config).await
    }

    /// Uses `project_root` as is. Any workspace left over from a previous
    /// run is deleted.
    pub async fn with_root(
        project_root: impl Into<PathBuf>,
        config: &HarnessConfig,
    ) -> Result<Self, HarnessError> {
        let project_root = project_root.into();
        let ws = &config.workspace;

        let workspace = WorkspaceManager::new(
            project_root.join(&ws.workspace_dir),
            &ws.stack_dir_name,
            ws.script_extension.clone(),
        );
        workspace.prepare().await?;

        let scripts_dir = workspace.stack_dir().join(&ws.scripts_dir);
        let env_file = workspace.stack_dir().join(&ws.env_file);

        Ok(Self {
            template_dir: project_root.join(&ws.template_dir),
            project_root,
            workspace,
            scripts_dir,
            env_file,
            control_file: ws.control_file.clone(),
            runner: ScriptRunner::new(config.scripts.env.clone()),
            startup_timeout: config.scripts.startup_timeout(),
            teardown_timeout: config.scripts.teardown_timeout(),
            env_overrides: BTreeMap::new(),
            running: Vec::new(),
            state: OrchestratorState::Idle,
            in_flight: false,
            closed: false,
        })
    }

    /// Rebuilds the stack tree, writes the stack file list for `apps` and
    /// runs the start script.
    ///
    /// Success only means the script exited 0 within `timeout`. With no apps
    /// the stack's own control file is left in place.
    pub async fn start(
        &mut self,
        apps: &[AppDescriptor],
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        self.running = apps.to_vec();
        self.launch(START_SCRIPT, Some(apps), timeout).await
    }

    /// [`start`](Self::start) with no app selection and the configured
    /// startup timeout.
    pub async fn start_default(&mut self) -> Result<(), HarnessError> {
        self.start(&[], self.startup_timeout).await
    }

    /// Rebuilds the stack tree and runs the single sign-on start script.
    pub async fn start_with_sso(&mut self) -> Result<(), HarnessError> {
        self.launch(START_WITH_SSO_SCRIPT, None, self.startup_timeout)
            .await
    }

    /// Rebuilds the stack tree and runs the demo data start script.
    pub async fn start_with_demo_data(&mut self) -> Result<(), HarnessError> {
        self.launch(START_DEMO_SCRIPT, None, self.startup_timeout).await
    }

    pub async fn stop(&mut self) -> Result<(), HarnessError> {
        self.teardown(STOP_SCRIPT).await
    }

    pub async fn destroy(&mut self) -> Result<(), HarnessError> {
        self.teardown(DESTROY_SCRIPT).await
    }

    /// Overrides applied to the environment file after every stack tree
    /// refresh, before the start script runs.
    pub fn set_env_overrides(&mut self, vars: BTreeMap<String, String>) {
        self.env_overrides = vars;
    }

    /// Edits the environment file in the workspace stack tree.
    ///
    /// The next start replaces the stack tree and with it these edits; use
    /// [`set_env_overrides`](Self::set_env_overrides) to keep them.
    pub async fn override_environment(
        &self,
        vars: &BTreeMap<String, String>,
    ) -> Result<(), HarnessError> {
        env_file::override_environment(&self.env_file, vars).await
    }

    /// Apps the last `start` was asked for. Reflects intent, not what is
    /// actually up.
    pub fn running_apps(&self) -> Vec<AppDescriptor> {
        self.running.clone()
    }

    /// Current state. A start or teardown that was abandoned part way
    /// (its future dropped) reports [`OrchestratorState::Error`].
    pub fn state(&self) -> OrchestratorState {
        if self.in_flight {
            OrchestratorState::Error
        } else {
            self.state
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn workspace(&self) -> &WorkspaceManager {
        &self.workspace
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Runs destroy, then deletes the workspace even if destroy failed.
    ///
    /// Returns the destroy result.
    pub async fn close(mut self) -> Result<(), HarnessError> {
        self.closed = true;

        let destroyed = self.destroy().await;
        if let Err(e) = &destroyed {
            warn!(error = %e, "destroy failed during close, deleting workspace anyway");
        }
        self.workspace.destroy().await;
        destroyed
    }

    async fn launch(
        &mut self,
        script: &str,
        apps: Option<&[AppDescriptor]>,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        self.in_flight = true;
        let result = self.try_launch(script, apps, timeout).await;
        self.in_flight = false;
        self.state = match result {
            Ok(()) => OrchestratorState::Running,
            Err(_) => OrchestratorState::Error,
        };
        result
    }

    async fn try_launch(
        &mut self,
        script: &str,
        apps: Option<&[AppDescriptor]>,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        self.state = OrchestratorState::Preparing;
        self.workspace.refresh_stack_tree(&self.template_dir).await?;
        if !self.env_overrides.is_empty() {
            self.override_environment(&self.env_overrides).await?;
        }

        self.state = OrchestratorState::Starting;
        if let Some(apps) = apps {
            self.write_control_file(apps).await?;
        }
        self.run_script(script, timeout).await
    }

    async fn teardown(&mut self, script: &str) -> Result<(), HarnessError> {
        self.state = OrchestratorState::Stopping;
        self.in_flight = true;
        let result = self.run_script(script, self.teardown_timeout).await;
        self.in_flight = false;
        self.state = match result {
            Ok(()) => {
                self.running.clear();
                OrchestratorState::Idle
            }
            Err(_) => OrchestratorState::Error,
        };
        result
    }

    async fn write_control_file(&self, apps: &[AppDescriptor]) -> Result<(), HarnessError> {
        if apps.is_empty() {
            warn!("no apps specified, keeping the stack's default file list");
            return Ok(());
        }

        let files = select(apps);
        let path = self.scripts_dir.join(&self.control_file);
        tokio::fs::write(&path, files.to_control_file())
            .await
            .map_err(|source| WorkspaceError::Write {
                path: path.clone(),
                source,
            })?;

        let ids: Vec<&str> = apps.iter().map(|app| app.id.as_str()).collect();
        info!(apps = ?ids, files = %files, "updated stack file list");
        Ok(())
    }

    async fn run_script(&self, script: &str, timeout: Duration) -> Result<(), HarnessError> {
        if !tokio::fs::try_exists(&self.scripts_dir).await? {
            return Err(ConfigError::ScriptsDirNotFound {
                path: self.scripts_dir.clone(),
            }
            .into());
        }
        self.runner.run(script, &self.scripts_dir, timeout).await?;
        Ok(())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!(
            workspace = %self.workspace.root().display(),
            "orchestrator dropped without close, tearing down"
        );

        if self.scripts_dir.is_dir() {
            if let Err(e) =
                self.runner
                    .run_blocking(DESTROY_SCRIPT, &self.scripts_dir, self.teardown_timeout)
            {
                warn!(error = %e, "destroy failed during drop");
            }
        }
        self.workspace.destroy_blocking();
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("project_root", &self.project_root)
            .field("workspace", &self.workspace.root())
            .field("state", &self.state())
            .field("running", &self.running.len())
            .finish()
    }
}
