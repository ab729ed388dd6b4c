//! `ozone-harness up` command handler
//!
//! Starts the stack, waits until every requested app is ready, then holds
//! until SIGINT/SIGTERM. The orchestrator is closed on every path out.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ozone_harness_core::config::HarnessConfig;
use ozone_harness_core::error::{HarnessError, ReadinessError};
use ozone_harness_core::{AppDescriptor, AppId, AppRegistry, HealthProbe};
use ozone_harness_runner::{HttpHealthProbe, Orchestrator, OrchestratorState, ReadinessPoller};

use crate::cli::{StartMode, UpArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

pub async fn execute(
    args: UpArgs,
    config: &HarnessConfig,
    registry: &AppRegistry,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let plan = UpPlan {
        mode: args.mode(),
        apps: registry.descriptors_for(&args.apps),
        start_timeout: args
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.scripts.startup_timeout()),
        wait: args
            .wait_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.readiness.timeout()),
    };
    let probe = HttpHealthProbe::from_config(&config.readiness)?;
    let poller = ReadinessPoller::new(probe, config.readiness.poll_interval());

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    let mut orchestrator = Orchestrator::new(config).await?;
    orchestrator.set_env_overrides(args.env.into_iter().collect::<BTreeMap<_, _>>());

    match bring_up(&mut orchestrator, &poller, &plan, &cancel).await {
        Ok(report) => {
            writer.render(&report)?;
            info!("stack is up, waiting for shutdown signal");
            cancel.cancelled().await;
            info!("tearing down stack");
            orchestrator.close().await?;
            Ok(())
        }
        Err(e) => {
            if let Err(close_err) = orchestrator.close().await {
                warn!(error = %close_err, "teardown after failed start also failed");
            }
            Err(e)
        }
    }
}

/// What `up` starts and how long it waits.
#[derive(Debug, Clone)]
pub struct UpPlan {
    pub mode: StartMode,
    pub apps: Vec<AppDescriptor>,
    pub start_timeout: Duration,
    pub wait: Duration,
}

/// Runs the start script for `plan` and waits for readiness.
///
/// Does not close the orchestrator; the caller does that on every outcome.
pub async fn bring_up<P: HealthProbe>(
    orchestrator: &mut Orchestrator,
    poller: &ReadinessPoller<P>,
    plan: &UpPlan,
    cancel: &CancellationToken,
) -> Result<UpReport, CliError> {
    let started = Instant::now();

    let result = tokio::select! {
        result = start(orchestrator, plan) => result,
        _ = cancel.cancelled() => return Err(CliError::Interrupted),
    };
    result?;

    match poller.await_all_ready(&plan.apps, plan.wait, cancel).await {
        Ok(true) => Ok(UpReport {
            mode: mode_name(plan.mode),
            state: orchestrator.state(),
            apps: plan
                .apps
                .iter()
                .map(|app| ReadyApp {
                    app: app.id,
                    url: app.base_url.clone(),
                })
                .collect(),
            workspace: orchestrator.workspace().root().display().to_string(),
            elapsed_secs: started.elapsed().as_secs(),
        }),
        Ok(false) => {
            let mut not_ready = Vec::new();
            for app in &plan.apps {
                if !poller.probe(app).await {
                    not_ready.push(app.id.to_string());
                }
            }
            Err(CliError::NotReady { apps: not_ready })
        }
        Err(ReadinessError::Interrupted { .. }) => Err(CliError::Interrupted),
        Err(e) => Err(e.into()),
    }
}

async fn start(orchestrator: &mut Orchestrator, plan: &UpPlan) -> Result<(), HarnessError> {
    match plan.mode {
        StartMode::Apps => orchestrator.start(&plan.apps, plan.start_timeout).await,
        StartMode::Sso => orchestrator.start_with_sso().await,
        StartMode::Demo => orchestrator.start_with_demo_data().await,
    }
}

fn mode_name(mode: StartMode) -> &'static str {
    match mode {
        StartMode::Apps => "apps",
        StartMode::Sso => "sso",
        StartMode::Demo => "demo",
    }
}

#[cfg(unix)]
fn spawn_signal_listener(cancel: CancellationToken) -> Result<(), CliError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!(signal = name, "shutdown signal received");
        cancel.cancel();
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_listener(cancel: CancellationToken) -> Result<(), CliError> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(signal = "ctrl-c", "shutdown signal received");
            cancel.cancel();
        }
    });
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct UpReport {
    pub mode: &'static str,
    pub state: OrchestratorState,
    pub apps: Vec<ReadyApp>,
    pub workspace: String,
    pub elapsed_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadyApp {
    pub app: AppId,
    pub url: String,
}

impl Render for UpReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Stack: {} ({} start, {}s)",
            self.state.to_string().green().bold(),
            self.mode,
            self.elapsed_secs
        )?;
        writeln!(w, "Workspace: {}", self.workspace)?;
        for app in &self.apps {
            writeln!(w, "  {:<10} {}", app.app.as_str(), app.url)?;
        }
        writeln!(w, "Press Ctrl-C to tear down.")?;
        Ok(())
    }
}
