//! `ozone-harness check` command handler
//!
//! Probes every requested app once, without the short-circuit of a
//! readiness pass, so the report covers all of them.

use std::io::Write;

use serde::Serialize;

use ozone_harness_core::config::HarnessConfig;
use ozone_harness_core::{AppDescriptor, AppId, AppRegistry, HealthProbe};
use ozone_harness_runner::{HttpHealthProbe, ReadinessPoller};

use crate::cli::AppsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Exits with [`CliError::NotReady`] when any app is not ready.
pub async fn execute(
    args: &AppsArgs,
    config: &HarnessConfig,
    registry: &AppRegistry,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let probe = HttpHealthProbe::from_config(&config.readiness)?;
    let poller = ReadinessPoller::new(probe, config.readiness.poll_interval());

    let report = check_apps(&poller, &registry.descriptors_for(&args.apps)).await;
    writer.render(&report)?;

    let not_ready = report.not_ready();
    if not_ready.is_empty() {
        Ok(())
    } else {
        Err(CliError::NotReady { apps: not_ready })
    }
}

pub async fn check_apps<P: HealthProbe>(
    poller: &ReadinessPoller<P>,
    apps: &[AppDescriptor],
) -> CheckReport {
    let mut results = Vec::with_capacity(apps.len());
    for app in apps {
        results.push(AppCheck {
            app: app.id,
            url: app.health_url(),
            ready: poller.probe(app).await,
        });
    }
    CheckReport { results }
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub results: Vec<AppCheck>,
}

impl CheckReport {
    pub fn not_ready(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.ready)
            .map(|r| r.app.to_string())
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct AppCheck {
    pub app: AppId,
    pub url: String,
    pub ready: bool,
}

impl Render for CheckReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for r in &self.results {
            let status = if r.ready {
                "ready".green()
            } else {
                "not ready".red()
            };
            writeln!(w, "{:<10} {:<10} {}", r.app.as_str(), status, r.url)?;
        }
        Ok(())
    }
}
