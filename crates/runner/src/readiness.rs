//! Readiness gating
//!
//! [`HttpHealthProbe`] issues one bounded GET per probe and treats any 2xx
//! as ready. [`ReadinessPoller`] repeats full passes over the app set at a
//! fixed interval until every app is ready, the timeout elapses, or the
//! cancellation token fires.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ozone_harness_core::config::ReadinessConfig;
use ozone_harness_core::error::ReadinessError;
use ozone_harness_core::metrics as m;
use ozone_harness_core::{AppDescriptor, HealthProbe};

/// HTTP GET health probe.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ReadinessError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .no_proxy()
            .build()
            .map_err(|e| ReadinessError::Client {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ReadinessConfig) -> Result<Self, ReadinessError> {
        Self::new(config.request_timeout(), config.connect_timeout())
    }
}

impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, app: &AppDescriptor) -> bool {
        let url = app.health_url();
        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    info!(app = %app.id, url, "application is ready");
                    true
                } else {
                    warn!(app = %app.id, url, status = status.as_u16(), "application is not available");
                    false
                }
            }
            Err(e) => {
                warn!(app = %app.id, url, error = %e, "application not ready");
                false
            }
        }
    }
}

/// Polls a set of apps until all are ready.
#[derive(Debug, Clone)]
pub struct ReadinessPoller<P> {
    probe: P,
    poll_interval: Duration,
}

impl<P: HealthProbe> ReadinessPoller<P> {
    pub fn new(probe: P, poll_interval: Duration) -> Self {
        Self {
            probe,
            poll_interval,
        }
    }

    /// Single fresh probe of one app. Never fails; errors mean "not ready".
    pub async fn probe(&self, app: &AppDescriptor) -> bool {
        let ready = self.probe.probe(app).await;
        metrics::counter!(
            m::PROBES_TOTAL,
            m::LABEL_APP => app.id.as_str(),
            m::LABEL_RESULT => if ready { "ready" } else { "not_ready" }
        )
        .increment(1);
        ready
    }

    /// One pass over `apps`, stopping at the first app that is not ready.
    pub async fn all_ready(&self, apps: &[AppDescriptor]) -> bool {
        for app in apps {
            if !self.probe(app).await {
                debug!(app = %app.id, "pass stopped at first unready app");
                return false;
            }
        }
        true
    }

    /// Repeats [`all_ready`](Self::all_ready) until it succeeds or `timeout`
    /// elapses.
    ///
    /// Returns `Ok(true)` as soon as a pass succeeds and `Ok(false)` on
    /// timeout. A pass is cut short when it would overrun the timeout, so the
    /// call returns within `timeout` plus one poll interval. Cancelling
    /// `cancel` aborts the wait with [`ReadinessError::Interrupted`].
    pub async fn await_all_ready(
        &self,
        apps: &[AppDescriptor],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool, ReadinessError> {
        let started = Instant::now();

        loop {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                break;
            }

            let pass = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(interrupted(started)),
                pass = tokio::time::timeout(timeout - elapsed, self.all_ready(apps)) => pass,
            };
            match pass {
                Ok(true) => {
                    let elapsed = started.elapsed();
                    info!(
                        apps = apps.len(),
                        elapsed_secs = elapsed.as_secs(),
                        "all applications are ready"
                    );
                    metrics::histogram!(m::READINESS_WAIT_SECONDS).record(elapsed.as_secs_f64());
                    return Ok(true);
                }
                Ok(false) => {}
                // the pass itself used up the budget
                Err(_) => break,
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(interrupted(started)),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        error!(
            timeout_secs = timeout.as_secs(),
            "timeout reached, not all applications are ready"
        );
        metrics::histogram!(m::READINESS_WAIT_SECONDS).record(started.elapsed().as_secs_f64());
        Ok(false)
    }
}

fn interrupted(started: Instant) -> ReadinessError {
    let elapsed = started.elapsed();
    error!(elapsed_secs = elapsed.as_secs(), "readiness wait interrupted");
    ReadinessError::Interrupted { elapsed }
}
