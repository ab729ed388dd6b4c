//! Readiness probe seam.
//!
//! The runner ships an HTTP implementation; tests substitute scripted probes.

use std::future::Future;

use crate::app::AppDescriptor;

/// Single readiness check against one application.
///
/// Implementations never fail: any transport error or unexpected status is
/// reported as `false`. Every call must perform a fresh check.
pub trait HealthProbe: Send + Sync {
    /// Returns `true` iff the app's health endpoint reports success.
    fn probe(&self, app: &AppDescriptor) -> impl Future<Output = bool> + Send;
}
