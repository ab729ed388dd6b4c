//! CLI error types
//!
//! [`CliError::exit_code`] maps every failure to a process exit code:
//!
//! | code | meaning |
//! |------|---------|
//! | 2    | configuration error |
//! | 3    | lifecycle script failed or timed out |
//! | 4    | apps not ready before the readiness timeout |
//! | 10   | I/O error |
//! | 1    | anything else |

use ozone_harness_core::error::HarnessError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Harness(#[from] HarnessError),

    #[error("apps not ready: {}", apps.join(", "))]
    NotReady { apps: Vec<String> },

    #[error("interrupted before the stack was ready")]
    Interrupted,

    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Command(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Harness(e) => match e {
                HarnessError::Config(_) => 2,
                HarnessError::Script(_) => 3,
                HarnessError::Workspace(_) | HarnessError::Io(_) => 10,
                HarnessError::Readiness(_) => 1,
            },
            Self::NotReady { .. } => 4,
            Self::Io(_) => 10,
            Self::Interrupted | Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        Self::Command(format!("{e:#}"))
    }
}

impl From<ozone_harness_core::error::ConfigError> for CliError {
    fn from(e: ozone_harness_core::error::ConfigError) -> Self {
        Self::Harness(e.into())
    }
}

impl From<ozone_harness_core::error::ReadinessError> for CliError {
    fn from(e: ozone_harness_core::error::ReadinessError) -> Self {
        Self::Harness(e.into())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ozone_harness_core::error::{ConfigError, ScriptError, WorkspaceError};

    use super::*;

    #[test]
    fn config_errors_exit_2() {
        let err: CliError = ConfigError::UnknownApp("mysql".to_owned()).into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn script_errors_exit_3() {
        let timeout: CliError = HarnessError::from(ScriptError::Timeout {
            script: "start.sh".to_owned(),
            timeout: Duration::from_secs(300),
        })
        .into();
        assert_eq!(timeout.exit_code(), 3);

        let failed: CliError = HarnessError::from(ScriptError::Failed {
            script: "start.sh".to_owned(),
            code: 2,
            stderr: String::new(),
        })
        .into();
        assert_eq!(failed.exit_code(), 3);
    }

    #[test]
    fn not_ready_exits_4() {
        let err = CliError::NotReady {
            apps: vec!["odoo".to_owned(), "openmrs".to_owned()],
        };
        assert_eq!(err.exit_code(), 4);
        assert_eq!(err.to_string(), "apps not ready: odoo, openmrs");
    }

    #[test]
    fn io_errors_exit_10() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(CliError::Io(io).exit_code(), 10);

        let ws: CliError = HarnessError::from(WorkspaceError::Create {
            path: "/ws".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
        .into();
        assert_eq!(ws.exit_code(), 10);
    }

    #[test]
    fn everything_else_exits_1() {
        assert_eq!(CliError::Interrupted.exit_code(), 1);
        assert_eq!(CliError::Command("x".to_owned()).exit_code(), 1);
        let anyhow_err: CliError = anyhow::anyhow!("subscriber already set").into();
        assert_eq!(anyhow_err.exit_code(), 1);
    }
}
