//! Error types -- per-domain error definitions
//!
//! [`HarnessError`] is the top-level error returned by every fallible harness
//! operation. Each domain has its own enum so callers can match on the exact
//! failure class:
//!
//! - [`ConfigError`]: always fatal, never retried (bad request or bad tree)
//! - [`WorkspaceError`]: fatal for create/copy, only logged for cleanup
//! - [`ScriptError`]: lifecycle script did not exit 0 in time
//! - [`ReadinessError`]: the readiness wait was interrupted

use std::path::PathBuf;
use std::time::Duration;

/// Top-level harness error.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Workspace I/O error
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Lifecycle script error
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    /// Readiness wait error
    #[error("readiness error: {0}")]
    Readiness(#[from] ReadinessError),

    /// Generic I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
///
/// These describe a request or a project tree the harness cannot work with.
/// The caller has to fix the input; retrying does not help.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Config file could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A config value is out of range
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// The requested application id is not in the catalogue
    #[error("unknown app '{0}'")]
    UnknownApp(String),

    /// No ancestor of the start directory carries the manifest marker
    #[error("could not find project root containing '{marker}' above {start}")]
    ProjectRootNotFound { marker: String, start: PathBuf },

    /// The stack template tree is missing
    #[error("stack template directory does not exist: {}", path.display())]
    TemplateNotFound { path: PathBuf },

    /// The scripts directory is missing from the workspace stack tree
    #[error("scripts directory not found at: {}", path.display())]
    ScriptsDirNotFound { path: PathBuf },

    /// The environment override file is missing
    #[error("environment file not found at: {}", path.display())]
    EnvFileNotFound { path: PathBuf },
}

/// Workspace I/O errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Creating a directory failed
    #[error("failed to create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Removing a stale tree failed before it could be recreated
    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Copying a template entry failed
    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Marking a script executable failed
    #[error("failed to set permissions on {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a control or environment file failed
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lifecycle script errors.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The process could not be started at all
    #[error("failed to spawn script '{script}': {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// The script ran past its deadline and was killed
    #[error("script '{script}' timed out after {}s", timeout.as_secs())]
    Timeout { script: String, timeout: Duration },

    /// The script exited with a non-zero code
    #[error("script '{script}' failed with exit code {code}: {stderr}")]
    Failed {
        script: String,
        code: i32,
        stderr: String,
    },

    /// The script was terminated by a signal
    #[error("script '{script}' was terminated by a signal: {stderr}")]
    Killed { script: String, stderr: String },

    /// Waiting on the child process failed
    #[error("failed to wait for script '{script}': {source}")]
    Wait {
        script: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptError {
    /// Exit code of a failed script, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the script was killed for running past its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Readiness wait errors.
///
/// A readiness *timeout* is not an error: the wait reports it as `false`.
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    /// The wait was interrupted before the timeout elapsed
    #[error("readiness wait interrupted after {}s", elapsed.as_secs())]
    Interrupted { elapsed: Duration },

    /// The HTTP client used for probing could not be built
    #[error("failed to build health probe client: {reason}")]
    Client { reason: String },
}
