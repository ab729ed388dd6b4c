//! Environment override file editing
//!
//! The stack tree carries a line-oriented `KEY=VALUE` file read by the
//! external tool. Overrides replace the first line starting with `KEY=` in
//! place and append keys that are not present. Everything else (comments,
//! blank lines, unrelated keys) is kept as is.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use ozone_harness_core::error::{ConfigError, HarnessError, WorkspaceError};

/// Applies `vars` to the environment file at `path`.
///
/// The file must already exist; a missing file is a configuration error.
pub async fn override_environment(
    path: &Path,
    vars: &BTreeMap<String, String>,
) -> Result<(), HarnessError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::EnvFileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        Err(e) => return Err(e.into()),
    };

    let updated = apply_overrides(&content, vars);
    tokio::fs::write(path, updated)
        .await
        .map_err(|source| WorkspaceError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    // values may be secrets, only keys are logged
    info!(
        path = %path.display(),
        keys = ?vars.keys().collect::<Vec<_>>(),
        "updated environment file"
    );
    Ok(())
}

/// Returns `content` with `vars` applied, newline terminated.
pub fn apply_overrides(content: &str, vars: &BTreeMap<String, String>) -> String {
    let mut lines: Vec<String> = content.lines().map(str::to_owned).collect();

    for (key, value) in vars {
        let prefix = format!("{key}=");
        let line = format!("{key}={value}");
        match lines.iter_mut().find(|existing| existing.starts_with(&prefix)) {
            Some(existing) => *existing = line,
            None => lines.push(line),
        }
    }

    let mut out = String::with_capacity(content.len() + 64);
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}
