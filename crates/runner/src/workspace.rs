//! Workspace directory management
//!
//! A workspace is a disposable directory under the project root that holds
//! a live copy of the stack template tree:
//!
//! ```text
//! <project root>/
//!   target/ozone/                       template tree (build output)
//!   target/ozone-test-workspace/        workspace root
//!     ozone/                            stack tree, recreated on every start
//!       run/docker/scripts/*.sh
//! ```
//!
//! Filesystem work is synchronous and runs on the blocking pool.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use ozone_harness_core::error::{ConfigError, HarnessError, WorkspaceError};
use ozone_harness_core::metrics as m;

/// Finds the project root by walking upward from `start`.
///
/// The root is the outermost directory of the first contiguous run of
/// ancestors that contain `marker`, so a nested module inside a multi-module
/// project resolves to the top-level project.
pub fn find_project_root(start: &Path, marker: &str) -> Result<PathBuf, ConfigError> {
    let mut found: Option<&Path> = None;
    for dir in start.ancestors() {
        if dir.join(marker).exists() {
            found = Some(dir);
        } else if found.is_some() {
            break;
        }
    }

    match found {
        Some(root) => {
            debug!(root = %root.display(), marker, "found project root");
            Ok(root.to_path_buf())
        }
        None => Err(ConfigError::ProjectRootNotFound {
            marker: marker.to_owned(),
            start: start.to_path_buf(),
        }),
    }
}

/// Number of entries copied by [`WorkspaceManager::refresh_stack_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub scripts: usize,
}

impl std::ops::AddAssign for CopyStats {
    fn add_assign(&mut self, rhs: Self) {
        self.files += rhs.files;
        self.scripts += rhs.scripts;
    }
}

/// Owns one workspace directory and the stack tree inside it.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    stack_dir: PathBuf,
    script_extension: String,
}

impl WorkspaceManager {
    /// `root` is the workspace directory; the stack tree lives in
    /// `root/stack_dir_name`.
    pub fn new(
        root: impl Into<PathBuf>,
        stack_dir_name: &str,
        script_extension: impl Into<String>,
    ) -> Self {
        let root = root.into();
        let stack_dir = root.join(stack_dir_name);
        Self {
            root,
            stack_dir,
            script_extension: script_extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stack_dir(&self) -> &Path {
        &self.stack_dir
    }

    /// Deletes any existing workspace and creates an empty one.
    ///
    /// Safe to call when no workspace exists.
    pub async fn prepare(&self) -> Result<&Path, HarnessError> {
        let root = self.root.clone();
        blocking(move || recreate_dir(&root)).await??;

        metrics::counter!(m::WORKSPACE_PREPARATIONS_TOTAL).increment(1);
        info!(path = %self.root.display(), "workspace prepared");
        Ok(&self.root)
    }

    /// Replaces the stack tree with a fresh copy of `source`.
    ///
    /// Files ending in the script extension are marked executable. A missing
    /// `source` is a configuration error.
    pub async fn refresh_stack_tree(&self, source: &Path) -> Result<CopyStats, HarnessError> {
        if !tokio::fs::try_exists(source).await? {
            return Err(ConfigError::TemplateNotFound {
                path: source.to_path_buf(),
            }
            .into());
        }

        info!(
            from = %source.display(),
            to = %self.stack_dir.display(),
            "copying fresh stack tree into workspace"
        );

        let from = source.to_path_buf();
        let to = self.stack_dir.clone();
        let extension = self.script_extension.clone();
        let stats = blocking(move || {
            recreate_dir(&to)?;
            copy_tree(&from, &to, &extension)
        })
        .await??;

        debug!(
            files = stats.files,
            scripts = stats.scripts,
            "stack tree copied"
        );
        Ok(stats)
    }

    /// Deletes the whole workspace, best-effort.
    ///
    /// Entries that cannot be removed are logged and counted, never returned
    /// as errors. Returns the number of entries left behind.
    pub async fn destroy(&self) -> usize {
        let root = self.root.clone();
        match tokio::task::spawn_blocking(move || remove_tree_best_effort(&root)).await {
            Ok(failures) => failures,
            Err(e) => {
                warn!(error = %e, "workspace cleanup task failed");
                1
            }
        }
    }

    /// Synchronous [`destroy`](Self::destroy) for use outside async code.
    pub fn destroy_blocking(&self) -> usize {
        remove_tree_best_effort(&self.root)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, HarnessError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HarnessError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))
}

/// Removes `path` if present and creates it again with its parents.
fn recreate_dir(path: &Path) -> Result<(), WorkspaceError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(WorkspaceError::Remove {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    std::fs::create_dir_all(path).map_err(|source| WorkspaceError::Create {
        path: path.to_path_buf(),
        source,
    })
}

/// Copies `source` into the existing directory `target`.
fn copy_tree(source: &Path, target: &Path, extension: &str) -> Result<CopyStats, WorkspaceError> {
    let mut ancestors = Vec::new();
    copy_dir(source, target, extension, &mut ancestors)
}

/// `ancestors` holds the canonical paths of the directories being copied
/// above `source`. A symlink back into one of them is skipped.
fn copy_dir(
    source: &Path,
    target: &Path,
    extension: &str,
    ancestors: &mut Vec<PathBuf>,
) -> Result<CopyStats, WorkspaceError> {
    let copy_err = |from: &Path, to: &Path, source: std::io::Error| WorkspaceError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let canonical = std::fs::canonicalize(source).map_err(|e| copy_err(source, target, e))?;
    if ancestors.contains(&canonical) {
        warn!(path = %source.display(), "skipping symlink loop in stack template");
        return Ok(CopyStats::default());
    }
    ancestors.push(canonical);

    let mut stats = CopyStats::default();
    let entries = std::fs::read_dir(source).map_err(|e| copy_err(source, target, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| copy_err(source, target, e))?;
        let from = entry.path();
        let to = target.join(entry.file_name());

        // follows symlinks, a linked directory is copied as a directory
        let metadata = std::fs::metadata(&from).map_err(|e| copy_err(&from, &to, e))?;
        if metadata.is_dir() {
            std::fs::create_dir_all(&to).map_err(|source| WorkspaceError::Create {
                path: to.clone(),
                source,
            })?;
            stats += copy_dir(&from, &to, extension, ancestors)?;
            continue;
        }

        std::fs::copy(&from, &to).map_err(|e| copy_err(&from, &to, e))?;
        stats.files += 1;
        if is_script(&to, extension) {
            make_executable(&to)?;
            stats.scripts += 1;
        }
    }

    ancestors.pop();
    Ok(stats)
}

fn is_script(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), WorkspaceError> {
    use std::os::unix::fs::PermissionsExt;

    let perm_err = |source| WorkspaceError::Permissions {
        path: path.to_path_buf(),
        source,
    };
    let mut perms = std::fs::metadata(path).map_err(perm_err)?.permissions();
    let mode = perms.mode();
    // execute wherever read is granted
    perms.set_mode(mode | ((mode & 0o444) >> 2));
    std::fs::set_permissions(path, perms).map_err(perm_err)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), WorkspaceError> {
    Ok(())
}

/// Removes `path` recursively without failing.
///
/// Tries a plain recursive remove first. If that fails, walks the tree and
/// removes what it can so a single locked file does not keep the rest
/// around. Returns the number of entries that could not be removed.
pub(crate) fn remove_tree_best_effort(path: &Path) -> usize {
    match std::fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to inspect workspace");
            return 1;
        }
    }

    if std::fs::remove_dir_all(path).is_ok() {
        info!(path = %path.display(), "workspace deleted");
        return 0;
    }

    let failures = remove_entries(path);
    if failures > 0 {
        metrics::counter!(m::WORKSPACE_CLEANUP_FAILURES_TOTAL).increment(failures as u64);
        warn!(
            path = %path.display(),
            failures,
            "workspace only partially deleted"
        );
    }
    failures
}

fn remove_entries(path: &Path) -> usize {
    let is_dir = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta.is_dir(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to inspect entry");
            return 1;
        }
    };

    if !is_dir {
        return match std::fs::remove_file(path) {
            Ok(()) => 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to delete file");
                1
            }
        };
    }

    let mut failures = 0;
    match std::fs::read_dir(path) {
        Ok(entries) => {
            for entry in entries {
                match entry {
                    Ok(entry) => failures += remove_entries(&entry.path()),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to read directory entry");
                        failures += 1;
                    }
                }
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to list directory");
            failures += 1;
        }
    }

    match std::fs::remove_dir(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to delete directory");
            failures += 1;
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn project_root_is_outermost_of_first_run() {
        let tmp = tempfile::tempdir().unwrap();
        // tmp/outer/Cargo.toml, tmp/outer/module/Cargo.toml, tmp/outer/module/src
        let outer = tmp.path().join("outer");
        let module = outer.join("module");
        let src = module.join("src");
        std::fs::create_dir_all(&src).unwrap();
        write(&outer.join("Cargo.toml"), "");
        write(&module.join("Cargo.toml"), "");

        let root = find_project_root(&src, "Cargo.toml").unwrap();
        assert_eq!(root, outer);
    }

    #[test]
    fn project_root_stops_at_first_gap() {
        let tmp = tempfile::tempdir().unwrap();
        // marker at tmp/a and tmp/a/b/c but not tmp/a/b
        let a = tmp.path().join("a");
        let c = a.join("b").join("c");
        std::fs::create_dir_all(&c).unwrap();
        write(&a.join("pom.xml"), "");
        write(&c.join("pom.xml"), "");

        let root = find_project_root(&c, "pom.xml").unwrap();
        assert_eq!(root, c);
    }

    #[test]
    fn project_root_missing_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = find_project_root(tmp.path(), "no-such-marker.xyz").unwrap_err();
        assert!(matches!(err, ConfigError::ProjectRootNotFound { .. }));
    }

    #[tokio::test]
    async fn prepare_then_destroy_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("target").join("ws");
        let ws = WorkspaceManager::new(&root, "ozone", "sh");

        ws.prepare().await.unwrap();
        assert!(root.is_dir());

        assert_eq!(ws.destroy().await, 0);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn prepare_clears_stale_content() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ws");
        write(&root.join("stale").join("old.txt"), "old");

        let ws = WorkspaceManager::new(&root, "ozone", "sh");
        ws.prepare().await.unwrap();

        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn refresh_copies_tree_and_marks_scripts() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("template");
        write(&template.join("run/docker/scripts/start.sh"), "#!/bin/sh\n");
        write(&template.join("run/docker/.env"), "A=1\n");
        write(&template.join("README.md"), "readme");

        let ws = WorkspaceManager::new(tmp.path().join("ws"), "ozone", "sh");
        ws.prepare().await.unwrap();
        let stats = ws.refresh_stack_tree(&template).await.unwrap();

        assert_eq!(stats, CopyStats { files: 3, scripts: 1 });
        let script = ws.stack_dir().join("run/docker/scripts/start.sh");
        assert!(script.is_file());
        assert_eq!(
            std::fs::read_to_string(ws.stack_dir().join("run/docker/.env")).unwrap(),
            "A=1\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&script).unwrap().permissions().mode();
            assert_ne!(mode & 0o100, 0, "owner execute bit set");
            let readme = std::fs::metadata(ws.stack_dir().join("README.md")).unwrap();
            assert_eq!(readme.permissions().mode() & 0o111, 0);
        }
    }

    #[tokio::test]
    async fn refresh_replaces_previous_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("template");
        write(&template.join("a.txt"), "a");

        let ws = WorkspaceManager::new(tmp.path().join("ws"), "ozone", "sh");
        ws.prepare().await.unwrap();
        ws.refresh_stack_tree(&template).await.unwrap();
        write(&ws.stack_dir().join("leftover.txt"), "x");

        ws.refresh_stack_tree(&template).await.unwrap();
        assert!(!ws.stack_dir().join("leftover.txt").exists());
        assert!(ws.stack_dir().join("a.txt").exists());
    }

    #[tokio::test]
    async fn refresh_with_missing_template_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(tmp.path().join("ws"), "ozone", "sh");
        let err = ws
            .refresh_stack_tree(&tmp.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::TemplateNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn refresh_with_unreadable_template_path_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("plain-file");
        write(&file, "not a directory");

        let ws = WorkspaceManager::new(tmp.path().join("ws"), "ozone", "sh");
        ws.prepare().await.unwrap();
        // lookup through a regular file fails with ENOTDIR, not NotFound
        let err = ws.refresh_stack_tree(&file.join("template")).await.unwrap_err();
        assert!(matches!(err, HarnessError::Io(_)), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn refresh_skips_symlink_loops() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("template");
        write(&template.join("run/docker/scripts/start.sh"), "#!/bin/sh\n");
        std::os::unix::fs::symlink(&template, template.join("run/loop")).unwrap();
        std::os::unix::fs::symlink("..", template.join("run/docker/up")).unwrap();

        let ws = WorkspaceManager::new(tmp.path().join("ws"), "ozone", "sh");
        ws.prepare().await.unwrap();
        let stats = ws.refresh_stack_tree(&template).await.unwrap();

        assert_eq!(stats, CopyStats { files: 1, scripts: 1 });
        assert!(ws.stack_dir().join("run/docker/scripts/start.sh").is_file());
        assert!(ws.stack_dir().join("run/loop").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn refresh_follows_linked_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = tmp.path().join("shared");
        write(&shared.join("common.yml"), "services: {}\n");
        let template = tmp.path().join("template");
        std::fs::create_dir_all(&template).unwrap();
        std::os::unix::fs::symlink(&shared, template.join("compose")).unwrap();

        let ws = WorkspaceManager::new(tmp.path().join("ws"), "ozone", "sh");
        ws.prepare().await.unwrap();
        ws.refresh_stack_tree(&template).await.unwrap();

        assert!(ws.stack_dir().join("compose/common.yml").is_file());
    }

    #[test]
    fn destroy_of_missing_workspace_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(tmp.path().join("never"), "ozone", "sh");
        assert_eq!(ws.destroy_blocking(), 0);
    }

    #[test]
    fn script_extension_match_is_exact() {
        assert!(is_script(Path::new("start.sh"), "sh"));
        assert!(!is_script(Path::new("start.shx"), "sh"));
        assert!(!is_script(Path::new("sh"), "sh"));
    }
}
