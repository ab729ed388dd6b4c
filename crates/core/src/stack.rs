//! Stack file selection.
//!
//! The external tool merges stack definition files in list order, later files
//! overriding earlier ones. Shared infrastructure therefore loads first,
//! followed by each app's files from the most foundational (lowest priority
//! value) to the most dependent.

use std::fmt;

use serde::Serialize;

use crate::app::{AppDescriptor, COMMON_STACK_FILES};

/// Ordered, duplicate-free list of stack definition file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StackFileList(Vec<String>);

impl StackFileList {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Contents of the control file: one name per line, newline terminated.
    pub fn to_control_file(&self) -> String {
        let mut out = String::new();
        for name in &self.0 {
            out.push_str(name);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for StackFileList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Selects stack files for `apps` using the built-in common file list.
pub fn select(apps: &[AppDescriptor]) -> StackFileList {
    select_with_common(COMMON_STACK_FILES, apps)
}

/// Selects stack files for `apps` after the given common files.
///
/// Apps are ordered by ascending priority with a stable sort, so apps with
/// equal priority keep their request order. A file already in the list is
/// not repeated.
pub fn select_with_common<S: AsRef<str>>(common: &[S], apps: &[AppDescriptor]) -> StackFileList {
    let mut ordered: Vec<&AppDescriptor> = apps.iter().collect();
    ordered.sort_by_key(|app| app.priority);

    let mut files: Vec<String> = Vec::new();
    let names = common
        .iter()
        .map(|f| f.as_ref())
        .chain(ordered.iter().flat_map(|app| app.stack_files.iter().map(String::as_str)));
    for name in names {
        if !files.iter().any(|existing| existing == name) {
            files.push(name.to_owned());
        }
    }
    StackFileList(files)
}
