//! `ozone-harness files` command handler

use std::io::Write;

use serde::Serialize;

use ozone_harness_core::{AppId, AppRegistry, StackFileList, select};

use crate::cli::AppsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

pub fn execute(
    args: &AppsArgs,
    registry: &AppRegistry,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    writer.render(&build_report(&args.apps, registry))
}

pub fn build_report(ids: &[AppId], registry: &AppRegistry) -> FilesReport {
    let apps = registry.descriptors_for(ids);
    FilesReport {
        apps: apps.iter().map(|app| app.id).collect(),
        files: select(&apps),
    }
}

#[derive(Debug, Serialize)]
pub struct FilesReport {
    pub apps: Vec<AppId>,
    pub files: StackFileList,
}

impl Render for FilesReport {
    // same format as the control file
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        w.write_all(self.files.to_control_file().as_bytes())
    }
}
