//! `ozone-harness apps` command handler

use std::io::Write;

use serde::Serialize;

use ozone_harness_core::{AppDescriptor, AppRegistry};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

pub fn execute(registry: &AppRegistry, writer: &OutputWriter) -> Result<(), CliError> {
    writer.render(&build_report(registry))
}

pub fn build_report(registry: &AppRegistry) -> AppsReport {
    let mut apps: Vec<AppDescriptor> = registry.iter().cloned().collect();
    apps.sort_by_key(|app| app.priority);
    AppsReport { apps }
}

/// Catalogue listing, in launch order. Passwords are never serialized.
#[derive(Debug, Serialize)]
pub struct AppsReport {
    pub apps: Vec<AppDescriptor>,
}

impl Render for AppsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{:<10} {:<9} {:<28} Health path",
            "App", "Priority", "Base URL"
        )?;
        writeln!(w, "{}", "-".repeat(70))?;
        for app in &self.apps {
            writeln!(
                w,
                "{:<10} {:<9} {:<28} {}",
                app.id.as_str().bold(),
                app.priority,
                app.base_url,
                app.health_path
            )?;
            for file in &app.stack_files {
                writeln!(w, "{:<10} {}", "", file.dimmed())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;

    #[test]
    fn report_is_in_launch_order() {
        let report = build_report(&AppRegistry::builtin());
        let ids: Vec<&str> = report.apps.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["keycloak", "openmrs", "odoo"]);
    }

    #[test]
    fn json_never_contains_passwords() {
        let report = build_report(&AppRegistry::builtin());
        let mut buf = Vec::new();
        OutputWriter::new(OutputFormat::Json)
            .render_to(&report, &mut buf)
            .unwrap();
        let json = String::from_utf8(buf).unwrap();
        assert!(json.contains("\"username\""));
        assert!(!json.contains("password"));
        assert!(!json.contains("Admin123"));
    }
}
