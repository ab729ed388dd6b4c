//! Application catalogue -- the apps a test stack can be built from
//!
//! The catalogue is a plain immutable table. [`AppRegistry`] turns it into
//! [`AppDescriptor`]s (optionally with per-app URL overrides from config) and
//! resolves requested ids. Readiness checks live behind the
//! [`HealthProbe`](crate::probe::HealthProbe) trait so the data can be used
//! and tested without any network access.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::AppOverride;
use crate::error::ConfigError;
use crate::probe::HealthProbe;

/// Stack definition files every stack starts with, in load order.
pub const COMMON_STACK_FILES: &[&str] = &["docker-compose-common.yml"];

/// Identifier of a known application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppId {
    Openmrs,
    Odoo,
    Keycloak,
}

impl AppId {
    /// All ids in catalogue declaration order.
    pub const ALL: [AppId; 3] = [AppId::Openmrs, AppId::Odoo, AppId::Keycloak];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openmrs => "openmrs",
            Self::Odoo => "odoo",
            Self::Keycloak => "keycloak",
        }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownApp(wanted.to_owned()))
    }
}

/// Username/password pair used by downstream REST clients.
///
/// The harness only stores these. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything the harness knows about one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDescriptor {
    pub id: AppId,
    pub base_url: String,
    pub credentials: Credentials,
    pub health_path: String,
    /// Launch priority, lower starts first.
    pub priority: u32,
    /// Stack definition files specific to this app, in load order.
    pub stack_files: Vec<String>,
}

impl AppDescriptor {
    /// Full URL of the health endpoint.
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_path)
    }
}

struct CatalogueEntry {
    id: AppId,
    base_url: &'static str,
    username: &'static str,
    password: &'static str,
    health_path: &'static str,
    priority: u32,
    stack_files: &'static [&'static str],
}

const CATALOGUE: &[CatalogueEntry] = &[
    CatalogueEntry {
        id: AppId::Openmrs,
        base_url: "http://localhost/openmrs",
        username: "admin",
        password: "Admin123",
        health_path: "/health/started",
        priority: 3,
        stack_files: &["docker-compose-openmrs.yml", "docker-compose-openmrs-sso.yml"],
    },
    CatalogueEntry {
        id: AppId::Odoo,
        base_url: "http://localhost:8069",
        username: "admin",
        password: "admin",
        health_path: "/",
        priority: 4,
        stack_files: &["docker-compose-odoo.yml", "docker-compose-odoo-sso.yml"],
    },
    CatalogueEntry {
        id: AppId::Keycloak,
        base_url: "http://localhost:8084",
        username: "admin",
        password: "password",
        health_path: "/health",
        priority: 2,
        stack_files: &["docker-compose-keycloak.yml"],
    },
];

impl CatalogueEntry {
    fn to_descriptor(&self) -> AppDescriptor {
        AppDescriptor {
            id: self.id,
            base_url: self.base_url.to_owned(),
            credentials: Credentials::new(self.username, self.password),
            health_path: self.health_path.to_owned(),
            priority: self.priority,
            stack_files: self.stack_files.iter().map(|f| (*f).to_owned()).collect(),
        }
    }
}

/// Resolved application catalogue.
#[derive(Debug, Clone)]
pub struct AppRegistry {
    apps: Vec<AppDescriptor>,
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AppRegistry {
    /// The built-in catalogue without overrides.
    pub fn builtin() -> Self {
        Self {
            apps: CATALOGUE.iter().map(CatalogueEntry::to_descriptor).collect(),
        }
    }

    /// The built-in catalogue with per-app URL overrides applied.
    ///
    /// Override keys are app ids; an unknown key is a configuration error.
    pub fn with_overrides(overrides: &BTreeMap<String, AppOverride>) -> Result<Self, ConfigError> {
        let mut registry = Self::builtin();
        for (key, over) in overrides {
            let id: AppId = key.parse()?;
            let app = registry.get_mut(id);
            if let Some(base_url) = &over.base_url {
                app.base_url = base_url.trim_end_matches('/').to_owned();
            }
            if let Some(health_path) = &over.health_path {
                app.health_path = health_path.clone();
            }
        }
        Ok(registry)
    }

    pub fn get(&self, id: AppId) -> &AppDescriptor {
        // Every AppId has exactly one catalogue entry.
        self.apps
            .iter()
            .find(|app| app.id == id)
            .unwrap_or_else(|| unreachable!("catalogue entry missing for {id}"))
    }

    fn get_mut(&mut self, id: AppId) -> &mut AppDescriptor {
        self.apps
            .iter_mut()
            .find(|app| app.id == id)
            .unwrap_or_else(|| unreachable!("catalogue entry missing for {id}"))
    }

    /// Descriptors for `ids`, in request order, each at most once.
    pub fn descriptors_for(&self, ids: &[AppId]) -> Vec<AppDescriptor> {
        let mut out: Vec<AppDescriptor> = Vec::with_capacity(ids.len());
        for id in ids {
            if !out.iter().any(|app| app.id == *id) {
                out.push(self.get(*id).clone());
            }
        }
        out
    }

    /// Parses app names and returns their descriptors.
    ///
    /// Fails on the first name that is not in the catalogue.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<AppDescriptor>, ConfigError> {
        let ids = names
            .iter()
            .map(|name| name.as_ref().parse::<AppId>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.descriptors_for(&ids))
    }

    /// Single readiness probe for one app.
    pub async fn is_healthy<P: HealthProbe>(&self, probe: &P, id: AppId) -> bool {
        probe.probe(self.get(id)).await
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppDescriptor> {
        self.apps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_case_insensitively() {
        assert_eq!("openmrs".parse::<AppId>().unwrap(), AppId::Openmrs);
        assert_eq!("ODOO".parse::<AppId>().unwrap(), AppId::Odoo);
        assert_eq!(" Keycloak ".parse::<AppId>().unwrap(), AppId::Keycloak);
    }

    #[test]
    fn unknown_id_is_config_error() {
        let err = "mysql".parse::<AppId>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownApp(ref name) if name == "mysql"));
    }

    #[test]
    fn catalogue_priorities_are_distinct() {
        let registry = AppRegistry::builtin();
        let mut priorities: Vec<u32> = registry.iter().map(|a| a.priority).collect();
        priorities.sort_unstable();
        priorities.dedup();
        assert_eq!(priorities.len(), AppId::ALL.len());
    }

    #[test]
    fn every_id_has_a_descriptor() {
        let registry = AppRegistry::builtin();
        for id in AppId::ALL {
            assert_eq!(registry.get(id).id, id);
        }
    }

    #[test]
    fn openmrs_descriptor_matches_catalogue() {
        let registry = AppRegistry::builtin();
        let openmrs = registry.get(AppId::Openmrs);
        assert_eq!(openmrs.health_url(), "http://localhost/openmrs/health/started");
        assert_eq!(openmrs.priority, 3);
        assert_eq!(openmrs.credentials.username, "admin");
        assert_eq!(openmrs.stack_files.len(), 2);
    }

    #[test]
    fn descriptors_for_keeps_request_order_and_dedups() {
        let registry = AppRegistry::builtin();
        let apps = registry.descriptors_for(&[AppId::Odoo, AppId::Openmrs, AppId::Odoo]);
        let ids: Vec<AppId> = apps.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![AppId::Odoo, AppId::Openmrs]);
    }

    #[test]
    fn resolve_rejects_unknown_name() {
        let registry = AppRegistry::builtin();
        let err = registry.resolve(&["openmrs", "nope"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownApp(_)));
    }

    #[test]
    fn overrides_replace_url_and_health_path() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "odoo".to_owned(),
            AppOverride {
                base_url: Some("http://127.0.0.1:18069/".to_owned()),
                health_path: Some("/web/health".to_owned()),
            },
        );
        let registry = AppRegistry::with_overrides(&overrides).unwrap();
        assert_eq!(
            registry.get(AppId::Odoo).health_url(),
            "http://127.0.0.1:18069/web/health"
        );
        // untouched entries keep catalogue values
        assert_eq!(registry.get(AppId::Keycloak).base_url, "http://localhost:8084");
    }

    #[test]
    fn overrides_with_unknown_key_fail() {
        let mut overrides = BTreeMap::new();
        overrides.insert("postgres".to_owned(), AppOverride::default());
        assert!(AppRegistry::with_overrides(&overrides).is_err());
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("admin", "Admin123");
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("Admin123"));
    }
}
