//! Stack configuration.
//!
//! Settings come from three layers: built-in defaults, an optional
//! `barops.toml` overrides file, and operator environment variables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variables forwarded to services without inspection.
pub const PASSTHROUGH_VARS: &[&str] = &[
    "FOLDER_ID",
    "SECRET_VERSION_ID",
    "S3_BUCKET",
    "S3_PREFIX",
    "S3_ENDPOINT",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "WEBHOOK_SECRET_TOKEN",
    "TELEGRAM_TOKEN",
];

/// Path on the gateway the message platform delivers updates to.
pub const WEBHOOK_PATH: &str = "/telegram/webhook";

/// Per-service overrides loaded from the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceOverride {
    pub cores: Option<u32>,
    pub core_fraction: Option<u32>,
    pub memory_mb: Option<u32>,
    pub concurrency: Option<u32>,
    pub timeout_secs: Option<u32>,
    pub public: Option<bool>,
    /// Extra literal environment variables.
    pub env: BTreeMap<String, String>,
}

/// On-disk shape of `barops.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    name_prefix: Option<String>,
    folder_id: Option<String>,
    registry_name: Option<String>,
    registry_id: Option<String>,
    service_account_name: Option<String>,
    build_root: Option<PathBuf>,
    image_host: Option<String>,
    services: BTreeMap<String, ServiceOverride>,
}

/// Full stack configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSettings {
    /// Prefix for every cloud resource name (e.g. `bartender-gateway`).
    pub name_prefix: String,
    /// Folder the stack lives in. `None` uses the `yc` profile default.
    pub folder_id: Option<String>,
    /// Registry name used when no registry id is given.
    pub registry_name: String,
    /// Pinned registry id, skips lookup by name.
    pub registry_id: Option<String>,
    /// Service account every container runs as.
    pub service_account_name: String,
    /// Root that build contexts are relative to.
    pub build_root: PathBuf,
    /// Registry host images are pushed to.
    pub image_host: String,
    /// Opaque pass-through values keyed by variable name.
    pub passthrough: BTreeMap<String, String>,
    /// Per-service overrides.
    pub overrides: BTreeMap<String, ServiceOverride>,
}

impl StackSettings {
    /// Settings with built-in defaults and no pass-through values.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            name_prefix: "bartender".into(),
            folder_id: None,
            registry_name: "bartender-registry".into(),
            registry_id: None,
            service_account_name: "bartender-runner".into(),
            build_root: PathBuf::from("."),
            image_host: "cr.yandex".into(),
            passthrough: BTreeMap::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Defaults, then the optional overrides file, then the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the overrides file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::with_defaults();
        if let Some(path) = path {
            settings.apply_file(path)?;
        }
        settings.apply_env(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Merge a TOML overrides file into these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if let Some(v) = file.name_prefix {
            self.name_prefix = v;
        }
        if let Some(v) = file.folder_id {
            self.folder_id = Some(v);
        }
        if let Some(v) = file.registry_name {
            self.registry_name = v;
        }
        if let Some(v) = file.registry_id {
            self.registry_id = Some(v);
        }
        if let Some(v) = file.service_account_name {
            self.service_account_name = v;
        }
        if let Some(v) = file.build_root {
            self.build_root = v;
        }
        if let Some(v) = file.image_host {
            self.image_host = v;
        }
        self.overrides.extend(file.services);
        Ok(())
    }

    /// Apply environment values through a lookup function.
    ///
    /// `FOLDER_ID` and `REGISTRY_ID` win over the file; pass-through values are
    /// copied verbatim.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(folder) = non_empty("FOLDER_ID") {
            self.folder_id = Some(folder);
        }
        if let Some(registry) = non_empty("REGISTRY_ID") {
            self.registry_id = Some(registry);
        }
        for name in PASSTHROUGH_VARS {
            if let Some(value) = non_empty(name) {
                self.passthrough.insert((*name).to_string(), value);
            }
        }
        if let Some(folder) = &self.folder_id {
            self.passthrough
                .entry("FOLDER_ID".into())
                .or_insert_with(|| folder.clone());
        }
    }

    /// Cloud resource name of a service's container.
    #[must_use]
    pub fn container_name(&self, service: &str) -> String {
        format!("{}-{service}", self.name_prefix)
    }

    /// Fully qualified image reference for a service.
    #[must_use]
    pub fn image_ref(&self, registry_id: &str, service: &str, tag: &str) -> String {
        format!("{}/{registry_id}/{service}:{tag}", self.image_host)
    }

    /// Value of a pass-through variable, if the operator provided it.
    #[must_use]
    pub fn passthrough(&self, name: &str) -> Option<&str> {
        self.passthrough.get(name).map(String::as_str)
    }
}

impl Default for StackSettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Default image tag: UTC timestamp `YYYYMMDDHHMMSS`.
#[must_use]
pub fn default_image_tag() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}
