//! Secret id discovery strategies.

use async_trait::async_trait;
use barops_cloud::CloudProvider;
use tracing::debug;

/// Revision environment keys that carry the secret id.
pub const SECRET_ID_KEYS: &[&str] = &["SECRET_ID", "LOCKBOX_SECRET_ID"];

/// One step of the secret id fallback chain.
#[async_trait]
pub trait SecretIdStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Try to find a secret id. `None` hands over to the next strategy.
    async fn resolve(&self, cloud: &dyn CloudProvider) -> Option<String>;
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Value passed on the command line.
#[derive(Debug, Clone)]
pub struct Explicit(pub Option<String>);

#[async_trait]
impl SecretIdStrategy for Explicit {
    fn name(&self) -> &'static str {
        "argument"
    }

    async fn resolve(&self, _cloud: &dyn CloudProvider) -> Option<String> {
        non_empty(self.0.as_deref())
    }
}

/// Value of an environment variable.
#[derive(Debug, Clone)]
pub struct EnvVar {
    pub name: String,
    pub value: Option<String>,
}

impl EnvVar {
    /// Snapshot a variable from the process environment.
    #[must_use]
    pub fn read(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: std::env::var(name).ok(),
        }
    }
}

#[async_trait]
impl SecretIdStrategy for EnvVar {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn resolve(&self, _cloud: &dyn CloudProvider) -> Option<String> {
        non_empty(self.value.as_deref())
    }
}

/// Reads the secret id from the latest revision of each container, in order.
#[derive(Debug, Clone)]
pub struct FromDeployedRevisions {
    pub containers: Vec<String>,
}

#[async_trait]
impl SecretIdStrategy for FromDeployedRevisions {
    fn name(&self) -> &'static str {
        "deployed revisions"
    }

    async fn resolve(&self, cloud: &dyn CloudProvider) -> Option<String> {
        for container in &self.containers {
            let revision = match cloud.latest_revision(container).await {
                Ok(Some(revision)) => revision,
                Ok(None) => {
                    debug!("{container} has no revision");
                    continue;
                }
                Err(e) => {
                    debug!("Skipping {container}: {e}");
                    continue;
                }
            };
            let found = SECRET_ID_KEYS
                .iter()
                .find_map(|key| non_empty(revision.environment.get(*key).map(String::as_str)));
            if found.is_some() {
                debug!("Secret id found in {container} revision {}", revision.id);
                return found;
            }
        }
        None
    }
}

/// First secret owned by the account.
#[derive(Debug, Clone, Copy)]
pub struct FromSecretList;

#[async_trait]
impl SecretIdStrategy for FromSecretList {
    fn name(&self) -> &'static str {
        "secret list"
    }

    async fn resolve(&self, cloud: &dyn CloudProvider) -> Option<String> {
        match cloud.list_secrets().await {
            Ok(secrets) => secrets.into_iter().find_map(|s| non_empty(Some(s.id.as_str()))),
            Err(e) => {
                debug!("Could not list secrets: {e}");
                None
            }
        }
    }
}
