//! Cloud provider trait and common types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during cloud provider operations.
#[derive(Error, Debug)]
pub enum CloudError {
    /// The CLI binary could not be started at all.
    #[error("Failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The CLI ran but exited unsuccessfully.
    #[error("`{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

// ============================================================================
// Resources and access bindings
// ============================================================================

/// Kinds of cloud resources the deploy tooling resolves or grants on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// IAM service account the containers run as.
    ServiceAccount,
    /// Container registry holding the service images.
    Registry,
    /// Serverless container (one per service).
    Container,
    /// Lockbox secret. Grant target only.
    Secret,
    /// Resource folder. Grant target only.
    Folder,
}

impl ResourceKind {
    /// Whether the tooling is allowed to create this kind when it is missing.
    #[must_use]
    pub fn is_creatable(self) -> bool {
        matches!(self, Self::ServiceAccount | Self::Registry | Self::Container)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceAccount => write!(f, "service account"),
            Self::Registry => write!(f, "registry"),
            Self::Container => write!(f, "container"),
            Self::Secret => write!(f, "secret"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// A resolved cloud resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Provider-assigned identifier.
    pub id: String,
    /// Resource name (unique within the folder).
    pub name: String,
    /// Public invoke URL. Only serverless containers have one.
    pub url: Option<String>,
}

/// Parameters used when a resource has to be created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Human readable description.
    pub description: Option<String>,
    /// Labels attached to the resource.
    pub labels: BTreeMap<String, String>,
}

/// Identity an access binding is granted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// A service account by id.
    ServiceAccount(String),
    /// Anyone, including unauthenticated callers.
    AllUsers,
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceAccount(id) => write!(f, "serviceAccount:{id}"),
            Self::AllUsers => write!(f, "system:allUsers"),
        }
    }
}

/// A role held by a subject on some resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessBinding {
    /// Role id, e.g. `serverless.containers.invoker`.
    pub role: String,
    /// Who holds the role.
    pub subject: Subject,
}

// ============================================================================
// Serverless container revisions
// ============================================================================

/// Resource sizing of a container revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionResources {
    /// Number of vCPU cores.
    pub cores: u32,
    /// Guaranteed share of each core, in percent.
    pub core_fraction: u32,
    /// Memory in megabytes.
    pub memory_mb: u32,
    /// Maximum concurrent requests per instance.
    pub concurrency: u32,
    /// Request execution timeout in seconds.
    pub timeout_secs: u32,
}

/// Request to deploy a new revision of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRequest {
    /// Target container id.
    pub container_id: String,
    /// Fully qualified image reference.
    pub image: String,
    /// Sizing of the revision.
    pub resources: RevisionResources,
    /// Service account the revision runs as.
    pub service_account_id: Option<String>,
    /// Fully rendered environment.
    pub environment: BTreeMap<String, String>,
}

/// A deployed container revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    /// Revision id.
    pub id: String,
    /// Container the revision belongs to.
    pub container_id: String,
    /// Image the revision runs.
    pub image: String,
    /// Rendered environment of the revision.
    pub environment: BTreeMap<String, String>,
    /// Sizing, when the provider reports it.
    pub resources: Option<RevisionResources>,
    /// When the revision was created.
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Secrets
// ============================================================================

/// A secret visible to the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSummary {
    /// Secret id.
    pub id: String,
    /// Secret name.
    pub name: String,
}

/// One entry of a secret payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    /// Entry key.
    pub key: String,
    /// Text value. Binary-only entries have none.
    pub value: Option<String>,
}

/// Payload of one secret version, entries in provider order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretPayload {
    /// Version the payload was read from.
    pub version_id: Option<String>,
    /// Entries in the order the provider returned them.
    pub entries: Vec<SecretEntry>,
}

impl SecretPayload {
    /// Render text entries as `key=value` lines, preserving entry order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry
                    .value
                    .as_ref()
                    .map(|value| format!("{}={value}", entry.key))
            })
            .collect()
    }
}

/// Trait for cloud providers.
///
/// Every method re-queries the provider; implementations keep no cache so a
/// run always acts on current remote state.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    // ========================================================================
    // Resources
    // ========================================================================

    /// Look up a resource by name. `Ok(None)` when it does not exist.
    async fn find(&self, kind: ResourceKind, name: &str)
        -> Result<Option<Resource>, CloudError>;

    /// Create a resource. Callers check [`ResourceKind::is_creatable`] first.
    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<Resource, CloudError>;

    /// List the access bindings held on a resource.
    async fn list_bindings(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Vec<AccessBinding>, CloudError>;

    /// Add an access binding to a resource.
    async fn add_binding(
        &self,
        kind: ResourceKind,
        id: &str,
        binding: &AccessBinding,
    ) -> Result<(), CloudError>;

    // ========================================================================
    // Container revisions
    // ========================================================================

    /// Deploy a new revision and return it.
    async fn deploy_revision(&self, req: &RevisionRequest) -> Result<Revision, CloudError>;

    /// Most recently created revision of the named container, if any.
    async fn latest_revision(&self, container_name: &str)
        -> Result<Option<Revision>, CloudError>;

    /// Configure local docker credentials for the registry.
    async fn configure_registry_auth(&self) -> Result<(), CloudError>;

    // ========================================================================
    // Secrets
    // ========================================================================

    /// List every secret owned by the account.
    async fn list_secrets(&self) -> Result<Vec<SecretSummary>, CloudError>;

    /// Fetch a secret payload, optionally pinned to a version.
    async fn secret_payload(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
    ) -> Result<SecretPayload, CloudError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_display() {
        assert_eq!(
            Subject::ServiceAccount("aje123".into()).to_string(),
            "serviceAccount:aje123"
        );
        assert_eq!(Subject::AllUsers.to_string(), "system:allUsers");
    }

    #[test]
    fn test_payload_lines_skip_binary_entries() {
        let payload = SecretPayload {
            version_id: Some("v1".into()),
            entries: vec![
                SecretEntry {
                    key: "TELEGRAM_TOKEN".into(),
                    value: Some("123:abc".into()),
                },
                SecretEntry {
                    key: "CERT".into(),
                    value: None,
                },
                SecretEntry {
                    key: "FOLDER_ID".into(),
                    value: Some("b1g".into()),
                },
            ],
        };

        assert_eq!(
            payload.lines(),
            vec!["TELEGRAM_TOKEN=123:abc", "FOLDER_ID=b1g"]
        );
    }

    #[test]
    fn test_only_identity_and_compute_are_creatable() {
        assert!(ResourceKind::ServiceAccount.is_creatable());
        assert!(ResourceKind::Registry.is_creatable());
        assert!(ResourceKind::Container.is_creatable());
        assert!(!ResourceKind::Secret.is_creatable());
        assert!(!ResourceKind::Folder.is_creatable());
    }
}
