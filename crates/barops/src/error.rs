//! Fatal error taxonomy and process exit codes.
//!
//! Non-fatal failures (health checks, webhook resync) never become an
//! [`OpsError`]; they are collected into reports instead.

use barops_cloud::{CloudError, ResourceKind, Subject};
use thiserror::Error;

/// Stage of a single service deploy, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    /// `docker build`.
    Build,
    /// `docker push`.
    Push,
    /// Container get-or-create.
    Resource,
    /// Revision deploy call.
    Revision,
    /// Public invoker grant.
    Invoke,
}

impl DeployStage {
    /// Exit code reported when this stage is the first fatal failure.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Build => 10,
            Self::Push => 11,
            Self::Resource => 12,
            Self::Revision => 13,
            Self::Invoke => 14,
        }
    }
}

impl std::fmt::Display for DeployStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => write!(f, "image build"),
            Self::Push => write!(f, "image push"),
            Self::Resource => write!(f, "container resolution"),
            Self::Revision => write!(f, "revision deploy"),
            Self::Invoke => write!(f, "public invoke grant"),
        }
    }
}

/// Errors that stop a run.
#[derive(Debug, Error)]
pub enum OpsError {
    /// A required external tool is not installed.
    #[error("Required tool(s) missing: {}", .0.join(", "))]
    ToolMissing(Vec<String>),

    /// An identity or registry resource could not be resolved or created.
    #[error("Could not resolve {kind} '{name}': {source}")]
    ResourceResolution {
        kind: ResourceKind,
        name: String,
        #[source]
        source: CloudError,
    },

    /// An access binding could not be granted.
    #[error("Could not grant {role} to {subject} on {kind} {target}: {source}")]
    Grant {
        role: String,
        subject: Subject,
        kind: ResourceKind,
        target: String,
        #[source]
        source: CloudError,
    },

    /// No secret id found through any fallback.
    #[error("Secret id could not be resolved (pass --secret-id or set SECRET_ID)")]
    SecretUnresolved,

    /// The secret payload could not be fetched.
    #[error("Failed to fetch payload of secret {secret_id}: {source}")]
    SecretFetch {
        secret_id: String,
        #[source]
        source: CloudError,
    },

    /// A dangerous operation was declined or could not be confirmed.
    #[error("{0}")]
    NotConfirmed(String),

    /// A service deploy failed; later services were not attempted.
    #[error("Deploy of '{service}' failed during {stage}: {message}")]
    Deploy {
        service: String,
        stage: DeployStage,
        message: String,
    },

    /// The service graph or its overrides are invalid.
    #[error("Invalid service graph: {0}")]
    Graph(String),
}

impl OpsError {
    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ToolMissing(_) => 1,
            Self::NotConfirmed(_) => 2,
            Self::SecretUnresolved => 3,
            Self::SecretFetch { .. } => 4,
            Self::ResourceResolution { .. } | Self::Grant { .. } => {
                DeployStage::Resource.exit_code()
            }
            Self::Deploy { stage, .. } => stage.exit_code(),
            Self::Graph(_) => GENERIC_FAILURE,
        }
    }
}

/// Exit code for failures outside the taxonomy (bad config, I/O, ...).
pub const GENERIC_FAILURE: u8 = 5;

/// Pick the exit code for an error returned by a command.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<OpsError>()
        .map_or(GENERIC_FAILURE, OpsError::exit_code)
}
