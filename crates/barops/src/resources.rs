//! Get-or-create for cloud resources and access bindings.

use barops_cloud::{
    AccessBinding, CloudError, CloudProvider, Resource, ResourceKind, ResourceSpec, Subject,
};
use tracing::{debug, info};

use crate::config::StackSettings;
use crate::error::OpsError;

/// Pulls images from the registry.
pub const ROLE_IMAGE_PULLER: &str = "container-registry.images.puller";
/// Reads secret payloads.
pub const ROLE_PAYLOAD_VIEWER: &str = "lockbox.payloadViewer";
/// Invokes a serverless container.
pub const ROLE_INVOKER: &str = "serverless.containers.invoker";

/// Identity and registry shared by every service in the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackIdentity {
    pub service_account: Resource,
    pub registry_id: String,
}

/// Resolves resources by name and creates them when absent.
pub struct ResourceResolver<'a> {
    cloud: &'a dyn CloudProvider,
}

impl<'a> ResourceResolver<'a> {
    #[must_use]
    pub fn new(cloud: &'a dyn CloudProvider) -> Self {
        Self { cloud }
    }

    /// Find a resource by name, creating it when it does not exist.
    ///
    /// Calling this again with the same name returns the same resource and
    /// creates nothing.
    ///
    /// # Errors
    ///
    /// Returns [`OpsError::ResourceResolution`] when lookup or creation fails,
    /// or when the resource is absent and cannot be created by this tool.
    pub async fn ensure(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<Resource, OpsError> {
        let wrap = |source: CloudError| OpsError::ResourceResolution {
            kind,
            name: name.to_string(),
            source,
        };

        if let Some(existing) = self.cloud.find(kind, name).await.map_err(wrap)? {
            debug!("Found {kind} '{name}' ({})", existing.id);
            return Ok(existing);
        }
        if !kind.is_creatable() {
            return Err(wrap(CloudError::NotFound(name.to_string())));
        }

        info!("Creating {kind} '{name}'");
        self.cloud.create(kind, name, spec).await.map_err(wrap)
    }

    /// Ensure `subject` holds `role` on a resource. Existing bindings are left
    /// untouched, so repeated calls add nothing.
    ///
    /// # Errors
    ///
    /// Returns [`OpsError::Grant`] when bindings cannot be listed or added.
    pub async fn grant(
        &self,
        subject: &Subject,
        role: &str,
        kind: ResourceKind,
        target: &str,
    ) -> Result<bool, OpsError> {
        let wrap = |source: CloudError| OpsError::Grant {
            role: role.to_string(),
            subject: subject.clone(),
            kind,
            target: target.to_string(),
            source,
        };

        let held = self
            .cloud
            .list_bindings(kind, target)
            .await
            .map_err(wrap)?
            .iter()
            .any(|b| b.role == role && &b.subject == subject);
        if held {
            debug!("{subject} already holds {role} on {kind} {target}");
            return Ok(false);
        }

        info!("Granting {role} to {subject} on {kind} {target}");
        let binding = AccessBinding {
            role: role.to_string(),
            subject: subject.clone(),
        };
        self.cloud
            .add_binding(kind, target, &binding)
            .await
            .map_err(wrap)?;
        Ok(true)
    }

    /// Registry id: pinned id first, then lookup by name, then creation.
    ///
    /// # Errors
    ///
    /// Returns [`OpsError::ResourceResolution`] when the registry cannot be
    /// found or created.
    pub async fn registry_id(&self, settings: &StackSettings) -> Result<String, OpsError> {
        if let Some(id) = settings.registry_id.as_deref().filter(|id| !id.is_empty()) {
            debug!("Using pinned registry {id}");
            return Ok(id.to_string());
        }
        let registry = self
            .ensure(
                ResourceKind::Registry,
                &settings.registry_name,
                &ResourceSpec::default(),
            )
            .await?;
        Ok(registry.id)
    }

    /// Service account, registry and the grants every container relies on.
    ///
    /// The account can pull images from the folder and read the payload of
    /// `secret_id`. The folder grant is skipped when no folder is configured.
    ///
    /// # Errors
    ///
    /// Returns the first resolution or grant failure.
    pub async fn provision_identity(
        &self,
        settings: &StackSettings,
        secret_id: &str,
    ) -> Result<StackIdentity, OpsError> {
        let spec = ResourceSpec {
            description: Some("Runs the bartender serverless containers".into()),
            ..ResourceSpec::default()
        };
        let service_account = self
            .ensure(
                ResourceKind::ServiceAccount,
                &settings.service_account_name,
                &spec,
            )
            .await?;
        let registry_id = self.registry_id(settings).await?;

        let subject = Subject::ServiceAccount(service_account.id.clone());
        if let Some(folder) = settings.folder_id.as_deref() {
            self.grant(&subject, ROLE_IMAGE_PULLER, ResourceKind::Folder, folder)
                .await?;
        }
        self.grant(&subject, ROLE_PAYLOAD_VIEWER, ResourceKind::Secret, secret_id)
            .await?;

        Ok(StackIdentity {
            service_account,
            registry_id,
        })
    }
}
