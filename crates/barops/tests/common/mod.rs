//! In-memory fakes for the cloud provider and image builder.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use barops::image::ImageBuilder;
use barops::StackSettings;
use barops_cloud::{
    AccessBinding, CloudError, CloudProvider, Resource, ResourceKind, ResourceSpec, Revision,
    RevisionRequest, SecretPayload, SecretSummary,
};

#[derive(Default)]
pub struct CloudState {
    pub resources: BTreeMap<(ResourceKind, String), Resource>,
    pub bindings: BTreeMap<String, Vec<AccessBinding>>,
    pub creates: Vec<(ResourceKind, String)>,
    pub deploys: Vec<RevisionRequest>,
    pub revisions: BTreeMap<String, Revision>,
    pub secrets: Vec<SecretSummary>,
    pub payloads: BTreeMap<String, SecretPayload>,
    /// Container ids whose revision deploy fails.
    pub failing_deploys: BTreeSet<String>,
    /// Container names whose revision lookup fails.
    pub failing_revision_reads: BTreeSet<String>,
    /// Every call, in order, as `method:arg`.
    pub calls: Vec<String>,
    pub registry_auth: u32,
}

/// Cloud provider that keeps everything in memory.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

pub fn container_id(name: &str) -> String {
    format!("ctr-{name}")
}

pub fn container_url(name: &str) -> String {
    format!("https://{name}.containers.test")
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap()
    }

    /// Make the revision deploy of a container fail.
    pub fn fail_deploy_of(&self, container_name: &str) {
        self.state().failing_deploys.insert(container_id(container_name));
    }

    /// Store a revision as if it had been deployed earlier.
    pub fn with_revision(&self, container_name: &str, env: &[(&str, &str)]) {
        let id = container_id(container_name);
        let mut state = self.state();
        state.resources.insert(
            (ResourceKind::Container, container_name.to_string()),
            Resource {
                id: id.clone(),
                name: container_name.to_string(),
                url: Some(container_url(container_name)),
            },
        );
        state.revisions.insert(
            id.clone(),
            Revision {
                id: format!("rev-{container_name}"),
                container_id: id,
                image: "cr.yandex/crp/old:1".into(),
                environment: env
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                resources: None,
                created_at: None,
            },
        );
    }

    pub fn deploys_of(&self, container_name: &str) -> Vec<RevisionRequest> {
        let id = container_id(container_name);
        self.state()
            .deploys
            .iter()
            .filter(|d| d.container_id == id)
            .cloned()
            .collect()
    }

    pub fn calls_named(&self, method: &str) -> Vec<String> {
        let prefix = format!("{method}:");
        self.state()
            .calls
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(String::from))
            .collect()
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn find(&self, kind: ResourceKind, name: &str) -> Result<Option<Resource>, CloudError> {
        let mut state = self.state();
        state.calls.push(format!("find:{name}"));
        Ok(state.resources.get(&(kind, name.to_string())).cloned())
    }

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        _spec: &ResourceSpec,
    ) -> Result<Resource, CloudError> {
        let mut state = self.state();
        state.calls.push(format!("create:{name}"));
        let key = (kind, name.to_string());
        if state.resources.contains_key(&key) {
            return Err(CloudError::Command {
                command: format!("create {name}"),
                status: 1,
                stderr: "ALREADY_EXISTS".into(),
            });
        }
        let resource = match kind {
            ResourceKind::Container => Resource {
                id: container_id(name),
                name: name.to_string(),
                url: Some(container_url(name)),
            },
            ResourceKind::ServiceAccount => Resource {
                id: format!("aje-{name}"),
                name: name.to_string(),
                url: None,
            },
            _ => Resource {
                id: format!("crp-{name}"),
                name: name.to_string(),
                url: None,
            },
        };
        state.creates.push(key.clone());
        state.resources.insert(key, resource.clone());
        Ok(resource)
    }

    async fn list_bindings(
        &self,
        _kind: ResourceKind,
        id: &str,
    ) -> Result<Vec<AccessBinding>, CloudError> {
        Ok(self.state().bindings.get(id).cloned().unwrap_or_default())
    }

    async fn add_binding(
        &self,
        _kind: ResourceKind,
        id: &str,
        binding: &AccessBinding,
    ) -> Result<(), CloudError> {
        self.state()
            .bindings
            .entry(id.to_string())
            .or_default()
            .push(binding.clone());
        Ok(())
    }

    async fn deploy_revision(&self, req: &RevisionRequest) -> Result<Revision, CloudError> {
        let mut state = self.state();
        state.calls.push(format!("deploy_revision:{}", req.container_id));
        if state.failing_deploys.contains(&req.container_id) {
            return Err(CloudError::Command {
                command: "revision deploy".into(),
                status: 1,
                stderr: "quota exceeded".into(),
            });
        }
        state.deploys.push(req.clone());
        let revision = Revision {
            id: format!("rev-{}", state.deploys.len()),
            container_id: req.container_id.clone(),
            image: req.image.clone(),
            environment: req.environment.clone(),
            resources: Some(req.resources),
            created_at: None,
        };
        state
            .revisions
            .insert(req.container_id.clone(), revision.clone());
        Ok(revision)
    }

    async fn latest_revision(&self, container_name: &str) -> Result<Option<Revision>, CloudError> {
        let mut state = self.state();
        state.calls.push(format!("latest_revision:{container_name}"));
        if state.failing_revision_reads.contains(container_name) {
            return Err(CloudError::Command {
                command: "revision list".into(),
                status: 1,
                stderr: "PERMISSION_DENIED".into(),
            });
        }
        Ok(state.revisions.get(&container_id(container_name)).cloned())
    }

    async fn configure_registry_auth(&self) -> Result<(), CloudError> {
        self.state().registry_auth += 1;
        Ok(())
    }

    async fn list_secrets(&self) -> Result<Vec<SecretSummary>, CloudError> {
        let mut state = self.state();
        state.calls.push("list_secrets:".into());
        Ok(state.secrets.clone())
    }

    async fn secret_payload(
        &self,
        secret_id: &str,
        _version_id: Option<&str>,
    ) -> Result<SecretPayload, CloudError> {
        let mut state = self.state();
        state.calls.push(format!("secret_payload:{secret_id}"));
        state
            .payloads
            .get(secret_id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(secret_id.to_string()))
    }
}

/// Image builder that records what it was asked to do.
#[derive(Default)]
pub struct FakeImages {
    pub builds: Mutex<Vec<String>>,
    pub pushes: Mutex<Vec<String>>,
    /// Service whose build fails.
    pub failing_build: Option<String>,
}

#[async_trait]
impl ImageBuilder for FakeImages {
    async fn build(
        &self,
        _context: &Path,
        _dockerfile: &Path,
        image: &str,
        service: &str,
    ) -> Result<(), CloudError> {
        if self.failing_build.as_deref() == Some(service) {
            return Err(CloudError::Command {
                command: format!("docker build {image}"),
                status: 1,
                stderr: "COPY failed".into(),
            });
        }
        self.builds.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn push(&self, image: &str) -> Result<(), CloudError> {
        self.pushes.lock().unwrap().push(image.to_string());
        Ok(())
    }
}

/// Settings pinned to a folder, with a bot token.
pub fn settings() -> StackSettings {
    let mut settings = StackSettings::with_defaults();
    settings.folder_id = Some("b1gfolder".into());
    settings
        .passthrough
        .insert("TELEGRAM_TOKEN".into(), "TEST".into());
    settings
        .passthrough
        .insert("WEBHOOK_SECRET_TOKEN".into(), "hook-secret".into());
    settings
}
