//! `yc` CLI client implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::models::{YcAccessBinding, YcPayload, YcResource, YcRevision, YcSecret};
use crate::command;
use crate::providers::traits::{
    AccessBinding, CloudError, CloudProvider, Resource, ResourceKind, ResourceSpec, Revision,
    RevisionRequest, SecretPayload, SecretSummary,
};

/// Yandex Cloud provider backed by the `yc` CLI.
#[derive(Debug, Clone)]
pub struct YandexCloud {
    /// Path or name of the `yc` binary.
    binary: PathBuf,
    /// Folder every command is scoped to. Falls back to the CLI profile.
    folder_id: Option<String>,
}

impl YandexCloud {
    /// Create a provider using `yc` from `PATH`.
    #[must_use]
    pub fn new(folder_id: Option<String>) -> Self {
        Self {
            binary: PathBuf::from("yc"),
            folder_id: folder_id.filter(|f| !f.is_empty()),
        }
    }

    /// Override the `yc` binary location.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Folder the provider is scoped to, if any.
    #[must_use]
    pub fn folder_id(&self) -> Option<&str> {
        self.folder_id.as_deref()
    }

    /// CLI command group for a resource kind.
    fn group(kind: ResourceKind) -> &'static [&'static str] {
        match kind {
            ResourceKind::ServiceAccount => &["iam", "service-account"],
            ResourceKind::Registry => &["container", "registry"],
            ResourceKind::Container => &["serverless", "container"],
            ResourceKind::Secret => &["lockbox", "secret"],
            ResourceKind::Folder => &["resource-manager", "folder"],
        }
    }

    /// Build a `yc` command with folder scoping applied.
    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        if let Some(folder) = &self.folder_id {
            cmd.arg("--folder-id").arg(folder);
        }
        cmd
    }

    /// Run a command and parse its JSON output.
    async fn run_json<T: DeserializeOwned>(&self, mut cmd: Command) -> Result<T, CloudError> {
        cmd.args(["--format", "json"]);
        let stdout = command::run(cmd).await?;
        serde_json::from_slice(&stdout).map_err(|e| {
            warn!(error = %e, body = %String::from_utf8_lossy(&stdout), "Failed to parse yc output");
            CloudError::Serialization(e)
        })
    }

    /// Like [`Self::run_json`] but treats empty output as an empty list.
    async fn run_json_list<T: DeserializeOwned>(
        &self,
        mut cmd: Command,
    ) -> Result<Vec<T>, CloudError> {
        cmd.args(["--format", "json"]);
        let stdout = command::run(cmd).await?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&stdout)?)
    }

    /// Command that streams a container's logs until killed.
    #[must_use]
    pub fn logs_command(&self, container_id: &str) -> Command {
        self.command([
            "logging",
            "read",
            "--resource-ids",
            container_id,
            "--follow",
        ])
    }
}

#[async_trait]
impl CloudProvider for YandexCloud {
    async fn find(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<Resource>, CloudError> {
        if !kind.is_creatable() {
            return Err(CloudError::Config(format!(
                "lookup by name is not supported for {kind}"
            )));
        }

        let mut args: Vec<&str> = Self::group(kind).to_vec();
        args.push("list");
        let items: Vec<YcResource> = self.run_json_list(self.command(args)).await?;

        let found = items.into_iter().find(|r| r.name == name).map(Resource::from);
        debug!(%kind, resource = name, found = found.is_some(), "Resource lookup");
        Ok(found)
    }

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &ResourceSpec,
    ) -> Result<Resource, CloudError> {
        if !kind.is_creatable() {
            return Err(CloudError::Config(format!("{kind} cannot be created")));
        }

        let mut args: Vec<String> = Self::group(kind).iter().map(ToString::to_string).collect();
        args.extend(["create".into(), "--name".into(), name.into()]);
        if let Some(description) = &spec.description {
            args.extend(["--description".into(), description.clone()]);
        }
        if !spec.labels.is_empty() {
            let labels = spec
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            args.extend(["--labels".into(), labels]);
        }

        info!(%kind, resource = name, "Creating resource");
        let created: YcResource = self.run_json(self.command(args)).await?;
        Ok(created.into())
    }

    async fn list_bindings(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Vec<AccessBinding>, CloudError> {
        let mut args: Vec<&str> = Self::group(kind).to_vec();
        args.extend(["list-access-bindings", "--id", id]);
        let raw: Vec<YcAccessBinding> = self.run_json_list(self.command(args)).await?;
        Ok(raw
            .into_iter()
            .filter_map(YcAccessBinding::into_binding)
            .collect())
    }

    async fn add_binding(
        &self,
        kind: ResourceKind,
        id: &str,
        binding: &AccessBinding,
    ) -> Result<(), CloudError> {
        let subject = binding.subject.to_string();
        let mut args: Vec<&str> = Self::group(kind).to_vec();
        args.extend([
            "add-access-binding",
            "--id",
            id,
            "--role",
            binding.role.as_str(),
            "--subject",
            subject.as_str(),
        ]);

        info!(%kind, id, role = %binding.role, subject = %subject, "Adding access binding");
        command::run(self.command(args)).await?;
        Ok(())
    }

    async fn deploy_revision(&self, req: &RevisionRequest) -> Result<Revision, CloudError> {
        let res = &req.resources;
        let mut args: Vec<String> = vec![
            "serverless".into(),
            "container".into(),
            "revision".into(),
            "deploy".into(),
            "--container-id".into(),
            req.container_id.clone(),
            "--image".into(),
            req.image.clone(),
            "--cores".into(),
            res.cores.to_string(),
            "--core-fraction".into(),
            res.core_fraction.to_string(),
            "--memory".into(),
            format!("{}MB", res.memory_mb),
            "--concurrency".into(),
            res.concurrency.to_string(),
            "--execution-timeout".into(),
            format!("{}s", res.timeout_secs),
        ];
        if let Some(sa) = &req.service_account_id {
            args.extend(["--service-account-id".into(), sa.clone()]);
        }
        for (key, value) in &req.environment {
            args.extend(["--environment".into(), format!("{key}={value}")]);
        }

        info!(container_id = %req.container_id, image = %req.image, "Deploying revision");
        let revision: YcRevision = self.run_json(self.command(args)).await?;
        Ok(revision.into())
    }

    async fn latest_revision(
        &self,
        container_name: &str,
    ) -> Result<Option<Revision>, CloudError> {
        let cmd = self.command([
            "serverless",
            "container",
            "revision",
            "list",
            "--container-name",
            container_name,
        ]);
        let revisions: Vec<YcRevision> = self.run_json_list(cmd).await?;
        Ok(revisions
            .into_iter()
            .max_by_key(|r| r.created_at)
            .map(Revision::from))
    }

    async fn configure_registry_auth(&self) -> Result<(), CloudError> {
        // configure-docker rejects --folder-id, so build the command by hand.
        let mut cmd = Command::new(&self.binary);
        cmd.args(["container", "registry", "configure-docker"]);
        command::run(cmd).await?;
        Ok(())
    }

    async fn list_secrets(&self) -> Result<Vec<SecretSummary>, CloudError> {
        let secrets: Vec<YcSecret> = self
            .run_json_list(self.command(["lockbox", "secret", "list"]))
            .await?;
        Ok(secrets.into_iter().map(SecretSummary::from).collect())
    }

    async fn secret_payload(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
    ) -> Result<SecretPayload, CloudError> {
        let mut args = vec!["lockbox", "payload", "get", "--id", secret_id];
        if let Some(version) = version_id {
            args.extend(["--version-id", version]);
        }
        let payload: YcPayload = self.run_json(self.command(args)).await?;
        Ok(payload.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_scopes_folder() {
        let yc = YandexCloud::new(Some("b1gfolder".into()));
        let cmd = yc.command(["serverless", "container", "list"]);
        assert_eq!(
            command::describe(&cmd),
            "yc serverless container list --folder-id b1gfolder"
        );
    }

    #[test]
    fn test_empty_folder_is_ignored() {
        let yc = YandexCloud::new(Some(String::new()));
        assert!(yc.folder_id().is_none());
    }

    #[test]
    fn test_logs_command_follows_container() {
        let yc = YandexCloud::new(None).with_binary("/opt/yc/bin/yc");
        let cmd = yc.logs_command("bba0");
        assert_eq!(
            command::describe(&cmd),
            "/opt/yc/bin/yc logging read --resource-ids bba0 --follow"
        );
    }

    #[tokio::test]
    async fn test_secret_lookup_by_name_is_rejected() {
        let yc = YandexCloud::new(None);
        let err = yc.find(ResourceKind::Secret, "app").await.unwrap_err();
        assert!(matches!(err, CloudError::Config(_)));
    }
}
