//! Container image build and push.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use barops_cloud::{command, CloudError};
use tokio::process::Command;
use tracing::info;

/// Label attached to every image and container started from it.
pub const SERVICE_LABEL: &str = "barops.service";

/// Builds and pushes service images.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build `image` from a context directory and Dockerfile.
    async fn build(
        &self,
        context: &Path,
        dockerfile: &Path,
        image: &str,
        service: &str,
    ) -> Result<(), CloudError>;

    /// Push a built image to its registry.
    async fn push(&self, image: &str) -> Result<(), CloudError>;
}

/// [`ImageBuilder`] backed by the local `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("docker"),
        }
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn build_command(&self, context: &Path, dockerfile: &Path, image: &str, service: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("build")
            .arg("--label")
            .arg(format!("{SERVICE_LABEL}={service}"))
            .arg("-t")
            .arg(image)
            .arg("-f")
            .arg(dockerfile)
            .arg(context);
        cmd
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build(
        &self,
        context: &Path,
        dockerfile: &Path,
        image: &str,
        service: &str,
    ) -> Result<(), CloudError> {
        info!("Building {image}");
        command::run(self.build_command(context, dockerfile, image, service)).await?;
        Ok(())
    }

    async fn push(&self, image: &str) -> Result<(), CloudError> {
        info!("Pushing {image}");
        let mut cmd = Command::new(&self.binary);
        cmd.arg("push").arg(image);
        command::run(cmd).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_labels_service() {
        let docker = DockerCli::new();
        let cmd = docker.build_command(
            Path::new("."),
            Path::new("services/rag/Dockerfile"),
            "cr.yandex/crp1/rag:1",
            "rag",
        );
        assert_eq!(
            command::describe(&cmd),
            "docker build --label barops.service=rag -t cr.yandex/crp1/rag:1 -f services/rag/Dockerfile ."
        );
    }

    #[tokio::test]
    async fn test_missing_docker_is_spawn_error() {
        let docker = DockerCli::new().with_binary("/nonexistent/docker-barops");
        let err = docker.push("cr.yandex/crp1/rag:1").await.unwrap_err();
        assert!(matches!(err, CloudError::Spawn { .. }));
    }
}
