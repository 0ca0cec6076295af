use anyhow::{Context, Result};
use barops_cloud::command;
use clap::Args;
use tokio::process::Command;

use crate::image::SERVICE_LABEL;
use crate::ui;
use crate::validator::PrerequisitesValidator;

/// Stop local containers started from barops-built images
#[derive(Args)]
pub struct StopCommand {}

impl StopCommand {
    pub async fn run(&self) -> Result<()> {
        PrerequisitesValidator::docker_only().validate()?;

        let mut list = Command::new("docker");
        list.args(["ps", "-q", "--filter"])
            .arg(format!("label={SERVICE_LABEL}"));
        let stdout = command::run(list)
            .await
            .context("Failed to list local containers")?;
        let ids = container_ids(&String::from_utf8_lossy(&stdout));

        if ids.is_empty() {
            ui::print_info("No local barops containers are running");
            return Ok(());
        }

        ui::print_step(&format!("Stopping {} containers", ids.len()));
        let mut stop = Command::new("docker");
        stop.arg("stop").args(&ids);
        command::run(stop)
            .await
            .context("Failed to stop local containers")?;
        ui::print_success("Local containers stopped");
        Ok(())
    }
}

fn container_ids(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
