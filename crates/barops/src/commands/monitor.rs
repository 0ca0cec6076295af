use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use barops_cloud::{CloudProvider, YandexCloud};
use clap::Args;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use tracing::warn;

use crate::commands::{discover, follow_logs, load_stack};
use crate::config::StackSettings;
use crate::graph::ServiceGraph;
use crate::health::HealthVerifier;
use crate::ui;
use crate::validator::PrerequisitesValidator;

/// Show liveness and resource usage of every service
#[derive(Args)]
pub struct MonitorCommand {
    /// Follow logs without asking
    #[arg(long)]
    logs: bool,

    /// Overrides file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl MonitorCommand {
    pub async fn run(&self) -> Result<()> {
        PrerequisitesValidator::new(false).validate()?;
        let (settings, graph) = load_stack(self.config.as_deref())?;
        let cloud = YandexCloud::new(settings.folder_id.clone());

        ui::print_section("Service status");
        let discovered = discover(&cloud, &graph, &settings).await;
        let report = HealthVerifier::new().verify(&discovered.targets, false).await;
        report.print();

        ui::print_section("Resources");
        print_resources(&cloud, &graph, &settings).await;

        let follow = self.logs
            || (std::io::stdin().is_terminal()
                && Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Follow live logs?")
                    .default(false)
                    .interact()
                    .unwrap_or(false));
        if follow {
            follow_logs(cloud, &discovered).await;
        }
        Ok(())
    }
}

async fn print_resources(cloud: &dyn CloudProvider, graph: &ServiceGraph, settings: &StackSettings) {
    println!(
        "  {:<12} {:>6} {:>9} {:>8} {:>12} {:>8}",
        "SERVICE".bold(),
        "CORES".bold(),
        "FRACTION".bold(),
        "MEMORY".bold(),
        "CONCURRENCY".bold(),
        "TIMEOUT".bold()
    );
    for svc in graph.services() {
        let revision = match cloud.latest_revision(&settings.container_name(&svc.name)).await {
            Ok(revision) => revision,
            Err(e) => {
                warn!("Could not read revision of {}: {e}", svc.name);
                None
            }
        };
        match revision.and_then(|r| r.resources) {
            Some(r) => println!(
                "  {:<12} {:>6} {:>8}% {:>6}MB {:>12} {:>7}s",
                svc.name.cyan(),
                r.cores,
                r.core_fraction,
                r.memory_mb,
                r.concurrency,
                r.timeout_secs
            ),
            None => println!("  {:<12} {}", svc.name.cyan(), "not deployed".bright_black()),
        }
    }
}
