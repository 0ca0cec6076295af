use std::path::PathBuf;

use anyhow::Result;
use barops_cloud::YandexCloud;
use clap::Args;

use crate::commands::{load_stack, reconcile_webhook};
use crate::config::default_image_tag;
use crate::graph::ServiceRole;
use crate::health::{HealthVerifier, ServiceTarget};
use crate::image::DockerCli;
use crate::orchestrator::{DeployOptions, DeploymentOrchestrator};
use crate::secrets::{EnvVar, Explicit, SecretResolver};
use crate::ui;
use crate::validator::PrerequisitesValidator;

/// Provision or update the whole stack
#[derive(Args)]
pub struct DeployCommand {
    /// Secret store id (falls back to SECRET_ID, deployed revisions, then the secret list)
    #[arg(long, value_name = "ID")]
    secret_id: Option<String>,

    /// Print the plan and rendered environments without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Build and push images only
    #[arg(long, conflicts_with = "dry_run")]
    build_only: bool,

    /// Deploy only these services (comma separated)
    #[arg(long, value_name = "SERVICES", value_delimiter = ',')]
    only: Vec<String>,

    /// Image tag (defaults to a UTC timestamp)
    #[arg(long)]
    tag: Option<String>,

    /// Registry id (skips lookup by name)
    #[arg(long, env = "REGISTRY_ID", value_name = "ID")]
    registry_id: Option<String>,

    /// Overrides file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip the liveness pass and webhook reconciliation after deploying
    #[arg(long)]
    skip_verify: bool,
}

impl DeployCommand {
    pub async fn run(&self) -> Result<()> {
        ui::print_section("Deploying bartender stack");

        if !self.dry_run {
            ui::print_step("Checking prerequisites");
            PrerequisitesValidator::new(true).validate()?;
        }

        let (mut settings, graph) = load_stack(self.config.as_deref())?;
        if let Some(id) = self.registry_id.as_deref().filter(|id| !id.is_empty()) {
            settings.registry_id = Some(id.to_string());
        }
        let cloud = YandexCloud::new(settings.folder_id.clone());
        let docker = DockerCli::new();

        let secret_id = if self.build_only {
            String::new()
        } else if self.dry_run {
            SecretResolver::new(vec![
                Box::new(Explicit(self.secret_id.clone())),
                Box::new(EnvVar::read("SECRET_ID")),
            ])
            .resolve(&cloud)
            .await
            .unwrap_or_default()
        } else {
            ui::print_step("Resolving secret id");
            SecretResolver::standard(self.secret_id.clone(), &settings, &graph)
                .require(&cloud)
                .await?
        };

        let options = DeployOptions {
            dry_run: self.dry_run,
            build_only: self.build_only,
            only: (!self.only.is_empty()).then(|| self.only.clone()),
            tag: self.tag.clone().unwrap_or_else(default_image_tag),
        };
        ui::print_info(&format!("Image tag: {}", options.tag));

        let ledger = DeploymentOrchestrator::new(&cloud, &docker, &graph, &settings, options)
            .run(&secret_id)
            .await?;

        if self.dry_run || self.build_only || self.skip_verify {
            return Ok(());
        }

        ui::print_section("Verifying deployed services");
        let targets: Vec<ServiceTarget> = ServiceTarget::from_ledger(&graph, &ledger)
            .into_iter()
            .filter(|t| ledger.get(&t.name).is_some_and(|s| s.deploy_count > 0))
            .collect();
        let mut report = HealthVerifier::new().verify(&targets, false).await;

        let bot_deployed = graph
            .by_role(ServiceRole::Bot)
            .is_some_and(|bot| targets.iter().any(|t| t.name == bot.name));
        if bot_deployed {
            let all_targets = ServiceTarget::from_ledger(&graph, &ledger);
            let configured = graph
                .by_role(ServiceRole::Bot)
                .and_then(|bot| ledger.get(&bot.name))
                .and_then(|s| s.environment.get("WEBHOOK_URL").cloned());
            if let Some(result) =
                reconcile_webhook(&graph, &settings, &all_targets, configured).await
            {
                report.results.push(result);
            }
        }

        report.print();
        if !report.is_healthy() {
            ui::print_warning("Deploy finished but some checks failed");
        }
        Ok(())
    }
}
