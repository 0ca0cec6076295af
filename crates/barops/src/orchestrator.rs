//! Deployment orchestration.
//!
//! Walks the staged plan from [`ServiceGraph::plan`], coordinating:
//! - identity and registry provisioning
//! - image build and push
//! - revision deploys with rendered environments
//! - URL resolution and public invoke grants
//!
//! The first failing step stops the run. Nothing is rolled back; rerunning
//! the command converges because every step is get-or-create.

use std::collections::{BTreeMap, BTreeSet};

use barops_cloud::{
    CloudProvider, ResourceKind, ResourceSpec, RevisionRequest, Subject,
};
use colored::Colorize;
use tracing::{debug, info, warn};

use crate::config::StackSettings;
use crate::error::{DeployStage, OpsError};
use crate::graph::{DeployStep, RenderInputs, ServiceGraph, ServiceSpec, StepKind};
use crate::image::ImageBuilder;
use crate::resources::{ResourceResolver, ROLE_INVOKER};
use crate::state::{DeploymentLedger, ServicePhase};
use crate::ui;

/// Knobs of a single deploy run.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Print the plan and rendered environments without touching the cloud.
    pub dry_run: bool,
    /// Build and push images, deploy nothing.
    pub build_only: bool,
    /// Restrict the run to these services.
    pub only: Option<Vec<String>>,
    /// Image tag shared by every service in the run.
    pub tag: String,
}

/// Drives one deploy run against a cloud provider.
pub struct DeploymentOrchestrator<'a> {
    cloud: &'a dyn CloudProvider,
    images: &'a dyn ImageBuilder,
    graph: &'a ServiceGraph,
    settings: &'a StackSettings,
    options: DeployOptions,
    ledger: DeploymentLedger,
    registry_id: Option<String>,
    service_account_id: Option<String>,
}

impl<'a> DeploymentOrchestrator<'a> {
    #[must_use]
    pub fn new(
        cloud: &'a dyn CloudProvider,
        images: &'a dyn ImageBuilder,
        graph: &'a ServiceGraph,
        settings: &'a StackSettings,
        options: DeployOptions,
    ) -> Self {
        Self {
            cloud,
            images,
            graph,
            settings,
            options,
            ledger: DeploymentLedger::new(),
            registry_id: None,
            service_account_id: None,
        }
    }

    fn selection(&self) -> Option<&[String]> {
        self.options.only.as_deref()
    }

    fn selected(&self) -> impl Iterator<Item = &'a ServiceSpec> + '_ {
        self.graph.services().iter().filter(move |s| {
            self.selection()
                .is_none_or(|only| only.iter().any(|n| *n == s.name))
        })
    }

    /// Run the deploy to completion.
    ///
    /// # Errors
    ///
    /// Returns the first fatal failure. Services after the failing one are
    /// not attempted.
    pub async fn run(mut self, secret_id: &str) -> Result<DeploymentLedger, OpsError> {
        if let Some(only) = self.selection() {
            self.graph.check_selection(only)?;
        }

        if self.options.dry_run {
            self.print_dry_run(secret_id);
            return Ok(self.ledger);
        }

        let resolver = ResourceResolver::new(self.cloud);
        if self.options.build_only {
            self.registry_id = Some(resolver.registry_id(self.settings).await?);
            self.configure_registry_auth().await?;
            let services: Vec<&ServiceSpec> = self.selected().collect();
            for svc in services {
                self.build_and_push(svc).await?;
            }
            ui::print_success("Images built and pushed");
            return Ok(self.ledger);
        }

        let identity = resolver.provision_identity(self.settings, secret_id).await?;
        self.registry_id = Some(identity.registry_id);
        self.service_account_id = Some(identity.service_account.id);

        self.seed_unselected_peers().await;
        let plan = self
            .graph
            .plan(self.selection(), &self.ledger.known_urls());

        self.configure_registry_auth().await?;

        for (i, step) in plan.iter().enumerate() {
            let label = match step.kind {
                StepKind::Initial => format!("Deploying {}", step.service),
                StepKind::Backfill => format!("Redeploying {} with peer URLs", step.service),
            };
            ui::print_plan_step(i + 1, plan.len(), &label);
            self.execute_step(step, secret_id).await?;
        }

        if self.ledger.is_converged() {
            ui::print_success("All services deployed with complete peer URLs");
        } else {
            for (name, state) in self.ledger.iter() {
                if !state.pending_peers.is_empty() {
                    let peers: Vec<&str> = state.pending_peers.iter().map(String::as_str).collect();
                    warn!("{name} is missing URLs for: {}", peers.join(", "));
                }
            }
            ui::print_warning("Some services were deployed without every peer URL");
        }

        Ok(self.ledger)
    }

    /// Seed URLs of peers that are outside a `--only` subset from the cloud.
    async fn seed_unselected_peers(&mut self) {
        let Some(only) = self.options.only.clone() else {
            return;
        };
        let wanted: BTreeSet<&str> = self
            .selected()
            .flat_map(ServiceSpec::peers)
            .filter(|p| !only.iter().any(|n| n.as_str() == *p))
            .collect();

        for peer in wanted {
            let name = self.settings.container_name(peer);
            match self.cloud.find(ResourceKind::Container, &name).await {
                Ok(Some(container)) => {
                    if let Some(url) = container.url.as_deref() {
                        debug!("Seeded {peer} URL from existing container");
                        self.ledger.record_url(peer, url);
                    }
                }
                Ok(None) => debug!("Peer {peer} has no container yet"),
                Err(e) => warn!("Could not look up peer {peer}: {e}"),
            }
        }
    }

    async fn configure_registry_auth(&self) -> Result<(), OpsError> {
        self.cloud
            .configure_registry_auth()
            .await
            .map_err(|e| OpsError::Deploy {
                service: "registry".into(),
                stage: DeployStage::Push,
                message: e.to_string(),
            })
    }

    async fn execute_step(&mut self, step: &DeployStep, secret_id: &str) -> Result<(), OpsError> {
        let graph = self.graph;
        let svc = graph
            .get(&step.service)
            .ok_or_else(|| OpsError::Graph(format!("unknown service '{}'", step.service)))?;

        let mut resolved_url = None;
        if step.kind == StepKind::Initial {
            let container = ResourceResolver::new(self.cloud)
                .ensure(
                    ResourceKind::Container,
                    &self.settings.container_name(&svc.name),
                    &container_spec(svc),
                )
                .await
                .map_err(|e| fail(svc, DeployStage::Resource, &e))?;
            resolved_url = container.url.clone();
            let state = self.ledger.entry(&svc.name);
            state.container_id = Some(container.id);
            state.advance(ServicePhase::ResourceCreated);

            self.build_and_push(svc).await?;
        }

        let (container_id, image) = {
            let state = self.ledger.entry(&svc.name);
            match (state.container_id.clone(), state.image.clone()) {
                (Some(c), Some(i)) => (c, i),
                _ => {
                    return Err(OpsError::Graph(format!(
                        "backfill of '{}' scheduled before its initial deploy",
                        svc.name
                    )))
                }
            }
        };

        let rendered = svc.render(
            |peer| self.ledger.url(peer),
            &RenderInputs {
                secret_id,
                passthrough: Some(&self.settings.passthrough),
            },
        );
        if !rendered.missing_peers.is_empty() {
            debug!(
                "{} rendered without: {:?}",
                svc.name, rendered.missing_peers
            );
        }

        let request = RevisionRequest {
            container_id: container_id.clone(),
            image,
            resources: svc.sizing,
            service_account_id: self.service_account_id.clone(),
            environment: rendered.env.clone(),
        };
        let revision = self
            .cloud
            .deploy_revision(&request)
            .await
            .map_err(|e| fail(svc, DeployStage::Revision, &e))?;
        info!("Deployed {} revision {}", svc.name, revision.id);

        let state = self.ledger.entry(&svc.name);
        state.environment = rendered.env;
        state.pending_peers = rendered.missing_peers;
        state.deploy_count += 1;
        state.advance(ServicePhase::RevisionDeployed);

        if resolved_url.is_none() && self.ledger.url(&svc.name).is_none() {
            resolved_url = self
                .cloud
                .find(ResourceKind::Container, &self.settings.container_name(&svc.name))
                .await
                .map_err(|e| fail(svc, DeployStage::Revision, &e))?
                .and_then(|c| c.url);
        }
        if let Some(url) = resolved_url {
            self.ledger.record_url(&svc.name, &url);
        }
        let Some(url) = self.ledger.url(&svc.name) else {
            return Err(OpsError::Deploy {
                service: svc.name.clone(),
                stage: DeployStage::Revision,
                message: "container has no invoke URL".into(),
            });
        };

        if svc.public {
            ResourceResolver::new(self.cloud)
                .grant(&Subject::AllUsers, ROLE_INVOKER, ResourceKind::Container, &container_id)
                .await
                .map_err(|e| fail(svc, DeployStage::Invoke, &e))?;
            self.ledger
                .entry(&svc.name)
                .advance(ServicePhase::PubliclyInvokable);
        }

        ui::print_success(&format!("{} → {}", svc.name, url));
        Ok(())
    }

    async fn build_and_push(&mut self, svc: &ServiceSpec) -> Result<(), OpsError> {
        let registry_id = self.registry_id.as_deref().unwrap_or_default();
        let image = self
            .settings
            .image_ref(registry_id, &svc.name, &self.options.tag);

        let context = self.settings.build_root.join(&svc.build.context);
        let dockerfile = self.settings.build_root.join(&svc.build.dockerfile);

        let spinner = ui::spinner(&format!("Building {image}"));
        let built = self
            .images
            .build(&context, &dockerfile, &image, &svc.name)
            .await;
        spinner.finish_and_clear();
        built.map_err(|e| fail(svc, DeployStage::Build, &e))?;

        self.images
            .push(&image)
            .await
            .map_err(|e| fail(svc, DeployStage::Push, &e))?;

        let state = self.ledger.entry(&svc.name);
        state.image = Some(image);
        state.advance(ServicePhase::ImagePushed);
        Ok(())
    }

    fn print_dry_run(&mut self, secret_id: &str) {
        ui::print_section("Deploy plan (dry run)");

        let masked: BTreeMap<String, String> = self
            .settings
            .passthrough
            .keys()
            .map(|k| (k.clone(), "***".to_string()))
            .collect();
        let secret = if secret_id.is_empty() { "<secret-id>" } else { secret_id };

        let graph = self.graph;
        let plan = graph.plan(self.selection(), &BTreeSet::new());
        for (i, step) in plan.iter().enumerate() {
            let Some(svc) = graph.get(&step.service) else {
                continue;
            };
            let stage = match step.kind {
                StepKind::Initial => "initial",
                StepKind::Backfill => "backfill",
            };
            ui::print_plan_step(
                i + 1,
                plan.len(),
                &format!("{} ({stage}) as {}", svc.name, self.settings.container_name(&svc.name)),
            );

            let rendered = svc.render(
                |peer| self.ledger.url(peer),
                &RenderInputs {
                    secret_id: secret,
                    passthrough: Some(&masked),
                },
            );
            for (key, value) in &rendered.env {
                println!("  {} {value}", format!("{key}:").bright_black());
            }
            if !rendered.missing_peers.is_empty() {
                let peers: Vec<&str> = rendered.missing_peers.iter().map(String::as_str).collect();
                println!("  {} {}", "pending:".bright_black(), peers.join(", ").yellow());
            }

            self.ledger
                .record_url(&svc.name, &format!("<{}-url>", svc.name));
        }
    }
}

fn container_spec(svc: &ServiceSpec) -> ResourceSpec {
    ResourceSpec {
        description: Some(format!("bartender {} service", svc.role)),
        labels: [
            ("managed-by".to_string(), "barops".to_string()),
            ("service".to_string(), svc.name.clone()),
        ]
        .into(),
    }
}

fn fail(svc: &ServiceSpec, stage: DeployStage, err: &dyn std::fmt::Display) -> OpsError {
    OpsError::Deploy {
        service: svc.name.clone(),
        stage,
        message: err.to_string(),
    }
}
