//! CLI subcommands.

pub mod audit;
pub mod deploy;
pub mod monitor;
pub mod stop;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use barops_cloud::{CloudProvider, ResourceKind, YandexCloud};
use tracing::warn;

use crate::config::StackSettings;
use crate::graph::{ServiceGraph, ServiceRole};
use crate::health::{CheckKind, CheckResult, ServiceTarget};
use crate::logs::{LogSource, LogSupervisor, YcLogSource};
use crate::ui;
use crate::webhook::{TelegramBotApi, WebhookReconciler};

/// Settings plus the graph with overrides applied.
pub(crate) fn load_stack(config: Option<&Path>) -> Result<(StackSettings, ServiceGraph)> {
    let settings = StackSettings::load(config)?;
    let mut graph = ServiceGraph::bartender();
    graph.apply_overrides(&settings.overrides)?;
    Ok((settings, graph))
}

/// What is currently deployed, looked up by container name.
pub(crate) struct Discovered {
    pub targets: Vec<ServiceTarget>,
    /// Container id per service name.
    pub container_ids: BTreeMap<String, String>,
}

pub(crate) async fn discover(
    cloud: &dyn CloudProvider,
    graph: &ServiceGraph,
    settings: &StackSettings,
) -> Discovered {
    let mut targets = Vec::new();
    let mut container_ids = BTreeMap::new();

    for svc in graph.services() {
        let name = settings.container_name(&svc.name);
        let url = match cloud.find(ResourceKind::Container, &name).await {
            Ok(Some(container)) => {
                container_ids.insert(svc.name.clone(), container.id);
                container.url
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Could not look up {name}: {e}");
                None
            }
        };
        targets.push(ServiceTarget {
            name: svc.name.clone(),
            role: svc.role,
            url,
        });
    }

    Discovered {
        targets,
        container_ids,
    }
}

/// `WEBHOOK_URL` of the bot's latest revision.
pub(crate) async fn configured_webhook_url(
    cloud: &dyn CloudProvider,
    graph: &ServiceGraph,
    settings: &StackSettings,
) -> Option<String> {
    let bot = graph.by_role(ServiceRole::Bot)?;
    match cloud.latest_revision(&settings.container_name(&bot.name)).await {
        Ok(revision) => revision.and_then(|r| r.environment.get("WEBHOOK_URL").cloned()),
        Err(e) => {
            warn!("Could not read the bot revision: {e}");
            None
        }
    }
}

/// Check the webhook and resync it once if needed. Always yields a report
/// line; nothing here is fatal.
pub(crate) async fn reconcile_webhook(
    graph: &ServiceGraph,
    settings: &StackSettings,
    targets: &[ServiceTarget],
    configured_url: Option<String>,
) -> Option<CheckResult> {
    let bot = graph.by_role(ServiceRole::Bot)?;
    let gateway = graph.by_role(ServiceRole::Gateway)?;
    let kind = CheckKind::Webhook;

    let Some(token) = settings.passthrough("TELEGRAM_TOKEN") else {
        return Some(CheckResult::skip(&bot.name, kind, "TELEGRAM_TOKEN not set"));
    };
    let Some(gateway_url) = targets
        .iter()
        .find(|t| t.name == gateway.name)
        .and_then(|t| t.url.clone())
    else {
        return Some(CheckResult::fail(&bot.name, kind, "gateway is not deployed"));
    };

    let api = TelegramBotApi::new(token);
    let secret = settings.passthrough("WEBHOOK_SECRET_TOKEN").map(String::from);
    let mut reconciler = WebhookReconciler::new(&api, secret);
    let outcome = reconciler.reconcile(&gateway_url, configured_url).await;
    Some(outcome.check_result(&bot.name))
}

/// Follow logs of every discovered container until Ctrl-C.
pub(crate) async fn follow_logs(cloud: YandexCloud, discovered: &Discovered) {
    if discovered.container_ids.is_empty() {
        ui::print_warning("No deployed containers to follow");
        return;
    }

    let source: Arc<dyn LogSource> =
        Arc::new(YcLogSource::new(cloud, discovered.container_ids.clone()));
    let mut supervisor = LogSupervisor::new();
    for service in discovered.container_ids.keys() {
        supervisor.spawn(service, Arc::clone(&source));
    }

    ui::print_info(&format!(
        "Following logs of {} services, press Ctrl-C to stop",
        supervisor.len()
    ));
    let joined = supervisor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
            }
        })
        .await;
    ui::print_info(&format!("Stopped {joined} log followers"));
}
