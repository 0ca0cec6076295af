use std::path::PathBuf;

use anyhow::Result;
use barops_cloud::YandexCloud;
use clap::Args;
use dialoguer::{theme::ColorfulTheme, Input};

use crate::commands::{configured_webhook_url, discover, follow_logs, load_stack, reconcile_webhook};
use crate::error::OpsError;
use crate::health::HealthVerifier;
use crate::secrets::{self, Confirmation, ConfirmationContext, SecretResolver, CONFIRMATION_PHRASE};
use crate::ui;
use crate::validator::PrerequisitesValidator;

/// Run liveness and functional checks against the deployed stack
#[derive(Args)]
pub struct AuditCommand {
    /// Follow service logs after the checks
    #[arg(long)]
    logs: bool,

    /// Print the secret payload as key=value lines (asks for confirmation)
    #[arg(long)]
    print_secrets: bool,

    /// Confirm dangerous operations without prompting
    #[arg(short, long)]
    yes: bool,

    /// Secret store id used by --print-secrets
    #[arg(long, value_name = "ID")]
    secret_id: Option<String>,

    /// Secret version used by --print-secrets
    #[arg(long, env = "SECRET_VERSION_ID", value_name = "ID")]
    version_id: Option<String>,

    /// Skip webhook reconciliation
    #[arg(long)]
    no_webhook: bool,

    /// Overrides file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl AuditCommand {
    pub async fn run(&self) -> Result<()> {
        let confirmation = if self.print_secrets {
            Some(ConfirmationContext::detect(self.yes).confirm(prompt_phrase))
        } else {
            None
        };
        if confirmation == Some(Confirmation::Unconfirmed) {
            return Err(OpsError::NotConfirmed(format!(
                "Refusing to print secrets: type {CONFIRMATION_PHRASE} or pass --yes"
            ))
            .into());
        }

        PrerequisitesValidator::new(false).validate()?;
        let (settings, graph) = load_stack(self.config.as_deref())?;
        let cloud = YandexCloud::new(settings.folder_id.clone());

        if let Some(confirmation) = confirmation {
            let resolver = SecretResolver::standard(self.secret_id.clone(), &settings, &graph);
            let version = self.version_id.as_deref().filter(|v| !v.is_empty());
            let mut stdout = std::io::stdout();
            secrets::print_secrets(&cloud, &resolver, confirmation, version, &mut stdout).await?;
        }

        ui::print_section("Auditing bartender stack");
        let discovered = discover(&cloud, &graph, &settings).await;

        let spinner = ui::spinner("Running liveness and functional checks");
        let mut report = HealthVerifier::new()
            .verify(&discovered.targets, true)
            .await;
        spinner.finish_and_clear();

        if !self.no_webhook {
            let configured = configured_webhook_url(&cloud, &graph, &settings).await;
            if let Some(result) =
                reconcile_webhook(&graph, &settings, &discovered.targets, configured).await
            {
                report.results.push(result);
            }
        }

        report.print();

        if self.logs {
            follow_logs(cloud, &discovered).await;
        }
        Ok(())
    }
}

fn prompt_phrase() -> Option<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Type {CONFIRMATION_PHRASE} to print secrets"))
        .allow_empty(true)
        .interact_text()
        .ok()
}
