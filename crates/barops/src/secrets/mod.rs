//! Secret id discovery and the gated secret print path.

mod gate;
mod strategy;

use std::io::Write;

use anyhow::{Context, Result};
use barops_cloud::CloudProvider;
use tracing::{debug, info};

use crate::config::StackSettings;
use crate::error::OpsError;
use crate::graph::ServiceGraph;

pub use gate::{Confirmation, ConfirmationContext, CONFIRMATION_PHRASE};
pub use strategy::{
    EnvVar, Explicit, FromDeployedRevisions, FromSecretList, SecretIdStrategy, SECRET_ID_KEYS,
};

/// Ordered chain of secret id strategies. The first non-empty result wins.
pub struct SecretResolver {
    strategies: Vec<Box<dyn SecretIdStrategy>>,
}

impl SecretResolver {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn SecretIdStrategy>>) -> Self {
        Self { strategies }
    }

    /// Argument, then `SECRET_ID`, then deployed revisions in graph order,
    /// then the account's secret list.
    #[must_use]
    pub fn standard(explicit: Option<String>, settings: &StackSettings, graph: &ServiceGraph) -> Self {
        Self::with_env(explicit, EnvVar::read("SECRET_ID"), settings, graph)
    }

    /// Like [`SecretResolver::standard`] with an explicit env snapshot.
    #[must_use]
    pub fn with_env(
        explicit: Option<String>,
        env: EnvVar,
        settings: &StackSettings,
        graph: &ServiceGraph,
    ) -> Self {
        let containers = graph
            .services()
            .iter()
            .map(|s| settings.container_name(&s.name))
            .collect();
        Self::new(vec![
            Box::new(Explicit(explicit)),
            Box::new(env),
            Box::new(FromDeployedRevisions { containers }),
            Box::new(FromSecretList),
        ])
    }

    /// Walk the chain. `None` when nothing produced a non-empty id.
    pub async fn resolve(&self, cloud: &dyn CloudProvider) -> Option<String> {
        for strategy in &self.strategies {
            if let Some(id) = strategy.resolve(cloud).await {
                info!("Secret id resolved from {}", strategy.name());
                return Some(id);
            }
            debug!("No secret id from {}", strategy.name());
        }
        None
    }

    /// Like [`SecretResolver::resolve`], treating an empty result as fatal.
    ///
    /// # Errors
    ///
    /// Returns [`OpsError::SecretUnresolved`] when every strategy came up empty.
    pub async fn require(&self, cloud: &dyn CloudProvider) -> Result<String, OpsError> {
        self.resolve(cloud).await.ok_or(OpsError::SecretUnresolved)
    }
}

/// Print the secret payload as `key=value` lines.
///
/// Nothing is resolved or fetched unless `confirmation` is
/// [`Confirmation::Confirmed`]. Returns the number of lines written.
///
/// # Errors
///
/// Returns [`OpsError::NotConfirmed`], [`OpsError::SecretUnresolved`] or
/// [`OpsError::SecretFetch`] in that order of checking, or an I/O error from
/// the writer.
pub async fn print_secrets<W: Write>(
    cloud: &dyn CloudProvider,
    resolver: &SecretResolver,
    confirmation: Confirmation,
    version_id: Option<&str>,
    out: &mut W,
) -> Result<usize> {
    if confirmation != Confirmation::Confirmed {
        return Err(OpsError::NotConfirmed(format!(
            "Refusing to print secrets: type {CONFIRMATION_PHRASE} or pass --yes"
        ))
        .into());
    }

    let secret_id = resolver.require(cloud).await?;
    let payload = cloud
        .secret_payload(&secret_id, version_id)
        .await
        .map_err(|source| OpsError::SecretFetch {
            secret_id: secret_id.clone(),
            source,
        })?;

    let lines = payload.lines();
    for line in &lines {
        writeln!(out, "{line}").context("Failed to write secret line")?;
    }
    Ok(lines.len())
}
