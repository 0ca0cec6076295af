//! Per-service deployment state for a single run.
//!
//! State lives in memory only. Every step of a deploy is get-or-create, so a
//! failed run is recovered by running it again.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle of one service within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServicePhase {
    /// Nothing done yet.
    Absent,
    /// Container resource exists.
    ResourceCreated,
    /// Image built and pushed.
    ImagePushed,
    /// A revision is live.
    RevisionDeployed,
    /// Invoke URL is known.
    UrlResolved,
    /// Unauthenticated invocation granted.
    PubliclyInvokable,
}

impl ServicePhase {
    /// Get a human-readable description of the phase.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Absent => "Not deployed",
            Self::ResourceCreated => "Container resolved",
            Self::ImagePushed => "Image pushed",
            Self::RevisionDeployed => "Revision deployed",
            Self::UrlResolved => "URL resolved",
            Self::PubliclyInvokable => "Publicly invokable",
        }
    }
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// What is known about one service during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Container resource id.
    pub container_id: Option<String>,
    /// Invoke URL.
    pub url: Option<String>,
    /// Image the latest revision runs.
    pub image: Option<String>,
    /// Environment the latest revision was deployed with.
    pub environment: BTreeMap<String, String>,
    pub phase: ServicePhase,
    /// Revisions deployed for this service in this run.
    pub deploy_count: u32,
    /// Peers whose URL was unknown at the last render.
    pub pending_peers: BTreeSet<String>,
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self {
            container_id: None,
            url: None,
            image: None,
            environment: BTreeMap::new(),
            phase: ServicePhase::Absent,
            deploy_count: 0,
            pending_peers: BTreeSet::new(),
        }
    }
}

impl DeploymentState {
    /// Move forward to `phase`. Phases never go backwards.
    pub fn advance(&mut self, phase: ServicePhase) {
        if phase > self.phase {
            self.phase = phase;
        }
    }
}

/// Per-run map from service name to its state.
#[derive(Debug, Clone, Default)]
pub struct DeploymentLedger {
    services: BTreeMap<String, DeploymentState>,
}

impl DeploymentLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of a service, created on first access.
    pub fn entry(&mut self, service: &str) -> &mut DeploymentState {
        self.services.entry(service.to_string()).or_default()
    }

    #[must_use]
    pub fn get(&self, service: &str) -> Option<&DeploymentState> {
        self.services.get(service)
    }

    /// Known invoke URL of a service.
    #[must_use]
    pub fn url(&self, service: &str) -> Option<String> {
        self.services.get(service).and_then(|s| s.url.clone())
    }

    /// Services whose URL is known.
    #[must_use]
    pub fn known_urls(&self) -> BTreeSet<String> {
        self.services
            .iter()
            .filter(|(_, s)| s.url.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Record a URL. Empty values never overwrite a known URL.
    pub fn record_url(&mut self, service: &str, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            debug!("Ignoring empty URL for {service}");
            return;
        }
        let state = self.entry(service);
        state.url = Some(url.to_string());
        state.advance(ServicePhase::UrlResolved);
    }

    /// True when every deployed service rendered with all of its peers.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.services
            .values()
            .filter(|s| s.deploy_count > 0)
            .all(|s| s.pending_peers.is_empty())
    }

    /// Iterate over every tracked service.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeploymentState)> {
        self.services.iter()
    }
}
