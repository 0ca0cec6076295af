//! Liveness and functional verification of deployed services.
//!
//! Every check runs concurrently under its own timeout. Results are reported
//! in declared service order and a failing check never stops the others.

pub mod contracts;
mod report;

use std::time::Duration;

use futures::future::join_all;
use tracing::debug;

use crate::graph::{ServiceGraph, ServiceRole};
use crate::state::DeploymentLedger;

pub use report::{CheckKind, CheckResult, CheckStatus, HealthReport};

/// Path every service answers liveness checks on.
pub const HEALTH_PATH: &str = "/health";

/// A service to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub role: ServiceRole,
    /// `None` when the service is not deployed.
    pub url: Option<String>,
}

impl ServiceTarget {
    /// Targets for every service of the graph, using the URLs of a deploy run.
    #[must_use]
    pub fn from_ledger(graph: &ServiceGraph, ledger: &DeploymentLedger) -> Vec<Self> {
        graph
            .services()
            .iter()
            .map(|s| Self {
                name: s.name.clone(),
                role: s.role,
                url: ledger.url(&s.name),
            })
            .collect()
    }

    fn endpoint(&self, path: &str) -> Option<String> {
        self.url
            .as_deref()
            .map(|base| format!("{}{path}", base.trim_end_matches('/')))
    }
}

/// Runs health checks against deployed services.
#[derive(Debug, Clone)]
pub struct HealthVerifier {
    client: reqwest::Client,
    liveness_timeout: Duration,
    functional_timeout: Duration,
}

impl Default for HealthVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            liveness_timeout: Duration::from_secs(10),
            functional_timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, liveness: Duration, functional: Duration) -> Self {
        self.liveness_timeout = liveness;
        self.functional_timeout = functional;
        self
    }

    /// GET `/health` on every target.
    pub async fn liveness(&self, targets: &[ServiceTarget]) -> Vec<CheckResult> {
        join_all(targets.iter().map(|t| self.check_liveness(t))).await
    }

    /// Run the role contract of every target.
    pub async fn functional(&self, targets: &[ServiceTarget]) -> Vec<CheckResult> {
        join_all(targets.iter().map(|t| self.check_functional(t))).await
    }

    /// Liveness, and optionally functional checks, aggregated into one report.
    pub async fn verify(&self, targets: &[ServiceTarget], functional: bool) -> HealthReport {
        let (mut results, extra) = if functional {
            futures::join!(self.liveness(targets), self.functional(targets))
        } else {
            (self.liveness(targets).await, Vec::new())
        };
        results.extend(extra);
        HealthReport { results }
    }

    async fn check_liveness(&self, target: &ServiceTarget) -> CheckResult {
        let kind = CheckKind::Liveness;
        let Some(url) = target.endpoint(HEALTH_PATH) else {
            return CheckResult::fail(&target.name, kind, "not deployed");
        };

        debug!("GET {url}");
        let request = self.client.get(&url).send();
        match tokio::time::timeout(self.liveness_timeout, request).await {
            Err(_) => CheckResult::fail(
                &target.name,
                kind,
                format!("timed out after {}s", self.liveness_timeout.as_secs()),
            ),
            Ok(Err(e)) => CheckResult::fail(&target.name, kind, e.to_string()),
            Ok(Ok(resp)) if resp.status().is_success() => {
                CheckResult::pass(&target.name, kind, format!("HTTP {}", resp.status().as_u16()))
            }
            Ok(Ok(resp)) => {
                CheckResult::fail(&target.name, kind, format!("HTTP {}", resp.status().as_u16()))
            }
        }
    }

    async fn check_functional(&self, target: &ServiceTarget) -> CheckResult {
        let kind = CheckKind::Functional;
        let requests = contracts::requests(target.role);
        if requests.is_empty() {
            return CheckResult::skip(&target.name, kind, "no functional contract");
        }
        if target.url.is_none() {
            return CheckResult::fail(&target.name, kind, "not deployed");
        }

        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for request in &requests {
            match self.run_contract_request(target, request).await {
                Ok(detail) => passed.push(format!("{}: {detail}", request.path)),
                Err(detail) => failed.push(format!("{}: {detail}", request.path)),
            }
        }

        if failed.is_empty() {
            CheckResult::pass(&target.name, kind, passed.join("; "))
        } else {
            failed.extend(passed);
            CheckResult::fail(&target.name, kind, failed.join("; "))
        }
    }

    /// Send one contract request and evaluate the answer.
    async fn run_contract_request(
        &self,
        target: &ServiceTarget,
        contract: &contracts::ContractRequest,
    ) -> contracts::Verdict {
        let url = target
            .endpoint(contract.path)
            .ok_or_else(|| "not deployed".to_string())?;
        debug!("{} {url}", contract.method);
        let mut request = self.client.request(contract.method.clone(), &url);
        if let Some(body) = &contract.body {
            request = request.json(body);
        }

        let exchange = async {
            let resp = request.send().await?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };
        let (status, body) = match tokio::time::timeout(self.functional_timeout, exchange).await {
            Err(_) => {
                return Err(format!(
                    "timed out after {}s",
                    self.functional_timeout.as_secs()
                ))
            }
            Ok(Err(e)) => return Err(e.without_url().to_string()),
            Ok(Ok(pair)) => pair,
        };
        (contract.evaluate)(status, &body)
    }
}
