//! Service graph: what gets deployed, how it is sized, and in which order.
//!
//! The graph is acyclic except for the gateway/bot pair. Peers that are not
//! deployed yet render as empty strings and the affected service gets one
//! backfill deploy once every missing peer is known.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use barops_cloud::RevisionResources;
use serde::{Deserialize, Serialize};

use crate::config::{ServiceOverride, WEBHOOK_PATH};
use crate::error::OpsError;

/// What a service does, which selects its functional check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceRole {
    Gateway,
    Retrieval,
    Moderation,
    Embedding,
    Logging,
    SecretStore,
    Bot,
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gateway => write!(f, "gateway"),
            Self::Retrieval => write!(f, "retrieval"),
            Self::Moderation => write!(f, "moderation"),
            Self::Embedding => write!(f, "embedding"),
            Self::Logging => write!(f, "logging"),
            Self::SecretStore => write!(f, "secret-store"),
            Self::Bot => write!(f, "bot"),
        }
    }
}

/// One entry of an environment template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvValue {
    /// Fixed value.
    Literal(String),
    /// URL of another service in the graph, plus an optional path suffix.
    PeerUrl { service: String, suffix: String },
    /// The resolved secret-store id.
    SecretId,
    /// Operator-provided value forwarded as-is.
    Passthrough(String),
}

impl EnvValue {
    fn literal(v: &str) -> Self {
        Self::Literal(v.to_string())
    }

    fn peer(service: &str) -> Self {
        Self::PeerUrl {
            service: service.to_string(),
            suffix: String::new(),
        }
    }

    fn passthrough(name: &str) -> Self {
        Self::Passthrough(name.to_string())
    }
}

/// Where a service image is built from, relative to the build root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    /// Docker build context directory.
    pub context: PathBuf,
    /// Dockerfile path.
    pub dockerfile: PathBuf,
}

/// Declaration of one deployable service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique service key.
    pub name: String,
    pub role: ServiceRole,
    pub build: BuildContext,
    pub sizing: RevisionResources,
    /// Ordered environment template.
    pub env: Vec<(String, EnvValue)>,
    /// Grant unauthenticated invocation after deploy.
    pub public: bool,
}

/// Values available while rendering environment templates.
#[derive(Debug, Clone, Default)]
pub struct RenderInputs<'a> {
    /// Resolved secret-store id.
    pub secret_id: &'a str,
    /// Operator pass-through values.
    pub passthrough: Option<&'a BTreeMap<String, String>>,
}

/// A rendered environment and the peers that were still unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedEnv {
    pub env: BTreeMap<String, String>,
    pub missing_peers: BTreeSet<String>,
}

impl ServiceSpec {
    /// Services this one needs the URL of.
    #[must_use]
    pub fn peers(&self) -> BTreeSet<&str> {
        self.env
            .iter()
            .filter_map(|(_, v)| match v {
                EnvValue::PeerUrl { service, .. } => Some(service.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Substitute every placeholder. Unknown peers render as empty strings.
    pub fn render<F>(&self, url_of: F, inputs: &RenderInputs<'_>) -> RenderedEnv
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rendered = RenderedEnv::default();
        for (key, value) in &self.env {
            let text = match value {
                EnvValue::Literal(v) => v.clone(),
                EnvValue::SecretId => inputs.secret_id.to_string(),
                EnvValue::Passthrough(name) => inputs
                    .passthrough
                    .and_then(|p| p.get(name))
                    .cloned()
                    .unwrap_or_default(),
                EnvValue::PeerUrl { service, suffix } => {
                    if let Some(url) = url_of(service) {
                        format!("{}{suffix}", url.trim_end_matches('/'))
                    } else {
                        rendered.missing_peers.insert(service.clone());
                        String::new()
                    }
                }
            };
            rendered.env.insert(key.clone(), text);
        }
        rendered
    }

    fn apply_override(&mut self, o: &ServiceOverride) {
        if let Some(v) = o.cores {
            self.sizing.cores = v;
        }
        if let Some(v) = o.core_fraction {
            self.sizing.core_fraction = v;
        }
        if let Some(v) = o.memory_mb {
            self.sizing.memory_mb = v;
        }
        if let Some(v) = o.concurrency {
            self.sizing.concurrency = v;
        }
        if let Some(v) = o.timeout_secs {
            self.sizing.timeout_secs = v;
        }
        if let Some(v) = o.public {
            self.public = v;
        }
        for (key, value) in &o.env {
            if let Some(slot) = self.env.iter_mut().find(|(k, _)| k == key) {
                slot.1 = EnvValue::Literal(value.clone());
            } else {
                self.env.push((key.clone(), EnvValue::Literal(value.clone())));
            }
        }
    }
}

/// Whether a deploy is the first one of a run or a backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Initial,
    Backfill,
}

/// One entry of the deploy plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployStep {
    pub service: String,
    pub kind: StepKind,
}

/// Ordered set of services with validated peer references.
#[derive(Debug, Clone)]
pub struct ServiceGraph {
    services: Vec<ServiceSpec>,
}

impl ServiceGraph {
    /// Build a graph, rejecting duplicate names and dangling peer references.
    ///
    /// # Errors
    ///
    /// Returns [`OpsError::Graph`] if the declaration is inconsistent.
    pub fn new(services: Vec<ServiceSpec>) -> Result<Self, OpsError> {
        let mut names = HashSet::new();
        for svc in &services {
            if !names.insert(svc.name.as_str()) {
                return Err(OpsError::Graph(format!(
                    "duplicate service name '{}'",
                    svc.name
                )));
            }
        }
        for svc in &services {
            for peer in svc.peers() {
                if peer == svc.name {
                    return Err(OpsError::Graph(format!(
                        "service '{peer}' references its own URL"
                    )));
                }
                if !names.contains(peer) {
                    return Err(OpsError::Graph(format!(
                        "service '{}' references unknown peer '{peer}'",
                        svc.name
                    )));
                }
            }
        }
        Ok(Self { services })
    }

    /// Services in deployment order.
    #[must_use]
    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    /// Look up a service by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// First service with the given role.
    #[must_use]
    pub fn by_role(&self, role: ServiceRole) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.role == role)
    }

    /// Apply per-service overrides.
    ///
    /// # Errors
    ///
    /// Returns [`OpsError::Graph`] when an override names an unknown service.
    pub fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, ServiceOverride>,
    ) -> Result<(), OpsError> {
        for (name, o) in overrides {
            let svc = self
                .services
                .iter_mut()
                .find(|s| &s.name == name)
                .ok_or_else(|| OpsError::Graph(format!("override for unknown service '{name}'")))?;
            svc.apply_override(o);
        }
        Ok(())
    }

    /// Validate a `--only` selection.
    ///
    /// # Errors
    ///
    /// Returns [`OpsError::Graph`] for names not in the graph.
    pub fn check_selection(&self, only: &[String]) -> Result<(), OpsError> {
        match only.iter().find(|n| self.get(n).is_none()) {
            Some(unknown) => Err(OpsError::Graph(format!("unknown service '{unknown}'"))),
            None => Ok(()),
        }
    }

    /// Compute the staged deploy plan.
    ///
    /// `selected` restricts the run to a subset (all services when `None`);
    /// `already_known` holds peers whose URL is known before the run starts.
    /// Each selected service gets an initial deploy in graph order. A service
    /// rendered with missing peers gets exactly one backfill deploy, scheduled
    /// right after the last of its missing peers is deployed. Peers that are
    /// neither selected nor known stay pending and never trigger a backfill.
    #[must_use]
    pub fn plan(&self, selected: Option<&[String]>, already_known: &BTreeSet<String>) -> Vec<DeployStep> {
        let in_run = |name: &str| selected.is_none_or(|s| s.iter().any(|n| n == name));

        let mut known: BTreeSet<String> = already_known.clone();
        let mut waiting: Vec<(String, BTreeSet<String>)> = Vec::new();
        let mut steps = Vec::new();

        for svc in self.services.iter().filter(|s| in_run(&s.name)) {
            let missing: BTreeSet<String> = svc
                .peers()
                .into_iter()
                .filter(|p| !known.contains(*p) && in_run(p))
                .map(ToString::to_string)
                .collect();

            steps.push(DeployStep {
                service: svc.name.clone(),
                kind: StepKind::Initial,
            });
            known.insert(svc.name.clone());
            if !missing.is_empty() {
                waiting.push((svc.name.clone(), missing));
            }

            for (_, missing) in &mut waiting {
                missing.remove(&svc.name);
            }
            for (name, _) in waiting.iter().filter(|(_, m)| m.is_empty()) {
                steps.push(DeployStep {
                    service: name.clone(),
                    kind: StepKind::Backfill,
                });
            }
            waiting.retain(|(_, m)| !m.is_empty());
        }

        steps
    }

    /// The stack as deployed in production.
    #[must_use]
    pub fn bartender() -> Self {
        let sized = |cores, memory_mb, concurrency, timeout_secs| RevisionResources {
            cores,
            core_fraction: 100,
            memory_mb,
            concurrency,
            timeout_secs,
        };
        let build = |dir: &str| BuildContext {
            context: PathBuf::from("."),
            dockerfile: PathBuf::from(format!("services/{dir}/Dockerfile")),
        };
        let port = |var: &str| (var.to_string(), EnvValue::literal("8080"));
        let secret = || ("SECRET_ID".to_string(), EnvValue::SecretId);
        let pass = |var: &str| (var.to_string(), EnvValue::passthrough(var));
        let peer = |var: &str, svc: &str| (var.to_string(), EnvValue::peer(svc));

        let services = vec![
            ServiceSpec {
                name: "lockbox".into(),
                role: ServiceRole::SecretStore,
                build: build("lockbox"),
                sizing: sized(1, 256, 4, 30),
                env: vec![port("LOCKBOX_SERVICE_PORT"), secret()],
                public: true,
            },
            ServiceSpec {
                name: "logging".into(),
                role: ServiceRole::Logging,
                build: build("logging"),
                sizing: sized(1, 256, 8, 30),
                env: vec![port("LOGGING_SERVICE_PORT")],
                public: true,
            },
            ServiceSpec {
                name: "yandex".into(),
                role: ServiceRole::Embedding,
                build: build("yandex"),
                sizing: sized(1, 512, 4, 60),
                env: vec![
                    port("YANDEX_SERVICE_PORT"),
                    secret(),
                    pass("SECRET_VERSION_ID"),
                    pass("FOLDER_ID"),
                ],
                public: true,
            },
            ServiceSpec {
                name: "validation".into(),
                role: ServiceRole::Moderation,
                build: build("validation"),
                sizing: sized(1, 512, 4, 30),
                env: vec![
                    port("VALIDATION_SERVICE_PORT"),
                    secret(),
                    pass("FOLDER_ID"),
                    peer("YANDEX_SERVICE_URL", "yandex"),
                ],
                public: true,
            },
            ServiceSpec {
                name: "rag".into(),
                role: ServiceRole::Retrieval,
                build: build("rag"),
                sizing: sized(2, 2048, 2, 120),
                env: vec![
                    port("RAG_SERVICE_PORT"),
                    secret(),
                    pass("FOLDER_ID"),
                    pass("S3_BUCKET"),
                    pass("S3_PREFIX"),
                    pass("S3_ENDPOINT"),
                    pass("AWS_ACCESS_KEY_ID"),
                    pass("AWS_SECRET_ACCESS_KEY"),
                    peer("YANDEX_SERVICE_URL", "yandex"),
                ],
                public: true,
            },
            ServiceSpec {
                name: "gateway".into(),
                role: ServiceRole::Gateway,
                build: build("gateway"),
                sizing: sized(1, 512, 8, 120),
                env: vec![
                    port("GATEWAY_PORT"),
                    peer("TELEGRAM_SERVICE_URL", "telegram"),
                    peer("RAG_SERVICE_URL", "rag"),
                    peer("VALIDATION_SERVICE_URL", "validation"),
                    peer("YANDEX_SERVICE_URL", "yandex"),
                    peer("LOGGING_SERVICE_URL", "logging"),
                    peer("LOCKBOX_SERVICE_URL", "lockbox"),
                    ("EXPOSE_LOCKBOX_PROXY".into(), EnvValue::literal("false")),
                ],
                public: true,
            },
            ServiceSpec {
                name: "telegram".into(),
                role: ServiceRole::Bot,
                build: build("telegram"),
                sizing: sized(1, 256, 4, 60),
                env: vec![
                    port("TELEGRAM_SERVICE_PORT"),
                    secret(),
                    pass("TELEGRAM_TOKEN"),
                    peer("GATEWAY_URL", "gateway"),
                    ("USE_WEBHOOK".into(), EnvValue::literal("true")),
                    (
                        "WEBHOOK_URL".into(),
                        EnvValue::PeerUrl {
                            service: "gateway".into(),
                            suffix: WEBHOOK_PATH.into(),
                        },
                    ),
                    pass("WEBHOOK_SECRET_TOKEN"),
                ],
                public: true,
            },
        ];

        Self { services }
    }
}
