//! Bartender operations library.
//!
//! Provisions, wires and verifies the bartender serverless backend: a set of
//! HTTP services deployed as serverless containers that discover each other
//! through URLs injected into their environments.
//!
//! # Example
//!
//! ```ignore
//! use barops::{DeployOptions, DeploymentOrchestrator, ServiceGraph, StackSettings};
//! use barops::image::DockerCli;
//! use barops_cloud::YandexCloud;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = StackSettings::load(None)?;
//!     let graph = ServiceGraph::bartender();
//!     let cloud = YandexCloud::new(settings.folder_id.clone());
//!     let docker = DockerCli::new();
//!     let options = DeployOptions { tag: "v1".into(), ..DeployOptions::default() };
//!     DeploymentOrchestrator::new(&cloud, &docker, &graph, &settings, options)
//!         .run("e6q0secret")
//!         .await?;
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod commands;
pub mod config;
pub mod error;
pub mod graph;
pub mod health;
pub mod image;
pub mod logs;
pub mod orchestrator;
pub mod resources;
pub mod secrets;
pub mod state;
pub mod ui;
pub mod validator;
pub mod webhook;

// Re-export commonly used types at the crate root
pub use config::StackSettings;
pub use error::{exit_code_for, OpsError};
pub use graph::{ServiceGraph, ServiceRole, ServiceSpec};
pub use orchestrator::{DeployOptions, DeploymentOrchestrator};
pub use state::{DeploymentLedger, DeploymentState, ServicePhase};
