//! Cloud provider integration for the bartender stack.
//!
//! This crate wraps the cloud operations the deploy tooling needs behind the
//! [`CloudProvider`] trait:
//!
//! - **Identity** - service accounts and access bindings
//! - **Registry** - container registries and docker credentials
//! - **Serverless containers** - containers, revisions, public URLs
//! - **Lockbox** - secret listing and payload retrieval
//!
//! The only implementation today is [`yandex::YandexCloud`], which drives the
//! `yc` CLI with `--format json`. Keeping everything behind the trait lets the
//! orchestration logic run against in-memory fakes in tests.

pub mod command;
pub mod providers;

pub use providers::{
    yandex, AccessBinding, CloudError, CloudProvider, Resource, ResourceKind, ResourceSpec,
    Revision, RevisionRequest, RevisionResources, SecretEntry, SecretPayload, SecretSummary,
    Subject, YandexCloud,
};
