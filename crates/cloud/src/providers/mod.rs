//! Cloud provider abstractions.
//!
//! This module defines the common trait and types for cloud providers.

pub mod yandex;
mod traits;

pub use traits::{
    AccessBinding, CloudError, CloudProvider, Resource, ResourceKind, ResourceSpec, Revision,
    RevisionRequest, RevisionResources, SecretEntry, SecretPayload, SecretSummary, Subject,
};

// Re-export provider clients
pub use yandex::YandexCloud;
