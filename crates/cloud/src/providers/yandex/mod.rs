//! Yandex Cloud provider.
//!
//! Implements the [`CloudProvider`](super::CloudProvider) trait on top of the
//! `yc` CLI, so the operator's existing CLI profile (token, cloud, folder) is
//! reused as-is.
//!
//! ## Services
//!
//! - **IAM** - service accounts and folder bindings
//! - **Container Registry** - `cr.yandex/<registry-id>/<image>`
//! - **Serverless Containers** - one container per stack service
//! - **Lockbox** - the secret every service reads its configuration from

mod client;
mod models;

pub use client::YandexCloud;
pub use models::*;
