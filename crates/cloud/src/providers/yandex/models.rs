//! `yc --format json` output models.
//!
//! The CLI prints protobuf JSON, so 64-bit integers arrive as strings and a few
//! payload fields show up in either snake_case or camelCase depending on the
//! CLI version.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::providers::traits::{
    AccessBinding, Resource, Revision, RevisionResources, SecretEntry, SecretPayload,
    SecretSummary, Subject,
};

/// Any named resource (service account, registry, container).
#[derive(Debug, Clone, Deserialize)]
pub struct YcResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl From<YcResource> for Resource {
    fn from(r: YcResource) -> Self {
        Self {
            id: r.id,
            name: r.name,
            url: r.url.filter(|u| !u.is_empty()),
        }
    }
}

/// Access binding as printed by `list-access-bindings`.
#[derive(Debug, Clone, Deserialize)]
pub struct YcAccessBinding {
    pub role_id: String,
    pub subject: YcSubject,
}

/// Binding subject.
#[derive(Debug, Clone, Deserialize)]
pub struct YcSubject {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl YcAccessBinding {
    /// Convert to the common type. Subjects we never grant to are dropped.
    #[must_use]
    pub fn into_binding(self) -> Option<AccessBinding> {
        let subject = match (self.subject.kind.as_str(), self.subject.id.as_str()) {
            ("system", "allUsers") => Subject::AllUsers,
            ("serviceAccount", id) => Subject::ServiceAccount(id.to_string()),
            _ => return None,
        };
        Some(AccessBinding {
            role: self.role_id,
            subject,
        })
    }
}

/// Container revision.
#[derive(Debug, Clone, Deserialize)]
pub struct YcRevision {
    pub id: String,
    pub container_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub image: YcRevisionImage,
    #[serde(default)]
    pub resources: Option<YcRevisionResources>,
    #[serde(default)]
    pub execution_timeout: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub concurrency: Option<u64>,
}

/// Image section of a revision.
#[derive(Debug, Clone, Deserialize)]
pub struct YcRevisionImage {
    pub image_url: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Resources section of a revision.
#[derive(Debug, Clone, Deserialize)]
pub struct YcRevisionResources {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub memory: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub cores: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub core_fraction: Option<u64>,
}

impl From<YcRevision> for Revision {
    fn from(r: YcRevision) -> Self {
        let timeout_secs = r
            .execution_timeout
            .as_deref()
            .and_then(parse_duration_secs)
            .unwrap_or(0);
        let concurrency = r.concurrency.unwrap_or(1);
        let resources = r.resources.map(|res| RevisionResources {
            cores: to_u32(res.cores.unwrap_or(1)),
            core_fraction: to_u32(res.core_fraction.unwrap_or(100)),
            memory_mb: to_u32(res.memory.unwrap_or(0) / (1024 * 1024)),
            concurrency: to_u32(concurrency),
            timeout_secs,
        });

        Self {
            id: r.id,
            container_id: r.container_id,
            image: r.image.image_url,
            environment: r.image.environment,
            resources,
            created_at: r.created_at,
        }
    }
}

/// Lockbox secret list item.
#[derive(Debug, Clone, Deserialize)]
pub struct YcSecret {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<YcSecret> for SecretSummary {
    fn from(s: YcSecret) -> Self {
        Self {
            id: s.id,
            name: s.name,
        }
    }
}

/// Lockbox payload.
#[derive(Debug, Clone, Deserialize)]
pub struct YcPayload {
    #[serde(default)]
    pub entries: Vec<YcPayloadEntry>,
    #[serde(default, alias = "versionId")]
    pub version_id: Option<String>,
}

/// One payload entry. The text value may use either field name.
#[derive(Debug, Clone, Deserialize)]
pub struct YcPayloadEntry {
    pub key: String,
    #[serde(default)]
    pub text_value: Option<String>,
    #[serde(default, rename = "textValue")]
    pub text_value_camel: Option<String>,
}

impl From<YcPayload> for SecretPayload {
    fn from(p: YcPayload) -> Self {
        Self {
            version_id: p.version_id,
            entries: p
                .entries
                .into_iter()
                .map(|e| SecretEntry {
                    key: e.key,
                    value: e.text_value_camel.or(e.text_value),
                })
                .collect(),
        }
    }
}

/// Parse `"60s"` / `"1.5s"` into whole seconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_duration_secs(raw: &str) -> Option<u32> {
    let secs: f64 = raw.trim().trim_end_matches('s').parse().ok()?;
    if secs.is_sign_negative() || !secs.is_finite() {
        return None;
    }
    Some(secs.floor() as u32)
}

fn to_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// Accept integers encoded either as JSON numbers or as strings.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_parsing_with_string_integers() {
        let json = r#"{
            "id": "bba1",
            "container_id": "bba0",
            "created_at": "2026-10-01T12:00:00.123Z",
            "image": {
                "image_url": "cr.yandex/crp1/gateway:20261001120000",
                "environment": {"SECRET_ID": "e6q1", "RAG_SERVICE_URL": "https://rag.example"}
            },
            "resources": {"memory": "536870912", "cores": "1", "core_fraction": "100"},
            "execution_timeout": "60s",
            "concurrency": "4"
        }"#;

        let rev: Revision = serde_json::from_str::<YcRevision>(json).unwrap().into();
        assert_eq!(rev.image, "cr.yandex/crp1/gateway:20261001120000");
        assert_eq!(rev.environment.get("SECRET_ID").map(String::as_str), Some("e6q1"));
        let res = rev.resources.unwrap();
        assert_eq!(res.memory_mb, 512);
        assert_eq!(res.concurrency, 4);
        assert_eq!(res.timeout_secs, 60);
        assert!(rev.created_at.is_some());
    }

    #[test]
    fn test_payload_accepts_both_value_spellings() {
        let json = r#"{
            "entries": [
                {"key": "A", "text_value": "one"},
                {"key": "B", "textValue": "two"},
                {"key": "C", "binary_value": "AAEC"}
            ],
            "versionId": "v7"
        }"#;

        let payload: SecretPayload = serde_json::from_str::<YcPayload>(json).unwrap().into();
        assert_eq!(payload.version_id.as_deref(), Some("v7"));
        assert_eq!(payload.lines(), vec!["A=one", "B=two"]);
    }

    #[test]
    fn test_binding_subject_mapping() {
        let json = r#"[
            {"role_id": "serverless.containers.invoker", "subject": {"id": "allUsers", "type": "system"}},
            {"role_id": "lockbox.payloadViewer", "subject": {"id": "aje9", "type": "serviceAccount"}},
            {"role_id": "viewer", "subject": {"id": "u1", "type": "userAccount"}}
        ]"#;

        let bindings: Vec<AccessBinding> = serde_json::from_str::<Vec<YcAccessBinding>>(json)
            .unwrap()
            .into_iter()
            .filter_map(YcAccessBinding::into_binding)
            .collect();

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].subject, Subject::AllUsers);
        assert_eq!(bindings[1].subject, Subject::ServiceAccount("aje9".into()));
    }

    #[test]
    fn test_parse_duration_secs() {
        assert_eq!(parse_duration_secs("60s"), Some(60));
        assert_eq!(parse_duration_secs("1.5s"), Some(1));
        assert_eq!(parse_duration_secs("abc"), None);
    }
}
