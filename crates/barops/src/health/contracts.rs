//! Functional contracts per service role.
//!
//! Each evaluator takes the HTTP status and raw body and returns the pass
//! detail or the failure detail.

use reqwest::Method;
use serde_json::{json, Value};

use crate::graph::ServiceRole;

pub type Verdict = Result<String, String>;

/// One scripted request of a functional contract.
#[derive(Debug, Clone)]
pub struct ContractRequest {
    pub method: Method,
    pub path: &'static str,
    pub body: Option<Value>,
    pub evaluate: fn(u16, &str) -> Verdict,
}

/// Requests to send for a role. All of them run even when one fails.
/// Empty when the role has no functional contract.
#[must_use]
pub fn requests(role: ServiceRole) -> Vec<ContractRequest> {
    match role {
        ServiceRole::Gateway => vec![ContractRequest {
            method: Method::POST,
            path: "/bartender/ask",
            body: Some(json!({
                "query": "What goes into a classic mojito?",
                "with_moderation": true,
            })),
            evaluate: evaluate_gateway,
        }],
        ServiceRole::Retrieval => vec![
            ContractRequest {
                method: Method::GET,
                path: "/index/status",
                body: None,
                evaluate: evaluate_index_status,
            },
            ContractRequest {
                method: Method::POST,
                path: "/search",
                body: Some(json!({ "query": "mojito", "k": 3 })),
                evaluate: evaluate_search,
            },
        ],
        ServiceRole::Moderation => vec![ContractRequest {
            method: Method::POST,
            path: "/moderate",
            body: Some(json!({
                "text": "Could you recommend a cocktail with lime?",
                "is_input": true,
            })),
            evaluate: evaluate_moderation,
        }],
        ServiceRole::Embedding => vec![ContractRequest {
            method: Method::POST,
            path: "/embedding",
            body: Some(json!({ "text": "mojito" })),
            evaluate: evaluate_embedding,
        }],
        ServiceRole::Logging => vec![ContractRequest {
            method: Method::POST,
            path: "/log",
            body: Some(json!({
                "level": "INFO",
                "message": "barops functional check",
                "service": "barops",
            })),
            evaluate: evaluate_logging,
        }],
        ServiceRole::SecretStore | ServiceRole::Bot => Vec::new(),
    }
}

fn parse(status: u16, body: &str) -> Result<Value, String> {
    if !(200..300).contains(&status) {
        return Err(format!("HTTP {status}: {body}"));
    }
    serde_json::from_str(body).map_err(|_| format!("non-JSON response: {body}"))
}

/// Pass when the body has an `answer` or a `blocked` field.
///
/// # Errors
///
/// Fails with the raw body for any other shape.
pub fn evaluate_gateway(status: u16, body: &str) -> Verdict {
    let value = parse(status, body)?;
    if value.get("answer").is_some() {
        Ok("answer received".into())
    } else if value.get("blocked").is_some() {
        Ok("request blocked by moderation".into())
    } else {
        Err(format!("unexpected response: {body}"))
    }
}

/// Pass when the index exists and holds documents.
///
/// # Errors
///
/// Fails when the index is missing or empty.
pub fn evaluate_index_status(status: u16, body: &str) -> Verdict {
    let value = parse(status, body)?;
    let exists = value.get("exists").and_then(Value::as_bool).unwrap_or(false);
    let documents = value
        .get("documents_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if exists && documents > 0 {
        Ok(format!("index has {documents} documents"))
    } else {
        Err(format!("index not ready: {body}"))
    }
}

/// Pass when the search found something.
///
/// # Errors
///
/// Fails when there are no results.
pub fn evaluate_search(status: u16, body: &str) -> Verdict {
    let value = parse(status, body)?;
    let found = value
        .get("total_found")
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .or_else(|| {
            value
                .get("results")
                .and_then(Value::as_array)
                .map(|r| r.len() as u64)
        })
        .unwrap_or(0);
    if found > 0 {
        Ok(format!("search returned {found} results"))
    } else {
        Err(format!("search returned nothing: {body}"))
    }
}

/// Pass when a known-safe sample is judged safe.
///
/// # Errors
///
/// Fails when `is_safe` is missing or false.
pub fn evaluate_moderation(status: u16, body: &str) -> Verdict {
    let value = parse(status, body)?;
    if value.get("is_safe").and_then(Value::as_bool) == Some(true) {
        Ok("safe sample accepted".into())
    } else {
        Err(format!("safe sample rejected: {body}"))
    }
}

/// Pass when the embedding vector is non-empty.
///
/// # Errors
///
/// Fails on a missing or empty vector.
pub fn evaluate_embedding(status: u16, body: &str) -> Verdict {
    let value = parse(status, body)?;
    match value.get("embedding").and_then(Value::as_array) {
        Some(vector) if !vector.is_empty() => Ok(format!("{}-dim embedding", vector.len())),
        _ => Err(format!("no embedding in response: {body}")),
    }
}

/// Pass when the log write reports success.
///
/// # Errors
///
/// Fails when `success` is missing or false.
pub fn evaluate_logging(status: u16, body: &str) -> Verdict {
    let value = parse(status, body)?;
    if value.get("success").and_then(Value::as_bool) == Some(true) {
        let id = value.get("log_id").and_then(Value::as_str).unwrap_or("?");
        Ok(format!("log written ({id})"))
    } else {
        Err(format!("log write failed: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_answer_or_blocked_passes() {
        assert!(evaluate_gateway(200, r#"{"answer":"Rum, lime, mint."}"#).is_ok());
        assert!(evaluate_gateway(200, r#"{"blocked":true,"reason":"unsafe"}"#).is_ok());
    }

    #[test]
    fn test_gateway_other_shapes_fail_with_raw_body() {
        let err = evaluate_gateway(200, r#"{"detail":"oops"}"#).unwrap_err();
        assert!(err.contains(r#"{"detail":"oops"}"#));

        let err = evaluate_gateway(200, "<html>502 Bad Gateway</html>").unwrap_err();
        assert!(err.contains("<html>502 Bad Gateway</html>"));

        let err = evaluate_gateway(500, "boom").unwrap_err();
        assert!(err.contains("boom"));
    }

    #[test]
    fn test_retrieval_contracts() {
        assert!(evaluate_index_status(200, r#"{"exists":true,"documents_count":12}"#).is_ok());
        assert!(evaluate_index_status(200, r#"{"exists":true,"documents_count":0}"#).is_err());
        assert!(evaluate_index_status(200, r#"{"exists":false}"#).is_err());

        assert!(evaluate_search(200, r#"{"results":[],"total_found":2}"#).is_ok());
        assert!(evaluate_search(200, r#"{"results":[{"text":"mojito"}]}"#).is_ok());
        assert!(evaluate_search(200, r#"{"results":[],"total_found":0}"#).is_err());
    }

    #[test]
    fn test_simple_contracts() {
        assert!(evaluate_moderation(200, r#"{"is_safe":true}"#).is_ok());
        assert!(evaluate_moderation(200, r#"{"is_safe":false}"#).is_err());
        assert!(evaluate_embedding(200, r#"{"embedding":[0.1,0.2],"dimension":2}"#).is_ok());
        assert!(evaluate_embedding(200, r#"{"embedding":[]}"#).is_err());
        assert!(evaluate_logging(200, r#"{"success":true,"log_id":"abc"}"#).is_ok());
        assert!(evaluate_logging(200, r#"{"success":false}"#).is_err());
    }

    #[test]
    fn test_roles_without_contract() {
        assert!(requests(ServiceRole::SecretStore).is_empty());
        assert!(requests(ServiceRole::Bot).is_empty());
        assert_eq!(requests(ServiceRole::Retrieval).len(), 2);
    }
}
