//! Content fingerprints and conditional-response decisions.
//!
//! Transport independent: the HTTP layer maps these onto `ETag`,
//! `If-None-Match` and `Cache-Control`.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Serialize `payload` to JSON with object keys sorted at every depth.
///
/// Two maps with the same pairs serialize to the same bytes whatever their
/// internal ordering.
pub fn canonical_json<T: Serialize>(payload: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = canonicalize(serde_json::to_value(payload)?);
    serde_json::to_vec(&value)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(String, Value)> = object.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Quoted SHA-256 entity tag over the serialized payload.
pub fn compute_fingerprint(canonical: &[u8]) -> String {
    let digest = Sha256::digest(canonical);
    format!("\"{}\"", hex::encode(digest))
}

/// True when the client already holds the current representation.
pub fn is_fresh(client_token: Option<&str>, current_token: &str) -> bool {
    client_token == Some(current_token)
}

/// `Cache-Control` value for a payload that stays valid for `ttl`.
pub fn cache_control(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    format!(
        "public, max-age={secs}, s-maxage={secs}, stale-while-revalidate={secs}, stale-if-error={secs}"
    )
}

/// Result of a conditional read.
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T> {
    Modified { payload: T, etag: String },
    NotModified { etag: String },
}

impl<T: Serialize> Conditional<T> {
    /// Fingerprint `payload` and compare it with the token the client sent.
    pub fn evaluate(payload: T, client_token: Option<&str>) -> Result<Self, serde_json::Error> {
        let etag = compute_fingerprint(&canonical_json(&payload)?);
        if is_fresh(client_token, &etag) {
            Ok(Conditional::NotModified { etag })
        } else {
            Ok(Conditional::Modified { payload, etag })
        }
    }
}

impl<T> Conditional<T> {
    pub fn etag(&self) -> &str {
        match self {
            Conditional::Modified { etag, .. } | Conditional::NotModified { etag } => etag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn fingerprint<T: Serialize>(payload: &T) -> String {
        compute_fingerprint(&canonical_json(payload).unwrap())
    }

    #[test]
    fn test_deterministic_same_payload() {
        let payload = json!({"base": "EUR", "rates": {"USD": 1.0823}});
        assert_eq!(fingerprint(&payload), fingerprint(&payload));
    }

    #[test]
    fn test_different_payloads_different_etags() {
        let a = json!({"base": "EUR", "rates": {"USD": 1.0823}});
        let b = json!({"base": "EUR", "rates": {"USD": 1.0824}});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_insertion_order_independent() {
        let mut first = HashMap::new();
        first.insert("USD".to_string(), 1.08);
        first.insert("GBP".to_string(), 0.85);
        first.insert("JPY".to_string(), 161.0);

        let mut second = HashMap::new();
        second.insert("JPY".to_string(), 161.0);
        second.insert("USD".to_string(), 1.08);
        second.insert("GBP".to_string(), 0.85);

        assert_eq!(
            canonical_json(&first).unwrap(),
            canonical_json(&second).unwrap()
        );
        assert_eq!(fingerprint(&first), fingerprint(&second));
    }

    #[test]
    fn test_nested_keys_sorted() {
        let payload = json!({"rates": {"USD": 1.08, "GBP": 0.85}, "base": "EUR"});
        let bytes = canonical_json(&payload).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"base":"EUR","rates":{"GBP":0.85,"USD":1.08}}"#
        );
    }

    #[test]
    fn test_fingerprint_is_quoted_sha256() {
        let etag = compute_fingerprint(b"{}");
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag.len(), 64 + 2);
        assert_eq!(
            etag,
            "\"44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a\""
        );
    }

    #[test]
    fn test_is_fresh_exact_match_only() {
        let current = "\"abc\"";
        assert!(is_fresh(Some("\"abc\""), current));
        assert!(!is_fresh(Some("abc"), current));
        assert!(!is_fresh(Some("W/\"abc\""), current));
        assert!(!is_fresh(Some(""), current));
        assert!(!is_fresh(None, current));
    }

    #[test]
    fn test_cache_control() {
        assert_eq!(
            cache_control(Duration::from_secs(86400)),
            "public, max-age=86400, s-maxage=86400, stale-while-revalidate=86400, stale-if-error=86400"
        );
    }

    #[test]
    fn test_conditional_evaluate() {
        let payload = json!({"base": "EUR"});
        let first = Conditional::evaluate(payload.clone(), None).unwrap();
        let etag = first.etag().to_string();
        assert!(matches!(first, Conditional::Modified { .. }));

        let second = Conditional::evaluate(payload.clone(), Some(&etag)).unwrap();
        assert_eq!(second, Conditional::NotModified { etag: etag.clone() });

        let changed = Conditional::evaluate(json!({"base": "USD"}), Some(&etag)).unwrap();
        assert!(matches!(changed, Conditional::Modified { .. }));
    }
}
