//! Inbound registry notifications.
//!
//! Notifications arrive either as a bare Artifact Registry payload or wrapped
//! in a Pub/Sub push envelope. Both normalize into one [`ChangeEvent`].

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WatcherError};

pub const ACTION_INSERT: &str = "INSERT";
pub const ACTION_DELETE: &str = "DELETE";

/// Registry notification payload.
/// See https://cloud.google.com/artifact-registry/docs/configure-notifications#examples
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Notification {
    pub action: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub digest: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tag: String,
}

/// Explicit `null` reads as an empty field, like an absent one.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Message as delivered by a Pub/Sub push subscription.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Base64 string for real push deliveries; inline JSON is accepted too.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub ordering_key: Option<String>,
    #[serde(default)]
    pub publish_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PubsubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Canonical, source-agnostic change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert { tag: String, digest: String },
    Delete { tag: String, digest: String },
    Other { action: String },
}

impl ChangeEvent {
    pub fn action(&self) -> &str {
        match self {
            Self::Insert { .. } => ACTION_INSERT,
            Self::Delete { .. } => ACTION_DELETE,
            Self::Other { action } => action,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Insert { tag, .. } | Self::Delete { tag, .. } => tag,
            Self::Other { .. } => "",
        }
    }
}

impl From<Notification> for ChangeEvent {
    fn from(n: Notification) -> Self {
        match n.action.as_str() {
            ACTION_INSERT => Self::Insert {
                tag: n.tag,
                digest: n.digest,
            },
            ACTION_DELETE => Self::Delete {
                tag: n.tag,
                digest: n.digest,
            },
            _ => Self::Other { action: n.action },
        }
    }
}

/// Decode a raw request body into a [`ChangeEvent`], unwrapping a push
/// envelope first when present.
pub fn normalize(body: &[u8]) -> Result<ChangeEvent> {
    let value: Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(WatcherError::decode("event body is not a JSON object"));
    }

    let notification = if value.get("message").is_some() {
        let envelope: PushEnvelope = serde_json::from_value(value)?;
        decode_message_data(&envelope.message)?
    } else {
        serde_json::from_value::<Notification>(value)?
    };

    Ok(notification.into())
}

/// Second decoding pass over the envelope's `data` field.
fn decode_message_data(message: &PubsubMessage) -> Result<Notification> {
    match &message.data {
        None | Some(Value::Null) => Err(WatcherError::decode("push message has no data")),
        Some(Value::String(encoded)) if encoded.is_empty() => {
            Err(WatcherError::decode("push message has no data"))
        }
        Some(Value::String(encoded)) => match STANDARD.decode(encoded.as_bytes()) {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            // Some senders put the JSON text in `data` without encoding it.
            Err(_) => Ok(serde_json::from_str(encoded).map_err(|e| {
                WatcherError::decode(format!("message data is neither base64 nor JSON: {}", e))
            })?),
        },
        Some(inline @ Value::Object(_)) => Ok(serde_json::from_value(inline.clone())?),
        Some(other) => Err(WatcherError::decode(format!(
            "unsupported message data type: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(data: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "message": {
                "attributes": {"origin": "registry"},
                "data": data,
                "messageId": "1234",
                "publishTime": "2024-01-01T00:00:00Z"
            },
            "subscription": "projects/p/subscriptions/s"
        }))
        .unwrap()
    }

    #[test]
    fn test_normalize_bare_insert() {
        let body = br#"{"action":"INSERT","tag":"repo/base:latest","digest":"repo/base@sha256:d1"}"#;
        let event = normalize(body).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Insert {
                tag: "repo/base:latest".to_string(),
                digest: "repo/base@sha256:d1".to_string(),
            }
        );
        assert_eq!(event.action(), "INSERT");
    }

    #[test]
    fn test_normalize_envelope_base64() {
        let inner = br#"{"action":"DELETE","tag":"repo/app:v1","digest":"sha256:aa"}"#;
        let body = envelope(Value::String(STANDARD.encode(inner)));
        let event = normalize(&body).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Delete {
                tag: "repo/app:v1".to_string(),
                digest: "sha256:aa".to_string(),
            }
        );
    }

    #[test]
    fn test_normalize_envelope_inline_object() {
        let body = envelope(json!({"action": "INSERT", "digest": "sha256:bb"}));
        let event = normalize(&body).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Insert {
                tag: String::new(),
                digest: "sha256:bb".to_string(),
            }
        );
    }

    #[test]
    fn test_normalize_envelope_raw_json_string() {
        let body = envelope(Value::String(r#"{"action":"INSERT","tag":"t","digest":"d"}"#.into()));
        assert!(matches!(normalize(&body).unwrap(), ChangeEvent::Insert { .. }));
    }

    #[test]
    fn test_normalize_null_fields_read_as_empty() {
        let event = normalize(br#"{"action":"INSERT","tag":null,"digest":null}"#).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Insert {
                tag: String::new(),
                digest: String::new(),
            }
        );
    }

    #[test]
    fn test_normalize_unknown_action() {
        let event = normalize(br#"{"action":"UPDATE","tag":"t"}"#).unwrap();
        assert_eq!(
            event,
            ChangeEvent::Other {
                action: "UPDATE".to_string()
            }
        );
        assert_eq!(event.tag(), "");
    }

    #[test]
    fn test_normalize_action_is_case_sensitive() {
        let event = normalize(br#"{"action":"insert","tag":"t","digest":"d"}"#).unwrap();
        assert!(matches!(event, ChangeEvent::Other { .. }));
    }

    #[test]
    fn test_normalize_rejects_invalid_json() {
        assert!(matches!(normalize(b"not json"), Err(WatcherError::Decode(_))));
        assert!(matches!(normalize(b"[1,2]"), Err(WatcherError::Decode(_))));
    }

    #[test]
    fn test_normalize_rejects_missing_action() {
        let result = normalize(br#"{"tag":"t","digest":"d"}"#);
        assert!(matches!(result, Err(WatcherError::Decode(_))));
    }

    #[test]
    fn test_normalize_rejects_envelope_without_data() {
        let body = serde_json::to_vec(&json!({"message": {"messageId": "1"}})).unwrap();
        assert!(matches!(normalize(&body), Err(WatcherError::Decode(_))));

        let body = envelope(Value::String(String::new()));
        assert!(matches!(normalize(&body), Err(WatcherError::Decode(_))));
    }

    #[test]
    fn test_normalize_rejects_undecodable_data() {
        let body = envelope(Value::String("!!!not-base64-or-json".into()));
        assert!(matches!(normalize(&body), Err(WatcherError::Decode(_))));

        let body = envelope(json!(42));
        assert!(matches!(normalize(&body), Err(WatcherError::Decode(_))));
    }
}
