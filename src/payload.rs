//! Typed notification payload for CLI-initiated broadcasts.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};

/// Notification content, serialized to JSON and sealed into the push body.
///
/// The service worker on the receiving end reads these fields to render
/// the notification. HTTP-triggered broadcasts forward arbitrary JSON
/// instead; this type backs the `send` subcommand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Notification title.
    pub title: String,
    /// Body text shown under the title.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Icon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Free-form data passed through to the service worker.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl NotificationPayload {
    /// Serialize to the JSON bytes that get sealed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_omits_empty_fields() {
        let payload = NotificationPayload {
            title: "Build finished".to_string(),
            ..NotificationPayload::default()
        };
        let json = String::from_utf8(payload.to_bytes().expect("serialize")).expect("utf8");
        assert_eq!(json, r#"{"title":"Build finished"}"#);
    }

    #[test]
    fn test_payload_roundtrip_with_data() {
        let mut data = serde_json::Map::new();
        data.insert("url".to_string(), serde_json::json!("/builds/17"));

        let payload = NotificationPayload {
            title: "Build finished".to_string(),
            body: "17 passed, 0 failed".to_string(),
            icon: Some("https://ci.example.com/icon.png".to_string()),
            data,
        };
        let bytes = payload.to_bytes().expect("serialize");
        let loaded: NotificationPayload = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(payload, loaded);
    }
}
