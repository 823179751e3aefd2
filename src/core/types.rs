//! Common types used across harness modules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Identifier attached to every asynchronous plugin call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    /// Create a new random call id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of an asynchronous plugin method call, as delivered by the core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Correlation id
    pub id: CallId,
    /// Target plugin
    pub plugin: String,
    /// Invoked method
    pub method: String,
    /// Success flag reported by the core
    pub success: bool,
    /// Result payload or error message
    pub message: String,
    /// When the call was issued
    pub issued_at: Timestamp,
    /// When the callback fired
    pub completed_at: Timestamp,
}

impl CallOutcome {
    /// Round-trip latency in milliseconds.
    pub fn latency_ms(&self) -> i64 {
        (self.completed_at - self.issued_at).num_milliseconds()
    }

    /// Parse the message as JSON, falling back to a JSON string.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::from_str(&self.message)
            .unwrap_or_else(|_| serde_json::Value::String(self.message.clone()))
    }
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = if self.success { "✓" } else { "✗" };
        write!(f, "{mark} {}.{}: {}", self.plugin, self.method, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool, message: &str) -> CallOutcome {
        let issued_at = now();
        CallOutcome {
            id: CallId::new(),
            plugin: "waku_module".to_string(),
            method: "relayPublish".to_string(),
            success,
            message: message.to_string(),
            issued_at,
            completed_at: issued_at + chrono::Duration::milliseconds(25),
        }
    }

    #[test]
    fn test_call_ids_are_unique() {
        assert_ne!(CallId::new(), CallId::new());
    }

    #[test]
    fn test_outcome_payload_json() {
        let out = outcome(true, r#"{"ok":true}"#);
        assert_eq!(out.payload(), serde_json::json!({"ok": true}));
    }

    #[test]
    fn test_outcome_payload_plain_text() {
        let out = outcome(false, "plugin not loaded");
        assert_eq!(out.payload(), serde_json::json!("plugin not loaded"));
    }

    #[test]
    fn test_outcome_display_and_latency() {
        let out = outcome(true, "done");
        assert_eq!(out.to_string(), "✓ waku_module.relayPublish: done");
        assert_eq!(out.latency_ms(), 25);
    }
}
