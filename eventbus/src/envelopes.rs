use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    Welcome,
    Verification,
    PasswordReset,
    Notification,
}

/// A queued email send, with enough self-describing state that a consumer
/// can republish it on failure without round-tripping through the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTask {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EmailKind,
    pub to: String,
    pub subject: String,
    pub template: String,
    pub variables: serde_json::Value,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
    pub retries: u32,
    pub max_retries: u32,
}

impl EmailTask {
    pub fn new(kind: EmailKind, to: impl Into<String>, subject: impl Into<String>, template: impl Into<String>, variables: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            to: to.into(),
            subject: subject.into(),
            template: template.into(),
            variables,
            priority: 2,
            timestamp: Utc::now(),
            retries: 0,
            max_retries: 3,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }

    /// Exponential-ish backoff: `retries * base_delay`, per the wire contract.
    pub fn backoff(&self, base_delay: std::time::Duration) -> std::time::Duration {
        base_delay * self.retries.max(1)
    }

    pub fn retried(mut self) -> Self {
        self.retries += 1;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAnnouncement {
    pub id: Uuid,
    pub message: String,
    pub severity: String,
    pub timestamp: DateTime<Utc>,
}
