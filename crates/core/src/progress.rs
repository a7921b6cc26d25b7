//! Progress state values shared by trackers, sinks and transports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress status.
///
/// The three well-known states are modelled explicitly; anything else a
/// caller invents travels as [`Status::Custom`] and is not validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    /// Work is in progress
    #[default]
    Active,
    /// Work hit an error
    Exception,
    /// Work finished successfully
    Success,
    /// Caller-defined status
    Custom(String),
}

impl Status {
    /// Get string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Status::Active => "active",
            Status::Exception => "exception",
            Status::Success => "success",
            Status::Custom(s) => s,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s {
            "active" => Status::Active,
            "exception" => Status::Exception,
            "success" => Status::Success,
            other => Status::Custom(other.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" | "exception" | "success" => Status::from(s.as_str()),
            _ => Status::Custom(s),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// Message attached to a progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Plain text, logged verbatim
    Text(String),
    /// Any structured value, logged as JSON text
    Structured(serde_json::Value),
}

impl Message {
    /// Serialize any value into a structured message.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Message::Structured(serde_json::to_value(value)?))
    }

    /// Text form used by line-oriented log output.
    ///
    /// Serialization failures yield an empty string.
    pub fn to_log_text(&self) -> String {
        match self {
            Message::Text(text) => text.clone(),
            Message::Structured(value) => serde_json::to_string(value).unwrap_or_default(),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        Message::Structured(value)
    }
}

/// The effective `(percent, status, message)` triple of a tracker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Completion percentage
    pub percent: i32,
    /// Current status
    pub status: Status,
    /// Last message, if any
    pub message: Option<Message>,
}

impl ProgressSnapshot {
    /// Create a snapshot.
    pub fn new(percent: i32, status: Status, message: Option<Message>) -> Self {
        Self {
            percent,
            status,
            message,
        }
    }
}

/// Payload delivered to transports and subscribers.
///
/// Serializes as `{"percent": .., "status": "..", "message": .., "code": ".."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Completion percentage
    pub percent: i32,
    /// Status string
    pub status: Status,
    /// Message (null when absent)
    pub message: Option<Message>,
    /// Code of the reporting tracker
    pub code: String,
}

impl ProgressPayload {
    /// Build a payload for `code` from a snapshot.
    pub fn new(code: impl Into<String>, snapshot: ProgressSnapshot) -> Self {
        Self {
            percent: snapshot.percent,
            status: snapshot.status,
            message: snapshot.message,
            code: code.into(),
        }
    }

    /// The snapshot part of the payload.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(self.percent, self.status.clone(), self.message.clone())
    }
}

/// Format the fallback log line for a payload.
pub fn format_progress_line(payload: &ProgressPayload) -> String {
    let message = payload
        .message
        .as_ref()
        .map(Message::to_log_text)
        .unwrap_or_default();
    format!(
        "Progress({}) : percent = {}%, status = {}, message = {}",
        payload.code, payload.percent, payload.status, message
    )
}
