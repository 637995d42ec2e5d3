// Session types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Notification emitted by the session refresh interceptor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "user")]
pub enum SessionEvent {
    /// The session was refreshed and the backend returned the current user
    #[serde(rename = "user-refreshed")]
    Refreshed(Value),

    /// The session could not be refreshed; listeners should sign the user out
    #[serde(rename = "auth-error")]
    AuthFailed,
}

impl SessionEvent {
    /// Wire name of the event, as presentation code knows it
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Refreshed(_) => "user-refreshed",
            SessionEvent::AuthFailed => "auth-error",
        }
    }
}

/// Body returned by `POST /refresh`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub user: Option<Value>,
}
