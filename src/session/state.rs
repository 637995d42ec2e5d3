// Session state tracker
// Listener that keeps the last known user and auth status

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::events::SessionSubscription;
use super::types::SessionEvent;

/// Authentication status as seen by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// Nothing observed yet
    Unknown,
    Authenticated,
    SignedOut,
}

/// Point-in-time copy of the tracked session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: AuthStatus,
    pub user: Option<Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: AuthStatus::Unknown,
            user: None,
            updated_at: None,
        }
    }
}

/// Cached user state, updated from session events
#[derive(Clone, Default)]
pub struct SessionState {
    inner: Arc<RwLock<SessionSnapshot>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user obtained outside the refresh flow (e.g. after login)
    pub async fn set_user(&self, user: Value) {
        let mut state = self.inner.write().await;
        state.status = AuthStatus::Authenticated;
        state.user = Some(user);
        state.updated_at = Some(Utc::now());
    }

    /// Apply one session event
    pub async fn apply(&self, event: &SessionEvent) {
        let mut state = self.inner.write().await;
        match event {
            SessionEvent::Refreshed(user) => {
                state.status = AuthStatus::Authenticated;
                state.user = Some(user.clone());
            }
            SessionEvent::AuthFailed => {
                state.status = AuthStatus::SignedOut;
                state.user = None;
            }
        }
        state.updated_at = Some(Utc::now());
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().await.clone()
    }

    /// Follow a subscription until its hub goes away
    pub fn track(&self, mut subscription: SessionSubscription) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                tracing::debug!(event = event.name(), "Session state updated");
                state.apply(&event).await;
            }
        })
    }
}
