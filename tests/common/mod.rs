// Mock job board backend for integration tests
//
// Issues session cookies from the refresh endpoint and only serves the
// profile route to requests that carry a session it issued.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};

/// What the refresh endpoint does
#[derive(Clone, Debug)]
pub enum RefreshBehavior {
    /// Issue a new session cookie and return this body
    Grant(Value),

    /// Refuse with this status
    Reject(StatusCode),
}

pub struct MockState {
    pub refresh_behavior: RefreshBehavior,
    pub refresh_delay: Duration,
    pub refresh_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub admin_calls: AtomicUsize,

    /// When set, authorized profile responses wait for a notification
    pub replay_gate: Option<Arc<Notify>>,
    sessions: Mutex<HashSet<String>>,
}

impl MockState {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn admin_calls(&self) -> usize {
        self.admin_calls.load(Ordering::SeqCst)
    }
}

pub struct MockBackend {
    pub state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockBackend {
    pub async fn start(refresh_behavior: RefreshBehavior) -> Self {
        Self::start_with_delay(refresh_behavior, Duration::ZERO).await
    }

    pub async fn start_with_delay(refresh_behavior: RefreshBehavior, refresh_delay: Duration) -> Self {
        Self::start_with(refresh_behavior, refresh_delay, None).await
    }

    /// Hold every authorized profile response until `gate` is notified
    pub async fn start_gated(refresh_behavior: RefreshBehavior, gate: Arc<Notify>) -> Self {
        Self::start_with(refresh_behavior, Duration::ZERO, Some(gate)).await
    }

    async fn start_with(
        refresh_behavior: RefreshBehavior,
        refresh_delay: Duration,
        replay_gate: Option<Arc<Notify>>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(MockState {
            refresh_behavior,
            refresh_delay,
            refresh_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            admin_calls: AtomicUsize::new(0),
            replay_gate,
            sessions: Mutex::new(HashSet::new()),
        });

        let app = Router::new()
            .route("/api/public/refresh", post(handle_refresh))
            .route("/api/user/jobseeker/profile", get(handle_profile))
            .route("/api/admin/stats", get(handle_admin_stats))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            state,
            shutdown_tx: Some(shutdown_tx),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| pair.trim().strip_prefix("session=").map(str::to_string))
}

async fn handle_refresh(State(state): State<Arc<MockState>>) -> Response {
    let call = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

    if !state.refresh_delay.is_zero() {
        tokio::time::sleep(state.refresh_delay).await;
    }

    match &state.refresh_behavior {
        RefreshBehavior::Grant(body) => {
            let session = format!("s{}", call);
            state.sessions.lock().unwrap().insert(session.clone());
            (
                StatusCode::OK,
                [(header::SET_COOKIE, format!("session={}; Path=/; HttpOnly", session))],
                Json(body.clone()),
            )
                .into_response()
        }
        RefreshBehavior::Reject(status) => {
            (*status, Json(json!({"message": "refresh token expired"}))).into_response()
        }
    }
}

async fn handle_profile(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.profile_calls.fetch_add(1, Ordering::SeqCst);

    let authorized = session_cookie(&headers)
        .map(|s| state.sessions.lock().unwrap().contains(&s))
        .unwrap_or(false);

    if authorized {
        if let Some(gate) = &state.replay_gate {
            gate.notified().await;
        }
        (
            StatusCode::OK,
            Json(json!({"id": 1, "name": "Ada Lovelace", "headline": "Analytical engine programmer"})),
        )
            .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "session expired"}))).into_response()
    }
}

/// Always forbidden, even with a valid session
async fn handle_admin_stats(State(state): State<Arc<MockState>>) -> Response {
    state.admin_calls.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FORBIDDEN, Json(json!({"message": "admin role required"}))).into_response()
}
