// Session refresh interceptor

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::events::SessionEvents;
use super::types::{RefreshResponse, SessionEvent};
use crate::error::ApiError;
use crate::http_client::{ApiClient, RequestDescriptor};

/// Refresh endpoint, relative to the public client's base address
pub const REFRESH_PATH: &str = "/refresh";

/// How concurrent auth failures share refresh attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Every failing request refreshes on its own
    #[default]
    Independent,

    /// Refreshes run one at a time; a request that waited on a refresh which
    /// succeeded replays without refreshing again
    Coalesced,
}

/// Outcome of intercepting an auth failure
pub(crate) enum Recovery {
    /// Session refreshed, resubmit the original request
    Replay,

    /// Hand this error to the caller
    Propagate(ApiError),
}

/// Recovers from expired sessions by calling the refresh endpoint.
///
/// Holds the public (non-intercepted) client so the refresh call itself can
/// never be intercepted. The only side effects are the two session events.
#[derive(Debug)]
pub struct SessionRefresher {
    public: ApiClient,
    events: SessionEvents,
    mode: RefreshMode,

    /// Serializes refreshes in coalesced mode
    gate: Mutex<()>,

    /// Count of successful refreshes
    generation: AtomicU64,
}

impl SessionRefresher {
    pub fn new(public: ApiClient, events: SessionEvents, mode: RefreshMode) -> Self {
        Self {
            public,
            events,
            mode,
            gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Number of refreshes that have succeeded so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// True when the last path segment of the request is the refresh endpoint
    pub fn is_refresh_request(request: &RequestDescriptor) -> bool {
        let endpoint = REFRESH_PATH.trim_matches('/');
        request
            .path()
            .trim_matches('/')
            .rsplit('/')
            .next()
            .is_some_and(|segment| segment == endpoint)
    }

    /// Decide what to do with an auth failure on `request`.
    ///
    /// Marks the request retried before refreshing, so a replay that fails
    /// again comes straight back to the caller.
    pub(crate) async fn recover(&self, request: &mut RequestDescriptor, error: ApiError) -> Recovery {
        if Self::is_refresh_request(request) {
            tracing::debug!(
                request_id = %request.id(),
                "Auth failure on refresh endpoint, not intercepting"
            );
            return Recovery::Propagate(error);
        }

        if !request.mark_retried() {
            tracing::debug!(
                request_id = %request.id(),
                path = request.path(),
                "Auth failure on replayed request, giving up"
            );
            return Recovery::Propagate(error);
        }

        tracing::warn!(
            request_id = %request.id(),
            path = request.path(),
            status = ?error.status(),
            "Received auth failure, refreshing session and retrying..."
        );

        match self.refresh().await {
            Ok(_) => Recovery::Replay,
            Err(refresh_err) => Recovery::Propagate(refresh_err),
        }
    }

    /// Refresh the session, honoring the configured [`RefreshMode`].
    ///
    /// Returns the user payload when this call performed the refresh and the
    /// backend sent one. A coalesced call that reused another refresh returns
    /// `Ok(None)`.
    pub async fn refresh(&self) -> Result<Option<Value>, ApiError> {
        match self.mode {
            RefreshMode::Independent => self.refresh_session().await,
            RefreshMode::Coalesced => {
                let observed = self.generation();
                let _guard = self.gate.lock().await;

                if self.generation() != observed {
                    tracing::debug!("Session already refreshed while waiting, reusing it");
                    return Ok(None);
                }

                self.refresh_session().await
            }
        }
    }

    /// One round trip to the refresh endpoint, never intercepted
    async fn refresh_session(&self) -> Result<Option<Value>, ApiError> {
        tracing::debug!("Refreshing session...");

        let request = RequestDescriptor::post(REFRESH_PATH);
        let response = match self.public.execute(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Session refresh failed: {}", e);
                self.events.emit(SessionEvent::AuthFailed);
                return Err(e);
            }
        };

        self.generation.fetch_add(1, Ordering::AcqRel);

        // A body that is not JSON still means the session cookie was renewed
        let payload = response.json::<RefreshResponse>().unwrap_or_default();

        match payload.user {
            Some(user) => {
                tracing::info!("Session refreshed");
                self.events.emit(SessionEvent::Refreshed(user.clone()));
                Ok(Some(user))
            }
            None => {
                tracing::info!("Session refreshed (no user in response)");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::ClientConfig;
    use std::sync::Arc;

    fn refresher(origin: &str, mode: RefreshMode) -> SessionRefresher {
        let public = ApiClient::new(
            ClientConfig::new(format!("{}/api/public", origin), true),
            reqwest::Client::new(),
        );
        SessionRefresher::new(public, SessionEvents::default(), mode)
    }

    #[test]
    fn test_is_refresh_request() {
        assert!(SessionRefresher::is_refresh_request(&RequestDescriptor::post("/refresh")));
        assert!(SessionRefresher::is_refresh_request(&RequestDescriptor::post("refresh")));
        assert!(SessionRefresher::is_refresh_request(&RequestDescriptor::post("refresh/")));
        assert!(SessionRefresher::is_refresh_request(&RequestDescriptor::post("//refresh//")));
        assert!(SessionRefresher::is_refresh_request(&RequestDescriptor::post(
            "/session/refresh"
        )));
        assert!(!SessionRefresher::is_refresh_request(&RequestDescriptor::get("/profile")));
        assert!(!SessionRefresher::is_refresh_request(&RequestDescriptor::post(
            "/token-refresh"
        )));
        assert!(!SessionRefresher::is_refresh_request(&RequestDescriptor::post(
            "/refresh/history"
        )));
        assert!(!SessionRefresher::is_refresh_request(&RequestDescriptor::post("")));
    }

    #[test]
    fn test_default_mode_is_independent() {
        assert_eq!(RefreshMode::default(), RefreshMode::Independent);
    }

    #[tokio::test]
    async fn test_refresh_success_emits_user() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/public/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"user":{"id":1}}"#)
            .expect(1)
            .create_async()
            .await;

        let refresher = refresher(&server.url(), RefreshMode::Independent);
        let mut sub = refresher.events().subscribe();

        let user = refresher.refresh().await.unwrap();
        assert_eq!(user, Some(serde_json::json!({"id": 1})));
        assert_eq!(refresher.generation(), 1);
        assert_eq!(
            sub.try_recv(),
            Some(SessionEvent::Refreshed(serde_json::json!({"id": 1})))
        );

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_without_user_emits_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/public/refresh")
            .with_status(204)
            .create_async()
            .await;

        let refresher = refresher(&server.url(), RefreshMode::Independent);
        let mut sub = refresher.events().subscribe();

        assert_eq!(refresher.refresh().await.unwrap(), None);
        assert_eq!(refresher.generation(), 1);
        assert_eq!(sub.try_recv(), None);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_failure_emits_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/public/refresh")
            .with_status(401)
            .with_body("refresh token expired")
            .create_async()
            .await;

        let refresher = refresher(&server.url(), RefreshMode::Coalesced);
        let mut sub = refresher.events().subscribe();

        let err = refresher.refresh().await.unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "refresh token expired");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(refresher.generation(), 0);
        assert_eq!(sub.try_recv(), Some(SessionEvent::AuthFailed));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_call_bypasses_interception_on_public_client() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/public/refresh")
            .with_status(401)
            .with_body("refresh token expired")
            .expect(1)
            .create_async()
            .await;

        // Wire the public client with an interceptor of its own; the refresh
        // round trip must still go out exactly once and never recurse
        let inner = Arc::new(refresher(&server.url(), RefreshMode::Independent));
        let public = ApiClient::new(
            ClientConfig::new(format!("{}/api/public", server.url()), true),
            reqwest::Client::new(),
        )
        .with_refresher(inner.clone());
        let outer = SessionRefresher::new(public, SessionEvents::default(), RefreshMode::Independent);
        let mut inner_events = inner.events().subscribe();

        let err = outer.refresh().await.unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
        assert_eq!(inner.generation(), 0);
        assert_eq!(inner_events.try_recv(), None);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_recover_skips_already_retried() {
        let refresher = refresher("http://127.0.0.1:9", RefreshMode::Independent);
        let mut request = RequestDescriptor::get("/profile");
        request.mark_retried();

        let original = ApiError::Status {
            status: 401,
            message: "expired".to_string(),
        };
        match refresher.recover(&mut request, original).await {
            Recovery::Propagate(ApiError::Status { status, .. }) => assert_eq!(status, 401),
            _ => panic!("retried request must not be recovered"),
        }
        assert_eq!(refresher.generation(), 0);
    }

    #[tokio::test]
    async fn test_recover_skips_refresh_endpoint() {
        let refresher = refresher("http://127.0.0.1:9", RefreshMode::Independent);
        let mut request = RequestDescriptor::post("/refresh");

        let original = ApiError::Status {
            status: 403,
            message: "forbidden".to_string(),
        };
        match refresher.recover(&mut request, original).await {
            Recovery::Propagate(ApiError::Status { status, .. }) => assert_eq!(status, 403),
            _ => panic!("refresh endpoint must not be recovered"),
        }
        assert!(!request.is_retried());
    }
}
