use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{error_kind, ApiError};
use crate::session::{Recovery, SessionRefresher};

/// Base address and credential policy for one backend domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: String,
    with_credentials: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, with_credentials: bool) -> Self {
        Self {
            base_url: base_url.into(),
            with_credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether cookies from the shared jar go out with every request
    pub fn with_credentials(&self) -> bool {
        self.with_credentials
    }
}

/// Request body variants
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Bytes(Bytes),
}

/// An outgoing request, owned by the caller until it is sent.
///
/// Everything except the `retried` marker is fixed once the descriptor is
/// built. The marker flips at most once, through [`RequestDescriptor::mark_retried`],
/// and that is what bounds session refresh to a single replay per request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    id: Uuid,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<RequestBody>,
    retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON payload
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    /// Correlation id used in log events
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Set the retried marker. Returns `true` only for the call that flips it.
    pub fn mark_retried(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }
}

/// A successful (2xx) response with its body fully read
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP client bound to one backend domain.
///
/// Clients for authenticated domains carry a [`SessionRefresher`]; a 401 or 403
/// on a first attempt is then recovered by refreshing the session and replaying
/// the request once. The public client carries none.
#[derive(Clone, Debug)]
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    http: Client,

    config: ClientConfig,

    refresher: Option<Arc<SessionRefresher>>,
}

impl ApiClient {
    /// Create a client without session interception
    pub fn new(config: ClientConfig, http: Client) -> Self {
        Self {
            http,
            config,
            refresher: None,
        }
    }

    /// Attach the session refresh interceptor
    pub fn with_refresher(mut self, refresher: Arc<SessionRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_intercepted(&self) -> bool {
        self.refresher.is_some()
    }

    /// Send a request, recovering from an expired session when intercepted
    pub async fn send(&self, mut request: RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let result = self.execute(&request).await;

        let refresher = match &self.refresher {
            Some(refresher) => refresher,
            None => return result,
        };

        match result {
            Err(err) if err.is_auth_failure() => match refresher.recover(&mut request, err).await {
                Recovery::Replay => {
                    tracing::debug!(
                        request_id = %request.id(),
                        path = request.path(),
                        "Replaying request after session refresh"
                    );
                    self.execute(&request).await
                }
                Recovery::Propagate(err) => Err(err),
            },
            other => other,
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::delete(path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::post(path).json(body)?).await
    }

    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::put(path).json(body)?).await
    }

    pub async fn patch_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.send(RequestDescriptor::patch(path).json(body)?).await
    }

    /// GET and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.json()
    }

    /// Resolve a request path against this client's base address
    pub fn url_for(&self, path: &str) -> Result<Url, ApiError> {
        let joined = join_url(&self.config.base_url, path);
        Url::parse(&joined)
            .map_err(|e| ApiError::InvalidRequest(format!("{}: {}", joined, e)))
    }

    /// Perform a single round trip, without any interception
    pub(crate) async fn execute(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(request.path())?;

        tracing::debug!(
            request_id = %request.id(),
            method = %request.method(),
            url = %url,
            retried = request.is_retried(),
            "Sending HTTP request"
        );

        let mut builder = self
            .http
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone());

        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }

        builder = match request.body() {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(
                request_id = %request.id(),
                error_kind = error_kind(&e),
                error = %e,
                url = %url,
                "HTTP request error"
            );
            ApiError::from(e)
        })?;

        let status = response.status();
        let headers = response.headers().clone();

        if status.is_success() {
            let body = response.bytes().await?;
            tracing::debug!(
                request_id = %request.id(),
                status = %status,
                "Request successful"
            );
            return Ok(ApiResponse::new(status, headers, body));
        }

        let error_text = response.text().await.unwrap_or_default();

        tracing::warn!(
            request_id = %request.id(),
            status = status.as_u16(),
            url = %url,
            response_body = %error_text,
            "Received error response"
        );

        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_text,
        })
    }
}

/// Join a base address and a request path with exactly one separating slash
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}
