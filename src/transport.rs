//! Thin HTTP transport over `reqwest`.
//!
//! Every call goes through [`HttpTransport::send`], which is where the two
//! process-wide hooks live:
//! - request side: a fresh bearer token is read from a [`CredentialSource`]
//!   at send time and overrides the shared default `Authorization` header;
//! - response side: a 401 on a session-bound request fans out to every
//!   registered [`UnauthorizedHandler`] before the error reaches the caller.
//!
//! The transport knows nothing about sessions; the session module plugs
//! into it at composition time.

use crate::error::{ClientError, Result};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

// ── Hooks ────────────────────────────────────────────────────────

/// Supplies the bearer token for outgoing requests. Called once per send.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Notified whenever a session-bound request comes back 401.
pub trait UnauthorizedHandler: Send + Sync {
    fn on_unauthorized(&self, path: &str);
}

// ── Requests ─────────────────────────────────────────────────────

/// A file attached to a multipart body.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Outgoing body. Only `Empty` and `Json` keep the default JSON content type;
/// form and multipart bodies let reqwest set their own (including the
/// multipart boundary).
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

impl RequestBody {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| ClientError::Decode(format!("request body: {e}")))
    }

    fn keeps_json_content_type(&self) -> bool {
        matches!(self, Self::Empty | Self::Json(_))
    }
}

/// One API call relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    pub query: Vec<(String, String)>,
    /// Attach the stored credential and evict on 401. Off only for the
    /// credential endpoints themselves.
    pub with_session: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            query: Vec::new(),
            with_session: true,
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

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Append a query-string pair; reqwest encodes it.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn without_session(mut self) -> Self {
        self.with_session = false;
        self
    }
}

// ── Responses ────────────────────────────────────────────────────

/// A successful (2xx) response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }
}

// ── Transport ────────────────────────────────────────────────────

/// Shared HTTP transport. One per application root.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    default_headers: RwLock<HeaderMap>,
    credentials: Option<Arc<dyn CredentialSource>>,
    unauthorized: RwLock<Vec<Arc<dyn UnauthorizedHandler>>>,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url` (which includes the `/api`
    /// prefix, e.g. `http://127.0.0.1:8000/api`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let mut defaults = HeaderMap::new();
        defaults.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers: RwLock::new(defaults),
            credentials: None,
            unauthorized: RwLock::new(Vec::new()),
        })
    }

    /// Read the bearer token from `source` on every session-bound send.
    pub fn with_credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(source);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Install `Bearer <token>` as the shared default authorization header.
    pub fn set_default_authorization(&self, token: &str) {
        match bearer_value(token) {
            Some(value) => {
                self.default_headers.write().insert(AUTHORIZATION, value);
            }
            None => tracing::warn!("Refusing to install a bearer token with invalid header characters"),
        }
    }

    pub fn clear_default_authorization(&self) {
        self.default_headers.write().remove(AUTHORIZATION);
    }

    /// Current default `Authorization` header value, if any.
    pub fn default_authorization(&self) -> Option<String> {
        self.default_headers
            .read()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Register a handler on the response pipeline.
    pub fn on_unauthorized(&self, handler: Arc<dyn UnauthorizedHandler>) {
        self.unauthorized.write().push(handler);
    }

    /// Read the stored token. Storage may touch disk, so the lookup runs on
    /// the blocking pool.
    pub(crate) async fn fresh_token(&self) -> Option<String> {
        let source = self.credentials.clone()?;
        match tokio::task::spawn_blocking(move || source.bearer_token()).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Credential lookup failed: {e}");
                None
            }
        }
    }

    /// Defaults, minus the JSON content type for form and multipart bodies,
    /// with `bearer` overriding the default `Authorization`.
    pub(crate) fn prepare_headers(&self, body: &RequestBody, bearer: Option<&str>) -> HeaderMap {
        let mut headers = self.default_headers.read().clone();

        if !body.keeps_json_content_type() {
            headers.remove(CONTENT_TYPE);
        }

        if let Some(value) = bearer.and_then(bearer_value) {
            headers.insert(AUTHORIZATION, value);
        }

        headers
    }

    /// Send a request. Non-2xx statuses come back as errors; a 401 on a
    /// session-bound request runs every unauthorized handler first.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let ApiRequest {
            method,
            path,
            body,
            query,
            with_session,
        } = request;

        let bearer = if with_session {
            self.fresh_token().await
        } else {
            None
        };
        let headers = self.prepare_headers(&body, bearer.as_deref());
        tracing::debug!(method = %method, path = %path, "Sending API request");

        let mut builder = self.http.request(method, self.url(&path)).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(pairs) => builder.form(&pairs),
            RequestBody::Multipart { fields, files } => {
                builder.multipart(multipart_form(fields, files)?)
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?.to_vec();

        if status.is_success() {
            return Ok(ApiResponse { body: bytes });
        }

        if with_session && status == StatusCode::UNAUTHORIZED {
            tracing::warn!(path = %path, "API rejected the session credential");
            self.notify_unauthorized(&path);
        }

        Err(ClientError::from_response(status, &bytes, with_session))
    }

    fn notify_unauthorized(&self, path: &str) {
        // Handlers may call back into the transport.
        let handlers = self.unauthorized.read().clone();
        for handler in handlers {
            handler.on_unauthorized(path);
        }
    }

    // ── Convenience ──────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path).body(RequestBody::json(body)?);
        self.send(request).await?.json()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::put(path).body(RequestBody::json(body)?);
        self.send(request).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self.send(ApiRequest::get(path)).await?.into_bytes())
    }
}

fn bearer_value(token: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
    value.set_sensitive(true);
    Some(value)
}

fn multipart_form(
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for file in files {
        let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(mime) = file.mime {
            part = part.mime_str(&mime)?;
        }
        form = form.part(file.field, part);
    }
    Ok(form)
}
