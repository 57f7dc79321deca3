//! API client for the Ignite Gym REST backend.
//!
//! This module provides the `ApiClient` struct: unauthenticated session and
//! account creation calls, plus authenticated calls that carry the bearer
//! token installed by the session manager.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::types::{SessionRequest, SignUpRequest};
use super::{ApiError, InvalidationRegistry, NetworkLayer, ProfileUpdate, SessionResponse};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the Ignite Gym backend.
/// Clone is cheap - clones share the connection pool, the bearer token slot
/// and the invalidation registry.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    token: Arc<RwLock<Option<String>>>,
    invalidation: InvalidationRegistry,
}

impl ApiClient {
    /// Create a new API client for the given base URL
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            token: Arc::new(RwLock::new(None)),
            invalidation: InvalidationRegistry::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a bearer token is currently attached
    pub fn has_token(&self) -> bool {
        self.current_token().is_some()
    }

    /// URL of a user's avatar image
    pub fn avatar_url(&self, avatar: &str) -> String {
        format!("{}/avatar/{}", self.base_url, avatar)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn current_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn auth_headers(&self, token: Option<&str>) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("Token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request, backing off and retrying while the server answers 429.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> Result<RequestBuilder, ApiError>,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()?.send().await?;

            if response.status() != reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    /// Unauthenticated JSON request
    async fn send_public<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let response = self
            .send_with_retry(&url, || Ok(self.client.request(method.clone(), &url).json(body)))
            .await?;
        Self::check_response(response).await
    }

    /// Authenticated JSON request.
    ///
    /// A 401 for the token that is still attached means the session is no
    /// longer usable; the invalidation registry is fired before the error
    /// returns. A 401 for a token that was replaced while the request was in
    /// flight says nothing about the current session and is only reported.
    async fn send_authenticated<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let token = self.current_token();

        let response = self
            .send_with_retry(&url, || {
                let mut request = self
                    .client
                    .request(method.clone(), &url)
                    .headers(self.auth_headers(token.as_deref())?);
                if let Some(body) = body {
                    request = request.json(body);
                }
                Ok(request)
            })
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED && token.is_some() {
            if self.current_token() == token {
                warn!(url = %url, "Bearer token rejected");
                self.invalidation.invalidate().await;
            } else {
                debug!(url = %url, "Rejected token was already replaced");
            }
            return Err(ApiError::Unauthorized);
        }

        Self::check_response(response).await
    }

    /// Authenticated GET returning JSON
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .send_authenticated::<()>(Method::GET, path, None)
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", path, e)))
    }
}

#[async_trait]
impl NetworkLayer for ApiClient {
    async fn create_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionResponse, ApiError> {
        let response = self
            .send_public(Method::POST, "/sessions", &SessionRequest { email, password })
            .await?;

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse session response: {}", e)))?;
        debug!(
            has_user = session.user.is_some(),
            has_token = session.token.is_some(),
            has_refresh_token = session.refresh_token.is_some(),
            "Session response received"
        );
        Ok(session)
    }

    async fn create_user(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
        self.send_public(Method::POST, "/users", &SignUpRequest { name, email, password })
            .await?;
        Ok(())
    }

    async fn update_user(&self, update: &ProfileUpdate) -> Result<(), ApiError> {
        self.send_authenticated(Method::PUT, "/users", Some(update))
            .await?;
        Ok(())
    }

    fn set_bearer_token(&self, token: Option<&str>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = token.map(str::to_string);
        if slot.is_some() {
            self.invalidation.arm();
        } else {
            self.invalidation.disarm();
        }
    }

    fn invalidation(&self) -> &InvalidationRegistry {
        &self.invalidation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Consume one request (headers plus content-length body).
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let Ok(n) = socket.read(&mut buf).await else {
                return;
            };
            if n == 0 {
                return;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + content_length {
                    return;
                }
            }
        }
    }

    /// Answer every connection with the given status and an empty body.
    async fn serve_status(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        status_line
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:3333/").expect("client");
        assert_eq!(client.base_url(), "http://localhost:3333");
        assert_eq!(client.url("/sessions"), "http://localhost:3333/sessions");
        assert_eq!(client.url("users"), "http://localhost:3333/users");
        assert_eq!(client.avatar_url("a.png"), "http://localhost:3333/avatar/a.png");
    }

    #[test]
    fn test_auth_headers() {
        let client = ApiClient::new("http://localhost:3333").expect("client");
        assert!(client.auth_headers(None).expect("headers").is_empty());

        let headers = client.auth_headers(Some("tok1")).expect("headers");
        assert_eq!(headers.get(header::AUTHORIZATION).expect("auth header"), "Bearer tok1");
    }

    #[test]
    fn test_set_bearer_token_arms_registry() {
        let client = ApiClient::new("http://localhost:3333").expect("client");
        let clone = client.clone();

        client.set_bearer_token(Some("tok1"));
        assert!(clone.has_token(), "clones share the header slot");
        assert!(client.invalidation().is_armed());

        client.set_bearer_token(None);
        assert!(!clone.has_token());
        assert!(!client.invalidation().is_armed());
    }

    #[tokio::test]
    async fn test_unauthorized_fires_invalidation_once() {
        let base = serve_status("401 Unauthorized").await;
        let client = ApiClient::new(&base).expect("client");
        client.set_bearer_token(Some("expired"));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _registration = client.invalidation().register(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let (a, b) = tokio::join!(
            client.get::<serde_json::Value>("/history"),
            client.get::<serde_json::Value>("/exercises"),
        );
        assert!(matches!(a, Err(ApiError::Unauthorized)));
        assert!(matches!(b, Err(ApiError::Unauthorized)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_without_token_does_not_invalidate() {
        let base = serve_status("401 Unauthorized").await;
        let client = ApiClient::new(&base).expect("client");

        let err = client
            .create_session("a@x.com", "wrong")
            .await
            .expect_err("bad credentials should fail");
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(!client.invalidation().is_armed());
    }

    #[tokio::test]
    async fn test_unauthorized_for_replaced_token_keeps_new_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        let (received_tx, received_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            read_request(&mut socket).await;
            let _ = received_tx.send(());
            let _ = release_rx.await;
            let _ = socket
                .write_all(b"HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
            let _ = socket.shutdown().await;
        });

        let client = ApiClient::new(&base).expect("client");
        client.set_bearer_token(Some("old-token"));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _registration = client.invalidation().register(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let requester = client.clone();
        let request =
            tokio::spawn(async move { requester.get::<serde_json::Value>("/history").await });

        received_rx.await.expect("request reached the server");
        client.set_bearer_token(Some("new-token"));
        let _ = release_tx.send(());

        let result = request.await.expect("request task");
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(client.has_token());
        assert!(client.invalidation().is_armed());
    }
}
