//! Main Fastly API client implementation.

use crate::api::{AclApi, SnippetApi, VersionApi};
use crate::config::RateLimitConfig;
use edgeward_core::{EdgeError, Result};
use governor::{DefaultDirectRateLimiter, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The Fastly API base URL
const DEFAULT_BASE_URL: &str = "https://api.fastly.com";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the API token
const TOKEN_HEADER: &str = "Fastly-Key";

/// Main Fastly API client
#[derive(Clone)]
pub struct FastlyClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    base_url: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl FastlyClient {
    /// Create a new client with the given API token using default settings
    pub fn new(token: impl Into<String>) -> Result<Self> {
        FastlyClientBuilder::new(token).build()
    }

    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder(token: impl Into<String>) -> FastlyClientBuilder {
        FastlyClientBuilder::new(token)
    }

    /// Access ACL endpoints
    #[must_use]
    pub fn acls(&self) -> AclApi<'_> {
        AclApi::new(self)
    }

    /// Access VCL snippet endpoints
    #[must_use]
    pub fn snippets(&self) -> SnippetApi<'_> {
        SnippetApi::new(self)
    }

    /// Access service version endpoints
    #[must_use]
    pub fn versions(&self) -> VersionApi<'_> {
        VersionApi::new(self)
    }

    /// Perform a GET request with query parameters
    pub(crate) async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.build_url(path, params)?;
        debug!(url = %url, "GET request");

        self.send(self.inner.http.get(url)).await
    }

    /// Perform a POST request with form data
    pub(crate) async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.build_url(path, &[])?;
        debug!(url = %url, "POST form request");

        self.send(self.inner.http.post(url).form(params)).await
    }

    /// Perform a PUT request with form data
    pub(crate) async fn put_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.build_url(path, &[])?;
        debug!(url = %url, "PUT form request");

        self.send(self.inner.http.put(url).form(params)).await
    }

    /// Perform a PATCH request with JSON body
    pub(crate) async fn patch<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.build_url(path, &[])?;
        debug!(url = %url, "PATCH request");

        self.send(self.inner.http.request(Method::PATCH, url).json(body))
            .await
    }

    /// Wait for the rate limiter, send the request and decode the response
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.inner.rate_limiter.until_ready().await;

        let response = request.send().await.map_err(map_transport_error)?;
        self.handle_response(response).await
    }

    /// Build a URL with query parameters
    fn build_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let raw = format!("{}{}", self.inner.base_url, path);
        let mut url = Url::parse(&raw).map_err(|e| EdgeError::InvalidUrl(format!("{raw}: {e}")))?;

        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }

        Ok(url)
    }

    /// Handle an API response that returns JSON
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.map_err(map_transport_error)?;
            serde_json::from_str(&body).map_err(EdgeError::Json)
        } else {
            Err(self.handle_error(status.as_u16(), response).await)
        }
    }

    /// Convert an error response to an EdgeError
    async fn handle_error(&self, status: u16, response: reqwest::Response) -> EdgeError {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();

        // Fastly reports failures as {"msg": ..., "detail": ...}
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                let msg = v.get("msg").and_then(|m| m.as_str())?;
                Some(match v.get("detail").and_then(|d| d.as_str()) {
                    Some(detail) => format!("{msg}: {detail}"),
                    None => msg.to_string(),
                })
            })
            .unwrap_or(body);

        match status {
            401 | 403 => EdgeError::Unauthorized,
            404 => EdgeError::NotFound { resource: url },
            429 => {
                warn!(retry_after = ?retry_after, "Rate limited by Fastly API");
                EdgeError::RateLimited { retry_after }
            }
            400..=499 => EdgeError::Conflict {
                code: status,
                message,
            },
            _ => EdgeError::Api {
                code: status,
                message,
            },
        }
    }
}

/// Map a reqwest failure that happened before a status was received
fn map_transport_error(e: reqwest::Error) -> EdgeError {
    if e.is_timeout() {
        EdgeError::Timeout(e.to_string())
    } else if e.is_connect() {
        EdgeError::Connection(e.to_string())
    } else {
        EdgeError::Http(e.to_string())
    }
}

/// Builder for configuring a [`FastlyClient`]
pub struct FastlyClientBuilder {
    token: String,
    base_url: String,
    timeout: Duration,
    user_agent: String,
    rate_limit: RateLimitConfig,
}

impl FastlyClientBuilder {
    /// Create a new builder with the given API token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("edgeward/{}", env!("CARGO_PKG_VERSION")),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Set the base URL (useful for testing)
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set client-side rate limiting
    #[must_use]
    pub const fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<FastlyClient> {
        let mut token = HeaderValue::from_str(&self.token)
            .map_err(|_| EdgeError::Config("API token contains invalid characters".into()))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| EdgeError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(FastlyClient {
            inner: Arc::new(ClientInner {
                http,
                base_url: self.base_url,
                rate_limiter: RateLimiter::direct(self.rate_limit.quota()),
            }),
        })
    }
}
