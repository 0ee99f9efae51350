//! SonarQube API client.
//!
//! Low-level HTTP client that handles authentication, API path normalization
//! and raw requests. Configuration objects are built on top of it in
//! [`crate::Platform`] and the model types.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Result, SonarError};

pub(crate) const DEFAULT_URL: &str = "http://localhost:9000";
const USER_AGENT: &str = concat!("sonar-config/", env!("CARGO_PKG_VERSION"));

/// Parameter list for a request.
///
/// Repeated keys are allowed (e.g. `values` for multi-valued settings).
pub type Params<'a> = [(&'a str, &'a str)];

/// Owned request parameters, for values computed at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamsBuf {
    items: Vec<(String, String)>,
}

impl ParamsBuf {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Add the parameter only when a value is present.
    #[must_use]
    pub fn with_opt<V: Into<String>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.push(key, v);
        }
        self
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.items.push((key.to_string(), value.into()));
    }

    /// Borrowed view, as accepted by the request methods.
    pub fn as_params(&self) -> Vec<(&str, &str)> {
        self.items
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Low-level SonarQube API client.
///
/// Authenticates with a user token passed as basic-auth login with an empty
/// password. Every API path goes through [`normalize_api`], so `/api/x`,
/// `api/x`, `/x` and `x` all reach the same endpoint.
///
/// This struct is cheaply cloneable; clones reference the same underlying
/// connection pool.
///
/// # Example
///
/// ```no_run
/// use sonar_config::SonarClient;
///
/// # fn example() -> sonar_config::Result<()> {
/// // Create from environment variables
/// let client = SonarClient::from_env()?;
///
/// // Or configure manually
/// let client = SonarClient::new("squ_0123456789", "https://sonar.example.com")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SonarClient {
    http: Client,
    base_url: Arc<Url>,
    token: String,
}

impl std::fmt::Debug for SonarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonarClient")
            .field("base_url", &self.url())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for SonarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", redacted_token(&self.token), self.url())
    }
}

impl SonarClient {
    /// Create a client from environment variables.
    ///
    /// Uses `SONAR_TOKEN` for authentication and optionally `SONAR_HOST_URL`
    /// for the base URL (defaults to `http://localhost:9000`).
    ///
    /// # Errors
    ///
    /// Returns an error if `SONAR_TOKEN` is not set.
    pub fn from_env() -> Result<Self> {
        let token = env::var("SONAR_TOKEN").map_err(|_| {
            SonarError::ConfigMissing("SONAR_TOKEN environment variable not set".to_string())
        })?;

        let base_url = env::var("SONAR_HOST_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

        Self::new(&token, &base_url)
    }

    /// Create a new client with the provided token and base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn new(token: &str, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(SonarError::HttpError)?;

        Ok(Self {
            http,
            base_url: Arc::new(base_url),
            token: token.to_string(),
        })
    }

    /// Root URL of the platform, without trailing slash.
    pub fn url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn endpoint(&self, api: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.url(), normalize_api(api)))?)
    }

    fn authenticated(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.token, Some(""))
    }

    /// Make a GET request, failing on any non-2xx status.
    #[tracing::instrument(skip(self, params))]
    pub async fn get(&self, api: &str, params: &Params<'_>) -> Result<Response> {
        let response = self.get_soft(api, params).await?;
        Self::check_response(response).await
    }

    /// Make a GET request and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, api: &str, params: &Params<'_>) -> Result<T> {
        let response = self.get(api, params).await?;
        response.json().await.map_err(SonarError::HttpError)
    }

    /// Make a GET request that does not fail on HTTP error statuses.
    ///
    /// Used to probe for optional features where 4xx means "absent".
    #[tracing::instrument(skip(self, params))]
    pub async fn get_soft(&self, api: &str, params: &Params<'_>) -> Result<Response> {
        let url = self.endpoint(api)?;
        tracing::debug!("GET: {}{}", url, query_string(params));

        self.authenticated(self.http.get(url))
            .query(params)
            .send()
            .await
            .map_err(SonarError::HttpError)
    }

    /// Make a form-encoded POST request, failing on any non-2xx status.
    #[tracing::instrument(skip(self, params))]
    pub async fn post(&self, api: &str, params: &Params<'_>) -> Result<Response> {
        let response = self.post_soft(api, params).await?;
        Self::check_response(response).await
    }

    /// Make a POST request and decode the JSON body.
    pub async fn post_json<T: DeserializeOwned>(&self, api: &str, params: &Params<'_>) -> Result<T> {
        let response = self.post(api, params).await?;
        response.json().await.map_err(SonarError::HttpError)
    }

    /// Make a form-encoded POST request that does not fail on HTTP error statuses.
    #[tracing::instrument(skip(self, params))]
    pub async fn post_soft(&self, api: &str, params: &Params<'_>) -> Result<Response> {
        let url = self.endpoint(api)?;
        tracing::debug!("POST: {}{}", url, query_string(params));

        self.authenticated(self.http.post(url))
            .form(params)
            .send()
            .await
            .map_err(SonarError::HttpError)
    }

    /// Make a DELETE request.
    #[tracing::instrument(skip(self, params))]
    pub async fn delete(&self, api: &str, params: &Params<'_>) -> Result<Response> {
        let url = self.endpoint(api)?;
        tracing::debug!("DELETE: {}{}", url, query_string(params));

        let response = self
            .authenticated(self.http.delete(url))
            .query(params)
            .send()
            .await
            .map_err(SonarError::HttpError)?;

        Self::check_response(response).await
    }

    /// Check whether a login/password pair authenticates on the platform.
    ///
    /// The platform token is not used for this call.
    #[tracing::instrument(skip(self, password))]
    pub async fn validate_credentials(&self, login: &str, password: &str) -> Result<bool> {
        let url = self.endpoint("authentication/validate")?;
        let response = self
            .http
            .get(url)
            .basic_auth(login, Some(password))
            .send()
            .await
            .map_err(SonarError::HttpError)?;
        let body: serde_json::Value = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(SonarError::HttpError)?;
        Ok(body.get("valid").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    /// Check response status and convert errors.
    pub async fn check_response(response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        // Handle rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(SonarError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let url = response.url().to_string();
        let message = Self::extract_error_message(response, status).await;
        tracing::error!("{} returned HTTP {}: {}", url, status.as_u16(), message);
        Err(SonarError::ApiError {
            message,
            status_code: Some(status.as_u16()),
        })
    }

    /// Extract error message from a failed response.
    async fn extract_error_message(response: Response, status: StatusCode) -> String {
        let body = match response.text().await {
            Ok(b) => b,
            Err(_) => return format!("HTTP {status}"),
        };

        // SonarQube reports errors as {"errors": [{"msg": "..."}]}
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(errors) = json.get("errors").and_then(|e| e.as_array()) {
                let msgs: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if !msgs.is_empty() {
                    return msgs.join(", ");
                }
            }
            if let Some(msg) = json.get("message").and_then(|m| m.as_str()) {
                return msg.to_string();
            }
        }

        if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body
        }
    }
}

/// Normalize an API path to its canonical `/api/...` form.
///
/// Accepts the prefix already present (`/api/x`), without leading slash
/// (`api/x`), with a leading slash only (`/x`) or a bare relative path (`x`).
pub fn normalize_api(api: &str) -> String {
    let api = api.to_lowercase();
    if api.starts_with("/api") {
        api
    } else if api.starts_with("api") {
        format!("/{api}")
    } else if api.starts_with('/') {
        format!("/api{api}")
    } else {
        format!("/api/{api}")
    }
}

/// Mask a token, keeping only its first and last 3 characters.
pub fn redacted_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}***{tail}")
}

fn query_string(params: &Params<'_>) -> String {
    let parts: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_debug() {
        let client = SonarClient::new("squ_secret_token", "https://sonar.example.com").unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("SonarClient"));
        assert!(debug.contains("base_url"));
        // Token should not be in debug output
        assert!(!debug.contains("squ_secret_token"));
    }

    #[test]
    fn test_display_redacts_token() {
        let client = SonarClient::new("squ_secret_token", "https://sonar.example.com").unwrap();
        assert_eq!(client.to_string(), "squ***ken@https://sonar.example.com");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client1 = SonarClient::new("token", "http://localhost:9000").unwrap();
        let client2 = SonarClient::new("token", "http://localhost:9000/").unwrap();
        assert_eq!(client1.url(), client2.url());
        assert_eq!(client1.url(), "http://localhost:9000");
    }

    #[test]
    fn test_normalize_api_accepts_four_forms() {
        for form in ["/api/projects/search", "api/projects/search", "/projects/search", "projects/search"] {
            assert_eq!(normalize_api(form), "/api/projects/search", "form {form}");
        }
    }

    #[test]
    fn test_endpoint_keeps_context_path() {
        let client = SonarClient::new("token", "https://example.com/sonar").unwrap();
        let url = client.endpoint("server/version").unwrap();
        assert_eq!(url.as_str(), "https://example.com/sonar/api/server/version");
    }

    #[test]
    fn test_redacted_short_token() {
        assert_eq!(redacted_token("abc"), "***");
    }
}
