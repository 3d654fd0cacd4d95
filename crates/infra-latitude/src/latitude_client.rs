// Latitude API client (ServerSource implementation)
// reason: reqwest for HTTPS + timeouts, one request per page
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use latitude_inventory_core::application::options::{ApiToken, InventoryOptions};
use latitude_inventory_core::domain::{Server, ServersPage};
use latitude_inventory_core::error::{AppError, Result};
use latitude_inventory_core::port::{ServerQuery, ServerSource};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Connection settings for LatitudeClient
#[derive(Debug, Clone)]
pub struct LatitudeClientConfig {
    pub base_url: String,
    pub token: ApiToken,
    pub timeout: Duration,
}

impl LatitudeClientConfig {
    pub fn from_options(options: &InventoryOptions, token: ApiToken) -> Self {
        Self {
            base_url: options.latitude_api_url.clone(),
            token,
            timeout: Duration::from_secs(options.timeout),
        }
    }
}

/// Latitude `GET /servers` client
///
/// The token is sent verbatim in the `Authorization` header, the way the
/// Latitude API expects it.
pub struct LatitudeClient {
    http: reqwest::Client,
    servers_url: String,
}

impl LatitudeClient {
    /// Create a new client
    ///
    /// # Example
    /// ```ignore
    /// let client = LatitudeClient::new(LatitudeClientConfig::from_options(&options, token))?;
    /// ```
    pub fn new(config: LatitudeClientConfig) -> Result<Self> {
        let mut auth = HeaderValue::from_str(config.token.expose()).map_err(|_| {
            AppError::Authentication("API token contains characters not allowed in a header".to_string())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .user_agent(format!("latitude-inventory/{}", latitude_inventory_core::VERSION));

        // Loopback endpoints (local mocks, tunnels) never go through a proxy
        if is_loopback(&config.base_url) {
            builder = builder.no_proxy();
        }

        let http = builder
            .build()
            .map_err(|e| AppError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            servers_url: servers_url(&config.base_url),
        })
    }

    pub fn servers_url(&self) -> &str {
        &self.servers_url
    }
}

#[async_trait]
impl ServerSource for LatitudeClient {
    async fn list_servers(&self, query: &ServerQuery) -> Result<Vec<Server>> {
        let page = query.page.to_string();

        debug!(project = %query.project, page = query.page, "GET {}", self.servers_url);

        let response = self
            .http
            .get(&self.servers_url)
            .query(&[
                ("filter[project]", query.project.as_str()),
                ("sort", "id"),
                ("page[number]", page.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), page = query.page, "Latitude API request failed");
            return Err(status_error(status.as_u16(), &body));
        }

        decode_page(&body)
    }
}

fn is_loopback(base_url: &str) -> bool {
    reqwest::Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .map(|host| host == "localhost" || host == "127.0.0.1" || host == "[::1]")
        .unwrap_or(false)
}

fn servers_url(base_url: &str) -> String {
    format!("{}/servers", base_url.trim_end_matches('/'))
}

/// Decode one `/servers` response body
pub fn decode_page(body: &str) -> Result<Vec<Server>> {
    let page: ServersPage = serde_json::from_str(body)?;
    Ok(page.data)
}

/// Map a non-2xx response to an AppError
///
/// 401/403 mean a missing, invalid or revoked token.
pub fn status_error(status: u16, body: &str) -> AppError {
    let message = error_message(body);
    match status {
        401 | 403 => AppError::Authentication(format!(
            "Latitude API rejected the token ({}): {}",
            status, message
        )),
        _ => AppError::Api { status, message },
    }
}

/// Human-readable message from an error body
///
/// Latitude answers with JSON:API errors (`{"errors": [{"title", "detail"}]}`);
/// anything else is passed through, truncated.
fn error_message(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "no response body".to_string();
    }

    if let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(body) {
        if let Some(Value::Array(errors)) = doc.get("errors") {
            let messages: Vec<String> = errors
                .iter()
                .filter_map(|e| {
                    let title = e.get("title").and_then(Value::as_str);
                    let detail = e.get("detail").and_then(Value::as_str);
                    match (title, detail) {
                        (Some(t), Some(d)) => Some(format!("{}: {}", t, d)),
                        (Some(t), None) => Some(t.to_string()),
                        (None, Some(d)) => Some(d.to_string()),
                        (None, None) => None,
                    }
                })
                .collect();
            if !messages.is_empty() {
                return messages.join("; ");
            }
        }
    }

    let mut excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        excerpt.push_str("...");
    }
    excerpt
}

fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Transport(format!("request to Latitude API timed out: {}", e))
    } else if e.is_connect() {
        AppError::Transport(format!("cannot connect to Latitude API: {}", e))
    } else {
        AppError::Transport(e.to_string())
    }
}
