use std::fmt;

use log::error;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug)]
pub enum ApiError {
    /// Headers could not be built from the given credentials.
    BadCredentials(String),
    /// Request never produced an HTTP response.
    Transport(String),
    /// Remote answered non-2xx; message is the provider's error text when
    /// it could be extracted from the response body.
    Remote { status: StatusCode, message: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadCredentials(msg) => write!(f, "invalid credentials: {msg}"),
            ApiError::Transport(msg) => write!(f, "network error: {msg}"),
            ApiError::Remote { status, message } => write!(f, "API error ({status}): {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Authenticated HTTP client for the provider's REST surface.
///
/// Construction only prepares request defaults; nothing touches the network
/// until a call is made. One request per call, no retries; callers decide
/// whether to try again.
#[derive(Clone)]
pub struct EdgeClient {
    http: reqwest::Client,
    base_url: String,
}

impl EdgeClient {
    pub fn new(base_url: &str, email: &str, api_key: &str) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Auth-Email",
            HeaderValue::from_str(email).map_err(|e| ApiError::BadCredentials(e.to_string()))?,
        );
        headers.insert(
            "X-Auth-Key",
            HeaderValue::from_str(api_key).map_err(|e| ApiError::BadCredentials(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send a request and unwrap the provider envelope, returning its
    /// `result` field verbatim.
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::unwrap_envelope(res).await
    }

    async fn unwrap_envelope(res: reqwest::Response) -> Result<Value, ApiError> {
        let status = res.status();
        let body: Value = res.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = provider_error_text(&body)
                .unwrap_or_else(|| format!("request failed with status {status}"));
            error!("API call failed ({status}): {message}");
            return Err(ApiError::Remote { status, message });
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Identity check used by login and session resume.
    pub async fn verify_token(&self) -> Result<Value, ApiError> {
        self.call(Method::GET, "/user", None).await
    }

    pub async fn get_accounts(&self) -> Result<Value, ApiError> {
        self.call(Method::GET, "/accounts", None).await
    }

    pub async fn get_zones(&self) -> Result<Value, ApiError> {
        self.call(Method::GET, "/zones?per_page=50", None).await
    }

    pub async fn get_zone_details(&self, zone_id: &str) -> Result<Value, ApiError> {
        self.call(Method::GET, &format!("/zones/{zone_id}"), None).await
    }

    pub async fn get_dns_records(&self, zone_id: &str) -> Result<Value, ApiError> {
        self.call(
            Method::GET,
            &format!("/zones/{zone_id}/dns_records?per_page=100"),
            None,
        )
        .await
    }

    pub async fn create_dns_record(&self, zone_id: &str, record: Value) -> Result<Value, ApiError> {
        self.call(
            Method::POST,
            &format!("/zones/{zone_id}/dns_records"),
            Some(record),
        )
        .await
    }

    pub async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: Value,
    ) -> Result<Value, ApiError> {
        self.call(
            Method::PUT,
            &format!("/zones/{zone_id}/dns_records/{record_id}"),
            Some(record),
        )
        .await
    }

    pub async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> Result<Value, ApiError> {
        self.call(
            Method::DELETE,
            &format!("/zones/{zone_id}/dns_records/{record_id}"),
            None,
        )
        .await
    }

    /// level: off, essentially_off, low, medium, high, under_attack
    pub async fn update_security_level(&self, zone_id: &str, level: &str) -> Result<Value, ApiError> {
        self.call(
            Method::PATCH,
            &format!("/zones/{zone_id}/settings/security_level"),
            Some(json!({ "value": level })),
        )
        .await
    }

    pub async fn purge_cache(
        &self,
        zone_id: &str,
        purge_everything: bool,
        files: Vec<String>,
    ) -> Result<Value, ApiError> {
        let payload = if purge_everything {
            json!({ "purge_everything": true })
        } else {
            json!({ "files": files })
        };
        self.call(
            Method::POST,
            &format!("/zones/{zone_id}/purge_cache"),
            Some(payload),
        )
        .await
    }

    pub async fn get_workers_scripts(&self, account_id: &str) -> Result<Value, ApiError> {
        self.call(
            Method::GET,
            &format!("/accounts/{account_id}/workers/scripts"),
            None,
        )
        .await
    }

    /// Script body goes up as-is with a javascript content type, not as a
    /// JSON envelope.
    pub async fn upload_worker_script(
        &self,
        account_id: &str,
        name: &str,
        script: String,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/accounts/{account_id}/workers/scripts/{name}", self.base_url);
        let res = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, "application/javascript")
            .body(script)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::unwrap_envelope(res).await
    }

    pub async fn get_pages_projects(&self, account_id: &str) -> Result<Value, ApiError> {
        self.call(
            Method::GET,
            &format!("/accounts/{account_id}/pages/projects"),
            None,
        )
        .await
    }
}

/// Pull the first human-readable message out of the provider's error
/// envelope: `{"errors": [{"code": ..., "message": "..."}]}`.
fn provider_error_text(body: &Value) -> Option<String> {
    body.get("errors")?
        .as_array()?
        .first()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
