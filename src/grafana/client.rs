// grafanatool/src/grafana/client.rs
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::config::Settings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Status code plus decoded body of one API call. Bodies that are not JSON are kept as a string value.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error for a non-2xx answer, carrying the status and body for the restore report.
    pub fn into_error(self, action: &str) -> anyhow::Error {
        anyhow::anyhow!("{} failed, status: {}, msg: {}", action, self.status, self.body)
    }
}

#[derive(Debug, Clone)]
pub struct GrafanaClient {
    http: reqwest::Client,
    base_url: Url,
    basic_auth: Option<(String, String)>,
    debug: bool,
}

impl GrafanaClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &settings.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Grafana token contains characters that are not valid in a header")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &settings.extra_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid extra header name: {}", name))?;
            let header_value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for extra header {}", name))?;
            headers.insert(header_name, header_value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!settings.verify_ssl);

        if let Some(cert_path) = &settings.client_cert {
            let pem = std::fs::read(cert_path)
                .with_context(|| format!("Failed to read client certificate: {}", cert_path.display()))?;
            let identity = reqwest::Identity::from_pem(&pem)
                .with_context(|| format!("Invalid client certificate: {}", cert_path.display()))?;
            builder = builder.identity(identity);
        }

        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(GrafanaClient {
            http,
            base_url: settings.grafana_url.clone(),
            // Basic auth is only a fallback for when no token is configured.
            basic_auth: if settings.token.is_none() {
                settings.basic_auth.clone()
            } else {
                None
            },
            debug: settings.debug,
        })
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.send(Method::PUT, path, Some(body)).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        // Keep any sub-path the server is mounted under (e.g. https://host/grafana).
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined).with_context(|| format!("Invalid API URL: {}", joined))
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let url = self.endpoint(path)?;
        let mut request: RequestBuilder = self.http.request(method.clone(), url.clone());
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body of {} {}", method, url))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if self.debug {
            println!("[DEBUG] resp status: {}", status);
            println!("[DEBUG] resp body: {}", body);
        }

        Ok(ApiResponse { status, body })
    }
}
