// grafanatool/src/grafana/api_checks.rs
use anyhow::Result;
use serde_json::Value;

use super::client::GrafanaClient;
use crate::config::{FeatureSupport, Settings};

const PAGING_MIN_VERSION: (u64, u64, u64) = (6, 2, 0);
const CONTACT_POINT_MIN_VERSION: (u64, u64, u64) = (9, 4, 0);

/// Result of the preflight check. The restore only proceeds when `status == 200`.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub status: u16,
    pub body: Value,
    pub features: FeatureSupport,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Verifies the API is reachable and the credentials are accepted, then detects which
/// API features the server supports. Transport failures are returned as `Err`; a reachable
/// server answering with a non-200 status yields a report with that status.
pub async fn check(client: &GrafanaClient, settings: &Settings) -> Result<PreflightReport> {
    let mut status = 200;
    let mut body = Value::Null;
    let mut server_version = settings.grafana_version.clone();

    if settings.api_health_check {
        let health = client.get("/api/health").await?;
        if health.status != 200 {
            println!("❌ Grafana health check failed, status: {}, msg: {}", health.status, health.body);
            return Ok(failed(health.status, health.body));
        }
        println!("✓ Grafana health check passed");
        if server_version.is_none() {
            server_version = health.body["version"].as_str().map(str::to_string);
        }
        status = health.status;
        body = health.body;
    }

    if settings.api_auth_check {
        let org = client.get("/api/org").await?;
        if org.status != 200 {
            println!("❌ Grafana auth check failed, status: {}, msg: {}", org.status, org.body);
            return Ok(failed(org.status, org.body));
        }
        println!("✓ Grafana auth check passed");
        status = org.status;
        body = org.body;
    }

    let dashboard_uid = first_item_has_uid(client, "/api/search?type=dash-db&limit=1").await?;
    let datasource_uid = first_item_has_uid(client, "/api/datasources").await?;

    let version = server_version.as_deref().and_then(parse_version);
    if version.is_none() {
        println!("⚠️ Could not determine Grafana version; version-gated features are disabled");
    }
    let features = FeatureSupport {
        dashboard_uid,
        datasource_uid,
        paging: version.is_some_and(|v| v >= PAGING_MIN_VERSION),
        contact_point: version.is_some_and(|v| v >= CONTACT_POINT_MIN_VERSION),
    };
    println!("Detected Grafana features: {:?}", features);

    Ok(PreflightReport { status, body, features })
}

fn failed(status: u16, body: Value) -> PreflightReport {
    PreflightReport {
        status,
        body,
        features: FeatureSupport::default(),
    }
}

/// A listing with no entries gives no evidence against UID support, so it counts as supported.
async fn first_item_has_uid(client: &GrafanaClient, path: &str) -> Result<bool> {
    let response = client.get(path).await?;
    if !response.is_success() {
        return Ok(false);
    }
    Ok(match response.body.as_array().and_then(|items| items.first()) {
        Some(item) => item["uid"].as_str().is_some_and(|uid| !uid.is_empty()),
        None => response.body.is_array(),
    })
}

/// Parses the leading `major.minor.patch` of a version string such as `10.2.3` or `9.4.0-beta1`.
fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let version = version.trim().trim_start_matches('v');
    let mut parts = version.split('.').map(|part| {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse::<u64>().ok()
    });
    let major = parts.next().flatten()?;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}
