// grafanatool/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonGrafanaConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub admin_account: Option<String>,
    pub admin_password: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonGeneralConfig {
    pub debug: Option<bool>,
    pub api_health_check: Option<bool>,
    pub api_auth_check: Option<bool>,
    pub verify_ssl: Option<bool>,
    pub client_cert: Option<PathBuf>,
    pub restore_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub grafana: Option<JsonGrafanaConfig>,
    pub general: Option<JsonGeneralConfig>,
    pub s3_storage: Option<JsonS3StorageConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct SpacesConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub folder_prefix: Option<String>,
}

/// Capabilities of the target server, detected by the preflight check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSupport {
    pub dashboard_uid: bool,
    pub datasource_uid: bool,
    pub paging: bool,
    pub contact_point: bool,
}

/// Everything the API client and the object handlers read while restoring.
#[derive(Debug, Clone)]
pub struct Settings {
    pub grafana_url: Url,
    pub token: Option<String>,
    pub basic_auth: Option<(String, String)>,
    pub extra_headers: Vec<(String, String)>,
    pub grafana_version: Option<String>,
    pub debug: bool,
    pub api_health_check: bool,
    pub api_auth_check: bool,
    pub verify_ssl: bool,
    pub client_cert: Option<PathBuf>,
    pub restore_concurrency: usize,
    pub features: FeatureSupport,
}

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub archive_source: String,
    pub components: Option<String>,
    pub download_from_spaces: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: Settings,
    pub spaces_config: Option<SpacesConfig>,
}

impl AppConfig {
    /// Loads `config_path`, then applies environment overrides (a `.env` file is honoured).
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        dotenv::dotenv().ok();

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        Self::from_raw(raw_json_config, |key| env::var(key).ok())
    }

    pub fn from_raw<F>(raw_json_config: RawJsonConfig, env_lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = build_settings(&raw_json_config, &env_lookup)?;
        let spaces_config = raw_json_config.s3_storage.as_ref().and_then(build_spaces_config);

        Ok(AppConfig {
            settings,
            spaces_config,
        })
    }
}

fn build_spaces_config(s3_raw: &JsonS3StorageConfig) -> Option<SpacesConfig> {
    if let (Some(bucket), Some(region), Some(key_id), Some(secret), Some(endpoint)) = (
        s3_raw.bucket_name.as_ref().filter(|s| !s.is_empty()),
        s3_raw.region.as_ref().filter(|s| !s.is_empty()),
        s3_raw.access_key_id.as_ref().filter(|s| !s.is_empty()),
        s3_raw.secret_access_key.as_ref().filter(|s| !s.is_empty()),
        s3_raw.endpoint_url.as_ref().filter(|s| !s.is_empty()),
    ) {
        Some(SpacesConfig {
            bucket_name: bucket.clone(),
            region: region.clone(),
            access_key_id: key_id.clone(),
            secret_access_key: secret.clone(),
            endpoint_url: endpoint.clone(),
            folder_prefix: s3_raw.folder_prefix.clone().filter(|s| !s.is_empty()),
        })
    } else {
        if s3_raw.bucket_name.is_some()
            || s3_raw.region.is_some()
            || s3_raw.access_key_id.is_some()
            || s3_raw.secret_access_key.is_some()
            || s3_raw.endpoint_url.is_some()
        {
            // Only warn if some S3 fields were provided but were incomplete/empty
            println!("⚠️ S3 configuration is present in config.json but some required fields (bucket_name, region, access_key_id, secret_access_key, endpoint_url) are missing or empty. Remote archives are disabled.");
        }
        None
    }
}

fn build_settings<F>(raw: &RawJsonConfig, env_lookup: &F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let grafana = raw.grafana.clone().unwrap_or_default();
    let general = raw.general.clone().unwrap_or_default();

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let url_str = non_empty(env_lookup("GRAFANA_URL"))
        .or_else(|| non_empty(grafana.url.clone()))
        .context("grafana.url must be set in config.json (or GRAFANA_URL) for restore")?;
    let grafana_url = Url::parse(&url_str)
        .with_context(|| format!("Invalid Grafana URL: {}", url_str))?;

    let token = non_empty(env_lookup("GRAFANA_TOKEN")).or_else(|| non_empty(grafana.token.clone()));
    let admin_account = non_empty(env_lookup("GRAFANA_ADMIN_ACCOUNT"))
        .or_else(|| non_empty(grafana.admin_account.clone()));
    let admin_password = non_empty(env_lookup("GRAFANA_ADMIN_PASSWORD"))
        .or_else(|| non_empty(grafana.admin_password.clone()));
    let basic_auth = match (admin_account, admin_password) {
        (Some(account), Some(password)) => Some((account, password)),
        _ => None,
    };

    let extra_headers = match env_lookup("GRAFANA_HEADERS") {
        Some(value) => parse_extra_headers(&value)?,
        None => Vec::new(),
    };

    let restore_concurrency = match env_lookup("RESTORE_CONCURRENCY") {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .with_context(|| format!("RESTORE_CONCURRENCY must be a positive integer, got '{}'", value))?,
        None => general.restore_concurrency.unwrap_or(1),
    };
    if restore_concurrency == 0 {
        return Err(anyhow::anyhow!("restore_concurrency must be at least 1"));
    }

    Ok(Settings {
        grafana_url,
        token,
        basic_auth,
        extra_headers,
        grafana_version: non_empty(env_lookup("GRAFANA_VERSION")).or_else(|| non_empty(grafana.version)),
        debug: env_flag(env_lookup, "DEBUG", general.debug.unwrap_or(true))?,
        api_health_check: env_flag(env_lookup, "API_HEALTH_CHECK", general.api_health_check.unwrap_or(true))?,
        api_auth_check: env_flag(env_lookup, "API_AUTH_CHECK", general.api_auth_check.unwrap_or(true))?,
        verify_ssl: env_flag(env_lookup, "VERIFY_SSL", general.verify_ssl.unwrap_or(false))?,
        client_cert: non_empty(env_lookup("CLIENT_CERT"))
            .map(PathBuf::from)
            .or(general.client_cert),
        restore_concurrency,
        features: FeatureSupport::default(),
    })
}

fn env_flag<F>(env_lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match env_lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(anyhow::anyhow!(
                "{} must be 'true' or 'false', got '{}'",
                key,
                value
            )),
        },
    }
}

/// Parses `GRAFANA_HEADERS`, a comma-separated list of `Name:Value` pairs.
fn parse_extra_headers(value: &str) -> Result<Vec<(String, String)>> {
    value
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (name, header_value) = pair
                .split_once(':')
                .with_context(|| format!("GRAFANA_HEADERS entry '{}' is not in Name:Value form", pair))?;
            Ok((name.trim().to_string(), header_value.trim().to_string()))
        })
        .collect()
}

pub fn load_restore_config(
    archive_file: &str,
    components: Option<String>,
    spaces_is_configured: bool,
) -> Result<RestoreConfig> {
    let archive_source = archive_file.trim().to_string();
    if archive_source.is_empty() {
        return Err(anyhow::anyhow!("<archive_file> cannot be empty."));
    }

    if archive_source.starts_with("s3://") && !spaces_is_configured {
        return Err(anyhow::anyhow!(
            "<archive_file> is an S3 URI, but S3 storage (s3_storage) is not fully configured or is missing required fields."
        ));
    }

    Ok(RestoreConfig {
        archive_source,
        components: components.filter(|c| !c.trim().is_empty()),
        download_from_spaces: spaces_is_configured,
    })
}

/// Settings pointing at `url` with a bearer token and quiet output, for tests against a fake server.
#[cfg(test)]
pub(crate) fn test_settings(url: &str) -> Settings {
    let raw: RawJsonConfig = serde_json::from_value(serde_json::json!({
        "grafana": { "url": url, "token": "test-token" },
        "general": { "debug": false }
    }))
    .unwrap();
    AppConfig::from_raw(raw, |_| None).unwrap().settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn raw(value: serde_json::Value) -> RawJsonConfig {
        serde_json::from_value(value).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_from_minimal_config() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(raw(json!({ "grafana": { "url": "http://localhost:3000" } })), no_env)?;
        let settings = &config.settings;

        assert_eq!(settings.grafana_url.as_str(), "http://localhost:3000/");
        assert!(settings.debug);
        assert!(settings.api_health_check);
        assert!(settings.api_auth_check);
        assert!(!settings.verify_ssl);
        assert_eq!(settings.restore_concurrency, 1);
        assert_eq!(settings.features, FeatureSupport::default());
        assert!(config.spaces_config.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_url_is_error() {
        let result = AppConfig::from_raw(raw(json!({ "grafana": { "token": "abc" } })), no_env);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_take_precedence() -> anyhow::Result<()> {
        let env: HashMap<&str, &str> = [
            ("GRAFANA_URL", "https://grafana.example.com"),
            ("GRAFANA_TOKEN", "env-token"),
            ("VERIFY_SSL", "TRUE"),
            ("DEBUG", "false"),
            ("RESTORE_CONCURRENCY", "4"),
            ("GRAFANA_HEADERS", "X-Org:7, X-Tenant:blue"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_raw(
            raw(json!({
                "grafana": { "url": "http://localhost:3000", "token": "file-token" },
                "general": { "verify_ssl": false, "restore_concurrency": 2 }
            })),
            |key| env.get(key).map(|v| v.to_string()),
        )?;
        let settings = config.settings;

        assert_eq!(settings.grafana_url.host_str(), Some("grafana.example.com"));
        assert_eq!(settings.token.as_deref(), Some("env-token"));
        assert!(settings.verify_ssl);
        assert!(!settings.debug);
        assert_eq!(settings.restore_concurrency, 4);
        assert_eq!(
            settings.extra_headers,
            vec![
                ("X-Org".to_string(), "7".to_string()),
                ("X-Tenant".to_string(), "blue".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn test_invalid_bool_env_is_error() {
        let result = AppConfig::from_raw(
            raw(json!({ "grafana": { "url": "http://localhost:3000" } })),
            |key| (key == "API_HEALTH_CHECK").then(|| "yes".to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_concurrency_is_error() {
        let result = AppConfig::from_raw(
            raw(json!({
                "grafana": { "url": "http://localhost:3000" },
                "general": { "restore_concurrency": 0 }
            })),
            no_env,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_basic_auth_requires_account_and_password() -> anyhow::Result<()> {
        let only_account = AppConfig::from_raw(
            raw(json!({ "grafana": { "url": "http://localhost:3000", "admin_account": "admin" } })),
            no_env,
        )?;
        assert!(only_account.settings.basic_auth.is_none());

        let both = AppConfig::from_raw(
            raw(json!({ "grafana": {
                "url": "http://localhost:3000",
                "admin_account": "admin",
                "admin_password": "secret"
            } })),
            no_env,
        )?;
        assert_eq!(
            both.settings.basic_auth,
            Some(("admin".to_string(), "secret".to_string()))
        );
        Ok(())
    }

    #[test]
    fn test_incomplete_s3_section_disables_remote_storage() -> anyhow::Result<()> {
        let config = AppConfig::from_raw(
            raw(json!({
                "grafana": { "url": "http://localhost:3000" },
                "s3_storage": { "bucket_name": "backups", "region": "" }
            })),
            no_env,
        )?;
        assert!(config.spaces_config.is_none());

        let config = AppConfig::from_raw(
            raw(json!({
                "grafana": { "url": "http://localhost:3000" },
                "s3_storage": {
                    "bucket_name": "backups",
                    "region": "us-east-1",
                    "access_key_id": "key",
                    "secret_access_key": "secret",
                    "endpoint_url": "https://s3.example.com",
                    "folder_prefix": ""
                }
            })),
            no_env,
        )?;
        let spaces = config.spaces_config.unwrap();
        assert_eq!(spaces.bucket_name, "backups");
        assert_eq!(spaces.folder_prefix, None);
        Ok(())
    }

    #[test]
    fn test_load_restore_config() -> anyhow::Result<()> {
        let local = load_restore_config(" backup.tar.gz ", Some("dashboards".to_string()), false)?;
        assert_eq!(local.archive_source, "backup.tar.gz");
        assert_eq!(local.components.as_deref(), Some("dashboards"));
        assert!(!local.download_from_spaces);

        let blank_filter = load_restore_config("backup.tar.gz", Some("  ".to_string()), true)?;
        assert_eq!(blank_filter.components, None);
        assert!(blank_filter.download_from_spaces);

        assert!(load_restore_config("s3://bucket/backup.tar.gz", None, false).is_err());
        assert!(load_restore_config("   ", None, false).is_err());
        Ok(())
    }
}
