// grafanatool/src/restore/objects.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;

use super::registry::{ComponentKind, ComponentRegistry, RestoreHandler};
use crate::config::Settings;
use crate::grafana::GrafanaClient;

/// Registry wired to the Grafana API, one handler per kind.
pub fn grafana_registry(client: Arc<GrafanaClient>) -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry
        .register(ComponentKind::Folder, Arc::new(FolderRestorer(Arc::clone(&client))))
        .register(ComponentKind::Datasource, Arc::new(DatasourceRestorer(Arc::clone(&client))))
        .register(ComponentKind::LibraryElement, Arc::new(LibraryElementRestorer(Arc::clone(&client))))
        .register(ComponentKind::Dashboard, Arc::new(DashboardRestorer(Arc::clone(&client))))
        .register(ComponentKind::AlertChannel, Arc::new(AlertChannelRestorer(Arc::clone(&client))))
        .register(ComponentKind::AlertRule, Arc::new(AlertRuleRestorer(client)));
    registry
}

async fn read_json(file_path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(file_path)
        .await
        .with_context(|| format!("Failed to read {}", file_path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON from {}", file_path.display()))
}

fn as_object(value: Value, file_path: &Path) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(anyhow::anyhow!(
            "Expected a JSON object in {}, found {}",
            file_path.display(),
            other
        )),
    }
}

fn non_empty_str<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

async fn post_or_fail(client: &GrafanaClient, path: &str, payload: &Value, action: &str) -> Result<()> {
    let response = client.post(path, payload).await?;
    if response.is_success() {
        Ok(())
    } else {
        Err(response.into_error(action))
    }
}

pub struct FolderRestorer(Arc<GrafanaClient>);

#[async_trait]
impl RestoreHandler for FolderRestorer {
    async fn restore_one(&self, file_path: &Path, _settings: &Settings) -> Result<()> {
        let folder = read_json(file_path).await?;
        let title = non_empty_str(&folder, "/title")
            .with_context(|| format!("Folder in {} has no title", file_path.display()))?;
        let mut payload = json!({ "title": title });
        if let Some(uid) = non_empty_str(&folder, "/uid") {
            payload["uid"] = json!(uid);
        }
        post_or_fail(&self.0, "/api/folders", &payload, &format!("create folder {}", title)).await
    }
}

pub struct DatasourceRestorer(Arc<GrafanaClient>);

#[async_trait]
impl RestoreHandler for DatasourceRestorer {
    async fn restore_one(&self, file_path: &Path, _settings: &Settings) -> Result<()> {
        let mut datasource = as_object(read_json(file_path).await?, file_path)?;
        datasource.remove("id");
        let name = datasource
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        post_or_fail(
            &self.0,
            "/api/datasources",
            &Value::Object(datasource),
            &format!("create datasource {}", name),
        )
        .await
    }
}

pub struct LibraryElementRestorer(Arc<GrafanaClient>);

#[async_trait]
impl RestoreHandler for LibraryElementRestorer {
    async fn restore_one(&self, file_path: &Path, _settings: &Settings) -> Result<()> {
        let element = read_json(file_path).await?;
        let name = non_empty_str(&element, "/name")
            .with_context(|| format!("Library element in {} has no name", file_path.display()))?;
        let mut payload = json!({
            "name": name,
            "kind": element.get("kind").cloned().unwrap_or(json!(1)),
            "model": element.get("model").cloned().unwrap_or(json!({})),
        });
        if let Some(uid) = non_empty_str(&element, "/uid") {
            payload["uid"] = json!(uid);
        }
        if let Some(folder_uid) =
            non_empty_str(&element, "/meta/folderUid").or_else(|| non_empty_str(&element, "/folderUid"))
        {
            payload["folderUid"] = json!(folder_uid);
        }
        post_or_fail(
            &self.0,
            "/api/library-elements",
            &payload,
            &format!("create library element {}", name),
        )
        .await
    }
}

pub struct DashboardRestorer(Arc<GrafanaClient>);

#[async_trait]
impl RestoreHandler for DashboardRestorer {
    async fn restore_one(&self, file_path: &Path, settings: &Settings) -> Result<()> {
        let content = read_json(file_path).await?;
        let mut dashboard = content
            .get("dashboard")
            .cloned()
            .with_context(|| format!("No 'dashboard' object in {}", file_path.display()))?;
        if !dashboard.is_object() {
            anyhow::bail!("'dashboard' in {} is not a JSON object", file_path.display());
        }
        // Grafana assigns a fresh id; the uid keeps the dashboard's identity.
        dashboard["id"] = Value::Null;
        let title = dashboard["title"].as_str().unwrap_or_default().to_string();

        let mut payload = json!({ "dashboard": dashboard, "overwrite": true });
        match non_empty_str(&content, "/meta/folderUid") {
            Some(folder_uid) if settings.features.dashboard_uid => {
                payload["folderUid"] = json!(folder_uid);
            }
            _ => payload["folderId"] = json!(0),
        }
        post_or_fail(
            &self.0,
            "/api/dashboards/db",
            &payload,
            &format!("create dashboard {}", title),
        )
        .await
    }
}

pub struct AlertChannelRestorer(Arc<GrafanaClient>);

#[async_trait]
impl RestoreHandler for AlertChannelRestorer {
    async fn restore_one(&self, file_path: &Path, _settings: &Settings) -> Result<()> {
        let mut channel = as_object(read_json(file_path).await?, file_path)?;
        channel.remove("id");
        let name = channel
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        post_or_fail(
            &self.0,
            "/api/alert-notifications",
            &Value::Object(channel),
            &format!("create alert channel {}", name),
        )
        .await
    }
}

pub struct AlertRuleRestorer(Arc<GrafanaClient>);

#[async_trait]
impl RestoreHandler for AlertRuleRestorer {
    async fn restore_one(&self, file_path: &Path, settings: &Settings) -> Result<()> {
        if !settings.features.contact_point {
            anyhow::bail!("Unable to restore alert rules, requires Grafana 9.4.0 or above");
        }
        let rule = read_json(file_path).await?;
        let uid = non_empty_str(&rule, "/uid")
            .with_context(|| format!("Alert rule in {} has no uid", file_path.display()))?;
        let rule_path = format!("/api/v1/provisioning/alert-rules/{}", uid);

        let existing = self.0.get(&rule_path).await?;
        let response = if existing.status == 200 {
            self.0.put(&rule_path, &rule).await?
        } else {
            self.0.post("/api/v1/provisioning/alert-rules", &rule).await?
        };
        if response.is_success() {
            Ok(())
        } else {
            Err(response.into_error(&format!("restore alert rule {}", uid)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use mockito::{Matcher, Server};
    use std::fs;

    fn write_json(dir: &Path, name: &str, value: &Value) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_folder_posts_title_and_uid() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/folders")
            .match_body(Matcher::Json(json!({ "title": "Ops", "uid": "ops" })))
            .with_status(200)
            .with_body(r#"{"id":7,"uid":"ops","title":"Ops"}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let file = write_json(dir.path(), "ops.folder", &json!({ "id": 3, "uid": "ops", "title": "Ops" }));

        let settings = test_settings(&server.url());
        let handler = FolderRestorer(Arc::new(GrafanaClient::new(&settings)?));
        handler.restore_one(&file, &settings).await?;

        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_folder_reports_status() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/folders")
            .with_status(412)
            .with_body(r#"{"message":"folder with the same name already exists"}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let file = write_json(dir.path(), "ops.folder", &json!({ "uid": "ops", "title": "Ops" }));

        let settings = test_settings(&server.url());
        let handler = FolderRestorer(Arc::new(GrafanaClient::new(&settings)?));
        let err = handler.restore_one(&file, &settings).await.unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("412"));
        assert!(message.contains("already exists"));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_file_fails_without_calling_api() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/dashboards/db")
            .expect(0)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("broken.dashboard");
        fs::write(&file, "{ not json")?;

        let settings = test_settings(&server.url());
        let handler = DashboardRestorer(Arc::new(GrafanaClient::new(&settings)?));
        assert!(handler.restore_one(&file, &settings).await.is_err());

        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_dashboard_uses_folder_uid_when_supported() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/dashboards/db")
            .match_body(Matcher::Json(json!({
                "dashboard": { "id": null, "uid": "dash1", "title": "CPU" },
                "overwrite": true,
                "folderUid": "ops"
            })))
            .with_status(200)
            .with_body(r#"{"status":"success"}"#)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let file = write_json(
            dir.path(),
            "dash1.dashboard",
            &json!({
                "dashboard": { "id": 42, "uid": "dash1", "title": "CPU" },
                "meta": { "folderUid": "ops", "folderTitle": "Ops" }
            }),
        );

        let mut settings = test_settings(&server.url());
        settings.features.dashboard_uid = true;
        let handler = DashboardRestorer(Arc::new(GrafanaClient::new(&settings)?));
        handler.restore_one(&file, &settings).await?;

        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_dashboard_falls_back_to_general_folder() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/dashboards/db")
            .match_body(Matcher::PartialJson(json!({ "folderId": 0, "overwrite": true })))
            .with_status(200)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let file = write_json(
            dir.path(),
            "dash1.dashboard",
            &json!({ "dashboard": { "uid": "dash1", "title": "CPU" }, "meta": { "folderUid": "ops" } }),
        );

        let settings = test_settings(&server.url());
        let handler = DashboardRestorer(Arc::new(GrafanaClient::new(&settings)?));
        handler.restore_one(&file, &settings).await?;

        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_datasource_and_alert_channel_drop_id() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let datasource = server
            .mock("POST", "/api/datasources")
            .match_body(Matcher::Json(json!({ "name": "prom", "type": "prometheus" })))
            .with_status(200)
            .create_async()
            .await;
        let channel = server
            .mock("POST", "/api/alert-notifications")
            .match_body(Matcher::Json(json!({ "name": "pager", "type": "pagerduty" })))
            .with_status(200)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let ds_file = write_json(dir.path(), "prom.datasource", &json!({ "id": 1, "name": "prom", "type": "prometheus" }));
        let ch_file = write_json(dir.path(), "pager.alert_channel", &json!({ "id": 9, "name": "pager", "type": "pagerduty" }));

        let settings = test_settings(&server.url());
        let client = Arc::new(GrafanaClient::new(&settings)?);
        DatasourceRestorer(Arc::clone(&client)).restore_one(&ds_file, &settings).await?;
        AlertChannelRestorer(client).restore_one(&ch_file, &settings).await?;

        datasource.assert_async().await;
        channel.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_library_element_payload() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/library-elements")
            .match_body(Matcher::Json(json!({
                "name": "Shared panel",
                "kind": 1,
                "model": { "type": "graph" },
                "uid": "lib1",
                "folderUid": "ops"
            })))
            .with_status(200)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let file = write_json(
            dir.path(),
            "lib1.library_element",
            &json!({
                "id": 5,
                "uid": "lib1",
                "name": "Shared panel",
                "kind": 1,
                "model": { "type": "graph" },
                "meta": { "folderUid": "ops" }
            }),
        );

        let settings = test_settings(&server.url());
        let handler = LibraryElementRestorer(Arc::new(GrafanaClient::new(&settings)?));
        handler.restore_one(&file, &settings).await?;

        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_alert_rule_updates_existing_rule() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let _existing = server
            .mock("GET", "/api/v1/provisioning/alert-rules/rule1")
            .with_status(200)
            .with_body(r#"{"uid":"rule1"}"#)
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/api/v1/provisioning/alert-rules/rule1")
            .with_status(200)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/api/v1/provisioning/alert-rules")
            .expect(0)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let file = write_json(dir.path(), "rule1.alert_rule", &json!({ "uid": "rule1", "title": "High CPU" }));

        let mut settings = test_settings(&server.url());
        settings.features.contact_point = true;
        let handler = AlertRuleRestorer(Arc::new(GrafanaClient::new(&settings)?));
        handler.restore_one(&file, &settings).await?;

        update.assert_async().await;
        create.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_alert_rule_creates_missing_rule() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let _existing = server
            .mock("GET", "/api/v1/provisioning/alert-rules/rule1")
            .with_status(404)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/api/v1/provisioning/alert-rules")
            .with_status(201)
            .create_async()
            .await;
        let dir = tempfile::tempdir()?;
        let file = write_json(dir.path(), "rule1.alert_rule", &json!({ "uid": "rule1", "title": "High CPU" }));

        let mut settings = test_settings(&server.url());
        settings.features.contact_point = true;
        let handler = AlertRuleRestorer(Arc::new(GrafanaClient::new(&settings)?));
        handler.restore_one(&file, &settings).await?;

        create.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_alert_rule_requires_contact_point_support() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = write_json(dir.path(), "rule1.alert_rule", &json!({ "uid": "rule1" }));

        let settings = test_settings("http://127.0.0.1:9");
        let handler = AlertRuleRestorer(Arc::new(GrafanaClient::new(&settings)?));
        let err = handler.restore_one(&file, &settings).await.unwrap_err();

        assert!(err.to_string().contains("9.4.0"));
        Ok(())
    }

    #[test]
    fn test_grafana_registry_covers_every_kind() -> anyhow::Result<()> {
        let client = Arc::new(GrafanaClient::new(&test_settings("http://localhost:3000"))?);
        let registry = grafana_registry(client);
        assert_eq!(registry.kinds().collect::<Vec<_>>(), ComponentKind::RESTORE_ORDER.to_vec());
        Ok(())
    }
}
