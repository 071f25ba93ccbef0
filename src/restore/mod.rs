pub(crate) mod archive; // Archive validation, extraction and the scoped workspace
pub(crate) mod dispatcher;
pub(crate) mod objects; // Grafana API handlers, one per component kind
pub(crate) mod registry;
pub(crate) mod s3_download;
pub(crate) mod selector;

use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, RestoreConfig};
use crate::errors::{RestoreError, Result};
use crate::grafana::{GrafanaClient, api_checks};
use archive::ArchiveSource;
use dispatcher::RestoreReport;
use registry::ComponentRegistry;

/// Public entry point for the restore process.
/// Builds the Grafana client and handler registry, then runs the full restore flow.
pub async fn run_restore_flow(
    app_config: &AppConfig,
    restore_config: &RestoreConfig,
) -> Result<RestoreReport> {
    let client = GrafanaClient::new(&app_config.settings)
        .map_err(|e| RestoreError::Config(format!("{:#}", e)))?;
    let client = Arc::new(client);
    let registry = objects::grafana_registry(Arc::clone(&client));

    perform_restore_orchestration(app_config, restore_config, &client, &registry).await
}

/// Preflight, fetch, extract, select, dispatch. Every fatal condition is returned before any
/// handler runs; handler failures end up in the report instead.
pub(crate) async fn perform_restore_orchestration(
    app_config: &AppConfig,
    restore_config: &RestoreConfig,
    client: &GrafanaClient,
    registry: &ComponentRegistry,
) -> Result<RestoreReport> {
    let started_at = Local::now();
    println!("🔄 Restore started at {}", started_at.format("%Y-%m-%d %H:%M:%S"));

    let requested = restore_config
        .components
        .as_deref()
        .map(|list| selector::parse_component_filter(list, registry))
        .transpose()?;

    let mut settings = app_config.settings.clone();
    let preflight = api_checks::check(client, &settings)
        .await
        .map_err(|e| RestoreError::ApiUnreachable(format!("{:#}", e)))?;
    if !preflight.is_ok() {
        return Err(RestoreError::Preflight {
            status: preflight.status,
            body: preflight.body.to_string(),
        });
    }
    settings.features = preflight.features;
    let settings = settings;

    let source = fetch_archive_source(app_config, restore_config).await?;
    let workspace = archive::open_archive(&source)?;
    drop(source);

    let selection = match selector::select(requested.as_deref(), registry, workspace.path()) {
        Ok(selection) => selection,
        Err(e) => {
            workspace.close();
            return Err(e);
        }
    };
    let mut total_files = 0;
    for (kind, files) in selection.iter() {
        println!("Found {} {} file(s)", files.len(), kind);
        total_files += files.len();
    }
    println!("Restoring {} file(s)", total_files);

    let report = dispatcher::dispatch(registry, &selection, &settings).await;
    workspace.close();

    report.print_summary();
    println!(
        "Restore finished in {}s",
        (Local::now() - started_at).num_seconds()
    );
    Ok(report)
}

async fn fetch_archive_source(
    app_config: &AppConfig,
    restore_config: &RestoreConfig,
) -> Result<ArchiveSource> {
    match (&app_config.spaces_config, restore_config.download_from_spaces) {
        (Some(spaces), true) => {
            println!("Downloading archive from remote storage:");
            let fetch_error = |e: anyhow::Error| RestoreError::ArchiveFetch(format!("{:#}", e));
            let (bucket, key) =
                s3_download::resolve_archive_location(spaces, &restore_config.archive_source)
                    .map_err(fetch_error)?;
            let data = s3_download::download_archive(spaces, &bucket, &key)
                .await
                .map_err(fetch_error)?;
            Ok(ArchiveSource::Bytes {
                name: format!("s3://{}/{}", bucket, key),
                data,
            })
        }
        _ => Ok(ArchiveSource::LocalPath(PathBuf::from(
            &restore_config.archive_source,
        ))),
    }
}
