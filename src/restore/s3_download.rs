// grafanatool/src/restore/s3_download.rs
use anyhow::{Context, Result};
use aws_sdk_s3 as s3;
use s3::config::Region;

use crate::config::SpacesConfig;

/// Parses an S3 URI (s3://bucket/key) into bucket and key.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String)> {
    let uri = url::Url::parse(s3_uri)
        .with_context(|| format!("Invalid S3 URI format: {}", s3_uri))?;
    if uri.scheme() != "s3" {
        return Err(anyhow::anyhow!("S3 URI must start with s3://"));
    }
    let bucket = uri.host_str().context("S3 URI missing bucket name")?.to_string();
    let key = uri.path().trim_start_matches('/').to_string();
    if key.is_empty() {
        return Err(anyhow::anyhow!("S3 URI missing key (object path)"));
    }
    Ok((bucket, key))
}

/// Resolves the bucket and object key for `archive_name`: either an explicit `s3://` URI or a
/// blob name inside the configured bucket, under `folder_prefix` when one is set.
pub fn resolve_archive_location(
    spaces_config: &SpacesConfig,
    archive_name: &str,
) -> Result<(String, String)> {
    if archive_name.starts_with("s3://") {
        return parse_s3_uri(archive_name);
    }
    let name = archive_name.trim_start_matches('/');
    let key = match spaces_config
        .folder_prefix
        .as_deref()
        .map(|prefix| prefix.trim_matches('/'))
        .filter(|prefix| !prefix.is_empty())
    {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name.to_string(),
    };
    Ok((spaces_config.bucket_name.clone(), key))
}

/// Downloads an object from an S3-compatible object storage service into memory.
pub async fn download_archive(
    spaces_config: &SpacesConfig,
    s3_bucket: &str,
    s3_key: &str,
) -> Result<Vec<u8>> {
    println!("Attempting to download s3://{}/{}", s3_bucket, s3_key);

    let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
        .endpoint_url(&spaces_config.endpoint_url)
        .region(Region::new(spaces_config.region.clone()))
        .credentials_provider(s3::config::Credentials::new(
            &spaces_config.access_key_id,
            &spaces_config.secret_access_key,
            None, // session_token
            None, // expiry
            "Static", // provider_name
        ))
        .load()
        .await;

    let client = s3::Client::new(&sdk_config);

    let object = client
        .get_object()
        .bucket(s3_bucket)
        .key(s3_key)
        .send()
        .await
        .with_context(|| format!("Failed to get object s3://{}/{}", s3_bucket, s3_key))?;

    let data = object
        .body
        .collect()
        .await
        .with_context(|| format!("Failed to read body of s3://{}/{}", s3_bucket, s3_key))?
        .into_bytes()
        .to_vec();

    println!(
        "✅ Successfully downloaded {} bytes from s3://{}/{}",
        data.len(),
        s3_bucket,
        s3_key
    );
    Ok(data)
}
