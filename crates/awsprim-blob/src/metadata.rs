//! Blob metadata surface: head, tags, versions, presigned URLs, and
//! server-side selection.

use std::collections::BTreeMap;
use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::CompressionType;
use aws_sdk_s3::types::CsvInput;
use aws_sdk_s3::types::CsvOutput;
use aws_sdk_s3::types::ExpressionType;
use aws_sdk_s3::types::FileHeaderInfo;
use aws_sdk_s3::types::InputSerialization;
use aws_sdk_s3::types::JsonInput;
use aws_sdk_s3::types::JsonOutput;
use aws_sdk_s3::types::JsonType;
use aws_sdk_s3::types::OutputSerialization;
use aws_sdk_s3::types::ParquetInput;
use aws_sdk_s3::types::SelectObjectContentEventStream;
use aws_sdk_s3::types::Tag;
use aws_sdk_s3::types::Tagging;
use awsprim_core::now_unix_secs;
use awsprim_core::PrimitiveError;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::store::classify;
use crate::store::BlobStore;
use crate::uri::S3Uri;

/// Metadata-only description of one object.
#[derive(Debug, Clone, Serialize)]
pub struct HeadOutcome {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    pub storage_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// One version of an object.
#[derive(Debug, Clone, Serialize)]
pub struct VersionEntry {
    pub version_id: String,
    pub is_latest: bool,
    pub size: u64,
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// A generated presigned URL.
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUrl {
    pub bucket: String,
    pub key: String,
    pub method: String,
    pub url: String,
    pub expires_in: u64,
    pub expires_at: u64,
}

/// Supported select input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectInput {
    Csv,
    Json,
    JsonLines,
    Parquet,
}

impl SelectInput {
    pub fn parse(raw: &str) -> Result<Self, PrimitiveError> {
        match raw {
            "csv" => Ok(SelectInput::Csv),
            "json" => Ok(SelectInput::Json),
            "jsonl" => Ok(SelectInput::JsonLines),
            "parquet" => Ok(SelectInput::Parquet),
            other => Err(PrimitiveError::invalid(
                format!("unknown select input format '{other}'"),
                "Use one of: csv, json, jsonl, parquet.",
            )),
        }
    }
}

/// Supported select output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutput {
    Csv,
    Json,
}

impl SelectOutput {
    pub fn parse(raw: &str) -> Result<Self, PrimitiveError> {
        match raw {
            "csv" => Ok(SelectOutput::Csv),
            "json" => Ok(SelectOutput::Json),
            other => Err(PrimitiveError::invalid(
                format!("unknown select output format '{other}'"),
                "Use one of: csv, json.",
            )),
        }
    }
}

/// Metadata-only HEAD.
pub async fn head(
    store: &BlobStore,
    uri: &S3Uri,
    version_id: Option<&str>,
) -> Result<HeadOutcome, PrimitiveError> {
    let mut request = store
        .client()
        .head_object()
        .bucket(&uri.bucket)
        .key(&uri.key);
    if let Some(version) = version_id {
        request = request.version_id(version);
    }
    let output = request
        .send()
        .await
        .map_err(|e| classify(&e, &uri.to_string()))?;

    Ok(HeadOutcome {
        bucket: uri.bucket.clone(),
        key: uri.key.clone(),
        size: output.content_length().unwrap_or(0) as u64,
        etag: output
            .e_tag()
            .map(|t| t.trim_matches('"').to_string())
            .unwrap_or_default(),
        version_id: output.version_id().map(str::to_string),
        storage_class: output
            .storage_class()
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| "STANDARD".to_string()),
        content_type: output.content_type().map(str::to_string),
        last_modified: output.last_modified().map(|t| t.to_string()),
        metadata: output
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default(),
    })
}

/// Replace the object's tag set.
pub async fn tag(
    store: &BlobStore,
    uri: &S3Uri,
    tags: &[(String, String)],
) -> Result<(), PrimitiveError> {
    let mut tag_set = Vec::with_capacity(tags.len());
    for (key, value) in tags {
        tag_set.push(
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| PrimitiveError::invalid(
                    format!("invalid tag '{key}': {e}"),
                    "Tags are KEY=VALUE pairs.",
                ))?,
        );
    }
    let tagging = Tagging::builder()
        .set_tag_set(Some(tag_set))
        .build()
        .map_err(|e| PrimitiveError::invalid(
            format!("invalid tag set: {e}"),
            "Provide at least one KEY=VALUE tag.",
        ))?;

    store
        .client()
        .put_object_tagging()
        .bucket(&uri.bucket)
        .key(&uri.key)
        .tagging(tagging)
        .send()
        .await
        .map_err(|e| classify(&e, &uri.to_string()))?;
    debug!(%uri, "tags replaced");
    Ok(())
}

/// Read the object's tag set.
pub async fn get_tags(
    store: &BlobStore,
    uri: &S3Uri,
) -> Result<BTreeMap<String, String>, PrimitiveError> {
    let output = store
        .client()
        .get_object_tagging()
        .bucket(&uri.bucket)
        .key(&uri.key)
        .send()
        .await
        .map_err(|e| classify(&e, &uri.to_string()))?;
    Ok(output
        .tag_set()
        .iter()
        .map(|tag| (tag.key().to_string(), tag.value().to_string()))
        .collect())
}

/// Remove every tag from the object.
pub async fn untag(store: &BlobStore, uri: &S3Uri) -> Result<(), PrimitiveError> {
    store
        .client()
        .delete_object_tagging()
        .bucket(&uri.bucket)
        .key(&uri.key)
        .send()
        .await
        .map_err(|e| classify(&e, &uri.to_string()))?;
    Ok(())
}

/// Enumerate versions of one key, newest first.
pub async fn list_versions(
    store: &BlobStore,
    uri: &S3Uri,
    limit: Option<u32>,
) -> Result<Vec<VersionEntry>, PrimitiveError> {
    let mut versions = Vec::new();
    let mut key_marker: Option<String> = None;
    let mut version_marker: Option<String> = None;

    loop {
        let mut request = store
            .client()
            .list_object_versions()
            .bucket(&uri.bucket)
            .prefix(&uri.key);
        if let Some(marker) = key_marker.take() {
            request = request.key_marker(marker);
        }
        if let Some(marker) = version_marker.take() {
            request = request.version_id_marker(marker);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(&e, &uri.to_string()))?;

        for version in response.versions() {
            // Prefix listing may pick up sibling keys; keep exact matches.
            if version.key() != Some(uri.key.as_str()) {
                continue;
            }
            versions.push(VersionEntry {
                version_id: version.version_id().unwrap_or("null").to_string(),
                is_latest: version.is_latest().unwrap_or(false),
                size: version.size().unwrap_or(0) as u64,
                etag: version
                    .e_tag()
                    .map(|t| t.trim_matches('"').to_string())
                    .unwrap_or_default(),
                last_modified: version.last_modified().map(|t| t.to_string()),
            });
            if let Some(limit) = limit {
                if versions.len() >= limit as usize {
                    return Ok(versions);
                }
            }
        }

        if response.is_truncated().unwrap_or(false) {
            key_marker = response.next_key_marker().map(str::to_string);
            version_marker = response.next_version_id_marker().map(str::to_string);
        } else {
            break;
        }
    }
    Ok(versions)
}

/// Produce a time-limited URL signed with the current credentials. No
/// network access is involved.
pub async fn presign(
    store: &BlobStore,
    uri: &S3Uri,
    method: &str,
    expires_in_secs: u64,
) -> Result<PresignedUrl, PrimitiveError> {
    let config = PresigningConfig::expires_in(Duration::from_secs(expires_in_secs)).map_err(|e| {
        PrimitiveError::invalid(
            format!("invalid expiry {expires_in_secs}s: {e}"),
            "Presigned URLs may live between 1 second and 7 days.",
        )
    })?;

    let presigned = match method {
        "GET" => store
            .client()
            .get_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .presigned(config)
            .await
            .map_err(|e| classify(&e, &uri.to_string()))?,
        "PUT" => store
            .client()
            .put_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .presigned(config)
            .await
            .map_err(|e| classify(&e, &uri.to_string()))?,
        other => {
            return Err(PrimitiveError::invalid(
                format!("unsupported presign method '{other}'"),
                "Use --method GET or --method PUT.",
            ))
        }
    };

    Ok(PresignedUrl {
        bucket: uri.bucket.clone(),
        key: uri.key.clone(),
        method: method.to_string(),
        url: presigned.uri().to_string(),
        expires_in: expires_in_secs,
        expires_at: now_unix_secs() + expires_in_secs,
    })
}

/// Run a server-side selection and stream the result records to `writer`.
/// Returns the number of payload bytes written.
pub async fn select(
    store: &BlobStore,
    uri: &S3Uri,
    query: &str,
    input: SelectInput,
    output: SelectOutput,
    writer: &mut (impl tokio::io::AsyncWrite + Unpin),
) -> Result<u64, PrimitiveError> {
    let input_serialization = match input {
        SelectInput::Csv => InputSerialization::builder()
            .csv(CsvInput::builder().file_header_info(FileHeaderInfo::Use).build())
            .compression_type(CompressionType::None)
            .build(),
        SelectInput::Json => InputSerialization::builder()
            .json(JsonInput::builder().r#type(JsonType::Document).build())
            .compression_type(CompressionType::None)
            .build(),
        SelectInput::JsonLines => InputSerialization::builder()
            .json(JsonInput::builder().r#type(JsonType::Lines).build())
            .compression_type(CompressionType::None)
            .build(),
        SelectInput::Parquet => InputSerialization::builder()
            .parquet(ParquetInput::builder().build())
            .build(),
    };
    let output_serialization = match output {
        SelectOutput::Csv => OutputSerialization::builder()
            .csv(CsvOutput::builder().build())
            .build(),
        SelectOutput::Json => OutputSerialization::builder()
            .json(JsonOutput::builder().build())
            .build(),
    };

    let mut response = store
        .client()
        .select_object_content()
        .bucket(&uri.bucket)
        .key(&uri.key)
        .expression(query)
        .expression_type(ExpressionType::Sql)
        .input_serialization(input_serialization)
        .output_serialization(output_serialization)
        .send()
        .await
        .map_err(|e| classify(&e, &uri.to_string()))?;

    let mut written = 0u64;
    loop {
        let event = response
            .payload
            .recv()
            .await
            .map_err(|e| PrimitiveError::Service {
                message: format!("select stream error for {uri}: {e}"),
            })?;
        match event {
            Some(SelectObjectContentEventStream::Records(records)) => {
                if let Some(payload) = records.payload() {
                    let bytes = payload.as_ref();
                    written += bytes.len() as u64;
                    writer.write_all(bytes).await.map_err(|e| PrimitiveError::Service {
                        message: format!("write error streaming select output: {e}"),
                    })?;
                }
            }
            Some(SelectObjectContentEventStream::End(_)) | None => break,
            // Progress/stats/continuation events carry no records.
            Some(_) => {}
        }
    }
    writer.flush().await.map_err(|e| PrimitiveError::Service {
        message: format!("flush error streaming select output: {e}"),
    })?;

    debug!(%uri, written, "select complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_formats_parse() {
        assert_eq!(SelectInput::parse("csv").unwrap(), SelectInput::Csv);
        assert_eq!(SelectInput::parse("jsonl").unwrap(), SelectInput::JsonLines);
        assert_eq!(SelectInput::parse("parquet").unwrap(), SelectInput::Parquet);
        assert!(SelectInput::parse("xml").is_err());

        assert_eq!(SelectOutput::parse("json").unwrap(), SelectOutput::Json);
        assert!(SelectOutput::parse("parquet").is_err());
    }
}
