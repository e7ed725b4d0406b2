//! The blob transfer engine: uploads, downloads, and chunk planning.
//!
//! Small sources go up as one PUT; anything at or above the multipart
//! threshold is split into planned chunks uploaded by a bounded worker
//! pool, with per-part retries and an explicit abort path so a failed or
//! timed-out upload never leaves parts behind. Downloads stream the body
//! to the destination without buffering the whole object.

use std::path::Path;
use std::time::Instant;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::CompletedMultipartUpload;
use aws_sdk_s3::types::CompletedPart;
use aws_sdk_s3::types::StorageClass;
use awsprim_core::constants::MAX_CHUNK_SIZE;
use awsprim_core::constants::MAX_MULTIPART_PARTS;
use awsprim_core::constants::MIN_CHUNK_SIZE;
use awsprim_core::now_unix_secs;
use awsprim_core::PrimitiveError;
use awsprim_core::RetryPolicy;
use futures::stream;
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncSeekExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::warn;

use crate::store::classify;
use crate::store::is_precondition_failed;
use crate::store::BlobStore;
use crate::uri::ByteRange;
use crate::uri::LocalEndpoint;
use crate::uri::S3Uri;

/// Engine knobs, resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// Single-PUT vs multipart threshold in bytes.
    pub multipart_threshold: u64,
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Worker pool size.
    pub concurrency: usize,
    /// Absolute deadline for the whole operation.
    pub deadline: Option<Instant>,
}

/// Conditional modes for a put.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PutCondition {
    #[default]
    None,
    /// Fail when the object already exists.
    IfNotExists,
    /// Fail unless the stored ETag matches.
    IfMatch(String),
}

/// Options for a put.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Explicit content type; detected from the key extension otherwise.
    pub content_type: Option<String>,
    /// User metadata pairs.
    pub metadata: Vec<(String, String)>,
    /// Object tags.
    pub tags: Vec<(String, String)>,
    /// Storage class name (e.g. STANDARD_IA, GLACIER).
    pub storage_class: Option<String>,
    pub condition: PutCondition,
}

/// Result of an upload.
#[derive(Debug, Clone, Serialize)]
pub struct PutOutcome {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    pub storage_class: String,
    pub uploaded_at: u64,
    /// Part count when the upload went multipart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<usize>,
}

/// Result of a download.
#[derive(Debug, Clone, Serialize)]
pub struct GetOutcome {
    pub bucket: String,
    pub key: String,
    /// Bytes written to the destination.
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub destination: String,
}

/// One planned multipart chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    /// 1-based part number.
    pub part_number: i32,
    pub offset: u64,
    pub size: u64,
}

/// Split `total_size` bytes into multipart chunks.
///
/// The chunk size must sit inside the service's 5 MiB..5 GiB window
/// (the final part may be smaller), and the plan must not exceed 10,000
/// parts.
pub fn plan_parts(total_size: u64, chunk_size: u64) -> Result<Vec<PartPlan>, PrimitiveError> {
    if chunk_size < MIN_CHUNK_SIZE || chunk_size > MAX_CHUNK_SIZE {
        return Err(PrimitiveError::invalid(
            format!(
                "chunk size {chunk_size} is outside the allowed {MIN_CHUNK_SIZE}..{MAX_CHUNK_SIZE} range"
            ),
            "Adjust AWSPRIM_CHUNK_SIZE to between 5 MiB and 5 GiB.",
        ));
    }
    let count = total_size.div_ceil(chunk_size);
    if count > MAX_MULTIPART_PARTS {
        return Err(PrimitiveError::invalid(
            format!("{total_size} bytes at this chunk size needs {count} parts; the maximum is {MAX_MULTIPART_PARTS}"),
            "Raise AWSPRIM_CHUNK_SIZE so the object fits in 10000 parts.",
        ));
    }

    let mut parts = Vec::with_capacity(count as usize);
    let mut offset = 0;
    let mut part_number = 1;
    while offset < total_size {
        let size = chunk_size.min(total_size - offset);
        parts.push(PartPlan {
            part_number,
            offset,
            size,
        });
        offset += size;
        part_number += 1;
    }
    Ok(parts)
}

/// Detect a content type from the key's extension.
pub fn detect_content_type(key: &str) -> Option<String> {
    mime_guess::from_path(key).first_raw().map(str::to_string)
}

fn tagging_header(tags: &[(String, String)]) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn deadline_error(what: &str) -> PrimitiveError {
    PrimitiveError::Timeout {
        message: format!("{what} exceeded the operation deadline"),
    }
}

async fn read_part(path: &Path, part: PartPlan) -> Result<Vec<u8>, PrimitiveError> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| PrimitiveError::Service {
        message: format!("cannot open '{}': {e}", path.display()),
    })?;
    file.seek(std::io::SeekFrom::Start(part.offset))
        .await
        .map_err(|e| PrimitiveError::Service {
            message: format!("cannot seek '{}': {e}", path.display()),
        })?;
    let mut buffer = vec![0u8; part.size as usize];
    file.read_exact(&mut buffer)
        .await
        .map_err(|e| PrimitiveError::Service {
            message: format!("cannot read '{}': {e}", path.display()),
        })?;
    Ok(buffer)
}

/// Upload a local file to one object.
pub async fn upload_file(
    store: &BlobStore,
    target: &S3Uri,
    path: &Path,
    options: &PutOptions,
    config: &TransferConfig,
) -> Result<PutOutcome, PrimitiveError> {
    let size = tokio::fs::metadata(path)
        .await
        .map_err(|e| PrimitiveError::invalid(
            format!("cannot stat '{}': {e}", path.display()),
            "Check that the source file exists and is readable.",
        ))?
        .len();

    if size <= config.multipart_threshold {
        upload_single(store, target, path, size, options, config).await
    } else {
        upload_multipart(store, target, path, size, options, config).await
    }
}

async fn upload_single(
    store: &BlobStore,
    target: &S3Uri,
    path: &Path,
    size: u64,
    options: &PutOptions,
    config: &TransferConfig,
) -> Result<PutOutcome, PrimitiveError> {
    let body = ByteStream::from_path(path).await.map_err(|e| PrimitiveError::Service {
        message: format!("cannot stream '{}': {e}", path.display()),
    })?;

    let mut request = store
        .client()
        .put_object()
        .bucket(&target.bucket)
        .key(&target.key)
        .body(body);

    let content_type = options
        .content_type
        .clone()
        .or_else(|| detect_content_type(&target.key));
    if let Some(content_type) = content_type {
        request = request.content_type(content_type);
    }
    for (k, v) in &options.metadata {
        request = request.metadata(k, v);
    }
    if !options.tags.is_empty() {
        request = request.tagging(tagging_header(&options.tags));
    }
    let storage_class = options.storage_class.clone().unwrap_or_else(|| "STANDARD".to_string());
    if options.storage_class.is_some() {
        request = request.storage_class(StorageClass::from(storage_class.as_str()));
    }
    match &options.condition {
        PutCondition::None => {}
        PutCondition::IfNotExists => request = request.if_none_match("*"),
        PutCondition::IfMatch(etag) => request = request.if_match(quote_etag(etag)),
    }

    let send = request.send();
    let response = match config.deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.into(), send)
            .await
            .map_err(|_| deadline_error("upload"))?,
        None => send.await,
    };

    let output = match response {
        Ok(output) => output,
        Err(e) if is_precondition_failed(&e) => {
            return Err(match &options.condition {
                PutCondition::IfNotExists => PrimitiveError::AlreadyExists {
                    message: format!("{target} already exists"),
                    solution: "Drop --if-not-exists to overwrite the object.".to_string(),
                },
                _ => PrimitiveError::ConditionFailed {
                    message: format!("{target} does not match the expected ETag"),
                    solution: "Re-read the object's ETag with 'awsprim blob head' and retry."
                        .to_string(),
                },
            });
        }
        Err(e) => return Err(classify(&e, &target.to_string())),
    };

    debug!(%target, size, "single put complete");
    Ok(PutOutcome {
        bucket: target.bucket.clone(),
        key: target.key.clone(),
        size,
        etag: output.e_tag().map(trim_etag).unwrap_or_default(),
        version_id: output.version_id().map(str::to_string),
        storage_class,
        uploaded_at: now_unix_secs(),
        parts: None,
    })
}

async fn upload_multipart(
    store: &BlobStore,
    target: &S3Uri,
    path: &Path,
    size: u64,
    options: &PutOptions,
    config: &TransferConfig,
) -> Result<PutOutcome, PrimitiveError> {
    // Conditional modes are checked up front here; the final completion is
    // unconditional. A concurrent writer can still slip in between, which
    // single-PUT conditions do not allow.
    match &options.condition {
        PutCondition::None => {}
        PutCondition::IfNotExists => {
            if head_etag(store, target).await?.is_some() {
                return Err(PrimitiveError::AlreadyExists {
                    message: format!("{target} already exists"),
                    solution: "Drop --if-not-exists to overwrite the object.".to_string(),
                });
            }
        }
        PutCondition::IfMatch(expected) => match head_etag(store, target).await? {
            Some(actual) if actual == trim_etag(expected) => {}
            _ => {
                return Err(PrimitiveError::ConditionFailed {
                    message: format!("{target} does not match the expected ETag"),
                    solution: "Re-read the object's ETag with 'awsprim blob head' and retry."
                        .to_string(),
                })
            }
        },
    }

    let plan = plan_parts(size, config.chunk_size)?;

    let mut create = store
        .client()
        .create_multipart_upload()
        .bucket(&target.bucket)
        .key(&target.key);
    let content_type = options
        .content_type
        .clone()
        .or_else(|| detect_content_type(&target.key));
    if let Some(content_type) = content_type {
        create = create.content_type(content_type);
    }
    for (k, v) in &options.metadata {
        create = create.metadata(k, v);
    }
    if !options.tags.is_empty() {
        create = create.tagging(tagging_header(&options.tags));
    }
    let storage_class = options.storage_class.clone().unwrap_or_else(|| "STANDARD".to_string());
    if options.storage_class.is_some() {
        create = create.storage_class(StorageClass::from(storage_class.as_str()));
    }

    let created = create
        .send()
        .await
        .map_err(|e| classify(&e, &target.to_string()))?;
    let upload_id = created.upload_id().unwrap_or_default().to_string();
    if upload_id.is_empty() {
        return Err(PrimitiveError::Service {
            message: format!("{target}: multipart initiation returned no upload id"),
        });
    }
    debug!(%target, parts = plan.len(), upload_id, "multipart upload started");

    let upload_all = upload_parts(store, target, path, &upload_id, &plan, config.concurrency);
    let parts_result = match config.deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline.into(), upload_all).await {
            Ok(result) => result,
            Err(_) => Err(deadline_error("multipart upload")),
        },
        None => upload_all.await,
    };

    let mut completed_parts = match parts_result {
        Ok(parts) => parts,
        Err(e) => {
            abort_upload(store, target, &upload_id).await;
            return Err(e);
        }
    };
    completed_parts.sort_by_key(|(part_number, _)| *part_number);

    let completed = CompletedMultipartUpload::builder()
        .set_parts(Some(
            completed_parts
                .iter()
                .map(|(part_number, etag)| {
                    CompletedPart::builder()
                        .part_number(*part_number)
                        .e_tag(etag)
                        .build()
                })
                .collect(),
        ))
        .build();

    let output = match store
        .client()
        .complete_multipart_upload()
        .bucket(&target.bucket)
        .key(&target.key)
        .upload_id(&upload_id)
        .multipart_upload(completed)
        .send()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            abort_upload(store, target, &upload_id).await;
            return Err(classify(&e, &target.to_string()));
        }
    };

    debug!(%target, size, parts = completed_parts.len(), "multipart upload complete");
    Ok(PutOutcome {
        bucket: target.bucket.clone(),
        key: target.key.clone(),
        size,
        etag: output.e_tag().map(trim_etag).unwrap_or_default(),
        version_id: output.version_id().map(str::to_string),
        storage_class,
        uploaded_at: now_unix_secs(),
        parts: Some(completed_parts.len()),
    })
}

async fn upload_parts(
    store: &BlobStore,
    target: &S3Uri,
    path: &Path,
    upload_id: &str,
    plan: &[PartPlan],
    concurrency: usize,
) -> Result<Vec<(i32, String)>, PrimitiveError> {
    let retry = RetryPolicy::default();

    let mut tasks = stream::iter(plan.iter().copied().map(|part| {
        let store = store.clone();
        let target = target.clone();
        let path = path.to_path_buf();
        let upload_id = upload_id.to_string();
        async move {
            retry
                .run("upload part", PrimitiveError::is_transient, || {
                    let store = store.clone();
                    let target = target.clone();
                    let path = path.clone();
                    let upload_id = upload_id.clone();
                    async move {
                        let body = read_part(&path, part).await?;
                        let response = store
                            .client()
                            .upload_part()
                            .bucket(&target.bucket)
                            .key(&target.key)
                            .upload_id(&upload_id)
                            .part_number(part.part_number)
                            .body(ByteStream::from(body))
                            .send()
                            .await
                            .map_err(|e| classify(&e, &target.to_string()))?;
                        Ok::<_, PrimitiveError>((
                            part.part_number,
                            response.e_tag().map(trim_etag).unwrap_or_default(),
                        ))
                    }
                })
                .await
        }
    }))
    .buffer_unordered(concurrency.max(1));

    let mut completed = Vec::with_capacity(plan.len());
    while let Some(result) = tasks.next().await {
        completed.push(result?);
    }
    Ok(completed)
}

async fn abort_upload(store: &BlobStore, target: &S3Uri, upload_id: &str) {
    if let Err(e) = store
        .client()
        .abort_multipart_upload()
        .bucket(&target.bucket)
        .key(&target.key)
        .upload_id(upload_id)
        .send()
        .await
    {
        warn!(%target, upload_id, error = ?e, "failed to abort multipart upload");
    }
}

async fn head_etag(store: &BlobStore, target: &S3Uri) -> Result<Option<String>, PrimitiveError> {
    match store
        .client()
        .head_object()
        .bucket(&target.bucket)
        .key(&target.key)
        .send()
        .await
    {
        Ok(output) => Ok(output.e_tag().map(trim_etag)),
        Err(e) => match classify(&e, &target.to_string()) {
            PrimitiveError::NotFound { .. } => Ok(None),
            other => Err(other),
        },
    }
}

/// Options for a download.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub range: Option<ByteRange>,
    pub if_match: Option<String>,
    /// RFC 3339 timestamp for If-Modified-Since.
    pub if_modified_since: Option<String>,
}

/// Download one object to a file or standard output, streaming the body.
pub async fn download(
    store: &BlobStore,
    source: &S3Uri,
    destination: &LocalEndpoint,
    options: &GetOptions,
    config: &TransferConfig,
) -> Result<GetOutcome, PrimitiveError> {
    let mut request = store
        .client()
        .get_object()
        .bucket(&source.bucket)
        .key(&source.key);
    if let Some(range) = options.range {
        request = request.range(range.header_value());
    }
    if let Some(etag) = &options.if_match {
        request = request.if_match(quote_etag(etag));
    }
    if let Some(since) = &options.if_modified_since {
        let parsed = aws_smithy_types::DateTime::from_str(
            since,
            aws_smithy_types::date_time::Format::DateTime,
        )
        .map_err(|e| PrimitiveError::invalid(
            format!("invalid --if-modified-since timestamp '{since}': {e}"),
            "Pass an RFC 3339 timestamp, e.g. 2026-01-31T00:00:00Z.",
        ))?;
        request = request.if_modified_since(parsed);
    }

    let send = request.send();
    let response = match config.deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.into(), send)
            .await
            .map_err(|_| deadline_error("download"))?,
        None => send.await,
    }
    .map_err(|e| classify(&e, &source.to_string()))?;

    let etag = response.e_tag().map(trim_etag);
    let mut body = response.body;

    let (mut writer, destination_name): (Box<dyn tokio::io::AsyncWrite + Unpin + Send>, String) =
        match destination {
            LocalEndpoint::Stdio => (Box::new(tokio::io::stdout()), "-".to_string()),
            LocalEndpoint::Path(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        PrimitiveError::Service {
                            message: format!("cannot create '{}': {e}", parent.display()),
                        }
                    })?;
                }
                let file = tokio::fs::File::create(path).await.map_err(|e| {
                    PrimitiveError::Service {
                        message: format!("cannot create '{}': {e}", path.display()),
                    }
                })?;
                (Box::new(file), path.display().to_string())
            }
        };

    let mut written = 0u64;
    loop {
        let chunk = match config.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.into(), body.try_next())
                .await
                .map_err(|_| deadline_error("download"))?,
            None => body.try_next().await,
        }
        .map_err(|e| PrimitiveError::Service {
            message: format!("stream error reading {source}: {e}"),
        })?;
        let Some(chunk) = chunk else { break };
        written += chunk.len() as u64;
        writer.write_all(&chunk).await.map_err(|e| PrimitiveError::Service {
            message: format!("write error on '{destination_name}': {e}"),
        })?;
    }
    writer.flush().await.map_err(|e| PrimitiveError::Service {
        message: format!("flush error on '{destination_name}': {e}"),
    })?;

    debug!(%source, written, destination = %destination_name, "download complete");
    Ok(GetOutcome {
        bucket: source.bucket.clone(),
        key: source.key.clone(),
        size: written,
        etag,
        destination: destination_name,
    })
}

fn quote_etag(etag: &str) -> String {
    if etag.starts_with('"') {
        etag.to_string()
    } else {
        format!("\"{etag}\"")
    }
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn small_objects_plan_one_part() {
        let parts = plan_parts(MIN_CHUNK_SIZE, MIN_CHUNK_SIZE).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].part_number, 1);
        assert_eq!(parts[0].size, MIN_CHUNK_SIZE);
    }

    #[test]
    fn plans_cover_every_byte_in_order() {
        let total = 250 * MIB;
        let chunk = 100 * MIB;
        let parts = plan_parts(total, chunk).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].size, chunk);
        assert_eq!(parts[1].offset, chunk);
        // The final part carries the remainder and may be under the floor.
        assert_eq!(parts[2].size, 50 * MIB);
        let covered: u64 = parts.iter().map(|p| p.size).sum();
        assert_eq!(covered, total);
    }

    #[test]
    fn chunk_size_window_is_enforced() {
        assert!(plan_parts(MIB, MIB).is_err()); // below the 5 MiB floor
        assert!(plan_parts(MIB, MAX_CHUNK_SIZE + 1).is_err());
    }

    #[test]
    fn part_count_cap_is_enforced() {
        let too_big = MIN_CHUNK_SIZE * (MAX_MULTIPART_PARTS + 1);
        assert!(plan_parts(too_big, MIN_CHUNK_SIZE).is_err());
        let just_fits = MIN_CHUNK_SIZE * MAX_MULTIPART_PARTS;
        assert_eq!(
            plan_parts(just_fits, MIN_CHUNK_SIZE).unwrap().len() as u64,
            MAX_MULTIPART_PARTS
        );
    }

    #[test]
    fn content_type_detection() {
        assert_eq!(detect_content_type("a/b.json").as_deref(), Some("application/json"));
        assert_eq!(detect_content_type("a/b.unknownext"), None);
    }

    #[test]
    fn etag_quoting_round_trips() {
        assert_eq!(quote_etag("abc"), "\"abc\"");
        assert_eq!(quote_etag("\"abc\""), "\"abc\"");
        assert_eq!(trim_etag("\"abc\""), "abc");
    }

    #[test]
    fn tagging_header_joins_pairs() {
        let tags = vec![("env".to_string(), "prod".to_string()), ("team".to_string(), "infra".to_string())];
        assert_eq!(tagging_header(&tags), "env=prod&team=infra");
    }
}
