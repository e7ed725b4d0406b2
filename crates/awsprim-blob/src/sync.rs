//! Directory transfers and idempotent synchronization.
//!
//! Both sides enumerate to `(relative key, size, etag)`; the planner diffs
//! the two maps and schedules copies for new or changed keys (ETag
//! comparison by default, size with `--size-only`) and, with `--delete`,
//! removals of destination-only keys. Execution fans the scheduled work
//! out on the bounded pool; one file's failure is recorded, not fatal,
//! unless fail-fast is requested.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use awsprim_core::PrimitiveError;
use futures::stream;
use futures::StreamExt;
use serde::Serialize;
use tracing::debug;

use crate::store::classify;
use crate::store::BlobStore;
use crate::transfer::download;
use crate::transfer::upload_file;
use crate::transfer::GetOptions;
use crate::transfer::PutOptions;
use crate::transfer::TransferConfig;
use crate::uri::LocalEndpoint;
use crate::uri::S3Uri;
use crate::walk::walk_files;
use crate::walk::GlobFilter;

/// Comparable summary of one side's entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub size: u64,
    /// Absent when an ETag cannot be computed (e.g. large local files).
    pub etag: Option<String>,
}

/// How entries are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Etag,
    SizeOnly,
}

/// The scheduled work for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Keys to copy from source to destination.
    pub copies: Vec<String>,
    /// Destination-only keys to remove (only with `--delete`).
    pub deletes: Vec<String>,
    /// Keys already in sync.
    pub unchanged: Vec<String>,
}

/// Diff two enumerations into a plan.
pub fn plan_sync(
    source: &BTreeMap<String, EntrySummary>,
    destination: &BTreeMap<String, EntrySummary>,
    comparison: Comparison,
    delete_extra: bool,
) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for (key, entry) in source {
        match destination.get(key) {
            None => plan.copies.push(key.clone()),
            Some(existing) => {
                let same = match comparison {
                    Comparison::SizeOnly => existing.size == entry.size,
                    Comparison::Etag => match (&entry.etag, &existing.etag) {
                        (Some(a), Some(b)) => a == b,
                        // No comparable ETag on either side: fall back to size.
                        _ => existing.size == entry.size,
                    },
                };
                if same {
                    plan.unchanged.push(key.clone());
                } else {
                    plan.copies.push(key.clone());
                }
            }
        }
    }

    if delete_extra {
        for key in destination.keys() {
            if !source.contains_key(key) {
                plan.deletes.push(key.clone());
            }
        }
    }

    plan
}

/// Per-file transfer outcome.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub key: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate report for a directory transfer or sync.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub transferred: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub files: Vec<FileResult>,
}

impl TransferReport {
    fn from_results(results: Vec<FileResult>, deleted: usize, unchanged: usize) -> Self {
        let failed = results.iter().filter(|r| !r.ok).count();
        Self {
            transferred: results.len() - failed,
            deleted,
            unchanged,
            failed,
            files: results,
        }
    }
}

/// Upload every matching file under `root` to the destination prefix.
pub async fn upload_dir(
    store: &BlobStore,
    root: &Path,
    destination: &S3Uri,
    filter: &GlobFilter,
    options: &PutOptions,
    config: &TransferConfig,
    fail_fast: bool,
) -> Result<TransferReport, PrimitiveError> {
    let files = walk_files(root, filter)?;
    debug!(root = %root.display(), files = files.len(), "directory upload starting");

    let mut tasks = stream::iter(files.into_iter().map(|file| {
        let target = destination.join(&file.relative_key);
        async move {
            let outcome = upload_file(store, &target, &file.path, options, config).await;
            FileResult {
                key: file.relative_key,
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            }
        }
    }))
    .buffer_unordered(config.concurrency.max(1));

    let mut results = Vec::new();
    while let Some(result) = tasks.next().await {
        let failed = !result.ok;
        results.push(result);
        if failed && fail_fast {
            break;
        }
    }
    results.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(TransferReport::from_results(results, 0, 0))
}

/// Download every object under the source prefix into `root`.
pub async fn download_dir(
    store: &BlobStore,
    source: &S3Uri,
    root: &Path,
    filter: &GlobFilter,
    config: &TransferConfig,
    fail_fast: bool,
) -> Result<TransferReport, PrimitiveError> {
    let entries = list_remote(store, source).await?;
    let keys: Vec<String> = entries
        .keys()
        .filter(|key| filter.matches(key))
        .cloned()
        .collect();
    debug!(%source, objects = keys.len(), "directory download starting");

    let mut tasks = stream::iter(keys.into_iter().map(|key| {
        let object = source.join(&key);
        let path: PathBuf = root.join(key.split('/').collect::<PathBuf>());
        async move {
            let outcome = download(
                store,
                &object,
                &LocalEndpoint::Path(path),
                &GetOptions::default(),
                config,
            )
            .await;
            FileResult {
                key,
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            }
        }
    }))
    .buffer_unordered(config.concurrency.max(1));

    let mut results = Vec::new();
    while let Some(result) = tasks.next().await {
        let failed = !result.ok;
        results.push(result);
        if failed && fail_fast {
            break;
        }
    }
    results.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(TransferReport::from_results(results, 0, 0))
}

/// Synchronize a local directory up to an object prefix.
pub async fn sync_up(
    store: &BlobStore,
    root: &Path,
    destination: &S3Uri,
    filter: &GlobFilter,
    comparison: Comparison,
    delete_extra: bool,
    config: &TransferConfig,
) -> Result<TransferReport, PrimitiveError> {
    let files = walk_files(root, filter)?;
    let mut local: BTreeMap<String, EntrySummary> = BTreeMap::new();
    let mut paths: BTreeMap<String, PathBuf> = BTreeMap::new();
    for file in files {
        let etag = match comparison {
            Comparison::Etag if file.size <= config.multipart_threshold => {
                Some(local_etag(&file.path).await?)
            }
            _ => None,
        };
        local.insert(
            file.relative_key.clone(),
            EntrySummary { size: file.size, etag },
        );
        paths.insert(file.relative_key, file.path);
    }

    let remote = list_remote(store, destination).await?;
    let plan = plan_sync(&local, &remote, comparison, delete_extra);
    debug!(copies = plan.copies.len(), deletes = plan.deletes.len(), unchanged = plan.unchanged.len(), "sync planned");

    let options = PutOptions::default();
    let mut tasks = stream::iter(plan.copies.iter().cloned().map(|key| {
        let path = paths.get(&key).cloned();
        let target = destination.join(&key);
        let options = &options;
        async move {
            let outcome = match path {
                Some(path) => upload_file(store, &target, &path, options, config).await.map(|_| ()),
                None => Err(PrimitiveError::Service {
                    message: format!("planned copy for unknown key '{key}'"),
                }),
            };
            FileResult {
                key,
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            }
        }
    }))
    .buffer_unordered(config.concurrency.max(1));

    let mut results = Vec::new();
    while let Some(result) = tasks.next().await {
        results.push(result);
    }

    let mut deleted = 0;
    for key in &plan.deletes {
        let target = destination.join(key);
        store
            .client()
            .delete_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .send()
            .await
            .map_err(|e| classify(&e, &target.to_string()))?;
        deleted += 1;
    }

    results.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(TransferReport::from_results(results, deleted, plan.unchanged.len()))
}

/// Enumerate a remote prefix to comparable summaries keyed by relative key.
pub async fn list_remote(
    store: &BlobStore,
    prefix: &S3Uri,
) -> Result<BTreeMap<String, EntrySummary>, PrimitiveError> {
    let mut entries = BTreeMap::new();
    let mut continuation: Option<String> = None;
    let base = if prefix.key.is_empty() || prefix.key.ends_with('/') {
        prefix.key.clone()
    } else {
        format!("{}/", prefix.key)
    };

    loop {
        let mut request = store
            .client()
            .list_objects_v2()
            .bucket(&prefix.bucket)
            .prefix(&base);
        if let Some(token) = continuation.take() {
            request = request.continuation_token(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| classify(&e, &prefix.to_string()))?;

        for object in response.contents() {
            let Some(key) = object.key() else { continue };
            let relative = key.strip_prefix(&base).unwrap_or(key).to_string();
            if relative.is_empty() {
                continue;
            }
            entries.insert(
                relative,
                EntrySummary {
                    size: object.size().unwrap_or(0) as u64,
                    etag: object.e_tag().map(|t| t.trim_matches('"').to_string()),
                },
            );
        }

        match response.next_continuation_token() {
            Some(token) => continuation = Some(token.to_string()),
            None => break,
        }
    }
    Ok(entries)
}

/// MD5 of a local file, matching the ETag of a simple (non-multipart) PUT.
async fn local_etag(path: &Path) -> Result<String, PrimitiveError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| PrimitiveError::Service {
        message: format!("cannot read '{}': {e}", path.display()),
    })?;
    Ok(format!("{:x}", md5::compute(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: u64, etag: Option<&str>) -> EntrySummary {
        EntrySummary {
            size,
            etag: etag.map(str::to_string),
        }
    }

    fn side(entries: &[(&str, u64, Option<&str>)]) -> BTreeMap<String, EntrySummary> {
        entries
            .iter()
            .map(|(key, size, etag)| (key.to_string(), entry(*size, *etag)))
            .collect()
    }

    #[test]
    fn new_keys_are_copied() {
        let plan = plan_sync(
            &side(&[("a", 1, Some("x")), ("b", 2, Some("y"))]),
            &side(&[("a", 1, Some("x"))]),
            Comparison::Etag,
            false,
        );
        assert_eq!(plan.copies, vec!["b"]);
        assert_eq!(plan.unchanged, vec!["a"]);
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn changed_etags_are_copied() {
        let plan = plan_sync(
            &side(&[("a", 1, Some("new"))]),
            &side(&[("a", 1, Some("old"))]),
            Comparison::Etag,
            false,
        );
        assert_eq!(plan.copies, vec!["a"]);
    }

    #[test]
    fn size_only_ignores_etags() {
        let plan = plan_sync(
            &side(&[("a", 1, Some("new"))]),
            &side(&[("a", 1, Some("old"))]),
            Comparison::SizeOnly,
            false,
        );
        assert_eq!(plan.unchanged, vec!["a"]);

        let plan = plan_sync(
            &side(&[("a", 2, None)]),
            &side(&[("a", 1, None)]),
            Comparison::SizeOnly,
            false,
        );
        assert_eq!(plan.copies, vec!["a"]);
    }

    #[test]
    fn missing_etags_fall_back_to_size() {
        let plan = plan_sync(
            &side(&[("big", 500, None)]),
            &side(&[("big", 500, Some("multipart-etag"))]),
            Comparison::Etag,
            false,
        );
        assert_eq!(plan.unchanged, vec!["big"]);
    }

    #[test]
    fn delete_removes_destination_only_keys() {
        let plan = plan_sync(
            &side(&[("keep", 1, Some("x"))]),
            &side(&[("keep", 1, Some("x")), ("orphan", 3, Some("z"))]),
            Comparison::Etag,
            true,
        );
        assert!(plan.copies.is_empty());
        assert_eq!(plan.deletes, vec!["orphan"]);
    }

    #[test]
    fn without_delete_extra_keys_survive() {
        let plan = plan_sync(
            &side(&[]),
            &side(&[("orphan", 3, Some("z"))]),
            Comparison::Etag,
            false,
        );
        assert!(plan.deletes.is_empty());
    }
}
