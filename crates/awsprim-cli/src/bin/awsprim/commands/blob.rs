//! Object-storage commands.

use std::path::PathBuf;

use awsprim_blob::metadata;
use awsprim_blob::metadata::SelectInput;
use awsprim_blob::metadata::SelectOutput;
use awsprim_blob::sync;
use awsprim_blob::sync::Comparison;
use awsprim_blob::transfer;
use awsprim_blob::ByteRange;
use awsprim_blob::GetOptions;
use awsprim_blob::GlobFilter;
use awsprim_blob::LocalEndpoint;
use awsprim_blob::PutCondition;
use awsprim_blob::PutOptions;
use awsprim_blob::S3Uri;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use super::parse_pair;
use crate::context::ToolContext;
use crate::output::emit;
use crate::output::emit_list;
use crate::output::OutputFormat;

/// Object storage operations.
#[derive(Subcommand)]
pub enum BlobCommand {
    /// Upload a file (or '-' for stdin) to an object.
    ///
    /// Sources above the multipart threshold are split into chunks and
    /// uploaded in parallel; failed or timed-out uploads are aborted so no
    /// incomplete parts accumulate.
    Put(PutArgs),

    /// Download an object to a file (or '-' for stdout), streaming.
    Get(GetArgs),

    /// Enumerate objects under a prefix.
    List(ListArgs),

    /// Metadata-only description of one object.
    Head(HeadArgs),

    /// Replace an object's tag set.
    Tag(TagArgs),

    /// Remove every tag from an object.
    Untag(UriArgs),

    /// Enumerate versions of one object, newest first.
    Versions(VersionsArgs),

    /// Produce a time-limited signed URL (no network access).
    Presign(PresignArgs),

    /// Run a server-side selection query, streaming records to stdout.
    Select(SelectArgs),

    /// Upload every matching file under a directory.
    UploadDir(UploadDirArgs),

    /// Download every object under a prefix into a directory.
    DownloadDir(DownloadDirArgs),

    /// One-way sync from a local directory to a prefix by ETag.
    Sync(SyncArgs),
}

#[derive(Args)]
pub struct PutArgs {
    /// Source file, or '-' for standard input.
    pub source: String,

    /// Destination object (s3://bucket/key).
    pub uri: String,

    /// Content type; detected from the key extension when omitted.
    #[arg(long)]
    pub content_type: Option<String>,

    /// User metadata (KEY=VALUE, repeatable).
    #[arg(long = "metadata", value_parser = parse_pair)]
    pub metadata: Vec<(String, String)>,

    /// Object tags (KEY=VALUE, repeatable).
    #[arg(long = "tag", value_parser = parse_pair)]
    pub tags: Vec<(String, String)>,

    /// Storage class (e.g. STANDARD_IA, GLACIER).
    #[arg(long)]
    pub storage_class: Option<String>,

    /// Fail when the object already exists.
    #[arg(long, conflicts_with = "if_match")]
    pub if_not_exists: bool,

    /// Fail unless the stored ETag matches.
    #[arg(long)]
    pub if_match: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Source object (s3://bucket/key).
    pub uri: String,

    /// Destination file, or '-' for standard output. Defaults to the key's
    /// file name in the current directory.
    pub destination: Option<String>,

    /// Byte range '<start>-<end>' (inclusive).
    #[arg(long)]
    pub range: Option<String>,

    /// Fail unless the stored ETag matches.
    #[arg(long)]
    pub if_match: Option<String>,

    /// Only download when modified since this RFC 3339 timestamp.
    #[arg(long)]
    pub if_modified_since: Option<String>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Prefix to enumerate (s3://bucket/prefix/).
    pub uri: String,
}

#[derive(Args)]
pub struct HeadArgs {
    /// Object to describe (s3://bucket/key).
    pub uri: String,

    /// Specific version.
    #[arg(long)]
    pub version_id: Option<String>,
}

#[derive(Args)]
pub struct TagArgs {
    /// Object to tag (s3://bucket/key).
    pub uri: String,

    /// Replacement tag set (KEY=VALUE, repeatable, at least one).
    #[arg(long = "tag", value_parser = parse_pair, required = true)]
    pub tags: Vec<(String, String)>,
}

#[derive(Args)]
pub struct UriArgs {
    /// Object (s3://bucket/key).
    pub uri: String,
}

#[derive(Args)]
pub struct VersionsArgs {
    /// Object (s3://bucket/key).
    pub uri: String,

    /// Maximum versions to report.
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Args)]
pub struct PresignArgs {
    /// Object (s3://bucket/key).
    pub uri: String,

    /// HTTP method the URL authorizes.
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// URL lifetime in seconds.
    #[arg(long, default_value = "3600")]
    pub expires_in: u64,
}

#[derive(Args)]
pub struct SelectArgs {
    /// Object to query (s3://bucket/key).
    pub uri: String,

    /// SQL expression (e.g. "SELECT s.name FROM S3Object s").
    pub query: String,

    /// Input format.
    #[arg(long, default_value = "csv")]
    pub input_format: String,

    /// Output format.
    #[arg(long, default_value = "json")]
    pub output_format: String,
}

#[derive(Args)]
pub struct UploadDirArgs {
    /// Source directory.
    pub source: PathBuf,

    /// Destination prefix (s3://bucket/prefix/).
    pub uri: String,

    /// Include globs on relative paths (repeatable).
    #[arg(long = "include")]
    pub includes: Vec<String>,

    /// Exclude globs on relative paths (repeatable; win over includes).
    #[arg(long = "exclude")]
    pub excludes: Vec<String>,

    /// Abort the whole transfer on the first per-file failure.
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Args)]
pub struct DownloadDirArgs {
    /// Source prefix (s3://bucket/prefix/).
    pub uri: String,

    /// Destination directory.
    pub destination: PathBuf,

    /// Include globs on relative keys (repeatable).
    #[arg(long = "include")]
    pub includes: Vec<String>,

    /// Exclude globs on relative keys (repeatable; win over includes).
    #[arg(long = "exclude")]
    pub excludes: Vec<String>,

    /// Abort the whole transfer on the first per-file failure.
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Source directory.
    pub source: PathBuf,

    /// Destination prefix (s3://bucket/prefix/).
    pub uri: String,

    /// Include globs (repeatable).
    #[arg(long = "include")]
    pub includes: Vec<String>,

    /// Exclude globs (repeatable; win over includes).
    #[arg(long = "exclude")]
    pub excludes: Vec<String>,

    /// Compare by size instead of ETag.
    #[arg(long)]
    pub size_only: bool,

    /// Remove destination objects with no local counterpart.
    #[arg(long)]
    pub delete: bool,
}

impl BlobCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let store = ctx.blob_store();
        let transfer_config = ctx.transfer_config();

        match self {
            BlobCommand::Put(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                if uri.is_prefix() {
                    return Err(PrimitiveError::invalid(
                        format!("'{uri}' is a prefix; put needs a full object key"),
                        "Append the object name, or use 'blob upload-dir' for directories.",
                    ));
                }
                let options = PutOptions {
                    content_type: args.content_type,
                    metadata: args.metadata,
                    tags: args.tags,
                    storage_class: args.storage_class,
                    condition: if args.if_not_exists {
                        PutCondition::IfNotExists
                    } else if let Some(etag) = args.if_match {
                        PutCondition::IfMatch(etag)
                    } else {
                        PutCondition::None
                    },
                };

                let outcome = match LocalEndpoint::parse(&args.source) {
                    LocalEndpoint::Path(path) => {
                        transfer::upload_file(&store, &uri, &path, &options, &transfer_config).await?
                    }
                    LocalEndpoint::Stdio => {
                        // Spool stdin so sizing and ranged part reads work.
                        let spool = tempfile::NamedTempFile::new().map_err(|e| {
                            PrimitiveError::Service {
                                message: format!("cannot create spool file: {e}"),
                            }
                        })?;
                        let mut file = tokio::fs::File::create(spool.path()).await.map_err(|e| {
                            PrimitiveError::Service {
                                message: format!("cannot open spool file: {e}"),
                            }
                        })?;
                        tokio::io::copy(&mut tokio::io::stdin(), &mut file)
                            .await
                            .map_err(|e| PrimitiveError::Service {
                                message: format!("cannot spool standard input: {e}"),
                            })?;
                        drop(file);
                        transfer::upload_file(&store, &uri, spool.path(), &options, &transfer_config)
                            .await?
                    }
                };
                emit(&outcome, &outcome.etag, format);
                Ok(0)
            }

            BlobCommand::Get(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let destination = match args.destination.as_deref() {
                    Some(raw) => LocalEndpoint::parse(raw),
                    None => {
                        let name = uri.file_name().ok_or_else(|| {
                            PrimitiveError::invalid(
                                format!("'{uri}' has no file name to default to"),
                                "Pass an explicit destination path or '-'.",
                            )
                        })?;
                        LocalEndpoint::Path(PathBuf::from(name))
                    }
                };
                let options = GetOptions {
                    range: args.range.as_deref().map(ByteRange::parse).transpose()?,
                    if_match: args.if_match,
                    if_modified_since: args.if_modified_since,
                };
                let outcome =
                    transfer::download(&store, &uri, &destination, &options, &transfer_config)
                        .await?;
                // A '-' destination already wrote the payload to stdout.
                if destination != LocalEndpoint::Stdio {
                    emit(&outcome, &outcome.destination, format);
                }
                Ok(0)
            }

            BlobCommand::List(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let entries = with_deadline(ctx, sync::list_remote(&store, &uri)).await?;
                let objects: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|(key, entry)| {
                        serde_json::json!({
                            "key": key,
                            "size": entry.size,
                            "etag": entry.etag,
                        })
                    })
                    .collect();
                emit_list(
                    &objects,
                    "objects",
                    |o| o["key"].as_str().unwrap_or_default().to_string(),
                    format,
                );
                Ok(0)
            }

            BlobCommand::Head(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let outcome =
                    with_deadline(ctx, metadata::head(&store, &uri, args.version_id.as_deref()))
                        .await?;
                emit(&outcome, &outcome.etag, format);
                Ok(0)
            }

            BlobCommand::Tag(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                with_deadline(ctx, metadata::tag(&store, &uri, &args.tags)).await?;
                let tags = with_deadline(ctx, metadata::get_tags(&store, &uri)).await?;
                emit(
                    &serde_json::json!({"uri": uri.to_string(), "tags": tags}),
                    &args.tags.len().to_string(),
                    format,
                );
                Ok(0)
            }

            BlobCommand::Untag(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                with_deadline(ctx, metadata::untag(&store, &uri)).await?;
                emit(
                    &serde_json::json!({"uri": uri.to_string(), "tags": {}}),
                    "untagged",
                    format,
                );
                Ok(0)
            }

            BlobCommand::Versions(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let versions =
                    with_deadline(ctx, metadata::list_versions(&store, &uri, args.limit)).await?;
                emit_list(&versions, "versions", |v| v.version_id.clone(), format);
                Ok(0)
            }

            BlobCommand::Presign(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let url =
                    metadata::presign(&store, &uri, &args.method, args.expires_in).await?;
                emit(&url, &url.url, format);
                Ok(0)
            }

            BlobCommand::Select(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let input = SelectInput::parse(&args.input_format)?;
                let output = SelectOutput::parse(&args.output_format)?;
                let mut stdout = tokio::io::stdout();
                with_deadline(
                    ctx,
                    metadata::select(&store, &uri, &args.query, input, output, &mut stdout),
                )
                .await?;
                Ok(0)
            }

            BlobCommand::UploadDir(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let filter = GlobFilter::new(&args.includes, &args.excludes)?;
                let report = sync::upload_dir(
                    &store,
                    &args.source,
                    &uri,
                    &filter,
                    &PutOptions::default(),
                    &transfer_config,
                    args.fail_fast,
                )
                .await?;
                let failed = report.failed;
                emit(&report, &report.transferred.to_string(), format);
                Ok(if failed > 0 { 3 } else { 0 })
            }

            BlobCommand::DownloadDir(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let filter = GlobFilter::new(&args.includes, &args.excludes)?;
                let report = sync::download_dir(
                    &store,
                    &uri,
                    &args.destination,
                    &filter,
                    &transfer_config,
                    args.fail_fast,
                )
                .await?;
                let failed = report.failed;
                emit(&report, &report.transferred.to_string(), format);
                Ok(if failed > 0 { 3 } else { 0 })
            }

            BlobCommand::Sync(args) => {
                let uri = S3Uri::parse(&args.uri)?;
                let filter = GlobFilter::new(&args.includes, &args.excludes)?;
                let comparison = if args.size_only {
                    Comparison::SizeOnly
                } else {
                    Comparison::Etag
                };
                let report = sync::sync_up(
                    &store,
                    &args.source,
                    &uri,
                    &filter,
                    comparison,
                    args.delete,
                    &transfer_config,
                )
                .await?;
                let failed = report.failed;
                emit(&report, &report.transferred.to_string(), format);
                Ok(if failed > 0 { 3 } else { 0 })
            }
        }
    }
}

/// Apply the global deadline to operations outside the transfer engine.
async fn with_deadline<T>(
    ctx: &ToolContext,
    work: impl std::future::Future<Output = Result<T, PrimitiveError>>,
) -> Result<T, PrimitiveError> {
    match ctx.deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.into(), work)
            .await
            .map_err(|_| PrimitiveError::Timeout {
                message: "operation exceeded --timeout".to_string(),
            })?,
        None => work.await,
    }
}
