//! Object-store URIs.
//!
//! `s3://bucket/key` addresses one object; a trailing slash (or empty key)
//! denotes a prefix. The pseudo-path `-` means standard input for uploads
//! and standard output for downloads.

use std::path::PathBuf;

use awsprim_core::PrimitiveError;

/// A parsed `s3://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    /// Parse an `s3://bucket/key` string.
    pub fn parse(uri: &str) -> Result<Self, PrimitiveError> {
        let rest = uri.strip_prefix("s3://").ok_or_else(|| {
            PrimitiveError::invalid(
                format!("'{uri}' is not an s3:// URI"),
                "Address objects as s3://<bucket>/<key>.",
            )
        })?;
        let (bucket, key) = match rest.split_once('/') {
            Some((bucket, key)) => (bucket, key),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(PrimitiveError::invalid(
                format!("'{uri}' has no bucket"),
                "Address objects as s3://<bucket>/<key>.",
            ));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// True when this URI names a prefix rather than one object.
    pub fn is_prefix(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// The last path segment of the key (used as a default file name).
    pub fn file_name(&self) -> Option<&str> {
        self.key.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Join a relative key onto this prefix.
    pub fn join(&self, relative: &str) -> S3Uri {
        let mut key = self.key.clone();
        if !key.is_empty() && !key.ends_with('/') {
            key.push('/');
        }
        key.push_str(relative);
        S3Uri {
            bucket: self.bucket.clone(),
            key,
        }
    }
}

impl std::fmt::Display for S3Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// A local transfer endpoint: a path or a standard stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEndpoint {
    Path(PathBuf),
    Stdio,
}

impl LocalEndpoint {
    pub fn parse(raw: &str) -> Self {
        if raw == "-" {
            LocalEndpoint::Stdio
        } else {
            LocalEndpoint::Path(PathBuf::from(raw))
        }
    }
}

/// An inclusive byte range for ranged reads, as `start-end` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn parse(raw: &str) -> Result<Self, PrimitiveError> {
        let bad = || {
            PrimitiveError::invalid(
                format!("invalid byte range '{raw}'"),
                "Ranges are '<start>-<end>' with start <= end, e.g. --range 0-1023.",
            )
        };
        let (start, end) = raw.split_once('-').ok_or_else(bad)?;
        let start: u64 = start.parse().map_err(|_| bad())?;
        let end: u64 = end.parse().map_err(|_| bad())?;
        if start > end {
            return Err(bad());
        }
        Ok(Self { start, end })
    }

    /// HTTP Range header value.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_key() {
        let uri = S3Uri::parse("s3://my-bucket/path/to/file.bin").unwrap();
        assert_eq!(uri.bucket, "my-bucket");
        assert_eq!(uri.key, "path/to/file.bin");
        assert!(!uri.is_prefix());
        assert_eq!(uri.file_name(), Some("file.bin"));
        assert_eq!(uri.to_string(), "s3://my-bucket/path/to/file.bin");
    }

    #[test]
    fn trailing_slash_or_bare_bucket_is_a_prefix() {
        assert!(S3Uri::parse("s3://bucket/dir/").unwrap().is_prefix());
        assert!(S3Uri::parse("s3://bucket").unwrap().is_prefix());
        assert!(S3Uri::parse("s3://bucket/").unwrap().is_prefix());
    }

    #[test]
    fn rejects_non_s3_uris() {
        assert!(S3Uri::parse("http://bucket/key").is_err());
        assert!(S3Uri::parse("s3:///key").is_err());
        assert!(S3Uri::parse("bucket/key").is_err());
    }

    #[test]
    fn join_handles_separators() {
        let prefix = S3Uri::parse("s3://b/data").unwrap();
        assert_eq!(prefix.join("x/y.txt").key, "data/x/y.txt");
        let slashed = S3Uri::parse("s3://b/data/").unwrap();
        assert_eq!(slashed.join("x.txt").key, "data/x.txt");
        let root = S3Uri::parse("s3://b").unwrap();
        assert_eq!(root.join("x.txt").key, "x.txt");
    }

    #[test]
    fn stdin_pseudo_path() {
        assert_eq!(LocalEndpoint::parse("-"), LocalEndpoint::Stdio);
        assert_eq!(
            LocalEndpoint::parse("./file"),
            LocalEndpoint::Path(PathBuf::from("./file"))
        );
    }

    #[test]
    fn byte_ranges_validate() {
        let range = ByteRange::parse("0-1023").unwrap();
        assert_eq!(range.header_value(), "bytes=0-1023");
        assert!(ByteRange::parse("10-5").is_err());
        assert!(ByteRange::parse("abc").is_err());
        assert!(ByteRange::parse("5").is_err());
    }
}
