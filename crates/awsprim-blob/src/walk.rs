//! Local directory enumeration with include/exclude glob filters.

use std::path::Path;
use std::path::PathBuf;

use awsprim_core::PrimitiveError;
use glob::Pattern;
use walkdir::WalkDir;

/// One file found under the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    /// Path relative to the walk root, `/`-separated; doubles as the
    /// object key suffix.
    pub relative_key: String,
    pub size: u64,
}

/// Compiled include/exclude filters. Excludes win over includes; an empty
/// include list admits everything.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl GlobFilter {
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self, PrimitiveError> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>, PrimitiveError> {
            patterns
                .iter()
                .map(|raw| {
                    Pattern::new(raw).map_err(|e| {
                        PrimitiveError::invalid(
                            format!("invalid glob pattern '{raw}': {e}"),
                            "Use shell-style globs such as '*.log' or 'data/**/*.csv'.",
                        )
                    })
                })
                .collect()
        };
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// Whether a relative key passes the filters.
    pub fn matches(&self, relative_key: &str) -> bool {
        if self.excludes.iter().any(|p| p.matches(relative_key)) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|p| p.matches(relative_key))
    }
}

/// Walk `root`, returning the regular files passing the filter.
pub fn walk_files(root: &Path, filter: &GlobFilter) -> Result<Vec<LocalFile>, PrimitiveError> {
    if !root.is_dir() {
        return Err(PrimitiveError::invalid(
            format!("'{}' is not a directory", root.display()),
            "Pass a directory as the source of a directory transfer.",
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| PrimitiveError::Service {
            message: format!("walk error under '{}': {e}", root.display()),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !filter.matches(&relative) {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| PrimitiveError::Service {
                message: format!("cannot stat '{}': {e}", entry.path().display()),
            })?
            .len();
        files.push(LocalFile {
            path: entry.path().to_path_buf(),
            relative_key: relative,
            size,
        });
    }
    files.sort_by(|a, b| a.relative_key.cmp(&b.relative_key));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn walks_recursively_with_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), b"a");
        touch(&dir.path().join("sub/b.log"), b"bb");
        touch(&dir.path().join("sub/deep/c.txt"), b"ccc");

        let files = walk_files(dir.path(), &GlobFilter::default()).unwrap();
        let keys: Vec<_> = files.iter().map(|f| f.relative_key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "sub/b.log", "sub/deep/c.txt"]);
        assert_eq!(files[1].size, 2);
    }

    #[test]
    fn include_and_exclude_filters() {
        let filter = GlobFilter::new(
            &["*.txt".to_string(), "sub/**/*.txt".to_string()],
            &["sub/deep/*".to_string()],
        )
        .unwrap();
        assert!(filter.matches("a.txt"));
        assert!(!filter.matches("a.log"));
        assert!(filter.matches("sub/x/b.txt"));
        assert!(!filter.matches("sub/deep/c.txt"));
    }

    #[test]
    fn excludes_win_over_includes() {
        let filter = GlobFilter::new(&["*.txt".to_string()], &["secret.txt".to_string()]).unwrap();
        assert!(!filter.matches("secret.txt"));
        assert!(filter.matches("public.txt"));
    }

    #[test]
    fn bad_patterns_are_invalid_arguments() {
        let err = GlobFilter::new(&["[".to_string()], &[]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn walking_a_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        touch(&file, b"x");
        assert!(walk_files(&file, &GlobFilter::default()).is_err());
    }
}
