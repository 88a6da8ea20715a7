// Filesystem listing for the tree builder

use crate::error::{DocGraphError, Result};
use crate::tree::SourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// One matched filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Resolves a glob pattern to matching files and directories.
///
/// `pattern` is absolute; `base_directory` is the collection root the
/// matches are expected to live under. Access failures must be reported as
/// [`DocGraphError::TreeBuild`] rather than skipped.
#[async_trait]
pub trait FileSystemLister: Send + Sync {
    async fn list(&self, pattern: &str, base_directory: &Path) -> Result<Vec<FsEntry>>;
}

/// Lists entries with the `glob` crate on the blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobLister;

#[async_trait]
impl FileSystemLister for GlobLister {
    async fn list(&self, pattern: &str, base_directory: &Path) -> Result<Vec<FsEntry>> {
        let pattern = pattern.to_string();
        let base = base_directory.to_path_buf();
        tokio::task::spawn_blocking(move || list_blocking(&pattern, &base))
            .await
            .map_err(|e| DocGraphError::TreeBuild {
                path: base_directory.display().to_string(),
                reason: format!("listing task failed: {e}"),
            })?
    }
}

fn list_blocking(pattern: &str, base: &Path) -> Result<Vec<FsEntry>> {
    let metadata = std::fs::metadata(base).map_err(|e| DocGraphError::TreeBuild {
        path: base.display().to_string(),
        reason: e.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(DocGraphError::TreeBuild {
            path: base.display().to_string(),
            reason: "not a directory".into(),
        });
    }

    let paths = glob::glob(pattern).map_err(|e| DocGraphError::TreeBuild {
        path: pattern.to_string(),
        reason: format!("invalid glob pattern: {e}"),
    })?;

    let mut entries = Vec::new();
    for result in paths {
        let path = result.map_err(|e| DocGraphError::TreeBuild {
            path: e.path().display().to_string(),
            reason: e.error().to_string(),
        })?;

        let metadata = std::fs::metadata(&path).map_err(|e| DocGraphError::TreeBuild {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let kind = if metadata.is_dir() {
            SourceKind::Directory
        } else {
            SourceKind::File
        };
        let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);

        entries.push(FsEntry {
            path,
            kind,
            modified_at,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// The directory portion of a glob pattern before its first wildcard.
///
/// `docs/**/*.mdx` -> `docs`, `**/*.md` -> `` (the project root).
pub fn literal_prefix(pattern: &str) -> PathBuf {
    let components: Vec<&str> = pattern.split('/').collect();
    let directories = &components[..components.len().saturating_sub(1)];
    directories
        .iter()
        .take_while(|c| !c.contains(&['*', '?', '[', '{'][..]))
        .filter(|c| !c.is_empty() && **c != ".")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("docs/**/*.mdx"), PathBuf::from("docs"));
        assert_eq!(literal_prefix("content/posts/*.md"), PathBuf::from("content/posts"));
        assert_eq!(literal_prefix("**/*.md"), PathBuf::new());
        assert_eq!(literal_prefix("./docs/intro.mdx"), PathBuf::from("docs"));
    }

    #[tokio::test]
    async fn test_glob_lister_reports_kinds() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("docs/guides")).unwrap();
        std::fs::write(tmp.path().join("docs/intro.mdx"), "# Intro").unwrap();
        std::fs::write(tmp.path().join("docs/guides/setup.mdx"), "# Setup").unwrap();

        let pattern = format!("{}/docs/**/*", tmp.path().display());
        let entries = GlobLister
            .list(&pattern, &tmp.path().join("docs"))
            .await
            .unwrap();

        let guides = entries
            .iter()
            .find(|e| e.path.ends_with("guides"))
            .unwrap();
        assert_eq!(guides.kind, SourceKind::Directory);
        let intro = entries
            .iter()
            .find(|e| e.path.ends_with("intro.mdx"))
            .unwrap();
        assert_eq!(intro.kind, SourceKind::File);
        assert!(intro.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_base_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let pattern = format!("{}/**/*.mdx", missing.display());
        let err = GlobLister.list(&pattern, &missing).await.unwrap_err();
        assert!(matches!(err, DocGraphError::TreeBuild { .. }));
    }
}
