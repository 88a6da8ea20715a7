use super::{Order, SourceKind, SourceNode, SourceTree};
use crate::error::Result;
use crate::fs::{FileSystemLister, FsEntry};
use crate::normalize::normalize_siblings;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Entries of one directory level, keyed by raw name.
type Level = BTreeMap<String, SourceKind>;

/// Build a complete tree for `pattern` rooted at `base_directory`.
///
/// The listing is the only suspension point. Matches outside the base
/// directory and hidden entries are skipped, and every directory between the
/// base and a match becomes a node. Any listing or normalization failure fails
/// the whole build.
pub async fn build(
    lister: &dyn FileSystemLister,
    pattern: &str,
    base_directory: &Path,
    base_pathname: Option<&str>,
    generation: u64,
) -> Result<SourceTree> {
    let entries = lister.list(pattern, base_directory).await?;
    log::debug!(
        "Listed {} entries for '{pattern}' under {}",
        entries.len(),
        base_directory.display()
    );

    let listing = Listing::collect(base_directory, entries);
    let mut builder = TreeBuilder {
        listing,
        nodes: Vec::new(),
    };

    builder.nodes.push(SourceNode {
        raw_name: base_directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        segment: String::new(),
        path: Vec::new(),
        order: Order::root(),
        depth: 0,
        kind: SourceKind::Directory,
        is_index: false,
        extension: None,
        file_path: base_directory.to_path_buf(),
        modified_at: None,
        parent: None,
        children: Vec::new(),
    });

    builder.build_level(0, Path::new(""))?;

    Ok(SourceTree::new(builder.nodes, base_pathname, generation))
}

/// The filtered listing grouped by parent directory (relative to the base).
struct Listing {
    base: PathBuf,
    levels: HashMap<PathBuf, Level>,
    modified: HashMap<PathBuf, DateTime<Utc>>,
}

impl Listing {
    fn collect(base: &Path, entries: Vec<FsEntry>) -> Self {
        let mut listing = Listing {
            base: base.to_path_buf(),
            levels: HashMap::new(),
            modified: HashMap::new(),
        };

        for entry in entries {
            let relative = match entry.path.strip_prefix(base) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                _ => {
                    log::debug!("Skipping {} (outside base directory)", entry.path.display());
                    continue;
                }
            };

            if relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
            {
                continue;
            }

            if let Some(modified) = entry.modified_at {
                listing.modified.insert(relative.clone(), modified);
            }
            listing.insert(&relative, entry.kind);

            // Connect the match to the base through its intermediate directories.
            let mut ancestor = relative.parent();
            while let Some(dir) = ancestor {
                if dir.as_os_str().is_empty() {
                    break;
                }
                listing.insert(dir, SourceKind::Directory);
                ancestor = dir.parent();
            }
        }

        listing
    }

    fn insert(&mut self, relative: &Path, kind: SourceKind) {
        let parent = relative.parent().unwrap_or(Path::new("")).to_path_buf();
        let name = match relative.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return,
        };
        let level = self.levels.entry(parent).or_default();
        // A directory reported as a match and also implied by a descendant
        // stays a directory.
        level
            .entry(name)
            .and_modify(|existing| {
                if kind == SourceKind::Directory {
                    *existing = SourceKind::Directory;
                }
            })
            .or_insert(kind);
    }
}

struct TreeBuilder {
    listing: Listing,
    nodes: Vec<SourceNode>,
}

impl TreeBuilder {
    fn build_level(&mut self, parent_index: usize, relative_dir: &Path) -> Result<()> {
        let entries: Vec<(String, SourceKind)> = match self.listing.levels.get(relative_dir) {
            Some(level) => level.iter().map(|(n, k)| (n.clone(), *k)).collect(),
            None => return Ok(()),
        };

        let parent_path = self.nodes[parent_index].path.join("/");
        let ordered = normalize_siblings(&parent_path, &entries)?;

        for entry in ordered {
            let relative = relative_dir.join(&entry.name.raw_name);
            let parent = &self.nodes[parent_index];

            let mut path = parent.path.clone();
            path.push(entry.name.segment.clone());

            let node = SourceNode {
                raw_name: entry.name.raw_name.clone(),
                segment: entry.name.segment.clone(),
                path,
                order: parent.order.child(entry.local_order),
                depth: parent.depth + 1,
                kind: entry.kind,
                is_index: entry.name.is_index,
                extension: entry.name.extension.clone(),
                file_path: self.listing.base.join(&relative),
                modified_at: self.listing.modified.get(&relative).copied(),
                parent: Some(super::NodeId(parent_index)),
                children: Vec::new(),
            };

            let index = self.nodes.len();
            self.nodes.push(node);
            self.nodes[parent_index].children.push(super::NodeId(index));

            if entry.kind == SourceKind::Directory {
                self.build_level(index, &relative)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocGraphError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct StaticLister(Vec<FsEntry>);

    #[async_trait]
    impl FileSystemLister for StaticLister {
        async fn list(&self, _pattern: &str, _base: &Path) -> Result<Vec<FsEntry>> {
            Ok(self.0.clone())
        }
    }

    struct FailingLister;

    #[async_trait]
    impl FileSystemLister for FailingLister {
        async fn list(&self, pattern: &str, _base: &Path) -> Result<Vec<FsEntry>> {
            Err(DocGraphError::TreeBuild {
                path: pattern.to_string(),
                reason: "permission denied".into(),
            })
        }
    }

    fn file(path: &str) -> FsEntry {
        FsEntry {
            path: PathBuf::from("/site/docs").join(path),
            kind: SourceKind::File,
            modified_at: None,
        }
    }

    async fn build_from(entries: Vec<FsEntry>) -> Result<Arc<SourceTree>> {
        let lister = StaticLister(entries);
        let tree = build(&lister, "docs/**/*.mdx", Path::new("/site/docs"), None, 1).await?;
        Ok(Arc::new(tree))
    }

    #[tokio::test]
    async fn test_builds_ordered_tree_with_intermediate_directories() {
        let tree = build_from(vec![
            file("03.examples/02.rendering.mdx"),
            file("01.getting-started.mdx"),
            file("03.examples/01.authoring.mdx"),
            file("02.routing.mdx"),
        ])
        .await
        .unwrap();

        let summary: Vec<(String, String, usize)> = tree
            .sources(None)
            .iter()
            .map(|s| (s.path_string(), s.order().to_string(), s.depth()))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("getting-started".to_string(), "1".to_string(), 1),
                ("routing".to_string(), "2".to_string(), 1),
                ("examples".to_string(), "3".to_string(), 1),
                ("examples/authoring".to_string(), "3.1".to_string(), 2),
                ("examples/rendering".to_string(), "3.2".to_string(), 2),
            ]
        );

        let examples = tree.find("examples").unwrap();
        assert_eq!(examples.kind(), SourceKind::Directory);
        assert_eq!(examples.file_path(), Path::new("/site/docs/03.examples"));
        assert_eq!(examples.children().len(), 2);
        assert_eq!(tree.find("examples/authoring").unwrap().parent(), Some(examples));
    }

    #[tokio::test]
    async fn test_skips_hidden_and_foreign_entries() {
        let mut entries = vec![file("intro.mdx"), file(".drafts/secret.mdx")];
        entries.push(FsEntry {
            path: PathBuf::from("/elsewhere/other.mdx"),
            kind: SourceKind::File,
            modified_at: None,
        });
        let tree = build_from(entries).await.unwrap();
        let paths: Vec<String> = tree.sources(None).iter().map(|s| s.path_string()).collect();
        assert_eq!(paths, vec!["intro".to_string()]);
    }

    #[tokio::test]
    async fn test_collision_fails_build() {
        let err = build_from(vec![file("routing.mdx"), file("01.routing.md")])
            .await
            .unwrap_err();
        assert!(matches!(err, DocGraphError::Normalization { .. }));
    }

    #[tokio::test]
    async fn test_listing_failure_fails_build() {
        let err = build(&FailingLister, "docs/**", Path::new("/site/docs"), None, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DocGraphError::TreeBuild { .. }));
    }

    #[tokio::test]
    async fn test_root_node() {
        let tree = build_from(vec![file("intro.mdx")]).await.unwrap();
        let root = tree.root();
        assert_eq!(root.depth(), 0);
        assert_eq!(root.path_string(), "");
        assert_eq!(root.raw_name(), "docs");
        assert_eq!(root.siblings(), (None, None));
        assert_eq!(tree.find("/").unwrap(), root);
    }

    #[tokio::test]
    async fn test_adopted_cache_slots_are_shared_across_generations() {
        let entries = || vec![file("01.intro.mdx"), file("02.guide/01.setup.mdx")];
        let first = build_from(entries()).await.unwrap();
        let lister = StaticLister(entries());
        let mut second = build(&lister, "docs/**/*.mdx", Path::new("/site/docs"), None, 2)
            .await
            .unwrap();
        second.adopt_caches(&first, &[PathBuf::from("/site/docs/02.guide")]);
        let second = Arc::new(second);

        let intro = |tree: &Arc<SourceTree>| tree.find("intro").unwrap().export_cache();
        let setup = |tree: &Arc<SourceTree>| tree.find("guide/setup").unwrap().export_cache();
        assert!(Arc::ptr_eq(&intro(&first), &intro(&second)));
        assert!(!Arc::ptr_eq(&setup(&first), &setup(&second)));

        // A reset through the newer snapshot reaches the older one.
        let before = intro(&first);
        assert_eq!(second.reset_caches_under(Path::new("/site/docs")), 4);
        assert!(!Arc::ptr_eq(&before, &intro(&first)));
        assert!(Arc::ptr_eq(&intro(&first), &intro(&second)));
    }
}
