use crate::error::{DocGraphError, Result};
use crate::fs::{literal_prefix, FileSystemLister, GlobLister};
use crate::resolver::{
    Export, ExportResolver, MarkdownLoader, ModuleLoader, SourceAnalyzer, StaticAnalyzer,
};
use crate::tree::{self, Source, SourceKind, SourceTree};
use crate::validation::Schema;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// The external services a collection depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub lister: Arc<dyn FileSystemLister>,
    pub analyzer: Arc<dyn SourceAnalyzer>,
    pub loader: Arc<dyn ModuleLoader>,
}

impl Collaborators {
    /// Glob listing, the static analyzer and the Markdown loader.
    pub fn builtin() -> Self {
        Collaborators {
            lister: Arc::new(GlobLister),
            analyzer: Arc::new(StaticAnalyzer),
            loader: Arc::new(MarkdownLoader),
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::builtin()
    }
}

/// What a collection covers and how its exports are validated.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    pub pattern: String,
    pub root_dir: PathBuf,
    pub base_directory: Option<PathBuf>,
    pub base_pathname: Option<String>,
    pub schema: Schema,
}

impl CollectionOptions {
    pub fn new(pattern: impl Into<String>) -> Self {
        CollectionOptions {
            pattern: pattern.into(),
            root_dir: PathBuf::from("."),
            base_directory: None,
            base_pathname: None,
            schema: Schema::new(),
        }
    }

    pub fn root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn base_directory(mut self, base_directory: impl Into<PathBuf>) -> Self {
        self.base_directory = Some(base_directory.into());
        self
    }

    pub fn base_pathname(mut self, base_pathname: impl Into<String>) -> Self {
        self.base_pathname = Some(base_pathname.into());
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}

/// Options for [`Collection::get_sources`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SourcesOptions {
    /// Only sources exactly this many levels below the root.
    pub depth: Option<usize>,
}

impl SourcesOptions {
    pub fn depth(depth: usize) -> Self {
        SourcesOptions { depth: Some(depth) }
    }
}

/// The query surface over the tree built from one glob pattern.
///
/// The tree is built on first use and rebuilt wholesale after an
/// invalidation. Readers always see a complete snapshot. A failed rebuild
/// serves the previous snapshot (with a warning) and is retried by the next
/// query; only a collection that never built successfully reports the error.
pub struct Collection {
    pattern: String,
    absolute_pattern: String,
    root_dir: PathBuf,
    base_directory: PathBuf,
    base_pathname: Option<String>,
    lister: Arc<dyn FileSystemLister>,
    resolver: ExportResolver,
    current: RwLock<Option<Arc<SourceTree>>>,
    stale: AtomicBool,
    /// Scopes invalidated since the last successful build.
    dropped_scopes: Mutex<Vec<PathBuf>>,
    build_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl Collection {
    pub fn new(options: CollectionOptions, collaborators: Collaborators) -> Result<Self> {
        if options.pattern.trim().is_empty() {
            return Err(DocGraphError::Config("collection pattern is empty".into()));
        }

        let root_dir = absolutize(&options.root_dir)?;
        let base_directory = match &options.base_directory {
            Some(dir) => root_dir.join(dir),
            None => root_dir.join(literal_prefix(&options.pattern)),
        };
        // The root is a literal path; only the configured pattern may glob.
        let absolute_pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&root_dir.to_string_lossy()).trim_end_matches('/'),
            options.pattern.trim_start_matches("./")
        );

        Ok(Collection {
            pattern: options.pattern,
            absolute_pattern,
            root_dir,
            base_directory,
            base_pathname: options.base_pathname,
            lister: collaborators.lister,
            resolver: ExportResolver::new(collaborators.analyzer, collaborators.loader, options.schema),
            current: RwLock::new(None),
            stale: AtomicBool::new(true),
            dropped_scopes: Mutex::new(Vec::new()),
            build_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn base_pathname(&self) -> Option<&str> {
        self.base_pathname.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        self.resolver.schema()
    }

    /// The last successfully built tree, even if it has since been
    /// invalidated.
    pub fn snapshot(&self) -> Option<Arc<SourceTree>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// The current tree, building it first if it is missing or invalidated.
    pub async fn tree(&self) -> Result<Arc<SourceTree>> {
        if let Some(tree) = self.fresh_snapshot() {
            return Ok(tree);
        }

        let _guard = self.build_lock.lock().await;
        // Another caller may have finished a rebuild while we waited.
        if let Some(tree) = self.fresh_snapshot() {
            return Ok(tree);
        }

        match self.rebuild().await {
            Ok(tree) => Ok(tree),
            Err(e) => match self.snapshot() {
                // Serve the stale tree; the flag stays set so the next query
                // retries the build.
                Some(previous) => {
                    log::warn!("Rebuild of '{}' failed, serving previous tree: {e}", self.pattern);
                    Ok(previous)
                }
                None => Err(e),
            },
        }
    }

    /// Exact lookup by normalized path. `Ok(None)` means no such source.
    pub async fn get_source(&self, path: &str) -> Result<Option<Source>> {
        Ok(self.tree().await?.find(path))
    }

    /// Descendants of the root in tree order, optionally only those at an
    /// exact depth.
    pub async fn get_sources(&self, options: SourcesOptions) -> Result<Vec<Source>> {
        Ok(self.tree().await?.sources(options.depth))
    }

    /// Previous and next source among `source`'s parent's children.
    pub fn get_siblings(&self, source: &Source) -> (Option<Source>, Option<Source>) {
        source.siblings()
    }

    /// Previous and next file in reading order across the whole tree.
    pub fn get_reading_siblings(&self, source: &Source) -> (Option<Source>, Option<Source>) {
        source.reading_siblings()
    }

    pub async fn get_export(&self, source: &Source, name: &str) -> Result<Export> {
        Ok(self.resolver.resolve(source, name).await?)
    }

    pub async fn get_export_value(&self, source: &Source, name: &str) -> Result<Arc<serde_json::Value>> {
        Ok(self.get_export(source, name).await?.value)
    }

    /// Resolve an export and deserialize it into `T`.
    pub async fn get_export_as<T: DeserializeOwned>(&self, source: &Source, name: &str) -> Result<T> {
        let value = self.get_export_value(source, name).await?;
        Ok(serde_json::from_value((*value).clone())?)
    }

    /// Statically known export names of a source.
    pub async fn get_export_names(&self, source: &Source) -> Result<Vec<String>> {
        Ok(self.resolver.export_names(source).await?)
    }

    /// Drop cached state for everything under `path` (a file path is widened
    /// to its directory) and mark the tree for rebuild.
    ///
    /// Returns false when the path does not overlap this collection.
    pub fn invalidate(&self, path: &Path) -> bool {
        let scope = self.scope_for(path);

        let overlaps =
            scope.starts_with(&self.base_directory) || self.base_directory.starts_with(&scope);
        if !overlaps {
            log::debug!(
                "Ignoring invalidation of {} (outside {})",
                scope.display(),
                self.base_directory.display()
            );
            return false;
        }

        if let Some(tree) = self.snapshot() {
            let reset = tree.reset_caches_under(&scope);
            log::debug!("Invalidated {reset} cached node(s) under {}", scope.display());
        }

        self.dropped_scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(scope);
        self.stale.store(true, Ordering::Release);
        true
    }

    fn fresh_snapshot(&self) -> Option<Arc<SourceTree>> {
        if self.is_stale() {
            return None;
        }
        self.snapshot()
    }

    async fn rebuild(&self) -> Result<Arc<SourceTree>> {
        // Clear the flag before listing so invalidations that land during the
        // build mark the result stale again.
        let scopes = {
            let mut dropped = self
                .dropped_scopes
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.stale.store(false, Ordering::Release);
            std::mem::take(&mut *dropped)
        };
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let built = tree::build(
            self.lister.as_ref(),
            &self.absolute_pattern,
            &self.base_directory,
            self.base_pathname.as_deref(),
            generation,
        )
        .await;

        match built {
            Ok(mut tree) => {
                if let Some(previous) = self.snapshot() {
                    let adopted = tree.adopt_caches(&previous, &scopes);
                    log::debug!("Carried {adopted} export cache(s) into generation {generation}");
                }
                let tree = Arc::new(tree);
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&tree));
                log::info!(
                    "Built '{}' generation {generation}: {} source(s)",
                    self.pattern,
                    tree.len().saturating_sub(1)
                );
                Ok(tree)
            }
            Err(e) => {
                self.dropped_scopes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(scopes);
                self.stale.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// The directory an invalidation applies to.
    fn scope_for(&self, path: &Path) -> PathBuf {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        };
        let absolute = std::fs::canonicalize(&absolute).unwrap_or(absolute);

        if absolute.is_dir() {
            return absolute;
        }

        let known_directory = self
            .snapshot()
            .and_then(|tree| tree.find_file(&absolute))
            .map_or(false, |source| source.kind() == SourceKind::Directory);
        if known_directory {
            return absolute;
        }

        match absolute.parent() {
            Some(parent) => parent.to_path_buf(),
            None => absolute,
        }
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(std::fs::canonicalize(&absolute).unwrap_or(absolute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn setup() -> (TempDir, Collection) {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "docs/01.intro.mdx", "---\ntitle: Intro\n---\n# Intro\n");
        write(tmp.path(), "docs/02.guides/index.mdx", "---\ntitle: Guides\n---\n");
        write(tmp.path(), "docs/02.guides/01.setup.mdx", "# Setup\n");

        let collection = Collection::new(
            CollectionOptions::new("docs/**/*.mdx")
                .root_dir(tmp.path())
                .base_pathname("docs"),
            Collaborators::builtin(),
        )
        .unwrap();
        (tmp, collection)
    }

    #[tokio::test]
    async fn test_base_directory_defaults_to_pattern_prefix() {
        let (tmp, collection) = setup();
        let expected = std::fs::canonicalize(tmp.path()).unwrap().join("docs");
        assert_eq!(collection.base_directory(), expected.as_path());
    }

    #[tokio::test]
    async fn test_lookup_by_path_and_pathname() {
        let (_tmp, collection) = setup();
        let setup_page = collection.get_source("guides/setup").await.unwrap().unwrap();
        assert_eq!(setup_page.pathname(), "/docs/guides/setup");
        assert_eq!(setup_page.title(), "Setup");
        assert_eq!(setup_page.order().to_string(), "2.1");

        let same = collection.get_source("/docs/guides/setup/").await.unwrap().unwrap();
        assert_eq!(same, setup_page);
        assert!(collection.get_source("guides/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_export_uses_index_file() {
        let (_tmp, collection) = setup();
        let guides = collection.get_source("guides").await.unwrap().unwrap();
        let frontmatter = collection.get_export_value(&guides, "frontmatter").await.unwrap();
        assert_eq!(frontmatter["title"], "Guides");
    }

    #[tokio::test]
    async fn test_directory_without_index_has_no_exports() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "docs/guides/setup.mdx", "# Setup\n");
        let collection = Collection::new(
            CollectionOptions::new("docs/**/*.mdx").root_dir(tmp.path()),
            Collaborators::builtin(),
        )
        .unwrap();
        let guides = collection.get_source("guides").await.unwrap().unwrap();
        let err = collection.get_export(&guides, "default").await.unwrap_err();
        assert!(matches!(
            err,
            DocGraphError::Export(crate::error::ExportError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_typed_export() {
        #[derive(serde::Deserialize)]
        struct Frontmatter {
            title: String,
        }

        let (_tmp, collection) = setup();
        let intro = collection.get_source("intro").await.unwrap().unwrap();
        let fm: Frontmatter = collection.get_export_as(&intro, "frontmatter").await.unwrap();
        assert_eq!(fm.title, "Intro");
        assert_eq!(
            collection.get_export_names(&intro).await.unwrap(),
            vec!["frontmatter", "default", "headings"]
        );
    }

    #[tokio::test]
    async fn test_unrelated_invalidation_is_ignored() {
        let (tmp, collection) = setup();
        collection.tree().await.unwrap();
        assert!(!collection.invalidate(&tmp.path().join("assets")));
        assert!(!collection.is_stale());
        assert!(collection.invalidate(&tmp.path().join("docs/02.guides/01.setup.mdx")));
        assert!(collection.is_stale());
    }

    #[tokio::test]
    async fn test_tree_is_reused_until_invalidated() {
        let (tmp, collection) = setup();
        let first = collection.tree().await.unwrap();
        let second = collection.tree().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        collection.invalidate(&tmp.path().join("docs"));
        let third = collection.tree().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.generation() > first.generation());
    }
}
