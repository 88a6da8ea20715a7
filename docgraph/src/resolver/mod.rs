//! Lazy, memoized resolution of a source's named exports.
//!
//! Static metadata comes from a [`SourceAnalyzer`], runtime values from a
//! [`ModuleLoader`], and an optional per-export validator from the
//! collection's [`Schema`] shapes the value that gets cached.
//!
//! Every node owns an [`ExportCache`]. A module is loaded at most once per
//! cache, and each export name resolves at most once: concurrent callers for
//! the same node and name await a single in-flight resolution. Invalidation
//! swaps the node's cache for an empty one, so a resolution that was in flight
//! finishes into the orphaned cache and is never observed again.

pub mod analyzer;
pub mod loader;

use crate::error::{DocGraphError, ExportError};
use crate::tree::{Source, SourceKind};
use crate::validation::Schema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

pub use analyzer::{is_analyzable, SourceAnalyzer, StaticAnalyzer, ANALYZABLE_EXTENSIONS};
pub use loader::{MarkdownLoader, ModuleExports, ModuleLoader};

/// Byte offsets of a declaration in its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// What the analyzer knows about one export without evaluating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub name: String,
    pub position: Option<Span>,
    /// Analyzer-specific type description, opaque to the engine.
    pub type_description: Option<serde_json::Value>,
}

/// A resolved export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Export {
    pub name: String,
    pub position: Option<Span>,
    pub static_type: Option<serde_json::Value>,
    /// The loaded value after schema validation.
    pub value: Arc<serde_json::Value>,
}

type Resolution = std::result::Result<Export, ExportError>;
type ModuleResult = std::result::Result<Arc<ModuleExports>, ExportError>;

/// Memoized module and export state for one node.
#[derive(Default)]
pub struct ExportCache {
    module: OnceCell<ModuleResult>,
    exports: Mutex<HashMap<String, Arc<OnceCell<Resolution>>>>,
}

impl ExportCache {
    fn cell(&self, name: &str) -> Arc<OnceCell<Resolution>> {
        let mut exports = self.exports.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(exports.entry(name.to_string()).or_default())
    }

    /// Names with a finished resolution, successful or not.
    pub fn resolved_names(&self) -> Vec<String> {
        let exports = self.exports.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = exports
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Binds analyzer metadata, loaded values and schema validation together.
#[derive(Clone)]
pub struct ExportResolver {
    analyzer: Arc<dyn SourceAnalyzer>,
    loader: Arc<dyn ModuleLoader>,
    schema: Schema,
}

impl ExportResolver {
    pub fn new(
        analyzer: Arc<dyn SourceAnalyzer>,
        loader: Arc<dyn ModuleLoader>,
        schema: Schema,
    ) -> Self {
        ExportResolver {
            analyzer,
            loader,
            schema,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Resolve `name` on `source`. Directories resolve against their index
    /// file. Repeated calls return the memoized outcome.
    pub async fn resolve(&self, source: &Source, name: &str) -> std::result::Result<Export, ExportError> {
        let target = file_target(source, name)?;
        let cache = target.export_cache();
        let cell = cache.cell(name);

        if let Some(resolution) = cell.get() {
            log::debug!("Export '{name}' of {} served from cache", target.file_path().display());
            return resolution.clone();
        }

        cell.get_or_init(|| self.resolve_uncached(&target, &cache, name))
            .await
            .clone()
    }

    /// Statically known export names of `source` (or its index file).
    pub async fn export_names(&self, source: &Source) -> std::result::Result<Vec<String>, ExportError> {
        let target = file_target(source, "*")?;
        let path = target.file_path();
        if !is_analyzable(path) {
            return Ok(Vec::new());
        }
        self.analyzer
            .export_names(path)
            .await
            .map_err(|e| module_error(path, e))
    }

    async fn resolve_uncached(&self, source: &Source, cache: &ExportCache, name: &str) -> Resolution {
        let path = source.file_path();
        let display = path.display().to_string();
        log::debug!("Resolving export '{name}' of {display}");

        let metadata = if is_analyzable(path) {
            match self.analyzer.export_metadata(path, name).await {
                Ok(Some(metadata)) => Some(metadata),
                Ok(None) => {
                    return Err(ExportError::NotFound {
                        path: display,
                        export: name.to_string(),
                    })
                }
                Err(e) => return Err(module_error(path, e)),
            }
        } else {
            None
        };

        let module = cache
            .module
            .get_or_init(|| self.load_module(path))
            .await
            .clone()?;

        let raw = module.get(name).cloned().ok_or_else(|| ExportError::NotFound {
            path: display.clone(),
            export: name.to_string(),
        })?;

        let value = match self.schema.get(name) {
            Some(validator) => validator.validate(name, raw).map_err(|diagnostic| {
                ExportError::SchemaValidation {
                    path: display.clone(),
                    export: name.to_string(),
                    diagnostic,
                }
            })?,
            None => raw,
        };

        let (position, static_type) = match metadata {
            Some(m) => (m.position, m.type_description),
            None => (None, None),
        };

        Ok(Export {
            name: name.to_string(),
            position,
            static_type,
            value: Arc::new(value),
        })
    }

    async fn load_module(&self, path: &Path) -> ModuleResult {
        log::debug!("Loading module {}", path.display());
        self.loader
            .load(path)
            .await
            .map(Arc::new)
            .map_err(|e| module_error(path, e))
    }
}

fn file_target(source: &Source, name: &str) -> std::result::Result<Source, ExportError> {
    match source.kind() {
        SourceKind::File => Ok(source.clone()),
        SourceKind::Directory => source.index_file().ok_or_else(|| ExportError::NotFound {
            path: source.file_path().display().to_string(),
            export: name.to_string(),
        }),
    }
}

/// Analyzer and loader failures both mean the module could not be read.
fn module_error(path: &Path, error: DocGraphError) -> ExportError {
    match error {
        DocGraphError::Export(e) => e,
        other => ExportError::ModuleLoad {
            path: path.display().to_string(),
            reason: other.to_string(),
        },
    }
}
