use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocGraphError {
    #[error("Normalization error at '{path}': {reason}")]
    Normalization { path: String, reason: String },

    #[error("Tree build failed for '{path}': {reason}")]
    TreeBuild { path: String, reason: String },

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures of a single export resolution.
///
/// These are cloneable because a resolution outcome, success or failure, is
/// memoized on the export handle and handed to every caller that awaits it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("Export '{export}' not found in {path}")]
    NotFound { path: String, export: String },

    #[error("Failed to load module {path}: {reason}")]
    ModuleLoad { path: String, reason: String },

    #[error("Export '{export}' in {path} failed schema validation: {diagnostic}")]
    SchemaValidation {
        path: String,
        export: String,
        diagnostic: String,
    },
}

pub type Result<T> = std::result::Result<T, DocGraphError>;
