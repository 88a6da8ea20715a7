pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod fs;
pub mod normalize;
pub mod project;
pub mod protocol;
pub mod resolver;
pub mod tree;
pub mod validation;
pub mod watcher;

pub use collection::{Collaborators, Collection, CollectionOptions, SourcesOptions};
pub use error::{DocGraphError, ExportError, Result};
pub use project::Project;
pub use resolver::Export;
pub use tree::{Order, Source, SourceKind, SourceTree};
pub use validation::{ExportValidator, Schema};
