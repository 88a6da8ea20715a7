use crate::collection::{Collaborators, Collection, CollectionOptions};
use crate::config::{parse_config, ProjectDefinition};
use crate::error::{DocGraphError, Result};
use crate::validation::Schema;
use crate::watcher::FileWatcher;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the project configuration file at the project root.
pub const CONFIG_FILE: &str = "docgraph.yaml";

/// Every collection configured for one project root.
pub struct Project {
    root: PathBuf,
    definition: ProjectDefinition,
    collections: BTreeMap<String, Arc<Collection>>,
}

impl Project {
    /// Open a project by reading `docgraph.yaml` under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(DocGraphError::Config(format!(
                "No {CONFIG_FILE} found in {}",
                root.display()
            )));
        }
        let definition = parse_config(&config_path)?;
        Self::from_definition(root, definition, Collaborators::builtin())
    }

    /// Build a project from an already parsed definition.
    pub fn from_definition(
        root: impl AsRef<Path>,
        definition: ProjectDefinition,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut collections = BTreeMap::new();

        for (name, def) in &definition.collections {
            let mut options = CollectionOptions::new(def.pattern.clone())
                .root_dir(&root)
                .schema(Schema::from_definitions(&def.schema, &definition.types));
            if let Some(dir) = &def.base_directory {
                options = options.base_directory(dir);
            }
            if let Some(pathname) = &def.base_pathname {
                options = options.base_pathname(pathname.clone());
            }

            let collection = Collection::new(options, collaborators.clone())?;
            log::debug!(
                "Configured collection '{name}' at {}",
                collection.base_directory().display()
            );
            collections.insert(name.clone(), Arc::new(collection));
        }

        Ok(Project {
            root,
            definition,
            collections,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn definition(&self) -> &ProjectDefinition {
        &self.definition
    }

    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections.get(name).cloned().ok_or_else(|| {
            DocGraphError::Config(format!("Unknown collection '{name}'"))
        })
    }

    /// Collections in name order.
    pub fn collections(&self) -> impl Iterator<Item = (&str, &Arc<Collection>)> {
        self.collections.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.keys().map(String::as_str).collect()
    }

    /// Forward an invalidation to every collection. Returns how many
    /// collections it applied to.
    pub fn invalidate(&self, path: &Path) -> usize {
        let affected = self
            .collections
            .values()
            .filter(|collection| collection.invalidate(path))
            .count();
        if affected == 0 {
            log::debug!("No collection covers {}", path.display());
        }
        affected
    }

    /// Start watching every collection's base directory.
    pub fn watch(&self) -> Result<FileWatcher> {
        let mut dirs: Vec<PathBuf> = self
            .collections
            .values()
            .map(|c| c.base_directory().to_path_buf())
            .collect();
        dirs.sort();
        dirs.dedup();
        Ok(FileWatcher::start(&dirs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
types:
  author:
    name: { type: string, required: true }
collections:
  docs:
    pattern: "docs/**/*.md"
    base_pathname: docs
    schema:
      frontmatter:
        fields:
          title: { type: string, required: true }
        additional_properties: true
        strict: true
  blog:
    pattern: "blog/*.md"
"#;

    fn setup() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), CONFIG).unwrap();
        std::fs::create_dir_all(tmp.path().join("docs")).unwrap();
        std::fs::create_dir_all(tmp.path().join("blog")).unwrap();
        std::fs::write(tmp.path().join("docs/01.intro.md"), "---\ntitle: Intro\n---\n").unwrap();
        std::fs::write(tmp.path().join("docs/02.draft.md"), "---\nsummary: none\n---\n").unwrap();
        std::fs::write(tmp.path().join("blog/hello.md"), "# Hello\n").unwrap();
        tmp
    }

    #[tokio::test]
    async fn test_open_configures_collections() {
        let tmp = setup();
        let project = Project::open(tmp.path()).unwrap();
        assert_eq!(project.collection_names(), vec!["blog", "docs"]);

        let docs = project.collection("docs").unwrap();
        assert_eq!(docs.base_pathname(), Some("docs"));
        let intro = docs.get_source("intro").await.unwrap().unwrap();
        assert_eq!(intro.pathname(), "/docs/intro");

        let draft = docs.get_source("draft").await.unwrap().unwrap();
        let err = docs.get_export(&draft, "frontmatter").await.unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_missing_config() {
        let tmp = TempDir::new().unwrap();
        let err = Project::open(tmp.path()).err().unwrap();
        assert!(matches!(err, DocGraphError::Config(_)));
    }

    #[test]
    fn test_unknown_collection() {
        let tmp = setup();
        let project = Project::open(tmp.path()).unwrap();
        assert!(project.collection("api").is_err());
    }

    #[tokio::test]
    async fn test_invalidate_fans_out_to_matching_collections() {
        let tmp = setup();
        let project = Project::open(tmp.path()).unwrap();
        for (_, collection) in project.collections() {
            collection.tree().await.unwrap();
        }

        assert_eq!(project.invalidate(&tmp.path().join("docs/01.intro.md")), 1);
        assert!(project.collection("docs").unwrap().is_stale());
        assert!(!project.collection("blog").unwrap().is_stale());

        // The project root contains both base directories.
        assert_eq!(project.invalidate(tmp.path()), 2);
    }
}
