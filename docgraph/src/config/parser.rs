use super::types::{FieldType, ProjectDefinition};
use crate::error::{DocGraphError, Result};
use std::path::Path;

/// Parse a docgraph.yaml file into a ProjectDefinition
pub fn parse_config(path: &Path) -> Result<ProjectDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse a config YAML string into a ProjectDefinition and check it
pub fn parse_config_str(content: &str) -> Result<ProjectDefinition> {
    let config: ProjectDefinition = serde_yaml::from_str(content)?;
    check(&config)?;
    Ok(config)
}

fn check(config: &ProjectDefinition) -> Result<()> {
    for (name, collection) in &config.collections {
        if collection.pattern.trim().is_empty() {
            return Err(DocGraphError::Config(format!(
                "Collection '{name}' has an empty pattern"
            )));
        }
        if Path::new(&collection.pattern).is_absolute() {
            return Err(DocGraphError::Config(format!(
                "Collection '{name}' pattern must be relative to the project root"
            )));
        }

        for (export, schema) in &collection.schema {
            for (field, def) in &schema.fields {
                if let FieldType::Custom(type_name) = &def.field_type {
                    if !config.types.contains_key(type_name) {
                        return Err(DocGraphError::Config(format!(
                            "Field '{field}' of export '{export}' in collection '{name}' uses unknown type '{type_name}'"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}
