use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level project configuration parsed from docgraph.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDefinition {
    /// Reusable object shapes referenced by field `type`
    #[serde(default)]
    pub types: HashMap<String, HashMap<String, FieldDefinition>>,
    #[serde(default)]
    pub collections: HashMap<String, CollectionDefinition>,
}

/// Definition of a single content collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDefinition {
    /// Glob pattern relative to the project root
    pub pattern: String,
    /// Collection root; defaults to the literal directory prefix of `pattern`
    #[serde(default)]
    pub base_directory: Option<String>,
    /// URL prefix prepended to every source pathname
    #[serde(default)]
    pub base_pathname: Option<String>,
    /// Validators keyed by export name
    #[serde(default)]
    pub schema: HashMap<String, ExportSchemaDefinition>,
}

/// Declarative validation for an object-valued export (e.g. `frontmatter`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportSchemaDefinition {
    #[serde(default)]
    pub fields: HashMap<String, FieldDefinition>,
    #[serde(default)]
    pub additional_properties: bool,
    /// When false, validation issues are logged as warnings and the value passes
    #[serde(default)]
    pub strict: bool,
}

/// Definition of a single field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub items: Option<ItemType>,
}

/// Field type enumeration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Datetime,
    List,
    Object,
    #[serde(untagged)]
    Custom(std::string::String),
}

/// Item type for lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemType {
    Simple(String),
    Complex(Box<FieldDefinition>),
}
