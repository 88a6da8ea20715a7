pub mod parser;
pub mod types;

pub use parser::{parse_config, parse_config_str};
pub use types::{
    CollectionDefinition, ExportSchemaDefinition, FieldDefinition, FieldType, ItemType,
    ProjectDefinition,
};
