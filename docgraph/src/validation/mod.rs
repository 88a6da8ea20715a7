use crate::config::{ExportSchemaDefinition, FieldDefinition, FieldType, ItemType};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Custom object types by name, as declared under `types:` in the config.
pub type TypeDefinitions = HashMap<String, HashMap<String, FieldDefinition>>;

/// Validates, and may transform, the loaded value of one export.
///
/// Returns the value to cache, or a diagnostic describing why the value was
/// rejected.
pub trait ExportValidator: Send + Sync {
    fn validate(&self, export_name: &str, value: Value) -> Result<Value, String>;
}

impl<F> ExportValidator for F
where
    F: Fn(&str, Value) -> Result<Value, String> + Send + Sync,
{
    fn validate(&self, export_name: &str, value: Value) -> Result<Value, String> {
        self(export_name, value)
    }
}

/// Validators keyed by export name.
#[derive(Clone, Default)]
pub struct Schema {
    validators: HashMap<String, Arc<dyn ExportValidator>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with<V: ExportValidator + 'static>(mut self, export: impl Into<String>, validator: V) -> Self {
        self.insert(export, validator);
        self
    }

    pub fn insert<V: ExportValidator + 'static>(&mut self, export: impl Into<String>, validator: V) {
        self.validators.insert(export.into(), Arc::new(validator));
    }

    pub fn get(&self, export: &str) -> Option<&Arc<dyn ExportValidator>> {
        self.validators.get(export)
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a schema of [`FieldSchema`] validators from config definitions.
    pub fn from_definitions(
        definitions: &HashMap<String, ExportSchemaDefinition>,
        types: &TypeDefinitions,
    ) -> Self {
        let mut schema = Schema::new();
        for (export, definition) in definitions {
            schema.insert(export.clone(), FieldSchema::new(definition.clone(), types.clone()));
        }
        schema
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("exports", &self.names()).finish()
    }
}

/// Result of checking a value against a field schema
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A declarative object validator built from field definitions.
///
/// Defaults are applied before checking, so the cached value carries them.
/// In strict mode any issue rejects the value; otherwise issues are logged as
/// warnings and the value passes.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    definition: ExportSchemaDefinition,
    types: TypeDefinitions,
}

impl FieldSchema {
    pub fn new(definition: ExportSchemaDefinition, types: TypeDefinitions) -> Self {
        FieldSchema { definition, types }
    }

    /// Check a value without modifying it.
    pub fn check(&self, value: &Value) -> ValidationResult {
        let mut result = ValidationResult::default();
        let strict = self.definition.strict;

        let Some(object) = value.as_object() else {
            add_issue(
                &mut result,
                strict,
                format!("expected object, got {}", type_name(value)),
            );
            return result;
        };

        for (field_name, field_def) in &self.definition.fields {
            let field_value = object.get(field_name).filter(|v| !v.is_null());

            match field_value {
                None if field_def.required && field_def.default.is_none() => {
                    add_issue(
                        &mut result,
                        strict,
                        format!("Required field '{field_name}' is missing"),
                    );
                }
                None => {}
                Some(v) => self.check_field(field_name, field_def, v, &mut result),
            }
        }

        if !self.definition.additional_properties {
            for key in object.keys() {
                if !self.definition.fields.contains_key(key) {
                    add_issue(
                        &mut result,
                        strict,
                        format!("Unexpected field '{key}' (additional_properties is false)"),
                    );
                }
            }
        }

        result
    }

    /// Fill in missing or null fields that declare a default.
    pub fn apply_defaults(&self, value: &mut Value) {
        let Some(object) = value.as_object_mut() else {
            return;
        };

        for (field_name, field_def) in &self.definition.fields {
            let has_value = object.get(field_name).map_or(false, |v| !v.is_null());
            if has_value {
                continue;
            }
            if let Some(default) = &field_def.default {
                match serde_json::to_value(default) {
                    Ok(json) => {
                        object.insert(field_name.clone(), json);
                    }
                    Err(e) => log::warn!("Default for field '{field_name}' is not valid JSON: {e}"),
                }
            }
        }
    }

    fn check_field(
        &self,
        field_name: &str,
        field_def: &FieldDefinition,
        value: &Value,
        result: &mut ValidationResult,
    ) {
        let strict = self.definition.strict;

        match &field_def.field_type {
            FieldType::String => {
                let Some(s) = value.as_str() else {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected string, got {}", type_name(value)),
                    );
                    return;
                };

                if let Some(enum_values) = &field_def.enum_values {
                    if !enum_values.iter().any(|allowed| allowed == s) {
                        add_issue(
                            result,
                            strict,
                            format!("Field '{field_name}' value '{s}' is not in enum: {enum_values:?}"),
                        );
                    }
                }
            }
            FieldType::Number => {
                if !value.is_number() {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected number, got {}", type_name(value)),
                    );
                }
            }
            FieldType::Boolean => {
                if !value.is_boolean() {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected boolean, got {}", type_name(value)),
                    );
                }
            }
            FieldType::Date => {
                let parsed = value
                    .as_str()
                    .map(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());
                if parsed != Some(true) {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected date (YYYY-MM-DD), got {value}"),
                    );
                }
            }
            FieldType::Datetime => {
                let parsed = value
                    .as_str()
                    .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok());
                if parsed != Some(true) {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected RFC 3339 datetime, got {value}"),
                    );
                }
            }
            FieldType::List => {
                let Some(items) = value.as_array() else {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected list, got {}", type_name(value)),
                    );
                    return;
                };

                if let Some(item_type) = &field_def.items {
                    let item_def = match item_type {
                        ItemType::Simple(name) => simple_field(name),
                        ItemType::Complex(def) => (**def).clone(),
                    };
                    for (index, item) in items.iter().enumerate() {
                        self.check_field(&format!("{field_name}[{index}]"), &item_def, item, result);
                    }
                }
            }
            FieldType::Object => {
                if !value.is_object() {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' expected object, got {}", type_name(value)),
                    );
                }
            }
            FieldType::Custom(type_name_str) => {
                let Some(type_fields) = self.types.get(type_name_str) else {
                    add_issue(
                        result,
                        strict,
                        format!("Field '{field_name}' uses unknown type '{type_name_str}'"),
                    );
                    return;
                };

                let Some(object) = value.as_object() else {
                    add_issue(
                        result,
                        strict,
                        format!(
                            "Field '{field_name}' expected object (type '{type_name_str}'), got {}",
                            type_name(value)
                        ),
                    );
                    return;
                };

                for (sub_name, sub_def) in type_fields {
                    match object.get(sub_name).filter(|v| !v.is_null()) {
                        None if sub_def.required => add_issue(
                            result,
                            strict,
                            format!("Field '{field_name}.{sub_name}' is required in type '{type_name_str}'"),
                        ),
                        None => {}
                        Some(v) => self.check_field(&format!("{field_name}.{sub_name}"), sub_def, v, result),
                    }
                }
            }
        }
    }
}

impl ExportValidator for FieldSchema {
    fn validate(&self, export_name: &str, mut value: Value) -> Result<Value, String> {
        self.apply_defaults(&mut value);
        let result = self.check(&value);

        for warning in &result.warnings {
            log::warn!("Export '{export_name}': {warning}");
        }

        if result.is_ok() {
            Ok(value)
        } else {
            Err(result.errors.join("; "))
        }
    }
}

/// Item definition for `items: string` style lists.
fn simple_field(name: &str) -> FieldDefinition {
    let field_type = match name {
        "string" => FieldType::String,
        "number" => FieldType::Number,
        "boolean" => FieldType::Boolean,
        "date" => FieldType::Date,
        "datetime" => FieldType::Datetime,
        "list" => FieldType::List,
        "object" => FieldType::Object,
        other => FieldType::Custom(other.to_string()),
    };
    FieldDefinition {
        field_type,
        required: false,
        enum_values: None,
        default: None,
        items: None,
    }
}

fn add_issue(result: &mut ValidationResult, strict: bool, message: String) {
    if strict {
        result.errors.push(message);
    } else {
        result.warnings.push(message);
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
