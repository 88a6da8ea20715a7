use super::analyzer::is_markdown;
use crate::document::{export_lines, extract_headings, parse_markdown};
use crate::error::{ExportError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// A module's runtime exports by name.
pub type ModuleExports = HashMap<String, serde_json::Value>;

/// Evaluates a module file into its runtime export map.
///
/// Implementations report evaluation failures as
/// [`ExportError::ModuleLoad`]; any other error is wrapped into one by the
/// resolver.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<ModuleExports>;
}

/// Loads Markdown and MDX files.
///
/// Exports `default` (the body text), `headings`, `frontmatter` when present,
/// and for MDX every `export const NAME = <literal>` whose literal parses as
/// YAML (which covers JSON and most object literals). Bindings to anything
/// else, such as functions or template strings, are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownLoader;

impl MarkdownLoader {
    pub fn evaluate(path: &Path, content: &str) -> std::result::Result<ModuleExports, ExportError> {
        let load_error = |reason: String| ExportError::ModuleLoad {
            path: path.display().to_string(),
            reason,
        };

        let doc = parse_markdown(content).map_err(|e| load_error(format!("invalid front matter: {e}")))?;
        let mut exports = ModuleExports::new();

        if let Some(frontmatter) = &doc.frontmatter {
            let value = serde_json::to_value(frontmatter)
                .map_err(|e| load_error(format!("front matter is not representable: {e}")))?;
            exports.insert("frontmatter".into(), value);
        }

        let headings = serde_json::to_value(extract_headings(&doc.body))
            .map_err(|e| load_error(e.to_string()))?;
        exports.insert("headings".into(), headings);

        if path.extension().and_then(|e| e.to_str()) == Some("mdx") {
            for line in export_lines(&doc.body, doc.body_offset) {
                if let Some((name, value)) = evaluate_binding(&line.line) {
                    exports.entry(name).or_insert(value);
                }
            }
        }

        exports.insert("default".into(), serde_json::Value::String(doc.body));
        Ok(exports)
    }
}

#[async_trait]
impl ModuleLoader for MarkdownLoader {
    async fn load(&self, path: &Path) -> Result<ModuleExports> {
        if !is_markdown(path) {
            return Err(ExportError::ModuleLoad {
                path: path.display().to_string(),
                reason: "no loader registered for this file type".into(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExportError::ModuleLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(MarkdownLoader::evaluate(path, &content)?)
    }
}

fn binding_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^export\s+(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(.+?);?\s*$")
            .expect("binding pattern is valid")
    })
}

fn trailing_comma_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern is valid"))
}

fn looks_literal(expression: &str) -> bool {
    matches!(expression, "true" | "false" | "null")
        || expression
            .chars()
            .next()
            .map_or(false, |c| matches!(c, '{' | '[' | '\'' | '"' | '-') || c.is_ascii_digit())
}

fn evaluate_binding(statement: &str) -> Option<(String, serde_json::Value)> {
    let caps = binding_pattern().captures(statement)?;
    let name = caps[1].to_string();
    let expression = caps[2].trim();

    if !looks_literal(expression) {
        log::debug!("Skipping export '{name}': not a literal");
        return None;
    }

    let joined = expression.lines().map(str::trim).collect::<Vec<_>>().join(" ");
    let cleaned = trailing_comma_pattern().replace_all(&joined, "$1");
    match serde_yaml::from_str::<serde_yaml::Value>(&cleaned)
        .ok()
        .and_then(|yaml| serde_json::to_value(yaml).ok())
    {
        Some(value) => Some((name, value)),
        None => {
            log::debug!("Skipping export '{name}': literal did not parse");
            None
        }
    }
}
