use super::ExportMetadata;
use crate::document::{export_lines, parse_markdown, ExportLine};
use crate::error::{DocGraphError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::path::Path;
use std::sync::OnceLock;

/// Extensions whose exports can be statically analyzed.
pub const ANALYZABLE_EXTENSIONS: &[&str] = &[
    "md", "mdx", "js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts",
];

/// Static export information for a source file.
#[async_trait]
pub trait SourceAnalyzer: Send + Sync {
    /// Metadata for `name`, or `None` when the file does not export it.
    async fn export_metadata(&self, path: &Path, name: &str) -> Result<Option<ExportMetadata>>;

    async fn export_names(&self, path: &Path) -> Result<Vec<String>>;
}

pub fn is_analyzable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| ANALYZABLE_EXTENSIONS.contains(&ext))
}

pub(crate) fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("mdx")
    )
}

/// A line-oriented analyzer for Markdown, MDX and JavaScript-family modules.
///
/// Markdown files always export `default` (the rendered body) and
/// `headings`, plus `frontmatter` when a front matter block is present. MDX
/// and script files additionally export whatever top-level `export`
/// declarations they contain.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAnalyzer;

impl StaticAnalyzer {
    pub fn analyze(path: &Path, content: &str) -> Result<Vec<ExportMetadata>> {
        let mut exports = Vec::new();

        if is_markdown(path) {
            let doc = parse_markdown(content).map_err(|e| {
                DocGraphError::Other(format!("invalid front matter in {}: {e}", path.display()))
            })?;

            if let Some(frontmatter) = &doc.frontmatter {
                let keys: Vec<String> = frontmatter
                    .as_mapping()
                    .map(|m| m.keys().filter_map(|k| k.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                exports.push(ExportMetadata {
                    name: "frontmatter".into(),
                    position: doc.frontmatter_span,
                    type_description: Some(json!({ "kind": "frontmatter", "keys": keys })),
                });
            }
            exports.push(ExportMetadata {
                name: "default".into(),
                position: None,
                type_description: Some(json!({ "kind": "content" })),
            });
            exports.push(ExportMetadata {
                name: "headings".into(),
                position: None,
                type_description: Some(json!({ "kind": "headings" })),
            });

            if path.extension().and_then(|e| e.to_str()) == Some("mdx") {
                for line in export_lines(&doc.body, doc.body_offset) {
                    exports.extend(parse_export_line(&line));
                }
            }
        } else {
            for line in export_lines(content, 0) {
                exports.extend(parse_export_line(&line));
            }
        }

        let mut seen = std::collections::HashSet::new();
        exports.retain(|e| seen.insert(e.name.clone()));
        Ok(exports)
    }
}

#[async_trait]
impl SourceAnalyzer for StaticAnalyzer {
    async fn export_metadata(&self, path: &Path, name: &str) -> Result<Option<ExportMetadata>> {
        let content = tokio::fs::read_to_string(path).await?;
        let exports = StaticAnalyzer::analyze(path, &content)?;
        Ok(exports.into_iter().find(|e| e.name == name))
    }

    async fn export_names(&self, path: &Path) -> Result<Vec<String>> {
        let content = tokio::fs::read_to_string(path).await?;
        let exports = StaticAnalyzer::analyze(path, &content)?;
        Ok(exports.into_iter().map(|e| e.name).collect())
    }
}

fn declaration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^export\s+(?:declare\s+)?(async\s+function\*?|function\*?|const|let|var|abstract\s+class|class|interface|type|enum)\s+([A-Za-z_$][\w$]*)(.*)$",
        )
        .expect("declaration pattern is valid")
    })
}

fn default_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^export\s+default\b\s*(.*)$").expect("default pattern is valid")
    })
}

fn list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^export\s*\{([^}]*)\}").expect("list pattern is valid"))
}

fn annotation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*:\s*([^=]+?)\s*=").expect("annotation pattern is valid"))
}

fn parse_export_line(export: &ExportLine) -> Vec<ExportMetadata> {
    let statement = export.line.as_str();
    let line = statement.lines().next().unwrap_or_default();
    let position = Some(export.span);

    if let Some(caps) = default_pattern().captures(line) {
        let rest = caps.get(1).map_or("", |m| m.as_str());
        let kind = rest.split_whitespace().next().unwrap_or("expression");
        return vec![ExportMetadata {
            name: "default".into(),
            position,
            type_description: Some(json!({ "kind": kind })),
        }];
    }

    if let Some(caps) = declaration_pattern().captures(line) {
        let kind = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
        let name = caps[2].to_string();
        let rest = caps.get(3).map_or("", |m| m.as_str());

        let type_description = if kind.contains("function") {
            let signature = rest.split('{').next().unwrap_or("").trim();
            json!({ "kind": kind, "signature": format!("{name}{signature}") })
        } else if matches!(kind.as_str(), "const" | "let" | "var") {
            match annotation_pattern().captures(rest) {
                Some(ann) => json!({ "kind": kind, "annotation": ann[1].trim() }),
                None => json!({ "kind": kind }),
            }
        } else {
            json!({ "kind": kind })
        };

        return vec![ExportMetadata {
            name,
            position,
            type_description: Some(type_description),
        }];
    }

    if let Some(caps) = list_pattern().captures(statement) {
        return caps[1]
            .split(',')
            .filter_map(|item| {
                let item = item.trim();
                let exported = match item.split_once(" as ") {
                    Some((_, alias)) => alias.trim(),
                    None => item,
                };
                let exported = exported.trim_start_matches("type ").trim();
                (!exported.is_empty()).then(|| ExportMetadata {
                    name: exported.to_string(),
                    position,
                    type_description: Some(json!({ "kind": "reexport" })),
                })
            })
            .collect();
    }

    Vec::new()
}
