// Markdown/MDX documents - YAML front matter, headings, and export lines

use crate::error::Result;
use crate::resolver::Span;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const FRONT_MATTER_DELIMITER: &str = "---";

/// A parsed Markdown or MDX file.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownDocument {
    pub frontmatter: Option<serde_yaml::Value>,
    /// Byte span of the front matter block, delimiters included.
    pub frontmatter_span: Option<Span>,
    pub body: String,
    /// Byte offset of the body within the original file.
    pub body_offset: usize,
}

/// A heading extracted from a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub depth: u8,
    pub text: String,
    pub id: String,
}

/// An `export ...` statement found in an MDX body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLine {
    /// Statement text. Spans several lines when brackets are left open.
    pub line: String,
    /// Byte span of the statement within the original file.
    pub span: Span,
}

/// Split a document into front matter and body.
pub fn parse_markdown(content: &str) -> Result<MarkdownDocument> {
    let Some((yaml, block_end)) = find_front_matter(content) else {
        return Ok(MarkdownDocument {
            frontmatter: None,
            frontmatter_span: None,
            body: content.to_string(),
            body_offset: 0,
        });
    };

    let frontmatter: serde_yaml::Value = if yaml.trim().is_empty() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        serde_yaml::from_str(yaml)?
    };

    Ok(MarkdownDocument {
        frontmatter: Some(frontmatter),
        frontmatter_span: Some(Span {
            start: 0,
            end: block_end,
        }),
        body: content[block_end..].to_string(),
        body_offset: block_end,
    })
}

/// Returns the YAML text and the byte offset just past the closing delimiter
/// line.
fn find_front_matter(content: &str) -> Option<(&str, usize)> {
    let first_line_end = content.find('\n')?;
    if content[..first_line_end].trim_end() != FRONT_MATTER_DELIMITER {
        return None;
    }

    let yaml_start = first_line_end + 1;
    let mut offset = yaml_start;
    for line in content[yaml_start..].split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            return Some((&content[yaml_start..offset], offset + line.len()));
        }
        offset += line.len();
    }
    None
}

/// ATX headings (`#` .. `######`) outside fenced code blocks, with unique
/// slug ids.
pub fn extract_headings(body: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut used: HashMap<String, usize> = HashMap::new();

    for (_, line) in lines_outside_fences(body) {
        let trimmed = line.trim_start();
        let depth = trimmed.bytes().take_while(|&b| b == b'#').count();
        if depth == 0 || depth > 6 {
            continue;
        }
        let rest = &trimmed[depth..];
        if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
            continue;
        }

        let text = rest.trim().trim_end_matches('#').trim().to_string();
        if text.is_empty() {
            continue;
        }

        let base = slug::slugify(&text);
        let count = used.entry(base.clone()).or_insert(0);
        let id = if *count == 0 {
            base
        } else {
            format!("{base}-{count}")
        };
        *count += 1;

        headings.push(Heading {
            depth: depth as u8,
            text,
            id,
        });
    }

    headings
}

/// Statements starting with `export` outside fenced code blocks.
///
/// A statement whose brackets are still open at the end of its first line
/// takes in following lines until they balance. `offset` is added to every
/// span, so passing the body offset yields spans relative to the whole file.
pub fn export_lines(body: &str, offset: usize) -> Vec<ExportLine> {
    let lines = lines_outside_fences(body);
    let mut exports = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let (start, line) = lines[i];
        i += 1;
        if !(line.starts_with("export ") || line.starts_with("export{")) {
            continue;
        }

        let mut depth = bracket_balance(line);
        let mut end = start + line.len();
        while depth > 0 && i < lines.len() {
            let (next_start, next) = lines[i];
            i += 1;
            depth += bracket_balance(next);
            end = next_start + next.len();
        }

        let text = body[start..end].trim_end();
        exports.push(ExportLine {
            line: text.to_string(),
            span: Span {
                start: offset + start,
                end: offset + start + text.len(),
            },
        });
    }

    exports
}

/// Opening minus closing brackets on a line, ignoring quoted text.
fn bracket_balance(line: &str) -> i32 {
    let mut balance = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '{' | '[' | '(' => balance += 1,
            '}' | ']' | ')' => balance -= 1,
            _ => {}
        }
    }

    balance
}

fn lines_outside_fences(body: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut fence: Option<&str> = None;
    let mut offset = 0;

    for raw in body.split_inclusive('\n') {
        let start = offset;
        offset += raw.len();
        let line = raw.trim_end_matches(&['\n', '\r'][..]);
        let trimmed = line.trim_start();

        match fence {
            Some(marker) => {
                if trimmed.starts_with(marker) {
                    fence = None;
                }
            }
            None => {
                if trimmed.starts_with("```") {
                    fence = Some("```");
                } else if trimmed.starts_with("~~~") {
                    fence = Some("~~~");
                } else {
                    lines.push((start, line));
                }
            }
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = "---\ntitle: Routing\ntags: [a, b]\n---\n# Routing\n\nText\n\n```md\n# not a heading\n```\n\n## Nested Routes\n\n## Nested Routes\n";

    #[test]
    fn test_parse_front_matter() {
        let doc = parse_markdown(DOC).unwrap();
        let fm = doc.frontmatter.unwrap();
        assert_eq!(fm["title"], serde_yaml::Value::String("Routing".into()));
        let span = doc.frontmatter_span.unwrap();
        assert_eq!(&DOC[span.start..span.end], "---\ntitle: Routing\ntags: [a, b]\n---\n");
        assert!(doc.body.starts_with("# Routing"));
        assert_eq!(doc.body_offset, span.end);
    }

    #[test]
    fn test_no_front_matter() {
        let doc = parse_markdown("# Hello\n").unwrap();
        assert!(doc.frontmatter.is_none());
        assert_eq!(doc.body, "# Hello\n");
    }

    #[test]
    fn test_unterminated_front_matter_is_body() {
        let doc = parse_markdown("---\ntitle: x\n# Hello\n").unwrap();
        assert!(doc.frontmatter.is_none());
    }

    #[test]
    fn test_invalid_front_matter_is_error() {
        assert!(parse_markdown("---\ntitle: [unclosed\n---\n").is_err());
    }

    #[test]
    fn test_headings_skip_code_and_dedupe_ids() {
        let doc = parse_markdown(DOC).unwrap();
        let headings = extract_headings(&doc.body);
        assert_eq!(
            headings,
            vec![
                Heading { depth: 1, text: "Routing".into(), id: "routing".into() },
                Heading { depth: 2, text: "Nested Routes".into(), id: "nested-routes".into() },
                Heading { depth: 2, text: "Nested Routes".into(), id: "nested-routes-1".into() },
            ]
        );
    }

    #[test]
    fn test_export_lines_with_offsets() {
        let content = "---\ntitle: x\n---\nexport const meta = { draft: true }\n\n# Title\n";
        let doc = parse_markdown(content).unwrap();
        let exports = export_lines(&doc.body, doc.body_offset);
        assert_eq!(exports.len(), 1);
        let span = exports[0].span;
        assert_eq!(&content[span.start..span.end], "export const meta = { draft: true }");
    }

    #[test]
    fn test_export_statement_spans_open_brackets() {
        let content = "---\ntitle: x\n---\nexport const meta = {\n  title: 'Hi {there}',\n  tags: ['a'],\n}\n\n# Title\nexport const done = true\n";
        let doc = parse_markdown(content).unwrap();
        let exports = export_lines(&doc.body, doc.body_offset);
        assert_eq!(exports.len(), 2);
        assert_eq!(
            exports[0].line,
            "export const meta = {\n  title: 'Hi {there}',\n  tags: ['a'],\n}"
        );
        let span = exports[0].span;
        assert_eq!(&content[span.start..span.end], exports[0].line);
        assert_eq!(exports[1].line, "export const done = true");
    }
}
