// Path normalization - ordering prefixes, slugification, sibling ordering

use crate::error::{DocGraphError, Result};
use crate::tree::SourceKind;
use heck::{ToKebabCase, ToTitleCase};
use std::collections::HashMap;

/// File stems that mark a directory's designated index file.
const INDEX_STEMS: &[&str] = &["index", "readme"];

/// The normalized form of a single filesystem entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedName {
    pub raw_name: String,
    pub segment: String,
    /// Numeric ordering prefix (`03.examples` -> 3), if present.
    pub prefix: Option<u32>,
    pub extension: Option<String>,
    pub is_index: bool,
}

/// A sibling entry after collision checks and local order assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEntry {
    pub name: NormalizedName,
    pub kind: SourceKind,
    pub local_order: u32,
}

/// Normalize a raw filesystem entry name into a URL segment and an optional
/// numeric ordering prefix.
pub fn normalize(raw_name: &str, kind: SourceKind) -> Result<NormalizedName> {
    let (stem, extension) = match kind {
        SourceKind::File => split_extension(raw_name),
        SourceKind::Directory => (raw_name, None),
    };

    let (prefix, rest) = split_order_prefix(stem);
    let segment = slugify(rest);

    if segment.is_empty() {
        return Err(DocGraphError::Normalization {
            path: raw_name.to_string(),
            reason: "name normalizes to an empty segment".into(),
        });
    }

    let is_index = kind == SourceKind::File
        && INDEX_STEMS.iter().any(|s| rest.eq_ignore_ascii_case(s));

    Ok(NormalizedName {
        raw_name: raw_name.to_string(),
        segment,
        prefix,
        extension: extension.map(str::to_string),
        is_index,
    })
}

/// Normalize every entry of one directory level, reject colliding segments,
/// and return the entries in sibling order with their local order assigned.
///
/// Index files come first, then entries with a numeric prefix sorted by that
/// number (ties broken by segment), then entries without a prefix sorted by
/// segment. A prefix becomes the entry's local order unless an earlier
/// sibling already holds it, in which case the entry takes the next free
/// number, so local orders are always strictly increasing.
pub fn normalize_siblings(
    parent: &str,
    entries: &[(String, SourceKind)],
) -> Result<Vec<NormalizedEntry>> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut named = Vec::with_capacity(entries.len());

    for (raw_name, kind) in entries {
        let name = normalize(raw_name, *kind)?;

        if let Some(existing) = seen.insert(name.segment.clone(), raw_name.clone()) {
            return Err(DocGraphError::Normalization {
                path: join_display(parent, &name.segment),
                reason: format!(
                    "'{existing}' and '{raw_name}' both normalize to segment '{}'",
                    name.segment
                ),
            });
        }
        named.push((name, *kind));
    }

    // index.mdx beside readme.md: the lexically first is the designated index.
    named.sort_by(|(a, _), (b, _)| {
        let rank = |n: &NormalizedName| (!n.is_index, n.prefix.is_none(), n.prefix);
        rank(a).cmp(&rank(b)).then_with(|| a.segment.cmp(&b.segment))
    });

    let mut ordered = Vec::with_capacity(named.len());
    let mut next: u32 = 0;
    for (name, kind) in named {
        let wanted = match (name.is_index, name.prefix) {
            (true, _) => 0,
            (false, Some(prefix)) => prefix,
            (false, None) => 1,
        };
        let local_order = wanted.max(next);
        next = local_order + 1;
        ordered.push(NormalizedEntry { name, kind, local_order });
    }

    Ok(ordered)
}

/// Slugify a name for use as a path segment.
///
/// Bracketed dynamic-route tokens (`[slug]`, `[...slug]`, `[[...slug]]`) are
/// kept verbatim. Everything else is split on word boundaries (including
/// camelCase and PascalCase humps), joined with `-`, lowercased and
/// transliterated to ASCII.
pub fn slugify(input: &str) -> String {
    let trimmed = input.trim();
    if is_dynamic_segment(trimmed) {
        return trimmed.to_string();
    }
    slug::slugify(trimmed.to_kebab_case())
}

/// Human readable title for a segment: `getting-started` -> `Getting Started`.
pub fn title_case(segment: &str) -> String {
    if is_dynamic_segment(segment) {
        return segment.to_string();
    }
    segment.to_title_case()
}

/// Whether a name is a bracketed dynamic-route token.
pub fn is_dynamic_segment(name: &str) -> bool {
    let inner = name
        .strip_prefix("[[")
        .and_then(|s| s.strip_suffix("]]"))
        .or_else(|| name.strip_prefix('[').and_then(|s| s.strip_suffix(']')));
    match inner {
        Some(inner) => {
            let inner = inner.strip_prefix("...").unwrap_or(inner);
            !inner.is_empty() && !inner.contains(&['[', ']', '/'][..])
        }
        None => false,
    }
}

fn split_extension(raw_name: &str) -> (&str, Option<&str>) {
    match raw_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (raw_name, None),
    }
}

/// Split a leading `NN.` or `NN-` ordering prefix off a name.
fn split_order_prefix(name: &str) -> (Option<u32>, &str) {
    let digits = name.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, name);
    }

    let rest = &name[digits..];
    match rest.strip_prefix(&['.', '-'][..]) {
        Some(tail) if !tail.is_empty() => match name[..digits].parse::<u32>() {
            Ok(prefix) => (Some(prefix), tail),
            Err(_) => (None, name),
        },
        _ => (None, name),
    }
}

fn join_display(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(name: &str) -> (String, SourceKind) {
        (name.to_string(), SourceKind::File)
    }

    fn dir(name: &str) -> (String, SourceKind) {
        (name.to_string(), SourceKind::Directory)
    }

    #[test]
    fn test_strips_prefix_and_extension() {
        let name = normalize("01.getting-started.mdx", SourceKind::File).unwrap();
        assert_eq!(name.segment, "getting-started");
        assert_eq!(name.prefix, Some(1));
        assert_eq!(name.extension.as_deref(), Some("mdx"));
        assert!(!name.is_index);
    }

    #[test]
    fn test_dash_prefix_on_directory() {
        let name = normalize("03-examples", SourceKind::Directory).unwrap();
        assert_eq!(name.segment, "examples");
        assert_eq!(name.prefix, Some(3));
        assert_eq!(name.extension, None);
    }

    #[test]
    fn test_directory_keeps_dots_as_name() {
        let name = normalize("03.examples", SourceKind::Directory).unwrap();
        assert_eq!(name.segment, "examples");
        assert_eq!(name.prefix, Some(3));
    }

    #[test]
    fn test_numeric_name_without_separator_is_not_a_prefix() {
        let name = normalize("404.mdx", SourceKind::File).unwrap();
        assert_eq!(name.segment, "404");
        assert_eq!(name.prefix, None);
    }

    #[test]
    fn test_camel_and_pascal_case() {
        assert_eq!(slugify("gettingStarted"), "getting-started");
        assert_eq!(slugify("CodeBlock"), "code-block");
        assert_eq!(slugify("API Reference"), "api-reference");
        assert_eq!(slugify("snake_case_name"), "snake-case-name");
    }

    #[test]
    fn test_dynamic_segments_preserved() {
        assert_eq!(normalize("[slug].tsx", SourceKind::File).unwrap().segment, "[slug]");
        assert_eq!(slugify("[...slug]"), "[...slug]");
        assert_eq!(slugify("[[...slug]]"), "[[...slug]]");
        assert!(!is_dynamic_segment("[]"));
    }

    #[test]
    fn test_empty_segment_is_error() {
        let err = normalize("01.---.mdx", SourceKind::File).unwrap_err();
        assert!(matches!(err, DocGraphError::Normalization { .. }));
    }

    #[test]
    fn test_index_detection() {
        assert!(normalize("index.mdx", SourceKind::File).unwrap().is_index);
        assert!(normalize("README.md", SourceKind::File).unwrap().is_index);
        assert!(!normalize("index", SourceKind::Directory).unwrap().is_index);
    }

    #[test]
    fn test_sibling_order_prefixed_then_lexical() {
        let entries = vec![
            file("overview.mdx"),
            file("02.routing.mdx"),
            dir("03.examples"),
            file("01.getting-started.mdx"),
            file("appendix.mdx"),
        ];
        let ordered = normalize_siblings("", &entries).unwrap();
        let summary: Vec<(&str, u32)> = ordered
            .iter()
            .map(|e| (e.name.segment.as_str(), e.local_order))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("getting-started", 1),
                ("routing", 2),
                ("examples", 3),
                ("appendix", 4),
                ("overview", 5),
            ]
        );
    }

    #[test]
    fn test_unprefixed_siblings_are_numbered_lexically() {
        let entries = vec![file("zeta.md"), file("Alpha.md"), file("beta.md")];
        let ordered = normalize_siblings("", &entries).unwrap();
        let segments: Vec<_> = ordered.iter().map(|e| e.name.segment.clone()).collect();
        assert_eq!(segments, vec!["alpha", "beta", "zeta"]);
        assert_eq!(ordered[0].local_order, 1);
        assert_eq!(ordered[2].local_order, 3);
    }

    #[test]
    fn test_index_sorts_first() {
        let entries = vec![file("01.intro.mdx"), file("index.mdx")];
        let ordered = normalize_siblings("guides", &entries).unwrap();
        assert!(ordered[0].name.is_index);
        assert_eq!(ordered[0].local_order, 0);
        assert_eq!(ordered[1].local_order, 1);
    }

    #[test]
    fn test_collision_is_error() {
        let entries = vec![file("01.routing.mdx"), file("routing.md")];
        let err = normalize_siblings("docs", &entries).unwrap_err();
        match err {
            DocGraphError::Normalization { path, reason } => {
                assert_eq!(path, "docs/routing");
                assert!(reason.contains("01.routing.mdx"));
                assert!(reason.contains("routing.md"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_file_and_directory_collision() {
        let entries = vec![file("examples.mdx"), dir("examples")];
        assert!(normalize_siblings("", &entries).is_err());
    }

    #[test]
    fn test_shared_prefix_breaks_tie_by_segment() {
        let entries = vec![
            file("02.routing.mdx"),
            file("02.rendering.mdx"),
            file("01.intro.mdx"),
            dir("03.examples"),
        ];
        let ordered = normalize_siblings("", &entries).unwrap();
        let summary: Vec<(&str, u32)> = ordered
            .iter()
            .map(|e| (e.name.segment.as_str(), e.local_order))
            .collect();
        assert_eq!(
            summary,
            vec![("intro", 1), ("rendering", 2), ("routing", 3), ("examples", 4)]
        );
    }

    #[test]
    fn test_index_and_readme_beside_prefixed_entries() {
        let entries = vec![file("01.intro.md"), file("README.md"), file("index.md")];
        let ordered = normalize_siblings("", &entries).unwrap();
        let summary: Vec<(&str, u32)> = ordered
            .iter()
            .map(|e| (e.name.raw_name.as_str(), e.local_order))
            .collect();
        assert_eq!(summary, vec![("index.md", 0), ("README.md", 1), ("01.intro.md", 2)]);
    }

    #[test]
    fn test_zero_prefix_follows_index() {
        let entries = vec![file("00.intro.md"), file("index.md")];
        let ordered = normalize_siblings("", &entries).unwrap();
        assert_eq!(ordered[0].name.raw_name, "index.md");
        assert_eq!(ordered[0].local_order, 0);
        assert_eq!(ordered[1].name.raw_name, "00.intro.md");
        assert_eq!(ordered[1].local_order, 1);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("getting-started"), "Getting Started");
        assert_eq!(title_case("[slug]"), "[slug]");
    }
}
