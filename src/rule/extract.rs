// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rule metadata extraction.
//!
//! Split a rule document into its metadata and its body. Extraction never
//! fails. Anything that cannot be understood as metadata simply stays in the
//! body.
//!
//! # Comment Header
//!
//! Lines at the top of the file of the form `# key: value` make up the comment
//! header, as long as `key` is a recognized [`MetadataKey`]. The header ends
//! at the first line that is not such a field. A lone `---` line also ends the
//! header, and is dropped from the body.
//!
//! Because `#` is the comment marker of the header, a level-1 heading that
//! directly closes the header is read as the title line of the header. It
//! provides the title when neither a title nor a description was given, and
//! then loses its `#` marker in the body.
//!
//! # Frontmatter
//!
//! Without a comment header, a leading YAML block fenced by `---` (closed by
//! `---` or `...`) is parsed instead. Malformed YAML means no metadata at all.
//!
//! # Derived Description
//!
//! Documents whose metadata has neither a title nor a description get a
//! description derived from their body: the first level-1 heading, otherwise
//! the first line that reads like a paragraph.

use crate::rule::{MetadataKey, MetadataStyle, RuleDocument, RuleMetadata};

use regex::Regex;
use serde_yaml::Value;
use std::{fs::read_to_string, path::Path, sync::OnceLock};
use tracing::{debug, warn};

/// Read and extract rule document at target path.
///
/// Read failures are logged, and produce a document with empty metadata and
/// an empty body.
pub fn extract_file(path: impl AsRef<Path>) -> RuleDocument {
    let path = path.as_ref();
    match read_to_string(path) {
        Ok(content) => extract(path, &content),
        Err(error) => {
            warn!("cannot read rule document {:?}: {error}", path.display());
            RuleDocument {
                path: path.to_path_buf(),
                ..Default::default()
            }
        }
    }
}

/// Extract metadata and body from contents of rule document.
pub fn extract(path: impl AsRef<Path>, content: &str) -> RuleDocument {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let (mut metadata, style, body) = if let Some((metadata, body)) = comment_header(content) {
        (metadata, MetadataStyle::CommentHeader, body)
    } else if let Some((metadata, body)) = frontmatter(content) {
        (metadata, MetadataStyle::Frontmatter, body)
    } else {
        (RuleMetadata::default(), MetadataStyle::None, content.to_string())
    };

    if metadata.headline().is_none() {
        metadata.description = derive_description(&body);
    }

    RuleDocument {
        path: path.as_ref().to_path_buf(),
        metadata,
        style,
        body,
    }
}

fn comment_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#\s*(?P<key>[A-Za-z][A-Za-z0-9_-]*)\s*:\s*(?P<value>.*?)\s*$")
            .expect("valid regex")
    })
}

fn comment_header(content: &str) -> Option<(RuleMetadata, String)> {
    let mut metadata = RuleMetadata::default();
    let mut found = false;
    let mut closed_by_separator = false;
    let mut offset = 0;

    for raw in content.split_inclusive('\n') {
        let line = raw.trim_end_matches(['\r', '\n']);
        let field = comment_field_re().captures(line).and_then(|caps| {
            caps["key"]
                .parse::<MetadataKey>()
                .ok()
                .map(|key| (key, caps["value"].to_string()))
        });

        match field {
            Some((key, value)) => {
                metadata.set(key, &value);
                found = true;
                offset += raw.len();
            }
            None if found && line.trim() == "---" => {
                closed_by_separator = true;
                offset += raw.len();
                break;
            }
            None => break,
        }
    }

    if !found {
        return None;
    }

    let mut body = content[offset..].to_string();
    if metadata.headline().is_none() && !closed_by_separator {
        let first = body.lines().next().unwrap_or_default();
        if let Some(title) = level_one_heading(first) {
            let marker = first.len() - first[1..].trim_start().len();
            metadata.title = Some(title.to_string());
            body.replace_range(..marker, "");
        }
    }

    debug!("comment header metadata: {metadata:?}");
    Some((metadata, body))
}

fn frontmatter(content: &str) -> Option<(RuleMetadata, String)> {
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }

    let mut offset = first.len();
    let mut yaml = String::new();
    let mut closed = false;
    for raw in lines {
        offset += raw.len();
        let trimmed = raw.trim_end();
        if trimmed == "---" || trimmed == "..." {
            closed = true;
            break;
        }
        yaml.push_str(raw);
    }

    if !closed {
        return None;
    }

    let mapping = match serde_yaml::from_str::<Value>(&yaml) {
        Ok(Value::Mapping(mapping)) => mapping,
        Ok(_) => return None,
        Err(error) => {
            debug!("frontmatter is not valid YAML: {error}");
            return None;
        }
    };

    let mut metadata = RuleMetadata::default();
    for (key, value) in &mapping {
        let Some(name) = key.as_str() else {
            continue;
        };
        match name.parse::<MetadataKey>() {
            Ok(key) => apply_yaml(&mut metadata, key, value),
            Err(unknown) => debug!("skip frontmatter field: {unknown}"),
        }
    }

    Some((metadata, content[offset..].to_string()))
}

fn apply_yaml(metadata: &mut RuleMetadata, key: MetadataKey, value: &Value) {
    match (key, value) {
        (MetadataKey::Globs, Value::Sequence(items)) => {
            metadata.globs = Some(items.iter().filter_map(yaml_scalar).collect());
        }
        (MetadataKey::AlwaysApply, Value::Bool(flag)) => metadata.always_apply = Some(*flag),
        (_, Value::Null) => {}
        (key, value) => {
            if let Some(text) = yaml_scalar(value) {
                metadata.set(key, &text);
            }
        }
    }
}

fn yaml_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn level_one_heading(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('#')?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }

    Some(rest.trim()).filter(|text| !text.is_empty())
}

fn derive_description(body: &str) -> Option<String> {
    let mut in_fence = false;
    let mut paragraph = None;

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || trimmed.is_empty() {
            continue;
        }

        if let Some(heading) = level_one_heading(trimmed) {
            return Some(heading.to_string());
        }

        if paragraph.is_none() && is_paragraph_like(trimmed) {
            paragraph = Some(trimmed.to_string());
        }
    }

    paragraph
}

fn is_paragraph_like(line: &str) -> bool {
    let list_item = ["- ", "* ", "+ "].iter().any(|marker| line.starts_with(marker))
        || line
            .split_once(". ")
            .is_some_and(|(number, _)| !number.is_empty() && number.chars().all(|ch| ch.is_ascii_digit()));

    let rule = line.chars().all(|ch| matches!(ch, '-' | '=' | '*' | '_' | ' '));

    !(list_item || rule || line.starts_with('>') || line.starts_with('|') || line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn comment_header_with_title_line() {
        let content = indoc! {"
            # ruleId: x
            # ruleType: Linter
            # Title
            Body text."};
        let result = extract("rule-x.md", content);

        let expect = RuleDocument {
            path: "rule-x.md".into(),
            metadata: RuleMetadata {
                rule_id: Some("x".into()),
                rule_type: Some("Linter".into()),
                title: Some("Title".into()),
                ..Default::default()
            },
            style: MetadataStyle::CommentHeader,
            body: "Title\nBody text.".into(),
        };
        assert_eq!(result, expect);
    }

    #[test]
    fn explicit_description_keeps_heading_in_body() {
        let content = indoc! {"
            # ruleId: r
            # description: Explicit summary
            # Heading
            Body.
        "};
        let result = extract("r.md", content);

        assert_eq!(result.metadata.title, None);
        assert_eq!(result.metadata.description.as_deref(), Some("Explicit summary"));
        assert_eq!(result.body, "# Heading\nBody.\n");
    }

    #[test]
    fn comment_header_closed_by_separator() {
        let content = indoc! {"
            # ruleId: sep
            # globs: *.py, *.pyi
            # alwaysApply: true
            ---
            # Heading stays
            Text.
        "};
        let result = extract("sep.md", content);

        assert_eq!(result.style, MetadataStyle::CommentHeader);
        assert_eq!(result.metadata.rule_id.as_deref(), Some("sep"));
        assert_eq!(
            result.metadata.globs,
            Some(vec!["*.py".to_string(), "*.pyi".to_string()])
        );
        assert_eq!(result.metadata.always_apply, Some(true));
        assert_eq!(result.metadata.title, None);
        assert_eq!(result.metadata.description.as_deref(), Some("Heading stays"));
        assert_eq!(result.body, "# Heading stays\nText.\n");
    }

    #[test]
    fn heading_with_unknown_key_is_not_metadata() {
        let content = "# Overview: how we lint\nText.\n";
        let result = extract("overview.md", content);

        assert_eq!(result.style, MetadataStyle::None);
        assert_eq!(result.body, content);
        assert_eq!(
            result.metadata.description.as_deref(),
            Some("Overview: how we lint")
        );
    }

    #[test]
    fn frontmatter_fallback() {
        let content = indoc! {r#"
            ---
            description: Keep functions small
            globs:
              - "src/**/*.rs"
            alwaysApply: false
            author: someone
            ---
            Body.
        "#};
        let result = extract("small.md", content);

        let expect = RuleMetadata {
            description: Some("Keep functions small".into()),
            globs: Some(vec!["src/**/*.rs".into()]),
            always_apply: Some(false),
            ..Default::default()
        };
        assert_eq!(result.style, MetadataStyle::Frontmatter);
        assert_eq!(result.metadata, expect);
        assert_eq!(result.body, "Body.\n");
    }

    #[test]
    fn malformed_frontmatter_keeps_full_content() {
        let content = "---\nglobs: [unclosed\n---\nBody.\n";
        let result = extract("bad.md", content);

        assert_eq!(result.style, MetadataStyle::None);
        assert_eq!(result.body, content);
        assert_eq!(result.metadata.rule_id, None);
    }

    #[test]
    fn unclosed_frontmatter_keeps_full_content() {
        let content = "---\ndescription: nope\nBody.\n";
        let result = extract("open.md", content);

        assert_eq!(result.style, MetadataStyle::None);
        assert_eq!(result.body, content);
    }

    #[test]
    fn no_metadata_keeps_body_verbatim() {
        let content = "Intro line\r\n\r\n## Details\r\nSee [other](other.md).\r\n";
        let result = extract("plain.md", content);

        assert_eq!(result.style, MetadataStyle::None);
        assert_eq!(result.body, content);
        assert_eq!(result.metadata.rule_id, None);
        assert_eq!(result.metadata.description.as_deref(), Some("Intro line"));
    }

    #[test]
    fn derived_description_prefers_level_one_heading() {
        let content = indoc! {"
            - a list item
            > a quote
            | a | table |
            Some paragraph.
            ```
            # not a heading
            ```
            # Real Heading
        "};
        let result = extract("derive.md", content);
        assert_eq!(result.metadata.description.as_deref(), Some("Real Heading"));
    }

    #[test]
    fn derived_description_skips_structural_lines() {
        let content = "1. step\n## Sub\n> quote\nParagraph here.\n";
        let result = extract("derive.md", content);
        assert_eq!(result.metadata.description.as_deref(), Some("Paragraph here."));
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let result = extract("bom.md", "\u{feff}# ruleId: bom\nBody.\n");
        assert_eq!(result.metadata.rule_id.as_deref(), Some("bom"));
        assert_eq!(result.body, "Body.\n");
    }

    #[test]
    fn unreadable_file_yields_empty_document() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let result = extract_file(root.path().join("missing.md"));

        assert!(result.metadata.is_empty());
        assert!(result.body.is_empty());

        Ok(())
    }
}
