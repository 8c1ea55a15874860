// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rule document representation.
//!
//! A __rule document__ is a markdown file that carries a small block of
//! metadata followed by a body. Rulesync reads rule documents from a source
//! tree, and converts each one into a distributable rule file that gets
//! mirrored into two target trees.
//!
//! # Metadata Styles
//!
//! Metadata can be written in one of two styles. The first style is a
//! __comment header__, where each field sits on its own `#`-prefixed line at
//! the very top of the file:
//!
//! ```text
//! # ruleId: lint-python
//! # ruleType: Linter
//! # Python Linting
//! Always run the linter before committing.
//! ```
//!
//! The second style is standard YAML frontmatter fenced by `---` lines.
//! Documents without either style are still valid rule documents. They simply
//! have no explicit metadata, and a description is derived from their body.
//!
//! # See Also
//!
//! 1. [`extract`]
//! 2. [`convert`]

pub mod convert;
pub mod extract;
pub mod links;

use crate::path::{collect_files, PathError};

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Recognized metadata of a rule document.
///
/// Each recognized key has its own field, where `None` means the key was not
/// present in the source document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RuleMetadata {
    /// Stable identifier of the rule.
    pub rule_id: Option<String>,

    /// Category of the rule, e.g., "Linter".
    pub rule_type: Option<String>,

    /// Human readable title.
    pub title: Option<String>,

    /// One sentence summary of the rule.
    pub description: Option<String>,

    /// File patterns the rule applies to.
    pub globs: Option<Vec<String>>,

    /// Whether the rule always applies regardless of globs.
    pub always_apply: Option<bool>,
}

impl RuleMetadata {
    /// Check that no recognized key is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Text that best summarizes the rule: title, then description.
    pub fn headline(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or(self.description.as_deref())
            .filter(|text| !text.trim().is_empty())
    }

    /// Assign textual value to recognized key.
    ///
    /// Lists accept `a, b` or `[a, b]` with optional quotes around each item.
    /// Booleans accept `true/false`, `yes/no`, and `1/0` in any case. Values
    /// that cannot be interpreted for their key leave the field untouched.
    pub fn set(&mut self, key: MetadataKey, value: &str) {
        let value = unquote(value.trim());
        match key {
            MetadataKey::RuleId => self.rule_id = Some(value.into()),
            MetadataKey::RuleType => self.rule_type = Some(value.into()),
            MetadataKey::Title => self.title = Some(value.into()),
            MetadataKey::Description => self.description = Some(value.into()),
            MetadataKey::Globs => self.globs = Some(parse_list(value)),
            MetadataKey::AlwaysApply => {
                if let Some(flag) = parse_flag(value) {
                    self.always_apply = Some(flag);
                }
            }
        }
    }
}

/// Keys recognized in rule metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKey {
    RuleId,
    RuleType,
    Title,
    Description,
    Globs,
    AlwaysApply,
}

impl FromStr for MetadataKey {
    type Err = UnknownKey;

    /// Match key ignoring case, dashes, and underscores, so `ruleId`,
    /// `rule_id`, and `rule-id` are all the same key.
    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let normalized = key
            .chars()
            .filter(|ch| *ch != '-' && *ch != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "ruleid" => Ok(Self::RuleId),
            "ruletype" => Ok(Self::RuleType),
            "title" => Ok(Self::Title),
            "description" => Ok(Self::Description),
            "globs" => Ok(Self::Globs),
            "alwaysapply" => Ok(Self::AlwaysApply),
            _ => Err(UnknownKey(key.into())),
        }
    }
}

/// Metadata key is not one that rulesync understands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metadata key {0:?}")]
pub struct UnknownKey(pub String);

/// Where metadata of a rule document came from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MetadataStyle {
    /// `#`-prefixed key-value lines at the top of the file.
    CommentHeader,

    /// YAML frontmatter fenced by `---`.
    Frontmatter,

    /// No metadata block at all.
    #[default]
    None,
}

/// A rule document read from the source tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RuleDocument {
    pub path: PathBuf,
    pub metadata: RuleMetadata,
    pub style: MetadataStyle,
    pub body: String,
}

/// Index every rule document under root by its description.
///
/// Keys are paths relative to root. The description is the title of the
/// document, then its explicit or derived description, then empty.
///
/// # Errors
///
/// - Return [`PathError::Walk`] if the source tree cannot be traversed.
pub fn description_index(
    root: impl AsRef<Path>,
    extension: &str,
) -> Result<BTreeMap<PathBuf, String>, PathError> {
    let root = root.as_ref();
    let mut index = BTreeMap::new();
    for path in collect_files(root, extension)? {
        let document = extract::extract_file(&path);
        let description = document.metadata.headline().unwrap_or_default().trim().to_string();
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        index.insert(relative, description);
    }

    Ok(index)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }

    value
}

fn parse_list(value: &str) -> Vec<String> {
    let inner = value
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(value);

    inner
        .split(',')
        .map(|item| unquote(item.trim()).to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
