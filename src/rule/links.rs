// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cross reference rewriting.
//!
//! Rule documents link to each other by file name, e.g., `[style](style.md)`.
//! Once converted, those links must point at the converted file names instead.
//!
//! [`LinkRewrite::Markdown`] only touches link targets that markdown itself
//! understands as links: inline links and reference definitions outside of
//! code. [`LinkRewrite::Substring`] replaces every occurrence of the source
//! extension anywhere in the text, which also hits prose, code samples, and
//! URLs that merely contain the extension.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Strategy for rewriting cross references.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRewrite {
    /// Rewrite relative markdown link targets only.
    #[default]
    Markdown,

    /// Replace every literal occurrence of the source extension.
    Substring,
}

/// Rewrite links from one file extension to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRewriter {
    mode: LinkRewrite,
    from: String,
    to: String,
}

impl LinkRewriter {
    /// Construct new link rewriter.
    ///
    /// Extensions are given without their leading dot.
    pub fn new(mode: LinkRewrite, from: impl AsRef<str>, to: impl AsRef<str>) -> Self {
        Self {
            mode,
            from: format!(".{}", from.as_ref()),
            to: format!(".{}", to.as_ref()),
        }
    }

    /// Rewrite text, returning the new text and the number of rewrites made.
    pub fn rewrite(&self, text: &str) -> (String, usize) {
        match self.mode {
            LinkRewrite::Substring => {
                let count = text.matches(self.from.as_str()).count();
                (text.replace(self.from.as_str(), self.to.as_str()), count)
            }
            LinkRewrite::Markdown => self.rewrite_markdown(text),
        }
    }

    fn rewrite_markdown(&self, text: &str) -> (String, usize) {
        let mut out = String::with_capacity(text.len());
        let mut count = 0;
        let mut fence: Option<&str> = None;

        for raw in text.split_inclusive('\n') {
            let trimmed = raw.trim_start();
            let marker = ["```", "~~~"]
                .into_iter()
                .find(|marker| trimmed.starts_with(*marker));

            match (fence, marker) {
                (None, Some(marker)) => {
                    fence = Some(marker);
                    out.push_str(raw);
                    continue;
                }
                (Some(open), Some(marker)) if open == marker => {
                    fence = None;
                    out.push_str(raw);
                    continue;
                }
                (Some(_), _) => {
                    out.push_str(raw);
                    continue;
                }
                (None, None) => {}
            }

            if let Some(caps) = reference_def_re().captures(raw) {
                if let Some(target) = self.rewrite_target(&caps["target"]) {
                    count += 1;
                    out.push_str(&caps["lead"]);
                    out.push_str(&target);
                    out.push_str(&caps["rest"]);
                    continue;
                }
            }

            out.push_str(&self.rewrite_line(raw, &mut count));
        }

        (out, count)
    }

    /// Rewrite inline links of a line, leaving inline code spans alone.
    fn rewrite_line(&self, line: &str, count: &mut usize) -> String {
        let mut out = String::with_capacity(line.len());
        for (index, segment) in line.split('`').enumerate() {
            if index > 0 {
                out.push('`');
            }

            // INVARIANT: Odd segments sit between backticks, i.e., in code.
            if index % 2 == 1 {
                out.push_str(segment);
                continue;
            }

            let rewritten = inline_link_re().replace_all(segment, |caps: &Captures| {
                let target = &caps["target"];
                match self.rewrite_target(target).filter(|_| caps["bang"].is_empty()) {
                    Some(new_target) => {
                        *count += 1;
                        let title = caps.name("title").map_or("", |title| title.as_str());
                        format!("{}]({new_target}{title})", &caps["label"])
                    }
                    None => caps[0].to_string(),
                }
            });
            out.push_str(&rewritten);
        }

        out
    }

    /// New target if the target is a relative path with the source extension.
    fn rewrite_target(&self, target: &str) -> Option<String> {
        if target.contains("://") || target.starts_with("mailto:") || target.starts_with('#') {
            return None;
        }

        let split = target.find(['#', '?']).unwrap_or(target.len());
        let (path, suffix) = target.split_at(split);
        let stem = path.strip_suffix(self.from.as_str())?;
        if stem.is_empty() || stem.ends_with('/') {
            return None;
        }

        Some(format!("{stem}{}{suffix}", self.to))
    }
}

fn inline_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?P<bang>!?)(?P<label>\[[^\]]*)\]\((?P<target>[^)\s]+)(?P<title>\s+"[^"]*")?\)"#)
            .expect("valid regex")
    })
}

fn reference_def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<lead> {0,3}\[[^\]]+\]:[ \t]*)(?P<target>[^\s<>]+)(?P<rest>(?s:.*))$")
            .expect("valid regex")
    })
}
