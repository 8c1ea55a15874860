// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Consolidate converted rule files into one markdown document.

use crate::path::{collect_files, PathError};

use glob::{MatchOptions, Pattern};
use std::{
    fmt::Write as _,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// What to consolidate, and where to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidateOptions {
    pub rules_dir: PathBuf,
    pub output: PathBuf,
    pub extension: String,

    /// Glob patterns matched against paths relative to the rules directory.
    pub exclude: Vec<String>,

    /// Emit a `## Source` heading above each file.
    pub include_header: bool,
}

/// Files that made it into the consolidated document, and those left out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsolidateSummary {
    pub included: Vec<PathBuf>,
    pub excluded: Vec<PathBuf>,
}

/// Write every matching rule file into one document.
///
/// Files are ordered by relative path. A file that cannot be read is noted
/// in place instead of aborting the whole document.
///
/// # Errors
///
/// - Return [`ConsolidateError::Pattern`] if an exclude pattern is invalid.
/// - Return [`ConsolidateError::Walk`] if the rules directory cannot be
///   traversed.
/// - Return [`ConsolidateError::Write`] if the output cannot be written.
#[instrument(skip(options), level = "debug")]
pub fn consolidate(options: &ConsolidateOptions) -> Result<ConsolidateSummary> {
    let patterns = options
        .exclude
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|err| ConsolidateError::Pattern {
                source: err,
                pattern: pattern.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut summary = ConsolidateSummary::default();
    for path in collect_files(&options.rules_dir, &options.extension)? {
        let relative = path
            .strip_prefix(&options.rules_dir)
            .unwrap_or(&path)
            .to_path_buf();
        if is_excluded(&relative, &patterns) {
            summary.excluded.push(relative);
        } else {
            summary.included.push(relative);
        }
    }

    info!(
        "consolidate {} files, {} excluded",
        summary.included.len(),
        summary.excluded.len()
    );

    let root = options
        .rules_dir
        .canonicalize()
        .unwrap_or_else(|_| options.rules_dir.clone());
    let mut out = format!("# Consolidated Rules from: {}\n\n", root.display());
    for relative in &summary.included {
        let source = options.rules_dir.join(relative);
        if options.include_header {
            let _ = write!(out, "## Source: `{}`\n\n", relative.display());
        }

        match read_to_string(&source) {
            Ok(content) => {
                out.push_str(&content);
                out.push_str("\n\n---\n\n");
            }
            Err(err) => {
                warn!("cannot read {:?}: {err}", source.display());
                let _ = write!(out, "*Error reading file: {err}*\n\n---\n\n");
            }
        }
    }

    if let Some(parent) = options.output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(|err| ConsolidateError::Write {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }
    write(&options.output, out.as_bytes()).map_err(|err| ConsolidateError::Write {
        source: err,
        path: options.output.clone(),
    })?;

    Ok(summary)
}

fn is_excluded(relative: &Path, patterns: &[Pattern]) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    patterns.iter().any(|pattern| {
        pattern.matches_path_with(relative, options)
            || relative
                .file_name()
                .is_some_and(|name| pattern.matches_with(&name.to_string_lossy(), options))
    })
}

/// Consolidation error types.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidateError {
    /// Exclude pattern is not a valid glob.
    #[error("invalid exclude pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Rules directory cannot be traversed.
    #[error(transparent)]
    Walk(#[from] PathError),

    /// Output cannot be written.
    #[error("failed to write consolidated rules to {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ConsolidateError> = std::result::Result<T, E>;
