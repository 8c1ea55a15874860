// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ignore file maintenance.
//!
//! Before a full sync publishes anything, the work tree's top-level
//! `.gitignore` is checked for a configured set of entries, e.g., editor
//! backup patterns or scratch directories. Missing entries are appended.
//! Existing lines are never reordered or removed, so hand-written comments
//! and negations survive untouched.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write, OpenOptions},
    path::PathBuf,
};
use tracing::{debug, info};

/// Manage entries of a work tree's ignore file.
#[derive(Clone, Debug)]
pub struct IgnoreDrafter {
    ignore_path: PathBuf,
}

impl IgnoreDrafter {
    /// Construct new ignore file drafter.
    ///
    /// Creates the ignore file if it does not already exist yet.
    ///
    /// # Errors
    ///
    /// - Return [`Error::CreateIgnoreFile`] if ignore file cannot be created
    ///   when missing.
    pub fn new(work_tree: impl Into<PathBuf>) -> Result<Self> {
        let ignore_path = work_tree.into().join(".gitignore");

        // INVARIANT: Create ignore file if needed.
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&ignore_path)
            .map_err(|err| Error::CreateIgnoreFile {
                source: err,
                ignore_path: ignore_path.clone(),
            })?;

        Ok(Self { ignore_path })
    }

    /// Edit ignore entries.
    ///
    /// Changes are only written back when the editor actually changed
    /// something.
    ///
    /// # Errors
    ///
    /// - Return [`Error::ReadIgnoreFile`] if ignore file cannot be read.
    /// - Return [`Error::WriteIgnoreFile`] if ignore file cannot be written.
    pub fn edit<E>(&self, editor: E) -> Result<()>
    where
        E: FnOnce(&mut IgnoreEdit),
    {
        let mut entries = IgnoreEdit::from(self.read()?);
        editor(&mut entries);

        if !entries.changed {
            return Ok(());
        }

        write(&self.ignore_path, entries.to_string().as_bytes()).map_err(|err| {
            Error::WriteIgnoreFile {
                source: err,
                ignore_path: self.ignore_path.clone(),
            }
        })?;

        Ok(())
    }

    /// Append every missing entry, returning the ones that were added.
    pub fn ensure_entries(&self, entries: &[String]) -> Result<Vec<String>> {
        let mut added = Vec::new();
        self.edit(|edit| {
            for entry in entries {
                if edit.insert_entry(entry) {
                    added.push(entry.trim().to_string());
                }
            }
        })?;

        if added.is_empty() {
            debug!("ignore file already has every entry");
        } else {
            info!("add ignore entries: {}", added.join(", "));
        }

        Ok(added)
    }

    /// List current ignore file lines.
    ///
    /// # Errors
    ///
    /// - Return [`Error::ReadIgnoreFile`] if ignore file cannot be read.
    pub fn current_entries(&self) -> Result<Vec<String>> {
        self.read()
            .map(|content| content.lines().map(str::to_owned).collect::<Vec<_>>())
    }

    fn read(&self) -> Result<String> {
        read_to_string(&self.ignore_path).map_err(|err| Error::ReadIgnoreFile {
            source: err,
            ignore_path: self.ignore_path.clone(),
        })
    }
}

/// Ignore file editor.
///
/// # Invariant
///
/// - Existing lines keep their order.
/// - An entry already present is never added twice.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IgnoreEdit {
    lines: Vec<String>,
    changed: bool,
}

impl IgnoreEdit {
    pub fn contains(&self, entry: impl AsRef<str>) -> bool {
        let entry = entry.as_ref().trim();
        self.lines.iter().any(|line| line.trim() == entry)
    }

    /// Append entry unless already present. Blank entries are skipped.
    pub fn insert_entry(&mut self, entry: impl AsRef<str>) -> bool {
        let entry = entry.as_ref().trim();
        if entry.is_empty() || self.contains(entry) {
            return false;
        }

        self.lines.push(entry.to_string());
        self.changed = true;
        true
    }
}

impl Display for IgnoreEdit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        for line in &self.lines {
            writeln!(fmt, "{line}")?;
        }

        Ok(())
    }
}

impl From<String> for IgnoreEdit {
    fn from(content: String) -> Self {
        Self::from(content.as_str())
    }
}

impl From<&str> for IgnoreEdit {
    fn from(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_owned).collect(),
            changed: false,
        }
    }
}

/// Ignore file management error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Ignore file cannot be created when missing.
    #[error("failed to create ignore file at {:?}", ignore_path.display())]
    CreateIgnoreFile {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },

    /// Ignore file cannot be read from.
    #[error("failed to read from ignore file at {:?}", ignore_path.display())]
    ReadIgnoreFile {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },

    /// Ignore file cannot be written to.
    #[error("failed to write to ignore file at {:?}", ignore_path.display())]
    WriteIgnoreFile {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
