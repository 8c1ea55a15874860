// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, and collect the files of a rule tree.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Name of configuration file looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = "rulesync.toml";

/// Determine default absolute path to configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/rulesync/config.toml` as
/// the default absolute path. Does not check if the path returned actually
/// exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if configuration directory path cannot
///   be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("rulesync").join("config.toml"))
        .ok_or(PathError::NoWayHome)
}

/// Collect every file under root whose extension matches.
///
/// Hidden entries and ignore files are not filtered, because target trees
/// commonly live under hidden directories like `.cursor`. Results are sorted
/// so callers see a stable order. A missing root yields no files.
///
/// # Errors
///
/// - Return [`PathError::Walk`] if directory traversal fails.
pub fn collect_files(root: impl AsRef<Path>, extension: &str) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkBuilder::new(root).standard_filters(false).build() {
        let entry = entry?;
        let is_file = entry.file_type().is_some_and(|kind| kind.is_file());
        if is_file && has_extension(entry.path(), extension) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    Ok(files)
}

/// Check that path ends with target extension, e.g., "md" for `foo.md`.
pub fn has_extension(path: impl AsRef<Path>, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .is_some_and(|ext| ext.to_string_lossy() == extension)
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's configuration directory.
    ///
    /// # See Also
    ///
    /// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
    #[error("cannot determine absolute path to user's configuration directory")]
    NoWayHome,

    /// Directory traversal failed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
