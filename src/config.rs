// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that rulesync reads to find
//! its source tree, its two target trees, and how converted rule files get
//! published through Git.
//!
//! # General Layout
//!
//! The configuration is a TOML file split into four sections: `paths`,
//! `convert`, `watch`, and `git`. Every section and every field is optional,
//! such that an empty file yields the default configuration. Path fields
//! undergo shell expansion, and relative paths are resolved against the
//! workspace path.

use crate::rule::links::LinkRewrite;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Shortest poll interval of the watcher loop in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Full rulesync configuration.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Location of source and target trees.
    pub paths: PathSettings,

    /// Rule conversion settings.
    pub convert: ConvertSettings,

    /// File watcher timing.
    pub watch: WatchSettings,

    /// Publishing through Git.
    pub git: GitSettings,
}

impl SyncConfig {
    /// Load configuration from file at target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file contents are not valid.
    /// - Return [`ConfigError::ShellExpansion`] if path fields cannot be
    ///   expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = read_to_string(path.as_ref()).map_err(|err| ConfigError::Read {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        data.parse()
    }

    /// Workspace, i.e., the work tree of the Git repository to publish to.
    pub fn workspace(&self) -> &Path {
        self.paths.workspace.as_path()
    }

    /// Directory holding markdown rule sources.
    pub fn source_dir(&self) -> PathBuf {
        self.resolve(&self.paths.source)
    }

    /// Both target directories in order: primary, then secondary.
    pub fn target_dirs(&self) -> [PathBuf; 2] {
        [
            self.resolve(&self.paths.primary_target),
            self.resolve(&self.paths.secondary_target),
        ]
    }

    /// Quiet period to wait after the last change before converting a batch.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }

    /// How often the watcher loop checks for a ready batch.
    ///
    /// Never shorter than [`MIN_POLL_INTERVAL_MS`], so the loop cannot spin.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.workspace.join(path)
        }
    }
}

impl FromStr for SyncConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: SyncConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        let paths = &mut config.paths;
        for field in [
            &mut paths.workspace,
            &mut paths.source,
            &mut paths.primary_target,
            &mut paths.secondary_target,
        ] {
            *field = expand_path(field.as_path())?;
        }

        Ok(config)
    }
}

impl Display for SyncConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Source and target tree locations.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    /// Work tree of the repository that receives converted rules.
    pub workspace: PathBuf,

    /// Markdown rule sources.
    pub source: PathBuf,

    /// First target tree.
    pub primary_target: PathBuf,

    /// Second target tree, mirrored identically to the first.
    pub secondary_target: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            source: PathBuf::from("rules"),
            primary_target: PathBuf::from(".cursor/rules"),
            secondary_target: PathBuf::from("dist/rules"),
        }
    }
}

/// Rule conversion settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConvertSettings {
    /// Extension of rule sources, without the leading dot.
    pub source_extension: String,

    /// Extension of converted rules, without the leading dot.
    pub target_extension: String,

    /// File names that always convert with `alwaysApply: true`.
    pub core_files: Vec<String>,

    /// How cross references between rules are rewritten.
    pub link_rewrite: LinkRewrite,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            source_extension: "md".into(),
            target_extension: "mdc".into(),
            core_files: vec!["core-principles.md".into(), "project-overview.md".into()],
            link_rewrite: LinkRewrite::default(),
        }
    }
}

/// File watcher timing in milliseconds.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchSettings {
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            poll_interval_ms: 500,
        }
    }
}

/// Publishing settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitSettings {
    /// Prefix of every generated commit message.
    pub commit_prefix: String,

    /// Pull with rebase before pushing.
    pub pull_before_push: bool,

    /// Entries that must exist in the workspace's `.gitignore`.
    pub ignore_entries: Vec<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            commit_prefix: "chore(rules): sync".into(),
            pull_before_push: true,
            ignore_entries: Vec::new(),
        }
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
