// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publishing through Git.
//!
//! Converted rule files are published by shelling out to the Git binary.
//! Every call names the Git directory and the work tree explicitly through
//! the "--git-dir" and "--work-tree" arguments, so the current directory of
//! the process never decides which repository gets touched.
//!
//! # Publish Chain
//!
//! Publishing is a chain of single attempts: stage, check status, commit,
//! optionally pull, then push. A link that fails stops everything after it,
//! e.g., no push is attempted after a failed commit. Nothing is retried, and
//! no call has a timeout.
//!
//! # See Also
//!
//! 1. [`status`]
//! 2. [`ignore`]

pub mod ignore;
pub mod status;

use crate::git::status::GitStatus;

use git2::Repository;
use std::{
    collections::BTreeSet,
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, instrument, warn};

/// Stderr fragment Git prints when a pathspec matches nothing.
const UNMATCHED_PATHSPEC: &str = "did not match any files";

/// Most file names listed in a generated commit message.
const COMMIT_MESSAGE_NAMES: usize = 10;

/// Layer of indirection for publishing converted rules.
pub trait VersionControl: Send + Sync + 'static {
    /// Stage paths, commit them with message, and push the commit.
    ///
    /// # Errors
    ///
    /// - Return [`GitError`] if staging, status, or commit fails. Failures
    ///   after the commit is made are logged instead.
    fn publish(&self, paths: &[PathBuf], message: &str) -> Result<PublishOutcome>;

    /// Stop tracking files that are matched by ignore rules.
    ///
    /// # Errors
    ///
    /// - Return [`GitError`] if tracked files cannot be listed or removed.
    fn untrack_ignored(&self) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Result of a publish chain that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Staging produced no changes, so nothing was committed.
    NothingToCommit,

    /// Commit was made, and maybe pushed.
    Committed { pushed: bool },
}

/// Git access through the Git binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    gitdir: PathBuf,
    work_tree: PathBuf,
    pull_before_push: bool,
}

impl GitCli {
    /// Open repository whose work tree is at target path.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if no repository lives there.
    /// - Return [`GitError::NoWorkTree`] if the repository is bare.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        debug!("open repository: {:?}", path.as_ref().display());
        let repository = Repository::open(path.as_ref())?;
        let work_tree = repository
            .workdir()
            .ok_or_else(|| GitError::NoWorkTree(repository.path().to_path_buf()))?;
        let work_tree = work_tree.canonicalize().unwrap_or_else(|_| work_tree.to_path_buf());

        Ok(Self {
            gitdir: repository.path().to_path_buf(),
            work_tree,
            pull_before_push: true,
        })
    }

    /// Pull with rebase before every push, or not.
    pub fn with_pull_before_push(mut self, pull_before_push: bool) -> Self {
        self.pull_before_push = pull_before_push;
        self
    }

    pub fn work_tree(&self) -> &Path {
        self.work_tree.as_path()
    }

    /// Call Git non-interactively, returning its stdout.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Spawn`] if Git cannot be executed.
    /// - Return [`GitError::Command`] if Git exits with a non-zero code.
    pub fn gitcall(&self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Result<String> {
        self.syscall(args, false)
    }

    /// Call Git non-interactively, treating unmatched pathspecs as success.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Spawn`] if Git cannot be executed.
    /// - Return [`GitError::Command`] if Git exits with a non-zero code for
    ///   any reason other than an unmatched pathspec.
    pub fn gitcall_allow_unmatched(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Result<String> {
        self.syscall(args, true)
    }

    /// Stage every path, including deletions.
    ///
    /// Each path is staged on its own, such that a removed file that was
    /// never tracked does not abort staging of the others.
    pub fn add(&self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            let pathspec = self.pathspec(path);
            self.gitcall_allow_unmatched([
                OsString::from("add"),
                "--all".into(),
                "--".into(),
                pathspec,
            ])?;
        }

        Ok(())
    }

    /// Parsed porcelain status of the work tree.
    pub fn status(&self) -> Result<GitStatus> {
        let stdout = self.gitcall(["status", "--porcelain=v1", "-uall"])?;
        Ok(GitStatus::from_porcelain(&stdout))
    }

    pub fn commit(&self, message: &str) -> Result<()> {
        let output = self.gitcall(["commit", "-m", message])?;
        debug!("{}", output.trim_end());
        Ok(())
    }

    /// Pull current branch from origin with rebase.
    ///
    /// Uncommitted edits elsewhere in the work tree are stashed around the
    /// rebase.
    pub fn pull(&self, branch: &str) -> Result<()> {
        self.gitcall(["pull", "--rebase", "--autostash", "origin", branch])?;
        Ok(())
    }

    /// Push current branch to origin, setting it as upstream.
    pub fn push(&self, branch: &str) -> Result<()> {
        self.gitcall(["push", "-u", "origin", branch])?;
        Ok(())
    }

    /// Remove paths from the index only, keeping them on disk.
    pub fn rm_cached(&self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            let pathspec = self.pathspec(path);
            self.gitcall_allow_unmatched([
                OsString::from("rm"),
                "-r".into(),
                "--cached".into(),
                "--quiet".into(),
                "--".into(),
                pathspec,
            ])?;
        }

        Ok(())
    }

    /// Tracked files that ignore rules say should not be tracked.
    pub fn ignored_tracked_files(&self) -> Result<Vec<PathBuf>> {
        let stdout = self.gitcall(["ls-files", "-ci", "--exclude-standard"])?;
        Ok(stdout.lines().filter(|line| !line.is_empty()).map(PathBuf::from).collect())
    }

    /// Check that a remote named "origin" is configured.
    pub fn has_remote_origin(&self) -> bool {
        Repository::open(&self.gitdir)
            .and_then(|repository| repository.find_remote("origin").map(|_| ()))
            .is_ok()
    }

    /// Short name of the branch HEAD points at.
    pub fn current_branch(&self) -> Option<String> {
        let repository = Repository::open(&self.gitdir).ok()?;
        let head = repository.head().ok()?;
        head.shorthand().map(ToString::to_string)
    }

    /// Check that origin has been fetched with target branch.
    fn has_remote_branch(&self, branch: &str) -> bool {
        Repository::open(&self.gitdir)
            .and_then(|repository| {
                repository
                    .find_reference(&format!("refs/remotes/origin/{branch}"))
                    .map(|_| ())
            })
            .is_ok()
    }

    fn pathspec(&self, path: &Path) -> OsString {
        path.strip_prefix(&self.work_tree)
            .unwrap_or(path)
            .as_os_str()
            .to_os_string()
    }

    fn expand_bin_args(&self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Vec<OsString> {
        let mut bin_args: Vec<OsString> = vec![
            "--git-dir".into(),
            self.gitdir.clone().into_os_string(),
            "--work-tree".into(),
            self.work_tree.clone().into_os_string(),
        ];
        bin_args.extend(args.into_iter().map(Into::into));

        bin_args
    }

    fn syscall(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
        allow_unmatched: bool,
    ) -> Result<String> {
        let args = self.expand_bin_args(args);
        let output = syscall_non_interactive("git", &args, &self.work_tree)?;
        if output.success {
            return Ok(output.stdout);
        }

        if allow_unmatched && output.stderr.contains(UNMATCHED_PATHSPEC) {
            debug!("pathspec matched nothing: {}", output.stderr.trim_end());
            return Ok(output.stdout);
        }

        Err(GitError::Command {
            args: args[4..]
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" "),
            code: output.code,
            stderr: chomp(output.stderr),
        })
    }
}

impl VersionControl for GitCli {
    #[instrument(skip(self, paths, message), level = "debug")]
    fn publish(&self, paths: &[PathBuf], message: &str) -> Result<PublishOutcome> {
        self.add(paths)?;

        // INVARIANT: Never make empty commits.
        if !self.status()?.has_staged() {
            info!("no staged changes, nothing to commit");
            return Ok(PublishOutcome::NothingToCommit);
        }

        self.commit(message)?;
        info!("committed: {message}");

        if !self.has_remote_origin() {
            warn!("no remote named origin, skip push");
            return Ok(PublishOutcome::Committed { pushed: false });
        }

        let Some(branch) = self.current_branch() else {
            warn!("HEAD is detached, skip push");
            return Ok(PublishOutcome::Committed { pushed: false });
        };

        if self.pull_before_push && self.has_remote_branch(&branch) {
            if let Err(error) = self.pull(&branch) {
                warn!("pull failed, skip push: {error}");
                return Ok(PublishOutcome::Committed { pushed: false });
            }
        }

        match self.push(&branch) {
            Ok(()) => {
                info!("pushed {branch} to origin");
                Ok(PublishOutcome::Committed { pushed: true })
            }
            Err(error) => {
                warn!("push failed: {error}");
                Ok(PublishOutcome::Committed { pushed: false })
            }
        }
    }

    fn untrack_ignored(&self) -> Result<Vec<PathBuf>> {
        let ignored = self.ignored_tracked_files()?;
        if !ignored.is_empty() {
            info!("untrack {} ignored files", ignored.len());
            self.rm_cached(&ignored)?;
        }

        Ok(ignored)
    }
}

/// Build commit message from prefix and the base names of sources.
///
/// Names are sorted and deduplicated. Long listings are cut short.
pub fn commit_message(prefix: &str, sources: &[PathBuf]) -> String {
    let names = sources
        .iter()
        .filter_map(|source| source.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect::<BTreeSet<_>>();

    if names.is_empty() {
        return prefix.to_string();
    }

    let mut listing = names
        .iter()
        .take(COMMIT_MESSAGE_NAMES)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > COMMIT_MESSAGE_NAMES {
        listing.push_str(&format!(" and {} more", names.len() - COMMIT_MESSAGE_NAMES));
    }

    format!("{prefix}: {listing}")
}

struct SyscallOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    cwd: &Path,
) -> Result<SyscallOutput> {
    let output = Command::new(cmd.as_ref())
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(GitError::Spawn)?;

    Ok(SyscallOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
        stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
    })
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// Git error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Git binary cannot be executed.
    #[error("failed to execute git")]
    Spawn(#[source] std::io::Error),

    /// Git exited with a non-zero code.
    #[error("git {args} failed with code {code:?}: {stderr}")]
    Command {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Repository has no work tree to publish from.
    #[error("repository at {:?} has no work tree", .0.display())]
    NoWorkTree(PathBuf),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
