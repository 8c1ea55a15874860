// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::{anyhow, Result};
use git2::{Repository, RepositoryInitOptions};
use std::{
    fs::{create_dir_all, write},
    path::Path,
};

pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>, kind: RepoKind) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        opts.bare(kind.is_bare());
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    /// Work tree of normal repository, or gitdir of bare one.
    pub(crate) fn path(&self) -> &Path {
        self.repo.workdir().unwrap_or(self.repo.path())
    }

    pub(crate) fn add_remote(&self, name: &str, remote: &RepoFixture) -> Result<()> {
        let url = remote.repo.path().to_string_lossy().into_owned();
        self.repo.remote(name, &url)?;
        Ok(())
    }

    /// Write file into work tree, then stage and commit it.
    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| anyhow!("cannot commit files in bare repository"))?;
        let path = workdir.join(filename.as_ref());
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(&path, contents.as_ref())?;

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repo.index()?;
        index.add_path(filename.as_ref())?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commits to append to.
        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }

    /// Message of the commit a branch points at.
    pub(crate) fn branch_message(&self, branch: &str) -> Result<String> {
        let reference = self.repo.find_reference(&format!("refs/heads/{branch}"))?;
        let commit = reference.peel_to_commit()?;
        Ok(commit.message().unwrap_or_default().trim_end().to_string())
    }

    /// Number of commits reachable from branch.
    pub(crate) fn commit_count(&self, branch: &str) -> Result<usize> {
        let mut walk = self.repo.revwalk()?;
        walk.push_ref(&format!("refs/heads/{branch}"))?;
        Ok(walk.count())
    }

    /// Check that path is in the index, reading it fresh from disk.
    pub(crate) fn is_tracked(&self, path: impl AsRef<Path>) -> Result<bool> {
        let mut index = self.repo.index()?;
        index.read(true)?;
        Ok(index.get_path(path.as_ref(), 0).is_some())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) enum RepoKind {
    #[default]
    Bare,

    Normal,
}

impl RepoKind {
    pub(crate) fn is_bare(&self) -> bool {
        match self {
            Self::Bare => true,
            Self::Normal => false,
        }
    }
}
