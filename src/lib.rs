// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rule document synchronization.
//!
//! Rulesync keeps a tree of markdown __rule documents__ and two trees of
//! converted rule files in step. Each source document has its metadata
//! normalized into a fixed header, its cross references pointed at the
//! converted file names, and the result written into both target trees
//! under the same relative path. Changes can be converted one-off, in a
//! full regeneration, or continuously by watching the source tree, where
//! every quiet batch of changes becomes one commit that gets pushed.
//!
//! # See Also
//!
//! 1. [`rule`]
//! 2. [`sync`]
//! 3. [`git`]

pub mod config;
pub mod consolidate;
pub mod git;
pub mod path;
pub mod rule;
pub mod sync;

pub use config::SyncConfig;
pub use git::{GitCli, PublishOutcome, VersionControl};
pub use rule::{convert::Converter, RuleDocument, RuleMetadata};
pub use sync::SyncController;
