// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Change batching and publishing.
//!
//! A [`SyncController`] turns a stream of file change notifications into
//! batches. Every relevant change joins a pending set and freshens one global
//! debounce window. Once the window has been quiet for the debounce period,
//! the whole pending set is converted in one pass and published through a
//! single commit.
//!
//! # Concurrency
//!
//! The pending set, the batch lock, and the session statistics each sit
//! behind their own mutex. Change notifications only ever touch the pending
//! set, so they keep accumulating while a batch is in flight. Batches, and
//! manual full syncs, are strictly sequential through the batch lock.
//!
//! # See Also
//!
//! 1. [`watch`]
//! 2. [`stats`]

pub mod stats;
pub mod watch;

use crate::{
    config::SyncConfig,
    git::{self, ignore::IgnoreDrafter, GitCli, GitError, PublishOutcome, VersionControl},
    path::{collect_files, has_extension, PathError},
    rule::convert::{ConversionRecord, Converter},
    sync::stats::{BatchStats, SessionStats},
};

use indicatif::ProgressBar;
use std::{
    collections::HashSet,
    fs::remove_file,
    mem,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, RecvTimeoutError},
        Mutex, MutexGuard, PoisonError, TryLockError,
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Debounced conversion and publishing of rule documents.
#[derive(Debug)]
pub struct SyncController<V = GitCli>
where
    V: VersionControl,
{
    converter: Converter,
    vcs: V,
    workspace: PathBuf,
    debounce: Duration,
    poll_interval: Duration,
    commit_prefix: String,
    ignore_entries: Vec<String>,
    publishing: bool,
    pending: Mutex<PendingChanges>,
    batch_lock: Mutex<()>,
    session: Mutex<SessionStats>,
}

#[derive(Debug, Default)]
struct PendingChanges {
    paths: HashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl<V> SyncController<V>
where
    V: VersionControl,
{
    /// Construct new sync controller.
    pub fn new(config: &SyncConfig, vcs: V) -> Self {
        Self {
            converter: Converter::new(config),
            vcs,
            workspace: config.workspace().to_path_buf(),
            debounce: config.debounce(),
            poll_interval: config.poll_interval(),
            commit_prefix: config.git.commit_prefix.clone(),
            ignore_entries: config.git.ignore_entries.clone(),
            publishing: true,
            pending: Mutex::new(PendingChanges::default()),
            batch_lock: Mutex::new(()),
            session: Mutex::new(SessionStats::default()),
        }
    }

    /// Publish finished batches, or only convert them.
    pub fn with_publishing(mut self, publishing: bool) -> Self {
        self.publishing = publishing;
        self
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Session statistics accumulated so far.
    pub fn session_stats(&self) -> SessionStats {
        *lock(&self.session)
    }

    /// Number of paths waiting for the next batch.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).paths.len()
    }

    /// Check that path is a source rule document worth converting.
    ///
    /// Editor scratch files like `.#rule.md` or `rule.md~` are not.
    pub fn is_relevant(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !path.starts_with(self.converter.source_root()) {
            return false;
        }

        let Some(name) = path.file_name().map(|name| name.to_string_lossy()) else {
            return false;
        };
        if name.starts_with(".#") || name.ends_with('~') || name.ends_with(".swp") {
            return false;
        }

        has_extension(path, self.converter.source_extension())
    }

    /// Record change of path at a point in time.
    ///
    /// Irrelevant paths are dropped. Relevant ones join the pending set and
    /// restart the debounce window.
    pub fn record_change(&self, path: impl Into<PathBuf>, at: Instant) {
        let path = path.into();
        if !self.is_relevant(&path) {
            debug!("skip irrelevant change: {:?}", path.display());
            return;
        }

        let mut pending = lock(&self.pending);
        pending.paths.insert(path);
        pending.last_event = Some(at);
    }

    /// Process pending changes if the debounce window has been quiet.
    ///
    /// Nothing happens when no change is pending, the window is still open,
    /// or another batch is in flight.
    pub fn poll(&self, now: Instant) -> Option<BatchReport> {
        {
            let pending = lock(&self.pending);
            let last_event = pending.last_event?;
            if pending.paths.is_empty() || now.saturating_duration_since(last_event) < self.debounce {
                return None;
            }
        }

        let _guard = match self.batch_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!("batch in flight, keep accumulating");
                return None;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let paths = {
            let mut pending = lock(&self.pending);
            pending.last_event = None;
            mem::take(&mut pending.paths)
        };

        Some(self.run_batch(paths.into_iter().collect()))
    }

    /// Convert paths as one batch, then publish the results.
    ///
    /// Waits for any batch in flight to finish first.
    pub fn process_batch(&self, paths: Vec<PathBuf>) -> BatchReport {
        let _guard = lock(&self.batch_lock);
        self.run_batch(paths)
    }

    /// Regenerate both target trees from scratch and publish them.
    ///
    /// Waits for any batch in flight to finish first. Configured ignore
    /// entries are ensured, ignored files are untracked, and every stale
    /// converted file is deleted before all sources are converted again.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Ignore`] if the ignore file cannot be updated.
    /// - Return [`SyncError::Walk`] if a source or target tree cannot be
    ///   traversed.
    /// - Return [`SyncError::Remove`] if a stale converted file cannot be
    ///   deleted.
    #[instrument(skip(self, progress), level = "debug")]
    pub fn full_sync(&self, progress: &ProgressBar) -> Result<BatchReport> {
        let _guard = lock(&self.batch_lock);

        if !self.ignore_entries.is_empty() {
            IgnoreDrafter::new(&self.workspace)?.ensure_entries(&self.ignore_entries)?;
        }

        if self.publishing {
            if let Err(error) = self.vcs.untrack_ignored() {
                warn!("cannot untrack ignored files: {error}");
            }
        }

        for target in self.converter.targets() {
            for stale in collect_files(target, self.converter.target_extension())? {
                remove_file(&stale).map_err(|err| SyncError::Remove {
                    source: err,
                    path: stale.clone(),
                })?;
                debug!("removed stale {:?}", stale.display());
            }
        }

        let sources = collect_files(self.converter.source_root(), self.converter.source_extension())?;
        progress.set_length(sources.len() as u64);

        let mut records = Vec::with_capacity(sources.len());
        for source in &sources {
            if let Some(name) = source.file_name() {
                progress.set_message(name.to_string_lossy().into_owned());
            }
            records.push(self.converter.convert(source));
            progress.inc(1);
        }
        progress.finish_with_message("converted");

        let stats = records.iter().collect::<BatchStats>();
        info!("full sync: {stats}");

        let mut report = BatchReport::new(records, stats);
        if self.publishing {
            let mut paths = vec![self.converter.source_root().to_path_buf()];
            paths.extend(self.converter.targets().iter().cloned());
            if !self.ignore_entries.is_empty() {
                paths.push(self.workspace.join(".gitignore"));
            }
            let message = git::commit_message(&self.commit_prefix, &sources);
            report.publish(&self.vcs, &paths, &message);
        }
        self.absorb(&report);

        Ok(report)
    }

    /// Watch loop.
    ///
    /// Receives changed paths until stop is set or the sender hangs up,
    /// polling at least once per poll interval. A batch in flight is never
    /// cancelled, so stopping may wait for it.
    pub fn run(&self, events: &Receiver<PathBuf>, stop: &AtomicBool) {
        info!("start sync loop");
        while !stop.load(Ordering::Relaxed) {
            match events.recv_timeout(self.poll_interval) {
                Ok(path) => {
                    let now = Instant::now();
                    self.record_change(path, now);
                    for path in events.try_iter() {
                        self.record_change(path, now);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("change feed closed");
                    break;
                }
            }

            self.poll(Instant::now());
        }

        if self.pending_len() > 0 {
            warn!("stopped with {} unprocessed changes", self.pending_len());
        }
        info!("session: {}", self.session_stats());
    }

    fn run_batch(&self, mut paths: Vec<PathBuf>) -> BatchReport {
        paths.sort();
        info!("process batch of {} changes", paths.len());

        let records = paths
            .iter()
            .map(|path| {
                if path.exists() {
                    self.converter.convert(path)
                } else {
                    self.converter.remove_outputs(path)
                }
            })
            .collect::<Vec<_>>();
        let stats = records.iter().collect::<BatchStats>();
        info!("batch: {stats}");

        let mut report = BatchReport::new(records, stats);
        let changed = report
            .records
            .iter()
            .filter(|record| record.is_success() && (record.removed || !record.outputs.is_empty()))
            .collect::<Vec<_>>();

        // INVARIANT: No git operation unless some output or source changed on disk.
        if self.publishing && !changed.is_empty() {
            let sources = changed.iter().map(|record| record.source.clone()).collect::<Vec<_>>();
            let mut paths = sources.clone();
            paths.extend(changed.iter().flat_map(|record| record.outputs.iter().cloned()));
            let message = git::commit_message(&self.commit_prefix, &sources);
            report.publish(&self.vcs, &paths, &message);
        }
        self.absorb(&report);

        report
    }

    fn absorb(&self, report: &BatchReport) {
        let committed = matches!(report.outcome, Some(PublishOutcome::Committed { .. }));
        let pushed = matches!(report.outcome, Some(PublishOutcome::Committed { pushed: true }));
        lock(&self.session).absorb(report.stats, committed, pushed);
    }
}

/// Everything that happened in one batch.
#[derive(Debug)]
pub struct BatchReport {
    pub records: Vec<ConversionRecord>,
    pub stats: BatchStats,

    /// Outcome of publishing, `None` if nothing was published.
    pub outcome: Option<PublishOutcome>,

    /// Publishing was attempted but failed.
    pub publish_error: Option<GitError>,
}

impl BatchReport {
    fn new(records: Vec<ConversionRecord>, stats: BatchStats) -> Self {
        Self {
            records,
            stats,
            outcome: None,
            publish_error: None,
        }
    }

    fn publish(&mut self, vcs: &impl VersionControl, paths: &[PathBuf], message: &str) {
        match vcs.publish(paths, message) {
            Ok(outcome) => self.outcome = Some(outcome),
            Err(error) => {
                warn!("publish failed: {error}");
                self.publish_error = Some(error);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Ignore file cannot be updated.
    #[error(transparent)]
    Ignore(#[from] git::ignore::Error),

    /// Source or target tree cannot be traversed.
    #[error(transparent)]
    Walk(#[from] PathError),

    /// Stale converted file cannot be deleted.
    #[error("failed to remove stale file {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{
        fs::{create_dir_all, read_to_string, write},
        sync::mpsc::channel,
    };
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct RecordingVcs {
        published: Mutex<Vec<(Vec<PathBuf>, String)>>,
    }

    impl RecordingVcs {
        fn calls(&self) -> Vec<(Vec<PathBuf>, String)> {
            lock(&self.published).clone()
        }
    }

    impl VersionControl for RecordingVcs {
        fn publish(&self, paths: &[PathBuf], message: &str) -> git::Result<PublishOutcome> {
            lock(&self.published).push((paths.to_vec(), message.to_string()));
            Ok(PublishOutcome::Committed { pushed: true })
        }
    }

    struct Fixture {
        root: TempDir,
        controller: SyncController<RecordingVcs>,
    }

    impl Fixture {
        fn new(debounce_ms: u64) -> anyhow::Result<Self> {
            Self::with_config(|config| config.watch.debounce_ms = debounce_ms)
        }

        fn with_config(adjust: impl FnOnce(&mut SyncConfig)) -> anyhow::Result<Self> {
            let root = tempfile::tempdir()?;
            create_dir_all(root.path().join("rules"))?;

            let mut config = SyncConfig::default();
            config.paths.workspace = root.path().to_path_buf();
            config.paths.primary_target = "out/one".into();
            config.paths.secondary_target = "out/two".into();
            config.watch.poll_interval_ms = 10;
            adjust(&mut config);

            let controller = SyncController::new(&config, RecordingVcs::default());
            Ok(Self { root, controller })
        }

        fn source(&self, relative: &str, content: impl AsRef<[u8]>) -> anyhow::Result<PathBuf> {
            let path = self.controller.converter().source_root().join(relative);
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            write(&path, content)?;
            Ok(path)
        }

        fn target(&self, index: usize, relative: &str) -> PathBuf {
            self.controller.converter().targets()[index].join(relative)
        }
    }

    #[test]
    fn poll_without_changes_does_nothing() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        assert!(fixture.controller.poll(Instant::now()).is_none());
        assert!(fixture.controller.vcs().calls().is_empty());
        assert_eq!(fixture.controller.session_stats(), SessionStats::default());

        Ok(())
    }

    #[test]
    fn irrelevant_changes_are_dropped() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        let root = fixture.controller.converter().source_root().to_path_buf();
        let now = Instant::now();

        fixture.controller.record_change(root.join("notes.txt"), now);
        fixture.controller.record_change(root.join(".#draft.md"), now);
        fixture.controller.record_change(root.join("draft.md~"), now);
        fixture.controller.record_change(fixture.root.path().join("README.md"), now);
        assert_eq!(fixture.controller.pending_len(), 0);

        fixture.controller.record_change(root.join("nested/rule.md"), now);
        assert_eq!(fixture.controller.pending_len(), 1);

        Ok(())
    }

    #[test]
    fn batch_waits_for_quiet_period() -> anyhow::Result<()> {
        let fixture = Fixture::new(2000)?;
        let first = fixture.source("lang/python.md", "# ruleId: py\nUse black.\n")?;
        let second = fixture.source("core-principles.md", "Be kind.\n")?;

        let start = Instant::now();
        fixture.controller.record_change(&first, start);
        fixture.controller.record_change(&second, start + Duration::from_millis(1500));
        fixture.controller.record_change(&first, start + Duration::from_millis(1500));
        assert_eq!(fixture.controller.pending_len(), 2);

        // Window restarted by the second change.
        assert!(fixture.controller.poll(start + Duration::from_millis(2500)).is_none());

        let report = fixture
            .controller
            .poll(start + Duration::from_millis(3500))
            .ok_or_else(|| anyhow::anyhow!("batch not processed"))?;
        assert_eq!(report.stats.attempted, 2);
        assert_eq!(report.stats.converted, 2);
        assert_eq!(report.stats.forced_always_apply, 1);
        assert_eq!(report.outcome, Some(PublishOutcome::Committed { pushed: true }));
        assert_eq!(fixture.controller.pending_len(), 0);

        let calls = fixture.controller.vcs().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "chore(rules): sync: core-principles.md, python.md");
        assert_eq!(calls[0].0.len(), 6);
        assert!(fixture.target(0, "lang/python.mdc").exists());
        assert!(fixture.target(1, "core-principles.mdc").exists());

        let session = fixture.controller.session_stats();
        assert_eq!(session.batches, 1);
        assert_eq!(session.commits, 1);
        assert_eq!(session.pushes, 1);

        Ok(())
    }

    #[test]
    fn failed_batch_makes_no_git_calls() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        let now = Instant::now();
        for name in ["a.md", "b.md", "c.md"] {
            let path = fixture.source(name, [0xC3, 0x28])?;
            fixture.controller.record_change(path, now);
        }

        let report = fixture
            .controller
            .poll(now)
            .ok_or_else(|| anyhow::anyhow!("batch not processed"))?;
        assert_eq!(report.stats.attempted, 3);
        assert_eq!(report.stats.succeeded(), 0);
        assert_eq!(report.stats.failed, 3);
        assert_eq!(report.outcome, None);
        assert!(fixture.controller.vcs().calls().is_empty());

        Ok(())
    }

    #[test]
    fn poll_skips_while_batch_in_flight() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        let path = fixture.source("a.md", "Alpha.\n")?;
        let now = Instant::now();

        let guard = lock(&fixture.controller.batch_lock);
        fixture.controller.record_change(&path, now);
        assert!(fixture.controller.poll(now).is_none());
        assert_eq!(fixture.controller.pending_len(), 1);
        drop(guard);

        assert!(fixture.controller.poll(now).is_some());
        assert_eq!(fixture.controller.pending_len(), 0);

        Ok(())
    }

    #[test]
    fn removed_source_removes_outputs() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        let path = fixture.source("gone.md", "Soon gone.\n")?;
        fixture.controller.process_batch(vec![path.clone()]);
        assert!(fixture.target(0, "gone.mdc").exists());

        std::fs::remove_file(&path)?;
        let report = fixture.controller.process_batch(vec![path]);
        assert_eq!(report.stats.removed, 1);
        assert!(!fixture.target(0, "gone.mdc").exists());
        assert!(!fixture.target(1, "gone.mdc").exists());
        assert_eq!(fixture.controller.vcs().calls().len(), 2);

        Ok(())
    }

    #[test]
    fn vanished_source_without_outputs_is_published() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        let path = fixture.controller.converter().source_root().join("never-converted.md");

        let report = fixture.controller.process_batch(vec![path.clone()]);
        assert_eq!(report.stats.removed, 1);
        assert_eq!(report.outcome, Some(PublishOutcome::Committed { pushed: true }));

        let calls = fixture.controller.vcs().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![path]);
        assert_eq!(calls[0].1, "chore(rules): sync: never-converted.md");

        Ok(())
    }

    #[test]
    fn publishing_can_be_disabled() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        let controller = fixture.controller.with_publishing(false);
        let path = controller.converter().source_root().join("a.md");
        write(&path, "Alpha.\n")?;

        let report = controller.process_batch(vec![path]);
        assert_eq!(report.stats.converted, 1);
        assert_eq!(report.outcome, None);
        assert!(controller.vcs().calls().is_empty());

        Ok(())
    }

    #[test]
    fn run_processes_until_feed_closes() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        let path = fixture.source("a.md", "Alpha.\n")?;
        let (tx, rx) = channel();
        tx.send(path)?;
        drop(tx);

        fixture.controller.run(&rx, &AtomicBool::new(false));
        assert_eq!(fixture.controller.vcs().calls().len(), 1);
        assert_eq!(fixture.controller.session_stats().batches, 1);

        Ok(())
    }

    #[test]
    fn run_honors_stop_flag() -> anyhow::Result<()> {
        let fixture = Fixture::new(0)?;
        let (_tx, rx) = channel::<PathBuf>();

        fixture.controller.run(&rx, &AtomicBool::new(true));
        assert_eq!(fixture.controller.session_stats().batches, 0);

        Ok(())
    }

    #[test]
    fn full_sync_regenerates_targets() -> anyhow::Result<()> {
        let fixture = Fixture::with_config(|config| {
            config.git.ignore_entries = vec!["*.tmp".into()];
        })?;
        fixture.source("a.md", "Alpha [b](b.md).\n")?;
        fixture.source("nested/b.md", "# Beta\n")?;
        let stale = fixture.target(0, "stale.mdc");
        create_dir_all(stale.parent().ok_or_else(|| anyhow::anyhow!("no parent"))?)?;
        write(&stale, "old")?;

        let report = fixture.controller.full_sync(&ProgressBar::hidden())?;
        assert_eq!(report.stats.converted, 2);
        assert_eq!(report.stats.links_rewritten, 1);
        assert!(!stale.exists());
        assert!(fixture.target(1, "nested/b.mdc").exists());
        assert_eq!(
            read_to_string(fixture.root.path().join(".gitignore"))?,
            "*.tmp\n"
        );

        let calls = fixture.controller.vcs().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.len(), 4);
        assert_eq!(calls[0].1, "chore(rules): sync: a.md, b.md");

        Ok(())
    }
}
