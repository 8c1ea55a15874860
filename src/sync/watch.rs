// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use notify::{
    event::EventKind, Event, RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher,
};
use std::{
    path::{Path, PathBuf},
    sync::mpsc::Sender,
};
use tracing::{debug, info, warn};

/// Watch source tree recursively, forwarding changed paths over channel.
///
/// Only creation, modification, and removal events are forwarded. The
/// returned watcher stops watching once dropped.
///
/// # Errors
///
/// - Return [`notify::Error`] if the watcher cannot be created or the
///   source tree cannot be watched.
pub fn watch(source_root: impl AsRef<Path>, tx: Sender<PathBuf>) -> NotifyResult<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |event: NotifyResult<Event>| {
        let event = match event {
            Ok(event) => event,
            Err(error) => {
                warn!("watch error: {error}");
                return;
            }
        };

        if !is_change(&event.kind) {
            return;
        }

        for path in event.paths {
            debug!("change: {:?}", path.display());

            // INVARIANT: Receiver is gone only when the session is over.
            if tx.send(path).is_err() {
                return;
            }
        }
    })?;

    watcher.watch(source_root.as_ref(), RecursiveMode::Recursive)?;
    info!("watching {:?}", source_root.as_ref().display());

    Ok(watcher)
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
