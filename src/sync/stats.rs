// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::rule::convert::ConversionRecord;

use serde::Serialize;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::AddAssign,
};

/// Counters of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub attempted: usize,
    pub converted: usize,
    pub failed: usize,
    pub removed: usize,
    pub forced_always_apply: usize,
    pub placeholder_descriptions: usize,
    pub links_rewritten: usize,
}

impl BatchStats {
    /// Count one conversion record.
    pub fn record(&mut self, record: &ConversionRecord) {
        self.attempted += 1;
        if !record.is_success() {
            self.failed += 1;
            return;
        }

        if record.removed {
            self.removed += 1;
            return;
        }

        self.converted += 1;
        self.forced_always_apply += usize::from(record.forced_always_apply);
        self.placeholder_descriptions += usize::from(record.placeholder_description);
        self.links_rewritten += record.links_rewritten;
    }

    /// Number of records that changed something on disk.
    pub fn succeeded(&self) -> usize {
        self.converted + self.removed
    }
}

impl<'a> FromIterator<&'a ConversionRecord> for BatchStats {
    fn from_iter<I: IntoIterator<Item = &'a ConversionRecord>>(records: I) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.record(record);
        }

        stats
    }
}

impl AddAssign for BatchStats {
    fn add_assign(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.converted += other.converted;
        self.failed += other.failed;
        self.removed += other.removed;
        self.forced_always_apply += other.forced_always_apply;
        self.placeholder_descriptions += other.placeholder_descriptions;
        self.links_rewritten += other.links_rewritten;
    }
}

impl Display for BatchStats {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} attempted, {} converted, {} removed, {} failed, {} forced always-apply, \
             {} placeholder descriptions, {} links rewritten",
            self.attempted,
            self.converted,
            self.removed,
            self.failed,
            self.forced_always_apply,
            self.placeholder_descriptions,
            self.links_rewritten
        )
    }
}

/// Counters of a whole watch session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub batches: usize,
    pub commits: usize,
    pub pushes: usize,
    pub totals: BatchStats,
}

impl SessionStats {
    /// Fold finished batch into session totals.
    pub fn absorb(&mut self, batch: BatchStats, committed: bool, pushed: bool) {
        self.batches += 1;
        self.commits += usize::from(committed);
        self.pushes += usize::from(pushed);
        self.totals += batch;
    }
}

impl Display for SessionStats {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} batches, {} commits, {} pushes; {}",
            self.batches, self.commits, self.pushes, self.totals
        )
    }
}
