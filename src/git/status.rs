// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::fmt;

/// Working tree status parsed from `git status --porcelain=v1`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GitStatus {
    pub staged: Vec<FileStatus>,
    pub unstaged: Vec<FileStatus>,
    pub untracked: Vec<String>,
    pub conflicts: Vec<String>,
}

/// Status of one changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub code: char,
    pub description: &'static str,
}

impl FileStatus {
    fn new(path: impl Into<String>, code: char) -> Self {
        Self {
            path: path.into(),
            code,
            description: describe(code),
        }
    }
}

impl GitStatus {
    /// Parse porcelain v1 output.
    ///
    /// Lines too short to carry a status code are skipped. Renames and copies
    /// are reported under their new path.
    pub fn from_porcelain(output: &str) -> Self {
        let mut status = Self::default();
        for line in output.lines() {
            let Some((code, path)) = split_entry(line) else {
                continue;
            };
            let mut codes = code.chars();
            let (x, y) = match (codes.next(), codes.next()) {
                (Some(x), Some(y)) => (x, y),
                _ => continue,
            };

            let path = entry_path(x, path);
            if x == '?' && y == '?' {
                status.untracked.push(path);
                continue;
            }

            if is_conflict(x, y) {
                status.conflicts.push(path);
                continue;
            }

            if "MADRCT".contains(x) {
                status.staged.push(FileStatus::new(path.clone(), x));
            }

            if "MDT".contains(y) {
                status.unstaged.push(FileStatus::new(path, y));
            }
        }

        status
    }

    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.unstaged.is_empty()
            && self.untracked.is_empty()
            && self.conflicts.is_empty()
    }

    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }
}

impl fmt::Display for GitStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(fmt, "working tree clean");
        }

        for (title, entries) in [("staged", &self.staged), ("unstaged", &self.unstaged)] {
            if entries.is_empty() {
                continue;
            }
            writeln!(fmt, "{title}:")?;
            for entry in entries {
                writeln!(fmt, "  {:<10} {}", entry.description, entry.path)?;
            }
        }

        for (title, paths) in [("untracked", &self.untracked), ("conflicts", &self.conflicts)] {
            if paths.is_empty() {
                continue;
            }
            writeln!(fmt, "{title}:")?;
            for path in paths {
                writeln!(fmt, "  {path}")?;
            }
        }

        Ok(())
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    if line.len() < 4 || !line.is_char_boundary(2) || !line.is_char_boundary(3) {
        return None;
    }

    Some((&line[..2], &line[3..]))
}

fn entry_path(x: char, raw: &str) -> String {
    let raw = match x {
        'R' | 'C' => raw.split_once(" -> ").map_or(raw, |(_, new)| new),
        _ => raw,
    };

    unquote_path(raw)
}

fn is_conflict(x: char, y: char) -> bool {
    matches!(
        (x, y),
        ('D', 'D') | ('A', 'U') | ('U', 'D') | ('U', 'A') | ('D', 'U') | ('A', 'A') | ('U', 'U')
    )
}

fn describe(code: char) -> &'static str {
    match code {
        'M' => "modified",
        'A' => "added",
        'D' => "deleted",
        'R' => "renamed",
        'C' => "copied",
        'T' => "typechange",
        _ => "unknown",
    }
}

/// Undo C-style quoting Git applies to unusual paths.
fn unquote_path(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) else {
        return raw.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some('r') => bytes.push(b'\r'),
            Some(digit @ '0'..='7') => {
                let mut value = digit.to_digit(8).unwrap_or_default();
                for _ in 0..2 {
                    match chars.peek().and_then(|next| next.to_digit(8)) {
                        Some(next) => {
                            value = value * 8 + next;
                            chars.next();
                        }
                        None => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => {
                let mut buf = [0; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}
