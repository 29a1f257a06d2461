//! Best-effort page snapshots for diagnosing stalled or empty steps.
//!
//! One file per step and kind under the snapshot directory. Snapshots are
//! diagnostics: a write failure is logged and swallowed, never allowed to
//! abort a crawl.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// What a snapshot captures; picks the file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// The urlencoded request body sent for a step.
    Request,
    /// The response page for a step.
    Response,
    /// A response that failed the step marker check.
    Stalled,
    /// An advanced page the extractor got nothing out of.
    EmptyExtraction,
}

impl SnapshotKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Request => "request.txt",
            Self::Response => "response.html",
            Self::Stalled => "stalled.html",
            Self::EmptyExtraction => "empty.html",
        }
    }
}

/// Writer for per-step debug snapshots.
#[derive(Debug)]
pub struct PageSnapshots {
    dir: PathBuf,
    enabled: bool,
}

impl PageSnapshots {
    /// Creates a snapshot writer rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    /// Creates a writer that drops every snapshot.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new("debug_pages", false)
    }

    /// Returns whether snapshots are being written.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Writes one snapshot, logging and swallowing any failure.
    pub fn save(&self, label: &str, qno: u32, kind: SnapshotKind, body: &str) {
        if !self.enabled {
            return;
        }
        let path = self.snapshot_path(label, qno, kind);
        if let Err(error) = write_snapshot(&path, body) {
            warn!(path = %path.display(), error = %error, "failed to save snapshot");
        } else {
            debug!(path = %path.display(), kind = ?kind, "saved snapshot");
        }
    }

    fn snapshot_path(&self, label: &str, qno: u32, kind: SnapshotKind) -> PathBuf {
        let safe_label = label.replace([' ', '/'], "_");
        self.dir
            .join(format!("{safe_label}_qno{qno}.{}", kind.suffix()))
    }
}

fn write_snapshot(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)
}
