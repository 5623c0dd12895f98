//! Snapshot file: load at startup, save after new grants and on shutdown.

use std::path::{Path, PathBuf};

use anyhow::Context;
use spur_core::Snapshot;

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` if no snapshot has been written yet.
    pub fn load(&self) -> anyhow::Result<Option<Snapshot>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        let snapshot = Snapshot::from_bytes(&bytes)
            .with_context(|| format!("decoding {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    /// Write to a sibling temp file, then rename over the old snapshot.
    pub fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let bytes = snapshot.to_bytes()?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), nodes = snapshot.nodes.len(), "state saved");
        Ok(())
    }
}
