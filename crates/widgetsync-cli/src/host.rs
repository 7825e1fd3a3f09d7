use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;
use widgetsync_core::{Host, HostSnapshot, Notice};

/// Host backed by a JSON snapshot file. The file is re-read on every
/// snapshot so edits between runs (or during a run) are picked up, the way
/// a real host's state would change under a running widget.
pub struct FileHost {
    path: PathBuf,
    fallback: HostSnapshot,
}

impl FileHost {
    pub fn open(path: PathBuf) -> Result<Self> {
        let fallback = Self::read(&path)?;
        Ok(Self { path, fallback })
    }

    fn read(path: &Path) -> Result<HostSnapshot> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read host snapshot: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse host snapshot: {}", path.display()))
    }
}

impl Host for FileHost {
    fn snapshot(&self) -> HostSnapshot {
        match Self::read(&self.path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Snapshot reload failed, using the one read at startup");
                self.fallback.clone()
            }
        }
    }

    fn show_notification(&self, notice: &Notice) {
        println!("[notification] {}", notice.header);
        if !notice.text.is_empty() {
            println!("  {}", notice.text);
        }
        if let Some(ref link) = notice.link {
            println!("  -> {}", link);
        }
    }

    fn show_error(&self, message: &str) {
        eprintln!("[error] {}", message);
    }
}
