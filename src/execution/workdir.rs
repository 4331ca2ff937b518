//! Isolated per-run working directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Name of the subdirectory the simulator writes its catalogs into
pub const OUTPUT_SUBDIR: &str = "output";

/// A run directory that is removed when dropped unless explicitly kept.
///
/// Every exit path of a run, including early failures, ends in either
/// [`RunDirectory::finish`] or a drop, so no run leaves stray directories
/// behind unless the retention policy asks for them.
#[derive(Debug)]
pub struct RunDirectory {
    dir: TempDir,
    run_id: u64,
}

impl RunDirectory {
    /// Create `run-<id>-XXXXXX/` with an empty output subdirectory under `root`
    pub fn create(root: &Path, run_id: u64) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("run-{:06}-", run_id))
            .tempdir_in(root)?;
        fs::create_dir(dir.path().join(OUTPUT_SUBDIR))?;
        debug!(run = run_id, path = %dir.path().display(), "created run directory");
        Ok(Self { dir, run_id })
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_SUBDIR)
    }

    /// Keep or remove the directory; returns the kept path
    pub fn finish(self, keep: bool) -> Option<PathBuf> {
        let run_id = self.run_id;
        if keep {
            let path = self.dir.into_path();
            info!(run = run_id, path = %path.display(), "keeping run directory");
            Some(path)
        } else {
            if let Err(e) = self.dir.close() {
                warn!(run = run_id, error = %e, "failed to remove run directory");
            }
            None
        }
    }
}
