//! Scoped staging/output directories for one running instance.
//!
//! Both directories are removed when the workspace is closed or dropped.
//! Removal after an abnormal termination (SIGKILL, power loss) is not
//! guaranteed; the OS temp cleaner is the only backstop there.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

pub const STAGING_PREFIX: &str = "voicescrub_temp_";
pub const OUTPUT_PREFIX: &str = "voicescrub_output_";

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Failed to create workspace directory in {root:?}: {source}")]
    Create {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct TempWorkspace {
    staging: TempDir,
    output: TempDir,
}

impl TempWorkspace {
    /// Create both directories under the system temp dir.
    pub fn create() -> Result<Self, WorkspaceError> {
        Self::create_in(&std::env::temp_dir())
    }

    /// Create both directories under `root` (created if missing).
    pub fn create_in(root: &Path) -> Result<Self, WorkspaceError> {
        let wrap = |source| WorkspaceError::Create { root: root.to_path_buf(), source };

        fs::create_dir_all(root).map_err(wrap)?;
        let staging = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir_in(root).map_err(wrap)?;
        let output = tempfile::Builder::new().prefix(OUTPUT_PREFIX).tempdir_in(root).map_err(wrap)?;

        log::info!(
            "Workspace ready. Staging: {:?}, output: {:?}",
            staging.path(),
            output.path()
        );

        Ok(Self { staging, output })
    }

    /// Where normalized WAVs are written.
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Where the engine writes and where finalized results live.
    pub fn output_dir(&self) -> &Path {
        self.output.path()
    }

    /// Remove both directories, logging (never returning) any failure.
    pub fn close(self) {
        let Self { staging, output } = self;
        for (label, dir) in [("staging", staging), ("output", output)] {
            let path = dir.path().to_path_buf();
            relax_permissions(&path);
            match dir.close() {
                Ok(()) => log::info!("Removed {} directory {:?}", label, path),
                Err(e) => log::warn!("Failed to remove {} directory {:?}: {}", label, path, e),
            }
        }
    }
}

/// Clear read-only bits left by external tools so removal succeeds on Windows.
fn relax_permissions(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::metadata(&path) else { continue };
        let mut perms = meta.permissions();
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            if let Err(e) = fs::set_permissions(&path, perms) {
                log::debug!("Could not clear read-only on {:?}: {}", path, e);
            }
        }
    }
}

/// True when `dir` contains no entries (missing counts as empty).
pub fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut it| it.next().is_none()).unwrap_or(true)
}
