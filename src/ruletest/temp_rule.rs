// src/ruletest/temp_rule.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{Result, RulewardenError};
use crate::fs::FileSystem;

/// A rule document written to the scratch directory for one test run.
///
/// The file is deleted at most once: by [`TempRuleFile::remove`] or, failing
/// that, when the guard is dropped. Deletion errors are logged, never raised.
pub struct TempRuleFile {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    removed: bool,
}

impl fmt::Debug for TempRuleFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempRuleFile")
            .field("path", &self.path)
            .field("removed", &self.removed)
            .finish()
    }
}

impl TempRuleFile {
    /// Write `content` to a fresh random file under `dir`, creating `dir`
    /// if needed.
    pub fn create(fs: Arc<dyn FileSystem>, dir: &Path, content: &str) -> Result<Self> {
        fs.create_dir_all(dir)
            .map_err(|e| filesystem_error(dir, e))?;

        let path = dir.join(format!("{}.yaml", Uuid::new_v4()));
        // Guard first, so a partially written file is cleaned up on error.
        let guard = Self {
            fs,
            path,
            removed: false,
        };
        guard
            .fs
            .write(&guard.path, content.as_bytes())
            .map_err(|e| filesystem_error(&guard.path, e))?;

        debug!(rule_file = ?guard.path, "temporary rule file written");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        match self.fs.remove_file(&self.path) {
            Ok(true) => debug!(rule_file = ?self.path, "temporary rule file removed"),
            Ok(false) => debug!(rule_file = ?self.path, "temporary rule file already gone"),
            Err(e) => warn!(
                rule_file = ?self.path,
                error = %e,
                "failed to remove temporary rule file"
            ),
        }
    }
}

impl Drop for TempRuleFile {
    fn drop(&mut self) {
        self.remove();
    }
}

fn filesystem_error(path: &Path, err: anyhow::Error) -> RulewardenError {
    RulewardenError::FilesystemError {
        path: path.to_path_buf(),
        reason: format!("{err:#}"),
    }
}
