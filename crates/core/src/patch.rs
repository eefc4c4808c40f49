//! Scoped file mutation with guaranteed restore
//!
//! The orchestrator never leaves a plugin's tree permanently modified: every
//! destructive write goes through [`apply`], which keeps the original
//! content in a [`PatchRecord`] until [`restore`] puts it back. A
//! [`PatchSet`] collects records across a provisioning or build pass and
//! restores them on drop, so the restore happens on every exit path.

use crate::error::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Original content of a file mutated by the orchestrator, held until the
/// file is restored.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    path: PathBuf,
    original: String,
}

impl PatchRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Apply `transform` to the file at `path`.
///
/// Returns `None` when the transform leaves the content unchanged: nothing
/// is written and there is nothing to restore. The caller treats that as
/// "already compliant", not as an error.
pub fn apply<F>(path: &Path, transform: F) -> Result<Option<PatchRecord>>
where
    F: FnOnce(&str) -> String,
{
    let original = fs::read_to_string(path)?;
    let patched = transform(&original);
    if patched == original {
        debug!("{} already compliant", path.display());
        return Ok(None);
    }
    fs::write(path, &patched)?;
    debug!("patched {}", path.display());
    Ok(Some(PatchRecord {
        path: path.to_path_buf(),
        original,
    }))
}

/// Write the original content back. Idempotent: restoring twice, or a file
/// that was never re-modified, is harmless.
pub fn restore(record: &PatchRecord) -> Result<()> {
    fs::write(&record.path, &record.original)?;
    debug!("restored {}", record.path.display());
    Ok(())
}

/// Run every `(pattern, replacement)` pair over `content` in order.
/// Invalid patterns are skipped with a warning instead of aborting the run.
pub fn substitute_all<P, R>(content: &str, rules: &[(P, R)]) -> String
where
    P: AsRef<str>,
    R: AsRef<str>,
{
    let mut result = content.to_string();
    for (pattern, replacement) in rules {
        let pattern = pattern.as_ref();
        match Regex::new(pattern) {
            Ok(re) => result = re.replace_all(&result, replacement.as_ref()).into_owned(),
            Err(e) => warn!("invalid substitution pattern {pattern}: {e}"),
        }
    }
    result
}

/// Ordered collection of patch records, restored most-recent-first.
///
/// Dropping a non-empty set restores it, so a patched build attempt that
/// returns early (or panics in a test harness) still puts the sources back.
#[derive(Debug, Default)]
pub struct PatchSet {
    records: Vec<PatchRecord>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch `path` and record the original. Returns whether the file was
    /// actually modified.
    pub fn apply<F>(&mut self, path: &Path, transform: F) -> Result<bool>
    where
        F: FnOnce(&str) -> String,
    {
        match apply(path, transform)? {
            Some(record) => {
                self.records.push(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Restore every record, most recent first. Individual restore failures
    /// are logged and do not stop the remaining restores; an empty set is a
    /// safe no-op, so cleanup after a partial provisioning pass cannot crash.
    pub fn restore_all(&mut self) {
        while let Some(record) = self.records.pop() {
            if let Err(e) = restore(&record) {
                warn!("could not restore {}: {e}", record.path().display());
            }
        }
    }
}

impl Drop for PatchSet {
    fn drop(&mut self) {
        self.restore_all();
    }
}
