//! Plugin discovery and build-system classification

use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name convention for plugin sub-projects.
pub const PLUGIN_PREFIX: &str = "plugin-";

/// Which of the two supported build-descriptor conventions a plugin uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BuildKind {
    Gradle,
    Ant,
}

/// One discovered sub-project. Created at discovery, never mutated; other
/// components receive read-only references.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub dir: PathBuf,
    pub name: String,
    /// `None` means the directory matched the naming convention but carries
    /// no known build descriptor; it is excluded from both build passes.
    pub kind: Option<BuildKind>,
}

impl PluginDescriptor {
    pub fn is_classified(&self) -> bool {
        self.kind.is_some()
    }
}

/// Classify a plugin directory by descriptor presence, non-recursively.
///
/// A directory carrying both a Gradle and an Ant descriptor is classified
/// as Gradle: the modern build wins, explicitly.
pub fn classify(dir: &Path) -> Option<BuildKind> {
    if dir.join("build.gradle").exists() || dir.join("build.gradle.kts").exists() {
        return Some(BuildKind::Gradle);
    }
    if dir.join("build.xml").exists() {
        return Some(BuildKind::Ant);
    }
    None
}

/// Scan the immediate subdirectories of `projects_dir` for plugins.
///
/// The returned list is sorted by name so the build order is stable across
/// runs. A missing projects root is the one hard-fatal condition of the
/// whole orchestrator.
pub fn discover(projects_dir: &Path) -> Result<Vec<PluginDescriptor>> {
    if !projects_dir.is_dir() {
        return Err(Error::ProjectsRootMissing(projects_dir.to_path_buf()));
    }

    let mut plugins = Vec::new();
    for entry in fs::read_dir(projects_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(PLUGIN_PREFIX) {
            continue;
        }
        let dir = entry.path();
        let kind = classify(&dir);
        if kind.is_none() {
            info!("{name}: no build descriptor found, excluded from build passes");
        }
        debug!("discovered {name} ({kind:?})");
        plugins.push(PluginDescriptor { dir, name, kind });
    }

    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(plugins)
}
