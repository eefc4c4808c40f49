use super::rules;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Explicit run configuration, passed into every component constructor.
///
/// Replaces the ambient process-wide toggles of the original build scripts:
/// verbosity and the toolchain version travel with this object instead of
/// living in global properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Settings {
    /// Project root. Everything else is derived from it.
    #[serde(skip)]
    pub root: PathBuf,

    /// Echo captured subprocess output when a command fails.
    pub verbose: bool,

    /// Java source/target version the legacy descriptors are patched to.
    pub java_version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            verbose: false,
            java_version: "8".to_string(),
        }
    }
}

impl Settings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Load settings from a JSON file, keeping `root` as given.
    pub fn load_from_file(path: &Path, root: impl Into<PathBuf>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigError(format!("Failed to parse {}: {e}", path.display())))?;
        settings.root = root.into();
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize settings: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Walk ancestors of `start_path` looking for a settings file.
    pub fn find_config_file(start_path: &Path) -> Option<PathBuf> {
        let mut current = start_path;
        loop {
            for name in ["fredbuild.json", ".fredbuild.json"] {
                let candidate = current.join(name);
                if candidate.exists() {
                    return Some(candidate);
                }
            }
            current = current.parent()?;
        }
    }

    // Derived layout, relative to the project root.

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    pub fn deps_dir(&self) -> PathBuf {
        self.root.join("build/deps")
    }

    pub fn libs_dir(&self) -> PathBuf {
        self.root.join("build/libs")
    }

    pub fn temp_build_dir(&self) -> PathBuf {
        self.root.join("build/temp-build-files")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("build/temp")
    }

    pub fn fred_dir(&self) -> PathBuf {
        self.projects_dir().join("fred")
    }

    pub fn db4o_project_dir(&self) -> PathBuf {
        self.projects_dir().join(rules::DB4O_PROJECT)
    }

    pub fn db4o_jar(&self) -> PathBuf {
        self.deps_dir().join(rules::DB4O_JAR_NAME)
    }

    pub fn wrapper_jar(&self) -> PathBuf {
        self.deps_dir().join("wrapper.jar")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.verbose);
        assert_eq!(settings.java_version, "8");
    }

    #[test]
    fn test_derived_paths() {
        let settings = Settings::new("/work/freenet");
        assert_eq!(settings.projects_dir(), PathBuf::from("/work/freenet/projects"));
        assert_eq!(settings.deps_dir(), PathBuf::from("/work/freenet/build/deps"));
        assert_eq!(settings.fred_dir(), PathBuf::from("/work/freenet/projects/fred"));
        assert_eq!(
            settings.db4o_jar(),
            PathBuf::from("/work/freenet/build/deps/db4o-7.4.jar")
        );
    }

    #[test]
    fn test_round_trip_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fredbuild.json");

        let settings = Settings::new("/work").with_verbose(true);
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path, "/work").unwrap();
        assert!(loaded.verbose);
        assert_eq!(loaded.root, PathBuf::from("/work"));
    }

    #[test]
    fn test_find_config_file_walks_ancestors() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("fredbuild.json"), "{}").unwrap();
        let nested = temp.path().join("projects/plugin-Echo");
        std::fs::create_dir_all(&nested).unwrap();

        let found = Settings::find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("fredbuild.json"));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fredbuild.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(Settings::load_from_file(&path, ".").is_err());
    }
}
