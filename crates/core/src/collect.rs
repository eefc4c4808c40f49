//! Built-artifact collection
//!
//! After the build passes, every plugin tree is scanned for produced jars,
//! which are copied under plugin-qualified names into one output directory.
//! Collection is a full refresh and runs best-effort: a plugin whose build
//! reported failure may still have produced a usable archive.

use crate::error::Result;
use crate::registry::PluginDescriptor;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Directories that hold tooling or vendored jars rather than products.
const EXCLUDED_DIRS: &[&str] = &["lib", "libs", "db4o-7.4", "gradle"];

/// Scan every plugin directory for jar artifacts and copy them into
/// `output_dir` as `<pluginName>-<fileName>`. The output directory is
/// cleared and recreated first. Returns the number of artifacts collected;
/// zero is a valid outcome.
pub fn collect(plugins: &[PluginDescriptor], output_dir: &Path) -> Result<usize> {
    if output_dir.exists() {
        fs::remove_dir_all(output_dir)?;
    }
    fs::create_dir_all(output_dir)?;

    let mut count = 0;
    for plugin in plugins {
        for entry in WalkDir::new(&plugin.dir)
            .into_iter()
            .filter_entry(|e| !is_excluded_dir(e))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if !file_name.ends_with(".jar") || file_name == "gradle-wrapper.jar" {
                continue;
            }

            let target = output_dir.join(format!("{}-{}", plugin.name, file_name));
            debug!("collecting {} from {}", file_name, plugin.name);
            fs::copy(entry.path(), &target)?;
            count += 1;
        }
    }

    info!("collected {count} artifacts into {}", output_dir.display());
    Ok(count)
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn plugin(root: &Path, name: &str, jars: &[&str]) -> PluginDescriptor {
        let dir = root.join(name);
        for jar in jars {
            let path = dir.join(jar);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "jar").unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        PluginDescriptor {
            kind: registry::classify(&dir),
            dir,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_zero_plugins_yields_empty_output_dir() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("build/libs");

        let count = collect(&[], &output).unwrap();
        assert_eq!(count, 0);
        assert!(output.is_dir());
        assert_eq!(fs::read_dir(&output).unwrap().count(), 0);
    }

    #[test]
    fn test_collects_with_plugin_qualified_names() {
        let temp = TempDir::new().unwrap();
        let plugins = vec![
            plugin(temp.path(), "plugin-Echo", &["dist/Echo.jar"]),
            plugin(temp.path(), "plugin-SNMP", &["build/SNMP.jar"]),
        ];
        let output = temp.path().join("libs");

        let count = collect(&plugins, &output).unwrap();
        assert_eq!(count, 2);
        assert!(output.join("plugin-Echo-Echo.jar").exists());
        assert!(output.join("plugin-SNMP-SNMP.jar").exists());
    }

    #[test]
    fn test_excludes_tooling_and_vendored_jars() {
        let temp = TempDir::new().unwrap();
        let plugins = vec![plugin(
            temp.path(),
            "plugin-WebOfTrust",
            &[
                "dist/WebOfTrust.jar",
                "gradle/wrapper/gradle-wrapper.jar",
                "lib/freenet.jar",
                "libs/vendored.jar",
                "db4o-7.4/db4o.jar",
            ],
        )];
        let output = temp.path().join("libs");

        let count = collect(&plugins, &output).unwrap();
        assert_eq!(count, 1);
        assert!(output.join("plugin-WebOfTrust-WebOfTrust.jar").exists());
    }

    #[test]
    fn test_collection_is_a_full_refresh() {
        let temp = TempDir::new().unwrap();
        let plugins = vec![plugin(temp.path(), "plugin-Echo", &["dist/Echo.jar"])];
        let output = temp.path().join("libs");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("stale.jar"), "old").unwrap();

        let count = collect(&plugins, &output).unwrap();
        assert_eq!(count, 1);
        assert!(!output.join("stale.jar").exists());
    }

    #[test]
    fn test_repeated_collection_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let plugins = vec![plugin(temp.path(), "plugin-Echo", &["Echo.jar"])];
        let output = temp.path().join("libs");

        assert_eq!(collect(&plugins, &output).unwrap(), 1);
        assert_eq!(collect(&plugins, &output).unwrap(), 1);
    }

    #[test]
    fn test_unclassified_plugins_are_still_scanned() {
        let temp = TempDir::new().unwrap();
        // No build descriptor, but a prebuilt jar in the tree.
        let dir: PathBuf = temp.path().join("plugin-Prebuilt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Prebuilt.jar"), "jar").unwrap();
        let descriptor = PluginDescriptor {
            kind: registry::classify(&dir),
            dir,
            name: "plugin-Prebuilt".to_string(),
        };

        let output = temp.path().join("libs");
        assert_eq!(collect(&[descriptor], &output).unwrap(), 1);
    }
}
