//! Core dependency (Fred) build and artifact aliasing
//!
//! Fred is built at most once per run: if both declared output jars exist
//! the build is skipped without spawning anything. Downstream plugins
//! reference the outputs through fixed-path aliases inside the Fred tree.

use crate::config::Settings;
use crate::error::Result;
use crate::fsutil;
use crate::process::ProcessRunner;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Declared outputs of the Fred build, relative to the Fred directory.
const OUTPUT_JARS: &[&str] = &["build/output/freenet.jar", "build/output/freenet-ext-29.jar"];

/// Expected-location aliases downstream plugins resolve, as
/// (alias, link target relative to the alias location).
const ALIASES: &[(&str, &str)] = &[
    ("dist/freenet.jar", "../build/output/freenet.jar"),
    ("lib/freenet-ext.jar", "../build/output/freenet-ext-29.jar"),
];

pub struct FredBuilder<'a> {
    settings: &'a Settings,
    runner: &'a dyn ProcessRunner,
}

impl<'a> FredBuilder<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn ProcessRunner) -> Self {
        Self { settings, runner }
    }

    pub fn outputs_present(&self) -> bool {
        let fred_dir = self.settings.fred_dir();
        OUTPUT_JARS.iter().all(|jar| fred_dir.join(jar).exists())
    }

    pub fn aliases_present(&self) -> bool {
        let fred_dir = self.settings.fred_dir();
        ALIASES
            .iter()
            .all(|(alias, _)| fred_dir.join(alias).exists())
    }

    /// Build Fred unless its outputs already exist, then make sure the
    /// expected-location aliases resolve. Returns whether the shared
    /// artifacts are available; a failed build degrades rather than aborts.
    pub fn ensure_built(&self) -> bool {
        let fred_dir = self.settings.fred_dir();
        if !fred_dir.is_dir() {
            warn!("missing Fred checkout at {}", fred_dir.display());
            return false;
        }

        if self.outputs_present() {
            debug!("Fred artifacts up to date");
            return self.ensure_aliases(&fred_dir);
        }

        info!("building Fred (shared core dependency)");
        if let Err(e) = ensure_settings_file(&fred_dir) {
            warn!("could not prepare Fred settings.gradle: {e}");
        }

        let gradlew = fred_dir.join("gradlew");
        let command: Vec<String> = vec![
            gradlew.to_string_lossy().into_owned(),
            "-p".into(),
            fred_dir.to_string_lossy().into_owned(),
            "jar".into(),
            "copyRuntimeLibs".into(),
        ];
        let result = self.runner.run(&command, Some(&fred_dir));
        if !result.succeeded() {
            warn!("Fred build failed (exit code {})", result.exit_code);
            return false;
        }

        info!("built Fred core dependencies");
        self.ensure_aliases(&fred_dir)
    }

    fn ensure_aliases(&self, fred_dir: &Path) -> bool {
        for (alias, target) in ALIASES {
            let link = fred_dir.join(alias);
            if let Err(e) = fsutil::link_or_copy(Path::new(target), &link) {
                warn!("could not alias {}: {e}", link.display());
                return false;
            }
        }
        true
    }
}

/// Fred's checkout predates settings files; Gradle needs one to treat the
/// directory as a standalone root project.
fn ensure_settings_file(fred_dir: &Path) -> Result<()> {
    let settings_file = fred_dir.join("settings.gradle");
    if !settings_file.exists() {
        fs::write(&settings_file, "rootProject.name = 'fred'")?;
    }
    Ok(())
}

/// Paths (relative to the Fred directory) a diagnosis inspects.
pub fn expected_artifacts() -> Vec<PathBuf> {
    OUTPUT_JARS.iter().map(|jar| PathBuf::from(*jar)).collect()
}

pub fn expected_aliases() -> Vec<PathBuf> {
    ALIASES
        .iter()
        .map(|(alias, _)| PathBuf::from(*alias))
        .collect()
}
