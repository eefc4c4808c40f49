//! Per-plugin build-environment provisioning and its reversal
//!
//! Before a plugin's own build runs, its environment is brought up to date:
//! a Gradle wrapper where the plugin ships none, descriptor patches for
//! toolchain compatibility, and shared-library linkage for the db4o
//! consumers. Every change is recorded so [`EnvironmentProvisioner::cleanup`]
//! can reverse the whole pass, whatever the builds did in between.

use crate::config::{Settings, rules};
use crate::fsutil;
use crate::patch::{self, PatchSet};
use crate::registry::{BuildKind, PluginDescriptor};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct EnvironmentProvisioner<'a> {
    settings: &'a Settings,
    patches: PatchSet,
    /// Files this run created; deleted at cleanup, most recent first.
    installed_files: Vec<PathBuf>,
    /// Directories this run created (wrapper internals); deleted recursively.
    installed_dirs: Vec<PathBuf>,
    /// Shared-source symlinks; replaced by empty placeholder directories.
    db4o_links: Vec<PathBuf>,
    /// Copied shared jars; deleted, empty parent pruned.
    db4o_jars: Vec<PathBuf>,
}

impl<'a> EnvironmentProvisioner<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            patches: PatchSet::new(),
            installed_files: Vec::new(),
            installed_dirs: Vec::new(),
            db4o_links: Vec::new(),
            db4o_jars: Vec::new(),
        }
    }

    /// Provision one plugin. Step order is load-bearing: the wrapper (and
    /// settings file) must exist before the descriptor can be patched, and
    /// descriptor patches land before shared-library linkage.
    pub fn prepare(&mut self, plugin: &PluginDescriptor) {
        match plugin.kind {
            Some(BuildKind::Gradle) => {
                self.install_wrapper(plugin);
                self.ensure_settings_file(plugin);
                self.patch_gradle_descriptor(plugin);
                if plugin.name == "plugin-KeyUtils" {
                    self.patch_keyutils_descriptor(plugin);
                }
                if rules::GRADLE_PLUGINS_NEEDING_DB4O.contains(&plugin.name.as_str()) {
                    self.copy_db4o_jar(plugin);
                }
            }
            Some(BuildKind::Ant) => {
                self.patch_ant_descriptor(plugin);
                if rules::ANT_PLUGINS_NEEDING_DB4O.contains(&plugin.name.as_str()) {
                    self.link_db4o_source(plugin);
                }
            }
            None => {}
        }
    }

    fn install_wrapper(&mut self, plugin: &PluginDescriptor) {
        if !rules::PLUGINS_NEEDING_WRAPPER.contains(&plugin.name.as_str()) {
            return;
        }
        if plugin.dir.join("gradlew").exists() {
            debug!("{} has its own wrapper, leaving it alone", plugin.name);
            return;
        }
        let donor = self.settings.projects_dir().join(rules::WRAPPER_DONOR);
        if !donor.join("gradlew").exists() {
            warn!("wrapper donor {} has no wrapper itself", rules::WRAPPER_DONOR);
            return;
        }

        let gradle_dir = plugin.dir.join("gradle");
        let created_gradle_dir = !gradle_dir.exists();

        for file in rules::WRAPPER_FILES {
            let source = donor.join(file);
            if !source.exists() {
                continue;
            }
            let dest = plugin.dir.join(file);
            let copied = dest
                .parent()
                .map(fs::create_dir_all)
                .unwrap_or(Ok(()))
                .and_then(|_| fs::copy(&source, &dest));
            match copied {
                Ok(_) => self.installed_files.push(dest),
                Err(e) => warn!("could not install {file} for {}: {e}", plugin.name),
            }
        }

        let gradlew = plugin.dir.join("gradlew");
        if let Err(e) = fsutil::make_executable(&gradlew) {
            warn!("could not mark {} executable: {e}", gradlew.display());
        }
        if created_gradle_dir && gradle_dir.exists() {
            // Remember the whole wrapper-internals directory, not just the
            // files, so cleanup leaves no empty skeleton behind.
            self.installed_dirs.push(gradle_dir);
        }
        debug!("installed Gradle wrapper for {}", plugin.name);
    }

    fn ensure_settings_file(&mut self, plugin: &PluginDescriptor) {
        let settings_file = plugin.dir.join("settings.gradle");
        if settings_file.exists() {
            return;
        }
        let content = format!("rootProject.name = '{}'", plugin.name);
        match fs::write(&settings_file, content) {
            Ok(()) => {
                debug!("created settings.gradle for {}", plugin.name);
                self.installed_files.push(settings_file);
            }
            Err(e) => warn!("could not create settings.gradle for {}: {e}", plugin.name),
        }
    }

    fn patch_gradle_descriptor(&mut self, plugin: &PluginDescriptor) {
        let rules = gradle_version_rules(&self.settings.java_version);
        for descriptor in ["build.gradle", "build.gradle.kts"] {
            let path = plugin.dir.join(descriptor);
            if !path.exists() {
                continue;
            }
            match self
                .patches
                .apply(&path, |content| patch::substitute_all(content, &rules))
            {
                Ok(true) => debug!("patched toolchain versions in {}/{descriptor}", plugin.name),
                Ok(false) => {}
                Err(e) => warn!("could not patch {}/{descriptor}: {e}", plugin.name),
            }
        }
    }

    fn patch_ant_descriptor(&mut self, plugin: &PluginDescriptor) {
        let rules = ant_version_rules(&self.settings.java_version);
        let path = plugin.dir.join("build.xml");
        if !path.exists() {
            return;
        }
        match self
            .patches
            .apply(&path, |content| patch::substitute_all(content, &rules))
        {
            Ok(true) => debug!("patched toolchain versions in {}/build.xml", plugin.name),
            Ok(false) => {}
            Err(e) => warn!("could not patch {}/build.xml: {e}", plugin.name),
        }
    }

    /// KeyUtils declares Fred as a released artifact that no repository
    /// carries anymore, and stamps its version from a file mtime that does
    /// not survive a fresh checkout. Point it at the locally built jars.
    fn patch_keyutils_descriptor(&mut self, plugin: &PluginDescriptor) {
        let path = plugin.dir.join("build.gradle");
        if !path.exists() {
            return;
        }
        match self.patches.apply(&path, |content| {
            content
                .replace(
                    "compile group: 'org.freenetproject', name: 'fred', version: 'build+'",
                    "compileOnly files('../fred/build/libs/freenet.jar')\n    compileOnly files('../fred/lib/freenet-ext.jar')",
                )
                .replace(
                    "getMTime(\"src/main/java/plugins/KeyUtils/Version.java\")",
                    "new Date()",
                )
        }) {
            Ok(true) => debug!("rewired Fred dependency for {}", plugin.name),
            Ok(false) => {}
            Err(e) => warn!("could not patch {}/build.gradle: {e}", plugin.name),
        }
    }

    fn link_db4o_source(&mut self, plugin: &PluginDescriptor) {
        let target = self.settings.db4o_project_dir().join("src");
        if !target.exists() {
            debug!("no shared db4o source checkout, skipping link for {}", plugin.name);
            return;
        }
        let link = plugin.dir.join(rules::DB4O_PROJECT).join("src");
        match fsutil::symlink_replacing(&target, &link) {
            Ok(()) => {
                debug!("linked db4o source for {}", plugin.name);
                self.db4o_links.push(link);
            }
            Err(e) => warn!("could not link db4o source for {}: {e}", plugin.name),
        }
    }

    fn copy_db4o_jar(&mut self, plugin: &PluginDescriptor) {
        let jar = self.settings.db4o_jar();
        if !jar.exists() {
            debug!("shared db4o jar not built, skipping copy for {}", plugin.name);
            return;
        }
        let dest_dir = plugin.dir.join(rules::DB4O_PROJECT);
        let dest = dest_dir.join("db4o.jar");
        let copied = fs::create_dir_all(&dest_dir).and_then(|_| fs::copy(&jar, &dest));
        match copied {
            Ok(_) => {
                debug!("copied db4o.jar into {}", plugin.name);
                self.db4o_jars.push(dest);
            }
            Err(e) => warn!("could not copy db4o.jar into {}: {e}", plugin.name),
        }
    }

    /// Reverse every recorded change: restore patched descriptors, delete
    /// installed wrapper files, replace shared-source symlinks with empty
    /// placeholder directories, drop copied jars. Runs unconditionally at
    /// the end of the pipeline; calling it after a partial pass, or twice,
    /// is safe.
    pub fn cleanup(&mut self) {
        self.patches.restore_all();

        while let Some(file) = self.installed_files.pop() {
            if file.exists() {
                if let Err(e) = fs::remove_file(&file) {
                    warn!("could not remove {}: {e}", file.display());
                }
            }
        }
        while let Some(dir) = self.installed_dirs.pop() {
            if dir.exists() {
                if let Err(e) = fs::remove_dir_all(&dir) {
                    warn!("could not remove {}: {e}", dir.display());
                }
            }
        }

        while let Some(link) = self.db4o_links.pop() {
            if link.is_symlink() {
                if let Err(e) = fs::remove_file(&link) {
                    warn!("could not remove {}: {e}", link.display());
                    continue;
                }
            }
            // The plugin's own build expects the path to exist even when
            // empty.
            if let Err(e) = fs::create_dir_all(&link) {
                warn!("could not recreate placeholder {}: {e}", link.display());
            }
        }

        while let Some(jar) = self.db4o_jars.pop() {
            if jar.exists() {
                if let Err(e) = fs::remove_file(&jar) {
                    warn!("could not remove {}: {e}", jar.display());
                    continue;
                }
            }
            if let Some(parent) = jar.parent() {
                // Prune only when empty; a plugin's own files stay put.
                let _ = fs::remove_dir(parent);
            }
        }
    }
}

fn gradle_version_rules(version: &str) -> Vec<(String, String)> {
    let dotted = format!("1.{version}");
    vec![
        (
            r"sourceCompatibility\s*=\s*targetCompatibility\s*=\s*7".into(),
            format!("sourceCompatibility = targetCompatibility = {version}"),
        ),
        (
            r"sourceCompatibility\s*=\s*1\.7".into(),
            format!("sourceCompatibility = {dotted}"),
        ),
        (
            r"targetCompatibility\s*=\s*1\.7".into(),
            format!("targetCompatibility = {dotted}"),
        ),
        (
            r"sourceCompatibility\s*=\s*7".into(),
            format!("sourceCompatibility = {version}"),
        ),
        (
            r"targetCompatibility\s*=\s*7".into(),
            format!("targetCompatibility = {version}"),
        ),
        (
            r"JavaVersion\.VERSION_1_7".into(),
            format!("JavaVersion.VERSION_1_{version}"),
        ),
        (
            r#""-Djavac\.source\.version=" \+ sourceCompatibility"#.into(),
            format!(r#""-Djavac.source.version={version}""#),
        ),
        (
            r#""-Djavac\.target\.version=" \+ targetCompatibility"#.into(),
            format!(r#""-Djavac.target.version={version}""#),
        ),
        // Written for a Gradle too new for these plugins; map back to the
        // names their pinned wrappers understand.
        (r"archiveBaseName = ".into(), "baseName = ".to_string()),
        (
            r"destinationDirectory = ".into(),
            "destinationDir = ".to_string(),
        ),
    ]
}

fn ant_version_rules(version: &str) -> Vec<(String, String)> {
    vec![
        (r#"source="1\.5""#.into(), format!(r#"source="{version}""#)),
        (r#"target="1\.5""#.into(), format!(r#"target="{version}""#)),
        (
            r#"(name="source-version"\s+value=)"1\.5""#.into(),
            format!(r#"${{1}}"{version}""#),
        ),
        (
            r#"(name="target-version"\s+value=)"1\.5""#.into(),
            format!(r#"${{1}}"{version}""#),
        ),
        (
            r#"-Djavac\.source\.version="?1\.5"?"#.into(),
            format!("-Djavac.source.version={version}"),
        ),
        (
            r#"-Djavac\.target\.version="?1\.5"?"#.into(),
            format!("-Djavac.target.version={version}"),
        ),
    ]
}
