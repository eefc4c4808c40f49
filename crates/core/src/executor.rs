//! Per-plugin build strategies and execution
//!
//! Each classified plugin goes through `Pending -> Building -> Succeeded |
//! Failed` exactly once; a failure is recorded and the executor moves on to
//! the next plugin. Strategy selection is name-keyed dispatch over a small
//! set of bespoke builds; everything else takes the default invocation for
//! its build kind.

use crate::config::{Settings, rules};
use crate::patch::PatchSet;
use crate::process::{ProcessRunner, RunResult};
use crate::registry::{BuildKind, PluginDescriptor};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Result of one plugin build attempt.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub plugin: String,
    pub exit_code: i32,
    pub succeeded: bool,
    #[serde(skip)]
    pub output: String,
}

pub struct BuildExecutor<'a> {
    settings: &'a Settings,
    runner: &'a dyn ProcessRunner,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn ProcessRunner) -> Self {
        Self { settings, runner }
    }

    /// Build one plugin with its selected strategy. Every failure mode is
    /// folded into the returned outcome; nothing here aborts the batch.
    pub fn build(&self, plugin: &PluginDescriptor) -> BuildOutcome {
        info!("building {}", plugin.name);
        let result = match plugin.name.as_str() {
            "plugin-FlogHelper" => self.build_flog_helper(plugin),
            "plugin-Freemail" => self.build_freemail(plugin),
            "plugin-Library" => self.build_library(plugin),
            "plugin-SNMP" => self.build_snmp(plugin),
            "plugin-Freereader" => self.build_freereader(plugin),
            "plugin-JSTUN" => self.build_jstun(plugin),
            _ => match plugin.kind {
                Some(BuildKind::Gradle) => self.default_gradle(plugin),
                Some(BuildKind::Ant) => self.default_ant(plugin),
                None => RunResult::launch_failed("no build descriptor"),
            },
        };
        self.outcome(plugin, result)
    }

    /// Invoke the plugin's own clean goal, for the `clean` command.
    pub fn clean(&self, plugin: &PluginDescriptor) -> RunResult {
        match plugin.kind {
            Some(BuildKind::Gradle) => self.gradle(plugin, &["clean"]),
            Some(BuildKind::Ant) => self
                .runner
                .run(&["ant".into(), "clean".into()], Some(&plugin.dir)),
            None => RunResult::launch_failed("no build descriptor"),
        }
    }

    fn outcome(&self, plugin: &PluginDescriptor, result: RunResult) -> BuildOutcome {
        if result.succeeded() {
            info!("successfully built {}", plugin.name);
        } else {
            warn!(
                "failed to build {} (exit code {})",
                plugin.name, result.exit_code
            );
            if self.settings.verbose && !result.output.is_empty() {
                warn!("build output for {}:\n{}", plugin.name, result.output);
            }
        }
        BuildOutcome {
            plugin: plugin.name.clone(),
            exit_code: result.exit_code,
            succeeded: result.succeeded(),
            output: result.output,
        }
    }

    // Default strategies

    fn default_gradle(&self, plugin: &PluginDescriptor) -> RunResult {
        let mut goals = vec!["clean", "jar"];
        if rules::PLUGINS_SKIPPING_TESTS.contains(&plugin.name.as_str()) {
            goals.extend(["-x", "compileTestJava", "-x", "test"]);
        }
        self.gradle(plugin, &goals)
    }

    fn default_ant(&self, plugin: &PluginDescriptor) -> RunResult {
        let mut command = self.ant_command(&["clean", "dist"]);
        if rules::ant_needs_db4o_classpath(&plugin.name) {
            push_lib(&mut command, &self.settings.db4o_jar());
        }
        self.runner.run(&command, Some(&plugin.dir))
    }

    // Named override strategies

    /// FlogHelper's descriptor carries a typo in its Plugin-Main-Class
    /// manifest entry; patch it for the build, and isolate the build from
    /// any enclosing Gradle context with a minimal settings file.
    fn build_flog_helper(&self, plugin: &PluginDescriptor) -> RunResult {
        let mut patches = PatchSet::new();

        let build_gradle = plugin.dir.join("build.gradle");
        if build_gradle.exists() {
            if let Err(e) = patches.apply(&build_gradle, |c| {
                c.replace(
                    "'plugins.flophelper.FlogHelper'",
                    "'plugins.floghelper.FlogHelper'",
                )
            }) {
                warn!("could not patch {}/build.gradle: {e}", plugin.name);
            }
        }

        let settings_file = plugin.dir.join("settings.gradle");
        let mut created_settings = false;
        if settings_file.exists() {
            if let Err(e) =
                patches.apply(&settings_file, |_| "rootProject.name = 'FlogHelper'".into())
            {
                warn!("could not isolate {} settings: {e}", plugin.name);
            }
        } else {
            match fs::write(&settings_file, "rootProject.name = 'FlogHelper'") {
                Ok(()) => created_settings = true,
                Err(e) => warn!("could not isolate {} settings: {e}", plugin.name),
            }
        }

        let result = self.gradle(plugin, &["clean", "jar"]);

        patches.restore_all();
        if created_settings {
            let _ = fs::remove_file(&settings_file);
        }
        result
    }

    /// Freemail bakes an absolute resource prefix into its template loader
    /// that only resolves inside the historical deployment jar.
    fn build_freemail(&self, plugin: &PluginDescriptor) -> RunResult {
        let web_page = plugin
            .dir
            .join("src/main/java/org/freenetproject/freemail/ui/web/WebPage.java");

        let mut patches = PatchSet::new();
        if web_page.exists() {
            if let Err(e) = patches.apply(&web_page, |c| {
                c.replace(
                    r#"loader.setPrefix("/resources/templates/");"#,
                    r#"loader.setPrefix("templates/");"#,
                )
            }) {
                warn!("could not patch WebPage.java: {e}");
            }
        }

        let dir = plugin.dir.to_string_lossy();
        let result = self.gradle(plugin, &["-p", dir.as_ref(), "clean", "jar"]);
        patches.restore_all();
        result
    }

    /// Library's B-tree skeleton uses raw wildcard generics a modern javac
    /// rejects; tighten them for the build.
    fn build_library(&self, plugin: &PluginDescriptor) -> RunResult {
        let source = plugin
            .dir
            .join("src/plugins/Library/util/SkeletonBTreeMap.java");

        let mut patches = PatchSet::new();
        if source.exists() {
            if let Err(e) = patches.apply(&source, |c| {
                c.replace(
                    "Map<PullTask<SkeletonNode>, ProgressTracker<SkeletonNode, ?>> ids = null;",
                    "Map<PullTask<SkeletonNode>, ProgressTracker<SkeletonNode, ? extends Progress>> ids = null;",
                )
                .replace(
                    "ProgressTracker<SkeletonNode, ?> ntracker = null;;",
                    "ProgressTracker<SkeletonNode, ? extends Progress> ntracker = null;",
                )
                .replace(
                    "ids = new LinkedHashMap<PullTask<SkeletonNode>, ProgressTracker<SkeletonNode, ?>>();",
                    "ids = new LinkedHashMap<PullTask<SkeletonNode>, ProgressTracker<SkeletonNode, ? extends Progress>>();",
                )
                .replace(
                    "import plugins.Library.util.exec.TaskCompleteException;",
                    "import plugins.Library.util.exec.TaskCompleteException;\nimport plugins.Library.util.exec.Progress;",
                )
            }) {
                warn!("could not patch SkeletonBTreeMap.java: {e}");
            }
        }

        let result = self.default_ant(plugin);
        patches.restore_all();
        result
    }

    /// SNMP reads I/O statistics through a Fred API that has since changed
    /// shape; patch the two call sites to their modern equivalents.
    fn build_snmp(&self, plugin: &PluginDescriptor) -> RunResult {
        let data_stats = plugin
            .dir
            .join("src/plugins/SNMP/snmplib/DataStatisticsInfo.java");
        let starter = plugin.dir.join("src/plugins/SNMP/snmplib/SNMPStarter.java");

        let mut patches = PatchSet::new();
        if data_stats.exists() {
            if let Err(e) = patches.apply(&data_stats, |c| {
                c.replace(
                    "int stats[][] = collector.getTotalStatistics();\n\t\tfor (int i = 0 ; i < blocks ; i++)\n\t\t\tres += stats[i][in?1:0];",
                    "// getTotalStatistics() no longer exists, use getTotalIO() instead\n\t\tlong[] io = collector.getTotalIO();\n\t\tres = (int)(io[in?1:0] / Math.max(1, blocks)); // Approximate per-block average",
                )
            }) {
                warn!("could not patch DataStatisticsInfo.java: {e}");
            }
        }
        if starter.exists() {
            if let Err(e) = patches.apply(&starter, |c| {
                c.replace(
                    "for (int i = 0 ; i < IOStatisticCollector.STATISTICS_ENTRIES ; i++) {",
                    "// STATISTICS_ENTRIES no longer exists, use fixed value for basic I/O stats\n\t\tfor (int i = 0 ; i < 2 ; i++) { // 0=total, 1=basic stats",
                )
            }) {
                warn!("could not patch SNMPStarter.java: {e}");
            }
        }

        let result = self.default_ant(plugin);
        patches.restore_all();
        result
    }

    /// Freereader's descriptor pins Java 1.6 in a form the property
    /// overrides cannot reach. Stage a patched copy of the descriptor and
    /// build from that; the plugin's own file is never touched.
    fn build_freereader(&self, plugin: &PluginDescriptor) -> RunResult {
        let version = &self.settings.java_version;
        let staged = self
            .settings
            .temp_build_dir()
            .join(format!("{}-build.xml", plugin.name));

        let stage = || -> crate::error::Result<()> {
            if let Some(parent) = staged.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = fs::read_to_string(plugin.dir.join("build.xml"))?;
            let patched = content
                .replace(r#"source="1.6""#, &format!(r#"source="{version}""#))
                .replace(r#"target="1.6""#, &format!(r#"target="{version}""#));
            fs::write(&staged, patched)?;
            Ok(())
        };
        if let Err(e) = stage() {
            warn!("could not stage patched descriptor for {}: {e}", plugin.name);
            return RunResult::launch_failed(format!("staging failed: {e}"));
        }

        let mut command: Vec<String> = vec![
            "ant".into(),
            "-f".into(),
            staged.to_string_lossy().into_owned(),
            format!("-Dbasedir={}", plugin.dir.to_string_lossy()),
            "clean".into(),
            "main".into(),
            "-Dant.file.failonerror=false".into(),
        ];
        push_lib(&mut command, &self.settings.db4o_jar());
        self.runner.run(&command, Some(&plugin.dir))
    }

    /// JSTUN links against the Tanuki service wrapper, provided through the
    /// tool classpath when the extracted jar is available.
    fn build_jstun(&self, plugin: &PluginDescriptor) -> RunResult {
        let mut command = self.ant_command(&["clean", "dist"]);
        push_lib(&mut command, &self.settings.wrapper_jar());
        self.runner.run(&command, Some(&plugin.dir))
    }

    // Command assembly

    fn gradle(&self, plugin: &PluginDescriptor, goals: &[&str]) -> RunResult {
        let Some(mut command) = gradle_command(&plugin.dir) else {
            warn!("no Gradle wrapper for {}", plugin.name);
            return RunResult::launch_failed(format!(
                "no Gradle wrapper in {}",
                plugin.dir.display()
            ));
        };
        command.extend(goals.iter().map(|g| g.to_string()));
        self.runner.run(&command, Some(&plugin.dir))
    }

    fn ant_command(&self, goals: &[&str]) -> Vec<String> {
        let version = &self.settings.java_version;
        let mut command: Vec<String> = vec!["ant".into()];
        command.extend(goals.iter().map(|g| g.to_string()));
        command.push(format!("-Dsource-version={version}"));
        command.push(format!("-Dtarget-version={version}"));
        command.push("-Dant.file.failonerror=false".into());
        command
    }
}

fn push_lib(command: &mut Vec<String>, jar: &Path) {
    if jar.exists() {
        command.push("-lib".into());
        command.push(jar.to_string_lossy().into_owned());
    }
}

#[cfg(not(windows))]
fn gradle_command(dir: &Path) -> Option<Vec<String>> {
    dir.join("gradlew")
        .exists()
        .then(|| vec!["bash".to_string(), "./gradlew".to_string()])
}

#[cfg(windows)]
fn gradle_command(dir: &Path) -> Option<Vec<String>> {
    dir.join("gradlew.bat")
        .exists()
        .then(|| vec!["cmd".to_string(), "/c".to_string(), "gradlew.bat".to_string()])
}
