//! Top-level build pipeline
//!
//! Discovery, core dependency build, external provisioning, per-plugin
//! environment setup, sequential builds, artifact collection, and the
//! unconditional cleanup that reverses every provisioning change. Plugins
//! are built one at a time in discovery order; a failing plugin never
//! aborts the run.

use crate::collect;
use crate::config::{Settings, rules};
use crate::deps::DependencyProvisioner;
use crate::error::Result;
use crate::executor::{BuildExecutor, BuildOutcome};
use crate::fred::FredBuilder;
use crate::process::ProcessRunner;
use crate::provision::EnvironmentProvisioner;
use crate::registry::{self, PluginDescriptor};
use serde::Serialize;
use std::fs;
use tracing::{info, warn};

/// End-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<BuildOutcome>,
    pub artifacts_collected: usize,
    /// Discovered plugins excluded from both build passes.
    pub unclassified: Vec<String>,
    /// Whether the shared core dependency was available for this run.
    pub fred_available: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub struct Orchestrator<'a> {
    settings: &'a Settings,
    runner: &'a dyn ProcessRunner,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn ProcessRunner) -> Self {
        Self { settings, runner }
    }

    /// Run the full pipeline. The only hard-fatal conditions are a missing
    /// projects root and an I/O failure while writing the output directory;
    /// everything else degrades into the summary.
    pub fn run(&self) -> Result<RunSummary> {
        let plugins = registry::discover(&self.settings.projects_dir())?;
        let classified: Vec<&PluginDescriptor> =
            plugins.iter().filter(|p| p.is_classified()).collect();
        info!(
            "discovered {} plugins ({} buildable)",
            plugins.len(),
            classified.len()
        );

        let fred_available = FredBuilder::new(self.settings, self.runner).ensure_built();
        if !fred_available {
            warn!("Fred artifacts unavailable; dependent plugin builds may fail");
        }

        let deps = DependencyProvisioner::new(self.settings);
        deps.fetch_all();
        deps.ensure_wrapper_jar();
        deps.place_fred_bouncycastle();
        deps.place_plugin_artifacts();
        deps.ensure_db4o_jar(self.runner);

        let mut provisioner = EnvironmentProvisioner::new(self.settings);
        for plugin in &classified {
            provisioner.prepare(plugin);
        }

        let executor = BuildExecutor::new(self.settings, self.runner);
        let mut outcomes = Vec::with_capacity(classified.len());
        for plugin in &classified {
            outcomes.push(executor.build(plugin));
        }

        // Collect before cleanup so artifacts under provisioned paths are
        // still reachable, but run the cleanup whatever collection did.
        let collected = collect::collect(&plugins, &self.settings.libs_dir());
        provisioner.cleanup();
        let artifacts_collected = collected?;

        Ok(RunSummary {
            outcomes,
            artifacts_collected,
            unclassified: plugins
                .iter()
                .filter(|p| !p.is_classified())
                .map(|p| p.name.clone())
                .collect(),
            fred_available,
        })
    }

    /// Build only the shared core dependency.
    pub fn build_fred_only(&self) -> bool {
        FredBuilder::new(self.settings, self.runner).ensure_built()
    }

    /// Invoke every plugin's own clean goal, remove leftover provisioning
    /// from interrupted runs, and drop the collected-artifact directory.
    pub fn clean_all(&self) -> Result<()> {
        let plugins = registry::discover(&self.settings.projects_dir())?;

        let libs_dir = self.settings.libs_dir();
        if libs_dir.exists() {
            fs::remove_dir_all(&libs_dir)?;
        }

        let executor = BuildExecutor::new(self.settings, self.runner);
        for plugin in plugins.iter().filter(|p| p.is_classified()) {
            info!("cleaning {}", plugin.name);
            let result = executor.clean(plugin);
            if !result.succeeded() {
                warn!("could not clean {} (exit code {})", plugin.name, result.exit_code);
            }
        }

        self.scrub_leftover_provisioning(&plugins);
        Ok(())
    }

    /// A crashed run can leave installed wrappers and shared-library links
    /// behind; remove them by rule table rather than by record.
    fn scrub_leftover_provisioning(&self, plugins: &[PluginDescriptor]) {
        for plugin in plugins {
            let name = plugin.name.as_str();

            if rules::PLUGINS_NEEDING_WRAPPER.contains(&name) {
                for file in ["gradlew", "gradlew.bat"] {
                    let path = plugin.dir.join(file);
                    if path.exists() {
                        let _ = fs::remove_file(&path);
                    }
                }
                let gradle_dir = plugin.dir.join("gradle");
                if gradle_dir.exists() {
                    let _ = fs::remove_dir_all(&gradle_dir);
                }
            }

            if rules::ANT_PLUGINS_NEEDING_DB4O.contains(&name) {
                let link = plugin.dir.join(rules::DB4O_PROJECT).join("src");
                if link.is_symlink() {
                    let _ = fs::remove_file(&link);
                    let _ = fs::create_dir_all(&link);
                }
            }

            if rules::GRADLE_PLUGINS_NEEDING_DB4O.contains(&name) {
                let jar = plugin.dir.join(rules::DB4O_PROJECT).join("db4o.jar");
                if jar.exists() {
                    let _ = fs::remove_file(&jar);
                    if let Some(parent) = jar.parent() {
                        let _ = fs::remove_dir(parent);
                    }
                }
            }
        }
    }
}
