//! End-to-end pipeline test against a synthetic project tree, using real
//! subprocesses (stub wrapper scripts) instead of Gradle and Ant.

#![cfg(unix)]

use fredbuild_core::{BuildKind, Orchestrator, Settings, SystemRunner, config::rules};
use std::fs;
use tempfile::TempDir;

/// A tree where Fred is prebuilt and the dependency cache is seeded, so
/// the run stays offline and spawns only plugin builds.
fn seeded_settings(temp: &TempDir) -> Settings {
    let settings = Settings::new(temp.path());
    let fred_dir = settings.fred_dir();
    fs::create_dir_all(fred_dir.join("build/output")).unwrap();
    fs::write(fred_dir.join("build/output/freenet.jar"), "jar").unwrap();
    fs::write(fred_dir.join("build/output/freenet-ext-29.jar"), "jar").unwrap();

    let deps_dir = settings.deps_dir();
    fs::create_dir_all(&deps_dir).unwrap();
    for (name, _) in rules::EXTERNAL_DEPENDENCIES {
        fs::write(deps_dir.join(name), "cached").unwrap();
    }
    fs::write(settings.wrapper_jar(), "cached").unwrap();
    settings
}

/// A Gradle plugin whose stub wrapper produces a jar, exits with
/// `exit_code`, and logs each invocation.
fn stub_gradle_plugin(settings: &Settings, name: &str, exit_code: i32) {
    let dir = settings.projects_dir().join(name);
    fs::create_dir_all(dir.join("dist")).unwrap();
    fs::write(dir.join("build.gradle"), "sourceCompatibility = 1.7").unwrap();
    let short = name.strip_prefix("plugin-").unwrap_or(name);
    fs::write(
        dir.join("gradlew"),
        format!(
            "#!/bin/sh\necho \"$@\" >> gradlew.log\necho jar > dist/{short}.jar\nexit {exit_code}\n"
        ),
    )
    .unwrap();
}

#[test]
fn test_full_pipeline_builds_collects_and_restores() {
    let temp = TempDir::new().unwrap();
    let settings = seeded_settings(&temp);
    stub_gradle_plugin(&settings, "plugin-Alpha", 0);
    stub_gradle_plugin(&settings, "plugin-Beta", 0);
    // Beta carries both descriptors and must still build as Gradle.
    fs::write(
        settings.projects_dir().join("plugin-Beta/build.xml"),
        "<project/>",
    )
    .unwrap();

    let runner = SystemRunner::new(false);
    let summary = Orchestrator::new(&settings, &runner).run().unwrap();

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.outcomes[0].plugin, "plugin-Alpha");
    assert_eq!(summary.outcomes[1].plugin, "plugin-Beta");
    assert!(summary.fred_available);

    // Both wrappers were invoked with the standard goals, exactly once.
    for name in ["plugin-Alpha", "plugin-Beta"] {
        let log =
            fs::read_to_string(settings.projects_dir().join(name).join("gradlew.log")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("clean jar"));
    }

    // Artifacts collected under plugin-qualified names.
    assert_eq!(summary.artifacts_collected, 2);
    assert!(settings.libs_dir().join("plugin-Alpha-Alpha.jar").exists());
    assert!(settings.libs_dir().join("plugin-Beta-Beta.jar").exists());

    // Toolchain patches were reverted after the run.
    for name in ["plugin-Alpha", "plugin-Beta"] {
        assert_eq!(
            fs::read_to_string(settings.projects_dir().join(name).join("build.gradle")).unwrap(),
            "sourceCompatibility = 1.7"
        );
    }
}

#[test]
fn test_pipeline_tolerates_failing_plugin() {
    let temp = TempDir::new().unwrap();
    let settings = seeded_settings(&temp);
    stub_gradle_plugin(&settings, "plugin-Broken", 1);
    stub_gradle_plugin(&settings, "plugin-Fine", 0);

    let runner = SystemRunner::new(false);
    let summary = Orchestrator::new(&settings, &runner).run().unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert!(!summary.outcomes[0].succeeded);
    assert_eq!(summary.outcomes[0].exit_code, 1);
    assert!(summary.outcomes[1].succeeded);

    // The broken plugin's jar still exists in its tree, so best-effort
    // collection picks up both.
    assert_eq!(summary.artifacts_collected, 2);
}

#[test]
fn test_classification_matches_descriptor_precedence() {
    let temp = TempDir::new().unwrap();
    let settings = seeded_settings(&temp);
    let projects = settings.projects_dir();

    let both = projects.join("plugin-Both");
    fs::create_dir_all(&both).unwrap();
    fs::write(both.join("build.gradle"), "").unwrap();
    fs::write(both.join("build.xml"), "").unwrap();

    let ant_only = projects.join("plugin-AntOnly");
    fs::create_dir_all(&ant_only).unwrap();
    fs::write(ant_only.join("build.xml"), "").unwrap();

    let plugins = fredbuild_core::registry::discover(&projects).unwrap();
    let kind_of = |name: &str| {
        plugins
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.kind)
    };
    assert_eq!(kind_of("plugin-Both"), Some(BuildKind::Gradle));
    assert_eq!(kind_of("plugin-AntOnly"), Some(BuildKind::Ant));
}

#[test]
fn test_rerun_skips_fred_and_refreshes_collection() {
    let temp = TempDir::new().unwrap();
    let settings = seeded_settings(&temp);
    stub_gradle_plugin(&settings, "plugin-Alpha", 0);

    let runner = SystemRunner::new(false);
    let orchestrator = Orchestrator::new(&settings, &runner);
    let first = orchestrator.run().unwrap();
    let second = orchestrator.run().unwrap();

    assert_eq!(first.artifacts_collected, second.artifacts_collected);
    // Fred was never rebuilt; its aliases exist and are stable.
    assert!(settings.fred_dir().join("dist/freenet.jar").exists());
    assert!(settings.fred_dir().join("lib/freenet-ext.jar").exists());
}
