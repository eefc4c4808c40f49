use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fredbuild_core::{
    BuildKind, Orchestrator, ProcessRunner, RunSummary, Settings, SystemRunner,
    config::rules, fred, registry,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Meta-build orchestrator for Freenet plugin trees
#[derive(Parser)]
#[command(name = "fredbuild")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=debug    Enable debug logging")]
struct Cli {
    /// Project root containing the projects/ directory (defaults to the
    /// current directory)
    #[arg(long = "root", global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build Fred and every plugin, then collect the jars (default)
    Build {
        /// Echo subprocess output for failing builds
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,

        /// Print the run summary as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Build only Fred, the shared core dependency
    Fred,
    /// List discovered plugins and their build kinds
    List,
    /// Clean plugin builds, leftover provisioning, and collected artifacts
    Clean,
    /// Diagnose common build issues
    Diagnose,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let settings = load_settings(root)?;

    match cli.command.unwrap_or(Commands::Build {
        verbose: false,
        json: false,
    }) {
        Commands::Build { verbose, json } => {
            let verbose = verbose || settings.verbose;
            build_command(settings.with_verbose(verbose), json)
        }
        Commands::Fred => fred_command(&settings),
        Commands::List => list_command(&settings),
        Commands::Clean => clean_command(&settings),
        Commands::Diagnose => diagnose_command(&settings),
    }
}

fn load_settings(root: PathBuf) -> Result<Settings> {
    if let Some(config_path) = Settings::find_config_file(&root) {
        debug!("loading settings from {}", config_path.display());
        return Ok(Settings::load_from_file(&config_path, root)?);
    }
    Ok(Settings::new(root))
}

fn build_command(settings: Settings, json: bool) -> Result<()> {
    let runner = SystemRunner::new(settings.verbose);
    let summary = Orchestrator::new(&settings, &runner)
        .run()
        .context("Build run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&settings, &summary)?;
    }
    // Plugin failures are warnings, not a failed run: the exit status
    // reflects whether collection completed.
    Ok(())
}

fn print_summary(settings: &Settings, summary: &RunSummary) -> Result<()> {
    println!("\n{}", "=".repeat(60));
    println!(
        "✅ {} plugins built, ❌ {} failed",
        summary.succeeded(),
        summary.failed()
    );
    for outcome in &summary.outcomes {
        let mark = if outcome.succeeded { "✅" } else { "❌" };
        println!("   {mark} {} (exit code {})", outcome.plugin, outcome.exit_code);
    }
    if !summary.unclassified.is_empty() {
        println!("   ⏭️  skipped (no build descriptor): {}", summary.unclassified.join(", "));
    }
    if !summary.fred_available {
        println!("   ⚠️  Fred artifacts were not available for this run");
    }

    println!(
        "\n📦 Collected {} artifacts into {}",
        summary.artifacts_collected,
        settings.libs_dir().display()
    );
    let mut collected: Vec<String> = fs::read_dir(settings.libs_dir())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    collected.sort();
    for name in collected {
        println!("   - {name}");
    }
    Ok(())
}

fn fred_command(settings: &Settings) -> Result<()> {
    let runner = SystemRunner::new(settings.verbose);
    if !Orchestrator::new(settings, &runner).build_fred_only() {
        bail!("Fred build failed; re-run with RUST_LOG=debug for details");
    }
    println!("✅ Fred core dependencies are in place");
    Ok(())
}

fn list_command(settings: &Settings) -> Result<()> {
    let plugins = registry::discover(&settings.projects_dir())?;

    let gradle: Vec<&str> = plugins
        .iter()
        .filter(|p| p.kind == Some(BuildKind::Gradle))
        .map(|p| p.name.as_str())
        .collect();
    let ant: Vec<&str> = plugins
        .iter()
        .filter(|p| p.kind == Some(BuildKind::Ant))
        .map(|p| p.name.as_str())
        .collect();
    let unclassified: Vec<&str> = plugins
        .iter()
        .filter(|p| !p.is_classified())
        .map(|p| p.name.as_str())
        .collect();

    println!("Gradle plugins ({}):", gradle.len());
    for name in &gradle {
        println!("  - {name}");
    }
    println!("\nAnt plugins ({}):", ant.len());
    for name in &ant {
        println!("  - {name}");
    }
    if !unclassified.is_empty() {
        println!("\nUnclassified ({}):", unclassified.len());
        for name in &unclassified {
            println!("  - {name}");
        }
    }
    Ok(())
}

fn clean_command(settings: &Settings) -> Result<()> {
    let runner = SystemRunner::new(settings.verbose);
    Orchestrator::new(settings, &runner)
        .clean_all()
        .context("Clean failed")?;
    println!("🧹 Cleaned plugin builds and collected artifacts");
    Ok(())
}

fn diagnose_command(settings: &Settings) -> Result<()> {
    println!("=== Build Issues Diagnosis ===\n");

    let runner = SystemRunner::new(false);
    println!("1. Java version: {}", java_version(&runner));

    println!("\n2. Freenet core (Fred):");
    let fred_dir = settings.fred_dir();
    if !fred_dir.is_dir() {
        println!("   ❌ Missing fred checkout - run 'git submodule update --init'");
    } else {
        println!("   ✅ Fred checkout exists");
        diagnose_paths(&fred_dir, &fred::expected_artifacts(), "build artifacts");
        diagnose_paths(&fred_dir, &fred::expected_aliases(), "dependency aliases");
    }

    println!("\n3. Plugin analysis:");
    let plugins = registry::discover(&settings.projects_dir())?;
    for plugin in &plugins {
        println!("   {}:", plugin.name);
        match plugin.kind {
            Some(BuildKind::Gradle) => {
                println!("     - Type: Gradle plugin");
                let wrapper = plugin.dir.join("gradlew").exists();
                println!("     - Wrapper: {}", if wrapper { "✅" } else { "❌ (installed during builds)" });
            }
            Some(BuildKind::Ant) => {
                println!("     - Type: Ant plugin");
                diagnose_ant_descriptor(&plugin.dir);
            }
            None => println!("     - Type: no build descriptor ❌"),
        }
    }

    println!("\n4. Recommendations:");
    println!("   - Run 'fredbuild fred' to build the shared core first");
    println!("   - Run 'fredbuild build --verbose' to see subprocess output for failures");
    println!("   - Plugins listed in {:?} compile the shared db4o source", rules::ANT_PLUGINS_NEEDING_DB4O);
    Ok(())
}

fn java_version(runner: &SystemRunner) -> String {
    let result = runner.run(&["java".to_string(), "-version".to_string()], None);
    if result.succeeded() {
        result.output.lines().next().unwrap_or("unknown").to_string()
    } else {
        "not found ❌".to_string()
    }
}

fn diagnose_paths(base: &Path, paths: &[PathBuf], label: &str) {
    if paths.iter().all(|p| base.join(p).exists()) {
        println!("   ✅ Fred {label} exist");
    } else {
        println!("   ❌ Fred {label} missing");
    }
}

fn diagnose_ant_descriptor(dir: &Path) {
    let Ok(content) = fs::read_to_string(dir.join("build.xml")) else {
        println!("     - build.xml: unreadable ❌");
        return;
    };

    let needs_fred =
        content.contains("freenet-cvs-snapshot") || content.contains("freenet.jar");
    println!(
        "     - Freenet deps: {}",
        if needs_fred { "required" } else { "none ✅" }
    );

    let source_version = regex::Regex::new(r#"name="source-version"\s+value="([^"]+)""#)
        .ok()
        .and_then(|re| {
            re.captures(&content)
                .map(|caps| caps[1].to_string())
        });
    if let Some(version) = source_version {
        let outdated = matches!(version.as_str(), "1.5" | "5" | "1.6" | "6");
        println!(
            "     - Java version: {version} {}",
            if outdated { "❌ (patched during builds)" } else { "✅" }
        );
    }
}
