//! fredbuild - dependency-aware meta-build orchestration for Freenet plugin trees
//!
//! This crate provides functionality to:
//! - Discover plugin sub-projects and classify them by build system
//! - Build the shared Freenet core (Fred) once and alias its artifacts
//! - Provision per-plugin build environments (wrappers, patches, shared
//!   libraries) and reverse every change afterwards
//! - Drive the Gradle/Ant builds sequentially and collect produced jars

pub mod collect;
pub mod config;
pub mod deps;
pub mod error;
pub mod executor;
pub mod fred;
pub mod fsutil;
pub mod orchestrator;
pub mod patch;
pub mod process;
pub mod provision;
pub mod registry;

// Re-export commonly used types
pub use config::Settings;
pub use error::{Error, Result};
pub use executor::{BuildExecutor, BuildOutcome};
pub use orchestrator::{Orchestrator, RunSummary};
pub use process::{LAUNCH_FAILED, ProcessRunner, RunResult, SystemRunner};
pub use registry::{BuildKind, PluginDescriptor};
