//! Configuration for fredbuild

mod settings;
pub mod rules;

pub use settings::Settings;
