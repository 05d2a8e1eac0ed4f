//! Sluiced's config defaults & deserializer.
//!
//! All config fields have defaults, so an empty file (or no file at
//! all) is a valid configuration.

use serde::Deserialize;
use std::{error::Error, path::Path};

/// Agent configuration
#[derive(Deserialize, Debug, Default)]
pub struct SluicedConfig {
	/// Logging settings
	#[serde(default)]
	pub logging: SluicedLoggingConfig,

	/// Main-loop settings
	#[serde(default)]
	pub run: SluicedRunConfig,
}

/// Logging configuration
#[derive(Deserialize, Debug)]
pub struct SluicedLoggingConfig {
	/// Tracing filter directives
	#[serde(default = "SluicedLoggingConfig::default_filter")]
	pub filter: String,
}

impl SluicedLoggingConfig {
	fn default_filter() -> String {
		"info,sluice_engine=debug".into()
	}
}

impl Default for SluicedLoggingConfig {
	fn default() -> Self {
		Self {
			filter: Self::default_filter(),
		}
	}
}

/// Main-loop configuration
#[derive(Deserialize, Debug)]
pub struct SluicedRunConfig {
	/// How many iterations to drive
	#[serde(default = "SluicedRunConfig::default_iterations")]
	pub iterations: usize,

	/// Iterations run without a write transaction
	/// (`recompute_allowed = false`)
	#[serde(default = "SluicedRunConfig::default_readonly_iterations")]
	pub readonly_iterations: Vec<usize>,

	/// Trigger a full recompute at this iteration
	#[serde(default = "SluicedRunConfig::default_force_at")]
	pub force_at: Option<usize>,

	/// The chassis this agent derives flows for
	#[serde(default = "SluicedRunConfig::default_chassis")]
	pub chassis: String,
}

impl SluicedRunConfig {
	fn default_iterations() -> usize {
		7
	}

	fn default_readonly_iterations() -> Vec<usize> {
		vec![2]
	}

	fn default_force_at() -> Option<usize> {
		Some(5)
	}

	fn default_chassis() -> String {
		"chassis-1".into()
	}
}

impl Default for SluicedRunConfig {
	fn default() -> Self {
		Self {
			iterations: Self::default_iterations(),
			readonly_iterations: Self::default_readonly_iterations(),
			force_at: Self::default_force_at(),
			chassis: Self::default_chassis(),
		}
	}
}

impl SluicedConfig {
	/// Load a config from a file.
	pub fn load_from_file(config_path: &Path) -> Result<Self, Box<dyn Error>> {
		let config_string = std::fs::read_to_string(config_path)?;
		let config: Self = toml::from_str(&config_string)?;
		Ok(config)
	}
}
