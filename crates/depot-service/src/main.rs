//! Main entry point for the depot lifecycle service.
//!
//! This binary wires the configured storage backend into the lifecycle
//! engine, starts the stale-order sweeper, and serves the transition and
//! audit HTTP API until interrupted.

use clap::Parser;
use depot_config::Config;
use depot_core::LifecycleEngine;
use depot_storage::{StorageInterface, StorageService};
use depot_types::{Clock, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod resolver;
mod server;

use resolver::DirectoryActorResolver;

/// Command-line arguments for the depot service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the depot service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the lifecycle engine over the configured storage backend
/// 5. Runs the engine, and the API server when enabled, until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	// Create env filter with default from args
	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started depot service");

	// Load configuration
	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.depot.id);

	// Build engine with the configured storage backend
	let engine = Arc::new(build_engine(config.clone())?);

	let resolver = Arc::new(DirectoryActorResolver::new(config.operators.clone()));

	// Check if API server should be started
	let api_enabled = config.api.as_ref().is_some_and(|api| api.enabled);

	if api_enabled {
		let api_config = config.api.as_ref().unwrap().clone();
		let api_engine = Arc::clone(&engine);

		// Run both the engine and the API server concurrently
		let engine_task = engine.run();
		let api_task = server::start_server(api_config, api_engine, resolver);

		tokio::select! {
			result = engine_task => {
				tracing::info!("Engine finished");
				result?;
			}
			result = api_task => {
				tracing::info!("API server finished");
				result?;
			}
		}
	} else {
		// Run only the engine
		tracing::info!("Starting engine only");
		engine.run().await?;
	}

	tracing::info!("Stopped depot service");
	Ok(())
}

/// Builds the lifecycle engine over the storage backend named in the
/// configuration.
///
/// The backend's own configuration section is validated against its
/// schema before the engine starts.
fn build_engine(config: Config) -> Result<LifecycleEngine, Box<dyn std::error::Error>> {
	let backend = build_storage(&config)?;
	let storage = Arc::new(StorageService::new(backend));
	let clock: Arc<dyn Clock> = Arc::new(SystemClock);

	Ok(LifecycleEngine::new(config, storage, clock))
}

/// Creates the configured storage backend from the factory registry.
fn build_storage(config: &Config) -> Result<Box<dyn StorageInterface>, Box<dyn std::error::Error>> {
	let name = &config.storage.primary;
	let factory = depot_storage::get_all_implementations()
		.into_iter()
		.find(|(impl_name, _)| *impl_name == name.as_str())
		.map(|(_, factory)| factory)
		.ok_or_else(|| format!("Unknown storage implementation: {}", name))?;

	let section = config
		.storage
		.implementations
		.get(name)
		.ok_or_else(|| format!("Missing configuration for storage implementation: {}", name))?;

	let backend = factory(section)?;
	backend.config_schema().validate(section)?;

	Ok(backend)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_config(primary: &str) -> Config {
		let content = format!(
			r#"
[depot]
id = "depot-test"

[storage]
primary = "{primary}"
[storage.implementations.memory]
"#
		);
		Config::from_toml_str(&content).unwrap()
	}

	#[test]
	fn test_args_default_values() {
		let args = Args {
			config: PathBuf::from("config.toml"),
			log_level: "info".to_string(),
		};

		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_build_storage_memory() {
		let config = test_config("memory");
		assert!(build_storage(&config).is_ok());
	}

	#[test]
	fn test_build_engine_with_memory_storage() {
		let config = test_config("memory");
		let engine = build_engine(config).expect("Failed to build engine");
		assert_eq!(engine.config().depot.id, "depot-test");
	}

	#[tokio::test]
	async fn test_build_engine_with_file_config() {
		let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
		let config_path = temp_dir.path().join("config.toml");
		let data_path = temp_dir.path().join("data");

		let config_content = format!(
			r#"
[depot]
id = "depot-file-test"
lock_wait_ms = 250

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "{}"

[sweeper]
interval_seconds = 120
stale_after_hours = 12

[api]
enabled = true
host = "127.0.0.1"
port = 8080

[operators.op-7]
name = "Dana Ruiz"
email = "dana@depot.example"
role = "dispatcher"
"#,
			data_path.display()
		);

		std::fs::write(&config_path, config_content).expect("Failed to write config");

		let config = Config::from_file(config_path.to_str().unwrap())
			.await
			.expect("Failed to load config");

		assert_eq!(config.depot.id, "depot-file-test");
		assert_eq!(config.depot.lock_wait_ms, 250);
		assert_eq!(config.sweeper.interval_seconds, 120);
		assert!(config.api.as_ref().is_some_and(|api| api.enabled));

		let engine = build_engine(config).expect("Failed to build engine");
		assert_eq!(engine.config().depot.id, "depot-file-test");
	}
}
