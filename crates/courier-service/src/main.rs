//! Main entry point for the courier engine service.
//!
//! This binary wires the lifecycle engine to its backing services: a
//! storage backend chosen from configuration, an agent directory seeded
//! from the same file, and the payment ledger. It then recovers persisted
//! state and runs the engine until interrupted.

use clap::Parser;
use courier_config::{AgentSeed, Config};
use courier_core::LifecycleEngine;
use courier_directory::{DirectoryService, InMemoryDirectory};
use courier_ledger::LedgerService;
use courier_storage::implementations::file::FileStorage;
use courier_storage::implementations::memory::MemoryStorage;
use courier_storage::{StorageInterface, StorageService};
use courier_types::{DeliveryAgent, VehicleKind};
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line arguments for the courier service.
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

/// Main entry point for the courier service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the engine over the configured backends
/// 5. Recovers persisted state and runs until interrupted
#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config)?;
	tracing::info!("Loaded configuration [{}]", config.engine.id);

	let storage = Arc::new(StorageService::new(create_storage(&config)?));

	let directory = InMemoryDirectory::new();
	for seed in &config.directory.agents {
		directory.upsert(agent_from_seed(seed)?);
	}
	tracing::info!(
		agents = config.directory.agents.len(),
		"Seeded agent directory"
	);

	let ledger = Arc::new(LedgerService::new(storage.clone()));
	let engine = LifecycleEngine::new(
		config.engine.clone(),
		config.feed.clone(),
		storage,
		Arc::new(DirectoryService::new(Box::new(directory))),
		ledger.clone(),
	);

	let recovered = engine.recover().await?;
	tracing::info!(orders = recovered, "Recovered persisted orders");

	// Repair ledger entries missed by a crash mid-delivery
	let repaired = ledger.backfill().await?;
	if repaired > 0 {
		tracing::warn!(records = repaired, "Backfilled missing ledger entries");
	}

	engine.run().await?;
	tracing::info!("Stopped engine");
	Ok(())
}

/// Builds the storage backend named in the configuration.
fn create_storage(config: &Config) -> anyhow::Result<Box<dyn StorageInterface>> {
	match config.storage.backend.as_str() {
		"memory" => Ok(Box::new(MemoryStorage::new())),
		"file" => {
			let path = config
				.storage
				.get_str("storage_path")
				.unwrap_or("./data/courier");
			Ok(Box::new(FileStorage::new(PathBuf::from(path))))
		}
		// Unreachable after Config::validate, kept for exhaustiveness
		other => anyhow::bail!("unknown storage backend: {}", other),
	}
}

/// Converts a configuration agent entry into a directory record.
fn agent_from_seed(seed: &AgentSeed) -> anyhow::Result<DeliveryAgent> {
	let vehicle = match seed.vehicle.as_str() {
		"bicycle" => VehicleKind::Bicycle,
		"motorbike" => VehicleKind::Motorbike,
		"car" => VehicleKind::Car,
		other => anyhow::bail!("unknown vehicle kind: {}", other),
	};
	Ok(DeliveryAgent {
		id: seed.id.clone(),
		name: seed.name.clone(),
		phone: seed.phone.clone(),
		vehicle,
		vehicle_no: seed.vehicle_no.clone(),
		active: seed.active,
	})
}
