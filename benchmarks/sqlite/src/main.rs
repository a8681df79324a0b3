use anyhow::Result;
mod sqlite_store;

use crate::sqlite_store::SqliteStore;
use harness::config::ServerConfig;
use harness::server::{ init_tracing, run_server };
use tracing::info;

const DEFAULT_PORT: u16 = 3001;

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();
	info!("Starting SQLite benchmark");

	let config = ServerConfig::from_env(DEFAULT_PORT)?;
	let data_dir = config.ensure_data_dir()?;
	let store = SqliteStore::open(data_dir.join("sqlite-benchmark.db")).await?;
	info!(location = store.location(), "Store opened");

	run_server(store, &config).await?;

	Ok(())
}
