use anyhow::Result;
mod rocksdb_store;

use crate::rocksdb_store::RocksDbStore;
use harness::config::ServerConfig;
use harness::server::{ init_tracing, run_server };
use tracing::info;

const DEFAULT_PORT: u16 = 3003;

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();
	info!("Starting RocksDB benchmark");

	let config = ServerConfig::from_env(DEFAULT_PORT)?;
	let data_dir = config.ensure_data_dir()?;
	let store = RocksDbStore::open(data_dir.join("rocksdb-benchmark"))?;

	run_server(store, &config).await?;

	Ok(())
}
