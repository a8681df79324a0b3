use std::env;
use std::net::{ IpAddr, Ipv4Addr, SocketAddr };
use std::path::PathBuf;

use thiserror::Error;

pub const HOST_VAR: &str = "BENCH_HOST";
pub const PORT_VAR: &str = "BENCH_PORT";
pub const DATA_DIR_VAR: &str = "BENCH_DATA_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("{var} must be an IP address, got {value:?}")]
	InvalidHost {
		var: &'static str,
		value: String,
	},

	#[error("{var} must be a port number, got {value:?}")]
	InvalidPort {
		var: &'static str,
		value: String,
	},

	#[error("cannot create data directory {path:?}: {source}")]
	DataDir {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Where a backend binary listens and keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
	pub host: IpAddr,
	pub port: u16,
	pub data_dir: PathBuf,
}

impl ServerConfig {
	pub fn new(default_port: u16) -> Self {
		Self {
			host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
			port: default_port,
			data_dir: PathBuf::from("./data"),
		}
	}

	/// Read `.env` (if any) and the `BENCH_*` variables on top of the defaults.
	pub fn from_env(default_port: u16) -> Result<Self, ConfigError> {
		dotenvy::dotenv().ok();
		Self::from_lookup(default_port, |var| env::var(var).ok())
	}

	pub fn from_lookup<F>(default_port: u16, lookup: F) -> Result<Self, ConfigError>
		where F: Fn(&str) -> Option<String>
	{
		let mut config = Self::new(default_port);

		if let Some(value) = lookup(HOST_VAR) {
			config.host = match value.trim().parse() {
				Ok(host) => host,
				Err(_) => {
					return Err(ConfigError::InvalidHost { var: HOST_VAR, value });
				}
			};
		}
		if let Some(value) = lookup(PORT_VAR) {
			config.port = match value.trim().parse() {
				Ok(port) => port,
				Err(_) => {
					return Err(ConfigError::InvalidPort { var: PORT_VAR, value });
				}
			};
		}
		if let Some(value) = lookup(DATA_DIR_VAR) {
			config.data_dir = PathBuf::from(value);
		}

		Ok(config)
	}

	pub fn socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.host, self.port)
	}

	/// Create the data directory if it does not exist yet.
	pub fn ensure_data_dir(&self) -> Result<&PathBuf, ConfigError> {
		std::fs
			::create_dir_all(&self.data_dir)
			.map_err(|source| ConfigError::DataDir { path: self.data_dir.clone(), source })?;
		Ok(&self.data_dir)
	}
}
