use std::sync::Arc;

use anyhow::Result;
use axum::{
	extract::{ Query, State },
	http::StatusCode,
	response::{ IntoResponse, Response },
	routing::get,
	Json,
	Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{ debug, error, info };
use tracing_subscriber::EnvFilter;

use crate::{
	benchmark::{ BenchmarkRunner, FullBenchmarkParams, StressBenchmarkParams },
	config::ServerConfig,
	error::HarnessError,
	models::{ BenchmarkResult, StressResult },
	storage::StorageAdapter,
};

// Shared state for the API
pub struct AppState<T: StorageAdapter + 'static> {
	pub runner: BenchmarkRunner<T>,
	pub results: Mutex<Option<BenchmarkResult>>,
	// Held for the whole of a pass so two requests never interleave against one backend
	pass_lock: Mutex<()>,
}

impl<T: StorageAdapter + 'static> AppState<T> {
	pub fn new(runner: BenchmarkRunner<T>) -> Self {
		Self {
			runner,
			results: Mutex::new(None),
			pass_lock: Mutex::new(()),
		}
	}
}

/// Install the global `tracing` subscriber, honoring `RUST_LOG` (default `info`).
///
/// Returns `false` when a subscriber was already installed; the existing one stays in place.
pub fn init_tracing() -> bool {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	match tracing_subscriber::fmt().with_env_filter(filter).try_init() {
		Ok(()) => true,
		Err(e) => {
			debug!("Tracing subscriber already installed: {}", e);
			false
		}
	}
}

pub fn router<T: StorageAdapter + 'static>(state: Arc<AppState<T>>) -> Router {
	Router::new()
		.route("/", get(root_handler))
		.route("/benchmark", get(full_benchmark_handler::<T>))
		.route("/benchmark/stress", get(stress_benchmark_handler::<T>))
		.route("/results", get(results_handler::<T>))
		.with_state(state)
}

// Run the API server with the provided adapter
pub async fn run_server<T: StorageAdapter + 'static>(adapter: T, config: &ServerConfig) -> Result<()> {
	adapter.init().await?;
	info!(database = %adapter.database_name(), "Adapter initialized");

	let state = Arc::new(AppState::new(BenchmarkRunner::new(Arc::new(adapter))));
	let app = router(state);

	let addr = config.socket_addr();
	info!("Server listening on {}", addr);

	let listener = TcpListener::bind(addr).await?;
	axum::serve(listener, app).await?;

	Ok(())
}

/// Error body returned for any failed pass.
#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	message: String,
}

impl From<anyhow::Error> for ApiError {
	fn from(err: anyhow::Error) -> Self {
		let status = match err.downcast_ref::<HarnessError>() {
			Some(HarnessError::EmptyCollection(_)) => StatusCode::UNPROCESSABLE_ENTITY,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};
		Self { status, message: format!("{:#}", err) }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(json!({ "error": self.message }))).into_response()
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct FullBenchmarkQuery {
	count: Option<String>,
	#[serde(rename = "postsPerUser")]
	posts_per_user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StressBenchmarkQuery {
	iterations: Option<String>,
	batch: Option<String>,
}

// Root handler
async fn root_handler() -> &'static str {
	"Storage Benchmark API. Use /benchmark?count=&postsPerUser= for a full pass, /benchmark/stress?iterations=&batch= for a stress pass and /results for the last full pass."
}

async fn full_benchmark_handler<T: StorageAdapter + 'static>(
	State(state): State<Arc<AppState<T>>>,
	Query(query): Query<FullBenchmarkQuery>
) -> Result<Json<BenchmarkResult>, ApiError> {
	let params = FullBenchmarkParams::from_raw(query.count.as_deref(), query.posts_per_user.as_deref());
	info!(count = params.count, posts_per_user = params.posts_per_user, "Running full benchmark");

	let _pass = state.pass_lock.lock().await;
	let result = state.runner.run_full(params).await.map_err(|e| {
		error!("Full benchmark failed: {:?}", e);
		ApiError::from(e)
	})?;

	*state.results.lock().await = Some(result.clone());
	info!(total_time = result.total_time, "Full benchmark finished");
	Ok(Json(result))
}

async fn stress_benchmark_handler<T: StorageAdapter + 'static>(
	State(state): State<Arc<AppState<T>>>,
	Query(query): Query<StressBenchmarkQuery>
) -> Result<Json<StressResult>, ApiError> {
	let params = StressBenchmarkParams::from_raw(query.iterations.as_deref(), query.batch.as_deref());
	info!(iterations = params.iterations, batch_size = params.batch_size, "Running stress benchmark");

	let _pass = state.pass_lock.lock().await;
	let result = state.runner.run_stress(params).await.map_err(|e| {
		error!("Stress benchmark failed: {:?}", e);
		ApiError::from(e)
	})?;

	info!("Stress benchmark finished");
	Ok(Json(result))
}

// Results handler
async fn results_handler<T: StorageAdapter + 'static>(
	State(state): State<Arc<AppState<T>>>
) -> Result<Json<BenchmarkResult>, StatusCode> {
	let results = state.results.lock().await;

	match &*results {
		Some(result) => Ok(Json(result.clone())),
		None => Err(StatusCode::NOT_FOUND),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::EntityKind;

	#[test]
	fn tracing_installs_once() {
		init_tracing();
		assert!(!init_tracing());
	}

	#[test]
	fn empty_collection_maps_to_unprocessable() {
		let err = ApiError::from(anyhow::Error::from(HarnessError::EmptyCollection(EntityKind::Users)));
		assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
		assert!(err.message.contains("users"));
	}

	#[test]
	fn other_failures_map_to_internal_error() {
		let err = ApiError::from(anyhow::anyhow!("disk full"));
		assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn query_strings_stay_raw_until_parsed() {
		let query: FullBenchmarkQuery = serde_json
			::from_value(json!({ "count": "12abc", "postsPerUser": "-1" }))
			.unwrap();
		let params = FullBenchmarkParams::from_raw(query.count.as_deref(), query.posts_per_user.as_deref());
		assert_eq!(params, FullBenchmarkParams { count: 12, posts_per_user: 3 });
	}
}
