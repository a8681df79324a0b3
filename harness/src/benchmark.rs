use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{ debug, instrument };

use crate::error::HarnessError;
use crate::generator::DataGenerator;
use crate::models::{ Batch, BenchmarkResult, EntityKind, Field, SectionMetrics, StressResult };
use crate::predicate::Predicate;
use crate::queries::run_suite;
use crate::stats::calculate_stats;
use crate::storage::{ FieldUpdate, StorageAdapter };

pub const DEFAULT_COUNT: usize = 1000;
pub const DEFAULT_POSTS_PER_USER: usize = 3;
pub const DEFAULT_ITERATIONS: usize = 10;
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Users younger than this are bumped to it by the update step.
pub const UPDATE_AGE_FLOOR: i64 = 25;
/// Users this age or older are removed by the delete step.
pub const DELETE_AGE_FROM: i64 = 65;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullBenchmarkParams {
	pub count: usize,
	pub posts_per_user: usize,
}

impl Default for FullBenchmarkParams {
	fn default() -> Self {
		Self {
			count: DEFAULT_COUNT,
			posts_per_user: DEFAULT_POSTS_PER_USER,
		}
	}
}

impl FullBenchmarkParams {
	/// Build from raw request values, falling back to the defaults for anything unusable.
	pub fn from_raw(count: Option<&str>, posts_per_user: Option<&str>) -> Self {
		Self {
			count: lenient_count(count, DEFAULT_COUNT),
			posts_per_user: lenient_count(posts_per_user, DEFAULT_POSTS_PER_USER),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressBenchmarkParams {
	pub iterations: usize,
	pub batch_size: usize,
}

impl Default for StressBenchmarkParams {
	fn default() -> Self {
		Self {
			iterations: DEFAULT_ITERATIONS,
			batch_size: DEFAULT_BATCH_SIZE,
		}
	}
}

impl StressBenchmarkParams {
	pub fn from_raw(iterations: Option<&str>, batch_size: Option<&str>) -> Self {
		Self {
			iterations: lenient_count(iterations, DEFAULT_ITERATIONS),
			batch_size: lenient_count(batch_size, DEFAULT_BATCH_SIZE),
		}
	}
}

/// Parse the leading integer of `raw`; missing, non-numeric, zero or negative input
/// yields `default`.
pub fn lenient_count(raw: Option<&str>, default: usize) -> usize {
	let Some(raw) = raw else {
		return default;
	};
	let trimmed = raw.trim_start();
	let (negative, digits) = match trimmed.strip_prefix('-') {
		Some(rest) => (true, rest),
		None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
	};
	let end = digits
		.find(|c: char| !c.is_ascii_digit())
		.unwrap_or(digits.len());

	match digits[..end].parse::<usize>() {
		Ok(value) if value > 0 && !negative => value,
		_ => default,
	}
}

/// Records per second, rounded. `None` when the section took no measurable time.
pub fn throughput(count: u64, time_ms: u64) -> Option<u64> {
	if time_ms == 0 {
		return None;
	}
	Some(((count as f64) / ((time_ms as f64) / 1000.0)).round() as u64)
}

/// Await `f()` and return its output with the elapsed whole milliseconds.
pub async fn measure<F, Fut, T>(f: F) -> Result<(T, u64)>
	where F: FnOnce() -> Fut, Fut: Future<Output = Result<T>>
{
	let start = Instant::now();
	let value = f().await?;
	let duration_ms = start.elapsed().as_millis() as u64;
	Ok((value, duration_ms))
}

/// Drives the full and stress passes against one adapter, one section at a time.
pub struct BenchmarkRunner<A: StorageAdapter + ?Sized> {
	adapter: Arc<A>,
	generator: DataGenerator,
}

impl<A: StorageAdapter + ?Sized> BenchmarkRunner<A> {
	pub fn new(adapter: Arc<A>) -> Self {
		Self {
			adapter,
			generator: DataGenerator::default(),
		}
	}

	pub fn with_generator(mut self, generator: DataGenerator) -> Self {
		self.generator = generator;
		self
	}

	pub fn adapter(&self) -> &A {
		&self.adapter
	}

	/// clear → insert → insert related → read → query suite → update → delete.
	#[instrument(skip(self), fields(database = %self.adapter.database_name()))]
	pub async fn run_full(&self, params: FullBenchmarkParams) -> Result<BenchmarkResult> {
		let adapter = self.adapter.as_ref();
		let count = params.count;

		adapter.clear(EntityKind::Posts).await?;
		adapter.clear(EntityKind::Users).await?;

		// Insert
		let users = self.generator.users(count);
		let memory_before = adapter.measure_memory().await?;
		let (user_ids, insert_time) = measure(|| adapter.bulk_insert(Batch::Users(users))).await?;
		let memory_after = adapter.measure_memory().await?;
		let insert = SectionMetrics::counted(count as u64, insert_time).with_memory_used(
			memory_after.heap_used_since(&memory_before)
		);
		debug!(section = "insert", time_ms = insert_time, count, "section finished");

		// Insert related posts; generation is part of the timed section
		let (post_count, insert_related_time) = measure(|| async {
			let posts: Vec<_> = user_ids
				.iter()
				.flat_map(|id| self.generator.posts_for_user(id, params.posts_per_user))
				.collect();
			let post_count = posts.len();
			adapter.bulk_insert(Batch::Posts(posts)).await?;
			Ok(post_count)
		}).await?;
		let insert_related = SectionMetrics::counted(post_count as u64, insert_related_time);
		debug!(section = "insertRelated", time_ms = insert_related_time, count = post_count, "section finished");

		// Read
		let (all_users, read_time) = measure(|| adapter.find_all(EntityKind::Users)).await?;
		let read = SectionMetrics::counted(all_users.len() as u64, read_time);
		debug!(section = "read", time_ms = read_time, count = all_users.len(), "section finished");
		drop(all_users);

		let queries = run_suite(adapter).await?;

		// Update
		let young = Predicate::lt(Field::Age, UPDATE_AGE_FLOOR);
		let floor = [FieldUpdate::new(Field::Age, UPDATE_AGE_FLOOR)];
		let (_, update_time) = measure(|| adapter.bulk_update(EntityKind::Users, &young, &floor)).await?;
		debug!(section = "update", time_ms = update_time, "section finished");

		// Delete
		let senior = Predicate::gte(Field::Age, DELETE_AGE_FROM);
		let (_, delete_time) = measure(|| adapter.bulk_delete(EntityKind::Users, &senior)).await?;
		debug!(section = "delete", time_ms = delete_time, "section finished");

		// insertRelated is not part of the total
		let total_time = insert_time + read_time + queries.total_time() + update_time + delete_time;

		Ok(BenchmarkResult {
			insert,
			insert_related,
			read,
			queries,
			update: SectionMetrics::timed(update_time),
			delete: SectionMetrics::timed(delete_time),
			database: adapter.database_name(),
			total_time,
			timestamp: Utc::now(),
		})
	}

	/// `iterations` × (clear users → insert a batch → read all), summarized.
	#[instrument(skip(self), fields(database = %self.adapter.database_name()))]
	pub async fn run_stress(&self, params: StressBenchmarkParams) -> Result<StressResult> {
		let adapter = self.adapter.as_ref();
		let mut insert_times = Vec::with_capacity(params.iterations);
		let mut read_times = Vec::with_capacity(params.iterations);

		for iteration in 0..params.iterations {
			adapter.clear(EntityKind::Users).await?;

			let users = self.generator.users(params.batch_size);
			let (_, insert_time) = measure(|| adapter.bulk_insert(Batch::Users(users))).await?;
			insert_times.push(insert_time);

			let (_, read_time) = measure(|| adapter.find_all(EntityKind::Users)).await?;
			read_times.push(read_time);

			debug!(iteration, insert_ms = insert_time, read_ms = read_time, "stress iteration finished");
		}

		Ok(StressResult {
			database: adapter.database_name(),
			iterations: params.iterations,
			batch_size: params.batch_size,
			insert_stats: calculate_stats(&insert_times).ok_or(HarnessError::NoSamples)?,
			read_stats: calculate_stats(&read_times).ok_or(HarnessError::NoSamples)?,
		})
	}
}
