//! The fixed, ordered set of read queries timed in every full pass.

use anyhow::Result;
use rand::Rng;
use serde::ser::{ Serialize, SerializeMap, Serializer };

use crate::benchmark::{ measure, throughput };
use crate::error::HarnessError;
use crate::models::{ EntityKind, Field, RecordId };
use crate::predicate::{ Pattern, Predicate };
use crate::storage::{ AggregateRow, Aggregation, JoinSpec, Reducer, StorageAdapter };

pub const ADULT_AGE: i64 = 30;
pub const SORT_LIMIT: usize = 100;
pub const PAGE_OFFSET: usize = 50;
pub const PAGE_LIMIT: usize = 50;
pub const JOIN_LIMIT: usize = 20;
pub const POPULAR_LIKES: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteQuery {
	AgeRange,
	EmailDomain,
	ComplexQuery,
	SortQuery,
	Aggregation,
	Pagination,
	Count,
	UserPosts,
	JoinQuery,
	PopularPosts,
}

/// Execution order of the suite.
pub const QUERY_SUITE: [SuiteQuery; 10] = [
	SuiteQuery::AgeRange,
	SuiteQuery::EmailDomain,
	SuiteQuery::ComplexQuery,
	SuiteQuery::SortQuery,
	SuiteQuery::Aggregation,
	SuiteQuery::Pagination,
	SuiteQuery::Count,
	SuiteQuery::UserPosts,
	SuiteQuery::JoinQuery,
	SuiteQuery::PopularPosts,
];

impl SuiteQuery {
	pub fn name(self) -> &'static str {
		match self {
			Self::AgeRange => "ageRange",
			Self::EmailDomain => "emailDomain",
			Self::ComplexQuery => "complexQuery",
			Self::SortQuery => "sortQuery",
			Self::Aggregation => "aggregation",
			Self::Pagination => "pagination",
			Self::Count => "count",
			Self::UserPosts => "userPosts",
			Self::JoinQuery => "joinQuery",
			Self::PopularPosts => "popularPosts",
		}
	}

	/// Run the query once against `adapter`, timing only the query itself.
	pub async fn run<A: StorageAdapter + ?Sized>(self, adapter: &A) -> Result<QueryMetrics> {
		let users = EntityKind::Users;

		match self {
			Self::AgeRange => {
				let adults = Predicate::gte(Field::Age, ADULT_AGE);
				rows(measure(|| adapter.find(users, &adults)).await?)
			}
			Self::EmailDomain => {
				let gmail = Pattern::EndsWith("@gmail.com".to_string());
				rows(measure(|| adapter.find_by_pattern(users, Field::Email, gmail)).await?)
			}
			Self::ComplexQuery => {
				let predicate = complex_predicate();
				rows(measure(|| adapter.find_compound(users, &predicate)).await?)
			}
			Self::SortQuery => {
				let keys = [Field::Age, Field::Name];
				rows(measure(|| adapter.find_sorted(users, &keys, SORT_LIMIT)).await?)
			}
			Self::Aggregation => {
				let aggregations = age_summary();
				let (result, time) = measure(|| adapter.aggregate(users, &aggregations)).await?;
				Ok(QueryMetrics::Aggregate { result, time })
			}
			Self::Pagination => {
				rows(measure(|| adapter.find_page(users, PAGE_OFFSET, PAGE_LIMIT)).await?)
			}
			Self::Count => {
				let adults = Predicate::gte(Field::Age, ADULT_AGE);
				let (count, time) = measure(|| adapter.count(users, &adults)).await?;
				Ok(QueryMetrics::Count { count, time })
			}
			Self::UserPosts => {
				let user_id = pick_random_user(adapter).await?;
				rows(
					measure(|| adapter.find_related(users, EntityKind::Posts, &user_id)).await?
				)
			}
			Self::JoinQuery => {
				let spec = users_with_posts();
				rows(measure(|| adapter.join_lookup(&spec)).await?)
			}
			Self::PopularPosts => {
				let spec = popular_posts_with_author();
				rows(measure(|| adapter.join_lookup_inverse(&spec)).await?)
			}
		}
	}
}

fn rows<T>((records, time): (Vec<T>, u64)) -> Result<QueryMetrics> {
	let count = records.len() as u64;
	Ok(QueryMetrics::Rows {
		count,
		time,
		throughput: throughput(count, time),
	})
}

pub fn complex_predicate() -> Predicate {
	Predicate::And(
		vec![
			Predicate::between(Field::Age, 25, 50),
			Predicate::Or(
				vec![
					Predicate::ends_with(Field::Email, "@gmail.com"),
					Predicate::ends_with(Field::Email, "@yahoo.com")
				]
			)
		]
	)
}

pub fn age_summary() -> Vec<Aggregation> {
	vec![
		Aggregation::new("avgAge", Reducer::Avg(Field::Age)),
		Aggregation::new("minAge", Reducer::Min(Field::Age)),
		Aggregation::new("maxAge", Reducer::Max(Field::Age)),
		Aggregation::new("totalUsers", Reducer::Count)
	]
}

pub fn users_with_posts() -> JoinSpec {
	JoinSpec {
		primary: EntityKind::Users,
		filter: Predicate::gte(Field::Age, ADULT_AGE),
		limit: JOIN_LIMIT,
		related: EntityKind::Posts,
		local_key: Field::Id,
		foreign_key: Field::UserId,
	}
}

pub fn popular_posts_with_author() -> JoinSpec {
	JoinSpec {
		primary: EntityKind::Posts,
		filter: Predicate::gte(Field::Likes, POPULAR_LIKES),
		limit: JOIN_LIMIT,
		related: EntityKind::Users,
		local_key: Field::UserId,
		foreign_key: Field::Id,
	}
}

/// Uniformly pick one existing user. Not timed.
pub async fn pick_random_user<A: StorageAdapter + ?Sized>(adapter: &A) -> Result<RecordId> {
	let total = adapter.count(EntityKind::Users, &Predicate::All).await?;
	if total == 0 {
		return Err(HarnessError::EmptyCollection(EntityKind::Users).into());
	}

	let offset = rand::thread_rng().gen_range(0..total) as usize;
	let page = adapter.find_page(EntityKind::Users, offset, 1).await?;
	match page.first() {
		Some(record) => Ok(record.id().clone()),
		None => Err(HarnessError::EmptyCollection(EntityKind::Users).into()),
	}
}

/// Metrics of one suite query. Serializes to `{count, time, throughput?}`,
/// `{result, time}` or `{count, time}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum QueryMetrics {
	Rows {
		count: u64,
		time: u64,
		#[serde(skip_serializing_if = "Option::is_none")]
		throughput: Option<u64>,
	},
	Aggregate {
		result: AggregateRow,
		time: u64,
	},
	Count {
		count: u64,
		time: u64,
	},
}

impl QueryMetrics {
	pub fn time(&self) -> u64 {
		match self {
			Self::Rows { time, .. } | Self::Aggregate { time, .. } | Self::Count { time, .. } => *time,
		}
	}

	pub fn count(&self) -> Option<u64> {
		match self {
			Self::Rows { count, .. } | Self::Count { count, .. } => Some(*count),
			Self::Aggregate { .. } => None,
		}
	}
}

/// Suite results in execution order; serializes as a JSON object keyed by query name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResults(Vec<(SuiteQuery, QueryMetrics)>);

impl QueryResults {
	pub fn push(&mut self, query: SuiteQuery, metrics: QueryMetrics) {
		self.0.push((query, metrics));
	}

	pub fn get(&self, query: SuiteQuery) -> Option<&QueryMetrics> {
		self.0
			.iter()
			.find(|(q, _)| *q == query)
			.map(|(_, metrics)| metrics)
	}

	pub fn iter(&self) -> impl Iterator<Item = &(SuiteQuery, QueryMetrics)> {
		self.0.iter()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn total_time(&self) -> u64 {
		self.0
			.iter()
			.map(|(_, metrics)| metrics.time())
			.sum()
	}
}

impl Serialize for QueryResults {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.0.len()))?;
		for (query, metrics) in &self.0 {
			map.serialize_entry(query.name(), metrics)?;
		}
		map.end()
	}
}

/// Run every suite query once, in order.
pub async fn run_suite<A: StorageAdapter + ?Sized>(adapter: &A) -> Result<QueryResults> {
	let mut results = QueryResults::default();
	for query in QUERY_SUITE {
		let metrics = query.run(adapter).await?;
		tracing::debug!(query = query.name(), time_ms = metrics.time(), count = ?metrics.count(), "query finished");
		results.push(query, metrics);
	}
	Ok(results)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn suite_order_is_fixed() {
		let names: Vec<_> = QUERY_SUITE.iter()
			.map(|q| q.name())
			.collect();
		assert_eq!(
			names,
			vec![
				"ageRange",
				"emailDomain",
				"complexQuery",
				"sortQuery",
				"aggregation",
				"pagination",
				"count",
				"userPosts",
				"joinQuery",
				"popularPosts"
			]
		);
	}

	#[test]
	fn results_serialize_in_execution_order() {
		let mut results = QueryResults::default();
		results.push(SuiteQuery::SortQuery, QueryMetrics::Rows { count: 100, time: 4, throughput: Some(25_000) });
		results.push(SuiteQuery::Count, QueryMetrics::Count { count: 7, time: 0 });
		let mut row = AggregateRow::default();
		row.insert("totalUsers", serde_json::json!(50));
		results.push(SuiteQuery::Aggregation, QueryMetrics::Aggregate { result: row, time: 2 });

		let json = serde_json::to_string(&results).unwrap();
		assert_eq!(
			json,
			r#"{"sortQuery":{"count":100,"time":4,"throughput":25000},"count":{"count":7,"time":0},"aggregation":{"result":{"totalUsers":50},"time":2}}"#
		);
		assert_eq!(results.total_time(), 6);
	}

	#[test]
	fn zero_time_rows_omit_throughput() {
		let metrics = rows((vec![1, 2, 3], 0)).unwrap();
		let json = serde_json::to_value(&metrics).unwrap();
		assert_eq!(json, serde_json::json!({ "count": 3, "time": 0 }));
	}

	#[test]
	fn join_specs_are_consistent() {
		assert!(users_with_posts().check().is_ok());
		assert!(popular_posts_with_author().check().is_ok());
	}
}
