use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::HarnessError;
use crate::memory::MemorySnapshot;
use crate::models::{ Batch, EntityKind, Field, FieldValue, Joined, Record, RecordId, Value };
use crate::predicate::{ CompareOp, Pattern, Predicate };

/// The one relationship in the data model: posts reference their author.
pub fn relation_key(parent: EntityKind, child: EntityKind) -> Result<Field, HarnessError> {
	match (parent, child) {
		(EntityKind::Users, EntityKind::Posts) => Ok(Field::UserId),
		_ => Err(HarnessError::NoRelationship { parent, child }),
	}
}

/// Filtered, limited primary rows joined to related rows on `local_key = foreign_key`.
#[derive(Debug, Clone)]
pub struct JoinSpec {
	pub primary: EntityKind,
	pub filter: Predicate,
	pub limit: usize,
	pub related: EntityKind,
	pub local_key: Field,
	pub foreign_key: Field,
}

impl JoinSpec {
	pub fn check(&self) -> Result<(), HarnessError> {
		self.filter.check(self.primary)?;
		self.local_key.check(self.primary)?;
		self.foreign_key.check(self.related)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
	Avg(Field),
	Min(Field),
	Max(Field),
	Sum(Field),
	Count,
}

impl Reducer {
	pub fn field(self) -> Option<Field> {
		match self {
			Self::Avg(field) | Self::Min(field) | Self::Max(field) | Self::Sum(field) => Some(field),
			Self::Count => None,
		}
	}
}

/// A reducer and the name its output is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
	pub alias: String,
	pub reducer: Reducer,
}

impl Aggregation {
	pub fn new(alias: &str, reducer: Reducer) -> Self {
		Self { alias: alias.to_string(), reducer }
	}
}

pub fn check_aggregations(kind: EntityKind, aggregations: &[Aggregation]) -> Result<(), HarnessError> {
	aggregations
		.iter()
		.filter_map(|a| a.reducer.field())
		.try_for_each(|field| field.check_numeric(kind))
}

/// Single summary row produced by [`StorageAdapter::aggregate`].
///
/// Averages are floats, the other reducers integers. Reducers over an empty set yield
/// `null`, except `Count` and `Sum` which yield 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregateRow(BTreeMap<String, JsonValue>);

impl AggregateRow {
	pub fn insert(&mut self, alias: impl Into<String>, value: JsonValue) {
		self.0.insert(alias.into(), value);
	}

	pub fn get(&self, alias: &str) -> Option<&JsonValue> {
		self.0.get(alias)
	}

	pub fn get_i64(&self, alias: &str) -> Option<i64> {
		self.get(alias).and_then(JsonValue::as_i64)
	}

	pub fn get_f64(&self, alias: &str) -> Option<f64> {
		self.get(alias).and_then(JsonValue::as_f64)
	}

	/// Evaluate reducers over already-decoded records.
	pub fn reduce<'a, I>(records: I, aggregations: &[Aggregation]) -> Self
		where I: IntoIterator<Item = &'a Record>
	{
		let mut states: Vec<ReducerState> = aggregations
			.iter()
			.map(|_| ReducerState::default())
			.collect();

		for record in records {
			for (state, aggregation) in states.iter_mut().zip(aggregations) {
				match aggregation.reducer.field() {
					None => state.push(0),
					Some(field) => {
						if let Some(FieldValue::Int(value)) = record.field(field) {
							state.push(value);
						}
					}
				}
			}
		}

		let mut row = Self::default();
		for (state, aggregation) in states.into_iter().zip(aggregations) {
			row.insert(aggregation.alias.clone(), state.finish(aggregation.reducer));
		}
		row
	}
}

#[derive(Default)]
struct ReducerState {
	count: u64,
	sum: i64,
	min: Option<i64>,
	max: Option<i64>,
}

impl ReducerState {
	fn push(&mut self, value: i64) {
		self.count += 1;
		self.sum += value;
		self.min = Some(self.min.map_or(value, |m| m.min(value)));
		self.max = Some(self.max.map_or(value, |m| m.max(value)));
	}

	fn finish(self, reducer: Reducer) -> JsonValue {
		match reducer {
			Reducer::Count => JsonValue::from(self.count),
			Reducer::Sum(_) => JsonValue::from(self.sum),
			Reducer::Min(_) => self.min.map_or(JsonValue::Null, JsonValue::from),
			Reducer::Max(_) => self.max.map_or(JsonValue::Null, JsonValue::from),
			Reducer::Avg(_) if self.count == 0 => JsonValue::Null,
			Reducer::Avg(_) => JsonValue::from((self.sum as f64) / (self.count as f64)),
		}
	}
}

/// Set `field` to `value` on every matching row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdate {
	pub field: Field,
	pub value: Value,
}

impl FieldUpdate {
	pub fn new(field: Field, value: impl Into<Value>) -> Self {
		Self { field, value: value.into() }
	}
}

/// Identifiers, the author reference and the creation time are never rewritten.
pub fn check_updates(kind: EntityKind, changes: &[FieldUpdate]) -> Result<(), HarnessError> {
	for change in changes {
		change.field.check(kind)?;
		let assignable = match (&change.value, change.field) {
			(_, Field::Id | Field::UserId | Field::CreatedAt) => false,
			(Value::Int(_), field) => field.is_numeric(),
			(Value::Text(_), field) => !field.is_numeric(),
		};
		if !assignable {
			return Err(HarnessError::InvalidAssignment {
				kind,
				field: change.field,
				value: change.value.clone(),
			});
		}
	}
	Ok(())
}

/// The operations a backend has to provide for the benchmark to drive it.
///
/// Implementations translate each call into their native query language. Errors are
/// returned as-is; callers never retry.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
	/// Create schema, column families or whatever else the backend needs
	async fn init(&self) -> Result<()>;

	/// Label reported in every result
	fn database_name(&self) -> String;

	/// Remove every record of `kind`. Clearing an empty collection is a no-op.
	async fn clear(&self, kind: EntityKind) -> Result<()>;

	/// Insert the whole batch, returning the assigned ids in batch order
	async fn bulk_insert(&self, batch: Batch) -> Result<Vec<RecordId>>;

	/// Records of `kind` matching `predicate`
	async fn find(&self, kind: EntityKind, predicate: &Predicate) -> Result<Vec<Record>>;

	async fn find_all(&self, kind: EntityKind) -> Result<Vec<Record>> {
		self.find(kind, &Predicate::All).await
	}

	async fn find_by_range(
		&self,
		kind: EntityKind,
		field: Field,
		op: CompareOp,
		bound: i64
	) -> Result<Vec<Record>> {
		self.find(kind, &Predicate::compare(field, op, bound)).await
	}

	async fn find_between(
		&self,
		kind: EntityKind,
		field: Field,
		low: i64,
		high: i64
	) -> Result<Vec<Record>> {
		self.find(kind, &Predicate::between(field, low, high)).await
	}

	async fn find_by_pattern(
		&self,
		kind: EntityKind,
		field: Field,
		pattern: Pattern
	) -> Result<Vec<Record>> {
		self.find(kind, &Predicate::Like { field, pattern }).await
	}

	async fn find_compound(&self, kind: EntityKind, predicate: &Predicate) -> Result<Vec<Record>> {
		self.find(kind, predicate).await
	}

	/// All records ordered ascending by each key in turn, at most `limit` of them
	async fn find_sorted(
		&self,
		kind: EntityKind,
		keys: &[Field],
		limit: usize
	) -> Result<Vec<Record>>;

	/// A window of records in the backend's natural order
	async fn find_page(&self, kind: EntityKind, offset: usize, limit: usize) -> Result<Vec<Record>>;

	async fn count(&self, kind: EntityKind, predicate: &Predicate) -> Result<u64>;

	async fn aggregate(&self, kind: EntityKind, aggregations: &[Aggregation]) -> Result<AggregateRow>;

	/// Children of `parent_id` along the parent/child relationship
	async fn find_related(
		&self,
		parent: EntityKind,
		child: EntityKind,
		parent_id: &RecordId
	) -> Result<Vec<Record>> {
		let key = relation_key(parent, child)?;
		self.find(child, &Predicate::equals(key, parent_id)).await
	}

	/// Every primary row with all of its related rows (possibly none)
	async fn join_lookup(&self, spec: &JoinSpec) -> Result<Vec<Joined>>;

	/// Every primary row with exactly one related row; rows without a match are dropped
	async fn join_lookup_inverse(&self, spec: &JoinSpec) -> Result<Vec<Joined>>;

	/// Returns the number of rows changed
	async fn bulk_update(
		&self,
		kind: EntityKind,
		predicate: &Predicate,
		changes: &[FieldUpdate]
	) -> Result<u64>;

	/// Returns the number of rows removed
	async fn bulk_delete(&self, kind: EntityKind, predicate: &Predicate) -> Result<u64>;

	async fn measure_memory(&self) -> Result<MemorySnapshot> {
		MemorySnapshot::current_process()
	}
}
