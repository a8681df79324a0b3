use anyhow::{ Context, Result };
use async_trait::async_trait;
use harness::{
	models::{ Batch, EntityKind, Field, Joined, Post, Record, RecordId, User, Value },
	predicate::{ CompareOp, Pattern, Predicate },
	storage::{
		check_aggregations,
		check_updates,
		AggregateRow,
		Aggregation,
		FieldUpdate,
		JoinSpec,
		Reducer,
		StorageAdapter,
	},
};
use rusqlite::{ params, params_from_iter, types::Value as SqlValue, Row };
use serde_json::Value as JsonValue;
use std::path::Path;
use std::time::Duration;
use tokio_rusqlite::Connection as AsyncConnection;
use tracing::debug;

const USER_COLUMNS: &[&str] = &["id", "name", "email", "age"];
const POST_COLUMNS: &[&str] = &["id", "user_id", "title", "content", "created_at", "likes"];

fn columns(kind: EntityKind) -> &'static [&'static str] {
	match kind {
		EntityKind::Users => USER_COLUMNS,
		EntityKind::Posts => POST_COLUMNS,
	}
}

fn column_list(kind: EntityKind, alias: &str) -> String {
	columns(kind)
		.iter()
		.map(|column| format!("{}.{}", alias, column))
		.collect::<Vec<_>>()
		.join(", ")
}

/// Relational backend: one `users` and one `posts` table behind a single connection.
pub struct SqliteStore {
	conn: AsyncConnection,
	location: String,
}

impl SqliteStore {
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let location = path.as_ref().display().to_string();
		let conn = AsyncConnection::open(path).await?;
		Self::configure(conn, location, true).await
	}

	pub async fn open_in_memory() -> Result<Self> {
		let conn = AsyncConnection::open_in_memory().await?;
		Self::configure(conn, ":memory:".to_string(), false).await
	}

	async fn configure(conn: AsyncConnection, location: String, file_backed: bool) -> Result<Self> {
		conn.call(move |conn| {
			if file_backed {
				// Both report their resulting value as a row
				conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
				conn.pragma_update_and_check(None, "mmap_size", 30000000000i64, |row| row.get::<_, i64>(0))?;
			}
			conn.busy_timeout(Duration::from_millis(5000))?;
			conn.pragma_update(None, "synchronous", "NORMAL")?;
			conn.pragma_update(None, "cache_size", 100000)?;
			// The author reference is informational only; users delete without cascading
			conn.pragma_update(None, "foreign_keys", false)?;
			// LIKE matches byte-for-byte like the document store does
			conn.pragma_update(None, "case_sensitive_like", true)?;
			Ok(())
		}).await?;

		debug!(%location, "SQLite connection configured");
		Ok(Self { conn, location })
	}

	pub fn location(&self) -> &str {
		&self.location
	}

	async fn query_records(&self, kind: EntityKind, sql: String, params: Vec<SqlValue>) -> Result<Vec<Record>> {
		let records = self.conn.call(move |conn| {
			let mut stmt = conn.prepare(&sql)?;
			let records = stmt
				.query_map(params_from_iter(params), |row| record_from_row(kind, row, 0))?
				.collect::<Result<Vec<_>, _>>()?;
			Ok(records)
		}).await?;

		Ok(records)
	}

	async fn query_joined(&self, spec: &JoinSpec, inner: bool) -> Result<Vec<Joined>> {
		spec.check()?;
		let mut params = Vec::new();
		let filter = where_clause(&spec.filter, &mut params);
		params.push(SqlValue::Integer(spec.limit as i64));

		let sql = format!(
			"SELECT {}, {} FROM (SELECT * FROM {} WHERE {} ORDER BY id LIMIT ?) AS p {} {} AS r ON r.{} = p.{} ORDER BY p.id, r.id",
			column_list(spec.primary, "p"),
			column_list(spec.related, "r"),
			spec.primary.name(),
			filter,
			if inner { "JOIN" } else { "LEFT JOIN" },
			spec.related.name(),
			spec.foreign_key.name(),
			spec.local_key.name()
		);
		let (primary, related) = (spec.primary, spec.related);
		let offset = columns(primary).len();

		let rows = self.conn.call(move |conn| {
			let mut stmt = conn.prepare(&sql)?;
			let rows = stmt
				.query_map(params_from_iter(params), |row| {
					let record = record_from_row(primary, row, 0)?;
					let other = match row.get::<_, Option<i64>>(offset)? {
						Some(_) => Some(record_from_row(related, row, offset)?),
						None => None,
					};
					Ok((record, other))
				})?
				.collect::<Result<Vec<_>, _>>()?;
			Ok(rows)
		}).await?;

		let mut joined: Vec<Joined> = Vec::new();
		for (record, other) in rows {
			match joined.last_mut() {
				Some(last) if last.record.id() == record.id() => last.related.extend(other),
				_ => joined.push(Joined { record, related: other.into_iter().collect() }),
			}
		}
		Ok(joined)
	}
}

#[async_trait]
impl StorageAdapter for SqliteStore {
	async fn init(&self) -> Result<()> {
		self.conn.call(|conn| {
			conn.execute(
				"CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    age INTEGER NOT NULL
                )",
				[]
			)?;

			// The author reference is declared but not enforced, like the document store
			conn.execute(
				"CREATE TABLE IF NOT EXISTS posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users (id),
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    likes INTEGER NOT NULL
                )",
				[]
			)?;

			conn.execute("CREATE INDEX IF NOT EXISTS idx_users_email ON users (email)", [])?;
			conn.execute("CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts (user_id)", [])?;

			Ok(())
		}).await?;

		Ok(())
	}

	fn database_name(&self) -> String {
		"SQLite".to_string()
	}

	async fn clear(&self, kind: EntityKind) -> Result<()> {
		let sql = format!("DELETE FROM {}", kind.name());
		self.conn.call(move |conn| {
			conn.execute(&sql, [])?;
			Ok(())
		}).await?;

		Ok(())
	}

	async fn bulk_insert(&self, batch: Batch) -> Result<Vec<RecordId>> {
		let ids = match batch {
			Batch::Users(users) =>
				self.conn.call(move |conn| {
					let tx = conn.transaction()?;
					let mut ids = Vec::with_capacity(users.len());
					{
						let mut stmt = tx.prepare(
							"INSERT INTO users (name, email, age) VALUES (?1, ?2, ?3)"
						)?;
						for user in &users {
							let id = stmt.insert(params![user.name, user.email, user.age])?;
							ids.push(RecordId::from(id));
						}
					}
					tx.commit()?;
					Ok(ids)
				}).await?,
			Batch::Posts(posts) => {
				let rows = posts
					.into_iter()
					.map(|post| Ok((row_id(&post.user_id)?, post)))
					.collect::<Result<Vec<_>>>()?;

				self.conn.call(move |conn| {
					let tx = conn.transaction()?;
					let mut ids = Vec::with_capacity(rows.len());
					{
						let mut stmt = tx.prepare(
							"INSERT INTO posts (user_id, title, content, created_at, likes) VALUES (?1, ?2, ?3, ?4, ?5)"
						)?;
						for (user_id, post) in &rows {
							let id = stmt.insert(
								params![user_id, post.title, post.content, post.created_at, post.likes]
							)?;
							ids.push(RecordId::from(id));
						}
					}
					tx.commit()?;
					Ok(ids)
				}).await?
			}
		};

		Ok(ids)
	}

	async fn find(&self, kind: EntityKind, predicate: &Predicate) -> Result<Vec<Record>> {
		predicate.check(kind)?;
		let mut params = Vec::new();
		let filter = where_clause(predicate, &mut params);
		let sql = format!("SELECT {} FROM {} WHERE {}", columns(kind).join(", "), kind.name(), filter);
		self.query_records(kind, sql, params).await
	}

	async fn find_sorted(&self, kind: EntityKind, keys: &[Field], limit: usize) -> Result<Vec<Record>> {
		for key in keys {
			key.check(kind)?;
		}
		let order = if keys.is_empty() {
			"id ASC".to_string()
		} else {
			keys.iter()
				.map(|key| format!("{} ASC", key.name()))
				.collect::<Vec<_>>()
				.join(", ")
		};
		let sql = format!(
			"SELECT {} FROM {} ORDER BY {} LIMIT ?",
			columns(kind).join(", "),
			kind.name(),
			order
		);
		self.query_records(kind, sql, vec![SqlValue::Integer(limit as i64)]).await
	}

	async fn find_page(&self, kind: EntityKind, offset: usize, limit: usize) -> Result<Vec<Record>> {
		let sql = format!("SELECT {} FROM {} ORDER BY id LIMIT ? OFFSET ?", columns(kind).join(", "), kind.name());
		let params = vec![SqlValue::Integer(limit as i64), SqlValue::Integer(offset as i64)];
		self.query_records(kind, sql, params).await
	}

	async fn count(&self, kind: EntityKind, predicate: &Predicate) -> Result<u64> {
		predicate.check(kind)?;
		let mut params = Vec::new();
		let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", kind.name(), where_clause(predicate, &mut params));

		let count = self.conn.call(move |conn| {
			let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
			Ok(count)
		}).await?;

		Ok(count as u64)
	}

	async fn aggregate(&self, kind: EntityKind, aggregations: &[Aggregation]) -> Result<AggregateRow> {
		check_aggregations(kind, aggregations)?;
		if aggregations.is_empty() {
			return Ok(AggregateRow::default());
		}

		let expressions = aggregations
			.iter()
			.map(|aggregation| reducer_sql(aggregation.reducer))
			.collect::<Vec<_>>()
			.join(", ");
		let sql = format!("SELECT {} FROM {}", expressions, kind.name());
		let width = aggregations.len();

		let values = self.conn.call(move |conn| {
			let values = conn.query_row(&sql, [], |row| {
				(0..width).map(|i| row.get::<_, SqlValue>(i)).collect::<Result<Vec<_>, _>>()
			})?;
			Ok(values)
		}).await?;

		let mut row = AggregateRow::default();
		for (aggregation, value) in aggregations.iter().zip(values) {
			row.insert(aggregation.alias.clone(), json_from_sql(value));
		}
		Ok(row)
	}

	async fn join_lookup(&self, spec: &JoinSpec) -> Result<Vec<Joined>> {
		self.query_joined(spec, false).await
	}

	async fn join_lookup_inverse(&self, spec: &JoinSpec) -> Result<Vec<Joined>> {
		let mut joined = self.query_joined(spec, true).await?;
		for row in &mut joined {
			row.related.truncate(1);
		}
		Ok(joined)
	}

	async fn bulk_update(
		&self,
		kind: EntityKind,
		predicate: &Predicate,
		changes: &[FieldUpdate]
	) -> Result<u64> {
		predicate.check(kind)?;
		check_updates(kind, changes)?;
		if changes.is_empty() {
			return Ok(0);
		}

		let mut params: Vec<SqlValue> = changes
			.iter()
			.map(|change| sql_value(change.field, &change.value))
			.collect();
		let assignments = changes
			.iter()
			.map(|change| format!("{} = ?", change.field.name()))
			.collect::<Vec<_>>()
			.join(", ");
		let filter = where_clause(predicate, &mut params);
		let sql = format!("UPDATE {} SET {} WHERE {}", kind.name(), assignments, filter);

		let changed = self.conn.call(move |conn| {
			let changed = conn.execute(&sql, params_from_iter(params))?;
			Ok(changed)
		}).await?;

		Ok(changed as u64)
	}

	async fn bulk_delete(&self, kind: EntityKind, predicate: &Predicate) -> Result<u64> {
		predicate.check(kind)?;
		let mut params = Vec::new();
		let sql = format!("DELETE FROM {} WHERE {}", kind.name(), where_clause(predicate, &mut params));

		let removed = self.conn.call(move |conn| {
			let removed = conn.execute(&sql, params_from_iter(params))?;
			Ok(removed)
		}).await?;

		Ok(removed as u64)
	}
}

fn row_id(id: &RecordId) -> Result<i64> {
	id.as_str().parse().with_context(|| format!("{} is not a SQLite row id", id))
}

fn record_from_row(kind: EntityKind, row: &Row<'_>, offset: usize) -> rusqlite::Result<Record> {
	let record = match kind {
		EntityKind::Users =>
			Record::User(User {
				id: RecordId::from(row.get::<_, i64>(offset)?),
				name: row.get(offset + 1)?,
				email: row.get(offset + 2)?,
				age: row.get(offset + 3)?,
			}),
		EntityKind::Posts =>
			Record::Post(Post {
				id: RecordId::from(row.get::<_, i64>(offset)?),
				user_id: RecordId::from(row.get::<_, i64>(offset + 1)?),
				title: row.get(offset + 2)?,
				content: row.get(offset + 3)?,
				created_at: row.get(offset + 4)?,
				likes: row.get(offset + 5)?,
			}),
	};
	Ok(record)
}

/// Render `predicate` as a WHERE condition, appending its bound values to `params`.
fn where_clause(predicate: &Predicate, params: &mut Vec<SqlValue>) -> String {
	match predicate {
		Predicate::All => "1 = 1".to_string(),
		Predicate::Compare { field, op, bound } => {
			params.push(SqlValue::Integer(*bound));
			format!("{} {} ?", field.name(), operator(*op))
		}
		Predicate::Between { field, low, high } => {
			params.push(SqlValue::Integer(*low));
			params.push(SqlValue::Integer(*high));
			format!("{} BETWEEN ? AND ?", field.name())
		}
		Predicate::Like { field, pattern } => {
			params.push(SqlValue::Text(like_pattern(pattern)));
			format!("{} LIKE ? ESCAPE '\\'", field.name())
		}
		Predicate::Equals { field, value } => {
			params.push(sql_value(*field, value));
			format!("{} = ?", field.name())
		}
		Predicate::And(parts) => combine(parts, " AND ", "1 = 1", params),
		Predicate::Or(parts) => combine(parts, " OR ", "1 = 0", params),
	}
}

fn combine(parts: &[Predicate], separator: &str, empty: &str, params: &mut Vec<SqlValue>) -> String {
	if parts.is_empty() {
		return empty.to_string();
	}
	let conditions = parts
		.iter()
		.map(|part| format!("({})", where_clause(part, params)))
		.collect::<Vec<_>>();
	conditions.join(separator)
}

fn operator(op: CompareOp) -> &'static str {
	match op {
		CompareOp::Lt => "<",
		CompareOp::Lte => "<=",
		CompareOp::Gt => ">",
		CompareOp::Gte => ">=",
		CompareOp::Eq => "=",
	}
}

fn like_pattern(pattern: &Pattern) -> String {
	let escape = |text: &str| {
		let mut escaped = String::with_capacity(text.len());
		for c in text.chars() {
			if matches!(c, '\\' | '%' | '_') {
				escaped.push('\\');
			}
			escaped.push(c);
		}
		escaped
	};

	match pattern {
		Pattern::EndsWith(suffix) => format!("%{}", escape(suffix)),
		Pattern::Contains(needle) => format!("%{}%", escape(needle)),
	}
}

/// Ids travel as strings outside the store but are integers in the tables.
fn sql_value(field: Field, value: &Value) -> SqlValue {
	match value {
		Value::Int(v) => SqlValue::Integer(*v),
		Value::Text(text) if matches!(field, Field::Id | Field::UserId) => {
			match text.parse::<i64>() {
				Ok(id) => SqlValue::Integer(id),
				Err(_) => SqlValue::Text(text.clone()),
			}
		}
		Value::Text(text) => SqlValue::Text(text.clone()),
	}
}

fn reducer_sql(reducer: Reducer) -> String {
	match reducer {
		Reducer::Avg(field) => format!("AVG({})", field.name()),
		Reducer::Min(field) => format!("MIN({})", field.name()),
		Reducer::Max(field) => format!("MAX({})", field.name()),
		Reducer::Sum(field) => format!("COALESCE(SUM({}), 0)", field.name()),
		Reducer::Count => "COUNT(*)".to_string(),
	}
}

fn json_from_sql(value: SqlValue) -> JsonValue {
	match value {
		SqlValue::Null | SqlValue::Blob(_) => JsonValue::Null,
		SqlValue::Integer(v) => JsonValue::from(v),
		SqlValue::Real(v) => JsonValue::from(v),
		SqlValue::Text(v) => JsonValue::from(v),
	}
}
