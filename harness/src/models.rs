use std::fmt;

use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

use crate::error::HarnessError;
use crate::queries::QueryResults;
use crate::stats::DurationStats;

/// Backend-assigned record identifier. Opaque to the harness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RecordId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<i64> for RecordId {
	fn from(id: i64) -> Self {
		Self(id.to_string())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
	Users,
	Posts,
}

impl EntityKind {
	pub fn name(self) -> &'static str {
		match self {
			Self::Users => "users",
			Self::Posts => "posts",
		}
	}
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Every attribute a User or Post can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
	Id,
	Name,
	Email,
	Age,
	UserId,
	Title,
	Content,
	CreatedAt,
	Likes,
}

impl Field {
	/// Storage name of the field; also the relational column name.
	pub fn name(self) -> &'static str {
		match self {
			Self::Id => "id",
			Self::Name => "name",
			Self::Email => "email",
			Self::Age => "age",
			Self::UserId => "user_id",
			Self::Title => "title",
			Self::Content => "content",
			Self::CreatedAt => "created_at",
			Self::Likes => "likes",
		}
	}

	pub fn belongs_to(self, kind: EntityKind) -> bool {
		match kind {
			EntityKind::Users => matches!(self, Self::Id | Self::Name | Self::Email | Self::Age),
			EntityKind::Posts =>
				matches!(
					self,
					Self::Id | Self::UserId | Self::Title | Self::Content | Self::CreatedAt | Self::Likes
				),
		}
	}

	pub fn is_numeric(self) -> bool {
		matches!(self, Self::Age | Self::Likes)
	}

	pub fn check(self, kind: EntityKind) -> Result<(), HarnessError> {
		if self.belongs_to(kind) {
			Ok(())
		} else {
			Err(HarnessError::UnknownField { kind, field: self })
		}
	}

	pub fn check_numeric(self, kind: EntityKind) -> Result<(), HarnessError> {
		self.check(kind)?;
		if self.is_numeric() {
			Ok(())
		} else {
			Err(HarnessError::NonNumericField { kind, field: self })
		}
	}
}

impl fmt::Display for Field {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// A borrowed view of one field of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue<'a> {
	Int(i64),
	Text(&'a str),
	Timestamp(DateTime<Utc>),
}

/// An owned value used in predicates and updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
	Int(i64),
	Text(String),
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}

impl From<&RecordId> for Value {
	fn from(id: &RecordId) -> Self {
		Self::Text(id.as_str().to_string())
	}
}

impl Value {
	pub fn matches(&self, field: FieldValue<'_>) -> bool {
		match (self, field) {
			(Self::Int(expected), FieldValue::Int(actual)) => *expected == actual,
			(Self::Text(expected), FieldValue::Text(actual)) => expected == actual,
			_ => false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
	pub name: String,
	pub email: String,
	pub age: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
	pub user_id: RecordId,
	pub title: String,
	pub content: String,
	pub created_at: DateTime<Utc>,
	pub likes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: RecordId,
	pub name: String,
	pub email: String,
	pub age: i64,
}

impl User {
	pub fn from_new(id: RecordId, user: NewUser) -> Self {
		Self {
			id,
			name: user.name,
			email: user.email,
			age: user.age,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
	pub id: RecordId,
	pub user_id: RecordId,
	pub title: String,
	pub content: String,
	pub created_at: DateTime<Utc>,
	pub likes: i64,
}

impl Post {
	pub fn from_new(id: RecordId, post: NewPost) -> Self {
		Self {
			id,
			user_id: post.user_id,
			title: post.title,
			content: post.content,
			created_at: post.created_at,
			likes: post.likes,
		}
	}
}

/// A stored record of either kind, as returned by adapter reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
	User(User),
	Post(Post),
}

impl Record {
	pub fn kind(&self) -> EntityKind {
		match self {
			Self::User(_) => EntityKind::Users,
			Self::Post(_) => EntityKind::Posts,
		}
	}

	pub fn id(&self) -> &RecordId {
		match self {
			Self::User(user) => &user.id,
			Self::Post(post) => &post.id,
		}
	}

	pub fn as_user(&self) -> Option<&User> {
		match self {
			Self::User(user) => Some(user),
			Self::Post(_) => None,
		}
	}

	pub fn as_post(&self) -> Option<&Post> {
		match self {
			Self::Post(post) => Some(post),
			Self::User(_) => None,
		}
	}

	pub fn field(&self, field: Field) -> Option<FieldValue<'_>> {
		match self {
			Self::User(user) =>
				match field {
					Field::Id => Some(FieldValue::Text(user.id.as_str())),
					Field::Name => Some(FieldValue::Text(&user.name)),
					Field::Email => Some(FieldValue::Text(&user.email)),
					Field::Age => Some(FieldValue::Int(user.age)),
					_ => None,
				}
			Self::Post(post) =>
				match field {
					Field::Id => Some(FieldValue::Text(post.id.as_str())),
					Field::UserId => Some(FieldValue::Text(post.user_id.as_str())),
					Field::Title => Some(FieldValue::Text(&post.title)),
					Field::Content => Some(FieldValue::Text(&post.content)),
					Field::CreatedAt => Some(FieldValue::Timestamp(post.created_at)),
					Field::Likes => Some(FieldValue::Int(post.likes)),
					_ => None,
				}
		}
	}

	/// Apply one field assignment. Identifiers and the post's author are immutable.
	pub fn set(&mut self, field: Field, value: &Value) -> Result<(), HarnessError> {
		let kind = self.kind();
		match (self, field, value) {
			(Self::User(user), Field::Name, Value::Text(name)) => user.name = name.clone(),
			(Self::User(user), Field::Email, Value::Text(email)) => user.email = email.clone(),
			(Self::User(user), Field::Age, Value::Int(age)) => user.age = *age,
			(Self::Post(post), Field::Title, Value::Text(title)) => post.title = title.clone(),
			(Self::Post(post), Field::Content, Value::Text(content)) => {
				post.content = content.clone();
			}
			(Self::Post(post), Field::Likes, Value::Int(likes)) => post.likes = *likes,
			_ => {
				return Err(HarnessError::InvalidAssignment {
					kind,
					field,
					value: value.clone(),
				});
			}
		}
		Ok(())
	}
}

/// A batch of freshly generated records of one kind.
#[derive(Debug, Clone)]
pub enum Batch {
	Users(Vec<NewUser>),
	Posts(Vec<NewPost>),
}

impl Batch {
	pub fn kind(&self) -> EntityKind {
		match self {
			Self::Users(_) => EntityKind::Users,
			Self::Posts(_) => EntityKind::Posts,
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Self::Users(users) => users.len(),
			Self::Posts(posts) => posts.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// A primary record augmented with its related records.
#[derive(Debug, Clone, Serialize)]
pub struct Joined {
	#[serde(flatten)]
	pub record: Record,
	pub related: Vec<Record>,
}

/// Metrics of one timed section of a full pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMetrics {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub count: Option<u64>,
	pub time: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub throughput: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub memory_used: Option<f64>,
}

impl SectionMetrics {
	/// A section that processed `count` records in `time` milliseconds.
	pub fn counted(count: u64, time: u64) -> Self {
		Self {
			count: Some(count),
			time,
			throughput: crate::benchmark::throughput(count, time),
			memory_used: None,
		}
	}

	/// A section that only reports its duration.
	pub fn timed(time: u64) -> Self {
		Self {
			count: None,
			time,
			throughput: None,
			memory_used: None,
		}
	}

	pub fn with_memory_used(mut self, megabytes: f64) -> Self {
		self.memory_used = Some(megabytes);
		self
	}
}

/// Outcome of one full benchmark pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
	pub insert: SectionMetrics,
	pub insert_related: SectionMetrics,
	pub read: SectionMetrics,
	pub queries: QueryResults,
	pub update: SectionMetrics,
	pub delete: SectionMetrics,
	pub database: String,
	pub total_time: u64,
	pub timestamp: DateTime<Utc>,
}

/// Outcome of one stress pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressResult {
	pub database: String,
	pub iterations: usize,
	pub batch_size: usize,
	pub insert_stats: DurationStats,
	pub read_stats: DurationStats,
}
