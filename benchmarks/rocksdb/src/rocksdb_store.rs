use anyhow::{ Context, Result };
use async_trait::async_trait;
use harness::{
	memory::MemorySnapshot,
	models::{ Batch, EntityKind, Field, FieldValue, Joined, Post, Record, RecordId, User },
	predicate::Predicate,
	storage::{
		check_aggregations,
		check_updates,
		relation_key,
		AggregateRow,
		Aggregation,
		FieldUpdate,
		JoinSpec,
		StorageAdapter,
	},
};
use rocksdb::{
	BoundColumnFamily,
	ColumnFamilyDescriptor,
	DBCompressionType,
	Direction,
	IteratorMode,
	Options,
	WriteBatch,
	DB,
};
use std::cmp::Ordering;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

const USERS_CF: &str = "users";
const POSTS_CF: &str = "posts";
const POSTS_USER_ID_INDEX_CF: &str = "posts_user_id_index";

const COLUMN_FAMILIES: [&str; 3] = [USERS_CF, POSTS_CF, POSTS_USER_ID_INDEX_CF];

const MEMTABLE_SIZE_PROPERTY: &str = "rocksdb.cur-size-all-mem-tables";

fn collection(kind: EntityKind) -> &'static str {
	match kind {
		EntityKind::Users => USERS_CF,
		EntityKind::Posts => POSTS_CF,
	}
}

/// Document backend: one column family of JSON documents per collection plus a
/// `userId:postId` index over posts.
pub struct RocksDbStore {
	db: Arc<Mutex<DB>>,
	path: PathBuf,
}

impl RocksDbStore {
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref().to_path_buf();
		let parallelism = std::thread::available_parallelism().map_or(1, |n| n.get());

		let mut opts = Options::default();
		opts.create_if_missing(true);
		opts.create_missing_column_families(true);
		opts.increase_parallelism(parallelism as i32);
		opts.set_max_background_jobs(4);
		opts.set_compression_type(DBCompressionType::Lz4);

		let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES.iter()
			.map(|name| {
				let mut cf_opts = Options::default();
				cf_opts.set_max_write_buffer_number(4);
				cf_opts.set_target_file_size_base(64 * 1024 * 1024); // 64MB
				cf_opts.set_level_compaction_dynamic_level_bytes(true);

				ColumnFamilyDescriptor::new(*name, cf_opts)
			})
			.collect();

		let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors).with_context(|| {
			format!("cannot open RocksDB at {}", path.display())
		})?;
		info!(path = %path.display(), "RocksDB opened");

		Ok(Self {
			db: Arc::new(Mutex::new(db)),
			path,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Run `f` on the blocking pool while holding the database lock.
	async fn blocking<F, T>(&self, f: F) -> Result<T>
		where F: FnOnce(&DB) -> Result<T> + Send + 'static, T: Send + 'static
	{
		let db = Arc::clone(&self.db).lock_owned().await;
		tokio::task::spawn_blocking(move || f(&db)).await?
	}
}

#[async_trait]
impl StorageAdapter for RocksDbStore {
	async fn init(&self) -> Result<()> {
		// Column families are created when the database is opened
		self.blocking(|db| {
			for name in COLUMN_FAMILIES {
				cf(db, name)?;
			}
			Ok(())
		}).await
	}

	fn database_name(&self) -> String {
		"RocksDB".to_string()
	}

	async fn clear(&self, kind: EntityKind) -> Result<()> {
		self.blocking(move |db| {
			let mut names = vec![collection(kind)];
			if kind == EntityKind::Posts {
				names.push(POSTS_USER_ID_INDEX_CF);
			}

			for name in names {
				let cf = cf(db, name)?;
				let mut batch = WriteBatch::default();

				for result in db.iterator_cf(&cf, IteratorMode::Start) {
					let (key, _) = result?;
					batch.delete_cf(&cf, &key);
				}

				db.write(batch)?;
			}

			Ok(())
		}).await
	}

	async fn bulk_insert(&self, batch: Batch) -> Result<Vec<RecordId>> {
		self.blocking(move |db| insert(db, batch)).await
	}

	async fn find(&self, kind: EntityKind, predicate: &Predicate) -> Result<Vec<Record>> {
		predicate.check(kind)?;
		let predicate = predicate.clone();

		self.blocking(move |db| {
			let mut records = scan(db, kind)?;
			records.retain(|record| predicate.matches(record));
			Ok(records)
		}).await
	}

	async fn find_sorted(&self, kind: EntityKind, keys: &[Field], limit: usize) -> Result<Vec<Record>> {
		for key in keys {
			key.check(kind)?;
		}
		let keys = keys.to_vec();

		self.blocking(move |db| {
			let mut records = scan(db, kind)?;
			records.sort_by(|a, b| {
				keys.iter().fold(Ordering::Equal, |order, key| order.then_with(|| a.field(*key).cmp(&b.field(*key))))
			});
			records.truncate(limit);
			Ok(records)
		}).await
	}

	async fn find_page(&self, kind: EntityKind, offset: usize, limit: usize) -> Result<Vec<Record>> {
		self.blocking(move |db| {
			let cf = cf(db, collection(kind))?;

			let mut records = Vec::new();
			for result in db.iterator_cf(&cf, IteratorMode::Start).skip(offset).take(limit) {
				let (_, value) = result?;
				records.push(decode(kind, &value)?);
			}
			Ok(records)
		}).await
	}

	async fn count(&self, kind: EntityKind, predicate: &Predicate) -> Result<u64> {
		predicate.check(kind)?;
		let predicate = predicate.clone();

		self.blocking(move |db| {
			if let Predicate::All = predicate {
				let cf = cf(db, collection(kind))?;
				let mut count = 0;
				for result in db.iterator_cf(&cf, IteratorMode::Start) {
					result?;
					count += 1;
				}
				return Ok(count);
			}

			let records = scan(db, kind)?;
			Ok(
				records
					.iter()
					.filter(|record| predicate.matches(record))
					.count() as u64
			)
		}).await
	}

	async fn aggregate(&self, kind: EntityKind, aggregations: &[Aggregation]) -> Result<AggregateRow> {
		check_aggregations(kind, aggregations)?;
		let aggregations = aggregations.to_vec();

		self.blocking(move |db| {
			let records = scan(db, kind)?;
			Ok(AggregateRow::reduce(&records, &aggregations))
		}).await
	}

	async fn find_related(
		&self,
		parent: EntityKind,
		child: EntityKind,
		parent_id: &RecordId
	) -> Result<Vec<Record>> {
		relation_key(parent, child)?;
		let parent_id = parent_id.clone();
		self.blocking(move |db| posts_of(db, &parent_id)).await
	}

	async fn join_lookup(&self, spec: &JoinSpec) -> Result<Vec<Joined>> {
		spec.check()?;
		let spec = spec.clone();
		self.blocking(move |db| join(db, &spec, false)).await
	}

	async fn join_lookup_inverse(&self, spec: &JoinSpec) -> Result<Vec<Joined>> {
		spec.check()?;
		let spec = spec.clone();
		let mut joined = self.blocking(move |db| join(db, &spec, true)).await?;
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
		let (predicate, changes) = (predicate.clone(), changes.to_vec());

		self.blocking(move |db| {
			let cf = cf(db, collection(kind))?;

			let mut batch = WriteBatch::default();
			let mut changed = 0;
			for mut record in scan(db, kind)? {
				if !predicate.matches(&record) {
					continue;
				}
				for change in &changes {
					record.set(change.field, &change.value)?;
				}
				batch.put_cf(&cf, record.id().as_str().as_bytes(), encode(&record)?);
				changed += 1;
			}

			db.write(batch)?;
			Ok(changed)
		}).await
	}

	async fn bulk_delete(&self, kind: EntityKind, predicate: &Predicate) -> Result<u64> {
		predicate.check(kind)?;
		let predicate = predicate.clone();

		self.blocking(move |db| {
			let cf = cf(db, collection(kind))?;
			let index_cf = cf_handle_for_index(db, kind)?;

			let mut batch = WriteBatch::default();
			let mut removed = 0;
			for record in scan(db, kind)? {
				if !predicate.matches(&record) {
					continue;
				}
				batch.delete_cf(&cf, record.id().as_str().as_bytes());
				if let (Some(index_cf), Some(post)) = (&index_cf, record.as_post()) {
					batch.delete_cf(index_cf, index_key(&post.user_id, &post.id).as_bytes());
				}
				removed += 1;
			}

			db.write(batch)?;
			Ok(removed)
		}).await
	}

	async fn measure_memory(&self) -> Result<MemorySnapshot> {
		let memtables = self.blocking(|db| {
			let mut memtables = 0;
			for name in [USERS_CF, POSTS_CF] {
				let cf = cf(db, name)?;
				memtables += db.property_int_value_cf(&cf, MEMTABLE_SIZE_PROPERTY)?.unwrap_or(0);
			}
			Ok(memtables)
		}).await?;

		Ok(MemorySnapshot::current_process()?.with_external(memtables))
	}
}

fn insert(db: &DB, batch: Batch) -> Result<Vec<RecordId>> {
	let mut write = WriteBatch::default();
	let mut ids = Vec::with_capacity(batch.len());

	match batch {
		Batch::Users(users) => {
			let users_cf = cf(db, USERS_CF)?;
			for user in users {
				let record = Record::User(User::from_new(new_id(), user));
				write.put_cf(&users_cf, record.id().as_str().as_bytes(), encode(&record)?);
				ids.push(record.id().clone());
			}
		}
		Batch::Posts(posts) => {
			let posts_cf = cf(db, POSTS_CF)?;
			let index_cf = cf(db, POSTS_USER_ID_INDEX_CF)?;
			for post in posts {
				let post = Post::from_new(new_id(), post);
				write.put_cf(&index_cf, index_key(&post.user_id, &post.id).as_bytes(), b"");
				let record = Record::Post(post);
				write.put_cf(&posts_cf, record.id().as_str().as_bytes(), encode(&record)?);
				ids.push(record.id().clone());
			}
		}
	}

	db.write(write)?;
	Ok(ids)
}

/// Filtered, limited primaries with their related documents. Inner joins drop
/// primaries that have none.
fn join(db: &DB, spec: &JoinSpec, inner: bool) -> Result<Vec<Joined>> {
	let primaries: Vec<Record> = scan(db, spec.primary)?
		.into_iter()
		.filter(|record| spec.filter.matches(record))
		.take(spec.limit)
		.collect();

	let uses_index =
		spec.primary == EntityKind::Users &&
		spec.related == EntityKind::Posts &&
		spec.local_key == Field::Id &&
		spec.foreign_key == Field::UserId;
	// Loaded lazily, only when neither the index nor a key lookup applies
	let mut related_scan: Option<Vec<Record>> = None;

	let mut joined = Vec::with_capacity(primaries.len());
	for record in primaries {
		let related = if uses_index {
			posts_of(db, record.id())?
		} else if spec.foreign_key == Field::Id {
			match record.field(spec.local_key) {
				Some(FieldValue::Text(id)) => get(db, spec.related, id)?.into_iter().collect(),
				_ => Vec::new(),
			}
		} else {
			if related_scan.is_none() {
				related_scan = Some(scan(db, spec.related)?);
			}
			let local = record.field(spec.local_key);
			related_scan
				.iter()
				.flatten()
				.filter(|other| local.is_some() && other.field(spec.foreign_key) == local)
				.cloned()
				.collect()
		};

		if inner && related.is_empty() {
			continue;
		}
		joined.push(Joined { record, related });
	}

	Ok(joined)
}

fn cf<'a>(db: &'a DB, name: &str) -> Result<Arc<BoundColumnFamily<'a>>> {
	db.cf_handle(name).with_context(|| format!("column family {} is missing", name))
}

fn cf_handle_for_index(db: &DB, kind: EntityKind) -> Result<Option<Arc<BoundColumnFamily<'_>>>> {
	match kind {
		EntityKind::Posts => Ok(Some(cf(db, POSTS_USER_ID_INDEX_CF)?)),
		EntityKind::Users => Ok(None),
	}
}

fn new_id() -> RecordId {
	RecordId::new(Uuid::new_v4().to_string())
}

fn index_key(user_id: &RecordId, post_id: &RecordId) -> String {
	format!("{}:{}", user_id, post_id)
}

fn encode(record: &Record) -> Result<Vec<u8>> {
	Ok(serde_json::to_vec(record)?)
}

fn decode(kind: EntityKind, bytes: &[u8]) -> Result<Record> {
	let record = match kind {
		EntityKind::Users => Record::User(serde_json::from_slice(bytes)?),
		EntityKind::Posts => Record::Post(serde_json::from_slice(bytes)?),
	};
	Ok(record)
}

fn scan(db: &DB, kind: EntityKind) -> Result<Vec<Record>> {
	let cf = cf(db, collection(kind))?;

	let mut records = Vec::new();
	for result in db.iterator_cf(&cf, IteratorMode::Start) {
		let (_, value) = result?;
		records.push(decode(kind, &value)?);
	}
	Ok(records)
}

fn get(db: &DB, kind: EntityKind, id: &str) -> Result<Option<Record>> {
	let cf = cf(db, collection(kind))?;
	match db.get_cf(&cf, id.as_bytes())? {
		Some(bytes) => Ok(Some(decode(kind, &bytes)?)),
		None => Ok(None),
	}
}

/// Posts of one user via the `userId:postId` index.
fn posts_of(db: &DB, user_id: &RecordId) -> Result<Vec<Record>> {
	let index_cf = cf(db, POSTS_USER_ID_INDEX_CF)?;
	let prefix = format!("{}:", user_id);

	let mut post_ids = Vec::new();
	let mode = IteratorMode::From(prefix.as_bytes(), Direction::Forward);
	for result in db.iterator_cf(&index_cf, mode) {
		let (key, _) = result?;
		if !key.starts_with(prefix.as_bytes()) {
			break;
		}
		post_ids.push(String::from_utf8(key[prefix.len()..].to_vec())?);
	}

	let mut posts = Vec::with_capacity(post_ids.len());
	for id in post_ids {
		// Index entries can outlive their post only between a delete and its batch write
		if let Some(post) = get(db, EntityKind::Posts, &id)? {
			posts.push(post);
		}
	}
	Ok(posts)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use harness::{
		benchmark::BenchmarkRunner,
		generator::DataGenerator,
		models::{ NewPost, NewUser },
		predicate::{ CompareOp, Pattern },
		queries::{ self, QueryMetrics, SuiteQuery },
		FullBenchmarkParams,
		HarnessError,
		StressBenchmarkParams,
	};
	use tempfile::TempDir;

	async fn store() -> (RocksDbStore, TempDir) {
		let dir = TempDir::new().unwrap();
		let store = RocksDbStore::open(dir.path().join("db")).unwrap();
		store.init().await.unwrap();
		(store, dir)
	}

	fn new_user(name: &str, email: &str, age: i64) -> NewUser {
		NewUser { name: name.to_string(), email: email.to_string(), age }
	}

	fn new_post(user_id: &RecordId, title: &str, likes: i64) -> NewPost {
		NewPost {
			user_id: user_id.clone(),
			title: title.to_string(),
			content: "Body".to_string(),
			created_at: Utc::now(),
			likes,
		}
	}

	/// Four users, the first two with posts.
	async fn seeded() -> (RocksDbStore, TempDir, Vec<RecordId>) {
		let (store, dir) = store().await;
		let users = vec![
			new_user("Ada", "ada@gmail.com", 22),
			new_user("Brendan", "brendan@yahoo.com", 35),
			new_user("Carmen", "carmen@hotmail.com", 48),
			new_user("Dmitri", "dmitri@gmail.com", 67)
		];
		let ids = store.bulk_insert(Batch::Users(users)).await.unwrap();
		let posts = vec![
			new_post(&ids[0], "First", 900),
			new_post(&ids[0], "Second", 10),
			new_post(&ids[1], "Third", 600)
		];
		store.bulk_insert(Batch::Posts(posts)).await.unwrap();
		(store, dir, ids)
	}

	fn sorted_ages(records: &[Record]) -> Vec<i64> {
		let mut ages: Vec<i64> = records
			.iter()
			.filter_map(Record::as_user)
			.map(|user| user.age)
			.collect();
		ages.sort_unstable();
		ages
	}

	#[tokio::test]
	async fn clear_is_idempotent_and_drops_the_index() {
		let (store, _dir, ids) = seeded().await;
		store.clear(EntityKind::Posts).await.unwrap();
		store.clear(EntityKind::Posts).await.unwrap();

		assert!(store.find_all(EntityKind::Posts).await.unwrap().is_empty());
		assert!(store.find_related(EntityKind::Users, EntityKind::Posts, &ids[0]).await.unwrap().is_empty());

		store.clear(EntityKind::Users).await.unwrap();
		assert_eq!(store.count(EntityKind::Users, &Predicate::All).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn insert_assigns_unique_ids() {
		let (store, _dir, ids) = seeded().await;
		let users = store.find_all(EntityKind::Users).await.unwrap();

		assert_eq!(users.len(), 4);
		let mut expected = ids.clone();
		let mut found: Vec<_> = users.iter().map(|r| r.id().clone()).collect();
		expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
		found.sort_by(|a, b| a.as_str().cmp(b.as_str()));
		assert_eq!(found, expected);
		assert!(ids.iter().all(|id| Uuid::parse_str(id.as_str()).is_ok()));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn concurrent_batches_all_land() {
		let (store, _dir) = store().await;
		let store = Arc::new(store);

		let tasks: Vec<_> = (0..4)
			.map(|n| {
				let store = Arc::clone(&store);
				tokio::spawn(async move {
					let users = (0..25)
						.map(|i| new_user("User", &format!("user{}.{}@gmail.com", n, i), 20 + i))
						.collect();
					store.bulk_insert(Batch::Users(users)).await
				})
			})
			.collect();
		for task in tasks {
			assert_eq!(task.await.unwrap().unwrap().len(), 25);
		}

		assert_eq!(store.count(EntityKind::Users, &Predicate::All).await.unwrap(), 100);
		let (by_email, by_age) = tokio::join!(
			store.count(EntityKind::Users, &Predicate::equals(Field::Email, "user3.7@gmail.com")),
			store.count(EntityKind::Users, &Predicate::gte(Field::Age, 40))
		);
		assert_eq!(by_email.unwrap(), 1);
		assert_eq!(by_age.unwrap(), 20);
	}

	#[tokio::test]
	async fn filters_match_the_predicate_interpreter() {
		let (store, _dir, _) = seeded().await;

		let adults = store
			.find_by_range(EntityKind::Users, Field::Age, CompareOp::Gte, 30).await
			.unwrap();
		assert_eq!(sorted_ages(&adults), vec![35, 48, 67]);

		let middle = store.find_between(EntityKind::Users, Field::Age, 22, 35).await.unwrap();
		assert_eq!(sorted_ages(&middle), vec![22, 35]);

		let gmail = store
			.find_by_pattern(EntityKind::Users, Field::Email, Pattern::EndsWith("@gmail.com".into())).await
			.unwrap();
		assert_eq!(sorted_ages(&gmail), vec![22, 67]);

		let compound = store.find_compound(EntityKind::Users, &queries::complex_predicate()).await.unwrap();
		assert_eq!(sorted_ages(&compound), vec![35]);
	}

	#[tokio::test]
	async fn sorting_and_paging() {
		let (store, _dir) = store().await;
		let users = vec![
			new_user("Zed", "z@gmail.com", 40),
			new_user("Amy", "a@gmail.com", 40),
			new_user("Bob", "b@gmail.com", 19)
		];
		store.bulk_insert(Batch::Users(users)).await.unwrap();

		let sorted = store.find_sorted(EntityKind::Users, &[Field::Age, Field::Name], 2).await.unwrap();
		let names: Vec<_> = sorted
			.iter()
			.filter_map(Record::as_user)
			.map(|u| u.name.as_str())
			.collect();
		assert_eq!(names, vec!["Bob", "Amy"]);

		assert_eq!(store.find_page(EntityKind::Users, 1, 5).await.unwrap().len(), 2);
		assert!(store.find_page(EntityKind::Users, 10, 5).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn count_and_aggregate() {
		let (store, _dir, _) = seeded().await;

		assert_eq!(store.count(EntityKind::Users, &Predicate::gte(Field::Age, 30)).await.unwrap(), 3);
		assert_eq!(store.count(EntityKind::Posts, &Predicate::All).await.unwrap(), 3);

		let row = store.aggregate(EntityKind::Users, &queries::age_summary()).await.unwrap();
		assert_eq!(row.get_f64("avgAge"), Some(43.0));
		assert_eq!(row.get_i64("minAge"), Some(22));
		assert_eq!(row.get_i64("maxAge"), Some(67));
		assert_eq!(row.get_i64("totalUsers"), Some(4));
	}

	#[tokio::test]
	async fn related_posts_come_from_the_index() {
		let (store, _dir, ids) = seeded().await;

		let related = store.find_related(EntityKind::Users, EntityKind::Posts, &ids[0]).await.unwrap();
		assert_eq!(related.len(), 2);
		assert!(related.iter().all(|r| r.as_post().unwrap().user_id == ids[0]));

		assert!(store.find_related(EntityKind::Users, EntityKind::Posts, &ids[3]).await.unwrap().is_empty());
		assert!(store.find_related(EntityKind::Posts, EntityKind::Users, &ids[0]).await.is_err());
	}

	#[tokio::test]
	async fn joins_attach_related_records() {
		let (store, _dir, ids) = seeded().await;

		let with_posts = store.join_lookup(&queries::users_with_posts()).await.unwrap();
		assert_eq!(with_posts.len(), 3);
		for joined in &with_posts {
			let expected = if joined.record.id() == &ids[1] { 1 } else { 0 };
			assert_eq!(joined.related.len(), expected);
		}

		let popular = store.join_lookup_inverse(&queries::popular_posts_with_author()).await.unwrap();
		assert_eq!(popular.len(), 2);
		for joined in &popular {
			let post = joined.record.as_post().unwrap();
			assert_eq!(joined.related.len(), 1);
			assert_eq!(joined.related[0].id(), &post.user_id);
		}

		store.bulk_delete(EntityKind::Users, &Predicate::equals(Field::Id, &ids[0])).await.unwrap();
		let popular = store.join_lookup_inverse(&queries::popular_posts_with_author()).await.unwrap();
		assert_eq!(popular.len(), 1);
		assert_eq!(popular[0].related[0].id(), &ids[1]);
	}

	#[tokio::test]
	async fn bulk_update_and_delete_report_affected_documents() {
		let (store, _dir, ids) = seeded().await;

		let young = Predicate::lt(Field::Age, 25);
		let changed = store
			.bulk_update(EntityKind::Users, &young, &[FieldUpdate::new(Field::Age, 25)]).await
			.unwrap();
		assert_eq!(changed, 1);
		assert_eq!(store.count(EntityKind::Users, &young).await.unwrap(), 0);

		let removed = store.bulk_delete(EntityKind::Users, &Predicate::gte(Field::Age, 65)).await.unwrap();
		assert_eq!(removed, 1);
		assert_eq!(sorted_ages(&store.find_all(EntityKind::Users).await.unwrap()), vec![25, 35, 48]);

		let removed = store.bulk_delete(EntityKind::Posts, &Predicate::gte(Field::Likes, 500)).await.unwrap();
		assert_eq!(removed, 2);
		let left = store.find_related(EntityKind::Users, EntityKind::Posts, &ids[0]).await.unwrap();
		assert_eq!(left.len(), 1);
		assert_eq!(left[0].as_post().unwrap().title, "Second");
	}

	#[tokio::test]
	async fn invalid_updates_are_rejected() {
		let (store, _dir, _) = seeded().await;
		let err = store
			.bulk_update(EntityKind::Posts, &Predicate::All, &[FieldUpdate::new(Field::UserId, "x")]).await
			.unwrap_err();
		assert!(matches!(err.downcast_ref::<HarnessError>(), Some(HarnessError::InvalidAssignment { .. })));
	}

	#[tokio::test]
	async fn memory_snapshot_includes_memtables() {
		let (store, _dir, _) = seeded().await;
		let snapshot = store.measure_memory().await.unwrap();

		assert!(snapshot.heap_used > 0.0);
		assert!(snapshot.heap_total >= snapshot.heap_used);
	}

	#[tokio::test]
	async fn documents_survive_reopening() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("db");
		{
			let store = RocksDbStore::open(&path).unwrap();
			store.bulk_insert(Batch::Users(vec![new_user("Ada", "ada@gmail.com", 30)])).await.unwrap();
		}

		let store = RocksDbStore::open(&path).unwrap();
		assert_eq!(store.path(), path.as_path());
		assert_eq!(store.count(EntityKind::Users, &Predicate::All).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn full_pass_reports_every_section() {
		let (store, _dir) = store().await;
		let runner = BenchmarkRunner::new(Arc::new(store));
		let result = runner.run_full(FullBenchmarkParams { count: 50, posts_per_user: 2 }).await.unwrap();

		assert_eq!(result.database, "RocksDB");
		assert_eq!(result.insert.count, Some(50));
		assert_eq!(result.insert_related.count, Some(100));
		match result.queries.get(SuiteQuery::Aggregation).unwrap() {
			QueryMetrics::Aggregate { result, .. } => assert_eq!(result.get_i64("totalUsers"), Some(50)),
			other => panic!("unexpected metrics {:?}", other),
		}

		let popular = runner.adapter().join_lookup_inverse(&queries::popular_posts_with_author()).await.unwrap();
		assert!(popular.iter().all(|joined| joined.related.len() == 1));
	}

	#[tokio::test]
	async fn young_fixture_is_lifted_to_the_floor() {
		let (store, _dir) = store().await;
		let generator = DataGenerator::with_age_range(18..=24).unwrap();
		let runner = BenchmarkRunner::new(Arc::new(store)).with_generator(generator);
		let result = runner.run_full(FullBenchmarkParams { count: 30, posts_per_user: 1 }).await.unwrap();

		assert_eq!(result.queries.get(SuiteQuery::Count).unwrap().count(), Some(0));
		let remaining = runner.adapter().find_all(EntityKind::Users).await.unwrap();
		assert_eq!(remaining.len(), 30);
		assert!(sorted_ages(&remaining).iter().all(|age| *age == 25));
	}

	#[tokio::test]
	async fn empty_pass_fails_on_random_user() {
		let (store, _dir) = store().await;
		let runner = BenchmarkRunner::new(Arc::new(store));
		let err = runner.run_full(FullBenchmarkParams { count: 0, posts_per_user: 3 }).await.unwrap_err();
		assert!(
			matches!(
				err.downcast_ref::<HarnessError>(),
				Some(HarnessError::EmptyCollection(EntityKind::Users))
			)
		);
	}

	#[tokio::test]
	async fn stress_pass_leaves_one_batch() {
		let (store, _dir) = store().await;
		let runner = BenchmarkRunner::new(Arc::new(store));
		let result = runner
			.run_stress(StressBenchmarkParams { iterations: 5, batch_size: 20 }).await
			.unwrap();

		assert_eq!(result.iterations, 5);
		let stats = &result.insert_stats;
		assert!((stats.min as f64) <= stats.avg && stats.avg <= (stats.max as f64));
		assert_eq!(runner.adapter().find_all(EntityKind::Users).await.unwrap().len(), 20);
	}
}
