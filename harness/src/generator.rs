//! Synthetic users and posts.
//!
//! Content is pseudorandom; cardinalities and value domains are exact.

use std::ops::RangeInclusive;

use chrono::{ Duration, Utc };
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::HarnessError;
use crate::models::{ NewPost, NewUser, RecordId };

pub const AGE_RANGE: RangeInclusive<i64> = 18..=70;
pub const LIKES_RANGE: RangeInclusive<i64> = 0..=1000;

const PAST_WINDOW_SECONDS: i64 = 365 * 24 * 60 * 60;

const FIRST_NAMES: &[&str] = &[
	"Ada", "Alan", "Amara", "Beatrice", "Carlos", "Chen", "Dana", "Dmitri", "Elena", "Farah",
	"Grace", "Hiro", "Ines", "Jamal", "Kofi", "Lena", "Marcus", "Nadia", "Omar", "Priya",
	"Quinn", "Rosa", "Sven", "Tariq", "Uma", "Victor", "Wen", "Ximena", "Yusuf", "Zoe",
];

const LAST_NAMES: &[&str] = &[
	"Abbott", "Baker", "Castillo", "Dubois", "Eriksen", "Fischer", "Garcia", "Hopper",
	"Ivanova", "Johnson", "Kowalski", "Lovelace", "Moreau", "Nakamura", "Okafor", "Petrov",
	"Quintero", "Rossi", "Schmidt", "Turing", "Usman", "Vargas", "Weber", "Yamamoto", "Zhang",
];

const EMAIL_PROVIDERS: &[&str] = &["gmail.com", "yahoo.com", "hotmail.com"];

const LOREM: &[&str] = &[
	"lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
	"eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua",
	"enim", "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris",
	"nisi", "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in",
	"reprehenderit", "voluptate", "velit", "esse", "cillum", "fugiat", "nulla", "pariatur",
	"excepteur", "sint", "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui",
	"officia", "deserunt", "mollit", "anim", "id", "est", "laborum",
];

#[derive(Debug, Clone)]
pub struct DataGenerator {
	age_range: RangeInclusive<i64>,
}

impl Default for DataGenerator {
	fn default() -> Self {
		Self { age_range: AGE_RANGE }
	}
}

impl DataGenerator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Narrow the generated ages, e.g. to seed a fixture where every user is under 25.
	/// The range must stay within [`AGE_RANGE`].
	pub fn with_age_range(age_range: RangeInclusive<i64>) -> Result<Self, HarnessError> {
		let (start, end) = (*age_range.start(), *age_range.end());
		if start > end || start < *AGE_RANGE.start() || end > *AGE_RANGE.end() {
			return Err(HarnessError::AgeRangeOutOfBounds { start, end });
		}
		Ok(Self { age_range })
	}

	pub fn users(&self, count: usize) -> Vec<NewUser> {
		let mut rng = rand::thread_rng();
		(0..count)
			.map(|_| {
				let first = pick(&mut rng, FIRST_NAMES);
				let last = pick(&mut rng, LAST_NAMES);
				NewUser {
					name: format!("{} {}", first, last),
					email: email(&mut rng, first, last),
					age: rng.gen_range(self.age_range.clone()),
				}
			})
			.collect()
	}

	pub fn posts_for_user(&self, user_id: &RecordId, count: usize) -> Vec<NewPost> {
		let mut rng = rand::thread_rng();
		let now = Utc::now();
		(0..count)
			.map(|_| NewPost {
				user_id: user_id.clone(),
				title: sentence(&mut rng),
				content: paragraphs(&mut rng),
				created_at: now - Duration::seconds(rng.gen_range(1..=PAST_WINDOW_SECONDS)),
				likes: rng.gen_range(LIKES_RANGE),
			})
			.collect()
	}
}

pub fn generate_users(count: usize) -> Vec<NewUser> {
	DataGenerator::default().users(count)
}

pub fn generate_posts_for_user(user_id: &RecordId, count: usize) -> Vec<NewPost> {
	DataGenerator::default().posts_for_user(user_id, count)
}

fn pick<'a, R: Rng>(rng: &mut R, words: &[&'a str]) -> &'a str {
	words.choose(rng).copied().unwrap_or_default()
}

fn email<R: Rng>(rng: &mut R, first: &str, last: &str) -> String {
	let separator = ["", ".", "_"].choose(rng).copied().unwrap_or_default();
	format!(
		"{}{}{}{}@{}",
		first.to_lowercase(),
		separator,
		last.to_lowercase(),
		rng.gen_range(1..100),
		pick(rng, EMAIL_PROVIDERS)
	)
}

fn sentence<R: Rng>(rng: &mut R) -> String {
	let len = rng.gen_range(4..=10);
	let words: Vec<&str> = (0..len).map(|_| pick(rng, LOREM)).collect();
	let mut sentence = String::new();
	if let Some(first) = words.first() {
		let mut chars = first.chars();
		if let Some(c) = chars.next() {
			sentence.extend(c.to_uppercase());
			sentence.push_str(chars.as_str());
		}
	}
	for word in words.iter().skip(1) {
		sentence.push(' ');
		sentence.push_str(word);
	}
	sentence.push('.');
	sentence
}

fn paragraphs<R: Rng>(rng: &mut R) -> String {
	(0..3)
		.map(|_| {
			let sentences = rng.gen_range(3..=6);
			(0..sentences)
				.map(|_| sentence(rng))
				.collect::<Vec<_>>()
				.join(" ")
		})
		.collect::<Vec<_>>()
		.join("\n")
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn emails_look_like_addresses() {
		for user in generate_users(200) {
			let (local, domain) = user.email.split_once('@').unwrap();
			assert!(!local.is_empty());
			assert!(EMAIL_PROVIDERS.contains(&domain), "unexpected domain {}", domain);
		}
	}

	#[test]
	fn content_has_several_paragraphs() {
		let posts = generate_posts_for_user(&RecordId::from(1), 5);
		for post in posts {
			assert_eq!(post.content.lines().count(), 3);
			assert!(post.title.ends_with('.'));
			assert!(post.created_at < Utc::now());
		}
	}

	#[test]
	fn narrowed_age_range_must_fit_the_domain() {
		assert!(DataGenerator::with_age_range(18..=24).is_ok());
		assert!(DataGenerator::with_age_range(10..=24).is_err());
		assert!(DataGenerator::with_age_range(30..=80).is_err());
		assert!(DataGenerator::with_age_range(40..=30).is_err());
	}

	#[test]
	fn narrowed_generator_only_yields_that_range() {
		let generator = DataGenerator::with_age_range(18..=24).unwrap();
		assert!(generator.users(100).iter().all(|u| (18..=24).contains(&u.age)));
	}

	proptest! {
		#[test]
		fn users_have_exact_count_and_age_domain(n in 0usize..300) {
			let users = generate_users(n);
			prop_assert_eq!(users.len(), n);
			prop_assert!(users.iter().all(|u| AGE_RANGE.contains(&u.age)));
		}

		#[test]
		fn posts_reference_their_user(id in 1i64..1_000_000, k in 0usize..50) {
			let user_id = RecordId::from(id);
			let posts = generate_posts_for_user(&user_id, k);
			prop_assert_eq!(posts.len(), k);
			prop_assert!(posts.iter().all(|p| p.user_id == user_id));
			prop_assert!(posts.iter().all(|p| LIKES_RANGE.contains(&p.likes)));
		}
	}
}
