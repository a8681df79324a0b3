//! Backend-neutral filter expressions.
//!
//! Adapters either translate a [`Predicate`] into their own query language or evaluate it
//! directly against decoded records with [`Predicate::matches`].

use serde::{ Deserialize, Serialize };

use crate::error::HarnessError;
use crate::models::{ EntityKind, Field, FieldValue, Record, Value };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
	Lt,
	Lte,
	Gt,
	Gte,
	Eq,
}

impl CompareOp {
	pub fn holds(self, actual: i64, bound: i64) -> bool {
		match self {
			Self::Lt => actual < bound,
			Self::Lte => actual <= bound,
			Self::Gt => actual > bound,
			Self::Gte => actual >= bound,
			Self::Eq => actual == bound,
		}
	}
}

/// String matching supported by every adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
	EndsWith(String),
	Contains(String),
}

impl Pattern {
	pub fn is_match(&self, text: &str) -> bool {
		match self {
			Self::EndsWith(suffix) => text.ends_with(suffix.as_str()),
			Self::Contains(needle) => text.contains(needle.as_str()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
	/// Matches every record.
	All,
	Compare {
		field: Field,
		op: CompareOp,
		bound: i64,
	},
	/// Inclusive on both ends.
	Between {
		field: Field,
		low: i64,
		high: i64,
	},
	Like {
		field: Field,
		pattern: Pattern,
	},
	Equals {
		field: Field,
		value: Value,
	},
	And(Vec<Predicate>),
	Or(Vec<Predicate>),
}

impl Predicate {
	pub fn compare(field: Field, op: CompareOp, bound: i64) -> Self {
		Self::Compare { field, op, bound }
	}

	pub fn gte(field: Field, bound: i64) -> Self {
		Self::compare(field, CompareOp::Gte, bound)
	}

	pub fn lt(field: Field, bound: i64) -> Self {
		Self::compare(field, CompareOp::Lt, bound)
	}

	pub fn between(field: Field, low: i64, high: i64) -> Self {
		Self::Between { field, low, high }
	}

	pub fn ends_with(field: Field, suffix: &str) -> Self {
		Self::Like { field, pattern: Pattern::EndsWith(suffix.to_string()) }
	}

	pub fn contains(field: Field, needle: &str) -> Self {
		Self::Like { field, pattern: Pattern::Contains(needle.to_string()) }
	}

	pub fn equals(field: Field, value: impl Into<Value>) -> Self {
		Self::Equals { field, value: value.into() }
	}

	pub fn matches(&self, record: &Record) -> bool {
		match self {
			Self::All => true,
			Self::Compare { field, op, bound } =>
				match record.field(*field) {
					Some(FieldValue::Int(actual)) => op.holds(actual, *bound),
					_ => false,
				}
			Self::Between { field, low, high } =>
				match record.field(*field) {
					Some(FieldValue::Int(actual)) => *low <= actual && actual <= *high,
					_ => false,
				}
			Self::Like { field, pattern } =>
				match record.field(*field) {
					Some(FieldValue::Text(text)) => pattern.is_match(text),
					_ => false,
				}
			Self::Equals { field, value } => record.field(*field).is_some_and(|actual| value.matches(actual)),
			Self::And(predicates) => predicates.iter().all(|p| p.matches(record)),
			Self::Or(predicates) => predicates.iter().any(|p| p.matches(record)),
		}
	}

	/// Reject predicates naming fields the entity does not have.
	pub fn check(&self, kind: EntityKind) -> Result<(), HarnessError> {
		match self {
			Self::All => Ok(()),
			Self::Compare { field, .. } | Self::Between { field, .. } => field.check_numeric(kind),
			Self::Like { field, .. } | Self::Equals { field, .. } => field.check(kind),
			Self::And(predicates) | Self::Or(predicates) => {
				predicates.iter().try_for_each(|p| p.check(kind))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::{ RecordId, User };

	fn user(age: i64, email: &str) -> Record {
		Record::User(User {
			id: RecordId::from(1),
			name: "Ada Lovelace".to_string(),
			email: email.to_string(),
			age,
		})
	}

	#[test]
	fn between_is_inclusive() {
		let predicate = Predicate::between(Field::Age, 25, 50);
		assert!(predicate.matches(&user(25, "a@b.c")));
		assert!(predicate.matches(&user(50, "a@b.c")));
		assert!(!predicate.matches(&user(24, "a@b.c")));
		assert!(!predicate.matches(&user(51, "a@b.c")));
	}

	#[test]
	fn compound_predicates_compose() {
		let predicate = Predicate::And(
			vec![
				Predicate::between(Field::Age, 25, 50),
				Predicate::Or(
					vec![
						Predicate::ends_with(Field::Email, "@gmail.com"),
						Predicate::ends_with(Field::Email, "@yahoo.com")
					]
				)
			]
		);

		assert!(predicate.matches(&user(30, "ada@gmail.com")));
		assert!(predicate.matches(&user(30, "ada@yahoo.com")));
		assert!(!predicate.matches(&user(30, "ada@hotmail.com")));
		assert!(!predicate.matches(&user(60, "ada@gmail.com")));
	}

	#[test]
	fn empty_or_matches_nothing() {
		assert!(!Predicate::Or(Vec::new()).matches(&user(30, "x@y.z")));
		assert!(Predicate::And(Vec::new()).matches(&user(30, "x@y.z")));
	}

	#[test]
	fn fields_of_the_other_kind_never_match() {
		let predicate = Predicate::gte(Field::Likes, 0);
		assert!(!predicate.matches(&user(30, "x@y.z")));
		assert!(predicate.check(EntityKind::Users).is_err());
		assert!(predicate.check(EntityKind::Posts).is_ok());
	}

	#[test]
	fn range_on_text_field_is_rejected() {
		let err = Predicate::gte(Field::Email, 3).check(EntityKind::Users).unwrap_err();
		assert!(matches!(err, HarnessError::NonNumericField { field: Field::Email, .. }));
	}

	#[test]
	fn equality_compares_identifiers_as_text() {
		let id = RecordId::from(1);
		assert!(Predicate::equals(Field::Id, &id).matches(&user(30, "x@y.z")));
		assert!(!Predicate::equals(Field::Id, &RecordId::from(2)).matches(&user(30, "x@y.z")));
	}
}
