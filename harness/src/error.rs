use thiserror::Error;

use crate::models::{ EntityKind, Field, Value };

/// Failures raised by the harness itself rather than by a storage backend.
#[derive(Debug, Error)]
pub enum HarnessError {
	#[error("no {0} available: the collection is empty")]
	EmptyCollection(EntityKind),

	#[error("field `{field}` does not exist on {kind}")]
	UnknownField {
		kind: EntityKind,
		field: Field,
	},

	#[error("field `{field}` on {kind} is not numeric")]
	NonNumericField {
		kind: EntityKind,
		field: Field,
	},

	#[error("no relationship from {parent} to {child}")]
	NoRelationship {
		parent: EntityKind,
		child: EntityKind,
	},

	#[error("cannot assign {value:?} to `{field}` on {kind}")]
	InvalidAssignment {
		kind: EntityKind,
		field: Field,
		value: Value,
	},

	#[error("age range {start}..={end} is outside 18..=70")]
	AgeRangeOutOfBounds {
		start: i64,
		end: i64,
	},

	#[error("cannot summarize an empty sample set")]
	NoSamples,
}
