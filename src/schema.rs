//! Table and index schemas, plus the key-path mini-language used by
//! declared index specs (`"a.b[0].c"`).
//!
//! Field discovery for a user's record type is pushed to compile time via
//! `#[derive(Serialize, Deserialize)]` on the type plus the optional
//! [`Model`] trait overrides, rather than runtime reflection.

use crate::codec::Step;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A parsed segment of a key-path spec: either a struct/map field name or
/// an array index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PathSegment {
	Key(String),
	Index(i64),
}

impl PathSegment {
	pub fn to_step(&self) -> Step {
		match self {
			PathSegment::Key(s) => Step::from(s.as_str()),
			PathSegment::Index(i) => Step::Index(*i as usize),
		}
	}
}

pub type KeyPath = Vec<PathSegment>;

/// Converts a [`KeyPath`] to the [`Step`] sequence `codec::get`/`codec::set`
/// expect.
pub fn to_steps(path: &KeyPath) -> Vec<Step> {
	path.iter().map(PathSegment::to_step).collect()
}

/// Parses a dotted/bracketed path spec such as `"a.b[0].c"` into
/// `[Key("a"), Key("b"), Index(0), Key("c")]` (brackets delimit an
/// index, dots delimit a key, nothing else is special).
pub fn parse_key_path(s: &str) -> KeyPath {
	let mut out = Vec::new();
	let mut buf = String::new();
	for ch in s.chars() {
		match ch {
			'[' => {}
			']' => {
				out.push(PathSegment::Index(buf.parse().unwrap_or(0)));
				buf.clear();
			}
			'.' => {
				if !buf.is_empty() {
					out.push(PathSegment::Key(std::mem::take(&mut buf)));
				}
			}
			c => buf.push(c),
		}
	}
	if !buf.is_empty() {
		out.push(PathSegment::Key(buf));
	}
	out
}

/// Whether an index enforces uniqueness on its value tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
	Index,
	UniqueIndex,
}

/// `{ID, Owner, Kind, Paths}` — one entry per declared index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexSchema {
	pub id: u64,
	pub owner: u64,
	pub kind: IndexType,
	pub paths: Vec<KeyPath>,
}

impl IndexSchema {
	/// A fresh, not-yet-persisted schema for a single `spec` string, which
	/// may itself be a comma-separated list of paths for a composite index.
	pub fn from_spec(owner: u64, kind: IndexType, spec: &str) -> Self {
		IndexSchema {
			id: 0,
			owner,
			kind,
			paths: spec.split(',').map(parse_key_path).collect(),
		}
	}
}

/// `{ID, Name, Indexes}` for a user-supplied record type, derived on
/// first registration with the catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableSchema {
	pub id: u64,
	pub name: String,
	#[serde(skip)]
	pub index_schemas: HashMap<String, IndexSchema>,
}

impl TableSchema {
	pub fn new(name: impl Into<String>) -> Self {
		TableSchema { id: 0, name: name.into(), index_schemas: HashMap::new() }
	}

	pub fn index_schema(&self, spec: &str) -> Option<&IndexSchema> {
		self.index_schemas.get(spec)
	}
}

/// Optional overrides a record type can implement to customize its table
/// name and declared indexes; the defaults mirror the reference
/// implementation's fallback when `CanTableName`/`CanIndexes` go
/// unimplemented.
pub trait Model: Serialize + DeserializeOwned {
	/// Defaults to the type's bare name (no module path).
	fn table_name() -> String {
		let full = std::any::type_name::<Self>();
		full.rsplit("::").next().unwrap_or(full).to_string()
	}

	/// `(path-spec, kind)` pairs; defaults to none.
	fn indexes() -> Vec<(&'static str, IndexType)> {
		Vec::new()
	}
}
