//! A composite-key index mapping value tuples to primary keys. Unique vs
//! non-unique is a higher-layer distinction (catalog / operator
//! pipeline); at this layer the composite key already ends in the
//! primary key, so two entries sharing the same value prefix coexist
//! fine.

use crate::codec::Value;
use crate::err::{Error, Result};
use crate::key::Key;
use crate::schema::IndexSchema;
use crate::tree::{Range, Tree};
use crate::txn::Transactor;

/// A single tombstone byte stored as the value of every index entry; the
/// entry's payload lives entirely in its key.
const TOMBSTONE: &[u8] = &[0];

pub struct Index<'tx> {
	tx: &'tx mut Transactor,
	schema: IndexSchema,
}

impl<'tx> Index<'tx> {
	pub fn new(tx: &'tx mut Transactor, schema: IndexSchema) -> Self {
		Index { tx, schema }
	}

	pub fn schema(&self) -> &IndexSchema {
		&self.schema
	}

	fn tree(&mut self) -> Tree<'_> {
		Tree::new(self.tx.session_mut(), self.schema.id)
	}

	/// Writes `encode(ns) || encode(v₁) || … || encode(vₙ) || encode(pk)`.
	/// Requires exactly one value per declared path and a non-zero `pk`.
	#[instrument(level = "trace", skip(self, values))]
	pub fn set(&mut self, values: Vec<Value>, pk: u64) -> Result<()> {
		if values.len() != self.schema.paths.len() {
			return Err(Error::IndexArity);
		}
		if pk == 0 {
			return Err(Error::IndexMissingKey);
		}
		let mut parts = values;
		parts.push(Value::Uint(pk));
		self.tree().put(&Key::new(parts), TOMBSTONE)
	}

	/// Returns the first primary key stored under exactly `values`, if any.
	#[instrument(level = "trace", skip(self, values))]
	pub fn exists(&mut self, values: Vec<Value>) -> Result<(bool, u64)> {
		let bound = Key::new(values);
		let range = Range::new(Some(bound.clone()), Some(bound), false);
		let mut found: Option<u64> = None;
		match self.tree().range(&range, false, |k, _| {
			found = Some(k.primary_key()?);
			// Stop after the first match; caller only wants existence.
			Err(Error::Stop)
		}) {
			Ok(()) | Err(Error::Stop) => {}
			Err(e) => return Err(e),
		}
		Ok((found.is_some(), found.unwrap_or(0)))
	}

	/// Deletes the exact composite `(values, pk)`; absence is success.
	pub fn delete(&mut self, values: Vec<Value>, pk: u64) -> Result<()> {
		let mut parts = values;
		parts.push(Value::Uint(pk));
		self.tree().delete(&Key::new(parts))
	}

	/// Iterates composite keys in `range`, passing the trailing primary key
	/// of each entry to `f`.
	pub fn range(&mut self, range: &Range, reverse: bool, mut f: impl FnMut(u64) -> Result<()>) -> Result<()> {
		self.tree().range(range, reverse, |k, _| f(k.primary_key()?))
	}

	pub fn truncate(&mut self) -> Result<()> {
		self.tree().truncate()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::idgen::Snowflake;
	use crate::kvs::mem::MemStore;
	use crate::kvs::{Options, Store};
	use crate::schema::{IndexType, PathSegment};
	use crate::txn::TransactionType;
	use std::sync::Arc;

	fn schema() -> IndexSchema {
		IndexSchema { id: 5, owner: 1, kind: IndexType::UniqueIndex, paths: vec![vec![PathSegment::Key("name".into())]] }
	}

	fn open_tx(store: &MemStore) -> Transactor {
		let session = store.new_batch_session("test");
		Transactor::new(TransactionType::Write, session, Arc::new(Snowflake::default())).with_check(crate::txn::Check::None)
	}

	#[test]
	fn set_then_exists_finds_pk() {
		let store = MemStore::new(Options::default());
		let mut tx = open_tx(&store);
		let mut index = Index::new(&mut tx, schema());
		index.set(vec![Value::Str("ada".into())], 42).unwrap();

		let (found, pk) = index.exists(vec![Value::Str("ada".into())]).unwrap();
		assert!(found);
		assert_eq!(pk, 42);
	}

	#[test]
	fn exists_on_absent_values_is_false() {
		let store = MemStore::new(Options::default());
		let mut tx = open_tx(&store);
		let mut index = Index::new(&mut tx, schema());
		let (found, _) = index.exists(vec![Value::Str("nope".into())]).unwrap();
		assert!(!found);
	}

	#[test]
	fn delete_removes_exact_composite() {
		let store = MemStore::new(Options::default());
		let mut tx = open_tx(&store);
		let mut index = Index::new(&mut tx, schema());
		index.set(vec![Value::Str("ada".into())], 42).unwrap();
		index.delete(vec![Value::Str("ada".into())], 42).unwrap();
		let (found, _) = index.exists(vec![Value::Str("ada".into())]).unwrap();
		assert!(!found);
	}

	#[test]
	fn wrong_arity_is_rejected() {
		let store = MemStore::new(Options::default());
		let mut tx = open_tx(&store);
		let mut index = Index::new(&mut tx, schema());
		let err = index.set(vec![Value::Str("a".into()), Value::Str("b".into())], 1).unwrap_err();
		assert_eq!(err, Error::IndexArity);
	}
}
