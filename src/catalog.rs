//! The self-describing schema registry. Schemas for user record types are
//! derived lazily, persisted as rows in two bootstrap tables, and cached
//! in-process; the catalog's own schemas for `TableSchema` and
//! `IndexSchema` are hard-coded to break the bootstrap recursion.

use crate::codec::Value;
use crate::doc::Document;
use crate::err::{Error, Result};
use crate::index::Index;
use crate::key::{Key, Namespace};
use crate::schema::{IndexSchema, IndexType, Model, PathSegment, TableSchema};
use crate::table::Table;
use crate::txn::Transactor;
use parking_lot::Mutex;
use quick_cache::sync::Cache;

/// Rows describing user tables.
const NS_TABLES: Namespace = 0;
/// Rows describing user indexes.
const NS_INDEXES: Namespace = 1;
/// Unique index on `TableSchema.name`, resolving a table's bootstrap row
/// on re-registration without re-deriving a fresh ID (a namespace the
/// distilled design left implicit; reserved here rather than overloading
/// namespace 0 itself).
const NS_TABLE_NAME_INDEX: Namespace = 2;
/// Unique index on `(IndexSchema.owner, canonical path spec)`, the index
/// analogue of `NS_TABLE_NAME_INDEX`.
const NS_INDEX_SPEC_INDEX: Namespace = 3;

const CACHE_CAPACITY: usize = 4096;

/// Maps a user-supplied record type to its `TableSchema`, persisting and
/// caching the mapping.
pub struct Catalog {
	cache: Cache<String, TableSchema>,
	lock: Mutex<()>,
}

impl Catalog {
	pub fn new() -> Self {
		Catalog { cache: Cache::new(CACHE_CAPACITY), lock: Mutex::new(()) }
	}

	fn table_schemas_bootstrap() -> TableSchema {
		TableSchema { id: NS_TABLES, name: "__table_schemas".into(), index_schemas: Default::default() }
	}

	fn index_schemas_bootstrap() -> TableSchema {
		TableSchema { id: NS_INDEXES, name: "__index_schemas".into(), index_schemas: Default::default() }
	}

	fn table_name_index() -> IndexSchema {
		IndexSchema {
			id: NS_TABLE_NAME_INDEX,
			owner: NS_TABLES,
			kind: IndexType::UniqueIndex,
			paths: vec![vec![PathSegment::Key("name".into())]],
		}
	}

	fn index_spec_index() -> IndexSchema {
		IndexSchema {
			id: NS_INDEX_SPEC_INDEX,
			owner: NS_INDEXES,
			kind: IndexType::UniqueIndex,
			paths: vec![vec![PathSegment::Key("owner".into())], vec![PathSegment::Key("spec".into())]],
		}
	}

	/// Returns the cached or freshly derived-and-persisted schema for `T`
	///. Callers in a nested pipeline must pass the already-open
	/// transaction they hold; the catalog never opens one of its own, to
	/// avoid deadlocking against the single-writer-per-db KV engine.
	#[instrument(level = "trace", skip(self, tx))]
	pub fn table_schema_for<T: Model>(&self, tx: &mut Transactor) -> Result<TableSchema> {
		let type_key = std::any::type_name::<T>().to_string();
		if let Some(schema) = self.cache.get(&type_key) {
			return Ok(schema);
		}

		let _guard = self.lock.lock();
		if let Some(schema) = self.cache.get(&type_key) {
			return Ok(schema);
		}

		let mut schema = TableSchema::new(T::table_name());
		self.sync_table(tx, &mut schema)?;

		for (spec, kind) in T::indexes() {
			let mut ischema = IndexSchema::from_spec(schema.id, kind, spec);
			self.sync_index(tx, &mut ischema)?;
			schema.index_schemas.insert(spec.to_string(), ischema);
		}

		self.cache.insert(type_key, schema.clone());
		Ok(schema)
	}

	/// Resolves one of `T`'s declared index schemas by its spec string,
	/// deriving and persisting `T`'s full schema first if necessary.
	pub fn index_schema_for<T: Model>(&self, tx: &mut Transactor, spec: &str) -> Result<IndexSchema> {
		let schema = self.table_schema_for::<T>(tx)?;
		schema
			.index_schema(spec)
			.cloned()
			.ok_or_else(|| Error::not_found(format!("index {spec:?} on table {:?}", schema.name)))
	}

	/// Look up `schema`'s row by name, upsert it, and re-emit its name
	/// index entry.
	fn sync_table(&self, tx: &mut Transactor, schema: &mut TableSchema) -> Result<()> {
		let name_spec = schema.name.clone();
		{
			let mut name_index = Index::new(tx, Self::table_name_index());
			let (found, pk) = name_index.exists(vec![Value::Str(name_spec.clone())])?;
			if found {
				schema.id = pk;
			}
		}

		self.upsert_row(tx, Self::table_schemas_bootstrap(), schema)?;

		let mut name_index = Index::new(tx, Self::table_name_index());
		name_index.set(vec![Value::Str(name_spec)], schema.id)
	}

	/// Same as `sync_table` but for an `IndexSchema` row, keyed by
	/// `(owner, canonical spec)` instead of a bare name.
	fn sync_index(&self, tx: &mut Transactor, schema: &mut IndexSchema) -> Result<()> {
		let spec = canonical_spec(&schema.paths);
		{
			let mut spec_index = Index::new(tx, Self::index_spec_index());
			let (found, pk) = spec_index.exists(vec![Value::Uint(schema.owner), Value::Str(spec.clone())])?;
			if found {
				schema.id = pk;
			}
		}

		self.upsert_row(tx, Self::index_schemas_bootstrap(), schema)?;

		let mut spec_index = Index::new(tx, Self::index_spec_index());
		spec_index.set(vec![Value::Uint(schema.owner), Value::Str(spec)], schema.id)
	}

	/// `insert`; on a PK conflict (a pre-existing row found via the name/
	/// spec index above) fall back to `replace` under the known key.
	fn upsert_row<S>(&self, tx: &mut Transactor, table_schema: TableSchema, row: &mut S) -> Result<()>
	where
		S: serde::Serialize + serde::de::DeserializeOwned + HasId,
	{
		let mut table = Table::new(tx, table_schema);
		if row.id() != 0 {
			let mut doc = Document::from_record(&*row)?;
			doc.set_primary_key(row.id())?;
			let key = Key::new(vec![Value::Uint(row.id())]);
			if table.replace(&key, doc).is_ok() {
				return Ok(());
			}
		}
		let doc = Document::from_record(&*row)?;
		match table.insert(doc) {
			Ok((key, _)) => {
				row.set_id(key.primary_key()?);
				Ok(())
			}
			Err(e) => Err(e),
		}
	}
}

impl Default for Catalog {
	fn default() -> Self {
		Catalog::new()
	}
}

/// Lets `upsert_row` treat `TableSchema` and `IndexSchema` uniformly.
trait HasId {
	fn id(&self) -> u64;
	fn set_id(&mut self, id: u64);
}

impl HasId for TableSchema {
	fn id(&self) -> u64 {
		self.id
	}
	fn set_id(&mut self, id: u64) {
		self.id = id;
	}
}

impl HasId for IndexSchema {
	fn id(&self) -> u64 {
		self.id
	}
	fn set_id(&mut self, id: u64) {
		self.id = id;
	}
}

/// A stable-enough string identity for a set of key paths, used only to
/// recognise a previously-registered index across process restarts (not
/// a faithful inverse of `parse_key_path`).
fn canonical_spec(paths: &[crate::schema::KeyPath]) -> String {
	paths
		.iter()
		.map(|path| {
			path.iter()
				.map(|seg| match seg {
					PathSegment::Key(k) => k.clone(),
					PathSegment::Index(i) => format!("[{i}]"),
				})
				.collect::<Vec<_>>()
				.join(".")
		})
		.collect::<Vec<_>>()
		.join(",")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::idgen::Snowflake;
	use crate::kvs::mem::MemStore;
	use crate::kvs::{Options, Store};
	use crate::schema::IndexType;
	use crate::txn::TransactionType;
	use serde::{Deserialize, Serialize};
	use std::sync::Arc;

	#[derive(Serialize, Deserialize, Clone)]
	struct User {
		#[serde(default)]
		id: u64,
		name: String,
	}

	impl Model for User {
		fn indexes() -> Vec<(&'static str, IndexType)> {
			vec![("name", IndexType::UniqueIndex)]
		}
	}

	#[derive(Serialize, Deserialize, Clone)]
	struct Order {
		#[serde(default)]
		id: u64,
	}
	impl Model for Order {}

	fn open_tx(store: &MemStore) -> Transactor {
		let session = store.new_batch_session("test");
		Transactor::new(TransactionType::Write, session, Arc::new(Snowflake::default())).with_check(crate::txn::Check::None)
	}

	#[test]
	fn table_schema_for_is_idempotent_across_calls() {
		let store = MemStore::new(Options::default());
		let catalog = Catalog::new();

		let mut tx = open_tx(&store);
		let first = catalog.table_schema_for::<User>(&mut tx).unwrap();
		let second = catalog.table_schema_for::<User>(&mut tx).unwrap();
		tx.commit().unwrap();

		assert_eq!(first.id, second.id);
		assert_ne!(first.id, 0);
		assert!(first.index_schemas.contains_key("name"));
	}

	#[test]
	fn distinct_types_get_distinct_namespaces() {
		let store = MemStore::new(Options::default());
		let catalog = Catalog::new();

		let mut tx = open_tx(&store);
		let users = catalog.table_schema_for::<User>(&mut tx).unwrap();
		let orders = catalog.table_schema_for::<Order>(&mut tx).unwrap();
		tx.commit().unwrap();

		assert_ne!(users.id, orders.id);
	}

	#[test]
	fn schema_survives_a_fresh_catalog_after_commit() {
		let store = MemStore::new(Options::default());
		let id = {
			let catalog = Catalog::new();
			let mut tx = open_tx(&store);
			let schema = catalog.table_schema_for::<User>(&mut tx).unwrap();
			tx.commit().unwrap();
			schema.id
		};

		// A second, uncached catalog re-derives the same persisted row.
		let catalog = Catalog::new();
		let mut tx = open_tx(&store);
		let schema = catalog.table_schema_for::<User>(&mut tx).unwrap();
		tx.commit().unwrap();
		assert_eq!(schema.id, id);
	}
}
