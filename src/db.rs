//! The top-level façade owning the KV store, catalog, and ID generator.

use crate::catalog::Catalog;
use crate::ctx::Context;
use crate::err::{Error, Result};
use crate::idgen::Gen;
use crate::index::Index;
use crate::kvs::Store;
use crate::op::{Operator, State};
use crate::schema::Model;
use crate::table::Table;
use crate::txn::{TransactionType, Transactor};
use std::sync::Arc;

pub struct Database {
	store: Arc<dyn Store>,
	name: String,
	gen: Arc<dyn Gen>,
	catalog: Catalog,
}

impl Database {
	pub fn new(store: Arc<dyn Store>, db_name: impl Into<String>, gen: Arc<dyn Gen>) -> Self {
		Database { store, name: db_name.into(), gen, catalog: Catalog::new() }
	}

	pub fn catalog(&self) -> &Catalog {
		&self.catalog
	}

	/// Opens a read-only or read-write transaction against this database
	///. A write transaction also acquires the store's shared
	/// snapshot for concurrent readers.
	pub fn begin(&self, kind: TransactionType) -> Transactor {
		let session = match kind {
			TransactionType::Read => self.store.new_snapshot_session(&self.name),
			TransactionType::Write => self.store.new_batch_session(&self.name),
		};
		Transactor::new(kind, session, self.gen.clone())
	}

	pub fn begin_read(&self) -> Result<Transactor> {
		Ok(self.begin(TransactionType::Read))
	}

	pub fn begin_write(&self) -> Result<Transactor> {
		Ok(self.begin(TransactionType::Write))
	}

	/// Resolves `T`'s table within `tx`, deriving and persisting its schema
	/// on first use.
	pub fn table<'tx, T: Model>(&self, tx: &'tx mut Transactor) -> Result<Table<'tx>> {
		let schema = self.catalog.table_schema_for::<T>(tx)?;
		Ok(Table::new(tx, schema))
	}

	/// Resolves one of `T`'s declared indexes by its spec string.
	pub fn index<'tx, T: Model>(&self, tx: &'tx mut Transactor, spec: &str) -> Result<Index<'tx>> {
		let schema = self.catalog.index_schema_for::<T>(tx, spec)?;
		Ok(Index::new(tx, schema))
	}

	/// Runs `op` to completion within a single write transaction: begins
	/// the transaction, attaches it and this database to a fresh
	/// [`State`], drives the pipeline, and commits on success or rolls
	/// back on any error (including cancellation).
	#[instrument(level = "trace", skip(self, op))]
	pub async fn execute(&self, ctx: Context, op: &dyn Operator) -> Result<()> {
		if ctx.is_done() {
			return Err(Error::Cancelled);
		}

		let mut tx = self.begin(TransactionType::Write);
		let result = {
			let mut state = State::new(ctx);
			state.set_database(self);
			state.set_transaction(&mut tx);
			op.iterate(&mut state, &mut |_| Ok(()))
		};

		match result {
			Ok(()) => tx.commit(),
			Err(e) => {
				tx.rollback().ok();
				Err(e)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::doc::Document;
	use crate::idgen::Snowflake;
	use crate::kvs::mem::MemStore;
	use crate::op::{insert, omit, pipe};
	use crate::schema::IndexType;
	use crate::tree::Range;
	use serde::{Deserialize, Serialize};

	#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
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

	fn database() -> Database {
		Database::new(Arc::new(MemStore::new(crate::kvs::Options::default())), "test", Arc::new(Snowflake::default()))
	}

	#[tokio::test]
	async fn execute_commits_on_success() {
		let db = database();
		let doc = Document::from_record(&User { id: 0, name: "ada".into() }).unwrap();
		let pipeline = pipe(vec![Some(omit(vec![doc])), Some(insert::<User>())]);
		db.execute(Context::background(), pipeline.as_ref()).await.unwrap();

		let mut tx = db.begin_read().unwrap();
		let mut table = db.table::<User>(&mut tx).unwrap();
		let mut seen = Vec::new();
		table
			.range(&Range::all(), false, |_, mut doc| {
				seen.push(doc.unmarshal::<User>()?.name);
				Ok(())
			})
			.unwrap();
		assert_eq!(seen, vec!["ada".to_string()]);
	}

	#[tokio::test]
	async fn execute_rolls_back_on_error() {
		let db = database();
		let doc = Document::from_record(&User { id: 0, name: "ada".into() }).unwrap();

		// A second distinct document with the same unique name conflicts and
		// is not wrapped in on_conflict, so the whole execute call fails and
		// neither row this pipeline tried to write should be visible.
		let pipeline = pipe(vec![Some(omit(vec![doc.clone(), doc])), Some(insert::<User>())]);
		assert!(db.execute(Context::background(), pipeline.as_ref()).await.is_err());

		let mut tx = db.begin_read().unwrap();
		let mut table = db.table::<User>(&mut tx).unwrap();
		let mut count = 0;
		table
			.range(&Range::all(), false, |_, _| {
				count += 1;
				Ok(())
			})
			.unwrap();
		assert_eq!(count, 0);
	}

	#[tokio::test]
	async fn execute_fails_on_an_already_cancelled_context() {
		let db = database();
		let ctx = Context::background();
		ctx.cancel();
		let pipeline = pipe(vec![Some(omit(Vec::new())), Some(insert::<User>())]);
		assert_eq!(db.execute(ctx, pipeline.as_ref()).await, Err(Error::Cancelled));
	}
}
