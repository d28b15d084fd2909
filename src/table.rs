//! A table is `(transaction, tree, schema)` — namespaced primary-key
//! storage for documents. Tables do not themselves maintain index
//! entries; that is the job of higher-level operators that know the full
//! schema.

use crate::codec::Value;
use crate::doc::Document;
use crate::err::{Error, Result};
use crate::key::Key;
use crate::schema::TableSchema;
use crate::tree::{Range, Tree};
use crate::txn::Transactor;

pub struct Table<'tx> {
	tx: &'tx mut Transactor,
	schema: TableSchema,
}

impl<'tx> Table<'tx> {
	pub fn new(tx: &'tx mut Transactor, schema: TableSchema) -> Self {
		Table { tx, schema }
	}

	pub fn schema(&self) -> &TableSchema {
		&self.schema
	}

	fn tree(&mut self) -> Tree<'_> {
		Tree::new(self.tx.session_mut(), self.schema.id)
	}

	/// Allocates a primary key if `doc` doesn't carry one, then inserts it.
	/// A colliding key surfaces as `Error::Conflict { name: "pk", .. }`.
	#[instrument(level = "trace", skip(self, doc))]
	pub fn insert(&mut self, mut doc: Document) -> Result<(Key, Document)> {
		let mut pk = doc.primary_key();
		if pk == 0 {
			pk = self.tx.id();
			doc.set_primary_key(pk)?;
		}
		let enc = doc.marshal()?;
		let key = Key::new(vec![Value::Uint(pk)]);
		self.tree().insert(&key, &enc)?;
		Ok((key, doc))
	}

	pub fn get(&mut self, key: &Key) -> Result<Document> {
		let data = self.tree().get(key)?;
		Ok(Document::from_bytes(data))
	}

	/// Idempotent: deleting an absent key is success.
	pub fn delete(&mut self, key: &Key) -> Result<()> {
		self.tree().delete(key)
	}

	/// Requires the key to already exist.
	pub fn replace(&mut self, key: &Key, mut doc: Document) -> Result<()> {
		if !self.tree().exists(key)? {
			return Err(Error::not_found(format!("{:?}", key.values())));
		}
		let enc = doc.marshal()?;
		self.tree().put(key, &enc)
	}

	pub fn range(
		&mut self,
		range: &Range,
		reverse: bool,
		mut f: impl FnMut(Key, Document) -> Result<()>,
	) -> Result<()> {
		self.tree().range(range, reverse, |k, v| f(k, Document::from_bytes(v.to_vec())))
	}

	pub fn truncate(&mut self) -> Result<()> {
		self.tree().truncate()
	}
}
