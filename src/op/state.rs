//! The mutable bag threaded through an operator chain. Nested pipelines
//! (spawned by `OnConflict`) link to the outer state through a trait
//! object rather than a concrete `&mut State`, so the borrow on the
//! enclosing state can be shorter-lived than (and independent of) `'a`,
//! the lifetime the whole chain's database and transaction references
//! share.

use crate::ctx::Context;
use crate::db::Database;
use crate::doc::Document;
use crate::err::{Error, Result};
use crate::key::Key;
use crate::txn::Transactor;

/// What a nested state can fall back to in whatever encloses it. `State`
/// implements this for itself; going through the trait — rather than a
/// concrete `&'a mut State<'a>` — is what lets `State::child` borrow an
/// outer state for a lifetime unrelated to that outer state's own `'a`.
pub trait Outer<'a> {
	fn ctx(&self) -> Context;
	fn database(&self) -> Result<&'a Database>;
	fn transaction(&mut self) -> Result<&mut Transactor>;
}

/// Carries context, database, transaction, current key/document, and an
/// optional link to an enclosing state. Transaction and database lookups
/// walk the outer chain when the local slot is unset.
pub struct State<'a> {
	ctx: Context,
	db: Option<&'a Database>,
	tx: Option<&'a mut Transactor>,
	key: Option<Key>,
	doc: Option<Document>,
	outer: Option<Box<dyn Outer<'a> + 'a>>,
}

impl<'a> State<'a> {
	pub fn new(ctx: Context) -> Self {
		State { ctx, db: None, tx: None, key: None, doc: None, outer: None }
	}

	/// A fresh state for a nested pipeline, inheriting `outer`'s context and
	/// falling back to it for database/transaction lookups. `outer` only
	/// needs to live as long as this call's reborrow, not as long as `'a`.
	pub fn child<'o>(outer: &'o mut dyn Outer<'a>) -> Self
	where
		'o: 'a,
	{
		let ctx = outer.ctx();
		let link: Box<dyn Outer<'a> + 'a> = Box::new(Link(outer));
		State { ctx, db: None, tx: None, key: None, doc: None, outer: Some(link) }
	}

	pub fn ctx(&self) -> &Context {
		&self.ctx
	}

	pub fn set_database(&mut self, db: &'a Database) {
		self.db = Some(db);
	}

	pub fn set_transaction(&mut self, tx: &'a mut Transactor) {
		self.tx = Some(tx);
	}

	pub fn database(&self) -> Result<&'a Database> {
		if let Some(db) = self.db {
			return Ok(db);
		}
		match &self.outer {
			Some(outer) => outer.database(),
			None => Err(Error::Other("no database in scope".into())),
		}
	}

	pub fn transaction(&mut self) -> Result<&mut Transactor> {
		if self.tx.is_some() {
			return Ok(self.tx.as_mut().expect("checked above"));
		}
		match self.outer.as_mut() {
			Some(outer) => outer.transaction(),
			None => Err(Error::Other("no transaction in scope".into())),
		}
	}

	pub fn key(&self) -> Option<&Key> {
		self.key.as_ref()
	}

	pub fn set_key(&mut self, key: Option<Key>) {
		self.key = key;
	}

	pub fn doc(&mut self) -> Option<&mut Document> {
		self.doc.as_mut()
	}

	pub fn take_doc(&mut self) -> Option<Document> {
		self.doc.take()
	}

	pub fn set_doc(&mut self, doc: Option<Document>) {
		self.doc = doc;
	}
}

impl<'a> Outer<'a> for State<'a> {
	fn ctx(&self) -> Context {
		self.ctx.clone()
	}

	fn database(&self) -> Result<&'a Database> {
		State::database(self)
	}

	fn transaction(&mut self) -> Result<&mut Transactor> {
		State::transaction(self)
	}
}

/// Wraps a short-lived `&mut dyn Outer<'a>` so it can live behind the
/// `Box<dyn Outer<'a> + 'a>` slot `State::outer` stores.
struct Link<'o, 'a>(&'o mut dyn Outer<'a>);

impl<'o, 'a> Outer<'a> for Link<'o, 'a> {
	fn ctx(&self) -> Context {
		self.0.ctx()
	}

	fn database(&self) -> Result<&'a Database> {
		self.0.database()
	}

	fn transaction(&mut self) -> Result<&mut Transactor> {
		self.0.transaction()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transaction_lookup_falls_back_to_outer() {
		use crate::idgen::Snowflake;
		use crate::kvs::mem::MemStore;
		use crate::kvs::{Options, Store};
		use crate::txn::{Check, TransactionType};
		use std::sync::Arc;

		let store = MemStore::new(Options::default());
		let session = store.new_batch_session("test");
		let mut tx = Transactor::new(TransactionType::Write, session, Arc::new(Snowflake::default())).with_check(Check::None);

		let mut outer = State::new(Context::background());
		outer.set_transaction(&mut tx);

		{
			let mut inner = State::child(&mut outer);
			assert!(inner.transaction().is_ok());
		}
	}

	#[test]
	fn doc_round_trips() {
		let mut state = State::new(Context::background());
		assert!(state.doc().is_none());
		state.set_doc(Some(Document::from_value(crate::codec::Value::Null)));
		assert!(state.doc().is_some());
		assert!(state.take_doc().is_some());
		assert!(state.doc().is_none());
	}
}
