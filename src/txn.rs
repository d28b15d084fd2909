//! Transactions: a wrapped KV session plus ID generation and commit/rollback
//! hooks, with a configurable drop-time check for a transaction that was
//! never explicitly finished.

use crate::err::{Error, Result};
use crate::idgen::Gen;
use crate::kvs::{CommitOptions, Session};
use std::collections::HashMap;
use std::sync::Arc;

const TARGET: &str = "bitewise::txn";

/// What happens when a read-write transaction is dropped without an
/// explicit `commit`/`rollback`. Default is `Warn`.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
	None,
	#[default]
	Warn,
	Panic,
}

/// Whether a transaction is backed by a read-only snapshot or a read-write
/// batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransactionType {
	Read,
	Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
	Commit,
	Rollback,
}

/// A set of undoable reads/writes against the keyspace.
#[non_exhaustive]
pub struct Transactor {
	kind: TransactionType,
	session: Box<dyn Session>,
	gen: Arc<dyn Gen>,
	hooks: HashMap<Event, Vec<Box<dyn FnOnce() + Send>>>,
	finished: bool,
	check: Check,
}

impl Transactor {
	pub fn new(kind: TransactionType, session: Box<dyn Session>, gen: Arc<dyn Gen>) -> Self {
		Transactor {
			kind,
			session,
			gen,
			hooks: HashMap::new(),
			finished: false,
			check: Check::default(),
		}
	}

	pub fn with_check(mut self, check: Check) -> Self {
		self.check = check;
		self
	}

	pub fn kind(&self) -> TransactionType {
		self.kind
	}

	pub fn is_finished(&self) -> bool {
		self.finished
	}

	/// A strictly monotonic 64-bit id from the injected [`Gen`].
	pub fn id(&self) -> u64 {
		self.gen.id()
	}

	pub fn session(&self) -> &dyn Session {
		&*self.session
	}

	pub fn session_mut(&mut self) -> &mut dyn Session {
		&mut *self.session
	}

	/// Registers a callback run (in LIFO order) when `event` fires.
	pub fn on(&mut self, event: Event, callback: impl FnOnce() + Send + 'static) {
		self.hooks.entry(event).or_default().push(Box::new(callback));
	}

	#[instrument(level = "trace", skip(self))]
	pub fn commit(&mut self) -> Result<()> {
		if self.finished {
			return Err(Error::TxFinished);
		}
		if self.kind == TransactionType::Read {
			return Err(Error::TxReadonly);
		}
		self.session
			.commit(CommitOptions::default())
			.map_err(|e| Error::Engine(e.to_string()))?;
		self.session.close().ok();
		self.finished = true;
		self.run_hooks(Event::Commit);
		Ok(())
	}

	#[instrument(level = "trace", skip(self))]
	pub fn rollback(&mut self) -> Result<()> {
		if self.finished {
			return Err(Error::TxFinished);
		}
		self.session.close().map_err(|e| Error::Engine(e.to_string()))?;
		self.finished = true;
		self.run_hooks(Event::Rollback);
		Ok(())
	}

	fn run_hooks(&mut self, event: Event) {
		if let Some(hooks) = self.hooks.remove(&event) {
			for hook in hooks.into_iter().rev() {
				hook();
			}
		}
	}
}

impl Drop for Transactor {
	fn drop(&mut self) {
		if self.finished {
			return;
		}
		match self.check {
			Check::None => {}
			Check::Warn => {
				warn!(target: TARGET, "transaction dropped without commit or rollback");
			}
			Check::Panic => {
				#[cfg(debug_assertions)]
				panic!("transaction dropped without commit or rollback");
			}
		}
	}
}
