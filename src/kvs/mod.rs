//! The key-value engine contract: a byte-ordered
//! keyspace with snapshot and batch sessions, plus the one reference engine
//! this crate ships (`kvs::mem`) so the rest of the crate is runnable and
//! testable standalone. This module is the direct analogue of this
//! codebase's pluggable `kvs` engine layer, trimmed to a single trait-object
//! boundary instead of a compiled-in enum of backends.

pub mod mem;

use thiserror::Error;

/// Errors originating at the KV engine boundary. Mapped onto the
/// crate-wide [`crate::err::Error`] at the tree boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
	#[error("key not found")]
	KeyNotFound,
	#[error("key already exists")]
	KeyAlreadyExists,
	#[error("method is not allowed on this session")]
	MethodNotAllowed,
	#[error("db {0:?} does not exist")]
	NonexistentDb(String),
}

pub type Result<T, E = KvError> = std::result::Result<T, E>;

/// Options accepted by [`Session::commit`].
#[derive(Default, Clone, Copy, Debug)]
pub struct CommitOptions {
	pub no_sync: bool,
}

/// Construction-time options for a [`Store`], mirroring this codebase's
/// `Options`-struct convention rather than hidden globals.
#[derive(Default, Clone, Debug)]
pub struct Options {
	pub max_batch_size: usize,
	pub extra: std::collections::HashMap<String, String>,
}

/// A read-only (snapshot) or read-write (batch) view over the keyspace.
pub trait Session: Send {
	fn insert(&mut self, k: &[u8], v: &[u8]) -> Result<()>;
	fn put(&mut self, k: &[u8], v: &[u8]) -> Result<()>;
	fn get(&self, k: &[u8]) -> Result<Vec<u8>>;
	fn exists(&self, k: &[u8]) -> Result<bool>;
	fn delete(&mut self, k: &[u8]) -> Result<()>;
	fn iterator(&self, start: &[u8], end: &[u8]) -> Box<dyn Iterator>;
	fn commit(&mut self, opts: CommitOptions) -> Result<()>;
	fn close(&mut self) -> Result<()>;
}

/// A cursor over a `[start, end)` byte range, ascending by the engine's
/// comparator. Scoped to the call site that opened it; callers must `close`
/// it on every exit path (implementors should also release resources
/// in `Drop`).
pub trait Iterator {
	fn first(&mut self) -> bool;
	fn next(&mut self) -> bool;
	fn last(&mut self) -> bool;
	fn prev(&mut self) -> bool;
	fn valid(&self) -> bool;
	fn error(&self) -> Option<KvError>;
	fn key(&self) -> &[u8];
	fn value(&self) -> &[u8];
	fn close(&mut self) -> Result<()>;
}

/// The engine itself: produces sessions, owns shutdown.
pub trait Store: Send + Sync {
	fn new_snapshot_session(&self, db_name: &str) -> Box<dyn Session>;
	fn new_batch_session(&self, db_name: &str) -> Box<dyn Session>;
	fn shutdown(&self) -> Result<()>;
}
