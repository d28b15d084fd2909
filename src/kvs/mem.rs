//! The in-memory reference engine: a `BTreeMap<Vec<u8>, Vec<u8>>` per named
//! database, ordered by plain byte comparison — which already matches
//! [`crate::codec::compare`] for any buffer our codec produced, so no custom
//! comparator is needed here (the codec's entire point is that ordinary
//! `memcmp` order already agrees with value order).
//!
//! Implements a shared-snapshot concurrency model: at most one
//! writer is live per database at a time; while it is live, every
//! snapshot session reads the same frozen copy of the data the writer
//! started from, refcounted so the snapshot is dropped only once every
//! reader and the writer have released it.

use super::{CommitOptions, Iterator as KvIterator, KvError, Options, Result, Session, Store};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::Arc;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

struct Shared {
	data: Map,
	/// Set while a batch session is open against this database; readers
	/// opened during this window share `snapshot` instead of cloning `data`.
	writer_live: bool,
	snapshot: Option<Arc<Map>>,
	readers_on_snapshot: usize,
}

struct Db {
	state: Mutex<Shared>,
	writer_released: Condvar,
}

/// The reference `Store` implementation, keyed by database name.
pub struct MemStore {
	#[allow(dead_code)]
	options: Options,
	dbs: DashMap<String, Arc<Db>>,
}

impl MemStore {
	pub fn new(options: Options) -> Self {
		MemStore {
			options,
			dbs: DashMap::new(),
		}
	}

	fn db(&self, name: &str) -> Arc<Db> {
		self.dbs
			.entry(name.to_owned())
			.or_insert_with(|| {
				Arc::new(Db {
					state: Mutex::new(Shared {
						data: Map::new(),
						writer_live: false,
						snapshot: None,
						readers_on_snapshot: 0,
					}),
					writer_released: Condvar::new(),
				})
			})
			.clone()
	}
}

impl Store for MemStore {
	#[instrument(level = "trace", skip(self))]
	fn new_snapshot_session(&self, db_name: &str) -> Box<dyn Session> {
		let db = self.db(db_name);
		let mut state = db.state.lock();
		let view = match &state.snapshot {
			Some(shared) => {
				state.readers_on_snapshot += 1;
				shared.clone()
			}
			None => Arc::new(state.data.clone()),
		};
		Box::new(SnapshotSession { db, view, on_shared_snapshot: state.snapshot.is_some() })
	}

	#[instrument(level = "trace", skip(self))]
	fn new_batch_session(&self, db_name: &str) -> Box<dyn Session> {
		let db = self.db(db_name);
		{
			let mut state = db.state.lock();
			while state.writer_live {
				db.writer_released.wait(&mut state);
			}
			state.writer_live = true;
			state.snapshot = Some(Arc::new(state.data.clone()));
		}
		let base = db.state.lock().snapshot.as_ref().unwrap().clone();
		Box::new(BatchSession { db, base, pending: BTreeMap::new(), closed: false })
	}

	fn shutdown(&self) -> Result<()> {
		Ok(())
	}
}

struct SnapshotSession {
	db: Arc<Db>,
	view: Arc<Map>,
	on_shared_snapshot: bool,
}

impl Session for SnapshotSession {
	fn insert(&mut self, _k: &[u8], _v: &[u8]) -> Result<()> {
		Err(KvError::MethodNotAllowed)
	}
	fn put(&mut self, _k: &[u8], _v: &[u8]) -> Result<()> {
		Err(KvError::MethodNotAllowed)
	}
	fn get(&self, k: &[u8]) -> Result<Vec<u8>> {
		self.view.get(k).cloned().ok_or(KvError::KeyNotFound)
	}
	fn exists(&self, k: &[u8]) -> Result<bool> {
		Ok(self.view.contains_key(k))
	}
	fn delete(&mut self, _k: &[u8]) -> Result<()> {
		Err(KvError::MethodNotAllowed)
	}
	fn iterator(&self, start: &[u8], end: &[u8]) -> Box<dyn KvIterator> {
		Box::new(MemIterator::new(self.view.clone(), start.to_vec(), end.to_vec()))
	}
	fn commit(&mut self, _opts: CommitOptions) -> Result<()> {
		Err(KvError::MethodNotAllowed)
	}
	fn close(&mut self) -> Result<()> {
		self.release();
		Ok(())
	}
}

impl SnapshotSession {
	fn release(&mut self) {
		if self.on_shared_snapshot {
			let mut state = self.db.state.lock();
			if state.readers_on_snapshot > 0 {
				state.readers_on_snapshot -= 1;
			}
			maybe_drop_snapshot(&mut state);
			self.on_shared_snapshot = false;
		}
	}
}

impl Drop for SnapshotSession {
	fn drop(&mut self) {
		self.release();
	}
}

fn maybe_drop_snapshot(state: &mut Shared) {
	if !state.writer_live && state.readers_on_snapshot == 0 {
		state.snapshot = None;
	}
}

struct BatchSession {
	db: Arc<Db>,
	base: Arc<Map>,
	pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
	closed: bool,
}

impl BatchSession {
	fn lookup(&self, k: &[u8]) -> Option<Vec<u8>> {
		match self.pending.get(k) {
			Some(Some(v)) => Some(v.clone()),
			Some(None) => None,
			None => self.base.get(k).cloned(),
		}
	}

	fn release_writer(&mut self) {
		if self.closed {
			return;
		}
		self.closed = true;
		let mut state = self.db.state.lock();
		state.writer_live = false;
		maybe_drop_snapshot(&mut state);
		self.db.writer_released.notify_one();
	}
}

impl Session for BatchSession {
	fn insert(&mut self, k: &[u8], v: &[u8]) -> Result<()> {
		if self.lookup(k).is_some() {
			return Err(KvError::KeyAlreadyExists);
		}
		self.pending.insert(k.to_vec(), Some(v.to_vec()));
		Ok(())
	}
	fn put(&mut self, k: &[u8], v: &[u8]) -> Result<()> {
		self.pending.insert(k.to_vec(), Some(v.to_vec()));
		Ok(())
	}
	fn get(&self, k: &[u8]) -> Result<Vec<u8>> {
		self.lookup(k).ok_or(KvError::KeyNotFound)
	}
	fn exists(&self, k: &[u8]) -> Result<bool> {
		Ok(self.lookup(k).is_some())
	}
	fn delete(&mut self, k: &[u8]) -> Result<()> {
		if self.lookup(k).is_none() {
			return Err(KvError::KeyNotFound);
		}
		self.pending.insert(k.to_vec(), None);
		Ok(())
	}
	fn iterator(&self, start: &[u8], end: &[u8]) -> Box<dyn KvIterator> {
		// The batch is indexed over the base, so writes in this session are
		// visible to its own subsequent reads.
		let mut merged = (*self.base).clone();
		for (k, v) in &self.pending {
			match v {
				Some(v) => {
					merged.insert(k.clone(), v.clone());
				}
				None => {
					merged.remove(k);
				}
			}
		}
		Box::new(MemIterator::new(Arc::new(merged), start.to_vec(), end.to_vec()))
	}
	fn commit(&mut self, _opts: CommitOptions) -> Result<()> {
		{
			let mut state = self.db.state.lock();
			for (k, v) in self.pending.iter() {
				match v {
					Some(v) => {
						state.data.insert(k.clone(), v.clone());
					}
					None => {
						state.data.remove(k);
					}
				}
			}
		}
		self.release_writer();
		Ok(())
	}
	fn close(&mut self) -> Result<()> {
		self.release_writer();
		Ok(())
	}
}

impl Drop for BatchSession {
	fn drop(&mut self) {
		self.release_writer();
	}
}

struct MemIterator {
	entries: Vec<(Vec<u8>, Vec<u8>)>,
	pos: Option<usize>,
	#[allow(dead_code)]
	source: Arc<Map>,
}

impl MemIterator {
	fn new(source: Arc<Map>, start: Vec<u8>, end: Vec<u8>) -> Self {
		let entries = source
			.range(start..end)
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect::<Vec<_>>();
		MemIterator { entries, pos: None, source }
	}
}

impl KvIterator for MemIterator {
	fn first(&mut self) -> bool {
		if self.entries.is_empty() {
			self.pos = None;
			return false;
		}
		self.pos = Some(0);
		true
	}
	fn next(&mut self) -> bool {
		match self.pos {
			Some(i) if i + 1 < self.entries.len() => {
				self.pos = Some(i + 1);
				true
			}
			_ => {
				self.pos = None;
				false
			}
		}
	}
	fn last(&mut self) -> bool {
		if self.entries.is_empty() {
			self.pos = None;
			return false;
		}
		self.pos = Some(self.entries.len() - 1);
		true
	}
	fn prev(&mut self) -> bool {
		match self.pos {
			Some(i) if i > 0 => {
				self.pos = Some(i - 1);
				true
			}
			_ => {
				self.pos = None;
				false
			}
		}
	}
	fn valid(&self) -> bool {
		self.pos.is_some()
	}
	fn error(&self) -> Option<KvError> {
		None
	}
	fn key(&self) -> &[u8] {
		&self.entries[self.pos.expect("key() called on an invalid iterator")].0
	}
	fn value(&self) -> &[u8] {
		&self.entries[self.pos.expect("value() called on an invalid iterator")].1
	}
	fn close(&mut self) -> Result<()> {
		self.pos = None;
		Ok(())
	}
}
