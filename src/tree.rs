//! Namespaced ordered key/value view over a [`kvs::Session`], with
//! inclusive/exclusive range iteration and type-aware open bounds.

use crate::err::{Error, Result};
use crate::key::{Key, Namespace};
use crate::kvs::{KvError, Session};

/// A stored-with-empty-value sentinel, distinguishing "present with no
/// payload" from "absent" (index entries rely on this).
const TOMBSTONE: &[u8] = &[0];

/// `(min, max, exclusive)` over a table or index's keyspace. `None` on
/// either side means "unbounded within the current namespace".
#[derive(Clone, Debug, Default)]
pub struct Range {
	pub min: Option<Key>,
	pub max: Option<Key>,
	pub exclusive: bool,
}

impl Range {
	pub fn new(min: Option<Key>, max: Option<Key>, exclusive: bool) -> Self {
		Range { min, max, exclusive }
	}

	pub fn all() -> Self {
		Range::default()
	}
}

/// A `(namespace, session)` pair over the KV engine.
pub struct Tree<'s> {
	ns: Namespace,
	session: &'s mut dyn Session,
}

impl<'s> Tree<'s> {
	pub fn new(session: &'s mut dyn Session, ns: Namespace) -> Self {
		Tree { ns, session }
	}

	pub fn namespace(&self) -> Namespace {
		self.ns
	}

	#[instrument(level = "trace", skip(self, value))]
	pub fn insert(&mut self, key: &Key, value: &[u8]) -> Result<()> {
		let value = if value.is_empty() { TOMBSTONE } else { value };
		self.session
			.insert(&key.with_namespace(self.ns).bytes(), value)
			.map_err(|e| map_write_err(e, "pk", key))
	}

	#[instrument(level = "trace", skip(self, value))]
	pub fn put(&mut self, key: &Key, value: &[u8]) -> Result<()> {
		let value = if value.is_empty() { TOMBSTONE } else { value };
		self.session
			.put(&key.with_namespace(self.ns).bytes(), value)
			.map_err(|e| Error::Engine(e.to_string()))
	}

	#[instrument(level = "trace", skip(self))]
	pub fn get(&self, key: &Key) -> Result<Vec<u8>> {
		self.session.get(&key.with_namespace(self.ns).bytes()).map_err(|e| match e {
			KvError::KeyNotFound => Error::not_found(format!("{:?}", key.values())),
			other => Error::Engine(other.to_string()),
		})
	}

	pub fn exists(&self, key: &Key) -> Result<bool> {
		self.session
			.exists(&key.with_namespace(self.ns).bytes())
			.map_err(|e| Error::Engine(e.to_string()))
	}

	/// A missing key is a no-op success at this layer.
	pub fn delete(&mut self, key: &Key) -> Result<()> {
		match self.session.delete(&key.with_namespace(self.ns).bytes()) {
			Ok(()) | Err(KvError::KeyNotFound) => Ok(()),
			Err(e) => Err(Error::Engine(e.to_string())),
		}
	}

	pub fn truncate(&mut self) -> Result<()> {
		let from = Key::namespace_only(self.ns).bytes();
		let to = Key::namespace_only(self.ns + 1).bytes();
		let mut keys_to_delete = Vec::new();
		{
			let mut it = self.session.iterator(&from, &to);
			let mut has = it.first();
			while has {
				keys_to_delete.push(it.key().to_vec());
				has = it.next();
			}
			it.close().ok();
		}
		for k in keys_to_delete {
			self.session.delete(&k).ok();
		}
		self.session.commit(Default::default()).map_err(|e| Error::Engine(e.to_string()))
	}

	/// Iterates `range` in `ns`, invoking `f(key, value)` for each entry;
	/// stops early if `f` returns an error.
	#[instrument(level = "trace", skip(self, range, f))]
	pub fn range(
		&self,
		range: &Range,
		reverse: bool,
		mut f: impl FnMut(Key, &[u8]) -> Result<()>,
	) -> Result<()> {
		let (start, end) = self.bounds(range);
		let mut it = self.session.iterator(&start, &end);

		let mut has = if reverse { it.last() } else { it.first() };
		while has {
			let key = Key::from_encoded(it.key().to_vec());
			f(key, it.value())?;
			has = if reverse { it.prev() } else { it.next() };
		}
		if let Some(e) = it.error() {
			return Err(Error::Engine(e.to_string()));
		}
		it.close().ok();
		Ok(())
	}

	fn bounds(&self, range: &Range) -> (Vec<u8>, Vec<u8>) {
		let start = match (&range.min, range.exclusive) {
			(None, _) => self.min_key_for(range.max.as_ref()),
			(Some(min), false) => min.with_namespace(self.ns).bytes(),
			(Some(min), true) => {
				let mut b = min.with_namespace(self.ns).bytes();
				b.push(0xFF);
				b
			}
		};
		let end = match (&range.max, range.exclusive) {
			(None, _) => self.max_key_for(range.min.as_ref()),
			(Some(max), false) => {
				let mut b = max.with_namespace(self.ns).bytes();
				b.push(0xFF);
				b
			}
			(Some(max), true) => max.with_namespace(self.ns).bytes(),
		};
		(start, end)
	}

	/// Unbounded lower edge: the namespace prefix alone, or, when `other`
	/// (the opposite bound) pins a value tuple, that tuple with its last
	/// element replaced by the minimum legal value of its type.
	fn min_key_for(&self, other: Option<&Key>) -> Vec<u8> {
		match other {
			None => Key::namespace_only(self.ns).bytes(),
			Some(other) => {
				let mut values = other.values();
				match values.last_mut() {
					Some(last) => {
						*last = last.min_for_type();
						Key::namespaced(self.ns, values).bytes()
					}
					None => Key::namespace_only(self.ns).bytes(),
				}
			}
		}
	}

	/// Unbounded upper edge: the namespace's successor, or, when `other`
	/// pins a value tuple, that tuple followed by the next type-tag byte
	/// after its last element's tag (staying within the same type group).
	fn max_key_for(&self, other: Option<&Key>) -> Vec<u8> {
		match other {
			None => {
				let mut b = Key::namespace_only(self.ns).bytes();
				b.push(0xFF);
				b
			}
			Some(other) => {
				let values = other.values();
				match values.last() {
					Some(last) => {
						let mut b = Key::namespaced(self.ns, values.clone()).bytes();
						b.push(last.max_type_code());
						b
					}
					None => {
						let mut b = Key::namespace_only(self.ns).bytes();
						b.push(0xFF);
						b
					}
				}
			}
		}
	}
}

fn map_write_err(e: KvError, constraint: &str, key: &Key) -> Error {
	match e {
		KvError::KeyAlreadyExists => Error::conflict(constraint, key.bytes()),
		other => Error::Engine(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::Value;
	use crate::kvs::mem::MemStore;
	use crate::kvs::{CommitOptions, Options, Store};

	fn session(store: &MemStore) -> Box<dyn Session> {
		store.new_batch_session("test")
	}

	#[test]
	fn range_on_signed_ints_ascending_and_bounded() {
		let store = MemStore::new(Options::default());
		let mut s = session(&store);
		{
			let mut tree = Tree::new(&mut *s, 10);
			for i in -3i64..=3 {
				tree.insert(&Key::new(vec![Value::Int(i)]), b"v").unwrap();
			}
		}
		s.commit(CommitOptions::default()).unwrap();

		let mut reader = store.new_snapshot_session("test");
		let tree = Tree::new(&mut *reader, 10);

		let mut seen = Vec::new();
		tree.range(&Range::all(), false, |k, _| {
			seen.push(match k.values()[0] {
				Value::Int(i) => i,
				_ => unreachable!(),
			});
			Ok(())
		})
		.unwrap();
		assert_eq!(seen, vec![-3, -2, -1, 0, 1, 2, 3]);

		let bounded = Range::new(Some(Key::new(vec![Value::Int(-1)])), Some(Key::new(vec![Value::Int(1)])), true);
		let mut seen = Vec::new();
		tree.range(&bounded, false, |k, _| {
			seen.push(match k.values()[0] {
				Value::Int(i) => i,
				_ => unreachable!(),
			});
			Ok(())
		})
		.unwrap();
		assert_eq!(seen, vec![0]);
	}

	#[test]
	fn insert_existing_key_conflicts() {
		let store = MemStore::new(Options::default());
		let mut s = session(&store);
		let mut tree = Tree::new(&mut *s, 1);
		tree.insert(&Key::new(vec![Value::Uint(1)]), b"a").unwrap();
		let err = tree.insert(&Key::new(vec![Value::Uint(1)]), b"b").unwrap_err();
		assert!(err.as_conflict().is_some());
	}

	#[test]
	fn delete_missing_key_is_a_no_op() {
		let store = MemStore::new(Options::default());
		let mut s = session(&store);
		let mut tree = Tree::new(&mut *s, 1);
		tree.delete(&Key::new(vec![Value::Uint(9)])).unwrap();
	}
}
