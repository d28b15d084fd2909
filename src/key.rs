//! Composite keys: a namespace plus an ordered sequence of typed values,
//! lazily convertible between the two representations.

use crate::codec::{self, Value};
use crate::err::{Error, Result};
use std::cell::RefCell;

/// A 64-bit namespace identifier. Every table and every index occupies one
///; namespaces `0` and `1` are reserved for the bootstrap catalog.
pub type Namespace = u64;

/// `(namespace, values, bytes)` where at least one of `values` or `bytes`
/// is populated; `Bytes() <-> (namespace, values)` is a round trip.
#[derive(Clone, Debug)]
pub struct Key {
	ns: Namespace,
	inner: RefCell<Inner>,
}

#[derive(Clone, Debug, Default)]
struct Inner {
	values: Option<Vec<Value>>,
	raw: Option<Vec<u8>>,
}

impl Key {
	/// A key under the default (zero) namespace; call [`Key::with_namespace`]
	/// before writing it.
	pub fn new(values: impl Into<Vec<Value>>) -> Self {
		Key {
			ns: 0,
			inner: RefCell::new(Inner { values: Some(values.into()), raw: None }),
		}
	}

	pub fn namespaced(ns: Namespace, values: impl Into<Vec<Value>>) -> Self {
		Key {
			ns,
			inner: RefCell::new(Inner { values: Some(values.into()), raw: None }),
		}
	}

	/// A key consisting of only a namespace prefix (no trailing values).
	pub fn namespace_only(ns: Namespace) -> Self {
		Key::namespaced(ns, Vec::new())
	}

	/// Wraps an already-encoded buffer (namespace prefix included).
	pub fn from_encoded(raw: impl Into<Vec<u8>>) -> Self {
		let raw = raw.into();
		let ns = decode_namespace(&raw).unwrap_or(0);
		Key {
			ns,
			inner: RefCell::new(Inner { values: None, raw: Some(raw) }),
		}
	}

	pub fn namespace(&self) -> Namespace {
		self.ns
	}

	/// Re-namespaces this key, invalidating any cached encoding (it would
	/// otherwise carry the old namespace prefix).
	pub fn with_namespace(&self, ns: Namespace) -> Key {
		if ns == self.ns {
			return self.clone();
		}
		Key {
			ns,
			inner: RefCell::new(Inner { values: Some(self.values()), raw: None }),
		}
	}

	pub fn values(&self) -> Vec<Value> {
		{
			let inner = self.inner.borrow();
			if let Some(v) = &inner.values {
				return v.clone();
			}
		}
		let raw = self.inner.borrow().raw.clone().expect("key has neither values nor bytes");
		// Skip the namespace value itself.
		let (_, ns_len) = codec::decode_value(&raw).expect("malformed key: namespace");
		let mut offset = ns_len;
		let mut values = Vec::new();
		while offset < raw.len() {
			let (v, len) = codec::decode_value(&raw[offset..]).expect("malformed key: value");
			values.push(v);
			offset += len;
		}
		self.inner.borrow_mut().values = Some(values.clone());
		values
	}

	pub fn bytes(&self) -> Vec<u8> {
		{
			let inner = self.inner.borrow();
			if let Some(b) = &inner.raw {
				return b.clone();
			}
		}
		let values = self.inner.borrow().values.clone().unwrap_or_default();
		let mut out = codec::encode(&Value::Uint(self.ns));
		for v in &values {
			out.extend(codec::encode(v));
		}
		self.inner.borrow_mut().raw = Some(out.clone());
		out
	}

	/// Decodes the primary key carried by this key's last value, when it is
	/// a table row key (a single `u64`).
	pub fn primary_key(&self) -> Result<u64> {
		let values = self.values();
		match values.last() {
			Some(Value::Uint(id)) => Ok(*id),
			Some(Value::Int(id)) if *id >= 0 => Ok(*id as u64),
			_ => Err(Error::Other("key does not carry a primary key value".into())),
		}
	}
}

fn decode_namespace(raw: &[u8]) -> Option<Namespace> {
	match codec::decode_value(raw).ok()?.0 {
		Value::Uint(ns) => Some(ns),
		_ => None,
	}
}

impl PartialEq for Key {
	fn eq(&self, other: &Self) -> bool {
		self.bytes() == other.bytes()
	}
}
impl Eq for Key {}
