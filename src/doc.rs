//! A lazily-encoded record. Represented as an enum rather than a
//! `value`-or-`nil`-raw pair with inheritance: a native `Value`, its
//! encoded bytes, or both once one side has been derived from the other.
//! A mutation that changes identity (`set_primary_key`) invalidates the
//! stale native-value side.

use crate::codec::{self, Step, Value};
use crate::err::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone, Debug)]
enum Repr {
	Value(Value),
	Raw(Vec<u8>),
	Both(Value, Vec<u8>),
}

/// A record that may be held as a native value, its encoding, or both,
/// with lazy conversion between the two.
#[derive(Clone, Debug)]
pub struct Document {
	repr: Repr,
}

impl Document {
	/// Builds a document from any serializable record.
	pub fn from_record<T: Serialize>(v: &T) -> Result<Self> {
		Ok(Document { repr: Repr::Value(codec::to_value(v)?) })
	}

	pub fn from_value(v: Value) -> Self {
		Document { repr: Repr::Value(v) }
	}

	/// Wraps an already-encoded buffer without decoding it yet.
	pub fn from_bytes(b: Vec<u8>) -> Self {
		Document { repr: Repr::Raw(b) }
	}

	/// The document's canonical byte encoding, computing and caching it on
	/// first access.
	pub fn marshal(&mut self) -> Result<Vec<u8>> {
		match &self.repr {
			Repr::Raw(b) | Repr::Both(_, b) => Ok(b.clone()),
			Repr::Value(v) => {
				let bytes = codec::encode(v);
				self.repr = Repr::Both(v.clone(), bytes.clone());
				Ok(bytes)
			}
		}
	}

	/// The document's native value, decoding and caching it on first access.
	pub fn value(&mut self) -> Result<&Value> {
		if let Repr::Raw(b) = &self.repr {
			let v = codec::decode(b)?;
			self.repr = Repr::Both(v, b.clone());
		}
		match &self.repr {
			Repr::Value(v) | Repr::Both(v, _) => Ok(v),
			Repr::Raw(_) => unreachable!("converted above"),
		}
	}

	/// Deserializes this document's value into `T`.
	pub fn unmarshal<T: DeserializeOwned>(&mut self) -> Result<T> {
		let v = self.value()?.clone();
		codec::from_value(v)
	}

	/// Extracts the sub-document addressed by `path`, without decoding the
	/// rest of the document.
	pub fn field(&mut self, path: &[Step]) -> Result<Document> {
		let raw = self.marshal()?;
		let slice = codec::get(&raw, path)?;
		Ok(Document::from_bytes(slice.to_vec()))
	}

	/// This document's primary key, or `0` if it has none yet (a
	/// table-stored document must carry a non-zero key).
	pub fn primary_key(&mut self) -> u64 {
		let id_path = [Step::from("id")];
		match self.field(&id_path).and_then(|mut d| d.value().cloned()) {
			Ok(Value::Uint(id)) => id,
			Ok(Value::Int(id)) if id >= 0 => id as u64,
			_ => 0,
		}
	}

	/// Splices a new `"id"` field into the encoded representation,
	/// invalidating any cached native value.
	pub fn set_primary_key(&mut self, id: u64) -> Result<()> {
		let raw = self.marshal()?;
		let id_path = [Step::from("id")];
		let updated = codec::set(&raw, &id_path, |_| Ok(codec::encode(&Value::Uint(id))))?;
		self.repr = Repr::Raw(updated);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::Deserialize;

	#[derive(Serialize, Deserialize, PartialEq, Debug)]
	struct User {
		id: u64,
		name: String,
	}

	#[test]
	fn marshal_is_cached_across_calls() {
		let mut doc = Document::from_record(&User { id: 1, name: "ada".into() }).unwrap();
		let a = doc.marshal().unwrap();
		let b = doc.marshal().unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn unmarshal_round_trips_through_bytes() {
		let user = User { id: 7, name: "grace".into() };
		let mut doc = Document::from_record(&user).unwrap();
		let bytes = doc.marshal().unwrap();
		let mut from_bytes = Document::from_bytes(bytes);
		let back: User = from_bytes.unmarshal().unwrap();
		assert_eq!(user, back);
	}

	#[test]
	fn set_primary_key_updates_field_without_disturbing_others() {
		let mut doc = Document::from_record(&User { id: 0, name: "hopper".into() }).unwrap();
		assert_eq!(doc.primary_key(), 0);
		doc.set_primary_key(42).unwrap();
		assert_eq!(doc.primary_key(), 42);
		let back: User = doc.unmarshal().unwrap();
		assert_eq!(back.name, "hopper");
	}
}
