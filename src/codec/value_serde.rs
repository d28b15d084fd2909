//! Bridges arbitrary `Serialize`/`DeserializeOwned` record types to and from
//! `Value`, so that struct field discovery happens at compile time through
//! `#[derive(Serialize, Deserialize)]` rather than hand-rolled runtime
//! reflection.

use super::Value;
use crate::err::Error;
use serde::de::{DeserializeOwned, Visitor};
use serde::ser::{
	SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant, SerializeTuple,
	SerializeTupleStruct, SerializeTupleVariant,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Converts any serializable value into this crate's order-preserving
/// `Value` domain.
pub fn to_value<T: Serialize>(v: &T) -> Result<Value, Error> {
	v.serialize(ValueSerializer)
}

/// Converts a decoded `Value` back into a concrete Rust type.
pub fn from_value<T: DeserializeOwned>(v: Value) -> Result<T, Error> {
	T::deserialize(v)
}

struct ValueSerializer;

impl serde::Serializer for ValueSerializer {
	type Ok = Value;
	type Error = Error;

	type SerializeSeq = SeqSerializer;
	type SerializeTuple = SeqSerializer;
	type SerializeTupleStruct = SeqSerializer;
	type SerializeTupleVariant = SeqSerializer;
	type SerializeMap = MapSerializer;
	type SerializeStruct = MapSerializer;
	type SerializeStructVariant = MapSerializer;

	fn serialize_bool(self, v: bool) -> Result<Value, Error> {
		Ok(Value::Bool(v))
	}
	fn serialize_i8(self, v: i8) -> Result<Value, Error> {
		Ok(Value::Int(v as i64))
	}
	fn serialize_i16(self, v: i16) -> Result<Value, Error> {
		Ok(Value::Int(v as i64))
	}
	fn serialize_i32(self, v: i32) -> Result<Value, Error> {
		Ok(Value::Int(v as i64))
	}
	fn serialize_i64(self, v: i64) -> Result<Value, Error> {
		Ok(Value::Int(v))
	}
	fn serialize_u8(self, v: u8) -> Result<Value, Error> {
		Ok(Value::Uint(v as u64))
	}
	fn serialize_u16(self, v: u16) -> Result<Value, Error> {
		Ok(Value::Uint(v as u64))
	}
	fn serialize_u32(self, v: u32) -> Result<Value, Error> {
		Ok(Value::Uint(v as u64))
	}
	fn serialize_u64(self, v: u64) -> Result<Value, Error> {
		Ok(Value::Uint(v))
	}
	fn serialize_f32(self, v: f32) -> Result<Value, Error> {
		if v.is_nan() {
			return Err(Error::UnsupportedType { type_name: "NaN" });
		}
		Ok(Value::Float(v as f64))
	}
	fn serialize_f64(self, v: f64) -> Result<Value, Error> {
		if v.is_nan() {
			return Err(Error::UnsupportedType { type_name: "NaN" });
		}
		Ok(Value::Float(v))
	}
	fn serialize_char(self, v: char) -> Result<Value, Error> {
		Ok(Value::Str(v.to_string()))
	}
	fn serialize_str(self, v: &str) -> Result<Value, Error> {
		Ok(Value::Str(v.to_owned()))
	}
	fn serialize_bytes(self, v: &[u8]) -> Result<Value, Error> {
		Ok(Value::Bin(v.to_vec()))
	}
	fn serialize_none(self) -> Result<Value, Error> {
		Ok(Value::Null)
	}
	fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, Error> {
		value.serialize(self)
	}
	fn serialize_unit(self) -> Result<Value, Error> {
		Ok(Value::Null)
	}
	fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Error> {
		Ok(Value::Null)
	}
	fn serialize_unit_variant(
		self,
		_name: &'static str,
		_index: u32,
		variant: &'static str,
	) -> Result<Value, Error> {
		Ok(Value::Str(variant.to_owned()))
	}
	fn serialize_newtype_struct<T: ?Sized + Serialize>(
		self,
		_name: &'static str,
		value: &T,
	) -> Result<Value, Error> {
		value.serialize(self)
	}
	fn serialize_newtype_variant<T: ?Sized + Serialize>(
		self,
		_name: &'static str,
		_index: u32,
		variant: &'static str,
		value: &T,
	) -> Result<Value, Error> {
		Ok(Value::Map(vec![(Value::Str(variant.to_owned()), value.serialize(self)?)]))
	}
	fn serialize_seq(self, len: Option<usize>) -> Result<SeqSerializer, Error> {
		Ok(SeqSerializer { items: Vec::with_capacity(len.unwrap_or(0)) })
	}
	fn serialize_tuple(self, len: usize) -> Result<SeqSerializer, Error> {
		self.serialize_seq(Some(len))
	}
	fn serialize_tuple_struct(
		self,
		_name: &'static str,
		len: usize,
	) -> Result<SeqSerializer, Error> {
		self.serialize_seq(Some(len))
	}
	fn serialize_tuple_variant(
		self,
		_name: &'static str,
		_index: u32,
		variant: &'static str,
		len: usize,
	) -> Result<SeqSerializer, Error> {
		Ok(SeqSerializer { items: Vec::with_capacity(len), variant: Some(variant) })
	}
	fn serialize_map(self, _len: Option<usize>) -> Result<MapSerializer, Error> {
		Ok(MapSerializer::default())
	}
	fn serialize_struct(
		self,
		_name: &'static str,
		_len: usize,
	) -> Result<MapSerializer, Error> {
		Ok(MapSerializer::default())
	}
	fn serialize_struct_variant(
		self,
		_name: &'static str,
		_index: u32,
		variant: &'static str,
		_len: usize,
	) -> Result<MapSerializer, Error> {
		Ok(MapSerializer { variant: Some(variant), ..Default::default() })
	}
}

struct SeqSerializer {
	items: Vec<Value>,
	variant: Option<&'static str>,
}

impl Default for SeqSerializer {
	fn default() -> Self {
		SeqSerializer { items: Vec::new(), variant: None }
	}
}

impl SerializeSeq for SeqSerializer {
	type Ok = Value;
	type Error = Error;
	fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
		self.items.push(value.serialize(ValueSerializer)?);
		Ok(())
	}
	fn end(self) -> Result<Value, Error> {
		finish_seq(self)
	}
}

impl SerializeTuple for SeqSerializer {
	type Ok = Value;
	type Error = Error;
	fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
		SerializeSeq::serialize_element(self, value)
	}
	fn end(self) -> Result<Value, Error> {
		finish_seq(self)
	}
}

impl SerializeTupleStruct for SeqSerializer {
	type Ok = Value;
	type Error = Error;
	fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
		SerializeSeq::serialize_element(self, value)
	}
	fn end(self) -> Result<Value, Error> {
		finish_seq(self)
	}
}

impl SerializeTupleVariant for SeqSerializer {
	type Ok = Value;
	type Error = Error;
	fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
		SerializeSeq::serialize_element(self, value)
	}
	fn end(self) -> Result<Value, Error> {
		finish_seq(self)
	}
}

fn finish_seq(s: SeqSerializer) -> Result<Value, Error> {
	let arr = Value::Array(s.items);
	match s.variant {
		Some(name) => Ok(Value::Map(vec![(Value::Str(name.to_owned()), arr)])),
		None => Ok(arr),
	}
}

#[derive(Default)]
struct MapSerializer {
	entries: Vec<(Value, Value)>,
	pending_key: Option<Value>,
	variant: Option<&'static str>,
}

impl SerializeMap for MapSerializer {
	type Ok = Value;
	type Error = Error;
	fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Error> {
		self.pending_key = Some(key.serialize(ValueSerializer)?);
		Ok(())
	}
	fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Error> {
		let key = self.pending_key.take().ok_or(Error::Other("serialize_value before serialize_key".into()))?;
		self.entries.push((key, value.serialize(ValueSerializer)?));
		Ok(())
	}
	fn end(self) -> Result<Value, Error> {
		finish_map(self)
	}
}

impl SerializeStruct for MapSerializer {
	type Ok = Value;
	type Error = Error;
	fn serialize_field<T: ?Sized + Serialize>(
		&mut self,
		key: &'static str,
		value: &T,
	) -> Result<(), Error> {
		// Dominant-field rule: a name collision at this level drops
		// the earlier field rather than keeping both.
		self.entries.retain(|(k, _)| k != &Value::Str(key.to_owned()));
		self.entries.push((Value::Str(key.to_owned()), value.serialize(ValueSerializer)?));
		Ok(())
	}
	fn end(self) -> Result<Value, Error> {
		finish_map(self)
	}
}

impl SerializeStructVariant for MapSerializer {
	type Ok = Value;
	type Error = Error;
	fn serialize_field<T: ?Sized + Serialize>(
		&mut self,
		key: &'static str,
		value: &T,
	) -> Result<(), Error> {
		SerializeStruct::serialize_field(self, key, value)
	}
	fn end(self) -> Result<Value, Error> {
		finish_map(self)
	}
}

fn finish_map(s: MapSerializer) -> Result<Value, Error> {
	let map = Value::Map(s.entries);
	match s.variant {
		Some(name) => Ok(Value::Map(vec![(Value::Str(name.to_owned()), map)])),
		None => Ok(map),
	}
}

impl serde::ser::Error for Error {
	fn custom<T: fmt::Display>(msg: T) -> Self {
		Error::Other(msg.to_string())
	}
}

impl serde::de::Error for Error {
	fn custom<T: fmt::Display>(msg: T) -> Self {
		Error::Other(msg.to_string())
	}
}

// `Value` as its own self-describing `Deserializer`, in the style of
// `serde_json::Value`'s deserializer.
impl<'de> serde::Deserializer<'de> for Value {
	type Error = Error;

	fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
		match self {
			Value::Null => visitor.visit_unit(),
			Value::Bool(b) => visitor.visit_bool(b),
			Value::Int(i) => visitor.visit_i64(i),
			Value::Uint(u) => visitor.visit_u64(u),
			Value::Float(f) => visitor.visit_f64(f),
			Value::Str(s) => visitor.visit_string(s),
			Value::Bin(b) => visitor.visit_byte_buf(b),
			Value::Array(items) => visitor.visit_seq(SeqAccess { iter: items.into_iter() }),
			Value::Map(entries) => visitor.visit_map(MapAccess { iter: entries.into_iter(), value: None }),
		}
	}

	fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
		match self {
			Value::Null => visitor.visit_none(),
			other => visitor.visit_some(other),
		}
	}

	serde::forward_to_deserialize_any! {
		bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
		bytes byte_buf unit unit_struct newtype_struct seq tuple
		tuple_struct map struct enum identifier ignored_any
	}
}

struct SeqAccess {
	iter: std::vec::IntoIter<Value>,
}

impl<'de> serde::de::SeqAccess<'de> for SeqAccess {
	type Error = Error;
	fn next_element_seed<T: serde::de::DeserializeSeed<'de>>(
		&mut self,
		seed: T,
	) -> Result<Option<T::Value>, Error> {
		match self.iter.next() {
			Some(v) => seed.deserialize(v).map(Some),
			None => Ok(None),
		}
	}
}

struct MapAccess {
	iter: std::vec::IntoIter<(Value, Value)>,
	value: Option<Value>,
}

impl<'de> serde::de::MapAccess<'de> for MapAccess {
	type Error = Error;
	fn next_key_seed<K: serde::de::DeserializeSeed<'de>>(
		&mut self,
		seed: K,
	) -> Result<Option<K::Value>, Error> {
		match self.iter.next() {
			Some((k, v)) => {
				self.value = Some(v);
				seed.deserialize(k).map(Some)
			}
			None => Ok(None),
		}
	}
	fn next_value_seed<T: serde::de::DeserializeSeed<'de>>(
		&mut self,
		seed: T,
	) -> Result<T::Value, Error> {
		let v = self.value.take().ok_or_else(|| Error::Other("value before key".into()))?;
		seed.deserialize(v)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::{Deserialize, Serialize};

	#[derive(Serialize, Deserialize, PartialEq, Debug)]
	struct User {
		name: String,
		age: u32,
		active: bool,
	}

	#[test]
	fn struct_round_trips_through_value() {
		let u = User { name: "ada".into(), age: 36, active: true };
		let v = to_value(&u).unwrap();
		let back: User = from_value(v).unwrap();
		assert_eq!(u, back);
	}

	#[test]
	fn nested_vec_round_trips() {
		let v = to_value(&vec![1i32, 2, 3]).unwrap();
		let back: Vec<i32> = from_value(v).unwrap();
		assert_eq!(back, vec![1, 2, 3]);
	}
}
