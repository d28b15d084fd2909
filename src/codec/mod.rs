//! Order-preserving binary codec.
//!
//! Every encoded value begins with a one-byte type tag chosen so that
//! unsigned byte comparison of two encoded buffers matches the intended
//! value order within a type, and partitions types into disjoint, ordered
//! tag ranges. See `compare` for the comparator that relies on this.

mod path;
mod value_serde;

pub use path::{get, set, Step};
pub use value_serde::{from_value, to_value};

use crate::err::{Error, Result};
use std::cmp::Ordering;

pub const NULL: u8 = 0xC0;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;
pub const BIN8: u8 = 0xC4;
pub const BIN16: u8 = 0xC5;
pub const BIN32: u8 = 0xC6;
pub const FLOAT32: u8 = 0xCA;
pub const FLOAT64: u8 = 0xCB;
pub const UINT8: u8 = 0xCC;
pub const UINT16: u8 = 0xCD;
pub const UINT32: u8 = 0xCE;
pub const UINT64: u8 = 0xCF;
pub const INT8: u8 = 0xD0;
pub const INT16: u8 = 0xD1;
pub const INT32: u8 = 0xD2;
pub const INT64: u8 = 0xD3;
pub const STR8: u8 = 0xD9;
pub const STR16: u8 = 0xDA;
pub const STR32: u8 = 0xDB;
pub const ARRAY16: u8 = 0xDC;
pub const ARRAY32: u8 = 0xDD;
pub const MAP16: u8 = 0xDE;
pub const MAP32: u8 = 0xDF;

/// A dynamically typed value in this crate's order-preserving domain.
///
/// Integers and floats are always stored (and re-encoded) at their widest
/// wire width (`Int64`/`Uint64`/`Float64`); the narrower tags exist in the
/// wire format for interop with encoders that pick a width per source type,
/// and `decode` understands all of them, but `encode` never emits them. This
/// keeps field discovery and encoding a compile-time, type-driven affair
/// rather than a per-platform-int-kind dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Float(f64),
	Int(i64),
	Uint(u64),
	Bin(Vec<u8>),
	Str(String),
	Array(Vec<Value>),
	Map(Vec<(Value, Value)>),
}

impl Value {
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::Float(_) => "float",
			Value::Int(_) => "int",
			Value::Uint(_) => "uint",
			Value::Bin(_) => "bin",
			Value::Str(_) => "str",
			Value::Array(_) => "array",
			Value::Map(_) => "map",
		}
	}

	/// The minimum legal value for the type of `self`, used to materialise
	/// open-ended range bounds.
	pub fn min_for_type(&self) -> Value {
		match self {
			Value::Null => Value::Null,
			Value::Bool(_) => Value::Bool(false),
			Value::Float(_) => Value::Float(f64::from_bits(1)),
			Value::Int(_) => Value::Int(i64::MIN),
			Value::Uint(_) => Value::Uint(0),
			Value::Bin(_) => Value::Bin(Vec::new()),
			Value::Str(_) => Value::Str(String::new()),
			Value::Array(_) => Value::Array(Vec::new()),
			Value::Map(_) => Value::Map(Vec::new()),
		}
	}

	/// The tag byte one past the end of this value's type group, used to
	/// build an exclusive upper bound that stays within the type group.
	pub fn max_type_code(&self) -> u8 {
		match self {
			Value::Null => FALSE,
			Value::Bool(_) => BIN8,
			Value::Float(_) => UINT8,
			Value::Int(_) => STR8,
			Value::Uint(_) => INT8,
			Value::Bin(_) => FLOAT32,
			Value::Str(_) => ARRAY16,
			Value::Array(_) => MAP16,
			Value::Map(_) => 0xFF,
		}
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}
impl From<u64> for Value {
	fn from(v: u64) -> Self {
		Value::Uint(v)
	}
}
impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::Str(v.to_owned())
	}
}
impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Str(v)
	}
}

/// Encodes a value into its canonical order-preserving byte representation.
pub fn encode(v: &Value) -> Vec<u8> {
	let mut out = Vec::new();
	encode_into(v, &mut out);
	out
}

fn encode_into(v: &Value, out: &mut Vec<u8>) {
	match v {
		Value::Null => out.push(NULL),
		Value::Bool(false) => out.push(FALSE),
		Value::Bool(true) => out.push(TRUE),
		Value::Float(f) => {
			out.push(FLOAT64);
			out.extend_from_slice(&encode_float(*f));
		}
		Value::Int(i) => {
			out.push(INT64);
			let biased = (*i as i128 - i64::MIN as i128) as u64;
			out.extend_from_slice(&biased.to_be_bytes());
		}
		Value::Uint(u) => {
			out.push(UINT64);
			out.extend_from_slice(&u.to_be_bytes());
		}
		Value::Bin(b) => encode_length_prefixed(BIN8, BIN16, BIN32, b, out),
		Value::Str(s) => encode_length_prefixed(STR8, STR16, STR32, s.as_bytes(), out),
		Value::Array(items) => {
			let tag = if items.len() > u16::MAX as usize { ARRAY32 } else { ARRAY16 };
			out.push(tag);
			push_len(tag == ARRAY32, items.len(), out);
			for item in items {
				encode_into(item, out);
			}
		}
		Value::Map(entries) => {
			let mut encoded: Vec<(Vec<u8>, &Value)> =
				entries.iter().map(|(k, v)| (encode(k), v)).collect();
			encoded.sort_by(|a, b| a.0.cmp(&b.0));
			let tag = if encoded.len() > u16::MAX as usize { MAP32 } else { MAP16 };
			out.push(tag);
			push_len(tag == MAP32, encoded.len(), out);
			for (k, v) in encoded {
				out.extend_from_slice(&k);
				encode_into(v, out);
			}
		}
	}
}

fn push_len(wide: bool, n: usize, out: &mut Vec<u8>) {
	if wide {
		out.extend_from_slice(&(n as u32).to_be_bytes());
	} else {
		out.extend_from_slice(&(n as u16).to_be_bytes());
	}
}

fn encode_length_prefixed(tag8: u8, tag16: u8, tag32: u8, bytes: &[u8], out: &mut Vec<u8>) {
	let n = bytes.len();
	if n <= u8::MAX as usize {
		out.push(tag8);
		out.push(n as u8);
	} else if n <= u16::MAX as usize {
		out.push(tag16);
		out.extend_from_slice(&(n as u16).to_be_bytes());
	} else {
		out.push(tag32);
		out.extend_from_slice(&(n as u32).to_be_bytes());
	}
	out.extend_from_slice(bytes);
}

fn encode_float(f: f64) -> [u8; 8] {
	let bits = f.to_bits();
	let flipped = if f.is_sign_negative() { !bits } else { bits ^ (1 << 63) };
	flipped.to_be_bytes()
}

fn decode_float(bytes: [u8; 8]) -> f64 {
	let x = u64::from_be_bytes(bytes);
	let unflipped = if (x & (1 << 63)) != 0 { x ^ (1 << 63) } else { !x };
	f64::from_bits(unflipped)
}

/// Decodes a single value starting at the front of `b`, returning it
/// together with the number of bytes consumed.
pub fn decode_value(b: &[u8]) -> Result<(Value, usize)> {
	let tag = *b.first().ok_or(Error::Truncated)?;
	match tag {
		NULL => Ok((Value::Null, 1)),
		FALSE => Ok((Value::Bool(false), 1)),
		TRUE => Ok((Value::Bool(true), 1)),
		FLOAT32 => {
			let bytes = read_exact::<4>(b, 1)?;
			let mut be = [0u8; 8];
			be[0..4].copy_from_slice(&bytes);
			let x = u32::from_be_bytes(bytes);
			let unflipped = if (x & (1 << 31)) != 0 { x ^ (1 << 31) } else { !x };
			Ok((Value::Float(f32::from_bits(unflipped) as f64), 5))
		}
		FLOAT64 => {
			let bytes = read_exact::<8>(b, 1)?;
			Ok((Value::Float(decode_float(bytes)), 9))
		}
		UINT8 => Ok((Value::Uint(b.get(1).copied().ok_or(Error::Truncated)? as u64), 2)),
		UINT16 => {
			let bytes = read_exact::<2>(b, 1)?;
			Ok((Value::Uint(u16::from_be_bytes(bytes) as u64), 3))
		}
		UINT32 => {
			let bytes = read_exact::<4>(b, 1)?;
			Ok((Value::Uint(u32::from_be_bytes(bytes) as u64), 5))
		}
		UINT64 => {
			let bytes = read_exact::<8>(b, 1)?;
			Ok((Value::Uint(u64::from_be_bytes(bytes)), 9))
		}
		INT8 => {
			let n = b.get(1).copied().ok_or(Error::Truncated)?;
			Ok((Value::Int(n as i64 - i8::MAX as i64 - 1), 2))
		}
		INT16 => {
			let bytes = read_exact::<2>(b, 1)?;
			let n = u16::from_be_bytes(bytes);
			Ok((Value::Int(n as i64 - i16::MAX as i64 - 1), 3))
		}
		INT32 => {
			let bytes = read_exact::<4>(b, 1)?;
			let n = u32::from_be_bytes(bytes);
			Ok((Value::Int(n as i64 - i32::MAX as i64 - 1), 5))
		}
		INT64 => {
			let bytes = read_exact::<8>(b, 1)?;
			let n = u64::from_be_bytes(bytes);
			let i = (n as i128 + i64::MIN as i128) as i64;
			Ok((Value::Int(i), 9))
		}
		STR8 | BIN8 => {
			let n = b.get(1).copied().ok_or(Error::Truncated)? as usize;
			let data = slice_at(b, 2, n)?;
			decode_str_or_bin(tag, data, 2 + n)
		}
		STR16 | BIN16 => {
			let lb = read_exact::<2>(b, 1)?;
			let n = u16::from_be_bytes(lb) as usize;
			let data = slice_at(b, 3, n)?;
			decode_str_or_bin(tag, data, 3 + n)
		}
		STR32 | BIN32 => {
			let lb = read_exact::<4>(b, 1)?;
			let n = u32::from_be_bytes(lb) as usize;
			let data = slice_at(b, 5, n)?;
			decode_str_or_bin(tag, data, 5 + n)
		}
		ARRAY16 | ARRAY32 => {
			let (n, mut off) = read_len(b, tag == ARRAY32)?;
			let mut items = Vec::with_capacity(n);
			for _ in 0..n {
				let (v, used) = decode_value(&b[off..])?;
				items.push(v);
				off += used;
			}
			Ok((Value::Array(items), off))
		}
		MAP16 | MAP32 => {
			let (n, mut off) = read_len(b, tag == MAP32)?;
			let mut entries = Vec::with_capacity(n);
			for _ in 0..n {
				let (k, used) = decode_value(&b[off..])?;
				off += used;
				let (v, used) = decode_value(&b[off..])?;
				off += used;
				entries.push((k, v));
			}
			Ok((Value::Map(entries), off))
		}
		_ => Err(Error::UnmarshalType { expected: "known tag", offset: 0 }),
	}
}

fn decode_str_or_bin(tag: u8, data: &[u8], total: usize) -> Result<(Value, usize)> {
	if tag == STR8 || tag == STR16 || tag == STR32 {
		let s = std::str::from_utf8(data)
			.map_err(|_| Error::InvalidUnmarshal { type_name: "str" })?
			.to_owned();
		Ok((Value::Str(s), total))
	} else {
		Ok((Value::Bin(data.to_vec()), total))
	}
}

fn read_len(b: &[u8], wide: bool) -> Result<(usize, usize)> {
	if wide {
		let bytes = read_exact::<4>(b, 1)?;
		Ok((u32::from_be_bytes(bytes) as usize, 5))
	} else {
		let bytes = read_exact::<2>(b, 1)?;
		Ok((u16::from_be_bytes(bytes) as usize, 3))
	}
}

fn read_exact<const N: usize>(b: &[u8], off: usize) -> Result<[u8; N]> {
	let slice = b.get(off..off + N).ok_or(Error::Truncated)?;
	let mut out = [0u8; N];
	out.copy_from_slice(slice);
	Ok(out)
}

fn slice_at(b: &[u8], off: usize, n: usize) -> Result<&[u8]> {
	b.get(off..off + n).ok_or(Error::Truncated)
}

/// Decodes a buffer that is expected to hold exactly one value.
pub fn decode(b: &[u8]) -> Result<Value> {
	let (v, _) = decode_value(b)?;
	Ok(v)
}

/// Byte-level comparator driving range scans and map-key ordering. Walks
/// both buffers value-by-value without fully decoding either side.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
	compare_value(a, b).0
}

fn compare_value(a: &[u8], b: &[u8]) -> (Ordering, usize, usize) {
	let (ta, tb) = (a.first().copied(), b.first().copied());
	match (ta, tb) {
		(None, None) => (Ordering::Equal, 0, 0),
		(None, Some(_)) => (Ordering::Less, 0, 0),
		(Some(_), None) => (Ordering::Greater, 0, 0),
		(Some(ta), Some(tb)) => {
			if ta != tb {
				return (ta.cmp(&tb), 0, 0);
			}
			compare_same_tag(ta, a, b)
		}
	}
}

fn compare_same_tag(tag: u8, a: &[u8], b: &[u8]) -> (Ordering, usize, usize) {
	let fixed = fixed_payload_len(tag);
	if let Some(n) = fixed {
		let pa = &a[1..1 + n.min(a.len() - 1)];
		let pb = &b[1..1 + n.min(b.len() - 1)];
		return (pa.cmp(pb), 1 + n, 1 + n);
	}

	match tag {
		STR8 | BIN8 => compare_length_prefixed(a, b, 1, 1),
		STR16 | BIN16 => compare_length_prefixed(a, b, 1, 2),
		STR32 | BIN32 => compare_length_prefixed(a, b, 1, 4),
		ARRAY16 | MAP16 => compare_container(a, b, 2, tag == MAP16),
		ARRAY32 | MAP32 => compare_container(a, b, 4, tag == MAP32),
		_ => (Ordering::Equal, a.len(), b.len()),
	}
}

fn fixed_payload_len(tag: u8) -> Option<usize> {
	match tag {
		NULL | FALSE | TRUE => Some(0),
		UINT8 | INT8 => Some(1),
		UINT16 | INT16 => Some(2),
		UINT32 | INT32 | FLOAT32 => Some(4),
		UINT64 | INT64 | FLOAT64 => Some(8),
		_ => None,
	}
}

fn compare_length_prefixed(a: &[u8], b: &[u8], tagsize: usize, lensize: usize) -> (Ordering, usize, usize) {
	let na = read_len_at(a, tagsize, lensize);
	let nb = read_len_at(b, tagsize, lensize);
	let hdr = tagsize + lensize;
	let pa = &a[hdr..hdr + na];
	let pb = &b[hdr..hdr + nb];
	let common = pa.len().min(pb.len());
	let ord = pa[..common].cmp(&pb[..common]).then_with(|| na.cmp(&nb));
	(ord, hdr + na, hdr + nb)
}

fn read_len_at(b: &[u8], tagsize: usize, lensize: usize) -> usize {
	let slice = &b[tagsize..tagsize + lensize];
	match lensize {
		1 => slice[0] as usize,
		2 => u16::from_be_bytes([slice[0], slice[1]]) as usize,
		4 => u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]) as usize,
		_ => unreachable!(),
	}
}

fn compare_container(a: &[u8], b: &[u8], lensize: usize, is_map: bool) -> (Ordering, usize, usize) {
	let na = read_len_at(a, 1, lensize);
	let nb = read_len_at(b, 1, lensize);
	let mut off_a = 1 + lensize;
	let mut off_b = 1 + lensize;
	let n = na.min(nb);
	let per_entry = if is_map { 2 } else { 1 };
	for _ in 0..(n * per_entry) {
		let (ord, ua, ub) = compare_value(&a[off_a..], &b[off_b..]);
		off_a += ua;
		off_b += ub;
		if ord != Ordering::Equal {
			// still need total consumed length for caller bookkeeping; best effort.
			return (ord, off_a, off_b);
		}
	}
	// Prefix matched; skip past any remaining entries on the longer side so
	// the caller gets an accurate total-consumed length, using the decoder
	// (rather than the comparator) since there is nothing left to compare.
	let mut remain_a = off_a;
	for _ in 0..((na.saturating_sub(n)) * per_entry) {
		match decode_value(&a[remain_a..]) {
			Ok((_, used)) => remain_a += used,
			Err(_) => break,
		}
	}
	let mut remain_b = off_b;
	for _ in 0..((nb.saturating_sub(n)) * per_entry) {
		match decode_value(&b[remain_b..]) {
			Ok((_, used)) => remain_b += used,
			Err(_) => break,
		}
	}
	(na.cmp(&nb), remain_a, remain_b)
}

/// Produces a single comparison word usable as a cheap prefilter: top 16
/// bits are the namespace (saturated), next 8 the first value's type tag,
/// remaining 40 a prefix of its payload.
pub fn abbreviated_key(b: &[u8]) -> u64 {
	let (ns, rest) = match decode_value(b) {
		Ok((Value::Uint(n), used)) => (n, &b[used..]),
		_ => return 0,
	};
	let ns_part = if ns >= 1 << 16 { 0xFFFFu64 } else { ns } << 48;
	let (tag, payload_prefix) = abbreviated_value(rest);
	ns_part | ((tag as u64) << 40) | payload_prefix
}

fn abbreviated_value(b: &[u8]) -> (u8, u64) {
	let Some(&tag) = b.first() else { return (0, 0) };
	let payload = &b[1.min(b.len())..];
	let prefix = match tag {
		STR8 | BIN8 => payload.get(1..).unwrap_or(&[]),
		STR16 | BIN16 => payload.get(2..).unwrap_or(&[]),
		STR32 | BIN32 => payload.get(4..).unwrap_or(&[]),
		ARRAY16 | MAP16 => payload.get(2..).unwrap_or(&[]),
		ARRAY32 | MAP32 => payload.get(4..).unwrap_or(&[]),
		_ => payload,
	};
	let mut word = 0u64;
	for (i, byte) in prefix.iter().take(5).enumerate() {
		word |= (*byte as u64) << (32 - i * 8);
	}
	(tag, word)
}

/// Given an encoded key whose first value is the namespace (an unsigned
/// 64-bit integer), returns the encoding of `namespace + 1`, saturating at
/// `u64::MAX`.
pub fn successor(b: &[u8]) -> Vec<u8> {
	match decode_value(b) {
		Ok((Value::Uint(ns), _)) => encode(&Value::Uint(ns.saturating_add(1))),
		_ => b.to_vec(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_every_scalar_variant() {
		let values = vec![
			Value::Null,
			Value::Bool(false),
			Value::Bool(true),
			Value::Float(-3.5),
			Value::Float(f64::MIN_POSITIVE),
			Value::Int(i64::MIN),
			Value::Int(-1),
			Value::Int(0),
			Value::Int(i64::MAX),
			Value::Uint(0),
			Value::Uint(u64::MAX),
			Value::Bin(vec![1, 2, 3]),
			Value::Str("中文 😀".into()),
			Value::Array(vec![Value::Int(1), Value::Str("a".into())]),
			Value::Map(vec![(Value::Str("a".into()), Value::Int(1))]),
		];
		for v in values {
			assert_eq!(decode(&encode(&v)).unwrap(), v, "round trip failed for {v:?}");
		}
	}

	#[test]
	fn ordering_matches_the_value_domain_total_order() {
		// Group order follows the fixed tag bytes, not the prose gloss:
		// null(C0) < false(C2) < true(C3) < bin(C4-C6) < float(CA-CB) <
		// uint(CC-CF) < int(D0-D3) < str(D9-DB) < array(DC-DD) < map(DE-DF).
		// Within a group, values compare by payload.
		let ascending = vec![
			Value::Null,
			Value::Bool(false),
			Value::Bool(true),
			Value::Bin(vec![1]),
			Value::Bin(vec![1, 2]),
			Value::Float(f64::MIN_POSITIVE),
			Value::Float(100.0),
			Value::Uint(0),
			Value::Uint(u64::MAX),
			Value::Int(i64::MIN),
			Value::Int(-1),
			Value::Int(0),
			Value::Int(i64::MAX),
			Value::Str("1".into()),
			Value::Str("2".into()),
			Value::Str("中文".into()),
			Value::Str("😀".into()),
			Value::Array(vec![Value::Int(1)]),
			Value::Map(vec![(Value::Str("a".into()), Value::Int(1))]),
		];

		let mut encoded: Vec<Vec<u8>> = ascending.iter().map(encode).collect();
		let mut shuffled = encoded.clone();
		shuffled.reverse();
		shuffled.sort_by(|a, b| compare(a, b));
		assert_eq!(shuffled, encoded);

		encoded.sort_by(|a, b| compare(a, b));
		let decoded: Vec<Value> = encoded.iter().map(|b| decode(b).unwrap()).collect();
		assert_eq!(decoded, ascending);
	}

	#[test]
	fn namespace_prefix_totally_orders_before_payload() {
		let ns10 = {
			let mut b = encode(&Value::Uint(10));
			b.extend(encode(&Value::Str("zzzz".into())));
			b
		};
		let ns11 = {
			let mut b = encode(&Value::Uint(11));
			b.extend(encode(&Value::Str("aaaa".into())));
			b
		};
		assert_eq!(compare(&ns10, &ns11), Ordering::Less);
	}

	#[test]
	fn successor_increments_the_leading_namespace_and_saturates() {
		let k = encode(&Value::Uint(10));
		assert_eq!(successor(&k), encode(&Value::Uint(11)));

		let max = encode(&Value::Uint(u64::MAX));
		assert_eq!(successor(&max), encode(&Value::Uint(u64::MAX)));
	}

	#[test]
	fn abbreviated_key_is_stable_for_equal_prefixes() {
		let a = {
			let mut b = encode(&Value::Uint(5));
			b.extend(encode(&Value::Str("same-prefix-aaaa".into())));
			b
		};
		let b = {
			let mut b = encode(&Value::Uint(5));
			b.extend(encode(&Value::Str("same-prefix-zzzz".into())));
			b
		};
		assert_eq!(abbreviated_key(&a), abbreviated_key(&b));
	}

	#[test]
	fn nan_is_rejected_when_building_a_value_from_a_record() {
		// `encode`/`decode` operate on an already-constructed `Value`, which
		// cannot hold a NaN: rejection happens one layer up, when a record
		// is first turned into a `Value` (see `value_serde::to_value`).
		#[derive(serde::Serialize)]
		struct HasFloat {
			x: f64,
		}
		let err = super::to_value(&HasFloat { x: f64::NAN }).unwrap_err();
		assert!(matches!(err, Error::UnsupportedType { .. }));
	}
}
