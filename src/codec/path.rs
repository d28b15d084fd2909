//! Key-path traversal over encoded buffers without a full decode.

use super::{decode_value, Value};
use crate::err::{Error, Result};

/// A step in a key path: either a map key (matched by decoded value
/// equality) or an array index.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
	Key(Value),
	Index(usize),
}

impl From<&str> for Step {
	fn from(s: &str) -> Self {
		Step::Key(Value::Str(s.to_owned()))
	}
}
impl From<i64> for Step {
	fn from(i: i64) -> Self {
		Step::Key(Value::Int(i))
	}
}
impl From<usize> for Step {
	fn from(i: usize) -> Self {
		Step::Index(i)
	}
}

struct Found {
	off: usize,
	len: usize,
}

impl Found {
	fn read<'a>(&self, b: &'a [u8]) -> &'a [u8] {
		&b[self.off..self.off + self.len]
	}

	fn next(&self) -> usize {
		self.off + self.len
	}
}

/// Returns the exact byte subrange of `b` addressed by `path`.
pub fn get<'a>(b: &'a [u8], path: &[Step]) -> Result<&'a [u8]> {
	if path.is_empty() {
		return Ok(b);
	}
	let found = scan(b, 0, path)?.ok_or_else(|| Error::KeyPathNotFound { path: describe(path) })?;
	Ok(found.read(b))
}

/// Returns a new buffer with the value at `path` replaced by the bytes
/// `replace` produces from the current bytes at that path.
pub fn set(b: &[u8], path: &[Step], replace: impl FnOnce(&[u8]) -> Result<Vec<u8>>) -> Result<Vec<u8>> {
	if path.is_empty() {
		return Ok(b.to_vec());
	}
	let found = scan(b, 0, path)?.ok_or_else(|| Error::KeyPathNotFound { path: describe(path) })?;
	let replacement = replace(found.read(b))?;

	let mut out = Vec::with_capacity(b.len() - found.len + replacement.len());
	out.extend_from_slice(&b[..found.off]);
	out.extend_from_slice(&replacement);
	out.extend_from_slice(&b[found.next()..]);
	Ok(out)
}

fn describe(path: &[Step]) -> String {
	path.iter()
		.map(|s| match s {
			Step::Key(v) => format!("{v:?}"),
			Step::Index(i) => format!("[{i}]"),
		})
		.collect::<Vec<_>>()
		.join(".")
}

/// Walks `b` starting at byte offset `off`, descending through `path`.
/// Matches the reference scanner's "stop after the first array step at this
/// level" behaviour: once a path step descends into an
/// array, sibling keys at the enclosing map level are not revisited.
fn scan(b: &[u8], off: usize, path: &[Step]) -> Result<Option<Found>> {
	if path.is_empty() {
		return Ok(None);
	}

	let tag = *b.get(off).ok_or(Error::Truncated)?;

	match tag {
		super::MAP16 | super::MAP32 => {
			let wide = tag == super::MAP32;
			let (n, hdr) = read_len(b, off, wide)?;
			let mut cursor = off + hdr;

			for _ in 0..n {
				let (key, key_len) = decode_value(&b[cursor..])?;
				let key_start = cursor;
				cursor += key_len;

				if matches!(&path[0], Step::Key(want) if *want == key) {
					if path.len() == 1 {
						let (_, val_len) = decode_value(&b[cursor..])?;
						return Ok(Some(Found { off: cursor, len: val_len }));
					}
					return scan(b, cursor, &path[1..]);
				}
				let _ = key_start;

				let (_, val_len) = decode_value(&b[cursor..])?;
				cursor += val_len;
			}
			Ok(None)
		}
		super::ARRAY16 | super::ARRAY32 => {
			let Step::Index(idx) = &path[0] else { return Ok(None) };
			let idx = *idx;
			let wide = tag == super::ARRAY32;
			let (n, hdr) = read_len(b, off, wide)?;
			let mut cursor = off + hdr;

			for i in 0..n {
				if i == idx {
					if path.len() == 1 {
						let (_, val_len) = decode_value(&b[cursor..])?;
						return Ok(Some(Found { off: cursor, len: val_len }));
					}
					return scan(b, cursor, &path[1..]);
				}
				if i > idx {
					break;
				}
				let (_, val_len) = decode_value(&b[cursor..])?;
				cursor += val_len;
			}
			Ok(None)
		}
		_ => Err(Error::Other(format!("{:?} is not a map or array value", path))),
	}
}

fn read_len(b: &[u8], off: usize, wide: bool) -> Result<(usize, usize)> {
	if wide {
		let bytes = b.get(off + 1..off + 5).ok_or(Error::Truncated)?;
		Ok((u32::from_be_bytes(bytes.try_into().unwrap()) as usize, 5))
	} else {
		let bytes = b.get(off + 1..off + 3).ok_or(Error::Truncated)?;
		Ok((u16::from_be_bytes(bytes.try_into().unwrap()) as usize, 3))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::{encode, Value};

	fn doc() -> Value {
		Value::Map(vec![
			(
				Value::Str("a".into()),
				Value::Array(vec![
					Value::Map(vec![
						(Value::Int(1), Value::Int(1)),
						(Value::Int(2), Value::Int(2)),
					]),
					Value::Map(vec![
						(Value::Str("1".into()), Value::Int(1)),
						(Value::Str("2".into()), Value::Int(2)),
					]),
				]),
			),
			(
				Value::Str("b".into()),
				Value::Map(vec![(
					Value::Str("c".into()),
					Value::Map(vec![(Value::Str("d".into()), Value::Str("1".into()))]),
				)]),
			),
		])
	}

	#[test]
	fn get_nested_path() {
		let b = encode(&doc());
		let path = vec![Step::from("b"), Step::from("c"), Step::from("d")];
		let got = super::get(&b, &path).unwrap();
		assert_eq!(crate::codec::decode(got).unwrap(), Value::Str("1".into()));
	}

	#[test]
	fn get_array_then_map_key() {
		let b = encode(&doc());
		let path = vec![Step::from("a"), Step::Index(0), Step::Key(Value::Int(1))];
		let got = super::get(&b, &path).unwrap();
		assert_eq!(crate::codec::decode(got).unwrap(), Value::Int(1));
	}

	#[test]
	fn get_missing_path_errors() {
		let b = encode(&doc());
		let path = vec![Step::from("a"), Step::Index(0), Step::Index(1)];
		assert!(super::get(&b, &path).is_err());
	}

	#[test]
	fn set_replaces_only_target() {
		let b = encode(&doc());
		let path = vec![Step::from("b"), Step::from("c"), Step::from("d")];
		let updated = super::set(&b, &path, |_| Ok(encode(&Value::Str("2222".into())))).unwrap();

		let got = super::get(&updated, &path).unwrap();
		assert_eq!(crate::codec::decode(got).unwrap(), Value::Str("2222".into()));

		let other = vec![Step::from("a"), Step::Index(0), Step::Key(Value::Int(1))];
		let got = super::get(&updated, &other).unwrap();
		assert_eq!(crate::codec::decode(got).unwrap(), Value::Int(1));
	}
}
