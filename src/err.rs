use thiserror::Error;

/// The single error type crossing module boundaries in this crate.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
	#[error("{name:?} not found")]
	NotFound { name: String },

	#[error("conflict on constraint {name:?}")]
	Conflict { name: String, key: Vec<u8> },

	#[error("key path {path} not found")]
	KeyPathNotFound { path: String },

	#[error("unsupported type {type_name}")]
	UnsupportedType { type_name: &'static str },

	#[error("cannot unmarshal into {expected} at offset {offset}")]
	UnmarshalType { expected: &'static str, offset: usize },

	#[error("invalid unmarshal target {type_name}")]
	InvalidUnmarshal { type_name: &'static str },

	#[error("truncated or malformed encoding")]
	Truncated,

	#[error("cannot index without enough values")]
	IndexArity,

	#[error("cannot index a value without a key")]
	IndexMissingKey,

	#[error("transaction already finished")]
	TxFinished,

	#[error("cannot commit a read-only transaction")]
	TxReadonly,

	#[error("a write transaction is already in progress")]
	TxConditionNotMet,

	#[error("storage engine error: {0}")]
	Engine(String),

	#[error("operation cancelled")]
	Cancelled,

	/// Internal control-flow signal used to short-circuit a `Tree`/`Table`/
	/// `Index` range scan once a caller (`Index::exists`, `Limit`) has seen
	/// enough rows; always caught at the call site that raised it and never
	/// surfaced past this crate's public API.
	#[doc(hidden)]
	#[error("iteration stopped early")]
	Stop,

	#[error("{0}")]
	Other(String),
}

impl Error {
	pub fn conflict(name: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
		Error::Conflict { name: name.into(), key: key.into() }
	}

	pub fn not_found(name: impl Into<String>) -> Self {
		Error::NotFound { name: name.into() }
	}

	/// Returns the conflict payload if this error is a `Conflict`.
	pub fn as_conflict(&self) -> Option<(&str, &[u8])> {
		match self {
			Error::Conflict { name, key } => Some((name.as_str(), key.as_slice())),
			_ => None,
		}
	}

	pub fn as_not_found(&self) -> bool {
		matches!(self, Error::NotFound { .. })
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
