//! The streaming operator pipeline. Operators form an owned, ordered
//! chain — each node holds its predecessor rather than the two sides
//! holding mutual `prev`/`next` pointers — built by folding a sequence of
//! [`Thunk`]s with [`pipe`].

mod state;

pub use state::State;

use crate::codec::Step;
use crate::codec::Value;
use crate::doc::Document;
use crate::err::{Error, Result};
use crate::index::Index;
use crate::key::Key;
use crate::schema::{to_steps, IndexType, Model};
use crate::table::Table;
use std::fmt;
use std::marker::PhantomData;

/// A single stage in the chain. `iterate` typically drives its upstream
/// with a continuation that transforms the document in flight and
/// forwards to `next`; a source stage (no upstream) calls `next` directly
/// once per document it emits.
pub trait Operator {
	fn iterate(&self, state: &mut State, next: &mut dyn FnMut(&mut State) -> Result<()>) -> Result<()>;

	/// A one-line description of this stage, for [`stringify`].
	fn describe(&self) -> String;

	/// This stage's predecessor, if any (sources return `None`).
	fn upstream(&self) -> Option<&dyn Operator> {
		None
	}
}

/// Walks from the tail to the first stage and back, joining each stage's
/// [`Operator::describe`] with `" | "`.
pub fn stringify(op: &dyn Operator) -> String {
	let mut stages = Vec::new();
	let mut cur = Some(op);
	while let Some(o) = cur {
		stages.push(o.describe());
		cur = o.upstream();
	}
	stages.reverse();
	stages.join(" | ")
}

impl fmt::Display for dyn Operator + '_ {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", stringify(self))
	}
}

/// Builds one stage given its already-wired predecessor (`None` for a
/// source stage).
pub type Thunk = Box<dyn FnOnce(Option<Box<dyn Operator>>) -> Box<dyn Operator>>;

/// Trims `None` entries and folds the rest into a chain, returning the
/// tail as the pipeline handle.
pub fn pipe(stages: Vec<Option<Thunk>>) -> Box<dyn Operator> {
	let mut upstream: Option<Box<dyn Operator>> = None;
	for thunk in stages.into_iter().flatten() {
		upstream = Some(thunk(upstream));
	}
	upstream.expect("pipe requires at least one stage")
}

// ---------------------------------------------------------------------
// Omit — a source stage emitting a fixed set of documents.
// ---------------------------------------------------------------------

struct Omit {
	docs: Vec<Document>,
}

impl Operator for Omit {
	fn iterate(&self, state: &mut State, next: &mut dyn FnMut(&mut State) -> Result<()>) -> Result<()> {
		for doc in &self.docs {
			if state.ctx().is_done() {
				return Err(Error::Cancelled);
			}
			state.set_doc(Some(doc.clone()));
			next(state)?;
		}
		Ok(())
	}

	fn describe(&self) -> String {
		format!("omit({} docs)", self.docs.len())
	}
}

pub fn omit(docs: Vec<Document>) -> Thunk {
	Box::new(move |_upstream| Box::new(Omit { docs }))
}

// ---------------------------------------------------------------------
// Filter — keeps only upstream documents whose named field matches.
// ---------------------------------------------------------------------

/// The expected value a [`Filter`] stage checks a document field against.
/// A field whose decoded type does not match the matcher's variant is
/// treated as a non-match, not an error.
#[derive(Clone, Debug)]
pub enum Matcher {
	Str(String),
	Int(i64),
	Uint(u64),
	Bool(bool),
}

impl Matcher {
	fn matches(&self, value: &Value) -> bool {
		match (self, value) {
			(Matcher::Str(expected), Value::Str(actual)) => expected == actual,
			(Matcher::Int(expected), Value::Int(actual)) => expected == actual,
			(Matcher::Uint(expected), Value::Uint(actual)) => expected == actual,
			(Matcher::Bool(expected), Value::Bool(actual)) => expected == actual,
			_ => false,
		}
	}
}

struct Filter {
	upstream: Box<dyn Operator>,
	field: String,
	matcher: Matcher,
}

impl Operator for Filter {
	fn iterate(&self, state: &mut State, next: &mut dyn FnMut(&mut State) -> Result<()>) -> Result<()> {
		let field = self.field.as_str();
		let matcher = &self.matcher;
		self.upstream.iterate(state, &mut |state| {
			let doc = state.doc().expect("filter requires an upstream document");
			let path = [Step::from(field)];
			match doc.field(&path) {
				Ok(mut sub) => {
					if matcher.matches(sub.value()?) {
						next(state)
					} else {
						Ok(())
					}
				}
				Err(Error::KeyPathNotFound { .. }) => Ok(()),
				Err(e) => Err(e),
			}
		})
	}

	fn describe(&self) -> String {
		format!("filter({:?})", self.field)
	}

	fn upstream(&self) -> Option<&dyn Operator> {
		Some(self.upstream.as_ref())
	}
}

pub fn filter(field: impl Into<String>, matcher: Matcher) -> Thunk {
	let field = field.into();
	Box::new(move |upstream| {
		Box::new(Filter {
			upstream: upstream.expect("filter requires an upstream stage"),
			field,
			matcher,
		})
	})
}

// ---------------------------------------------------------------------
// Limit / Offset — per-execution counters.
// ---------------------------------------------------------------------

struct Limit {
	upstream: Box<dyn Operator>,
	n: usize,
}

impl Operator for Limit {
	fn iterate(&self, state: &mut State, next: &mut dyn FnMut(&mut State) -> Result<()>) -> Result<()> {
		let n = self.n;
		let mut seen = 0usize;
		match self.upstream.iterate(state, &mut |state| {
			if seen >= n {
				return Err(Error::Stop);
			}
			seen += 1;
			next(state)
		}) {
			Ok(()) | Err(Error::Stop) => Ok(()),
			Err(e) => Err(e),
		}
	}

	fn describe(&self) -> String {
		format!("limit({})", self.n)
	}

	fn upstream(&self) -> Option<&dyn Operator> {
		Some(self.upstream.as_ref())
	}
}

pub fn limit(n: usize) -> Thunk {
	Box::new(move |upstream| {
		Box::new(Limit { upstream: upstream.expect("limit requires an upstream stage"), n })
	})
}

struct Offset {
	upstream: Box<dyn Operator>,
	n: usize,
}

impl Operator for Offset {
	fn iterate(&self, state: &mut State, next: &mut dyn FnMut(&mut State) -> Result<()>) -> Result<()> {
		let n = self.n;
		let mut skipped = 0usize;
		self.upstream.iterate(state, &mut |state| {
			if skipped < n {
				skipped += 1;
				return Ok(());
			}
			next(state)
		})
	}

	fn describe(&self) -> String {
		format!("offset({})", self.n)
	}

	fn upstream(&self) -> Option<&dyn Operator> {
		Some(self.upstream.as_ref())
	}
}

pub fn offset(n: usize) -> Thunk {
	Box::new(move |upstream| {
		Box::new(Offset { upstream: upstream.expect("offset requires an upstream stage"), n })
	})
}

// ---------------------------------------------------------------------
// Insert — writes each upstream document into T's table.
// ---------------------------------------------------------------------

struct Insert<T> {
	upstream: Box<dyn Operator>,
	_marker: PhantomData<fn() -> T>,
}

impl<T: Model> Operator for Insert<T> {
	fn iterate(&self, state: &mut State, next: &mut dyn FnMut(&mut State) -> Result<()>) -> Result<()> {
		self.upstream.iterate(state, &mut |state| {
			let db = state.database()?;
			let schema = {
				let tx = state.transaction()?;
				db.catalog().table_schema_for::<T>(tx)?
			};
			let mut doc = state.take_doc().ok_or_else(|| Error::Other("insert requires an upstream document".into()))?;

			// Unique indexes are enforced here, not by the table itself
			//: a pre-existing entry for the row's indexed values is a
			// named conflict, surfaced before the row is ever written.
			for (name, index_schema) in schema.index_schemas.iter() {
				if index_schema.kind != IndexType::UniqueIndex {
					continue;
				}
				let values = indexed_values(&mut doc, index_schema)?;
				let tx = state.transaction()?;
				let (found, pk) = Index::new(tx, index_schema.clone()).exists(values)?;
				if found {
					return Err(Error::conflict(name.clone(), Key::new(vec![Value::Uint(pk)]).bytes()));
				}
			}

			let (key, mut doc) = {
				let tx = state.transaction()?;
				Table::new(tx, schema.clone()).insert(doc)?
			};

			for index_schema in schema.index_schemas.values() {
				let values = indexed_values(&mut doc, index_schema)?;
				let tx = state.transaction()?;
				Index::new(tx, index_schema.clone()).set(values, key.primary_key()?)?;
			}

			state.set_key(Some(key));
			state.set_doc(Some(doc));
			next(state)
		})
	}

	fn describe(&self) -> String {
		format!("insert({})", std::any::type_name::<T>())
	}

	fn upstream(&self) -> Option<&dyn Operator> {
		Some(self.upstream.as_ref())
	}
}

pub fn insert<T: Model + 'static>() -> Thunk {
	Box::new(move |upstream| {
		Box::new(Insert::<T> { upstream: upstream.expect("insert requires an upstream stage"), _marker: PhantomData })
	})
}

/// Reads the values a document carries at an index schema's declared
/// paths, in order.
fn indexed_values(doc: &mut Document, index_schema: &crate::schema::IndexSchema) -> Result<Vec<Value>> {
	index_schema
		.paths
		.iter()
		.map(|path| {
			let steps = to_steps(path);
			doc.field(&steps)?.value().cloned()
		})
		.collect()
}

// ---------------------------------------------------------------------
// OnConflict — catches a named constraint conflict from downstream.
// ---------------------------------------------------------------------

/// What to do when a matching conflict is caught. A distinct sentinel
/// rather than `Option<Operator>`, so "no recovery operator" and "swallow
/// the conflict" cannot be confused.
pub enum ConflictAction {
	DoNothing,
	Then(Box<dyn Operator>),
}

pub fn do_nothing() -> ConflictAction {
	ConflictAction::DoNothing
}

struct OnConflict {
	upstream: Box<dyn Operator>,
	constraint: String,
	action: ConflictAction,
}

impl Operator for OnConflict {
	fn iterate(&self, state: &mut State, next: &mut dyn FnMut(&mut State) -> Result<()>) -> Result<()> {
		match self.upstream.iterate(state, next) {
			Ok(()) => Ok(()),
			Err(Error::Conflict { name, key }) if name == self.constraint => match &self.action {
				ConflictAction::DoNothing => Ok(()),
				ConflictAction::Then(op) => {
					let mut nested = State::child(state);
					nested.set_key(Some(Key::from_encoded(key)));
					op.iterate(&mut nested, &mut |_| Ok(()))
				}
			},
			Err(e) => Err(e),
		}
	}

	fn describe(&self) -> String {
		format!("on_conflict({:?})", self.constraint)
	}

	fn upstream(&self) -> Option<&dyn Operator> {
		Some(self.upstream.as_ref())
	}
}

pub fn on_conflict(constraint: impl Into<String>, action: ConflictAction) -> Thunk {
	let constraint = constraint.into();
	Box::new(move |upstream| {
		Box::new(OnConflict { upstream: upstream.expect("on_conflict requires an upstream stage"), constraint, action })
	})
}
