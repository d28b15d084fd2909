#[macro_use]
extern crate tracing;

pub mod catalog;
pub mod codec;
pub mod ctx;
pub mod db;
pub mod doc;
pub mod err;
pub mod idgen;
pub mod index;
pub mod key;
pub mod kvs;
pub mod op;
pub mod schema;
pub mod table;
pub mod tree;
pub mod txn;

pub use catalog::Catalog;
pub use ctx::Context;
pub use db::Database;
pub use doc::Document;
pub use err::{Error, Result};
pub use key::Key;
pub use tree::{Range, Tree};
