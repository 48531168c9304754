//! SQLite collaborator for `sql-mapper`, built on `rusqlite`.
//!
//! [`SqliteConnection`] implements the mapper's [`sql_mapper::Connection`]
//! family of traits. Booleans are stored as integers; decimals, temporals and
//! JSON as text. Declared column types drive conversion back to
//! [`sql_mapper::SqlValue`] when rows are read.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod connection;
mod error;
mod value;

pub use connection::{SqliteConnection, SqliteRows, SqliteStatement};
pub use error::SqliteError;
pub use value::{Declared, Param, read_value};
