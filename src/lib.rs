//! # relmap
//!
//! A dialect-neutral SQL builder and entity mapper for MySQL and PostgreSQL.
//!
//! Queries are plain values built from [`query`] builders and rendered by the
//! [`transpiler`] for either engine. On top of that, the [`entity`] layer maps
//! Rust types to tables: CRUD, eager loading of relations and join-table
//! synchronization for many-to-many properties.
//!
//! ## Quick Example
//!
//! ```
//! use relmap::prelude::*;
//!
//! let select = Select::new(["id", "name"])
//!     .from("User")
//!     .where_eq("active", true)
//!     .limit(10);
//!
//! let stmt = select.compile(Dialect::Postgres).unwrap();
//! assert_eq!(
//!     stmt.sql,
//!     "SELECT \"id\",\"name\" FROM \"User\" WHERE \"active\"=$1 LIMIT 10"
//! );
//! ```
//!
//! ## Layers
//!
//! | Module        | Role                                         |
//! |---------------|----------------------------------------------|
//! | `ast`         | Values, expressions, conditions              |
//! | `schema`      | Column and constraint model                  |
//! | `query`       | Statement builders                           |
//! | `transpiler`  | Dialect rendering with bound parameters      |
//! | `driver`      | sqlx-backed execution and the `Connection`   |
//! | `entity`      | Entity handlers, record queries, NM sync     |
//! | `bootstrap`   | Audit log and dependency-ordered DDL         |

pub mod ast;
pub mod bootstrap;
pub mod config;
pub mod driver;
pub mod entity;
pub mod error;
pub mod query;
pub mod schema;
pub mod transpiler;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::config::ConnectionConfig;
    pub use crate::driver::{Connection, FetchType, Row};
    pub use crate::entity::{Entity, EntityQuery, EntitySchema, Record, Related};
    pub use crate::error::*;
    pub use crate::query::*;
    pub use crate::schema::{Column, ColumnKind, Constraint, OnDelete};
    pub use crate::transpiler::{Dialect, ToSql};
}
