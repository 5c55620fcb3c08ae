//! # tern-orm
//!
//! An embedded ORM for SQLite. Models are plain structs deriving [`Model`];
//! their tables, columns, foreign keys and join tables are derived from the
//! struct layout and kept up to date by [`Migrator`] without ever dropping data.
//!
//! ```rust,ignore
//! use tern_orm::{Database, ForeignKey, Model, OneToMany, Op};
//!
//! #[derive(Model, Debug, Default)]
//! struct Brand {
//!     #[orm(primary_key)]
//!     id: i32,
//!     name: Option<String>,
//!     branches: OneToMany<Branch>,
//! }
//!
//! #[derive(Model, Debug, Default)]
//! struct Branch {
//!     #[orm(primary_key)]
//!     id: i32,
//!     city: Option<String>,
//!     brand: ForeignKey<Brand>,
//! }
//!
//! let db = Database::connect("sqlite::memory:").await?;
//! db.migrator().register::<Brand>().register::<Branch>().run().await?;
//!
//! let mut brand = Brand { name: Some("Acme".into()), ..Default::default() };
//! brand.branches.add(Branch { city: Some("Lisbon".into()), ..Default::default() });
//! db.save(&mut brand).await?;
//!
//! let lisbon = db.objects::<Branch>().filter("city", Op::Eq, "Lisbon")?.first().await?;
//! ```

extern crate self as tern_orm;

pub mod cache;
pub mod database;
pub mod error;
pub mod field;
pub mod introspect;
pub mod migration;
pub mod model;
pub mod pagination;
pub mod query_set;
pub mod relation;
pub mod schema;
pub mod transaction;

mod persist;
mod registry;

pub use tern_orm_macro::Model;

pub use crate::{
    cache::MetadataCache,
    database::{Database, DatabaseBuilder, RawQuery},
    error::Error,
    field::{Field, Scalar, Value, ValueType},
    introspect::AttributeDescriptor,
    migration::Migrator,
    model::{FieldInfo, FieldKind, Model, ModelType, PK},
    pagination::{Paginated, Pagination},
    query_set::{Op, QuerySet},
    relation::{ForeignKey, ForeignKeyLink, ManyToMany, OnDelete, OneToMany, RelationMut},
    schema::{Column, ColumnKind, TableDefinition},
    transaction::Transaction,
};
