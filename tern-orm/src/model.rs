//! # Model Module
//!
//! Static descriptions of persistable types and the [`Model`] trait.
//!
//! Each model exposes a *field table*: the ordered list of its declared
//! persistable members. An optional parent type contributes its own field table
//! after the model's, which is how single inheritance is expressed.
//!
//! The trait is normally implemented with `#[derive(Model)]`:
//!
//! ```rust,ignore
//! use tern_orm::{ForeignKey, Model, OneToMany};
//!
//! #[derive(Model, Debug, Default)]
//! struct Brand {
//!     #[orm(primary_key)]
//!     id: i32,
//!     #[orm(size = 50)]
//!     name: Option<String>,
//!     branches: OneToMany<Branch>,
//! }
//!
//! #[derive(Model, Debug, Default)]
//! struct Branch {
//!     #[orm(primary_key)]
//!     id: i32,
//!     name: Option<String>,
//!     brand: ForeignKey<Brand>,
//! }
//! ```
//!
//! ## Supported ORM Attributes
//!
//! - `#[orm(primary_key)]` - The `i32` identity member, stored in the reserved `id` column
//! - `#[orm(primary_key, no_autoincrement)]` - Identity supplied by the caller via `save_with_id`
//! - `#[orm(parent)]` - Embeds an ancestor model whose fields are inherited
//! - `#[orm(skip)]` - Member is not persisted
//! - `#[orm(size = N)]` - `varchar(N)` for string members, 0 < N <= 255
//! - `#[orm(on_delete = "set_null")]` - Foreign key nulls itself instead of cascading
//! - `#[orm(abstract_model)]` (on the struct) - No table, only inheritable fields

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{
    any::TypeId,
    fmt,
    hash::{Hash, Hasher},
};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    error::Error,
    field::{Value, ValueType},
    relation::{ForeignKeyLink, OnDelete, RelationMut},
};

/// Column name reserved for the primary key of every concrete model.
pub const PK: &str = "id";

// ============================================================================
// Field Table
// ============================================================================

/// Classification of a persistable member.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar { sql_type: String, value_type: ValueType },
    ForeignKey { target: ModelType, on_delete: OnDelete },
    OneToMany { target: ModelType },
    ManyToMany { target: ModelType },
}

impl FieldKind {
    pub fn scalar(sql_type: &str, value_type: ValueType) -> Self {
        FieldKind::Scalar { sql_type: sql_type.to_string(), value_type }
    }

    /// Narrows a `varchar` column to `max_length` characters.
    ///
    /// Lengths outside `1..=255` leave the kind untouched.
    pub fn with_max_length(self, max_length: usize) -> Self {
        match self {
            FieldKind::Scalar { sql_type, value_type } if sql_type.starts_with("varchar") && (1..=255).contains(&max_length) => {
                FieldKind::Scalar { sql_type: format!("varchar({max_length})"), value_type }
            }
            other => other,
        }
    }

    /// Overrides the delete policy of a foreign key; other kinds are untouched.
    pub fn with_on_delete(self, policy: OnDelete) -> Self {
        match self {
            FieldKind::ForeignKey { target, .. } => FieldKind::ForeignKey { target, on_delete: policy },
            other => other,
        }
    }

    /// True when the member is stored in a column of the owner's table.
    pub fn is_column(&self) -> bool {
        matches!(self, FieldKind::Scalar { .. } | FieldKind::ForeignKey { .. })
    }

    /// The model a relation points at.
    pub fn target(&self) -> Option<ModelType> {
        match self {
            FieldKind::Scalar { .. } => None,
            FieldKind::ForeignKey { target, .. } | FieldKind::OneToMany { target } | FieldKind::ManyToMany { target } => {
                Some(*target)
            }
        }
    }

    /// Storage class used when reading the column back.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            FieldKind::Scalar { value_type, .. } => Some(*value_type),
            FieldKind::ForeignKey { .. } => Some(ValueType::Integer),
            _ => None,
        }
    }

    /// Column definition fragment, e.g. `name varchar(255)`.
    pub fn definition(&self, column: &str) -> Option<String> {
        match self {
            FieldKind::Scalar { sql_type, .. } => Some(format!("{column} {sql_type}")),
            FieldKind::ForeignKey { .. } => Some(format!("{column} integer")),
            _ => None,
        }
    }
}

/// A declared persistable member of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldInfo {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

// ============================================================================
// Model Type
// ============================================================================

/// Identity and static layout of a model type.
///
/// Two descriptors are equal iff they describe the same Rust type.
#[derive(Clone, Copy)]
pub struct ModelType {
    type_id: fn() -> TypeId,
    name: &'static str,
    fields: fn() -> Vec<FieldInfo>,
    parent: Option<fn() -> ModelType>,
    is_abstract: bool,
    autoincrement: bool,
}

impl ModelType {
    /// Describes the concrete, autoincrementing model `T` named `name`.
    pub fn new<T: 'static>(name: &'static str, fields: fn() -> Vec<FieldInfo>) -> Self {
        Self {
            type_id: TypeId::of::<T>,
            name,
            fields,
            parent: None,
            is_abstract: false,
            autoincrement: true,
        }
    }

    pub fn with_parent(mut self, parent: fn() -> ModelType) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn set_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn set_autoincrement(mut self, autoincrement: bool) -> Self {
        self.autoincrement = autoincrement;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Physical table name: the simple type name, lower-cased.
    pub fn table_name(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn autoincrement(&self) -> bool {
        self.autoincrement
    }

    pub fn parent(&self) -> Option<ModelType> {
        self.parent.map(|parent| parent())
    }

    /// Members declared directly on this type, excluding ancestors.
    pub fn declared_fields(&self) -> Vec<FieldInfo> {
        (self.fields)()
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl Eq for ModelType {}

impl Hash for ModelType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id().hash(state);
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("is_abstract", &self.is_abstract)
            .finish()
    }
}

// ============================================================================
// Model Trait
// ============================================================================

/// A type whose instances can be stored in, and loaded from, the database.
///
/// Accessors take a field name and resolve it against the type's own members
/// first, then against its parent. Names that match nothing yield `None`/`false`.
pub trait Model: Send + Sync + 'static {
    fn model_type() -> ModelType
    where
        Self: Sized;

    /// Object-safe counterpart of [`Model::model_type`].
    fn descriptor(&self) -> ModelType;

    /// Primary key; `0` while the instance is unpersisted. Always `0` for abstract models.
    fn id(&self) -> i32;

    fn set_id(&mut self, id: i32);

    fn field_value(&self, name: &str) -> Option<Value>;

    /// Assigns a value loaded from the store. Returns whether a member matched `name`.
    fn set_field_value(&mut self, name: &str, value: Value) -> Result<bool, Error>;

    fn foreign_key_mut(&mut self, name: &str) -> Option<&mut dyn ForeignKeyLink>;

    fn relation_mut(&mut self, name: &str) -> Option<RelationMut<'_>>;

    /// Clears every persistable member, including inherited ones.
    fn reset_fields(&mut self);

    fn is_persisted(&self) -> bool {
        self.id() != 0
    }
}
