//! # Relation Module
//!
//! Relation containers a model can declare as members:
//!
//! - [`ForeignKey<T>`]: a column holding the id of a `T`, resolved lazily.
//! - [`OneToMany<T>`]: children of type `T` that point back at the owner
//!   through one of their own foreign keys. No column on the owner.
//! - [`ManyToMany<T>`]: targets linked through a join table named after both
//!   sides. No column on the owner.
//!
//! Cascading and nulling on delete are declared in the DDL and left to SQLite.

// ============================================================================
// External Crate Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    cache::MetadataCache,
    database::Database,
    error::Error,
    field::{Field, Value},
    introspect::{discover_fields, AttributeDescriptor},
    model::{FieldKind, Model, ModelType, PK},
    query_set::Op,
};

// ============================================================================
// Delete Policy
// ============================================================================

/// What happens to a referencing row when its target row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    #[default]
    Cascade,
    SetNull,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

// ============================================================================
// Type-Erased Access
// ============================================================================

/// Object-safe view of a [`ForeignKey`], used to point children at their owner.
pub trait ForeignKeyLink: Send + Sync {
    fn target(&self) -> ModelType;

    /// Points the key at the row with primary key `id`.
    fn link(&mut self, id: i32);
}

/// Mutable view of a to-many member, produced by [`Model::relation_mut`].
pub enum RelationMut<'a> {
    /// Every held child; the persisted ones are linked to the owner and saved.
    OneToMany(Vec<&'a mut dyn Model>),
    /// Ids of the held targets.
    ManyToMany(Vec<i32>),
}

/// Name of the join table between two tables. The order of the arguments does not matter.
pub fn join_table_name(a: &str, b: &str) -> String {
    if a <= b { format!("{a}_{b}") } else { format!("{b}_{a}") }
}

/// First foreign key of `origin`, own members before inherited ones, that targets `target`.
pub fn find_foreign_key(cache: &mut MetadataCache, origin: ModelType, target: ModelType) -> Option<AttributeDescriptor> {
    discover_fields(cache, origin)
        .iter()
        .find(|field| matches!(field.kind, FieldKind::ForeignKey { target: t, .. } if t == target))
        .cloned()
}

/// First many-to-many member of `origin` that targets `target`.
pub fn find_many_to_many(cache: &mut MetadataCache, origin: ModelType, target: ModelType) -> Option<AttributeDescriptor> {
    discover_fields(cache, origin)
        .iter()
        .find(|field| matches!(field.kind, FieldKind::ManyToMany { target: t } if t == target))
        .cloned()
}

// ============================================================================
// ForeignKey
// ============================================================================

#[derive(Debug, Clone)]
enum Link<T> {
    Empty,
    Id(i32),
    Loaded(Box<T>),
}

/// Reference to a row of `T`, stored as an `integer` column.
///
/// Holds either nothing, a bare id loaded from the database, or a resolved
/// instance. [`ForeignKey::get`] turns a bare id into an instance on first use.
#[derive(Debug, Clone)]
pub struct ForeignKey<T> {
    link: Link<T>,
}

impl<T> Default for ForeignKey<T> {
    fn default() -> Self {
        Self { link: Link::Empty }
    }
}

impl<T: Model> ForeignKey<T> {
    pub fn new(value: T) -> Self {
        Self { link: Link::Loaded(Box::new(value)) }
    }

    pub fn from_id(id: i32) -> Self {
        Self { link: Link::Id(id) }
    }

    pub fn set(&mut self, value: T) {
        self.link = Link::Loaded(Box::new(value));
    }

    pub fn set_id(&mut self, id: i32) {
        self.link = Link::Id(id);
    }

    pub fn reset(&mut self) {
        self.link = Link::Empty;
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.link, Link::Empty)
    }

    /// Id of the referenced row, `0` when nothing (or an unsaved instance) is held.
    pub fn id(&self) -> i32 {
        match &self.link {
            Link::Empty => 0,
            Link::Id(id) => *id,
            Link::Loaded(value) => value.id(),
        }
    }

    /// True when the held instance has been saved. An id-only link is not
    /// persisted until [`ForeignKey::get`] resolves it.
    pub fn is_persisted(&self) -> bool {
        matches!(&self.link, Link::Loaded(value) if value.id() != 0)
    }

    /// The held instance, if one has been set or resolved.
    pub fn instance(&self) -> Option<&T> {
        match &self.link {
            Link::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn instance_mut(&mut self) -> Option<&mut T> {
        match &mut self.link {
            Link::Loaded(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the referenced instance, loading it from `db` the first time.
    ///
    /// A dangling id resolves to `None` and stays unresolved.
    pub async fn get(&mut self, db: &Database) -> Result<Option<&T>, Error>
    where
        T: Default,
    {
        if let Link::Id(id) = self.link {
            if id != 0 {
                if let Some(value) = db.objects::<T>().get(id).await? {
                    self.link = Link::Loaded(Box::new(value));
                }
            }
        }

        Ok(self.instance())
    }
}

impl<T: Model> From<T> for ForeignKey<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Model> ForeignKeyLink for ForeignKey<T> {
    fn target(&self) -> ModelType {
        T::model_type()
    }

    fn link(&mut self, id: i32) {
        if self.id() != id {
            self.link = Link::Id(id);
        }
    }
}

impl<T: Model> Field for ForeignKey<T> {
    fn kind() -> FieldKind {
        FieldKind::ForeignKey { target: T::model_type(), on_delete: OnDelete::default() }
    }

    fn to_value(&self) -> Option<Value> {
        match self.id() {
            0 => Some(Value::Null),
            id => Some(Value::Integer(i64::from(id))),
        }
    }

    fn assign(&mut self, value: Value) -> Result<(), String> {
        match value {
            Value::Null => self.reset(),
            Value::Integer(id) => self.link(i32::try_from(id).map_err(|e| e.to_string())?),
            other => return Err(format!("expected a row id, found {other:?}")),
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.link = Link::Empty;
    }

    fn as_foreign_key_mut(&mut self) -> Option<&mut dyn ForeignKeyLink> {
        Some(self)
    }
}

// ============================================================================
// OneToMany
// ============================================================================

/// Children of type `T` owned by a model.
///
/// `T` must declare a [`ForeignKey`] to the owner type; saving the owner links
/// every persisted child through it and saves the child. Unsaved children are
/// not inserted; save them first.
#[derive(Debug, Clone)]
pub struct OneToMany<T> {
    items: Vec<T>,
}

impl<T> Default for OneToMany<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Model> OneToMany<T> {
    pub fn add(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn values(&self) -> &[T] {
        &self.items
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replaces the held children with the persisted children of `owner`, in id order.
    pub async fn fetch<O: Model>(&mut self, db: &Database, owner: &O) -> Result<&[T], Error>
    where
        T: Default,
    {
        self.items.clear();
        if !owner.is_persisted() {
            return Ok(&self.items);
        }

        let back = db.registry.back_reference(T::model_type(), O::model_type())?;
        self.items = db.objects::<T>().filter(back.name, Op::Eq, owner.id())?.order_by(PK)?.all().await?;
        Ok(&self.items)
    }
}

impl<T: Model> Field for OneToMany<T> {
    fn kind() -> FieldKind {
        FieldKind::OneToMany { target: T::model_type() }
    }

    fn to_value(&self) -> Option<Value> {
        None
    }

    fn assign(&mut self, _value: Value) -> Result<(), String> {
        Err("one-to-many relations are not stored in a column".to_string())
    }

    fn reset(&mut self) {
        self.items.clear();
    }

    fn as_relation_mut(&mut self) -> Option<RelationMut<'_>> {
        Some(RelationMut::OneToMany(self.items.iter_mut().map(|item| item as &mut dyn Model).collect()))
    }
}

// ============================================================================
// ManyToMany
// ============================================================================

/// Targets of type `T` linked to the owner through a join table.
///
/// Only targets that are already persisted get a join row when the owner is saved.
#[derive(Debug, Clone)]
pub struct ManyToMany<T> {
    items: Vec<T>,
}

impl<T> Default for ManyToMany<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Model> ManyToMany<T> {
    pub fn add(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn values(&self) -> &[T] {
        &self.items
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Join table linking an owner of type `O` to `T`.
    pub fn join_table_name<O: Model>(&self) -> String {
        join_table_name(&O::model_type().table_name(), &T::model_type().table_name())
    }

    /// Replaces the held targets with those linked to `origin`, in id order.
    pub async fn fetch<O: Model>(&mut self, db: &Database, origin: &O) -> Result<&[T], Error>
    where
        T: Default,
    {
        self.items.clear();
        if !origin.is_persisted() {
            return Ok(&self.items);
        }

        let declared_on = db
            .registry
            .many_to_many(O::model_type(), T::model_type())
            .map_or(O::model_type(), |field| field.declared_on);
        let origin_table = declared_on.table_name();
        let target_table = T::model_type().table_name();
        let join = join_table_name(&origin_table, &target_table);

        self.items = db
            .objects::<T>()
            .join_raw(&join, &format!("{join}.{target_table} = {target_table}.{PK}"))
            .where_raw(&format!("{join}.{origin_table} = ?"), origin.id())
            .order_by(PK)?
            .all()
            .await?;
        Ok(&self.items)
    }
}

impl<T: Model> Field for ManyToMany<T> {
    fn kind() -> FieldKind {
        FieldKind::ManyToMany { target: T::model_type() }
    }

    fn to_value(&self) -> Option<Value> {
        None
    }

    fn assign(&mut self, _value: Value) -> Result<(), String> {
        Err("many-to-many relations are not stored in a column".to_string())
    }

    fn reset(&mut self) {
        self.items.clear();
    }

    fn as_relation_mut(&mut self) -> Option<RelationMut<'_>> {
        Some(RelationMut::ManyToMany(self.items.iter().map(Model::id).collect()))
    }
}
