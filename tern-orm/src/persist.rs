//! # Persistence
//!
//! Row-level save, delete and hydration. Every function works on one borrowed
//! connection, so a save and all the relation saves it triggers share it.

// ============================================================================
// External Crate Imports
// ============================================================================

use futures::future::BoxFuture;
use sqlx::{
    any::{AnyArguments, AnyRow},
    AnyConnection, Row,
};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    error::Error,
    field::Value,
    introspect::AttributeDescriptor,
    model::{FieldKind, Model, PK},
    registry::Registry,
    relation::{join_table_name, RelationMut},
};

/// Outcome of [`insert_or_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upsert {
    /// A new row was written; carries its rowid, if the store reported one.
    Inserted(Option<i64>),
    Updated(u64),
    /// The row exists and there was nothing to update.
    Unchanged,
}

pub(crate) fn arguments<'q>(values: impl IntoIterator<Item = Value>) -> Result<AnyArguments<'q>, sqlx::Error> {
    let mut args = AnyArguments::default();
    for value in values {
        value.bind(&mut args)?;
    }
    Ok(args)
}

/// Writes `values` to the row of `table` whose primary key is `id`, creating it if needed.
pub(crate) async fn insert_or_update(
    conn: &mut AnyConnection,
    table: &str,
    id: i32,
    values: Vec<(&'static str, Value)>,
) -> Result<Upsert, sqlx::Error> {
    let select = format!("SELECT {PK} FROM {table} WHERE {PK} = ?");
    let exists = sqlx::query_with(&select, arguments([Value::from(id)])?)
        .fetch_optional(&mut *conn)
        .await?
        .is_some();

    if exists {
        let (columns, values): (Vec<_>, Vec<_>) = values.into_iter().filter(|(column, _)| *column != PK).unzip();
        if columns.is_empty() {
            return Ok(Upsert::Unchanged);
        }

        let assignments: Vec<String> = columns.iter().map(|column| format!("{column} = ?")).collect();
        let sql = format!("UPDATE {table} SET {} WHERE {PK} = ?", assignments.join(", "));
        log::debug!("{sql}");

        let args = arguments(values.into_iter().chain([Value::from(id)]))?;
        let result = sqlx::query_with(&sql, args).execute(&mut *conn).await?;
        return Ok(Upsert::Updated(result.rows_affected()));
    }

    let sql = if values.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
        let columns: Vec<&str> = values.iter().map(|(column, _)| *column).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!("INSERT INTO {table} ({}) VALUES ({placeholders})", columns.join(", "))
    };
    log::debug!("{sql}");

    let args = arguments(values.into_iter().map(|(_, value)| value))?;
    sqlx::query_with(&sql, args).execute(&mut *conn).await?;

    // The `Any` driver does not surface the rowid; ask the same connection.
    let rowid: i64 = sqlx::query("SELECT last_insert_rowid()").fetch_one(&mut *conn).await?.try_get(0)?;
    Ok(Upsert::Inserted((rowid > 0).then_some(rowid)))
}

/// Saves `model` and then its relations.
///
/// `explicit_id` is only honoured for models without an autoincrementing key.
/// Store faults are logged and reported as `Ok(false)`; a failed row write also
/// resets the id to `0`.
pub(crate) fn save<'a>(
    conn: &'a mut AnyConnection,
    registry: &'a Registry,
    model: &'a mut dyn Model,
    explicit_id: Option<i32>,
) -> BoxFuture<'a, Result<bool, Error>> {
    Box::pin(async move {
        let descriptor = model.descriptor();
        if descriptor.is_abstract() {
            log::warn!("{} is abstract and cannot be saved", descriptor.name());
            return Ok(false);
        }

        match explicit_id {
            Some(_) if descriptor.autoincrement() => {
                log::warn!("{} generates its own ids; use save() instead", descriptor.name());
                return Ok(false);
            }
            Some(id) => model.set_id(id),
            None if !descriptor.autoincrement() && model.id() == 0 => {
                log::warn!("{} needs an explicit id; use save_with_id()", descriptor.name());
                return Ok(false);
            }
            None => {}
        }

        let fields = registry.fields(descriptor);
        let table = descriptor.table_name();
        check_back_references(registry, model, &fields)?;

        let mut values = Vec::new();
        if !descriptor.autoincrement() {
            values.push((PK, Value::from(model.id())));
        }
        for field in fields.iter().filter(|field| field.is_column()) {
            if let Some(value) = model.field_value(field.name) {
                values.push((field.name, value));
            }
        }

        match insert_or_update(conn, &table, model.id(), values).await {
            Ok(Upsert::Inserted(_)) if !descriptor.autoincrement() => {}
            Ok(Upsert::Inserted(None)) => {
                log::error!("no rowid was reported for the new {table} row");
                model.set_id(0);
                return Ok(false);
            }
            Ok(Upsert::Inserted(Some(rowid))) => match i32::try_from(rowid) {
                Ok(id) => model.set_id(id),
                Err(_) => {
                    log::error!("rowid {rowid} of {table} does not fit an i32 id");
                    model.set_id(0);
                    return Ok(false);
                }
            },
            Ok(Upsert::Updated(_) | Upsert::Unchanged) => {}
            Err(e) => {
                log::error!("could not save {}: {e}", descriptor.name());
                model.set_id(0);
                return Ok(false);
            }
        }
        log::debug!("saved {} #{}", descriptor.name(), model.id());

        save_relations(conn, registry, model, &fields).await
    })
}

async fn save_relations(
    conn: &mut AnyConnection,
    registry: &Registry,
    model: &mut dyn Model,
    fields: &[AttributeDescriptor],
) -> Result<bool, Error> {
    let owner = model.descriptor();
    let owner_id = model.id();
    let mut saved = true;

    for field in fields {
        match field.kind {
            FieldKind::OneToMany { target } => {
                let Some(RelationMut::OneToMany(children)) = model.relation_mut(field.name) else {
                    continue;
                };

                // Unsaved children are left alone.
                for child in children.into_iter().filter(|child| child.id() != 0) {
                    let back = registry.back_reference(target, owner)?;
                    if let Some(link) = child.foreign_key_mut(back.name) {
                        link.link(owner_id);
                    }
                    saved &= save(&mut *conn, registry, child, None).await?;
                }
            }
            FieldKind::ManyToMany { target } => {
                let Some(RelationMut::ManyToMany(ids)) = model.relation_mut(field.name) else {
                    continue;
                };

                let origin_table = field.declared_on.table_name();
                let target_table = target.table_name();
                let join = join_table_name(&origin_table, &target_table);

                for target_id in ids.into_iter().filter(|id| *id != 0) {
                    if let Err(e) = link_join_row(conn, &join, (&origin_table, owner_id), (&target_table, target_id)).await {
                        log::error!("could not link {origin_table} #{owner_id} to {target_table} #{target_id}: {e}");
                        saved = false;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(saved)
}

/// Fails with [`Error::MissingBackReference`] when a persisted one-to-many child
/// has no foreign key pointing back at `model`'s type.
fn check_back_references(
    registry: &Registry,
    model: &mut dyn Model,
    fields: &[AttributeDescriptor],
) -> Result<(), Error> {
    let owner = model.descriptor();
    for field in fields {
        let FieldKind::OneToMany { target } = field.kind else {
            continue;
        };
        let Some(RelationMut::OneToMany(children)) = model.relation_mut(field.name) else {
            continue;
        };
        if children.iter().any(|child| child.id() != 0) {
            registry.back_reference(target, owner)?;
        }
    }
    Ok(())
}

/// Inserts the join row `(origin, target)` unless it already exists.
async fn link_join_row(
    conn: &mut AnyConnection,
    join: &str,
    (origin_column, origin_id): (&str, i32),
    (target_column, target_id): (&str, i32),
) -> Result<(), sqlx::Error> {
    let select = format!("SELECT 1 FROM {join} WHERE {origin_column} = ? AND {target_column} = ?");
    let existing = sqlx::query_with(&select, arguments([Value::from(origin_id), Value::from(target_id)])?)
        .fetch_optional(&mut *conn)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let insert = format!("INSERT INTO {join} ({origin_column}, {target_column}) VALUES (?, ?)");
    log::debug!("{insert}");
    sqlx::query_with(&insert, arguments([Value::from(origin_id), Value::from(target_id)])?)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Deletes the row of `model`. On success the id becomes `0` and every field is reset.
pub(crate) async fn delete(conn: &mut AnyConnection, model: &mut dyn Model) -> Result<bool, Error> {
    if model.id() == 0 {
        return Ok(false);
    }

    let descriptor = model.descriptor();
    let sql = format!("DELETE FROM {} WHERE {PK} = ?", descriptor.table_name());
    log::debug!("{sql}");

    let args = arguments([Value::from(model.id())])?;
    match sqlx::query_with(&sql, args).execute(&mut *conn).await {
        Ok(result) if result.rows_affected() > 0 => {
            model.set_id(0);
            model.reset_fields();
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) => {
            log::error!("could not delete {} #{}: {e}", descriptor.name(), model.id());
            Ok(false)
        }
    }
}

/// Builds a `T` from a `SELECT <table>.*` row.
pub(crate) fn hydrate<T: Model + Default>(registry: &Registry, row: &AnyRow) -> Result<T, Error> {
    let mut model = T::default();

    let id: i64 = row.try_get(PK)?;
    let id = i32::try_from(id).map_err(|e| Error::Decode { column: PK.to_string(), reason: e.to_string() })?;
    model.set_id(id);

    for field in registry.fields(T::model_type()).iter() {
        let Some(value_type) = field.kind.value_type() else {
            continue;
        };
        let value = Value::decode(row, field.name, value_type)?;
        model.set_field_value(field.name, value)?;
    }

    Ok(model)
}
