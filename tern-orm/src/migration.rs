use sqlx::{AnyConnection, Row};

use crate::{
    database::Database,
    error::Error,
    model::{Model, ModelType},
    registry::Registry,
};

/// Schema migration manager.
///
/// Collects the models a database should manage, then validates them and
/// brings the schema up to date in one pass.
pub struct Migrator<'a> {
    pub(crate) db: &'a Database,
    pub(crate) models: Vec<ModelType>,
}

impl<'a> Migrator<'a> {
    /// Creates a new Migrator instance associated with a Database.
    pub fn new(db: &'a Database) -> Self {
        Self { db, models: Vec::new() }
    }

    /// Registers a Model for migration.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// db.migrator()
    ///   .register::<User>()
    ///   .register::<Post>()
    ///   .run()
    ///   .await?;
    /// ```
    pub fn register<T: Model>(self) -> Self {
        self.register_type(T::model_type())
    }

    pub fn register_type(mut self, model: ModelType) -> Self {
        self.models.push(model);
        self
    }

    /// Replaces the database's managed models with the registered ones and reconciles.
    pub async fn run(self) -> Result<Database, Error> {
        log::info!("migrating {} model(s)", self.models.len());
        self.db.set_models(self.models).await?;
        Ok(self.db.clone())
    }
}

/// Brings every table of every registered model up to date.
///
/// Tables are created when missing, missing columns are added and foreign key
/// indexes are ensured. Nothing is ever dropped or retyped.
pub(crate) async fn reconcile(conn: &mut AnyConnection, registry: &Registry) -> Result<(), Error> {
    for model in registry.models() {
        let Some(definitions) = registry.table_definitions(model) else {
            continue;
        };

        for definition in definitions.iter() {
            let create = definition.create_sql();
            log::debug!("{create}");
            sqlx::query(&create).execute(&mut *conn).await?;
            registry.add_table(definition.name());

            let existing = table_columns(conn, definition.name()).await?;
            for alter in definition.plan_alterations(&existing) {
                log::info!("{alter}");
                sqlx::query(&alter).execute(&mut *conn).await?;
            }

            for index in definition.foreign_key_indexes() {
                log::debug!("{index}");
                sqlx::query(&index).execute(&mut *conn).await?;
            }
        }
    }

    Ok(())
}

/// Column names of `table` as reported by SQLite.
pub(crate) async fn table_columns(conn: &mut AnyConnection, table: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})")).fetch_all(&mut *conn).await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        columns.push(row.try_get::<String, _>("name")?);
    }
    Ok(columns)
}
