//! # Database Module
//!
//! Connection pooling, configuration and the public entry points of tern-orm.
//!
//! A [`Database`] owns a SQLite pool plus the registry of models it manages.
//! Every logical operation (a save with all of its relation saves, a delete, a
//! reconciliation pass) runs on a single connection acquired from the pool.
//! With the default of one pooled connection, concurrent callers take turns.

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use sqlx::{
    any::{AnyPoolOptions, AnyRow},
    AnyPool, Row,
};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    error::Error,
    field::Value,
    introspect::{self, AttributeDescriptor},
    migration::{self, Migrator},
    model::{Model, ModelType},
    persist,
    query_set::QuerySet,
    registry::Registry,
    schema::TableDefinition,
    transaction::Transaction,
};

fn foreign_keys_pragma(enabled: bool) -> &'static str {
    if enabled { "PRAGMA foreign_keys=ON" } else { "PRAGMA foreign_keys=OFF" }
}

// ============================================================================
// Database Struct
// ============================================================================

/// The main entry point for tern-orm.
///
/// Cloning is cheap; clones share the pool and the model registry.
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: AnyPool,
    pub(crate) registry: Registry,
    foreign_keys: Arc<AtomicBool>,
}

impl Database {
    /// Creates a new DatabaseBuilder for configuring the connection.
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Connects with the default settings.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        DatabaseBuilder::new().connect(url).await
    }

    /// Returns a new Migrator for registering models.
    pub fn migrator(&self) -> Migrator<'_> {
        Migrator::new(self)
    }

    /// Replaces the managed models and reconciles the schema with them.
    ///
    /// Every model is validated first; nothing is registered if one is rejected.
    pub async fn set_models(&self, models: Vec<ModelType>) -> Result<(), Error> {
        for model in &models {
            introspect::validate(*model)?;
        }

        self.registry.set_models(models);
        self.reconcile().await
    }

    pub fn models(&self) -> Vec<ModelType> {
        self.registry.models()
    }

    /// Creates missing tables, columns and foreign key indexes for every managed model.
    pub async fn reconcile(&self) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        migration::reconcile(&mut conn, &self.registry).await
    }

    /// Drops every known table and forgets all models and cached metadata.
    pub async fn drop_all(&self) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(foreign_keys_pragma(false)).execute(&mut *conn).await?;
        for table in self.registry.tables() {
            log::info!("dropping table {table}");
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}")).execute(&mut *conn).await?;
        }
        sqlx::query(foreign_keys_pragma(self.foreign_key_constraints())).execute(&mut *conn).await?;

        self.registry.reset();
        migration::reconcile(&mut conn, &self.registry).await
    }

    /// Drops one table, then reconciles; a table that is still managed comes back empty.
    pub async fn drop_table(&self, name: &str) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        log::info!("dropping table {name}");
        sqlx::query(&format!("DROP TABLE IF EXISTS {name}")).execute(&mut *conn).await?;
        self.registry.remove_table(name);

        migration::reconcile(&mut conn, &self.registry).await
    }

    /// Starts a query over the rows of `T`.
    pub fn objects<T: Model + Default>(&self) -> QuerySet<'_, T> {
        QuerySet::new(self)
    }

    /// Creates a raw SQL query.
    pub fn raw(&self, sql: &str) -> RawQuery<'_> {
        RawQuery::new(self, sql)
    }

    /// Starts a new database transaction.
    pub async fn begin(&self) -> Result<Transaction, Error> {
        let tx = self.pool.begin().await?;
        Ok(Transaction { tx, registry: self.registry.clone() })
    }

    /// Inserts or updates `model`, then its relations.
    ///
    /// Returns `Ok(false)` when the row could not be written; the cause is logged.
    pub async fn save<M: Model>(&self, model: &mut M) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await?;
        persist::save(&mut conn, &self.registry, model, None).await
    }

    /// Saves a model whose key is not autoincremented under the given id.
    pub async fn save_with_id<M: Model>(&self, model: &mut M, id: i32) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await?;
        persist::save(&mut conn, &self.registry, model, Some(id)).await
    }

    pub async fn delete<M: Model>(&self, model: &mut M) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await?;
        persist::delete(&mut conn, model).await
    }

    /// Checks if a table exists in the database.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool, Error> {
        let row = self
            .raw("SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?")
            .bind(table_name)
            .fetch_one()
            .await?;

        let count: i64 = row.try_get(0)?;
        Ok(count > 0)
    }

    /// Returns the current columns of a table.
    pub async fn get_table_columns(&self, table_name: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(migration::table_columns(&mut conn, table_name).await?)
    }

    /// Returns the current indexes of a table.
    pub async fn get_table_indexes(&self, table_name: &str) -> Result<Vec<String>, Error> {
        let rows = self.raw(&format!("PRAGMA index_list({table_name})")).fetch_all().await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            indexes.push(row.try_get::<String, _>("name")?);
        }
        Ok(indexes)
    }

    /// Expected tables of `T`, own table first. `None` for abstract models.
    pub fn table_definitions<T: Model>(&self) -> Option<Arc<Vec<TableDefinition>>> {
        self.registry.table_definitions(T::model_type())
    }

    /// Flattened attributes of `T`, own members first.
    pub fn fields<T: Model>(&self) -> Arc<Vec<AttributeDescriptor>> {
        self.registry.fields(T::model_type())
    }

    /// Looks up one attribute of `T` by name.
    pub fn field<T: Model>(&self, name: &str) -> Result<AttributeDescriptor, Error> {
        self.registry.field(T::model_type(), name)
    }

    /// Toggles foreign key enforcement for connections opened from now on.
    pub fn set_foreign_key_constraints(&self, enabled: bool) {
        self.foreign_keys.store(enabled, Ordering::SeqCst);
    }

    pub fn foreign_key_constraints(&self) -> bool {
        self.foreign_keys.load(Ordering::SeqCst)
    }

    /// Records `version` in `PRAGMA user_version`; returns whether the stored version was older.
    async fn check_version(&self, version: i64) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await?;
        let current: i64 = sqlx::query("PRAGMA user_version").fetch_one(&mut *conn).await?.try_get(0)?;

        if current < version {
            if current != 0 {
                log::warn!("Upgrading database from version {current} to {version}");
            }
            sqlx::query(&format!("PRAGMA user_version = {version}")).execute(&mut *conn).await?;
            return Ok(true);
        }
        if current > version {
            log::warn!("database is at version {current}, newer than the configured {version}");
        }

        Ok(false)
    }
}

// ============================================================================
// DatabaseBuilder Struct
// ============================================================================

/// Connection settings for a [`Database`].
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    max_connections: u32,
    foreign_keys: bool,
    name: String,
    version: i64,
    models: Vec<ModelType>,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self {
            max_connections: 1,
            foreign_keys: true,
            name: "tern.db".to_string(),
            version: 1,
            models: Vec::new(),
        }
    }
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Enforce foreign key constraints (on by default).
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// File name used by [`DatabaseBuilder::open`].
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Schema version recorded in `PRAGMA user_version`.
    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Manages `T` from the moment the database is opened.
    ///
    /// Opening a database whose stored version is older than [`DatabaseBuilder::version`]
    /// reconciles the schema of these models.
    pub fn register<T: Model>(mut self) -> Self {
        self.models.push(T::model_type());
        self
    }

    /// Opens (creating if needed) the file database named by [`DatabaseBuilder::name`].
    pub async fn open(self) -> Result<Database, Error> {
        let url = format!("sqlite://{}?mode=rwc", self.name);
        self.connect(&url).await
    }

    pub async fn connect(self, url: &str) -> Result<Database, Error> {
        for model in &self.models {
            introspect::validate(*model)?;
        }
        sqlx::any::install_default_drivers();

        let foreign_keys = Arc::new(AtomicBool::new(self.foreign_keys));
        let flag = Arc::clone(&foreign_keys);

        let mut options = AnyPoolOptions::new().max_connections(self.max_connections).after_connect(move |conn, _meta| {
            let pragma = foreign_keys_pragma(flag.load(Ordering::SeqCst));
            Box::pin(async move {
                sqlx::query(pragma).execute(conn).await?;
                Ok(())
            })
        });

        // An in-memory database lives only as long as its connection.
        if url.contains(":memory:") || url.contains("mode=memory") {
            options = options.idle_timeout(None::<Duration>).max_lifetime(None::<Duration>);
        }

        let pool = options.connect(url).await?;
        log::debug!("connected to {url}");

        let db = Database { pool, registry: Registry::default(), foreign_keys };
        db.registry.set_models(self.models);
        if db.check_version(self.version).await? {
            db.reconcile().await?;
        }
        Ok(db)
    }
}

// ============================================================================
// Raw SQL Query Builder
// ============================================================================

/// A hand-written SQL statement with positional `?` parameters.
pub struct RawQuery<'a> {
    db: &'a Database,
    sql: String,
    values: Vec<Value>,
}

impl<'a> RawQuery<'a> {
    pub(crate) fn new(db: &'a Database, sql: &str) -> Self {
        Self { db, sql: sql.to_string(), values: Vec::new() }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    pub(crate) fn bind_all(mut self, values: Vec<Value>) -> Self {
        self.values.extend(values);
        self
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Any>, Error> {
        log::debug!("{}", self.sql);
        Ok(self.db.pool.acquire().await?)
    }

    pub async fn fetch_all(self) -> Result<Vec<AnyRow>, Error> {
        let mut conn = self.connection().await?;
        let args = persist::arguments(self.values)?;
        Ok(sqlx::query_with(&self.sql, args).fetch_all(&mut *conn).await?)
    }

    pub async fn fetch_one(self) -> Result<AnyRow, Error> {
        let mut conn = self.connection().await?;
        let args = persist::arguments(self.values)?;
        Ok(sqlx::query_with(&self.sql, args).fetch_one(&mut *conn).await?)
    }

    pub async fn fetch_optional(self) -> Result<Option<AnyRow>, Error> {
        let mut conn = self.connection().await?;
        let args = persist::arguments(self.values)?;
        Ok(sqlx::query_with(&self.sql, args).fetch_optional(&mut *conn).await?)
    }

    /// Runs the statement and returns the number of affected rows.
    pub async fn execute(self) -> Result<u64, Error> {
        let mut conn = self.connection().await?;
        let args = persist::arguments(self.values)?;
        let result = sqlx::query_with(&self.sql, args).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }
}
