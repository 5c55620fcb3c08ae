use crate::{error::Error, model::Model, persist, registry::Registry};

/// A wrapper around a SQLx transaction.
///
/// Saves and deletes issued through it, including nested relation saves, are
/// committed or rolled back together. Store faults still surface as
/// `Ok(false)`; it is up to the caller to roll back in that case.
///
/// The transaction holds a pooled connection until it ends. With a
/// single-connection pool, finish it before using the [`crate::Database`] again.
#[derive(Debug)]
pub struct Transaction {
    pub(crate) tx: sqlx::Transaction<'static, sqlx::Any>,
    pub(crate) registry: Registry,
}

impl Transaction {
    /// # Example
    ///
    /// ```rust,ignore
    /// let mut tx = db.begin().await?;
    /// tx.save(&mut brand).await?;
    /// tx.save(&mut branch).await?;
    /// tx.commit().await?;
    /// ```
    pub async fn save<M: Model>(&mut self, model: &mut M) -> Result<bool, Error> {
        persist::save(&mut self.tx, &self.registry, model, None).await
    }

    pub async fn save_with_id<M: Model>(&mut self, model: &mut M, id: i32) -> Result<bool, Error> {
        persist::save(&mut self.tx, &self.registry, model, Some(id)).await
    }

    pub async fn delete<M: Model>(&mut self, model: &mut M) -> Result<bool, Error> {
        persist::delete(&mut self.tx, model).await
    }

    /// Commits the transaction.
    pub async fn commit(self) -> Result<(), Error> {
        Ok(self.tx.commit().await?)
    }

    /// Rolls back the transaction.
    ///
    /// This also happens when the `Transaction` is dropped without being committed.
    pub async fn rollback(self) -> Result<(), Error> {
        Ok(self.tx.rollback().await?)
    }
}
