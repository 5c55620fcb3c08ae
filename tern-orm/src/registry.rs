//! Shared mutable state of a [`crate::Database`]: the metadata cache, the
//! registered models and the tables known to exist.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    cache::MetadataCache,
    error::Error,
    introspect::{self, AttributeDescriptor},
    model::ModelType,
    relation::{find_foreign_key, find_many_to_many},
    schema::{build_table_definitions, TableDefinition},
};

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) cache: MetadataCache,
    pub(crate) models: Vec<ModelType>,
    pub(crate) tables: BTreeSet<String>,
}

/// Cheap to clone; every clone shares the same state.
///
/// The lock is only ever taken inside these methods, never across an `.await`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Registry(Arc<Mutex<RegistryState>>);

impl Registry {
    fn with<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub(crate) fn fields(&self, model: ModelType) -> Arc<Vec<AttributeDescriptor>> {
        self.with(|state| introspect::discover_fields(&mut state.cache, model))
    }

    pub(crate) fn field(&self, model: ModelType, name: &str) -> Result<AttributeDescriptor, Error> {
        self.with(|state| introspect::field(&mut state.cache, model, name))
    }

    pub(crate) fn table_definitions(&self, model: ModelType) -> Option<Arc<Vec<TableDefinition>>> {
        self.with(|state| build_table_definitions(&mut state.cache, model))
    }

    /// The foreign key on `origin` that points back at `target`.
    pub(crate) fn back_reference(&self, origin: ModelType, target: ModelType) -> Result<AttributeDescriptor, Error> {
        self.with(|state| {
            find_foreign_key(&mut state.cache, origin, target).ok_or_else(|| Error::MissingBackReference {
                target: target.name(),
                origin: origin.name(),
                choices: state.cache.field_names(origin).to_vec(),
            })
        })
    }

    pub(crate) fn many_to_many(&self, origin: ModelType, target: ModelType) -> Option<AttributeDescriptor> {
        self.with(|state| find_many_to_many(&mut state.cache, origin, target))
    }

    pub(crate) fn models(&self) -> Vec<ModelType> {
        self.with(|state| state.models.clone())
    }

    /// Replaces the registered models, keeping the first occurrence of duplicates.
    pub(crate) fn set_models(&self, models: Vec<ModelType>) {
        self.with(|state| {
            state.models.clear();
            for model in models {
                if !state.models.contains(&model) {
                    state.models.push(model);
                }
            }
        })
    }

    pub(crate) fn tables(&self) -> Vec<String> {
        self.with(|state| state.tables.iter().cloned().collect())
    }

    pub(crate) fn add_table(&self, name: &str) {
        self.with(|state| {
            state.tables.insert(name.to_string());
        })
    }

    pub(crate) fn remove_table(&self, name: &str) {
        self.with(|state| {
            state.tables.remove(name);
        })
    }

    /// Forgets tables, models and cached metadata.
    pub(crate) fn reset(&self) {
        self.with(|state| {
            state.tables.clear();
            state.models.clear();
            state.cache.reset();
        })
    }
}
