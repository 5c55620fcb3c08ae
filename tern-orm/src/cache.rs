//! # Metadata Cache
//!
//! Memoizes per-model introspection results and table definitions so that
//! schema generation and query construction never walk a field table twice.
//! The cache is owned by a [`crate::Database`] and cleared wholesale when the
//! database is dropped; entries are never invalidated individually.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{introspect::AttributeDescriptor, model::ModelType, schema::TableDefinition};

#[derive(Debug, Default)]
pub struct MetadataCache {
    known_models: HashSet<ModelType>,
    table_definitions: HashMap<ModelType, Arc<Vec<TableDefinition>>>,
    model_fields: HashMap<ModelType, Vec<&'static str>>,
    field_instances: HashMap<ModelType, Arc<Vec<AttributeDescriptor>>>,
    field_shortcuts: HashMap<(ModelType, &'static str), AttributeDescriptor>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knows_model(&self, model: ModelType) -> bool {
        self.known_models.contains(&model)
    }

    /// A model "knows" its fields once a non-empty field list has been recorded.
    pub fn knows_fields(&self, model: ModelType) -> bool {
        self.knows_model(model) && self.model_fields.get(&model).is_some_and(|names| !names.is_empty())
    }

    pub fn add_model(&mut self, model: ModelType) {
        if self.known_models.insert(model) {
            self.model_fields.insert(model, Vec::new());
        }
    }

    pub fn table_definitions(&self, model: ModelType) -> Option<Arc<Vec<TableDefinition>>> {
        if !self.knows_model(model) {
            return None;
        }
        self.table_definitions.get(&model).cloned()
    }

    pub fn set_table_definitions(&mut self, model: ModelType, definitions: Arc<Vec<TableDefinition>>) {
        self.table_definitions.insert(model, definitions);
    }

    /// Records the flattened attribute list of a known model. Unknown models are ignored.
    pub fn set_model_fields(&mut self, model: ModelType, fields: Arc<Vec<AttributeDescriptor>>) {
        if !self.knows_model(model) {
            return;
        }

        let names = self.model_fields.entry(model).or_default();
        names.clear();
        for field in fields.iter() {
            names.push(field.name);
            self.field_shortcuts.insert((model, field.name), field.clone());
        }
        self.field_instances.insert(model, fields);
    }

    pub fn fields_for_model(&self, model: ModelType) -> Option<Arc<Vec<AttributeDescriptor>>> {
        if !self.knows_model(model) {
            return None;
        }
        self.field_instances.get(&model).cloned()
    }

    pub fn field_names(&self, model: ModelType) -> &[&'static str] {
        self.model_fields.get(&model).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn model_has_field(&self, model: ModelType, name: &str) -> bool {
        self.knows_fields(model) && self.field_names(model).contains(&name)
    }

    pub fn field(&self, model: ModelType, name: &str) -> Option<&AttributeDescriptor> {
        if !self.knows_fields(model) {
            return None;
        }
        self.field_names(model)
            .iter()
            .find(|known| **known == name)
            .and_then(|known| self.field_shortcuts.get(&(model, *known)))
    }

    pub fn reset(&mut self) {
        self.known_models.clear();
        self.table_definitions.clear();
        self.model_fields.clear();
        self.field_instances.clear();
        self.field_shortcuts.clear();
    }
}
