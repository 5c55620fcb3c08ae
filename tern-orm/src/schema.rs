//! # Schema Module
//!
//! Turns flattened model attributes into table definitions and renders the DDL
//! that creates or extends them. Nothing here talks to the database; see
//! [`crate::migration`] for applying the statements.

// ============================================================================
// External Crate Imports
// ============================================================================

use std::sync::Arc;

use indexmap::IndexMap;

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    cache::MetadataCache,
    introspect::discover_fields,
    model::{FieldKind, ModelType, PK},
    relation::{join_table_name, OnDelete},
};

// ============================================================================
// Columns
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    PrimaryKey { autoincrement: bool },
    Scalar { sql_type: String },
    ForeignKey { target_table: String, on_delete: OnDelete },
}

/// A single expected column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn primary_key(autoincrement: bool) -> Self {
        Self { name: PK.to_string(), kind: ColumnKind::PrimaryKey { autoincrement } }
    }

    pub fn scalar(name: &str, sql_type: &str) -> Self {
        Self { name: name.to_string(), kind: ColumnKind::Scalar { sql_type: sql_type.to_string() } }
    }

    pub fn foreign_key(name: &str, target_table: &str, on_delete: OnDelete) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::ForeignKey { target_table: target_table.to_string(), on_delete },
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, ColumnKind::ForeignKey { .. })
    }

    /// Column definition as used in `CREATE TABLE` and `ALTER TABLE`.
    pub fn definition(&self) -> String {
        match &self.kind {
            ColumnKind::PrimaryKey { autoincrement: true } => format!("{} integer PRIMARY KEY autoincrement", self.name),
            ColumnKind::PrimaryKey { autoincrement: false } => format!("{} integer PRIMARY KEY", self.name),
            ColumnKind::Scalar { sql_type } => format!("{} {sql_type}", self.name),
            ColumnKind::ForeignKey { .. } => format!("{} integer", self.name),
        }
    }

    /// Table-level `FOREIGN KEY` clause, for foreign key columns only.
    pub fn constraint(&self) -> Option<String> {
        match &self.kind {
            ColumnKind::ForeignKey { target_table, on_delete } => Some(format!(
                "FOREIGN KEY ({}) REFERENCES {target_table} ({PK}) ON DELETE {on_delete}",
                self.name
            )),
            _ => None,
        }
    }
}

// ============================================================================
// Table Definition
// ============================================================================

/// Expected layout of one physical table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    name: String,
    columns: IndexMap<String, Column>,
    foreign_keys: IndexMap<String, Column>,
    relational_classes: Vec<ModelType>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            foreign_keys: IndexMap::new(),
            relational_classes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a column, replacing any previous column of the same name in place.
    pub fn add_column(&mut self, column: Column) {
        if column.is_foreign_key() {
            self.foreign_keys.insert(column.name.clone(), column.clone());
        } else {
            self.foreign_keys.shift_remove(&column.name);
        }
        self.columns.insert(column.name.clone(), column);
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &Column> {
        self.foreign_keys.values()
    }

    /// Models whose many-to-many members need a join table next to this one.
    pub fn relational_classes(&self) -> &[ModelType] {
        &self.relational_classes
    }

    pub fn add_relational_class(&mut self, model: ModelType) {
        if !self.relational_classes.contains(&model) {
            self.relational_classes.push(model);
        }
    }

    pub fn create_sql(&self) -> String {
        let parts: Vec<String> = self
            .columns
            .values()
            .map(Column::definition)
            .chain(self.foreign_keys.values().filter_map(Column::constraint))
            .collect();

        format!("CREATE TABLE IF NOT EXISTS {} ({});", self.name, parts.join(", "))
    }

    /// `ALTER TABLE` statements adding every expected column missing from `existing`.
    ///
    /// Columns are only ever added. Extra columns in `existing` are left alone.
    pub fn plan_alterations(&self, existing: &[String]) -> Vec<String> {
        self.columns
            .values()
            .filter(|column| !matches!(column.kind, ColumnKind::PrimaryKey { .. }))
            .filter(|column| !existing.iter().any(|name| *name == column.name))
            .map(|column| format!("alter table {} add column {}", self.name, column.definition()))
            .collect()
    }

    pub fn foreign_key_indexes(&self) -> Vec<String> {
        self.foreign_keys
            .keys()
            .map(|column| format!("CREATE INDEX IF NOT EXISTS {column}_fk_idx ON {}({column})", self.name))
            .collect()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Table definitions for `model`: its own table first, then one join table per
/// many-to-many member. Abstract models have none.
pub fn build_table_definitions(cache: &mut MetadataCache, model: ModelType) -> Option<Arc<Vec<TableDefinition>>> {
    if model.is_abstract() {
        return None;
    }
    if let Some(definitions) = cache.table_definitions(model) {
        return Some(definitions);
    }

    let fields = discover_fields(cache, model);

    let mut table = TableDefinition::new(model.table_name());
    table.add_column(Column::primary_key(model.autoincrement()));

    for field in fields.iter() {
        match &field.kind {
            FieldKind::Scalar { sql_type, .. } => table.add_column(Column::scalar(field.name, sql_type)),
            FieldKind::ForeignKey { target, on_delete } => {
                table.add_column(Column::foreign_key(field.name, &target.table_name(), *on_delete))
            }
            FieldKind::ManyToMany { .. } => table.add_relational_class(field.declared_on),
            FieldKind::OneToMany { .. } => {}
        }
    }

    let mut definitions = Vec::new();
    for class in table.relational_classes().to_vec() {
        for field in discover_fields(cache, class).iter() {
            let FieldKind::ManyToMany { target } = field.kind else {
                continue;
            };

            let join = join_table(field.declared_on, target);
            if definitions.iter().all(|existing: &TableDefinition| existing.name != join.name) {
                definitions.push(join);
            }
        }
    }
    definitions.insert(0, table);

    let definitions = Arc::new(definitions);
    cache.set_table_definitions(model, Arc::clone(&definitions));
    Some(definitions)
}

fn join_table(origin: ModelType, target: ModelType) -> TableDefinition {
    let origin_table = origin.table_name();
    let target_table = target.table_name();

    let mut join = TableDefinition::new(join_table_name(&origin_table, &target_table));
    join.add_column(Column::foreign_key(&origin_table, &origin_table, OnDelete::Cascade));
    join.add_column(Column::foreign_key(&target_table, &target_table, OnDelete::Cascade));
    join
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ForeignKey, ManyToMany, Model, OneToMany};

    #[derive(Model, Debug, Default)]
    #[orm(abstract_model)]
    struct Named {
        #[orm(size = 50)]
        name: Option<String>,
    }

    #[derive(Model, Debug, Default)]
    struct Brand {
        #[orm(primary_key)]
        id: i32,
        #[orm(parent)]
        base: Named,
        branches: OneToMany<Branch>,
    }

    #[derive(Model, Debug, Default)]
    struct Branch {
        #[orm(primary_key)]
        id: i32,
        opened: Option<chrono::NaiveDate>,
        #[orm(on_delete = "set_null")]
        brand: ForeignKey<Brand>,
        #[orm(skip)]
        scratch: String,
    }

    #[derive(Model, Debug, Default)]
    struct Course {
        #[orm(primary_key, no_autoincrement)]
        id: i32,
        title: String,
    }

    #[derive(Model, Debug, Default)]
    struct Student {
        #[orm(primary_key)]
        id: i32,
        courses: ManyToMany<Course>,
    }

    fn definitions(model: ModelType) -> Arc<Vec<TableDefinition>> {
        build_table_definitions(&mut MetadataCache::new(), model).unwrap()
    }

    #[test]
    fn create_statement_lists_columns_then_constraints() {
        let branch = definitions(Branch::model_type());
        assert_eq!(branch.len(), 1);
        assert_eq!(
            branch[0].create_sql(),
            "CREATE TABLE IF NOT EXISTS branch (id integer PRIMARY KEY autoincrement, opened varchar(10), \
             brand integer, FOREIGN KEY (brand) REFERENCES brand (id) ON DELETE SET NULL);"
        );
        assert_eq!(
            branch[0].foreign_key_indexes(),
            vec!["CREATE INDEX IF NOT EXISTS brand_fk_idx ON branch(brand)".to_string()]
        );
    }

    #[test]
    fn inherited_columns_follow_own_columns() {
        let brand = definitions(Brand::model_type());
        assert_eq!(
            brand[0].create_sql(),
            "CREATE TABLE IF NOT EXISTS brand (id integer PRIMARY KEY autoincrement, name varchar(50));"
        );
        assert!(build_table_definitions(&mut MetadataCache::new(), Named::model_type()).is_none());
    }

    #[test]
    fn manual_primary_keys_drop_autoincrement() {
        let course = definitions(Course::model_type());
        assert_eq!(
            course[0].create_sql(),
            "CREATE TABLE IF NOT EXISTS course (id integer PRIMARY KEY, title varchar(255));"
        );
    }

    #[test]
    fn many_to_many_adds_a_join_table() {
        let student = definitions(Student::model_type());
        assert_eq!(student.len(), 2);
        assert_eq!(student[0].create_sql(), "CREATE TABLE IF NOT EXISTS student (id integer PRIMARY KEY autoincrement);");
        assert_eq!(student[0].relational_classes(), &[Student::model_type()]);
        assert_eq!(
            student[1].create_sql(),
            "CREATE TABLE IF NOT EXISTS course_student (student integer, course integer, \
             FOREIGN KEY (student) REFERENCES student (id) ON DELETE CASCADE, \
             FOREIGN KEY (course) REFERENCES course (id) ON DELETE CASCADE);"
        );
    }

    #[test]
    fn alterations_only_add_missing_columns() {
        let branch = definitions(Branch::model_type());
        let existing = vec!["id".to_string(), "opened".to_string(), "legacy".to_string()];

        assert_eq!(branch[0].plan_alterations(&existing), vec!["alter table branch add column brand integer".to_string()]);

        let complete = vec!["id".to_string(), "opened".to_string(), "brand".to_string()];
        assert!(branch[0].plan_alterations(&complete).is_empty());
    }

    #[test]
    fn definitions_are_memoized() {
        let mut cache = MetadataCache::new();
        let first = build_table_definitions(&mut cache, Student::model_type()).unwrap();
        let second = build_table_definitions(&mut cache, Student::model_type()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }
}
