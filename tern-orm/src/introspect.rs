//! # Attribute Introspection
//!
//! Flattens a model's field table together with the field tables of its
//! ancestors into the ordered attribute list the rest of the crate works with.
//! Own members always come before inherited ones; schema column order depends
//! on it.

use std::{collections::HashMap, sync::Arc};

use crate::{
    cache::MetadataCache,
    error::Error,
    model::{FieldKind, ModelType, PK},
};

/// A persistable attribute of a model, together with the type that declares it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub declared_on: ModelType,
}

impl AttributeDescriptor {
    pub fn is_column(&self) -> bool {
        self.kind.is_column()
    }
}

/// Returns the attributes of `model`, own members first, then each ancestor's.
///
/// The result is memoized; repeated calls return the same shared list.
pub fn discover_fields(cache: &mut MetadataCache, model: ModelType) -> Arc<Vec<AttributeDescriptor>> {
    if cache.knows_fields(model) {
        if let Some(fields) = cache.fields_for_model(model) {
            return fields;
        }
    }

    let mut fields = Vec::new();
    collect_fields(model, &mut fields);

    let fields = Arc::new(fields);
    cache.add_model(model);
    cache.set_model_fields(model, Arc::clone(&fields));
    fields
}

fn collect_fields(level: ModelType, out: &mut Vec<AttributeDescriptor>) {
    for info in level.declared_fields() {
        if let Some(target) = info.kind.target() {
            if target.is_abstract() {
                log::warn!(
                    "skipping {}.{}: relation target {} is abstract and has no table",
                    level.name(),
                    info.name,
                    target.name()
                );
                continue;
            }
        }

        out.push(AttributeDescriptor { name: info.name, kind: info.kind, declared_on: level });
    }

    if let Some(parent) = level.parent() {
        collect_fields(parent, out);
    }
}

/// Looks up a single attribute by name, searching ancestors as well.
pub fn field(cache: &mut MetadataCache, model: ModelType, name: &str) -> Result<AttributeDescriptor, Error> {
    discover_fields(cache, model);

    match cache.field(model, name) {
        Some(descriptor) => Ok(descriptor.clone()),
        None => Err(Error::NoSuchField {
            field: name.to_string(),
            model: model.name(),
            choices: cache.field_names(model).to_vec(),
        }),
    }
}

/// Rejects field tables that cannot be mapped unambiguously.
///
/// Runs at registration time, before any table is built.
pub fn validate(model: ModelType) -> Result<(), Error> {
    let invalid = |reason: String| Error::InvalidModel { model: model.name(), reason };

    if model.is_abstract() {
        return Err(invalid("abstract models cannot be registered for persistence".to_string()));
    }

    let mut declared_by: HashMap<&'static str, &'static str> = HashMap::new();
    let mut level = Some(model);

    while let Some(current) = level {
        for info in current.declared_fields() {
            if info.name == PK {
                return Err(invalid(format!("{} declares `{PK}`, which is reserved for the primary key", current.name())));
            }

            if let Some(first) = declared_by.insert(info.name, current.name()) {
                return Err(invalid(format!("field {} is declared by both {first} and {}", info.name, current.name())));
            }

            if let Some(target) = info.kind.target().filter(|target| target.is_abstract()) {
                return Err(invalid(format!(
                    "relation {} points at abstract model {}, which has no table",
                    info.name,
                    target.name()
                )));
            }

            if let FieldKind::ManyToMany { target } = &info.kind {
                if current.is_abstract() {
                    return Err(invalid(format!(
                        "many-to-many field {} is declared on abstract model {}",
                        info.name,
                        current.name()
                    )));
                }
                if *target == current {
                    return Err(invalid(format!("many-to-many field {} points at its own model", info.name)));
                }
            }
        }

        level = current.parent();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{field::ValueType, model::FieldInfo, relation::OnDelete};

    struct Named;
    struct Person;
    struct Car;
    struct Vehicle;
    struct Shadow;
    struct Garage;

    fn text() -> FieldKind {
        FieldKind::scalar("varchar(255)", ValueType::Text)
    }

    fn named() -> ModelType {
        ModelType::new::<Named>("Named", || vec![FieldInfo::new("name", text())]).set_abstract(true)
    }

    fn vehicle() -> ModelType {
        ModelType::new::<Vehicle>("Vehicle", Vec::new).set_abstract(true)
    }

    fn car() -> ModelType {
        ModelType::new::<Car>("Car", || vec![FieldInfo::new("plate", text())])
    }

    fn person() -> ModelType {
        ModelType::new::<Person>("Person", || {
            vec![
                FieldInfo::new("age", FieldKind::scalar("integer", ValueType::Integer)),
                FieldInfo::new("car", FieldKind::ForeignKey { target: car(), on_delete: OnDelete::Cascade }),
            ]
        })
        .with_parent(named)
    }

    fn garage() -> ModelType {
        ModelType::new::<Garage>("Garage", || {
            vec![
                FieldInfo::new("car", FieldKind::ForeignKey { target: car(), on_delete: OnDelete::Cascade }),
                FieldInfo::new("vehicle", FieldKind::ForeignKey { target: vehicle(), on_delete: OnDelete::Cascade }),
            ]
        })
    }

    fn shadow() -> ModelType {
        ModelType::new::<Shadow>("Shadow", || vec![FieldInfo::new("name", text())]).with_parent(named)
    }

    #[test]
    fn own_fields_come_before_inherited_ones() {
        let mut cache = MetadataCache::new();
        let fields = discover_fields(&mut cache, person());

        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["age", "car", "name"]);
        assert_eq!(fields[0].declared_on, person());
        assert_eq!(fields[2].declared_on, named());
    }

    #[test]
    fn relations_to_abstract_models_are_skipped() {
        let mut cache = MetadataCache::new();
        let fields = discover_fields(&mut cache, garage());

        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["car"]);
    }

    #[test]
    fn validation_rejects_relations_to_abstract_models() {
        let err = validate(garage()).unwrap_err();
        assert!(matches!(err, Error::InvalidModel { model: "Garage", .. }));
        assert!(err.to_string().contains("vehicle"));
    }

    #[test]
    fn repeated_discovery_is_served_from_the_cache() {
        let mut cache = MetadataCache::new();
        let first = discover_fields(&mut cache, person());
        let second = discover_fields(&mut cache, person());

        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.knows_fields(person()));
    }

    #[test]
    fn unknown_field_lists_choices() {
        let mut cache = MetadataCache::new();
        let err = field(&mut cache, person(), "nickname").unwrap_err();

        assert_eq!(
            err.to_string(),
            r#"No field named nickname was found in class Person! Choices are: ["age", "car", "name"]"#
        );
        assert_eq!(field(&mut cache, person(), "name").unwrap().declared_on, named());
    }

    #[test]
    fn validation_rejects_inherited_name_collisions() {
        assert!(validate(person()).is_ok());
        assert!(matches!(validate(shadow()), Err(Error::InvalidModel { model: "Shadow", .. })));
        assert!(matches!(validate(named()), Err(Error::InvalidModel { .. })));
    }
}
