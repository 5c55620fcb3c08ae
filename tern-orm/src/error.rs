//! # Error Module
//!
//! Every fallible operation in tern-orm returns [`Error`]. Store faults raised
//! while saving or deleting a single instance are not surfaced here; those
//! operations report them as `Ok(false)` and log the cause instead.

use thiserror::Error;

/// Errors raised by tern-orm.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying SQL engine reported a failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A named attribute was requested that the model (and its ancestors) does not declare.
    #[error("No field named {field} was found in class {model}! Choices are: {choices:?}")]
    NoSuchField {
        field: String,
        model: &'static str,
        choices: Vec<&'static str>,
    },

    /// A one-to-many collection was saved, but its element type has no foreign key
    /// pointing back to the owner.
    #[error("No field pointing to {target} was found in class {origin}! Choices are: {choices:?}")]
    MissingBackReference {
        target: &'static str,
        origin: &'static str,
        choices: Vec<&'static str>,
    },

    /// The attribute exists but is a to-many relation, which has no column.
    #[error("field {field} of {model} is a relation collection and has no column")]
    NotAColumn { field: String, model: &'static str },

    /// The model's field table violates a mapping invariant.
    #[error("invalid model {model}: {reason}")]
    InvalidModel { model: &'static str, reason: String },

    /// A stored value could not be converted into the field's Rust type.
    #[error("could not decode column {column}: {reason}")]
    Decode { column: String, reason: String },
}
