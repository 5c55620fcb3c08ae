//! Procedural macros for tern-orm.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod derive_model;

/// Derives `tern_orm::Model` for a struct with named fields.
///
/// Every field takes part in persistence through `tern_orm::Field` unless it is
/// marked `#[orm(skip)]`. See the `tern_orm::model` module for the supported
/// attributes.
#[proc_macro_derive(Model, attributes(orm))]
pub fn model_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    derive_model::expand(ast).into()
}
