use heck::{ToShoutySnakeCase, ToSnakeCase};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Ident, Type};

/// A persisted member of the struct.
struct Member {
    ident: Ident,
    column: String,
    ty: Type,
    size: Option<usize>,
    set_null: bool,
}

/// Expands the `#[derive(Model)]` macro.
///
/// This function parses the struct fields and `#[orm(...)]` attributes to generate:
/// 1. The static field table returned by `model_type`.
/// 2. Name-dispatched accessors (`field_value`, `set_field_value`, ...) that
///    fall back to the `#[orm(parent)]` member for unknown names.
/// 3. A `<struct>_fields` module with one constant per column name.
pub fn expand(ast: DeriveInput) -> TokenStream {
    let struct_name = &ast.ident;
    let name_str = struct_name.to_string();
    let vis = &ast.vis;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let fields = if let Data::Struct(data) = &ast.data {
        if let Fields::Named(fields) = &data.fields {
            fields
        } else {
            panic!("Model must have named fields");
        }
    } else {
        panic!("Model must be a struct")
    };

    let mut is_abstract = false;
    for attr in &ast.attrs {
        if attr.path().is_ident("orm") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("abstract_model") {
                    is_abstract = true;
                    return Ok(());
                }
                Err(meta.error("unsupported struct attribute; expected `abstract_model`"))
            })
            .expect("Failed to parse orm attributes");
        }
    }

    let mut primary_key: Option<Ident> = None;
    let mut autoincrement = true;
    let mut parent: Option<(Ident, Type)> = None;
    let mut members = Vec::new();

    for f in &fields.named {
        let Some(ident) = f.ident.clone() else { continue };

        let mut is_primary_key = false;
        let mut no_autoincrement = false;
        let mut is_parent = false;
        let mut skip = false;
        let mut size = None;
        let mut set_null = false;

        // Parse attributes #[orm(...)]
        for attr in &f.attrs {
            if attr.path().is_ident("orm") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("primary_key") {
                        is_primary_key = true;
                    } else if meta.path.is_ident("no_autoincrement") {
                        no_autoincrement = true;
                    } else if meta.path.is_ident("parent") {
                        is_parent = true;
                    } else if meta.path.is_ident("skip") {
                        skip = true;
                    } else if meta.path.is_ident("size") {
                        let value: syn::LitInt = meta.value()?.parse()?;
                        size = Some(value.base10_parse::<usize>()?);
                    } else if meta.path.is_ident("on_delete") {
                        let value: syn::LitStr = meta.value()?.parse()?;
                        set_null = match value.value().as_str() {
                            "set_null" => true,
                            "cascade" => false,
                            _ => return Err(meta.error("Invalid on_delete. Use \"cascade\" or \"set_null\"")),
                        };
                    } else {
                        return Err(meta.error("unsupported orm attribute"));
                    }
                    Ok(())
                })
                .expect("Failed to parse orm attributes");
            }
        }

        if skip {
            continue;
        }

        if is_primary_key {
            if primary_key.is_some() {
                panic!("Model {name_str} declares more than one primary key");
            }
            autoincrement = !no_autoincrement;
            primary_key = Some(ident);
        } else if is_parent {
            if parent.is_some() {
                panic!("Model {name_str} declares more than one parent");
            }
            parent = Some((ident, f.ty.clone()));
        } else {
            let raw = ident.to_string();
            let column = raw.strip_prefix("r#").unwrap_or(&raw).to_string();
            members.push(Member { ident, column, ty: f.ty.clone(), size, set_null });
        }
    }

    if primary_key.is_none() && !is_abstract {
        panic!("Model {name_str} needs an #[orm(primary_key)] i32 field, or #[orm(abstract_model)]");
    }

    // ------------------------------------------------------------------------
    // Field table
    // ------------------------------------------------------------------------

    let field_infos = members.iter().map(|m| {
        let column = &m.column;
        let ty = &m.ty;
        let size = m.size.map(|n| quote! { .with_max_length(#n) });
        let on_delete = m.set_null.then(|| quote! { .with_on_delete(tern_orm::OnDelete::SetNull) });

        quote! {
            tern_orm::FieldInfo::new(#column, <#ty as tern_orm::Field>::kind() #size #on_delete)
        }
    });

    let parent_link = parent.as_ref().map(|(_, ty)| {
        quote! { .with_parent(<#ty as tern_orm::Model>::model_type) }
    });

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    let (id_body, set_id_body) = match &primary_key {
        Some(pk) if !is_abstract => (quote! { self.#pk }, quote! { self.#pk = id; }),
        _ => (quote! { 0 }, quote! { let _ = id; }),
    };

    let columns: Vec<&String> = members.iter().map(|m| &m.column).collect();
    let idents: Vec<&Ident> = members.iter().map(|m| &m.ident).collect();

    let (value_fallback, set_fallback, fk_fallback, relation_fallback, reset_parent) = match &parent {
        Some((p, _)) => (
            quote! { tern_orm::Model::field_value(&self.#p, name) },
            quote! { tern_orm::Model::set_field_value(&mut self.#p, name, value) },
            quote! { tern_orm::Model::foreign_key_mut(&mut self.#p, name) },
            quote! { tern_orm::Model::relation_mut(&mut self.#p, name) },
            quote! { tern_orm::Model::reset_fields(&mut self.#p); },
        ),
        None => (
            quote! { None },
            quote! { { let _ = value; Ok(false) } },
            quote! { None },
            quote! { None },
            quote! {},
        ),
    };

    // ------------------------------------------------------------------------
    // Column name constants
    // ------------------------------------------------------------------------

    let fields_mod = format_ident!("{}_fields", name_str.to_snake_case());
    let constants = members.iter().map(|m| {
        let constant = format_ident!("{}", m.column.to_shouty_snake_case());
        let column = &m.column;
        quote! { pub const #constant: &str = #column; }
    });

    quote! {
        impl #impl_generics tern_orm::Model for #struct_name #ty_generics #where_clause {
            fn model_type() -> tern_orm::ModelType {
                tern_orm::ModelType::new::<Self>(#name_str, || vec![#(#field_infos),*])
                    #parent_link
                    .set_abstract(#is_abstract)
                    .set_autoincrement(#autoincrement)
            }

            fn descriptor(&self) -> tern_orm::ModelType {
                <Self as tern_orm::Model>::model_type()
            }

            fn id(&self) -> i32 {
                #id_body
            }

            fn set_id(&mut self, id: i32) {
                #set_id_body
            }

            fn field_value(&self, name: &str) -> Option<tern_orm::Value> {
                match name {
                    #(#columns => tern_orm::Field::to_value(&self.#idents),)*
                    _ => #value_fallback,
                }
            }

            fn set_field_value(&mut self, name: &str, value: tern_orm::Value) -> Result<bool, tern_orm::Error> {
                match name {
                    #(#columns => tern_orm::Field::assign(&mut self.#idents, value)
                        .map(|()| true)
                        .map_err(|reason| tern_orm::Error::Decode { column: name.to_string(), reason }),)*
                    _ => #set_fallback,
                }
            }

            fn foreign_key_mut(&mut self, name: &str) -> Option<&mut dyn tern_orm::ForeignKeyLink> {
                match name {
                    #(#columns => tern_orm::Field::as_foreign_key_mut(&mut self.#idents),)*
                    _ => #fk_fallback,
                }
            }

            fn relation_mut(&mut self, name: &str) -> Option<tern_orm::RelationMut<'_>> {
                match name {
                    #(#columns => tern_orm::Field::as_relation_mut(&mut self.#idents),)*
                    _ => #relation_fallback,
                }
            }

            fn reset_fields(&mut self) {
                #(tern_orm::Field::reset(&mut self.#idents);)*
                #reset_parent
            }
        }

        #[allow(dead_code)]
        #vis mod #fields_mod {
            #(#constants)*
        }
    }
}
