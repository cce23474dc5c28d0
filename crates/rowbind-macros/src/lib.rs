//! Procedural macros for rowbind.
//!
//! - `#[derive(Record)]` - static column metadata and value extraction for a struct

use proc_macro::TokenStream;
use quote::quote;

mod parse;
mod validate;

use parse::{RecordDef, parse_record};

/// Derive the `Record` trait for a struct.
///
/// # Struct Attributes
///
/// - `#[record(table = "name")]` - Override the table name (default: lower-cased struct name)
///
/// # Field Attributes
///
/// - `#[record(name = "column")]` - Column the field is persisted under.
///   Fields without it keep their slot but are never written.
/// - `#[record(reference = "...")]` - Marks a field holding a nested record.
///   The nested record is inserted first and its generated id is stored in
///   this field's `name` column.
///
/// Every field type must implement `ColumnValue`, except relation fields,
/// which must implement `Record`.
///
/// # Example
///
/// ```ignore
/// use rowbind::prelude::*;
///
/// #[derive(Record)]
/// struct Credentials {
///     #[record(name = "id")]
///     id: i32,
///     #[record(name = "salt")]
///     salt: String,
/// }
///
/// #[derive(Record)]
/// struct Users {
///     #[record(name = "id")]
///     id: i32,
///     #[record(name = "username")]
///     username: String,
///     #[record(name = "credentials_id", reference = "credentials")]
///     credentials: Credentials,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let record = match parse_record(&input) {
        Ok(r) => r,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate::validate_record(&record) {
        return e.to_compile_error().into();
    }

    generate_record_impl(&record).into()
}

fn generate_record_impl(record: &RecordDef) -> proc_macro2::TokenStream {
    let name = &record.name;
    let type_name = name.to_string();
    let table_name = &record.table_name;
    let (impl_generics, ty_generics, where_clause) = record.generics.split_for_impl();

    let field_descriptors = generate_field_descriptors(record);
    let values = generate_values(record);
    let relations = generate_relations(record);

    quote! {
        impl #impl_generics rowbind_core::Record for #name #ty_generics #where_clause {
            fn descriptor(&self) -> &'static rowbind_core::RecordDescriptor {
                static DESCRIPTOR: rowbind_core::RecordDescriptor = rowbind_core::RecordDescriptor {
                    type_name: #type_name,
                    table: #table_name,
                    fields: &[#(#field_descriptors),*],
                };
                &DESCRIPTOR
            }

            fn values(&self) -> Vec<rowbind_core::Value> {
                #values
            }

            fn relations(&self) -> Vec<&dyn rowbind_core::Record> {
                #relations
            }
        }
    }
}

fn generate_field_descriptors(record: &RecordDef) -> Vec<proc_macro2::TokenStream> {
    record
        .fields
        .iter()
        .map(|field| {
            let field_name = field.name.to_string();
            let column = field.column.as_deref().unwrap_or("");
            let type_name = &field.type_name;
            let reference = match &field.reference {
                Some(r) => quote! { Some(#r) },
                None => quote! { None },
            };
            quote! {
                rowbind_core::FieldDescriptor {
                    name: #field_name,
                    column: #column,
                    reference: #reference,
                    type_name: #type_name,
                }
            }
        })
        .collect()
}

fn generate_values(record: &RecordDef) -> proc_macro2::TokenStream {
    let values = record.fields.iter().map(|field| {
        let ident = &field.name;
        // Untagged fields are never persisted and need not be column values.
        if field.is_relation() || field.column.is_none() {
            quote! { rowbind_core::Value::Default }
        } else {
            quote! { rowbind_core::ColumnValue::column_value(&self.#ident) }
        }
    });
    quote! { vec![#(#values),*] }
}

fn generate_relations(record: &RecordDef) -> proc_macro2::TokenStream {
    let relations: Vec<_> = record
        .fields
        .iter()
        .filter(|f| f.is_relation())
        .map(|field| {
            let ident = &field.name;
            quote! { &self.#ident as &dyn rowbind_core::Record }
        })
        .collect();

    if relations.is_empty() {
        quote! { Vec::new() }
    } else {
        quote! { vec![#(#relations),*] }
    }
}
