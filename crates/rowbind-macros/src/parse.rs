//! Parsing logic for the Record derive macro.
//!
//! Extracts `#[record(...)]` attributes from the derive input into
//! `RecordDef` and `FieldDef`, which drive code generation.

use proc_macro2::Span;
use quote::ToTokens;
use syn::{Attribute, Data, DeriveInput, Error, Fields, Generics, Ident, Lit, Result, Type};

/// Parsed record definition from a struct with `#[derive(Record)]`.
#[derive(Debug)]
pub struct RecordDef {
    /// The struct name (e.g., `Users`).
    pub name: Ident,
    /// The SQL table name (e.g., `"users"`).
    pub table_name: String,
    /// Span of an explicit `table = "..."`, if any.
    pub table_span: Option<Span>,
    pub fields: Vec<FieldDef>,
    pub generics: Generics,
}

/// Parsed field definition from a struct field.
#[derive(Debug)]
pub struct FieldDef {
    /// The Rust field name (e.g., `credentials`).
    pub name: Ident,
    /// Persisted column name; `None` when the field carries no `name` tag.
    pub column: Option<String>,
    pub column_span: Option<Span>,
    /// Relation tag from `reference = "..."`.
    pub reference: Option<String>,
    pub reference_span: Option<Span>,
    pub ty: Type,
    /// Last path segment of the field type, used to match nested records.
    pub type_name: String,
}

impl FieldDef {
    pub fn is_relation(&self) -> bool {
        self.reference.is_some()
    }
}

/// Parse a `DeriveInput` into a `RecordDef`.
pub fn parse_record(input: &DeriveInput) -> Result<RecordDef> {
    let name = input.ident.clone();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            Fields::Unnamed(_) => {
                return Err(Error::new_spanned(
                    input,
                    "Record can only be derived for structs with named fields",
                ));
            }
            Fields::Unit => {
                return Err(Error::new_spanned(
                    input,
                    "Record cannot be derived for unit structs",
                ));
            }
        },
        Data::Enum(_) | Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs",
            ));
        }
    };

    let (table, table_span) = parse_struct_attrs(&input.attrs)?;
    let table_name = table.unwrap_or_else(|| name.to_string().to_lowercase());

    let mut parsed = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(field_name) = field.ident.clone() else {
            return Err(Error::new_spanned(field, "expected a named field"));
        };
        let attrs = parse_field_attrs(&field.attrs)?;
        parsed.push(FieldDef {
            name: field_name,
            column: attrs.column,
            column_span: attrs.column_span,
            reference: attrs.reference,
            reference_span: attrs.reference_span,
            type_name: type_name(&field.ty),
            ty: field.ty.clone(),
        });
    }

    Ok(RecordDef {
        name,
        table_name,
        table_span,
        fields: parsed,
        generics: input.generics.clone(),
    })
}

fn parse_struct_attrs(attrs: &[Attribute]) -> Result<(Option<String>, Option<Span>)> {
    let mut table = None;
    let mut table_span = None;

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                if table.is_some() {
                    return Err(Error::new_spanned(
                        meta.path,
                        "duplicate record attribute: table",
                    ));
                }
                let value: Lit = meta.value()?.parse()?;
                if let Lit::Str(lit_str) = value {
                    table_span = Some(lit_str.span());
                    table = Some(lit_str.value());
                    Ok(())
                } else {
                    Err(Error::new_spanned(
                        value,
                        "expected string literal for table name",
                    ))
                }
            } else {
                Err(meta.error(format!(
                    "unknown record attribute `{}` on struct, expected `table`",
                    meta.path.to_token_stream()
                )))
            }
        })?;
    }

    Ok((table, table_span))
}

#[derive(Default)]
struct FieldAttrs {
    column: Option<String>,
    column_span: Option<Span>,
    reference: Option<String>,
    reference_span: Option<Span>,
}

fn parse_field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("name") {
                if result.column.is_some() {
                    return Err(Error::new_spanned(path, "duplicate record attribute: name"));
                }
                let value: Lit = meta.value()?.parse()?;
                if let Lit::Str(lit_str) = value {
                    result.column_span = Some(lit_str.span());
                    result.column = Some(lit_str.value());
                } else {
                    return Err(Error::new_spanned(
                        value,
                        "expected string literal for column name",
                    ));
                }
            } else if path.is_ident("reference") {
                if result.reference.is_some() {
                    return Err(Error::new_spanned(
                        path,
                        "duplicate record attribute: reference",
                    ));
                }
                let value: Lit = meta.value()?.parse()?;
                if let Lit::Str(lit_str) = value {
                    result.reference_span = Some(lit_str.span());
                    result.reference = Some(lit_str.value());
                } else {
                    return Err(Error::new_spanned(
                        value,
                        "expected string literal for reference",
                    ));
                }
            } else {
                return Err(meta.error(format!(
                    "unknown record attribute `{}` on field, expected `name` or `reference`",
                    path.to_token_stream()
                )));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

/// Last path segment of a type (`crate::models::Credentials` -> `Credentials`).
fn type_name(ty: &Type) -> String {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map_or_else(|| ty.to_token_stream().to_string(), |s| s.ident.to_string()),
        Type::Reference(reference) => type_name(&reference.elem),
        Type::Paren(paren) => type_name(&paren.elem),
        Type::Group(group) => type_name(&group.elem),
        other => other.to_token_stream().to_string().replace(' ', ""),
    }
}
