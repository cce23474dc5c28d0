//! Compile-time validation for the Record derive macro.
//!
//! All checks run before any error is reported so a single build shows every
//! problem in the struct.

use std::collections::{HashMap, HashSet};

use proc_macro2::Span;
use syn::{Error, Type};

use crate::parse::{FieldDef, RecordDef};

/// Validate a parsed record definition.
pub fn validate_record(record: &RecordDef) -> Result<(), Error> {
    let mut errors = Vec::new();

    validate_has_fields(record, &mut errors);
    validate_identifier(
        &record.table_name,
        "table",
        record.table_span.unwrap_or_else(|| record.name.span()),
        &mut errors,
    );
    validate_no_duplicate_columns(record, &mut errors);

    for field in &record.fields {
        validate_field(field, &mut errors);
    }

    validate_unambiguous_relations(record, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let mut combined = errors.remove(0);
        for err in errors {
            combined.combine(err);
        }
        Err(combined)
    }
}

fn validate_has_fields(record: &RecordDef, errors: &mut Vec<Error>) {
    if record.fields.is_empty() {
        errors.push(Error::new(
            record.name.span(),
            "Record struct must have at least one field",
        ));
    }
}

/// Column and table names are spliced into SQL text, so they are restricted
/// to plain identifiers.
fn validate_identifier(name: &str, what: &str, span: Span, errors: &mut Vec<Error>) {
    if name.is_empty() {
        errors.push(Error::new(span, format!("{what} name must not be empty")));
        return;
    }

    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        errors.push(Error::new(
            span,
            format!(
                "invalid {what} name '{name}'; use ASCII letters, digits and underscores, starting with a letter or underscore"
            ),
        ));
    }
}

fn validate_no_duplicate_columns(record: &RecordDef, errors: &mut Vec<Error>) {
    let mut seen: HashSet<&str> = HashSet::new();

    for field in &record.fields {
        let Some(column) = field.column.as_deref() else {
            continue;
        };
        if !seen.insert(column) {
            errors.push(Error::new(
                field.name.span(),
                format!("duplicate column name '{column}'; another field already maps to this column"),
            ));
        }
    }
}

fn validate_field(field: &FieldDef, errors: &mut Vec<Error>) {
    if let Some(column) = field.column.as_deref() {
        validate_identifier(
            column,
            "column",
            field.column_span.unwrap_or_else(|| field.name.span()),
            errors,
        );
    }

    let Some(reference) = field.reference.as_deref() else {
        return;
    };
    let span = field.reference_span.unwrap_or_else(|| field.name.span());

    if reference.is_empty() {
        errors.push(Error::new(span, "reference must not be empty"));
    }
    if field.column.is_none() {
        errors.push(Error::new(
            field.name.span(),
            "relation fields need `name = \"...\"` naming the column that stores the related id",
        ));
    }
    if is_wrapped(&field.ty) {
        errors.push(Error::new(
            span,
            "relation fields must hold the nested record directly, not an Option, Vec or reference",
        ));
    }
}

/// The mapper finds the referencing column by the nested record's type, so
/// two relations to the same type would be ambiguous.
fn validate_unambiguous_relations(record: &RecordDef, errors: &mut Vec<Error>) {
    let mut by_type: HashMap<&str, &FieldDef> = HashMap::new();

    for field in record.fields.iter().filter(|f| f.is_relation()) {
        if let Some(first) = by_type.insert(field.type_name.as_str(), field) {
            errors.push(Error::new(
                field.name.span(),
                format!(
                    "field `{}` and field `{}` both reference `{}`; at most one relation per nested type is supported",
                    first.name, field.name, field.type_name
                ),
            ));
        }
    }
}

fn is_wrapped(ty: &Type) -> bool {
    match ty {
        Type::Reference(_) | Type::Ptr(_) | Type::Slice(_) | Type::Array(_) => true,
        Type::Path(type_path) => type_path.path.segments.last().is_some_and(|segment| {
            matches!(
                segment.ident.to_string().as_str(),
                "Option" | "Vec" | "Box" | "Arc" | "Rc"
            )
        }),
        _ => false,
    }
}
