//! # Tenant Schema Validation
//!
//! A schema declares the shape of a tenant's facts: a mapping from object
//! name to a mapping from field name to scalar type name. Schemas are
//! validated structurally before any environment is built from them:
//! identifier shape, reserved words, size limits, and a closed set of type
//! names. Validation is in-memory only and stops at the first violation.

use std::collections::BTreeMap;

use thiserror::Error;

/// A tenant's data schema: object name → (field name → scalar type name).
///
/// `BTreeMap` keeps the serialized form stable regardless of insertion
/// order, so a schema round-trips through its JSON representation without
/// spurious diffs.
pub type Schema = BTreeMap<String, BTreeMap<String, String>>;

/// Maximum number of objects in a schema.
pub const MAX_OBJECTS: usize = 100;

/// Maximum number of fields in a single object.
pub const MAX_FIELDS: usize = 200;

/// Maximum identifier length in bytes.
pub const MAX_IDENT_LEN: usize = 100;

/// Scalar type names a schema may declare, case-sensitive.
pub const SCALAR_TYPES: &[&str] = &[
    "int",
    "int64",
    "float64",
    "string",
    "bool",
    "bytes",
    "timestamp",
    "duration",
];

/// Expression-language keywords that cannot be used as identifiers.
pub const RESERVED_WORDS: &[&str] = &[
    "true",
    "false",
    "null",
    "in",
    "as",
    "break",
    "const",
    "continue",
    "else",
    "for",
    "function",
    "if",
    "import",
    "let",
    "loop",
    "package",
    "namespace",
    "return",
    "var",
    "void",
    "while",
];

/// Why an identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("identifier cannot be empty")]
    Empty,
    #[error("identifier length {0} exceeds maximum of {MAX_IDENT_LEN} characters")]
    TooLong(usize),
    #[error("must start with a letter or underscore, followed by letters, digits, or underscores")]
    BadFormat,
    #[error("'{0}' is a reserved keyword")]
    Reserved(String),
}

/// Schema validation failures. The first violation encountered wins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema cannot be empty, must contain at least one object definition")]
    Empty,

    #[error("schema contains {0} objects, maximum allowed is {MAX_OBJECTS}")]
    TooManyObjects(usize),

    #[error("invalid object name '{name}': {source}")]
    InvalidObjectName {
        name: String,
        #[source]
        source: IdentError,
    },

    #[error("object '{0}' must contain at least one field")]
    EmptyObject(String),

    #[error("object '{object}' contains {count} fields, maximum allowed is {MAX_FIELDS}")]
    TooManyFields { object: String, count: usize },

    #[error("invalid field name '{name}' in object '{object}': {source}")]
    InvalidFieldName {
        object: String,
        name: String,
        #[source]
        source: IdentError,
    },

    #[error(
        "field '{field}' in object '{object}' has invalid type '{type_name}' \
         (must be one of: int, int64, float64, string, bool, bytes, timestamp, duration)"
    )]
    InvalidType {
        object: String,
        field: String,
        type_name: String,
    },
}

/// Validate a schema against the structural rules.
///
/// # Errors
///
/// Returns the first [`SchemaError`] encountered, identifying the offending
/// object, field, or type.
pub fn validate_schema(schema: &Schema) -> Result<(), SchemaError> {
    if schema.is_empty() {
        return Err(SchemaError::Empty);
    }
    if schema.len() > MAX_OBJECTS {
        return Err(SchemaError::TooManyObjects(schema.len()));
    }

    for (object_name, fields) in schema {
        if let Err(source) = validate_identifier(object_name) {
            return Err(SchemaError::InvalidObjectName {
                name: object_name.clone(),
                source,
            });
        }

        if fields.is_empty() {
            return Err(SchemaError::EmptyObject(object_name.clone()));
        }
        if fields.len() > MAX_FIELDS {
            return Err(SchemaError::TooManyFields {
                object: object_name.clone(),
                count: fields.len(),
            });
        }

        for (field_name, type_name) in fields {
            if let Err(source) = validate_identifier(field_name) {
                return Err(SchemaError::InvalidFieldName {
                    object: object_name.clone(),
                    name: field_name.clone(),
                    source,
                });
            }

            if !is_scalar_type(type_name) {
                return Err(SchemaError::InvalidType {
                    object: object_name.clone(),
                    field: field_name.clone(),
                    type_name: type_name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Check an object or field name against the identifier rules:
/// `^[A-Za-z_][A-Za-z0-9_]*$`, 1–100 characters, not a reserved keyword.
pub fn validate_identifier(name: &str) -> Result<(), IdentError> {
    if name.is_empty() {
        return Err(IdentError::Empty);
    }
    if name.len() > MAX_IDENT_LEN {
        return Err(IdentError::TooLong(name.len()));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return Err(IdentError::BadFormat),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(IdentError::BadFormat);
    }

    if RESERVED_WORDS.contains(&name) {
        return Err(IdentError::Reserved(name.to_owned()));
    }

    Ok(())
}

/// Check a type name against the closed scalar type set. Case-sensitive;
/// surrounding whitespace makes the name invalid.
pub fn is_scalar_type(type_name: &str) -> bool {
    SCALAR_TYPES.contains(&type_name)
}
