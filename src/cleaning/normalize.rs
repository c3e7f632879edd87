//! Column identifier normalization.

use crate::types::DataSet;

/// Normalize one column identifier: trim, lower-case, spaces and hyphens → underscores.
///
/// Idempotent: `normalize_column_name(&normalize_column_name(s)) == normalize_column_name(s)`.
pub fn normalize_column_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Rewrite every column identifier of `ds`. Values and types are untouched.
pub fn normalize_columns(ds: &mut DataSet) {
    for field in &mut ds.schema.fields {
        field.name = normalize_column_name(&field.name);
    }
}
