//! Utility functions useful throughout the codebase.

/// Converts a `PascalCase` identifier into `lower_under` form, as used for
/// protobuf field names.
///
/// Every upper-case letter after the first character is preceded by an
/// underscore, and trailing underscores are removed.
#[must_use]
pub fn to_lower_under(identifier: &str) -> String {
    let mut result = String::with_capacity(identifier.len() + 4);
    for (index, char) in identifier.chars().enumerate() {
        if index != 0 && char.is_ascii_uppercase() {
            result.push('_');
        }
        result.push(char.to_ascii_lowercase());
    }

    result.trim_end_matches('_').to_string()
}

/// Converts an enum member name into `UPPER_SNAKE` form.
///
/// Names that contain no lower-case letters are assumed to already be in that
/// form and are returned unchanged.
#[must_use]
pub fn to_upper_snake(identifier: &str) -> String {
    if !identifier.chars().any(|c| c.is_ascii_lowercase()) {
        return identifier.to_string();
    }

    to_lower_under(identifier).to_ascii_uppercase()
}

/// Escapes `value` so that it can be placed between double quotes in a
/// `.proto` default option.
#[must_use]
pub fn escape_string_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for char in value.chars() {
        match char {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\0' => escaped.push_str("\\0"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Quotes `value` as a string default, escaping as necessary.
#[must_use]
pub fn quote_string_literal(value: &str) -> String {
    format!("\"{}\"", escape_string_literal(value))
}

/// Removes the generic arity marker (e.g. the `` `2 `` in ``Foo`2``) from a CIL
/// type name.
#[must_use]
pub fn strip_generic_arity(name: &str) -> &str {
    name.split_once('`').map_or(name, |(head, _)| head)
}
