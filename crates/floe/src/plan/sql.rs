//! Quoting helpers for generated statements.

/// Quote an identifier, doubling embedded double quotes.
///
/// ```
/// use floe::plan::sql::quote_ident;
///
/// assert_eq!(quote_ident("user.name"), r#""user.name""#);
/// assert_eq!(quote_ident(r#"a"b"#), r#""a""b""#);
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
///
/// ```
/// use floe::plan::sql::quote_literal;
///
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// ```
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
