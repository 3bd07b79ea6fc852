//! Identifier safety for generated SQL.
//!
//! Values never reach SQL text: they travel through COPY payloads or bound
//! parameters. Identifiers (schema, table, column names) cannot be bound, so
//! every identifier that ends up in a statement is validated here and then
//! emitted double-quoted, either by sea-query or by [`quote_identifier`].

use crate::error::Error;

/// PostgreSQL truncates identifiers longer than `NAMEDATALEN - 1` bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate a SQL identifier (schema, table or column name).
///
/// Quoted identifiers may contain any character except NUL, so validation
/// only rejects what would silently change meaning:
/// - empty names
/// - names longer than [`MAX_IDENTIFIER_LEN`] bytes (PostgreSQL would
///   truncate them and match a different relation)
/// - NUL bytes
///
/// # Examples
///
/// ```
/// use bulkload::security::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("daily_checkups").is_ok());
/// assert!(validate_sql_identifier("Entry Time").is_ok());
///
/// assert!(validate_sql_identifier("").is_err());
/// assert!(validate_sql_identifier("x\0").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config("SQL identifier cannot be empty"));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::config(format!(
            "SQL identifier too long: {} bytes (max {})",
            name.len(),
            MAX_IDENTIFIER_LEN
        )));
    }

    if name.contains('\0') {
        return Err(Error::config(format!(
            "Invalid SQL identifier '{}': contains NUL byte",
            name.escape_default()
        )));
    }

    Ok(())
}

/// Validate every identifier in a list
pub fn validate_sql_identifiers<S: AsRef<str>>(names: &[S]) -> crate::Result<()> {
    names
        .iter()
        .try_for_each(|n| validate_sql_identifier(n.as_ref()))
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
///
/// ```
/// use bulkload::security::quote_identifier;
///
/// assert_eq!(quote_identifier("users"), "\"users\"");
/// assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a comma-separated identifier list, e.g. `"a", "b"`
pub fn quote_identifier_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_sql_identifier("users").is_ok());
        assert!(validate_sql_identifier("_private").is_ok());
        assert!(validate_sql_identifier("TABLE_123").is_ok());
        assert!(validate_sql_identifier("with space").is_ok());
        assert!(validate_sql_identifier("ngày").is_ok());
    }

    #[test]
    fn test_empty_identifier() {
        assert!(validate_sql_identifier("").is_err());
    }

    #[test]
    fn test_too_long_identifier() {
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_sql_identifier(&long).is_err());

        let max = "a".repeat(MAX_IDENTIFIER_LEN);
        assert!(validate_sql_identifier(&max).is_ok());
    }

    #[test]
    fn test_injection_attempts_are_neutralized_by_quoting() {
        let hostile = "x\"; DROP TABLE users--";
        assert!(validate_sql_identifier(hostile).is_ok());
        assert_eq!(quote_identifier(hostile), "\"x\"\"; DROP TABLE users--\"");
    }

    #[test]
    fn test_nul_byte_rejected() {
        assert!(validate_sql_identifier("x\0").is_err());
    }

    #[test]
    fn test_quote_identifier_list() {
        assert_eq!(quote_identifier_list(&["id", "name"]), "\"id\", \"name\"");
        assert!(validate_sql_identifiers(&["id", ""]).is_err());
    }
}
