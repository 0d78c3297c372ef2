//! Statement builders for the write tools.
//!
//! Builders assemble INSERT/UPDATE/DELETE text from caller-supplied
//! identifiers and value maps. Identifiers are bracket-quoted; values only
//! ever appear as `@column` placeholders with the value carried in the
//! statement's parameter map. Every statement reports its affected-row count
//! through a trailing `SELECT @@ROWCOUNT`.

use crate::error::{DbError, DbResult};
use crate::models::{ParamMap, Statement};

const ROWCOUNT_SUFFIX: &str = "; SELECT @@ROWCOUNT AS affectedRows;";

/// Quote an identifier as `[name]`, doubling any closing bracket.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Schema-qualified, quoted table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

fn is_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_identifier(kind: &str, name: &str) -> DbResult<()> {
    if name.trim().is_empty() {
        return Err(DbError::invalid_input(format!("{} name cannot be empty", kind)));
    }
    Ok(())
}

fn check_columns(values: &ParamMap) -> DbResult<()> {
    if values.is_empty() {
        return Err(DbError::invalid_input(
            "At least one column value is required",
        ));
    }
    if let Some(bad) = values.keys().find(|name| !is_param_name(name)) {
        return Err(DbError::invalid_input(format!(
            "Column name '{}' must contain only letters, digits and underscores, and not start with a digit",
            bad
        )));
    }
    Ok(())
}

fn check_where(where_text: &str) -> DbResult<()> {
    if where_text.trim().is_empty() {
        return Err(DbError::invalid_input(
            "A WHERE clause is required; refusing to touch every row",
        ));
    }
    Ok(())
}

/// Build `INSERT INTO [schema].[table] ([c1], [c2]) VALUES (@c1, @c2)`.
pub fn build_insert(schema: &str, table: &str, values: &ParamMap) -> DbResult<Statement> {
    check_identifier("Schema", schema)?;
    check_identifier("Table", table)?;
    check_columns(values)?;

    let columns: Vec<String> = values.keys().map(|c| quote_identifier(c)).collect();
    let placeholders: Vec<String> = values.keys().map(|c| format!("@{}", c)).collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        qualified_table(schema, table),
        columns.join(", "),
        placeholders.join(", "),
        ROWCOUNT_SUFFIX
    );

    Ok(Statement {
        sql,
        params: values.clone(),
    })
}

/// Build `UPDATE [schema].[table] SET [c] = @c WHERE <where_text>`.
///
/// `where_text` is caller-authored and may reference `where_params` by
/// `@name`. A name used in both maps is rejected.
pub fn build_update(
    schema: &str,
    table: &str,
    values: &ParamMap,
    where_text: &str,
    where_params: &ParamMap,
) -> DbResult<Statement> {
    check_identifier("Schema", schema)?;
    check_identifier("Table", table)?;
    check_columns(values)?;
    check_where(where_text)?;

    if let Some(clash) = where_params.keys().find(|k| {
        values
            .keys()
            .any(|v| v.eq_ignore_ascii_case(k.as_str()))
    }) {
        return Err(DbError::invalid_input(format!(
            "Parameter '{}' is used both as a column value and in the WHERE clause; rename the WHERE parameter",
            clash
        )));
    }

    let assignments: Vec<String> = values
        .keys()
        .map(|c| format!("{} = @{}", quote_identifier(c), c))
        .collect();

    let sql = format!(
        "UPDATE {} SET {} WHERE {}{}",
        qualified_table(schema, table),
        assignments.join(", "),
        where_text.trim(),
        ROWCOUNT_SUFFIX
    );

    let mut params = values.clone();
    params.extend(where_params.iter().map(|(k, v)| (k.clone(), v.clone())));

    Ok(Statement { sql, params })
}

/// Build `DELETE FROM [schema].[table] WHERE <where_text>`.
pub fn build_delete(
    schema: &str,
    table: &str,
    where_text: &str,
    where_params: &ParamMap,
) -> DbResult<Statement> {
    check_identifier("Schema", schema)?;
    check_identifier("Table", table)?;
    check_where(where_text)?;

    let sql = format!(
        "DELETE FROM {} WHERE {}{}",
        qualified_table(schema, table),
        where_text.trim(),
        ROWCOUNT_SUFFIX
    );

    Ok(Statement {
        sql,
        params: where_params.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamValue;

    fn map(entries: &[(&str, ParamValue)]) -> ParamMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_quote_identifier_doubles_bracket() {
        assert_eq!(quote_identifier("Users"), "[Users]");
        assert_eq!(quote_identifier("we]ird"), "[we]]ird]");
    }

    #[test]
    fn test_param_name_rules() {
        assert!(is_param_name("Id"));
        assert!(is_param_name("_col2"));
        assert!(!is_param_name("2col"));
        assert!(!is_param_name("first name"));
        assert!(!is_param_name(""));
    }

    #[test]
    fn test_insert_sql() {
        let values = map(&[
            ("Name", ParamValue::String("Ann".into())),
            ("Age", ParamValue::Int(30)),
        ]);
        let stmt = build_insert("dbo", "Users", &values).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO [dbo].[Users] ([Age], [Name]) VALUES (@Age, @Name); SELECT @@ROWCOUNT AS affectedRows;"
        );
        assert_eq!(stmt.params, values);
    }

    #[test]
    fn test_insert_rejects_empty_values() {
        let err = build_insert("dbo", "Users", &ParamMap::new()).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_update_merges_params() {
        let values = map(&[("Name", ParamValue::String("Bo".into()))]);
        let where_params = map(&[("id", ParamValue::Int(7))]);
        let stmt = build_update("dbo", "Users", &values, "Id = @id", &where_params).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE [dbo].[Users] SET [Name] = @Name WHERE Id = @id; SELECT @@ROWCOUNT AS affectedRows;"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_update_rejects_collision() {
        let values = map(&[("Id", ParamValue::Int(1))]);
        let where_params = map(&[("id", ParamValue::Int(7))]);
        assert!(build_update("dbo", "Users", &values, "Id = @id", &where_params).is_err());
    }

    #[test]
    fn test_update_and_delete_require_where() {
        let values = map(&[("Name", ParamValue::Null)]);
        assert!(build_update("dbo", "Users", &values, "  ", &ParamMap::new()).is_err());
        assert!(build_delete("dbo", "Users", "", &ParamMap::new()).is_err());
    }

    #[test]
    fn test_delete_sql() {
        let where_params = map(&[("id", ParamValue::Int(7))]);
        let stmt = build_delete("dbo", "Users", "Id = @id", &where_params).unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM [dbo].[Users] WHERE Id = @id; SELECT @@ROWCOUNT AS affectedRows;"
        );
        assert_eq!(stmt.params.get("id"), Some(&ParamValue::Int(7)));
    }

    #[test]
    fn test_bad_column_name_rejected() {
        let values = map(&[("Name]; DROP TABLE x; --", ParamValue::Int(1))]);
        assert!(build_insert("dbo", "Users", &values).is_err());
    }
}
