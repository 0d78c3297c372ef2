//! Parameter binding utilities for database queries.
//!
//! Named parameters (`@name`) are resolved to the engine type they bind as,
//! and the SQL text is rewritten to the positional `@P1..@Pn` form the TDS
//! driver expects. Values never enter the SQL text.

use crate::models::{ParamMap, ParamValue};

/// Engine type a parameter is declared as when sent to SQL Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    /// Unicode variable-length string (also used for NULL)
    NVarChar,
    /// 64-bit integer
    BigInt,
    /// 64-bit float
    Float,
    /// Boolean
    Bit,
}

/// A parameter ready to be attached to an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub value: ParamValue,
    pub engine_type: EngineType,
}

/// Choose the engine type a value binds as.
///
/// NULL binds as a string type since the engine accepts an untyped NULL
/// against any column through implicit conversion.
pub fn bind_type(value: &ParamValue) -> EngineType {
    match value {
        ParamValue::Null | ParamValue::String(_) => EngineType::NVarChar,
        ParamValue::Int(_) => EngineType::BigInt,
        ParamValue::Float(_) => EngineType::Float,
        ParamValue::Bool(_) => EngineType::Bit,
    }
}

/// Bind every entry of a parameter map, in map order.
pub fn bind_params(params: &ParamMap) -> Vec<BoundParam> {
    params
        .iter()
        .map(|(name, value)| BoundParam {
            name: name.clone(),
            value: value.clone(),
            engine_type: bind_type(value),
        })
        .collect()
}

/// Rewrite named `@name` placeholders to positional `@P{n}` placeholders.
///
/// `names[i]` becomes `@P{i+1}`. Matching is case-insensitive, as identifiers
/// are under the default collation. `@@` system variables, string literals,
/// bracketed or quoted identifiers and comments are copied verbatim. A name
/// that is not in `names` is left as written so the engine reports it.
pub fn rewrite_placeholders(sql: &str, names: &[String]) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + names.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => i = copy_quoted(&chars, i, '\'', &mut out),
            '"' => i = copy_quoted(&chars, i, '"', &mut out),
            '[' => i = copy_quoted(&chars, i, ']', &mut out),
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_block_end(&chars, i + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '@' if chars.get(i + 1) == Some(&'@') => {
                // System variable such as @@ROWCOUNT: copy the whole token.
                let end = ident_end(&chars, i + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '@' => {
                let end = ident_end(&chars, i + 1);
                let ident: String = chars[i + 1..end].iter().collect();
                match names
                    .iter()
                    .position(|n| !ident.is_empty() && n.eq_ignore_ascii_case(&ident))
                {
                    Some(pos) => {
                        out.push_str("@P");
                        out.push_str(&(pos + 1).to_string());
                    }
                    None => out.extend(&chars[i..end]),
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '#'
}

fn ident_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && is_ident_char(chars[end]) {
        end += 1;
    }
    end
}

/// Copy a quoted run starting at `start` (the opening quote). A doubled
/// closing character is an escape. Returns the index after the closing quote.
fn copy_quoted(chars: &[char], start: usize, close: char, out: &mut String) -> usize {
    out.push(chars[start]);
    let mut i = start + 1;
    while i < chars.len() {
        out.push(chars[i]);
        if chars[i] == close {
            if chars.get(i + 1) == Some(&close) {
                out.push(close);
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    i
}

fn find_block_end(chars: &[char], mut i: usize) -> usize {
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bind_type_is_exhaustive() {
        assert_eq!(bind_type(&ParamValue::Null), EngineType::NVarChar);
        assert_eq!(
            bind_type(&ParamValue::String("x".into())),
            EngineType::NVarChar
        );
        assert_eq!(bind_type(&ParamValue::Int(1)), EngineType::BigInt);
        assert_eq!(bind_type(&ParamValue::Float(1.5)), EngineType::Float);
        assert_eq!(bind_type(&ParamValue::Bool(true)), EngineType::Bit);
    }

    #[test]
    fn test_bind_params_follows_map_order() {
        let mut params = ParamMap::new();
        params.insert("zeta".into(), ParamValue::Int(1));
        params.insert("alpha".into(), ParamValue::Bool(false));
        let bound = bind_params(&params);
        assert_eq!(bound[0].name, "alpha");
        assert_eq!(bound[0].engine_type, EngineType::Bit);
        assert_eq!(bound[1].name, "zeta");
        assert_eq!(bound[1].engine_type, EngineType::BigInt);
    }

    #[test]
    fn test_rewrite_basic() {
        let sql = rewrite_placeholders(
            "SELECT * FROM t WHERE a = @a AND b = @b",
            &names(&["a", "b"]),
        );
        assert_eq!(sql, "SELECT * FROM t WHERE a = @P1 AND b = @P2");
    }

    #[test]
    fn test_rewrite_repeated_and_case_insensitive() {
        let sql = rewrite_placeholders("WHERE x = @Id OR y = @ID", &names(&["id"]));
        assert_eq!(sql, "WHERE x = @P1 OR y = @P1");
    }

    #[test]
    fn test_rewrite_does_not_match_prefix() {
        let sql = rewrite_placeholders("WHERE a = @idx", &names(&["id"]));
        assert_eq!(sql, "WHERE a = @idx");
    }

    #[test]
    fn test_rewrite_skips_system_variables() {
        let sql = rewrite_placeholders(
            "UPDATE t SET a = @rowcount; SELECT @@ROWCOUNT AS affectedRows;",
            &names(&["rowcount"]),
        );
        assert_eq!(
            sql,
            "UPDATE t SET a = @P1; SELECT @@ROWCOUNT AS affectedRows;"
        );
    }

    #[test]
    fn test_rewrite_skips_literals_and_comments() {
        let sql = rewrite_placeholders(
            "SELECT '@a', [@a], \"@a\" -- @a\n, /* @a */ @a",
            &names(&["a"]),
        );
        assert_eq!(sql, "SELECT '@a', [@a], \"@a\" -- @a\n, /* @a */ @P1");
    }

    #[test]
    fn test_rewrite_handles_escaped_quotes() {
        let sql = rewrite_placeholders("SELECT 'it''s @a', [a]]@a], @a", &names(&["a"]));
        assert_eq!(sql, "SELECT 'it''s @a', [a]]@a], @P1");
    }

    #[test]
    fn test_unknown_names_left_for_the_engine() {
        let sql = rewrite_placeholders("WHERE a = @missing", &names(&["a"]));
        assert_eq!(sql, "WHERE a = @missing");
    }
}
