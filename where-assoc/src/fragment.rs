//! Helpers for SQL fragments with bound values.

use sea_orm::Value;

use crate::types::{WhereAssocError, WhereAssocResult};

pub fn ident(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// `?, ?, ?` placeholders for an IN list plus its values.
pub fn in_list_params<T>(items: &[T]) -> (String, Vec<Value>)
where
    T: Clone + Into<Value>,
{
    if items.is_empty() {
        return (String::from("NULL"), Vec::new());
    }
    let mut placeholders = String::new();
    let mut params = Vec::with_capacity(items.len());
    for (i, it) in items.iter().cloned().enumerate() {
        if i > 0 {
            placeholders.push_str(", ");
        }
        placeholders.push('?');
        params.push(it.into());
    }
    (placeholders, params)
}

// Marks text to be spliced into the fragment instead of bound
pub struct Inline(pub String);

pub enum FragmentArg {
    Bind(Value),
    Inline(String),
}

impl From<Inline> for FragmentArg {
    fn from(v: Inline) -> Self {
        FragmentArg::Inline(v.0)
    }
}

impl<T> From<T> for FragmentArg
where
    Value: From<T>,
{
    fn from(v: T) -> Self {
        FragmentArg::Bind(Value::from(v))
    }
}

/// Replace each `{}` in `fmt` with `?` (binding the argument) or inline text.
pub fn finalize_sql_with_args(fmt: &str, args: Vec<FragmentArg>) -> WhereAssocResult<(String, Vec<Value>)> {
    let expected = count_braces(fmt);
    if expected != args.len() {
        return Err(WhereAssocError::invalid_fragment(format!(
            "fragment has {} placeholders but {} arguments",
            expected,
            args.len()
        )));
    }
    let mut sql = String::with_capacity(fmt.len() + args.len() * 2);
    let mut params: Vec<Value> = Vec::new();
    let mut args = args.into_iter();
    let mut rest = fmt;
    while let Some(pos) = rest.find("{}") {
        sql.push_str(&rest[..pos]);
        match args.next() {
            Some(FragmentArg::Bind(v)) => {
                sql.push('?');
                params.push(v);
            }
            Some(FragmentArg::Inline(s)) => sql.push_str(&s),
            None => break,
        }
        rest = &rest[pos + 2..];
    }
    sql.push_str(rest);
    Ok((sql, params))
}

fn count_braces(fmt: &str) -> usize {
    fmt.matches("{}").count()
}

/// Rewrite `:name` placeholders into positional `?` ones.
///
/// Quoted text and identifiers and `::type` casts are left alone. Every name used
/// must be present in `binds`; a name may appear more than once.
pub fn bind_named(sql: &str, binds: &[(String, Value)]) -> WhereAssocResult<(String, Vec<Value>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut quote = None;
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        quote = next_quote(quote, c);
        if quote.is_some() || c != ':' {
            out.push(c);
            i += 1;
            continue;
        }
        // `::` cast
        if chars.get(i + 1) == Some(&':') {
            out.push_str("::");
            i += 2;
            continue;
        }
        let starts_name = chars
            .get(i + 1)
            .map(|n| n.is_ascii_alphabetic() || *n == '_')
            .unwrap_or(false);
        if !starts_name {
            out.push(c);
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let name: String = chars[start..end].iter().collect();
        let value = binds
            .iter()
            .find(|(bind, _)| *bind == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| WhereAssocError::invalid_fragment(format!("missing value for ':{}'", name)))?;
        out.push('?');
        values.push(value);
        i = end;
    }
    Ok((out, values))
}

/// Number of `?` placeholders outside quoted text.
pub fn count_placeholders(sql: &str) -> usize {
    let mut quote = None;
    let mut n = 0usize;
    for c in sql.chars() {
        quote = next_quote(quote, c);
        if c == '?' && quote.is_none() {
            n += 1;
        }
    }
    n
}

// String literals and quoted identifiers never hold placeholders
fn next_quote(quote: Option<char>, c: char) -> Option<char> {
    match quote {
        Some(open) if open == c => None,
        Some(open) => Some(open),
        None if matches!(c, '\'' | '"' | '`') => Some(c),
        None => None,
    }
}
