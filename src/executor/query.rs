use tracing::warn;

use crate::catalog::TableMeta;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::recognizer::{bind_param, FragmentPart, ItemTable, SqlFacts, SqlFragment};
use crate::value::Value;

/// A generated image SELECT and the values for its placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl ImageQuery {
    /// The query with every placeholder replaced by its literal value. Only
    /// meant for logs and assertions; never executed.
    pub fn inline_sql(&self, dialect: Dialect) -> String {
        let chars: Vec<char> = self.sql.chars().collect();
        let quote = dialect.identifier_quote();
        let mut out = String::with_capacity(self.sql.len());
        let mut next_param = 0;
        let mut pos = 0;

        while pos < chars.len() {
            let ch = chars[pos];
            match ch {
                '\'' | '"' | '`' if ch == '\'' || ch == quote => {
                    // Copy a quoted run untouched
                    out.push(ch);
                    pos += 1;
                    while pos < chars.len() {
                        let c = chars[pos];
                        out.push(c);
                        pos += 1;
                        if c == '\\' && ch == '\'' && dialect.backslash_escapes() {
                            if let Some(&escaped) = chars.get(pos) {
                                out.push(escaped);
                                pos += 1;
                            }
                        } else if c == ch {
                            break;
                        }
                    }
                }
                '?' => {
                    out.push_str(&self.literal(next_param, dialect));
                    next_param += 1;
                    pos += 1;
                }
                '$' if dialect == Dialect::PostgreSql
                    && chars.get(pos + 1).is_some_and(|c| c.is_ascii_digit()) =>
                {
                    pos += 1;
                    let mut digits = String::new();
                    while let Some(c) = chars.get(pos).filter(|c| c.is_ascii_digit()) {
                        digits.push(*c);
                        pos += 1;
                    }
                    let index = digits.parse::<usize>().unwrap_or(0);
                    out.push_str(&self.literal(index.saturating_sub(1), dialect));
                }
                _ => {
                    out.push(ch);
                    pos += 1;
                }
            }
        }
        out
    }

    fn literal(&self, index: usize, dialect: Dialect) -> String {
        match self.params.get(index) {
            Some(value) => value.to_sql_literal(dialect),
            None => "?".to_string(),
        }
    }
}

// Accumulates SQL text and re-numbers placeholders for the target dialect.
pub(crate) struct QueryBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl QueryBuilder {
    pub(crate) fn new(dialect: Dialect) -> Self {
        QueryBuilder {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub(crate) fn bind(&mut self, value: Value) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append a statement fragment, binding its placeholders from the
    /// statement's parameters.
    pub(crate) fn fragment(&mut self, fragment: &SqlFragment, params: &[Value]) -> Result<&mut Self> {
        for part in fragment.parts() {
            match part {
                FragmentPart::Sql(text) => {
                    self.push(text);
                }
                FragmentPart::Param(index) => {
                    self.bind(bind_param(params, *index)?);
                }
            }
        }
        Ok(self)
    }

    pub(crate) fn finish(self) -> ImageQuery {
        ImageQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Columns an image of `item` captures, as canonical metadata names.
pub(crate) fn image_columns(meta: &TableMeta, item: &ItemTable, only_care_update_columns: bool) -> Vec<String> {
    if !only_care_update_columns {
        return meta.column_names().map(str::to_string).collect();
    }

    let mut updated: Vec<String> = Vec::new();
    for name in item.update_columns() {
        match meta.column(name) {
            Some(column) => {
                if !updated.contains(&column.name) {
                    updated.push(column.name.clone());
                }
            }
            None => warn!(
                table = meta.table_name(),
                column = name.as_str(),
                "updated column is not in table metadata"
            ),
        }
    }

    let mut columns: Vec<String> = Vec::new();
    if !meta.contains_primary_keys(&updated) {
        columns.extend(meta.primary_keys().map(str::to_string));
    }
    for name in updated.iter().map(String::as_str).chain(meta.on_update_columns()) {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    }
    columns
}

pub(crate) fn qualified(dialect: Dialect, qualifier: Option<&str>, column: &str) -> String {
    let escaped = dialect.escape_identifier(column);
    match qualifier {
        Some(q) => format!("{q}.{escaped}"),
        None => escaped,
    }
}

pub(crate) fn push_select_list(
    builder: &mut QueryBuilder,
    dialect: Dialect,
    qualifier: Option<&str>,
    columns: &[String],
) {
    let list: Vec<String> = columns
        .iter()
        .map(|c| qualified(dialect, qualifier, c))
        .collect();
    builder.push("SELECT ").push(&list.join(", "));
}

/// `WHERE .. [ORDER BY ..] [LIMIT ..]` carried over from the statement.
pub(crate) fn push_statement_filter(
    builder: &mut QueryBuilder,
    facts: &SqlFacts,
    params: &[Value],
) -> Result<()> {
    if let Some(predicate) = facts.predicate() {
        builder.push(" WHERE ").fragment(predicate, params)?;
    }
    if let Some(order_by) = facts.order_by() {
        builder.push(" ").fragment(order_by, params)?;
    }
    if let Some(limit) = facts.limit() {
        builder.push(" ").fragment(limit, params)?;
    }
    Ok(())
}

pub(crate) fn lock_clause(facts: &SqlFacts, item: &ItemTable) -> String {
    match (facts.dialect(), facts.is_multi_table(), item.qualifier()) {
        (Dialect::PostgreSql, true, Some(qualifier)) => format!(" FOR UPDATE OF {qualifier}"),
        _ => " FOR UPDATE".to_string(),
    }
}

/// Row filter matching `keys` on the primary-key columns.
///
/// One key renders as `pk = ?` (`a = ? AND b = ?` for composite keys), more as
/// `pk IN (?, ?)` (`(a, b) IN ((?, ?), ..)`). Lists longer than `max_in_size`
/// are split into chunks joined by `OR`.
pub(crate) fn push_primary_key_condition(
    builder: &mut QueryBuilder,
    pk_columns: &[String],
    keys: &[Vec<Value>],
    max_in_size: usize,
) {
    let chunks: Vec<&[Vec<Value>]> = keys.chunks(max_in_size.max(1)).collect();
    let grouped = chunks.len() > 1;
    if grouped {
        builder.push("(");
    }
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        match (pk_columns, *chunk) {
            (_, [key]) => {
                let composite = pk_columns.len() > 1;
                if composite && grouped {
                    builder.push("(");
                }
                for (j, (column, value)) in pk_columns.iter().zip(key).enumerate() {
                    if j > 0 {
                        builder.push(" AND ");
                    }
                    builder.push(column).push(" = ").bind(value.clone());
                }
                if composite && grouped {
                    builder.push(")");
                }
            }
            ([column], chunk) => {
                builder.push(column).push(" IN (");
                for (j, key) in chunk.iter().enumerate() {
                    if j > 0 {
                        builder.push(", ");
                    }
                    for value in key {
                        builder.bind(value.clone());
                    }
                }
                builder.push(")");
            }
            (columns, chunk) => {
                builder.push("(").push(&columns.join(", ")).push(") IN (");
                for (j, key) in chunk.iter().enumerate() {
                    if j > 0 {
                        builder.push(", ");
                    }
                    builder.push("(");
                    for (k, value) in key.iter().enumerate() {
                        if k > 0 {
                            builder.push(", ");
                        }
                        builder.bind(value.clone());
                    }
                    builder.push(")");
                }
                builder.push(")");
            }
        }
    }
    if grouped {
        builder.push(")");
    }
}
