use crate::catalog::TableMeta;
use crate::error::Result;
use crate::recognizer::{ItemTable, SqlFacts};
use crate::record::RowImage;
use crate::value::Value;

use super::query::{lock_clause, push_select_list, push_statement_filter, QueryBuilder};
use super::{run_image_query, ImageQuery, QueryExecutor};

// A deleted row must be restorable in full, so every column is captured.
pub(super) fn before_query(
    facts: &SqlFacts,
    item: &ItemTable,
    meta: &TableMeta,
    params: &[Value],
) -> Result<ImageQuery> {
    let dialect = facts.dialect();
    let columns: Vec<String> = meta.column_names().map(str::to_string).collect();

    let mut query = QueryBuilder::new(dialect);
    push_select_list(&mut query, dialect, item.qualifier(), &columns);
    query.push(" FROM ").fragment(facts.union_table(), params)?;
    push_statement_filter(&mut query, facts, params)?;
    query.push(&lock_clause(facts, item));
    Ok(query.finish())
}

pub(super) fn before_image<E: QueryExecutor + ?Sized>(
    facts: &SqlFacts,
    item: &ItemTable,
    meta: &TableMeta,
    params: &[Value],
    executor: &mut E,
) -> Result<RowImage> {
    let query = before_query(facts, item, meta, params)?;
    run_image_query(executor, &query, facts.dialect(), meta)
}
