use crate::catalog::TableMeta;
use crate::error::Result;
use crate::recognizer::{ItemTable, SqlFacts};
use crate::record::RowImage;
use crate::value::Value;

use super::query::{
    image_columns, lock_clause, push_primary_key_condition, push_select_list,
    push_statement_filter, qualified, QueryBuilder,
};
use super::{run_image_query, ImageBuilder, ImageQuery, QueryExecutor};

/// `SELECT <cols> FROM <union> [WHERE ..] [ORDER BY ..] [LIMIT ..] FOR UPDATE`
pub(super) fn before_query(
    builder: &ImageBuilder<'_>,
    facts: &SqlFacts,
    item: &ItemTable,
    meta: &TableMeta,
    params: &[Value],
) -> Result<ImageQuery> {
    let dialect = facts.dialect();
    let columns = image_columns(meta, item, builder.config().only_care_update_columns);

    let mut query = QueryBuilder::new(dialect);
    push_select_list(&mut query, dialect, item.qualifier(), &columns);
    query.push(" FROM ").fragment(facts.union_table(), params)?;
    push_statement_filter(&mut query, facts, params)?;
    query.push(&lock_clause(facts, item));
    Ok(query.finish())
}

pub(super) fn before_image<E: QueryExecutor + ?Sized>(
    builder: &ImageBuilder<'_>,
    facts: &SqlFacts,
    item: &ItemTable,
    meta: &TableMeta,
    params: &[Value],
    executor: &mut E,
) -> Result<RowImage> {
    let query = before_query(builder, facts, item, meta, params)?;
    let mut image = run_image_query(executor, &query, facts.dialect(), meta)?;
    if facts.is_multi_table() {
        image.drop_null_keys();
        image.dedup_by_primary_key();
    }
    Ok(image)
}

/// Same columns as the before image, re-read from the item table itself by
/// the captured primary keys.
pub(super) fn after_query(
    builder: &ImageBuilder<'_>,
    facts: &SqlFacts,
    item: &ItemTable,
    meta: &TableMeta,
    before: &RowImage,
) -> ImageQuery {
    let dialect = facts.dialect();
    let columns = image_columns(meta, item, builder.config().only_care_update_columns);
    let pk_columns: Vec<String> = meta
        .primary_keys()
        .map(|pk| qualified(dialect, item.qualifier(), pk))
        .collect();

    let mut query = QueryBuilder::new(dialect);
    push_select_list(&mut query, dialect, item.qualifier(), &columns);
    query.push(" FROM ").push(item.table_sql()).push(" WHERE ");
    push_primary_key_condition(
        &mut query,
        &pk_columns,
        &before.primary_key_values(),
        builder.config().max_in_size,
    );
    query.finish()
}

pub(super) fn after_image<E: QueryExecutor + ?Sized>(
    builder: &ImageBuilder<'_>,
    facts: &SqlFacts,
    item: &ItemTable,
    meta: &TableMeta,
    before: &RowImage,
    executor: &mut E,
) -> Result<RowImage> {
    if before.is_empty() {
        return Ok(RowImage::empty(
            meta.table_name(),
            meta.primary_keys().map(str::to_string).collect(),
        ));
    }
    let query = after_query(builder, facts, item, meta, before);
    let mut image = run_image_query(executor, &query, facts.dialect(), meta)?;
    image.align_to(&before.primary_key_values());
    Ok(image)
}
