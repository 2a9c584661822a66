use crate::catalog::TableMeta;
use crate::error::{Result, UndoError};
use crate::recognizer::{bind_param, InsertValue, ItemTable, SqlFacts};
use crate::record::RowImage;
use crate::value::Value;

use super::query::{push_primary_key_condition, push_select_list, qualified, QueryBuilder};
use super::{run_image_query, ImageBuilder, ImageQuery, QueryExecutor};

// Position of a primary-key column inside each VALUES row
fn key_position(facts: &SqlFacts, meta: &TableMeta, pk: &str) -> Option<usize> {
    if facts.insert_columns().is_empty() {
        return meta.column_names().position(|c| c == pk);
    }
    facts
        .insert_columns()
        .iter()
        .position(|c| meta.column(c).is_some_and(|column| column.name == pk))
}

// None when the database assigns the key
fn known_key(value: &InsertValue, params: &[Value], meta: &TableMeta, pk: &str) -> Result<Option<Value>> {
    match value {
        InsertValue::Value(Value::Null) => Ok(None),
        InsertValue::Value(v) => Ok(Some(v.clone())),
        InsertValue::Param(index) => {
            let v = bind_param(params, *index)?;
            Ok((!v.is_null()).then_some(v))
        }
        InsertValue::Expr(text) if text.eq_ignore_ascii_case("DEFAULT") => Ok(None),
        InsertValue::Expr(text) => Err(UndoError::UnsupportedSyntax(format!(
            "primary key '{pk}' of '{}' is computed by `{text}`",
            meta.table_name()
        ))),
    }
}

// Key tuple of every VALUES row as the statement spells it
fn written_keys(facts: &SqlFacts, meta: &TableMeta, params: &[Value]) -> Result<Vec<Vec<Option<Value>>>> {
    let pks: Vec<&str> = meta.primary_keys().collect();
    let positions: Vec<Option<usize>> = pks.iter().map(|pk| key_position(facts, meta, pk)).collect();

    let mut rows = Vec::with_capacity(facts.insert_rows().len());
    for values in facts.insert_rows() {
        let mut key = Vec::with_capacity(pks.len());
        for (pk, position) in pks.iter().zip(&positions) {
            let known = match position.and_then(|p| values.get(p)) {
                Some(value) => known_key(value, params, meta, pk)?,
                None => None,
            };
            key.push(known);
        }
        rows.push(key);
    }
    Ok(rows)
}

/// Fails unless every row names its primary key. Generated keys of a
/// multi-table insert come back as one list that cannot be split per table.
pub(super) fn require_written_keys(facts: &SqlFacts, meta: &TableMeta, params: &[Value]) -> Result<()> {
    let rows = written_keys(facts, meta, params)?;
    if rows.iter().flatten().any(Option::is_none) {
        return Err(UndoError::UnsupportedSyntax(format!(
            "primary key of '{}' must be given explicitly in a multi-table insert",
            meta.table_name()
        )));
    }
    Ok(())
}

/// Primary-key tuple of every inserted row, in VALUES order. Keys the
/// statement leaves to the database come from the executor's generated keys.
pub(super) fn inserted_keys<E: QueryExecutor + ?Sized>(
    facts: &SqlFacts,
    meta: &TableMeta,
    params: &[Value],
    executor: &mut E,
) -> Result<Vec<Vec<Value>>> {
    let pks: Vec<&str> = meta.primary_keys().collect();
    let rows = written_keys(facts, meta, params)?;

    let missing = rows.iter().filter(|key| key.iter().any(Option::is_none)).count();
    if missing == 0 {
        return Ok(rows.into_iter().map(|key| key.into_iter().flatten().collect()).collect());
    }
    if pks.len() > 1 {
        return Err(UndoError::UnsupportedSyntax(format!(
            "composite primary key of '{}' must be given explicitly",
            meta.table_name()
        )));
    }

    let generated = executor.generated_keys()?;
    if generated.len() != missing {
        return Err(UndoError::ShouldNeverHappen(format!(
            "executor returned {} generated keys for {} rows of '{}' without a key",
            generated.len(),
            missing,
            meta.table_name()
        )));
    }
    let mut generated = generated.into_iter();
    Ok(rows
        .into_iter()
        .map(|key| match key.into_iter().next().flatten() {
            Some(value) => vec![value],
            None => generated.next().into_iter().collect(),
        })
        .collect())
}

pub(super) fn after_query(
    builder: &ImageBuilder<'_>,
    facts: &SqlFacts,
    item: &ItemTable,
    meta: &TableMeta,
    keys: &[Vec<Value>],
) -> ImageQuery {
    let dialect = facts.dialect();
    let columns: Vec<String> = meta.column_names().map(str::to_string).collect();
    let pk_columns: Vec<String> = meta
        .primary_keys()
        .map(|pk| qualified(dialect, item.qualifier(), pk))
        .collect();

    let mut query = QueryBuilder::new(dialect);
    push_select_list(&mut query, dialect, item.qualifier(), &columns);
    query.push(" FROM ").push(item.table_sql()).push(" WHERE ");
    push_primary_key_condition(&mut query, &pk_columns, keys, builder.config().max_in_size);
    query.finish()
}

pub(super) fn after_image<E: QueryExecutor + ?Sized>(
    builder: &ImageBuilder<'_>,
    facts: &SqlFacts,
    item: &ItemTable,
    meta: &TableMeta,
    params: &[Value],
    executor: &mut E,
) -> Result<RowImage> {
    let keys = inserted_keys(facts, meta, params, executor)?;
    let query = after_query(builder, facts, item, meta, &keys);
    let mut image = run_image_query(executor, &query, facts.dialect(), meta)?;
    image.align_to(&keys);
    Ok(image)
}
