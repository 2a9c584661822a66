use crate::ast::*;
use crate::dialect::Dialect;
use crate::error::{Result, UndoError};

use super::{single_table_update, FragmentWriter, ItemTable, OperateRecognizer, Scope, SqlFragment, TableSet};

/// MySQL family: `UPDATE t1 JOIN t2 ON .. SET ..` and `UPDATE t1, t2 SET ..`
/// update every table owning a qualified SET target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MySqlRecognizer;

impl OperateRecognizer for MySqlRecognizer {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn extract_update_tables(&self, update: &UpdateStatement) -> Result<TableSet> {
        if update.target.is_single_table() {
            return single_table_update(Dialect::MySql, update);
        }
        if update.from.is_some() {
            return Err(UndoError::UnsupportedSyntax(
                "UPDATE .. FROM is not MySQL syntax".to_string(),
            ));
        }
        if !update.order_by.is_empty() || update.limit.is_some() {
            return Err(UndoError::UnsupportedSyntax(
                "ORDER BY and LIMIT are not allowed in a multi-table UPDATE".to_string(),
            ));
        }

        let scope = Scope::new(update.target.tables());

        // (scope index, columns) in first-reference order
        let mut owners: Vec<(usize, Vec<String>)> = Vec::new();
        for assignment in &update.assignments {
            let column = &assignment.column;
            let Some(qualifier) = &column.table else {
                return Err(UndoError::AmbiguousTableReference(format!(
                    "column '{}' is not qualified in a multi-table UPDATE",
                    column.name.value
                )));
            };
            let index = scope.resolve(qualifier)?;
            match owners.iter_mut().find(|(i, _)| *i == index) {
                Some((_, columns)) => super::push_unique(columns, &column.name.value),
                None => owners.push((index, vec![column.name.value.clone()])),
            }
        }

        let mut items: Vec<ItemTable> = Vec::with_capacity(owners.len());
        for (index, columns) in owners {
            let item = ItemTable::from_ref(Dialect::MySql, scope.tables()[index], true, columns);
            if items.iter().any(|other| other.name().eq_ignore_ascii_case(item.name())) {
                return Err(UndoError::AmbiguousTableReference(format!(
                    "table '{}' is updated through more than one reference",
                    item.name()
                )));
            }
            items.push(item);
        }

        let mut writer = FragmentWriter::new(Dialect::MySql);
        writer.write_from_clause(&update.target);
        Ok(TableSet {
            union_table: writer.finish(),
            multi_table: true,
            items,
        })
    }

    fn extract_order_by(&self, order_by: &[OrderByExpr]) -> Result<Option<SqlFragment>> {
        if order_by.is_empty() {
            return Ok(None);
        }
        let mut writer = FragmentWriter::new(Dialect::MySql);
        writer.write_order_by(order_by);
        Ok(Some(writer.finish()))
    }

    fn extract_limit(&self, limit: Option<&Limit>) -> Result<Option<SqlFragment>> {
        Ok(limit.map(|limit| {
            let mut writer = FragmentWriter::new(Dialect::MySql);
            writer.write_limit(limit);
            writer.finish()
        }))
    }
}
