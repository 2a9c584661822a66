use crate::ast::*;
use crate::dialect::Dialect;
use crate::error::{Result, UndoError};

use super::{assigned_columns, FragmentWriter, ItemTable, OperateRecognizer, Scope, TableSet};

/// PostgreSQL joins through `UPDATE target SET .. FROM others WHERE ..`; the
/// target is the only table whose rows change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostgresRecognizer;

impl OperateRecognizer for PostgresRecognizer {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    fn extract_update_tables(&self, update: &UpdateStatement) -> Result<TableSet> {
        let FromClause::Table(target) = &update.target else {
            return Err(UndoError::UnsupportedSyntax(
                "PostgreSQL UPDATE takes one target table; join through FROM".to_string(),
            ));
        };
        if let Some(column) = update.assignments.iter().find_map(|a| a.column.table.as_ref()) {
            return Err(UndoError::UnsupportedSyntax(format!(
                "SET target qualified with '{}'; PostgreSQL SET columns are never qualified",
                column.value
            )));
        }
        let columns = assigned_columns(update.assignments.iter());

        let Some(from) = &update.from else {
            return Ok(TableSet::single(Dialect::PostgreSql, target, columns));
        };

        let mut tables = vec![target];
        tables.extend(from.tables());
        // The target's visible name must not be shadowed by a FROM entry
        Scope::new(tables).resolve(target.qualifier())?;

        let mut writer = FragmentWriter::new(Dialect::PostgreSql);
        writer.write_table_ref(target);
        writer.push_sql(", ");
        writer.write_from_clause(from);
        Ok(TableSet {
            union_table: writer.finish(),
            multi_table: true,
            items: vec![ItemTable::from_ref(Dialect::PostgreSql, target, true, columns)],
        })
    }
}
