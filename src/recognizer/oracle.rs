use crate::ast::*;
use crate::dialect::Dialect;
use crate::error::Result;

use super::{single_table_update, OperateRecognizer, TableSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OracleRecognizer;

impl OperateRecognizer for OracleRecognizer {
    fn dialect(&self) -> Dialect {
        Dialect::Oracle
    }

    fn extract_update_tables(&self, update: &UpdateStatement) -> Result<TableSet> {
        single_table_update(Dialect::Oracle, update)
    }

    /// `INSERT ALL INTO a .. INTO b .. SELECT ..` is one insert per INTO clause.
    fn extract_multi_insert_items<'s>(
        &self,
        stmt: &'s Statement,
    ) -> Result<Vec<&'s InsertStatement>> {
        match stmt {
            Statement::Insert(insert) => Ok(vec![insert]),
            Statement::InsertAll(insert_all) => Ok(insert_all.entries.iter().collect()),
            _ => Ok(Vec::new()),
        }
    }
}
