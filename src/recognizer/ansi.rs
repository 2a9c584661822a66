use crate::ast::*;
use crate::dialect::Dialect;
use crate::error::Result;

use super::{single_table_update, OperateRecognizer, TableSet};

/// Fallback for databases without a dedicated recognizer: single-table
/// statements in standard syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnsiRecognizer;

impl OperateRecognizer for AnsiRecognizer {
    fn dialect(&self) -> Dialect {
        Dialect::Ansi
    }

    fn extract_update_tables(&self, update: &UpdateStatement) -> Result<TableSet> {
        single_table_update(Dialect::Ansi, update)
    }
}
