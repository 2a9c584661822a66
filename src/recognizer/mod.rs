mod ansi;
mod fragment;
mod mysql;
mod oracle;
mod postgres;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ast::*;
use crate::dialect::Dialect;
use crate::error::{Result, UndoError};
use crate::parser;
use crate::value::Value;

pub use ansi::AnsiRecognizer;
pub use fragment::{bind_param, render_expr, FragmentPart, FragmentWriter, SqlFragment};
pub use mysql::MySqlRecognizer;
pub use oracle::OracleRecognizer;
pub use postgres::PostgresRecognizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlKind {
    Insert,
    Update,
    Delete,
    SelectForUpdate,
}

/// A physical table whose rows the statement mutates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTable {
    name: String,
    alias: Option<String>,
    // Rendered prefix for this table's columns inside the union table
    qualifier: Option<String>,
    // Rendered `name [alias]`
    table_sql: String,
    update_columns: Vec<String>,
}

impl ItemTable {
    /// `qualify` forces a column qualifier even without an alias, which a
    /// multi-table union needs.
    pub fn from_ref(
        dialect: Dialect,
        table: &TableRef,
        qualify: bool,
        update_columns: Vec<String>,
    ) -> Self {
        let qualifier = if qualify || table.alias.is_some() {
            let mut writer = FragmentWriter::new(dialect);
            writer.write_ident(table.qualifier());
            Some(writer.finish().text())
        } else {
            None
        };
        let mut writer = FragmentWriter::new(dialect);
        writer.write_table_ref(table);
        ItemTable {
            name: table.name.lookup_name(),
            alias: table.alias.as_ref().map(|a| a.value.clone()),
            qualifier,
            table_sql: writer.finish().text(),
            update_columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn table_sql(&self) -> &str {
        &self.table_sql
    }

    pub fn update_columns(&self) -> &[String] {
        &self.update_columns
    }
}

/// How a statement decomposes into the FROM target of image queries and the
/// tables whose rows it changes.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSet {
    pub union_table: SqlFragment,
    pub multi_table: bool,
    pub items: Vec<ItemTable>,
}

impl TableSet {
    pub fn single(dialect: Dialect, table: &TableRef, update_columns: Vec<String>) -> Self {
        let mut writer = FragmentWriter::new(dialect);
        writer.write_table_ref(table);
        TableSet {
            union_table: writer.finish(),
            multi_table: false,
            items: vec![ItemTable::from_ref(dialect, table, false, update_columns)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertValue {
    Value(Value),
    Param(usize),
    // Evaluated by the database (functions, DEFAULT, column references)
    Expr(String),
}

/// Structural facts about one statement, enough to rebuild its before and
/// after image queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFacts {
    kind: SqlKind,
    dialect: Dialect,
    sql: String,
    union_table: SqlFragment,
    multi_table: bool,
    items: Vec<ItemTable>,
    update_columns: Vec<String>,
    predicate: Option<SqlFragment>,
    order_by: Option<SqlFragment>,
    limit: Option<SqlFragment>,
    insert_columns: Vec<String>,
    insert_rows: Vec<Vec<InsertValue>>,
}

impl SqlFacts {
    pub(crate) fn new(kind: SqlKind, dialect: Dialect, sql: &str) -> Self {
        SqlFacts {
            kind,
            dialect,
            sql: sql.to_string(),
            union_table: SqlFragment::new(),
            multi_table: false,
            items: Vec::new(),
            update_columns: Vec::new(),
            predicate: None,
            order_by: None,
            limit: None,
            insert_columns: Vec::new(),
            insert_rows: Vec::new(),
        }
    }

    fn with_tables(mut self, tables: TableSet) -> Self {
        self.union_table = tables.union_table;
        self.multi_table = tables.multi_table;
        self.items = tables.items;
        self
    }

    pub fn kind(&self) -> SqlKind {
        self.kind
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// First item table, or "" when the statement names none.
    pub fn table_name(&self) -> &str {
        self.items.first().map(|item| item.name()).unwrap_or("")
    }

    pub fn union_table(&self) -> &SqlFragment {
        &self.union_table
    }

    pub fn is_multi_table(&self) -> bool {
        self.multi_table
    }

    pub fn item_tables(&self) -> &[ItemTable] {
        &self.items
    }

    pub fn item_table(&self, name: &str) -> Option<&ItemTable> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn update_columns(&self) -> &[String] {
        &self.update_columns
    }

    pub fn predicate(&self) -> Option<&SqlFragment> {
        self.predicate.as_ref()
    }

    pub fn order_by(&self) -> Option<&SqlFragment> {
        self.order_by.as_ref()
    }

    pub fn limit(&self) -> Option<&SqlFragment> {
        self.limit.as_ref()
    }

    /// Columns named by the INSERT; empty means every declared column in order.
    pub fn insert_columns(&self) -> &[String] {
        &self.insert_columns
    }

    pub fn insert_rows(&self) -> &[Vec<InsertValue>] {
        &self.insert_rows
    }

    /// Facts restricted to one item table, for callers that split a
    /// multi-table statement into per-table executors.
    pub fn for_item_table(&self, name: &str) -> Option<SqlFacts> {
        let item = self.item_table(name)?.clone();
        let mut facts = self.clone();
        facts.update_columns = item.update_columns.clone();
        facts.items = vec![item];
        Some(facts)
    }
}

/// Capability set every dialect recognizer provides. Only UPDATE table
/// decomposition is dialect policy everywhere; the rest have shared defaults.
pub trait OperateRecognizer {
    fn dialect(&self) -> Dialect;

    fn extract_update_tables(&self, update: &UpdateStatement) -> Result<TableSet>;

    fn extract_tables(&self, stmt: &Statement) -> Result<TableSet> {
        let dialect = self.dialect();
        match stmt {
            Statement::Update(update) => self.extract_update_tables(update),
            Statement::Delete(delete) => Ok(TableSet::single(dialect, &delete.table, Vec::new())),
            Statement::Insert(insert) => Ok(TableSet::single(dialect, &insert.table, Vec::new())),
            Statement::Select(select) => match &select.from {
                Some(from) => {
                    let tables = from.tables();
                    let multi_table = tables.len() > 1;
                    let mut writer = FragmentWriter::new(dialect);
                    writer.write_from_clause(from);
                    Ok(TableSet {
                        union_table: writer.finish(),
                        multi_table,
                        items: tables
                            .into_iter()
                            .map(|t| ItemTable::from_ref(dialect, t, multi_table, Vec::new()))
                            .collect(),
                    })
                }
                None => Ok(TableSet {
                    union_table: SqlFragment::new(),
                    multi_table: false,
                    items: Vec::new(),
                }),
            },
            Statement::InsertAll(_) => Err(UndoError::UnsupportedSyntax(
                "INSERT ALL has one table set per INTO clause".to_string(),
            )),
        }
    }

    /// Assigned column names, unqualified, first occurrence wins.
    fn extract_update_columns(&self, update: &UpdateStatement) -> Result<Vec<String>> {
        Ok(assigned_columns(update.assignments.iter()))
    }

    fn extract_predicate(&self, where_clause: Option<&Expr>) -> Result<Option<SqlFragment>> {
        Ok(where_clause.map(|expr| render_expr(self.dialect(), expr)))
    }

    fn extract_order_by(&self, order_by: &[OrderByExpr]) -> Result<Option<SqlFragment>> {
        if order_by.is_empty() {
            return Ok(None);
        }
        Err(UndoError::UnsupportedSyntax(format!(
            "ORDER BY on a data change statement is not supported for {}",
            self.dialect()
        )))
    }

    fn extract_limit(&self, limit: Option<&Limit>) -> Result<Option<SqlFragment>> {
        match limit {
            None => Ok(None),
            Some(_) => Err(UndoError::UnsupportedSyntax(format!(
                "LIMIT on a data change statement is not supported for {}",
                self.dialect()
            ))),
        }
    }

    fn extract_multi_insert_items<'s>(
        &self,
        stmt: &'s Statement,
    ) -> Result<Vec<&'s InsertStatement>> {
        match stmt {
            Statement::Insert(insert) => Ok(vec![insert]),
            Statement::InsertAll(_) => Err(UndoError::UnsupportedSyntax(format!(
                "INSERT ALL is not supported for {}",
                self.dialect()
            ))),
            _ => Ok(Vec::new()),
        }
    }
}

pub(crate) fn assigned_columns<'a>(assignments: impl Iterator<Item = &'a Assignment>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for assignment in assignments {
        push_unique(&mut columns, &assignment.column.name.value);
    }
    columns
}

fn push_unique(columns: &mut Vec<String>, name: &str) {
    if !columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        columns.push(name.to_string());
    }
}

fn ident_eq(a: &Ident, b: &Ident) -> bool {
    if a.quoted || b.quoted {
        a.value == b.value
    } else {
        a.value.eq_ignore_ascii_case(&b.value)
    }
}

// Tables visible to column qualifiers of one statement
pub(crate) struct Scope<'a> {
    tables: Vec<&'a TableRef>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(tables: Vec<&'a TableRef>) -> Self {
        Scope { tables }
    }

    pub(crate) fn tables(&self) -> &[&'a TableRef] {
        &self.tables
    }

    // An aliased table is only visible through its alias
    pub(crate) fn resolve(&self, qualifier: &Ident) -> Result<usize> {
        let matches: Vec<usize> = self
            .tables
            .iter()
            .enumerate()
            .filter(|(_, table)| ident_eq(table.qualifier(), qualifier))
            .map(|(i, _)| i)
            .collect();
        match matches.as_slice() {
            [index] => Ok(*index),
            [] => Err(UndoError::AmbiguousTableReference(format!(
                "'{}' does not name a table of the statement",
                qualifier.value
            ))),
            _ => Err(UndoError::AmbiguousTableReference(format!(
                "'{}' names more than one table of the statement",
                qualifier.value
            ))),
        }
    }
}

/// Table set of a single-table UPDATE; qualified SET targets must name the target.
pub(crate) fn single_table_update(dialect: Dialect, update: &UpdateStatement) -> Result<TableSet> {
    let FromClause::Table(table) = &update.target else {
        return Err(UndoError::UnsupportedSyntax(format!(
            "multi-table UPDATE is not supported for {dialect}"
        )));
    };
    if update.from.is_some() {
        return Err(UndoError::UnsupportedSyntax(format!(
            "UPDATE .. FROM is not supported for {dialect}"
        )));
    }
    let scope = Scope::new(vec![table]);
    for assignment in &update.assignments {
        if let Some(qualifier) = &assignment.column.table {
            scope.resolve(qualifier)?;
        }
    }
    Ok(TableSet::single(
        dialect,
        table,
        assigned_columns(update.assignments.iter()),
    ))
}

fn insert_facts(dialect: Dialect, sql: &str, insert: &InsertStatement) -> Result<SqlFacts> {
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.clone()).collect();
    let mut rows = Vec::with_capacity(insert.rows.len());
    for row in &insert.rows {
        if !columns.is_empty() && row.len() != columns.len() {
            return Err(UndoError::UnsupportedSyntax(format!(
                "INSERT into '{}' lists {} columns but a row has {} values",
                insert.table.name.lookup_name(),
                columns.len(),
                row.len()
            )));
        }
        rows.push(row.iter().map(|expr| insert_value(dialect, expr)).collect());
    }

    let mut facts = SqlFacts::new(SqlKind::Insert, dialect, sql)
        .with_tables(TableSet::single(dialect, &insert.table, Vec::new()));
    facts.insert_columns = columns;
    facts.insert_rows = rows;
    Ok(facts)
}

fn insert_value(dialect: Dialect, expr: &Expr) -> InsertValue {
    match expr {
        Expr::Placeholder(index) => InsertValue::Param(*index),
        Expr::Literal(literal) => InsertValue::Value(literal_value(literal)),
        Expr::UnaryOp {
            op: UnaryOperator::Neg,
            expr: inner,
        } => match &**inner {
            Expr::Literal(Literal::Integer(n)) => InsertValue::Value(Value::Int(-n)),
            Expr::Literal(Literal::Decimal(d)) => InsertValue::Value(Value::Decimal(format!("-{d}"))),
            _ => InsertValue::Expr(render_expr(dialect, expr).text()),
        },
        _ => InsertValue::Expr(render_expr(dialect, expr).text()),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(n) => Value::Int(*n),
        Literal::Decimal(d) => Value::Decimal(d.clone()),
        Literal::String(s) => Value::Text(s.clone()),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

/// Parse `sql` and extract one fact set per data change it performs. Plain
/// SELECTs yield nothing.
pub fn recognize_with<R: OperateRecognizer>(recognizer: &R, sql: &str) -> Result<Vec<SqlFacts>> {
    let dialect = recognizer.dialect();
    let stmt =
        parser::parse(sql, dialect).map_err(|e| UndoError::UnsupportedSyntax(e.to_string()))?;

    let facts = match &stmt {
        Statement::Select(select) if !select.for_update => Vec::new(),
        Statement::Select(select) => {
            let mut facts = SqlFacts::new(SqlKind::SelectForUpdate, dialect, sql)
                .with_tables(recognizer.extract_tables(&stmt)?);
            facts.predicate = recognizer.extract_predicate(select.where_clause.as_ref())?;
            vec![facts]
        }
        Statement::Update(update) => {
            let mut facts = SqlFacts::new(SqlKind::Update, dialect, sql)
                .with_tables(recognizer.extract_tables(&stmt)?);
            facts.update_columns = recognizer.extract_update_columns(update)?;
            facts.predicate = recognizer.extract_predicate(update.where_clause.as_ref())?;
            facts.order_by = recognizer.extract_order_by(&update.order_by)?;
            facts.limit = recognizer.extract_limit(update.limit.as_ref())?;
            vec![facts]
        }
        Statement::Delete(delete) => {
            let mut facts = SqlFacts::new(SqlKind::Delete, dialect, sql)
                .with_tables(recognizer.extract_tables(&stmt)?);
            facts.predicate = recognizer.extract_predicate(delete.where_clause.as_ref())?;
            facts.order_by = recognizer.extract_order_by(&delete.order_by)?;
            facts.limit = recognizer.extract_limit(delete.limit.as_ref())?;
            vec![facts]
        }
        Statement::Insert(_) | Statement::InsertAll(_) => recognizer
            .extract_multi_insert_items(&stmt)?
            .into_iter()
            .map(|insert| insert_facts(dialect, sql, insert))
            .collect::<Result<Vec<_>>>()?,
    };

    for f in &facts {
        trace!(
            dialect = %dialect,
            kind = ?f.kind(),
            table = f.table_name(),
            items = f.item_tables().len(),
            update_columns = ?f.update_columns(),
            "recognized statement"
        );
    }
    Ok(facts)
}

/// Closed set of dialect recognizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlRecognizer {
    MySql(MySqlRecognizer),
    PostgreSql(PostgresRecognizer),
    Oracle(OracleRecognizer),
    Ansi(AnsiRecognizer),
}

impl SqlRecognizer {
    pub fn dialect(&self) -> Dialect {
        match self {
            SqlRecognizer::MySql(r) => r.dialect(),
            SqlRecognizer::PostgreSql(r) => r.dialect(),
            SqlRecognizer::Oracle(r) => r.dialect(),
            SqlRecognizer::Ansi(r) => r.dialect(),
        }
    }

    pub fn recognize(&self, sql: &str) -> Result<Vec<SqlFacts>> {
        match self {
            SqlRecognizer::MySql(r) => recognize_with(r, sql),
            SqlRecognizer::PostgreSql(r) => recognize_with(r, sql),
            SqlRecognizer::Oracle(r) => recognize_with(r, sql),
            SqlRecognizer::Ansi(r) => recognize_with(r, sql),
        }
    }
}

pub struct RecognizerRegistry;

impl RecognizerRegistry {
    pub fn lookup(dialect: Dialect) -> SqlRecognizer {
        match dialect {
            Dialect::MySql => SqlRecognizer::MySql(MySqlRecognizer),
            Dialect::PostgreSql => SqlRecognizer::PostgreSql(PostgresRecognizer),
            Dialect::Oracle => SqlRecognizer::Oracle(OracleRecognizer),
            Dialect::Ansi => SqlRecognizer::Ansi(AnsiRecognizer),
        }
    }

    /// Resolve a connection's dialect name; unknown names fail with
    /// `UnsupportedDialect`.
    pub fn by_name(name: &str) -> Result<SqlRecognizer> {
        Ok(Self::lookup(name.parse()?))
    }
}
