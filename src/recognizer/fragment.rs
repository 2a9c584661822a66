use std::fmt;

use crate::ast::*;
use crate::dialect::Dialect;
use crate::error::{Result, UndoError};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentPart {
    Sql(String),
    // 1-based placeholder index in the original statement
    Param(usize),
}

/// A piece of SQL text whose placeholders still refer to the original
/// statement's bound parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlFragment {
    parts: Vec<FragmentPart>,
}

impl SqlFragment {
    pub fn new() -> Self {
        SqlFragment { parts: Vec::new() }
    }

    pub fn sql(text: &str) -> Self {
        let mut fragment = SqlFragment::new();
        fragment.push_sql(text);
        fragment
    }

    pub fn push_sql(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(FragmentPart::Sql(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else {
            self.parts.push(FragmentPart::Sql(text.to_string()));
        }
    }

    pub fn push_param(&mut self, index: usize) {
        self.parts.push(FragmentPart::Param(index));
    }

    pub fn parts(&self) -> &[FragmentPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Text with every placeholder rendered as `?`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                FragmentPart::Sql(s) => out.push_str(s),
                FragmentPart::Param(_) => out.push('?'),
            }
        }
        out
    }

    pub fn placeholders(&self) -> Vec<usize> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                FragmentPart::Param(index) => Some(*index),
                FragmentPart::Sql(_) => None,
            })
            .collect()
    }

    /// Values for this fragment's placeholders, in textual order.
    pub fn bind(&self, params: &[Value]) -> Result<Vec<Value>> {
        self.placeholders()
            .into_iter()
            .map(|index| bind_param(params, index))
            .collect()
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

pub fn bind_param(params: &[Value], index: usize) -> Result<Value> {
    index
        .checked_sub(1)
        .and_then(|i| params.get(i))
        .cloned()
        .ok_or(UndoError::MissingParameter(index))
}

/// Renders AST nodes back to SQL. Output keeps the source token order (and
/// every parenthesized group), so the database parses it exactly as it
/// parsed the original statement.
pub struct FragmentWriter {
    dialect: Dialect,
    fragment: SqlFragment,
}

impl FragmentWriter {
    pub fn new(dialect: Dialect) -> Self {
        FragmentWriter {
            dialect,
            fragment: SqlFragment::new(),
        }
    }

    pub fn finish(self) -> SqlFragment {
        self.fragment
    }

    pub fn push_sql(&mut self, text: &str) {
        self.fragment.push_sql(text);
    }

    pub fn write_ident(&mut self, ident: &Ident) {
        if ident.quoted {
            let quoted = self.dialect.quote_identifier(&ident.value);
            self.push_sql(&quoted);
        } else {
            self.push_sql(&ident.value);
        }
    }

    pub fn write_column(&mut self, column: &ColumnRef) {
        if let Some(table) = &column.table {
            self.write_ident(table);
            self.push_sql(".");
        }
        self.write_ident(&column.name);
    }

    pub fn write_table_ref(&mut self, table: &TableRef) {
        if let Some(schema) = &table.name.schema {
            self.write_ident(schema);
            self.push_sql(".");
        }
        self.write_ident(&table.name.name);
        if let Some(alias) = &table.alias {
            self.push_sql(" ");
            self.write_ident(alias);
        }
    }

    pub fn write_from_clause(&mut self, from: &FromClause) {
        match from {
            FromClause::Table(table) => self.write_table_ref(table),
            FromClause::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                self.write_from_clause(left);
                self.push_sql(match join_type {
                    JoinType::Inner => " JOIN ",
                    JoinType::Left => " LEFT JOIN ",
                    JoinType::Right => " RIGHT JOIN ",
                    JoinType::Cross => " CROSS JOIN ",
                    JoinType::Comma => ", ",
                });
                self.write_table_ref(right);
                if let Some(condition) = condition {
                    self.push_sql(" ON ");
                    self.write_expr(condition);
                }
            }
        }
    }

    pub fn write_order_by(&mut self, order_by: &[OrderByExpr]) {
        self.push_sql("ORDER BY ");
        for (i, item) in order_by.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            self.write_expr(&item.expr);
            match item.asc {
                Some(true) => self.push_sql(" ASC"),
                Some(false) => self.push_sql(" DESC"),
                None => {}
            }
        }
    }

    pub fn write_limit(&mut self, limit: &Limit) {
        self.push_sql("LIMIT ");
        match (limit.style, &limit.offset) {
            (LimitStyle::Comma, Some(offset)) => {
                self.write_expr(offset);
                self.push_sql(", ");
                self.write_expr(&limit.count);
            }
            (_, offset) => {
                self.write_expr(&limit.count);
                if let Some(offset) = offset {
                    self.push_sql(" OFFSET ");
                    self.write_expr(offset);
                }
            }
        }
    }

    fn write_literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Integer(n) => self.push_sql(&n.to_string()),
            Literal::Decimal(d) => self.push_sql(d),
            Literal::String(s) => {
                let quoted = self.dialect.quote_string(s);
                self.push_sql(&quoted);
            }
            Literal::Boolean(true) => self.push_sql("TRUE"),
            Literal::Boolean(false) => self.push_sql("FALSE"),
            Literal::Null => self.push_sql("NULL"),
        }
    }

    fn write_list(&mut self, exprs: &[Expr]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            self.write_expr(expr);
        }
    }

    pub fn write_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(literal) => self.write_literal(literal),
            Expr::Placeholder(index) => self.fragment.push_param(*index),
            Expr::Column(column) => self.write_column(column),
            Expr::Wildcard => self.push_sql("*"),
            Expr::BinaryOp { left, op, right } => {
                self.write_expr(left);
                self.push_sql(" ");
                self.push_sql(op.as_sql());
                self.push_sql(" ");
                self.write_expr(right);
            }
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => {
                    self.push_sql("NOT ");
                    self.write_expr(expr);
                }
                UnaryOperator::Neg => {
                    // "--" would start a comment
                    if matches!(**expr, Expr::UnaryOp { op: UnaryOperator::Neg, .. }) {
                        self.push_sql("- ");
                    } else {
                        self.push_sql("-");
                    }
                    self.write_expr(expr);
                }
            },
            Expr::IsNull { expr, negated } => {
                self.write_expr(expr);
                self.push_sql(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                self.write_expr(expr);
                self.push_sql(if *negated { " NOT IN (" } else { " IN (" });
                self.write_list(list);
                self.push_sql(")");
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                self.write_expr(expr);
                self.push_sql(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.write_expr(low);
                self.push_sql(" AND ");
                self.write_expr(high);
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                self.write_expr(expr);
                self.push_sql(if *negated { " NOT LIKE " } else { " LIKE " });
                self.write_expr(pattern);
            }
            Expr::Function { name, args } => {
                self.write_ident(name);
                self.push_sql("(");
                self.write_list(args);
                self.push_sql(")");
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                self.push_sql("CASE");
                if let Some(operand) = operand {
                    self.push_sql(" ");
                    self.write_expr(operand);
                }
                for (condition, result) in branches {
                    self.push_sql(" WHEN ");
                    self.write_expr(condition);
                    self.push_sql(" THEN ");
                    self.write_expr(result);
                }
                if let Some(else_result) = else_result {
                    self.push_sql(" ELSE ");
                    self.write_expr(else_result);
                }
                self.push_sql(" END");
            }
            Expr::Cast { expr, data_type } => {
                self.push_sql("CAST(");
                self.write_expr(expr);
                self.push_sql(" AS ");
                self.push_sql(data_type);
                self.push_sql(")");
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                self.write_expr(expr);
                self.push_sql(if *negated { " NOT IN (" } else { " IN (" });
                self.write_select(subquery);
                self.push_sql(")");
            }
            Expr::Exists(subquery) => {
                self.push_sql("EXISTS (");
                self.write_select(subquery);
                self.push_sql(")");
            }
            Expr::Subquery(subquery) => {
                self.push_sql("(");
                self.write_select(subquery);
                self.push_sql(")");
            }
            Expr::Nested(inner) => {
                self.push_sql("(");
                self.write_expr(inner);
                self.push_sql(")");
            }
        }
    }

    pub fn write_select(&mut self, select: &SelectStatement) {
        self.push_sql("SELECT ");
        for (i, column) in select.columns.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            match column {
                SelectColumn::Asterisk => self.push_sql("*"),
                SelectColumn::Expr { expr, alias } => {
                    self.write_expr(expr);
                    if let Some(alias) = alias {
                        self.push_sql(" AS ");
                        self.write_ident(alias);
                    }
                }
            }
        }
        if let Some(from) = &select.from {
            self.push_sql(" FROM ");
            self.write_from_clause(from);
        }
        if let Some(predicate) = &select.where_clause {
            self.push_sql(" WHERE ");
            self.write_expr(predicate);
        }
        if !select.order_by.is_empty() {
            self.push_sql(" ");
            self.write_order_by(&select.order_by);
        }
        if let Some(limit) = &select.limit {
            self.push_sql(" ");
            self.write_limit(limit);
        }
        if select.for_update {
            self.push_sql(" FOR UPDATE");
        }
    }
}

pub fn render_expr(dialect: Dialect, expr: &Expr) -> SqlFragment {
    let mut writer = FragmentWriter::new(dialect);
    writer.write_expr(expr);
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Statement;
    use crate::parser::parse;

    fn where_of(sql: &str, dialect: Dialect) -> SqlFragment {
        let Statement::Delete(delete) = parse(sql, dialect).unwrap() else {
            panic!("expected delete");
        };
        render_expr(dialect, delete.where_clause.as_ref().unwrap())
    }

    #[test]
    fn test_render_preserves_grouping() {
        let fragment = where_of(
            "DELETE FROM t WHERE (a = 1 OR b = 2) AND c - (d - e) > 0",
            Dialect::Ansi,
        );
        assert_eq!(fragment.text(), "(a = 1 OR b = 2) AND c - (d - e) > 0");
    }

    #[test]
    fn test_render_predicate_forms() {
        let fragment = where_of(
            "DELETE FROM t WHERE a IS NOT NULL AND b NOT IN (1, 'x') AND c NOT BETWEEN 1 AND 2 AND name LIKE 'a%' AND NOT flag = TRUE",
            Dialect::Ansi,
        );
        assert_eq!(
            fragment.text(),
            "a IS NOT NULL AND b NOT IN (1, 'x') AND c NOT BETWEEN 1 AND 2 AND name LIKE 'a%' AND NOT flag = TRUE"
        );
    }

    #[test]
    fn test_render_keeps_quoted_identifiers() {
        let fragment = where_of(
            "DELETE FROM t WHERE \"Name\" = 'O''Brien' AND t.\"select\" <> 1",
            Dialect::PostgreSql,
        );
        assert_eq!(
            fragment.text(),
            "\"Name\" = 'O''Brien' AND t.\"select\" <> 1"
        );

        let fragment = where_of("DELETE FROM t WHERE `key` = 'a\\\\b'", Dialect::MySql);
        assert_eq!(fragment.text(), "`key` = 'a\\\\b'");
    }

    #[test]
    fn test_render_functions_and_negation() {
        let fragment = where_of(
            "DELETE FROM t WHERE lower(name) = 'x' AND v = - -1 AND COUNT(*) > 0",
            Dialect::Ansi,
        );
        assert_eq!(
            fragment.text(),
            "lower(name) = 'x' AND v = - -1 AND COUNT(*) > 0"
        );
    }

    #[test]
    fn test_render_subqueries_keep_placeholders() {
        let fragment = where_of(
            "DELETE FROM t WHERE id NOT IN (SELECT s.t_id FROM s WHERE s.v = $2 ORDER BY s.v LIMIT 3) AND EXISTS (SELECT * FROM u WHERE u.id = t.id) AND v > (SELECT MAX(v) AS m FROM s) AND k = $1",
            Dialect::PostgreSql,
        );
        assert_eq!(
            fragment.text(),
            "id NOT IN (SELECT s.t_id FROM s WHERE s.v = ? ORDER BY s.v LIMIT 3) AND EXISTS (SELECT * FROM u WHERE u.id = t.id) AND v > (SELECT MAX(v) AS m FROM s) AND k = ?"
        );
        assert_eq!(fragment.placeholders(), vec![2, 1]);
    }

    #[test]
    fn test_render_case_and_cast() {
        let fragment = where_of(
            "DELETE FROM t WHERE CASE WHEN a > ? THEN 1 ELSE 0 END = 1 AND CASE b WHEN 'x' THEN TRUE END AND CAST(c AS UNSIGNED INTEGER) < 5 AND offset = 2",
            Dialect::MySql,
        );
        assert_eq!(
            fragment.text(),
            "CASE WHEN a > ? THEN 1 ELSE 0 END = 1 AND CASE b WHEN 'x' THEN TRUE END AND CAST(c AS UNSIGNED INTEGER) < 5 AND offset = 2"
        );
    }

    #[test]
    fn test_placeholders_keep_statement_positions() {
        let fragment = where_of("DELETE FROM t WHERE id = $3 AND v > $1", Dialect::PostgreSql);
        assert_eq!(fragment.text(), "id = ? AND v > ?");
        assert_eq!(fragment.placeholders(), vec![3, 1]);

        let params = vec![Value::Int(10), Value::Int(20), Value::Int(30)];
        assert_eq!(
            fragment.bind(&params).unwrap(),
            vec![Value::Int(30), Value::Int(10)]
        );
        assert!(matches!(
            fragment.bind(&params[..2]),
            Err(UndoError::MissingParameter(3))
        ));
    }

    #[test]
    fn test_push_sql_merges_text() {
        let mut fragment = SqlFragment::sql("a = ");
        fragment.push_param(1);
        fragment.push_sql(" AND ");
        fragment.push_sql("b = 2");
        assert_eq!(fragment.parts().len(), 3);
        assert_eq!(fragment.to_string(), "a = ? AND b = 2");
    }
}
