use anyhow::{bail, Result};

use crate::ast::*;
use crate::dialect::Dialect;
use crate::lexer::Token;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> &Token {
        self.pos += 1;
        self.tokens.get(self.pos - 1).unwrap_or(&Token::Eof)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let token = self.peek().clone();
        if token == expected {
            self.advance();
            Ok(())
        } else {
            bail!("expected {expected:?}, got {token:?}");
        }
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn parse(&mut self) -> Result<Statement> {
        let stmt = match self.peek() {
            Token::Select => Statement::Select(self.parse_select()?),
            Token::Insert => self.parse_insert()?,
            Token::Update => self.parse_update()?,
            Token::Delete => self.parse_delete()?,
            _ => bail!("unexpected token: {:?}", self.peek()),
        };

        // Optional semicolon
        self.consume(&Token::Semicolon);

        if self.peek() != &Token::Eof {
            bail!("unexpected trailing token: {:?}", self.peek());
        }

        Ok(stmt)
    }

    fn parse_select(&mut self) -> Result<SelectStatement> {
        self.expect(Token::Select)?;

        // Parse column list
        let mut columns = Vec::new();
        loop {
            if self.consume(&Token::Asterisk) {
                columns.push(SelectColumn::Asterisk);
            } else {
                let expr = self.parse_expr()?;
                let alias = self.parse_optional_alias()?;
                columns.push(SelectColumn::Expr { expr, alias });
            }

            if !self.consume(&Token::Comma) {
                break;
            }
        }

        let from = if self.consume(&Token::From) {
            Some(self.parse_from_clause()?)
        } else {
            None
        };

        let where_clause = self.parse_optional_where()?;
        let order_by = self.parse_optional_order_by()?;
        let limit = self.parse_optional_limit()?;

        let for_update = if self.consume(&Token::For) {
            self.expect(Token::Update)?;
            true
        } else {
            false
        };

        Ok(SelectStatement {
            columns,
            from,
            where_clause,
            order_by,
            limit,
            for_update,
        })
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect(Token::Insert)?;

        if self.consume(&Token::All) {
            return self.parse_insert_all();
        }
        if matches!(self.peek(), Token::Ident(s) if s.eq_ignore_ascii_case("FIRST")) {
            bail!("conditional multi-table insert is not supported");
        }

        self.expect(Token::Into)?;
        let table = self.parse_table_ref()?;
        let columns = self.parse_optional_column_list()?;

        if self.peek() == &Token::Select {
            bail!("INSERT ... SELECT is not supported");
        }
        self.expect(Token::Values)?;

        let mut rows = Vec::new();
        loop {
            rows.push(self.parse_value_row()?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }

        Ok(Statement::Insert(InsertStatement {
            table,
            columns,
            rows,
        }))
    }

    fn parse_insert_all(&mut self) -> Result<Statement> {
        let mut entries = Vec::new();
        loop {
            match self.peek() {
                Token::Into => {
                    self.advance();
                    let table = self.parse_table_ref()?;
                    let columns = self.parse_optional_column_list()?;
                    if self.peek() != &Token::Values {
                        bail!("INTO clause without VALUES is not supported");
                    }
                    self.advance();
                    let row = self.parse_value_row()?;
                    entries.push(InsertStatement {
                        table,
                        columns,
                        rows: vec![row],
                    });
                }
                Token::When => bail!("conditional multi-table insert is not supported"),
                _ => break,
            }
        }

        if entries.is_empty() {
            bail!("INSERT ALL requires at least one INTO clause");
        }

        let source = self.parse_select()?;
        Ok(Statement::InsertAll(InsertAllStatement {
            entries,
            source: Box::new(source),
        }))
    }

    fn parse_optional_column_list(&mut self) -> Result<Vec<Ident>> {
        let mut columns = Vec::new();
        if self.consume(&Token::LParen) {
            loop {
                columns.push(self.parse_ident()?);
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        Ok(columns)
    }

    fn parse_value_row(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LParen)?;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_expr()?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(values)
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect(Token::Delete)?;
        self.expect(Token::From)?;
        let table = self.parse_table_ref()?;

        let where_clause = self.parse_optional_where()?;
        let order_by = self.parse_optional_order_by()?;
        let limit = self.parse_optional_limit()?;

        Ok(Statement::Delete(DeleteStatement {
            table,
            where_clause,
            order_by,
            limit,
        }))
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.expect(Token::Update)?;
        let target = self.parse_from_clause()?;
        self.expect(Token::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.parse_column_ref()?;
            self.expect(Token::Eq)?;
            let value = self.parse_expr()?;
            assignments.push(Assignment { column, value });

            if !self.consume(&Token::Comma) {
                break;
            }
        }

        let from = if self.consume(&Token::From) {
            Some(self.parse_from_clause()?)
        } else {
            None
        };

        let where_clause = self.parse_optional_where()?;
        let order_by = self.parse_optional_order_by()?;
        let limit = self.parse_optional_limit()?;

        Ok(Statement::Update(UpdateStatement {
            target,
            assignments,
            from,
            where_clause,
            order_by,
            limit,
        }))
    }

    fn parse_optional_where(&mut self) -> Result<Option<Expr>> {
        if self.consume(&Token::Where) {
            Ok(Some(self.parse_expr()?))
        } else {
            Ok(None)
        }
    }

    fn parse_optional_order_by(&mut self) -> Result<Vec<OrderByExpr>> {
        let mut order_by = Vec::new();
        if self.consume(&Token::Order) {
            self.expect(Token::By)?;
            loop {
                let expr = self.parse_expr()?;
                let asc = if self.consume(&Token::Asc) {
                    Some(true)
                } else if self.consume(&Token::Desc) {
                    Some(false)
                } else {
                    None
                };
                order_by.push(OrderByExpr { expr, asc });

                if !self.consume(&Token::Comma) {
                    break;
                }
            }
        }
        Ok(order_by)
    }

    fn parse_optional_limit(&mut self) -> Result<Option<Limit>> {
        if !self.consume(&Token::Limit) {
            return Ok(None);
        }
        let first = self.parse_additive()?;
        if self.consume(&Token::Comma) {
            let count = self.parse_additive()?;
            return Ok(Some(Limit {
                count,
                offset: Some(first),
                style: LimitStyle::Comma,
            }));
        }
        let offset = if self.consume(&Token::Offset) {
            Some(self.parse_additive()?)
        } else {
            None
        };
        Ok(Some(Limit {
            count: first,
            offset,
            style: LimitStyle::Offset,
        }))
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        match self.peek().clone() {
            Token::Ident(s) => {
                self.advance();
                Ok(Ident::new(s))
            }
            Token::QuotedIdent(s) => {
                self.advance();
                Ok(Ident::quoted(s))
            }
            token => match non_reserved(&token) {
                Some(word) => {
                    self.advance();
                    Ok(Ident::new(word))
                }
                None => bail!("expected identifier, got {token:?}"),
            },
        }
    }

    fn parse_optional_alias(&mut self) -> Result<Option<Ident>> {
        if self.consume(&Token::As) {
            return Ok(Some(self.parse_ident()?));
        }
        // Keywords are separate tokens, so any identifier here is an alias
        match self.peek() {
            Token::Ident(_) | Token::QuotedIdent(_) => Ok(Some(self.parse_ident()?)),
            _ => Ok(None),
        }
    }

    fn parse_column_ref(&mut self) -> Result<ColumnRef> {
        let first = self.parse_ident()?;
        if self.consume(&Token::Dot) {
            let name = self.parse_ident()?;
            Ok(ColumnRef {
                table: Some(first),
                name,
            })
        } else {
            Ok(ColumnRef {
                table: None,
                name: first,
            })
        }
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let first = self.parse_ident()?;
        let name = if self.consume(&Token::Dot) {
            ObjectName {
                schema: Some(first),
                name: self.parse_ident()?,
            }
        } else {
            ObjectName {
                schema: None,
                name: first,
            }
        };
        let alias = self.parse_optional_alias()?;
        Ok(TableRef { name, alias })
    }

    fn parse_from_clause(&mut self) -> Result<FromClause> {
        // Parse first table
        let table_ref = self.parse_table_ref()?;
        let mut from = FromClause::Table(table_ref);

        // Parse optional JOINs (supports multiple joins: t1 JOIN t2 ON ... JOIN t3 ON ...)
        loop {
            let join_type = match self.peek() {
                Token::Comma => {
                    self.advance();
                    JoinType::Comma
                }
                Token::Join => {
                    self.advance();
                    JoinType::Inner
                }
                Token::Inner => {
                    self.advance();
                    self.expect(Token::Join)?;
                    JoinType::Inner
                }
                Token::Cross => {
                    self.advance();
                    self.expect(Token::Join)?;
                    JoinType::Cross
                }
                Token::Left | Token::Right => {
                    let join_type = if self.advance() == &Token::Left {
                        JoinType::Left
                    } else {
                        JoinType::Right
                    };
                    self.consume(&Token::Outer);
                    self.expect(Token::Join)?;
                    join_type
                }
                _ => break,
            };

            // Parse right table
            let right = self.parse_table_ref()?;

            // Parse ON condition
            let condition = match join_type {
                JoinType::Comma | JoinType::Cross => None,
                _ => {
                    self.expect(Token::On)?;
                    Some(self.parse_expr()?)
                }
            };

            from = FromClause::Join {
                left: Box::new(from),
                right,
                join_type,
                condition,
            };
        }

        Ok(from)
    }

    // Expression parsing with precedence
    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.consume(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.consume(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.consume(&Token::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;

        if self.consume(&Token::Is) {
            let negated = self.consume(&Token::Not);
            self.expect(Token::Null)?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated = match (self.peek(), self.peek_nth(1)) {
            (Token::Not, Token::In | Token::Between | Token::Like) => {
                self.advance();
                true
            }
            _ => false,
        };

        match self.peek() {
            Token::In => {
                self.advance();
                self.expect(Token::LParen)?;
                if self.peek() == &Token::Select {
                    let subquery = self.parse_select()?;
                    self.expect(Token::RParen)?;
                    return Ok(Expr::InSubquery {
                        expr: Box::new(left),
                        subquery: Box::new(subquery),
                        negated,
                    });
                }
                let mut list = Vec::new();
                loop {
                    list.push(self.parse_expr()?);
                    if !self.consume(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RParen)?;
                return Ok(Expr::InList {
                    expr: Box::new(left),
                    list,
                    negated,
                });
            }
            Token::Between => {
                self.advance();
                let low = self.parse_additive()?;
                self.expect(Token::And)?;
                let high = self.parse_additive()?;
                return Ok(Expr::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                });
            }
            Token::Like => {
                self.advance();
                let pattern = self.parse_additive()?;
                return Ok(Expr::Like {
                    expr: Box::new(left),
                    pattern: Box::new(pattern),
                    negated,
                });
            }
            _ => {}
        }

        let op = match self.peek() {
            Token::Eq => BinaryOperator::Eq,
            Token::Ne => BinaryOperator::Ne,
            Token::Lt => BinaryOperator::Lt,
            Token::Le => BinaryOperator::Le,
            Token::Gt => BinaryOperator::Gt,
            Token::Ge => BinaryOperator::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;

        Ok(Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                Token::Concat => BinaryOperator::Concat,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Asterisk => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                Token::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.consume(&Token::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Neg,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Integer(n)))
            }
            Token::Decimal(d) => {
                self.advance();
                Ok(Expr::Literal(Literal::Decimal(d)))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false)))
            }
            Token::Placeholder(n) => {
                self.advance();
                Ok(Expr::Placeholder(n))
            }
            Token::Ident(name) if name.eq_ignore_ascii_case("CAST") && self.peek_nth(1) == &Token::LParen => {
                self.parse_cast()
            }
            Token::Ident(_) | Token::QuotedIdent(_) => {
                if self.peek_nth(1) == &Token::LParen {
                    return self.parse_function();
                }
                Ok(Expr::Column(self.parse_column_ref()?))
            }
            Token::Offset | Token::End => Ok(Expr::Column(self.parse_column_ref()?)),
            Token::Case => self.parse_case(),
            Token::Exists => {
                self.advance();
                self.expect(Token::LParen)?;
                let subquery = self.parse_select()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Exists(Box::new(subquery)))
            }
            Token::LParen => {
                self.advance();
                if self.peek() == &Token::Select {
                    let subquery = self.parse_select()?;
                    self.expect(Token::RParen)?;
                    return Ok(Expr::Subquery(Box::new(subquery)));
                }
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }
            _ => bail!("unexpected token in expression: {:?}", self.peek()),
        }
    }

    // CASE [operand] WHEN .. THEN .. [ELSE ..] END
    fn parse_case(&mut self) -> Result<Expr> {
        self.expect(Token::Case)?;
        let operand = if self.peek() == &Token::When {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut branches = Vec::new();
        while self.consume(&Token::When) {
            let condition = self.parse_expr()?;
            self.expect(Token::Then)?;
            let result = self.parse_expr()?;
            branches.push((condition, result));
        }
        if branches.is_empty() {
            bail!("CASE requires at least one WHEN branch");
        }

        let else_result = if self.consume(&Token::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect(Token::End)?;

        Ok(Expr::Case {
            operand,
            branches,
            else_result,
        })
    }

    fn parse_cast(&mut self) -> Result<Expr> {
        self.advance();
        self.expect(Token::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(Token::As)?;

        // Type words, then an optional precision list
        let mut words = Vec::new();
        while let Token::Ident(word) = self.peek().clone() {
            self.advance();
            words.push(word);
        }
        if words.is_empty() {
            bail!("expected type name in CAST, got {:?}", self.peek());
        }
        let mut data_type = words.join(" ");
        if self.consume(&Token::LParen) {
            let mut sizes = Vec::new();
            loop {
                match self.advance().clone() {
                    Token::Integer(n) => sizes.push(n.to_string()),
                    token => bail!("expected type size, got {token:?}"),
                }
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
            data_type = format!("{data_type}({})", sizes.join(", "));
        }
        self.expect(Token::RParen)?;

        Ok(Expr::Cast {
            expr: Box::new(expr),
            data_type,
        })
    }

    fn parse_function(&mut self) -> Result<Expr> {
        let name = self.parse_ident()?;
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.consume(&Token::RParen) {
            loop {
                if self.consume(&Token::Asterisk) {
                    args.push(Expr::Wildcard);
                } else {
                    args.push(self.parse_expr()?);
                }
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        Ok(Expr::Function { name, args })
    }
}

// Keywords MySQL still accepts as bare column names
fn non_reserved(token: &Token) -> Option<&'static str> {
    match token {
        Token::Offset => Some("offset"),
        Token::End => Some("end"),
        _ => None,
    }
}

pub fn parse(sql: &str, dialect: Dialect) -> Result<Statement> {
    let tokens = crate::lexer::tokenize(sql, dialect)?;
    let mut parser = Parser::new(tokens);
    parser.parse()
}
