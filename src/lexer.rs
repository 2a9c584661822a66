use anyhow::{bail, Result};

use crate::dialect::Dialect;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Delete,
    Update,
    Set,
    And,
    Or,
    Not,
    Null,
    True,
    False,
    Join,
    Inner,
    Left,
    Right,
    Outer,
    Cross,
    On,
    As,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    For,
    In,
    Is,
    Like,
    Between,
    All,
    When,
    Case,
    Then,
    Else,
    End,
    Exists,

    // Identifiers and literals
    Ident(String),
    QuotedIdent(String),
    Integer(i64),
    Decimal(String),
    String(String),
    // 1-based index into the statement's bound parameters
    Placeholder(usize),

    // Symbols
    Asterisk,  // *
    Comma,     // ,
    Semicolon, // ;
    LParen,    // (
    RParen,    // )
    Dot,       // .
    Eq,        // =
    Ne,        // <> or !=
    Lt,        // <
    Le,        // <=
    Gt,        // >
    Ge,        // >=
    Plus,      // +
    Minus,     // -
    Slash,     // /
    Percent,   // %
    Concat,    // ||

    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    dialect: Dialect,
    placeholder_count: usize,
}

impl Lexer {
    pub fn new(input: &str, dialect: Dialect) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            dialect,
            placeholder_count: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        self.pos += 1;
        ch
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek_next()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.advance();
                }
                (Some('-'), Some('-')) => {
                    while let Some(ch) = self.advance() {
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    self.advance();
                    self.advance();
                    loop {
                        match (self.peek(), self.peek_next()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => bail!("unterminated block comment"),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments()?;

        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        let quote = self.dialect.identifier_quote();
        let token = match ch {
            '*' => {
                self.advance();
                Token::Asterisk
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            ';' => {
                self.advance();
                Token::Semicolon
            }
            '(' => {
                self.advance();
                Token::LParen
            }
            ')' => {
                self.advance();
                Token::RParen
            }
            '.' => {
                self.advance();
                Token::Dot
            }
            '+' => {
                self.advance();
                Token::Plus
            }
            '-' => {
                self.advance();
                Token::Minus
            }
            '/' => {
                self.advance();
                Token::Slash
            }
            '%' => {
                self.advance();
                Token::Percent
            }
            '=' => {
                self.advance();
                Token::Eq
            }
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Ne
                } else {
                    bail!("unexpected character: !")
                }
            }
            '|' => {
                self.advance();
                if self.peek() == Some('|') {
                    self.advance();
                    Token::Concat
                } else {
                    bail!("unexpected character: |")
                }
            }
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Le
                } else if self.peek() == Some('>') {
                    self.advance();
                    Token::Ne
                } else {
                    Token::Lt
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '?' => {
                self.advance();
                self.placeholder_count += 1;
                Token::Placeholder(self.placeholder_count)
            }
            '$' if self.dialect == Dialect::PostgreSql => self.read_numbered_placeholder()?,
            ':' if self.dialect == Dialect::Oracle => self.read_oracle_placeholder()?,
            '\'' => self.read_string('\'')?,
            '"' if self.dialect == Dialect::MySql => self.read_string('"')?,
            _ if ch == quote => self.read_quoted_ident(quote)?,
            _ if ch.is_ascii_digit() => self.read_number()?,
            _ if ch.is_alphabetic() || ch == '_' => self.read_ident_or_keyword()?,
            _ => bail!("unexpected character: {ch}"),
        };

        Ok(token)
    }

    fn read_string(&mut self, delimiter: char) -> Result<Token> {
        self.advance(); // consume opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                Some(ch) if ch == delimiter => {
                    // A doubled delimiter is an escaped delimiter
                    if self.peek() == Some(delimiter) {
                        self.advance();
                        s.push(delimiter);
                    } else {
                        break;
                    }
                }
                Some('\\') if self.dialect.backslash_escapes() => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some('b') => s.push('\u{8}'),
                    Some('Z') => s.push('\u{1a}'),
                    // LIKE wildcards keep their backslash
                    Some(ch @ ('%' | '_')) => {
                        s.push('\\');
                        s.push(ch);
                    }
                    Some(ch) => s.push(ch),
                    None => bail!("unterminated string literal"),
                },
                Some(ch) => s.push(ch),
                None => bail!("unterminated string literal"),
            }
        }
        Ok(Token::String(s))
    }

    fn read_quoted_ident(&mut self, quote: char) -> Result<Token> {
        self.advance();
        let mut s = String::new();
        loop {
            match self.advance() {
                Some(ch) if ch == quote => {
                    if self.peek() == Some(quote) {
                        self.advance();
                        s.push(quote);
                    } else {
                        break;
                    }
                }
                Some(ch) => s.push(ch),
                None => bail!("unterminated quoted identifier"),
            }
        }
        if s.is_empty() {
            bail!("empty quoted identifier");
        }
        Ok(Token::QuotedIdent(s))
    }

    fn read_digits(&mut self) -> String {
        let mut s = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                s.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn read_number(&mut self) -> Result<Token> {
        let mut s = self.read_digits();
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            s.push('.');
            s.push_str(&self.read_digits());
            return Ok(Token::Decimal(s));
        }
        // Out-of-range integers keep their exact text
        match s.parse::<i64>() {
            Ok(n) => Ok(Token::Integer(n)),
            Err(_) => Ok(Token::Decimal(s)),
        }
    }

    fn read_numbered_placeholder(&mut self) -> Result<Token> {
        self.advance(); // consume '$'
        let digits = self.read_digits();
        if digits.is_empty() {
            bail!("expected parameter number after '$'");
        }
        let n: usize = digits.parse()?;
        if n == 0 {
            bail!("parameter numbers start at 1");
        }
        Ok(Token::Placeholder(n))
    }

    fn read_oracle_placeholder(&mut self) -> Result<Token> {
        self.advance(); // consume ':'
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() => {
                let n: usize = self.read_digits().parse()?;
                if n == 0 {
                    bail!("parameter numbers start at 1");
                }
                Ok(Token::Placeholder(n))
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                // Named binds are bound in order of appearance
                while let Some(ch) = self.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.placeholder_count += 1;
                Ok(Token::Placeholder(self.placeholder_count))
            }
            _ => bail!("expected bind name after ':'"),
        }
    }

    fn read_ident_or_keyword(&mut self) -> Result<Token> {
        let mut s = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '#' {
                s.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        let token = match s.to_uppercase().as_str() {
            "SELECT" => Token::Select,
            "FROM" => Token::From,
            "WHERE" => Token::Where,
            "INSERT" => Token::Insert,
            "INTO" => Token::Into,
            "VALUES" => Token::Values,
            "DELETE" => Token::Delete,
            "UPDATE" => Token::Update,
            "SET" => Token::Set,
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "NULL" => Token::Null,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            "JOIN" => Token::Join,
            "INNER" => Token::Inner,
            "LEFT" => Token::Left,
            "RIGHT" => Token::Right,
            "OUTER" => Token::Outer,
            "CROSS" => Token::Cross,
            "ON" => Token::On,
            "AS" => Token::As,
            "ORDER" => Token::Order,
            "BY" => Token::By,
            "ASC" => Token::Asc,
            "DESC" => Token::Desc,
            "LIMIT" => Token::Limit,
            "OFFSET" => Token::Offset,
            "FOR" => Token::For,
            "IN" => Token::In,
            "IS" => Token::Is,
            "LIKE" => Token::Like,
            "BETWEEN" => Token::Between,
            "ALL" => Token::All,
            "WHEN" => Token::When,
            "CASE" => Token::Case,
            "THEN" => Token::Then,
            "ELSE" => Token::Else,
            "END" => Token::End,
            "EXISTS" => Token::Exists,
            _ => Token::Ident(s),
        };
        Ok(token)
    }
}

pub fn tokenize(sql: &str, dialect: Dialect) -> Result<Vec<Token>> {
    Lexer::new(sql, dialect).tokenize()
}
