use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UndoError;

/// Database family a connection speaks. Drives lexing, identifier escaping,
/// placeholder style and which statement shapes the recognizer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    MySql,
    PostgreSql,
    Oracle,
    Ansi,
}

// Words that cannot appear as bare column or table names in any family.
const COMMON_RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN", "CONSTRAINT",
    "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END",
    "EXISTS", "FALSE", "FOR", "FOREIGN", "FROM", "GRANT", "GROUP", "HAVING", "IN", "INNER",
    "INSERT", "INTO", "IS", "JOIN", "LEFT", "LIKE", "NOT", "NULL", "ON", "OR", "ORDER",
    "PRIMARY", "REFERENCES", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO", "TRUE", "UNION",
    "UNIQUE", "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

const MYSQL_RESERVED: &[&str] = &[
    "CHANGE", "CONDITION", "DATABASE", "DIV", "DUAL", "INDEX", "INTERVAL", "KEY", "KEYS",
    "KILL", "LIMIT", "LOCK", "MATCH", "MOD", "OPTION", "RANGE", "READ", "RELEASE", "RENAME",
    "REPLACE", "SCHEMA", "SHOW", "SIGNAL", "STATUS", "USAGE", "WRITE",
];

const POSTGRES_RESERVED: &[&str] = &[
    "ANALYSE", "ANALYZE", "ARRAY", "ASYMMETRIC", "CURRENT_DATE", "CURRENT_TIME",
    "CURRENT_USER", "DO", "FETCH", "LIMIT", "OFFSET", "ONLY", "PLACING", "RETURNING",
    "SESSION_USER", "SYMMETRIC", "USER", "VARIADIC", "WINDOW",
];

const ORACLE_RESERVED: &[&str] = &[
    "ACCESS", "AUDIT", "CLUSTER", "COMMENT", "COMPRESS", "CONNECT", "FILE", "LEVEL", "LOCK",
    "MODE", "NUMBER", "OFFLINE", "ONLINE", "PRIOR", "RAW", "RESOURCE", "ROW", "ROWID",
    "ROWNUM", "ROWS", "SESSION", "SIZE", "START", "SYNONYM", "SYSDATE", "UID", "USER",
    "VALIDATE", "VIEW",
];

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::PostgreSql => "postgresql",
            Dialect::Oracle => "oracle",
            Dialect::Ansi => "ansi",
        }
    }

    pub fn identifier_quote(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::PostgreSql | Dialect::Oracle | Dialect::Ansi => '"',
        }
    }

    // MySQL string literals interpret backslash escapes by default
    pub fn backslash_escapes(self) -> bool {
        self == Dialect::MySql
    }

    pub fn is_reserved(self, word: &str) -> bool {
        let upper = word.to_ascii_uppercase();
        let extra = match self {
            Dialect::MySql => MYSQL_RESERVED,
            Dialect::PostgreSql => POSTGRES_RESERVED,
            Dialect::Oracle => ORACLE_RESERVED,
            Dialect::Ansi => &[],
        };
        COMMON_RESERVED.contains(&upper.as_str()) || extra.contains(&upper.as_str())
    }

    // Whether an unquoted occurrence of `name` would resolve to exactly `name`.
    fn is_plain_identifier(self, name: &str) -> bool {
        let mut chars = name.chars();
        let first = match chars.next() {
            Some(ch) => ch,
            None => return false,
        };
        match self {
            Dialect::MySql => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
            }
            Dialect::PostgreSql => {
                (first.is_ascii_lowercase() || first == '_')
                    && chars.all(|ch| {
                        ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '$'
                    })
            }
            Dialect::Oracle => {
                first.is_ascii_uppercase()
                    && chars.all(|ch| {
                        ch.is_ascii_uppercase()
                            || ch.is_ascii_digit()
                            || ch == '_'
                            || ch == '$'
                            || ch == '#'
                    })
            }
            Dialect::Ansi => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            }
        }
    }

    pub fn needs_escape(self, name: &str) -> bool {
        self.is_reserved(name) || !self.is_plain_identifier(name)
    }

    /// Quote unconditionally, doubling any embedded quote character.
    pub fn quote_identifier(self, name: &str) -> String {
        let quote = self.identifier_quote();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(quote);
        for ch in name.chars() {
            if ch == quote {
                out.push(quote);
            }
            out.push(ch);
        }
        out.push(quote);
        out
    }

    /// Quote only when the bare name would be misread (reserved word, case
    /// folding, special characters). Already-quoted names pass through.
    pub fn escape_identifier(self, name: &str) -> String {
        if name.starts_with(self.identifier_quote()) || !self.needs_escape(name) {
            name.to_string()
        } else {
            self.quote_identifier(name)
        }
    }

    pub fn quote_string(self, s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for ch in s.chars() {
            match ch {
                '\'' => out.push_str("''"),
                '\\' if self.backslash_escapes() => out.push_str("\\\\"),
                _ => out.push(ch),
            }
        }
        out.push('\'');
        out
    }

    pub fn bool_literal(self, b: bool) -> &'static str {
        match (self, b) {
            (Dialect::Oracle, true) => "1",
            (Dialect::Oracle, false) => "0",
            (_, true) => "TRUE",
            (_, false) => "FALSE",
        }
    }

    /// Placeholder text for the `index`-th (1-based) bound parameter.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::PostgreSql => format!("${index}"),
            Dialect::MySql | Dialect::Oracle | Dialect::Ansi => "?".to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = UndoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" | "polardbx" => Ok(Dialect::MySql),
            "postgresql" | "postgres" => Ok(Dialect::PostgreSql),
            "oracle" => Ok(Dialect::Oracle),
            "ansi" | "generic" => Ok(Dialect::Ansi),
            _ => Err(UndoError::UnsupportedDialect(s.to_string())),
        }
    }
}
