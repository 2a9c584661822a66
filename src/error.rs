use thiserror::Error;

/// Failures surfaced to the statement-execution proxy. Any of these means the
/// statement must not be committed without an undo record.
#[derive(Error, Debug)]
pub enum UndoError {
    #[error("unsupported syntax: {0}")]
    UnsupportedSyntax(String),

    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("ambiguous table reference: {0}")]
    AmbiguousTableReference(String),

    #[error("table '{0}' has no primary key")]
    NoPrimaryKey(String),

    #[error("no value bound for placeholder #{0}")]
    MissingParameter(usize),

    #[error(
        "before image of '{table}' has {before} rows but after image has {after}, probably because the primary key was updated"
    )]
    PrimaryKeyMutationDetected {
        table: String,
        before: usize,
        after: usize,
    },

    #[error("should never happen: {0}")]
    ShouldNeverHappen(String),

    #[error("query failed: {0}")]
    Query(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, UndoError>;
