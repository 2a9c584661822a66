//! Before/after row images and undo records for data change statements.
//!
//! A statement is recognized into [`SqlFacts`] by a dialect recognizer, its
//! rows are captured with a locking SELECT before it runs and re-read by
//! primary key after it runs, and [`UndoLogPreparer`] turns the two images
//! into an [`UndoLogRecord`] that can roll the change back later.

pub mod ast;
pub mod catalog;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod recognizer;
pub mod record;
pub mod value;

pub use catalog::{Catalog, ColumnMeta, TableMeta, TableMetadataProvider};
pub use config::UndoConfig;
pub use dialect::Dialect;
pub use error::{Result, UndoError};
pub use executor::{
    ImageBuilder, ImageMap, ImageQuery, QueryExecutor, ResultSet, StatementExecutor,
    StatementOutcome, UndoLogPreparer,
};
pub use recognizer::{RecognizerRegistry, SqlFacts, SqlKind, SqlRecognizer};
pub use record::{Field, ImagePair, KeyType, Row, RowImage, UndoLogRecord};
pub use value::{DataType, Value};
