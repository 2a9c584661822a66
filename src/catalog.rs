use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::error::{Result, UndoError};
use crate::value::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    // Auto-maintained by the database on every row change (ON UPDATE CURRENT_TIMESTAMP)
    pub on_update: bool,
}

/// Schema facts about one physical table. Owned and refreshed by the
/// metadata provider; read-only here.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    table_name: String,
    // Declaration order
    columns: IndexMap<String, ColumnMeta>,
    primary_keys: IndexSet<String>,
}

impl TableMeta {
    pub fn builder(table_name: impl Into<String>) -> TableMetaBuilder {
        TableMetaBuilder {
            table_name: table_name.into(),
            columns: IndexMap::new(),
            primary_keys: Vec::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.values()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Resolve a column by exact name, falling back to a case-insensitive
    /// match for unquoted spellings that the database case-folds.
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.get(name).or_else(|| {
            self.columns
                .values()
                .find(|c| c.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &str> {
        self.primary_keys.iter().map(String::as_str)
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_keys.contains(name)
    }

    pub fn on_update_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .values()
            .filter(|c| c.on_update)
            .map(|c| c.name.as_str())
    }

    /// True when every primary-key column appears in `columns` (canonical names).
    pub fn contains_primary_keys(&self, columns: &[String]) -> bool {
        self.primary_keys
            .iter()
            .all(|pk| columns.iter().any(|c| c == pk))
    }
}

pub struct TableMetaBuilder {
    table_name: String,
    columns: IndexMap<String, ColumnMeta>,
    primary_keys: Vec<String>,
}

impl TableMetaBuilder {
    fn push(mut self, name: &str, data_type: DataType, nullable: bool, on_update: bool) -> Self {
        self.columns.insert(
            name.to_string(),
            ColumnMeta {
                name: name.to_string(),
                data_type,
                nullable,
                on_update,
            },
        );
        self
    }

    pub fn column(self, name: &str, data_type: DataType) -> Self {
        self.push(name, data_type, true, false)
    }

    pub fn not_null_column(self, name: &str, data_type: DataType) -> Self {
        self.push(name, data_type, false, false)
    }

    pub fn on_update_column(self, name: &str, data_type: DataType) -> Self {
        self.push(name, data_type, true, true)
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_keys = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn build(self) -> Result<TableMeta> {
        if self.primary_keys.is_empty() {
            return Err(UndoError::NoPrimaryKey(self.table_name));
        }
        for pk in &self.primary_keys {
            if !self.columns.contains_key(pk) {
                return Err(UndoError::ShouldNeverHappen(format!(
                    "primary key column '{pk}' is not declared on '{}'",
                    self.table_name
                )));
            }
        }
        Ok(TableMeta {
            table_name: self.table_name,
            columns: self.columns,
            primary_keys: self.primary_keys.into_iter().collect(),
        })
    }
}

/// Source of current table schemas. Refresh policy belongs to the implementor.
pub trait TableMetadataProvider {
    fn table_meta(&self, table_name: &str) -> Result<Arc<TableMeta>>;
}

// Fixed set of table schemas, looked up case-insensitively
#[derive(Debug, Default)]
pub struct Catalog {
    tables: IndexMap<String, Arc<TableMeta>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            tables: IndexMap::new(),
        }
    }

    pub fn register(&mut self, meta: TableMeta) {
        self.tables
            .insert(meta.table_name().to_lowercase(), Arc::new(meta));
    }

    pub fn with_table(mut self, meta: TableMeta) -> Self {
        self.register(meta);
        self
    }
}

impl TableMetadataProvider for Catalog {
    fn table_meta(&self, table_name: &str) -> Result<Arc<TableMeta>> {
        let key = table_name.to_lowercase();
        if let Some(meta) = self.tables.get(&key) {
            return Ok(Arc::clone(meta));
        }
        // schema.table falls back to the bare table name
        if let Some((_, bare)) = key.rsplit_once('.') {
            if let Some(meta) = self.tables.get(bare) {
                return Ok(Arc::clone(meta));
            }
        }
        Err(UndoError::TableNotFound(table_name.to_string()))
    }
}

impl<T: TableMetadataProvider + ?Sized> TableMetadataProvider for Arc<T> {
    fn table_meta(&self, table_name: &str) -> Result<Arc<TableMeta>> {
        (**self).table_meta(table_name)
    }
}
