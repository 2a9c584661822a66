mod delete;
mod insert;
mod query;
mod undo;
mod update;

#[cfg(test)]
pub(crate) mod testing;

use indexmap::IndexMap;
use tracing::debug;

use crate::catalog::{TableMeta, TableMetadataProvider};
use crate::config::UndoConfig;
use crate::dialect::Dialect;
use crate::error::{Result, UndoError};
use crate::recognizer::{RecognizerRegistry, SqlFacts, SqlKind, SqlRecognizer};
use crate::record::{Field, KeyType, Row, RowImage, UndoLogRecord};
use crate::value::Value;

pub use query::ImageQuery;
pub use undo::UndoLogPreparer;

/// Raw rows as the database returns them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Connection-bound access to the database. Transaction boundaries belong to
/// the implementor.
pub trait QueryExecutor {
    fn query(&mut self, sql: &str, params: &[Value]) -> anyhow::Result<ResultSet>;

    fn execute(&mut self, sql: &str, params: &[Value]) -> anyhow::Result<u64>;

    /// Keys the database generated during the last `execute`.
    fn generated_keys(&mut self) -> anyhow::Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

/// Images of one statement keyed by item table name, in item order.
pub type ImageMap = IndexMap<String, RowImage>;

fn to_row_image(meta: &TableMeta, result: ResultSet) -> Result<RowImage> {
    // Drivers may report `t.col` or the quoted spelling
    let names: Vec<String> = result
        .columns
        .iter()
        .map(|label| {
            let bare = label.rsplit('.').next().unwrap_or(label);
            let bare = bare.trim_matches(|c: char| c == '"' || c == '`');
            meta.column(bare)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| bare.to_string())
        })
        .collect();

    let mut rows = Vec::with_capacity(result.rows.len());
    for values in result.rows {
        if values.len() != names.len() {
            return Err(UndoError::ShouldNeverHappen(format!(
                "row of '{}' has {} values for {} columns",
                meta.table_name(),
                values.len(),
                names.len()
            )));
        }
        let fields = names
            .iter()
            .zip(values)
            .map(|(name, value)| Field {
                name: name.clone(),
                key_type: if meta.is_primary_key(name) {
                    KeyType::PrimaryKey
                } else {
                    KeyType::Null
                },
                value,
            })
            .collect();
        rows.push(Row { fields });
    }
    Ok(RowImage::new(
        meta.table_name(),
        meta.primary_keys().map(str::to_string).collect(),
        rows,
    ))
}

pub(crate) fn run_image_query<E: QueryExecutor + ?Sized>(
    executor: &mut E,
    query: &ImageQuery,
    dialect: Dialect,
    meta: &TableMeta,
) -> Result<RowImage> {
    debug!(
        table = meta.table_name(),
        sql = %query.sql,
        inline = %query.inline_sql(dialect),
        "image query"
    );
    let result = executor.query(&query.sql, &query.params)?;
    to_row_image(meta, result)
}

/// Builds before and after images for recognized statements.
pub struct ImageBuilder<'a> {
    metadata: &'a dyn TableMetadataProvider,
    config: UndoConfig,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(metadata: &'a dyn TableMetadataProvider, config: UndoConfig) -> Self {
        ImageBuilder { metadata, config }
    }

    pub fn config(&self) -> &UndoConfig {
        &self.config
    }

    fn empty_image(meta: &TableMeta) -> RowImage {
        RowImage::empty(
            meta.table_name(),
            meta.primary_keys().map(str::to_string).collect(),
        )
    }

    /// The locking query the before image of `table` would run, without
    /// running it. `None` for kinds whose before image is always empty.
    pub fn before_image_query(
        &self,
        facts: &SqlFacts,
        table: &str,
        params: &[Value],
    ) -> Result<Option<ImageQuery>> {
        let Some(item) = facts.item_table(table) else {
            return Ok(None);
        };
        let meta = self.metadata.table_meta(item.name())?;
        match facts.kind() {
            SqlKind::Update => update::before_query(self, facts, item, &meta, params).map(Some),
            SqlKind::Delete => delete::before_query(facts, item, &meta, params).map(Some),
            SqlKind::Insert | SqlKind::SelectForUpdate => Ok(None),
        }
    }

    /// Capture every item table's rows before the statement runs. Rows are
    /// locked with `FOR UPDATE` until the local transaction ends.
    pub fn before_image<E: QueryExecutor + ?Sized>(
        &self,
        facts: &SqlFacts,
        params: &[Value],
        executor: &mut E,
    ) -> Result<ImageMap> {
        let mut images = ImageMap::new();
        if facts.table_name().is_empty() || facts.kind() == SqlKind::SelectForUpdate {
            return Ok(images);
        }
        for item in facts.item_tables() {
            let meta = self.metadata.table_meta(item.name())?;
            let image = match facts.kind() {
                SqlKind::Update => update::before_image(self, facts, item, &meta, params, executor)?,
                SqlKind::Delete => delete::before_image(facts, item, &meta, params, executor)?,
                SqlKind::Insert | SqlKind::SelectForUpdate => Self::empty_image(&meta),
            };
            images.insert(item.name().to_string(), image);
        }
        Ok(images)
    }

    // Multi-table inserts cannot rely on generated keys
    fn require_written_keys(&self, facts: &SqlFacts, params: &[Value]) -> Result<()> {
        for item in facts.item_tables() {
            let meta = self.metadata.table_meta(item.name())?;
            insert::require_written_keys(facts, &meta, params)?;
        }
        Ok(())
    }

    /// Re-read the rows after the statement ran, matched by the primary keys
    /// in `before`. A table missing from `before` falls back to
    /// `default_before`.
    pub fn after_image<E: QueryExecutor + ?Sized>(
        &self,
        facts: &SqlFacts,
        params: &[Value],
        before: &ImageMap,
        default_before: &RowImage,
        executor: &mut E,
    ) -> Result<ImageMap> {
        let mut images = ImageMap::new();
        if facts.table_name().is_empty() || facts.kind() == SqlKind::SelectForUpdate {
            return Ok(images);
        }
        for item in facts.item_tables() {
            let meta = self.metadata.table_meta(item.name())?;
            let before_image = before.get(item.name()).unwrap_or(default_before);
            let image = match facts.kind() {
                SqlKind::Update => {
                    update::after_image(self, facts, item, &meta, before_image, executor)?
                }
                SqlKind::Insert => insert::after_image(self, facts, item, &meta, params, executor)?,
                SqlKind::Delete | SqlKind::SelectForUpdate => Self::empty_image(&meta),
            };
            images.insert(item.name().to_string(), image);
        }
        Ok(images)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementOutcome {
    pub affected_rows: u64,
    pub undo_logs: Vec<UndoLogRecord>,
}

/// Runs one statement end to end: before images, the statement itself,
/// after images, then the undo records.
pub struct StatementExecutor<'a, E: QueryExecutor + ?Sized> {
    recognizer: SqlRecognizer,
    builder: ImageBuilder<'a>,
    executor: &'a mut E,
}

impl<'a, E: QueryExecutor + ?Sized> StatementExecutor<'a, E> {
    pub fn new(
        dialect: Dialect,
        metadata: &'a dyn TableMetadataProvider,
        config: UndoConfig,
        executor: &'a mut E,
    ) -> Self {
        StatementExecutor {
            recognizer: RecognizerRegistry::lookup(dialect),
            builder: ImageBuilder::new(metadata, config),
            executor,
        }
    }

    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementOutcome> {
        let facts = self.recognizer.recognize(sql)?;
        if facts.len() > 1 {
            for f in facts.iter().filter(|f| f.kind() == SqlKind::Insert) {
                self.builder.require_written_keys(f, params)?;
            }
        }

        let mut befores = Vec::with_capacity(facts.len());
        for f in &facts {
            befores.push(self.builder.before_image(f, params, &mut *self.executor)?);
        }

        let affected_rows = self.executor.execute(sql, params)?;
        debug!(affected_rows, sql, "statement executed");

        let mut undo_logs = Vec::new();
        for (f, before) in facts.iter().zip(&befores) {
            let default_before = RowImage::empty(f.table_name(), Vec::new());
            let after = self
                .builder
                .after_image(f, params, before, &default_before, &mut *self.executor)?;
            let record = UndoLogPreparer::prepare(f, before, &after)?;
            if !record.is_empty() {
                undo_logs.push(record);
            }
        }

        Ok(StatementOutcome {
            affected_rows,
            undo_logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::catalog::Catalog;

    fn builder(catalog: &Catalog, only_care: bool) -> ImageBuilder<'_> {
        ImageBuilder::new(
            catalog,
            UndoConfig::default().with_only_care_update_columns(only_care),
        )
    }

    fn recognize(dialect: Dialect, sql: &str) -> SqlFacts {
        RecognizerRegistry::lookup(dialect)
            .recognize(sql)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_ansi_accounts_scenario() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, false);
        let facts = recognize(Dialect::Ansi, "UPDATE accounts SET balance = 100 WHERE id = 1");

        let mut db = ScriptedExecutor::new()
            .with_result(&["id", "name", "balance"], vec![account(1, "ann", "50")])
            .with_result(&["id", "name", "balance"], vec![account(1, "ann", "100")]);

        let before = builder.before_image(&facts, &[], &mut db).unwrap();
        assert_eq!(
            db.queries[0].0,
            "SELECT id, name, balance FROM accounts WHERE id = 1 FOR UPDATE"
        );
        assert!(db.queries[0].1.is_empty());

        let default_before = RowImage::empty("accounts", Vec::new());
        let after = builder
            .after_image(&facts, &[], &before, &default_before, &mut db)
            .unwrap();
        let (sql, params) = &db.queries[1];
        assert_eq!(sql, "SELECT id, name, balance FROM accounts WHERE id = ?");
        assert_eq!(params, &vec![Value::Int(1)]);
        let query = ImageQuery {
            sql: sql.clone(),
            params: params.clone(),
        };
        assert_eq!(
            query.inline_sql(Dialect::Ansi),
            "SELECT id, name, balance FROM accounts WHERE id = 1"
        );
        assert_eq!(after["accounts"].len(), 1);
    }

    #[test]
    fn test_only_care_column_order() {
        let catalog = Catalog::new().with_table(audited_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(Dialect::MySql, "UPDATE audited SET note = ?, score = ? WHERE id > ?");
        let query = builder
            .before_image_query(&facts, "audited", &[Value::from("x"), Value::Int(2), Value::Int(10)])
            .unwrap()
            .unwrap();
        // primary key, then updated columns, then on-update columns
        assert_eq!(
            query.sql,
            "SELECT id, note, score, modified FROM audited WHERE id > ? FOR UPDATE"
        );
        assert_eq!(query.params, vec![Value::Int(10)]);
    }

    #[test]
    fn test_case_value_and_subquery_predicate() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(
            Dialect::MySql,
            "UPDATE accounts SET balance = CASE WHEN balance > ? THEN balance - ? ELSE balance END \
             WHERE id IN (SELECT account_id FROM blocked WHERE reason = ?)",
        );
        assert_eq!(facts.update_columns(), ["balance"]);

        let params = [Value::Int(100), Value::Int(10), Value::from("fraud")];
        let query = builder
            .before_image_query(&facts, "accounts", &params)
            .unwrap()
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT id, balance FROM accounts WHERE id IN (SELECT account_id FROM blocked WHERE reason = ?) FOR UPDATE"
        );
        assert_eq!(query.params, vec![Value::from("fraud")]);
    }

    #[test]
    fn test_postgres_renumbers_placeholders() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(
            Dialect::PostgreSql,
            "UPDATE accounts SET balance = $1 WHERE name = $3 AND id > $2",
        );
        let params = [Value::Int(0), Value::Int(5), Value::from("ann")];
        let query = builder
            .before_image_query(&facts, "accounts", &params)
            .unwrap()
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT id, balance FROM accounts WHERE name = $1 AND id > $2 FOR UPDATE"
        );
        assert_eq!(query.params, vec![Value::from("ann"), Value::Int(5)]);
        assert_eq!(
            query.inline_sql(Dialect::PostgreSql),
            "SELECT id, balance FROM accounts WHERE name = 'ann' AND id > 5 FOR UPDATE"
        );
    }

    #[test]
    fn test_missing_parameter() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(Dialect::Ansi, "UPDATE accounts SET balance = ? WHERE id = ?");
        let err = builder
            .before_image_query(&facts, "accounts", &[Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, UndoError::MissingParameter(2)));
    }

    #[test]
    fn test_join_update_builds_image_per_item_table() {
        let catalog = Catalog::new().with_table(t1_meta()).with_table(t2_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(
            Dialect::MySql,
            "UPDATE t1 JOIN t2 ON t1.id=t2.id SET t1.name=?, t2.qty=?",
        );
        let params = [Value::from("new"), Value::Int(7)];

        let mut db = ScriptedExecutor::new()
            // t1 joined twice through t2 duplicates
            .with_result(&["id", "name"], vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ])
            .with_result(&["id", "qty"], vec![vec![Value::Int(1), Value::Int(3)]])
            .with_result(&["id", "name"], vec![
                vec![Value::Int(2), Value::from("new")],
                vec![Value::Int(1), Value::from("new")],
            ])
            .with_result(&["id", "qty"], vec![vec![Value::Int(1), Value::Int(7)]]);

        let before = builder.before_image(&facts, &params, &mut db).unwrap();
        assert_eq!(before.keys().collect::<Vec<_>>(), vec!["t1", "t2"]);
        assert_eq!(
            db.queries[0].0,
            "SELECT t1.id, t1.name FROM t1 JOIN t2 ON t1.id = t2.id FOR UPDATE"
        );
        assert_eq!(
            db.queries[1].0,
            "SELECT t2.id, t2.qty FROM t1 JOIN t2 ON t1.id = t2.id FOR UPDATE"
        );
        assert_eq!(before["t1"].len(), 2);

        let default_before = RowImage::empty("", Vec::new());
        let after = builder
            .after_image(&facts, &params, &before, &default_before, &mut db)
            .unwrap();
        assert_eq!(db.queries[2].0, "SELECT t1.id, t1.name FROM t1 WHERE t1.id IN (?, ?)");
        assert_eq!(db.queries[3].0, "SELECT t2.id, t2.qty FROM t2 WHERE t2.id = ?");
        // aligned to before order
        assert_eq!(
            after["t1"].primary_key_values(),
            vec![vec![Value::Int(1)], vec![Value::Int(2)]]
        );
    }

    #[test]
    fn test_left_join_padding_rows_are_not_captured() {
        let catalog = Catalog::new().with_table(t1_meta()).with_table(t2_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(
            Dialect::MySql,
            "UPDATE t1 LEFT JOIN t2 ON t1.id = t2.id SET t2.qty = 0",
        );

        let mut db = ScriptedExecutor::new()
            .with_result(&["id", "qty"], vec![
                vec![Value::Int(1), Value::Int(3)],
                vec![Value::Null, Value::Null],
            ])
            .with_result(&["id", "qty"], vec![vec![Value::Int(1), Value::Int(0)]]);

        let before = builder.before_image(&facts, &[], &mut db).unwrap();
        assert_eq!(before["t2"].len(), 1);

        let default_before = RowImage::empty("", Vec::new());
        let after = builder
            .after_image(&facts, &[], &before, &default_before, &mut db)
            .unwrap();
        assert_eq!(db.queries[1].0, "SELECT t2.id, t2.qty FROM t2 WHERE t2.id = ?");
        assert_eq!(db.queries[1].1, vec![Value::Int(1)]);

        let record = UndoLogPreparer::prepare(&facts, &before, &after).unwrap();
        assert_eq!(record.lock_key, "t2:1");
    }

    #[test]
    fn test_postgres_update_from_locks_target_only() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(
            Dialect::PostgreSql,
            "UPDATE accounts a SET balance = 0 FROM blocked b WHERE b.account_id = a.id",
        );
        let query = builder
            .before_image_query(&facts, "accounts", &[])
            .unwrap()
            .unwrap();
        assert_eq!(
            query.sql,
            "SELECT a.id, a.balance FROM accounts a, blocked b WHERE b.account_id = a.id FOR UPDATE OF a"
        );
    }

    #[test]
    fn test_missing_before_uses_default() {
        let catalog = Catalog::new().with_table(t1_meta()).with_table(t2_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(
            Dialect::MySql,
            "UPDATE t1 JOIN t2 ON t1.id = t2.id SET t1.name = 'x', t2.qty = 0",
        );
        let t2 = facts.for_item_table("t2").unwrap();

        let default_before = RowImage::new(
            "t2",
            vec!["id".to_string()],
            vec![Row {
                fields: vec![Field {
                    name: "id".to_string(),
                    key_type: KeyType::PrimaryKey,
                    value: Value::Int(4),
                }],
            }],
        );
        let mut db = ScriptedExecutor::new()
            .with_result(&["id", "qty"], vec![vec![Value::Int(4), Value::Int(0)]]);
        let after = builder
            .after_image(&t2, &[], &ImageMap::new(), &default_before, &mut db)
            .unwrap();
        assert_eq!(db.queries[0].0, "SELECT t2.id, t2.qty FROM t2 WHERE t2.id = ?");
        assert_eq!(db.queries[0].1, vec![Value::Int(4)]);
        assert_eq!(after["t2"].len(), 1);
    }

    #[test]
    fn test_empty_before_skips_after_query() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(Dialect::Ansi, "UPDATE accounts SET balance = 0 WHERE id = 404");
        let mut db = ScriptedExecutor::new().with_result(&["id", "balance"], vec![]);
        let before = builder.before_image(&facts, &[], &mut db).unwrap();
        let after = builder
            .after_image(&facts, &[], &before, &RowImage::empty("", Vec::new()), &mut db)
            .unwrap();
        assert_eq!(db.queries.len(), 1);
        assert!(after["accounts"].is_empty());
    }

    #[test]
    fn test_empty_table_name_is_a_no_op() {
        let catalog = Catalog::new();
        let builder = builder(&catalog, true);
        let facts = SqlFacts::new(SqlKind::Update, Dialect::Ansi, "UPDATE t SET a = 1");
        let mut db = ScriptedExecutor::new();

        let before = builder.before_image(&facts, &[], &mut db).unwrap();
        let after = builder
            .after_image(&facts, &[], &before, &RowImage::empty("", Vec::new()), &mut db)
            .unwrap();
        assert!(before.is_empty());
        assert!(after.is_empty());
        assert!(db.queries.is_empty());

        let record = UndoLogPreparer::prepare(&facts, &before, &after).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_delete_images() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(Dialect::MySql, "DELETE FROM accounts WHERE balance < ? ORDER BY id LIMIT 2");
        let mut db = ScriptedExecutor::new()
            .with_result(&["id", "name", "balance"], vec![account(3, "cy", "0")]);

        let before = builder.before_image(&facts, &[Value::Int(1)], &mut db).unwrap();
        assert_eq!(
            db.queries[0].0,
            "SELECT id, name, balance FROM accounts WHERE balance < ? ORDER BY id LIMIT 2 FOR UPDATE"
        );
        let after = builder
            .after_image(&facts, &[Value::Int(1)], &before, &RowImage::empty("", Vec::new()), &mut db)
            .unwrap();
        assert_eq!(db.queries.len(), 1);
        assert!(after["accounts"].is_empty());
        assert_eq!(before["accounts"].len(), 1);
    }

    #[test]
    fn test_insert_after_image_from_values() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(
            Dialect::MySql,
            "INSERT INTO accounts (name, id, balance) VALUES ('a', 10, 0), (?, ?, 0)",
        );
        let params = [Value::from("b"), Value::Int(11)];
        let mut db = ScriptedExecutor::new().with_result(
            &["id", "name", "balance"],
            vec![account(11, "b", "0"), account(10, "a", "0")],
        );

        let before = builder.before_image(&facts, &params, &mut db).unwrap();
        assert!(before["accounts"].is_empty());
        let after = builder
            .after_image(&facts, &params, &before, &RowImage::empty("", Vec::new()), &mut db)
            .unwrap();
        assert_eq!(
            db.queries[0].0,
            "SELECT id, name, balance FROM accounts WHERE id IN (?, ?)"
        );
        assert_eq!(db.queries[0].1, vec![Value::Int(10), Value::Int(11)]);
        assert_eq!(
            after["accounts"].primary_key_values(),
            vec![vec![Value::Int(10)], vec![Value::Int(11)]]
        );
    }

    #[test]
    fn test_insert_uses_generated_keys() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let builder = builder(&catalog, true);
        let facts = recognize(
            Dialect::MySql,
            "INSERT INTO accounts (id, name) VALUES (NULL, 'a'), (DEFAULT, 'b'), (7, 'c')",
        );
        let mut db = ScriptedExecutor::new()
            .with_generated_keys(vec![Value::Int(20), Value::Int(21)])
            .with_result(&["id", "name", "balance"], vec![]);
        builder
            .after_image(&facts, &[], &ImageMap::new(), &RowImage::empty("", Vec::new()), &mut db)
            .unwrap();
        assert_eq!(
            db.queries[0].1,
            vec![Value::Int(20), Value::Int(21), Value::Int(7)]
        );

        let facts = recognize(Dialect::MySql, "INSERT INTO accounts (name) VALUES ('z')");
        let mut db = ScriptedExecutor::new();
        let err = builder
            .after_image(&facts, &[], &ImageMap::new(), &RowImage::empty("", Vec::new()), &mut db)
            .unwrap_err();
        assert!(matches!(err, UndoError::ShouldNeverHappen(_)));
    }

    #[test]
    fn test_insert_key_shapes_rejected() {
        let catalog = Catalog::new().with_table(line_meta());
        let builder = builder(&catalog, true);
        let mut db = ScriptedExecutor::new().with_generated_keys(vec![Value::Int(1)]);

        let facts = recognize(Dialect::MySql, "INSERT INTO order_line (order_id, qty) VALUES (1, 2)");
        let err = builder
            .after_image(&facts, &[], &ImageMap::new(), &RowImage::empty("", Vec::new()), &mut db)
            .unwrap_err();
        assert!(matches!(err, UndoError::UnsupportedSyntax(_)));

        let facts = recognize(
            Dialect::MySql,
            "INSERT INTO order_line (order_id, line_no, qty) VALUES (1, other_col, 2)",
        );
        let err = builder
            .after_image(&facts, &[], &ImageMap::new(), &RowImage::empty("", Vec::new()), &mut db)
            .unwrap_err();
        assert!(matches!(err, UndoError::UnsupportedSyntax(_)));
    }

    #[test]
    fn test_multi_table_insert_needs_written_keys() {
        let catalog = Catalog::new().with_table(t1_meta()).with_table(t2_meta());
        let mut db = ScriptedExecutor::new().with_generated_keys(vec![Value::Int(1), Value::Int(2)]);
        let err = StatementExecutor::new(Dialect::Oracle, &catalog, UndoConfig::default(), &mut db)
            .execute(
                "INSERT ALL INTO t1 (name) VALUES (:1) INTO t2 (qty) VALUES (:2) SELECT 1 FROM DUAL",
                &[Value::from("a"), Value::Int(3)],
            )
            .unwrap_err();
        assert!(matches!(err, UndoError::UnsupportedSyntax(_)));
        assert!(db.queries.is_empty());
        assert!(db.executed.is_empty());

        let mut db = ScriptedExecutor::new()
            .with_result(&["id", "name"], vec![vec![Value::Int(5), Value::from("a")]])
            .with_result(&["id", "qty"], vec![vec![Value::Int(6), Value::Int(3)]])
            .with_affected_rows(2);
        let outcome = StatementExecutor::new(Dialect::Oracle, &catalog, UndoConfig::default(), &mut db)
            .execute(
                "INSERT ALL INTO t1 (id, name) VALUES (5, :1) INTO t2 (id, qty) VALUES (6, :2) SELECT 1 FROM DUAL",
                &[Value::from("a"), Value::Int(3)],
            )
            .unwrap();
        assert_eq!(outcome.undo_logs.len(), 2);
        assert_eq!(outcome.undo_logs[1].lock_key, "t2:6");
    }

    #[test]
    fn test_unknown_table() {
        let catalog = Catalog::new();
        let builder = builder(&catalog, true);
        let facts = recognize(Dialect::Ansi, "DELETE FROM ghosts");
        let mut db = ScriptedExecutor::new();
        assert!(matches!(
            builder.before_image(&facts, &[], &mut db),
            Err(UndoError::TableNotFound(t)) if t == "ghosts"
        ));
    }

    #[test]
    fn test_statement_executor_round_trip() {
        let catalog = Catalog::new().with_table(audited_meta());
        let mut db = ScriptedExecutor::new()
            .with_result(
                &["id", "score", "modified"],
                vec![
                    vec![Value::Int(1), Value::Int(10), Value::from("t0")],
                    vec![Value::Int(2), Value::Int(20), Value::from("t0")],
                ],
            )
            .with_result(
                &["id", "score", "modified"],
                vec![
                    vec![Value::Int(2), Value::Int(21), Value::from("t1")],
                    vec![Value::Int(1), Value::Int(11), Value::from("t1")],
                ],
            )
            .with_affected_rows(2);
        let sql = "UPDATE audited SET score = score + 1 WHERE id IN (?, ?)";
        let params = [Value::Int(1), Value::Int(2)];

        let outcome = StatementExecutor::new(Dialect::MySql, &catalog, UndoConfig::default(), &mut db)
            .execute(sql, &params)
            .unwrap();
        assert_eq!(outcome.affected_rows, 2);
        assert_eq!(outcome.undo_logs.len(), 1);

        let record = &outcome.undo_logs[0];
        assert_eq!(record.kind, SqlKind::Update);
        assert_eq!(record.sql, sql);
        assert_eq!(record.lock_key, "audited:1,2");
        let pair = &record.items[0];
        for (before, after) in pair.before.rows().iter().zip(pair.after.rows()) {
            let changed: Vec<&str> = before
                .fields
                .iter()
                .zip(&after.fields)
                .filter(|(b, a)| b.value != a.value)
                .map(|(b, _)| b.name.as_str())
                .collect();
            assert_eq!(changed, vec!["score", "modified"]);
            assert_eq!(before.value("id"), after.value("id"));
        }

        assert_eq!(db.executed, vec![(sql.to_string(), params.to_vec())]);
        assert_eq!(db.queries.len(), 2);
    }

    #[test]
    fn test_statement_executor_fails_fast() {
        let catalog = Catalog::new().with_table(accounts_meta());
        let mut db = ScriptedExecutor::new().with_result(&["id", "balance"], vec![vec![Value::Int(1), Value::Int(0)]]);
        // no scripted after result, so the after query fails
        let err = StatementExecutor::new(Dialect::Ansi, &catalog, UndoConfig::default(), &mut db)
            .execute("UPDATE accounts SET balance = 0 WHERE id = 1", &[])
            .unwrap_err();
        assert!(matches!(err, UndoError::Query(_)));
        assert_eq!(db.executed.len(), 1);
    }

    #[test]
    fn test_statement_executor_plain_select() {
        let catalog = Catalog::new();
        let mut db = ScriptedExecutor::new().with_affected_rows(3);
        let outcome = StatementExecutor::new(Dialect::MySql, &catalog, UndoConfig::default(), &mut db)
            .execute("SELECT * FROM anything FOR UPDATE", &[])
            .unwrap();
        assert!(outcome.undo_logs.is_empty());
        assert!(db.queries.is_empty());
    }

    #[test]
    fn test_result_set_labels_resolved_against_metadata() {
        let meta = accounts_meta();
        let image = to_row_image(
            &meta,
            ResultSet {
                columns: vec!["accounts.ID".to_string(), "`Balance`".to_string()],
                rows: vec![vec![Value::Int(1), Value::from("5")]],
            },
        )
        .unwrap();
        let row = &image.rows()[0];
        assert_eq!(row.fields[0].name, "id");
        assert_eq!(row.fields[0].key_type, KeyType::PrimaryKey);
        assert_eq!(row.fields[1].name, "balance");
        assert_eq!(row.fields[1].key_type, KeyType::Null);

        let err = to_row_image(
            &meta,
            ResultSet {
                columns: vec!["id".to_string()],
                rows: vec![vec![]],
            },
        )
        .unwrap_err();
        assert!(matches!(err, UndoError::ShouldNeverHappen(_)));
    }
}
