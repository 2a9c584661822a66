// Scripted executor and table fixtures shared by executor tests.

use std::collections::VecDeque;

use anyhow::anyhow;

use crate::catalog::TableMeta;
use crate::value::{DataType, Value};

use super::{QueryExecutor, ResultSet};

/// Records every call and answers queries from a queue of result sets.
#[derive(Debug, Default)]
pub(crate) struct ScriptedExecutor {
    pub queries: Vec<(String, Vec<Value>)>,
    pub executed: Vec<(String, Vec<Value>)>,
    results: VecDeque<ResultSet>,
    generated_keys: Vec<Value>,
    affected_rows: u64,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.results.push_back(ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        });
        self
    }

    pub fn with_generated_keys(mut self, keys: Vec<Value>) -> Self {
        self.generated_keys = keys;
        self
    }

    pub fn with_affected_rows(mut self, rows: u64) -> Self {
        self.affected_rows = rows;
        self
    }
}

impl QueryExecutor for ScriptedExecutor {
    fn query(&mut self, sql: &str, params: &[Value]) -> anyhow::Result<ResultSet> {
        self.queries.push((sql.to_string(), params.to_vec()));
        self.results
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted result for: {sql}"))
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> anyhow::Result<u64> {
        self.executed.push((sql.to_string(), params.to_vec()));
        Ok(self.affected_rows)
    }

    fn generated_keys(&mut self) -> anyhow::Result<Vec<Value>> {
        Ok(self.generated_keys.clone())
    }
}

pub(crate) fn accounts_meta() -> TableMeta {
    TableMeta::builder("accounts")
        .not_null_column("id", DataType::Int)
        .column("name", DataType::Varchar)
        .column("balance", DataType::Decimal)
        .primary_key(&["id"])
        .build()
        .unwrap()
}

pub(crate) fn account(id: i64, name: &str, balance: &str) -> Vec<Value> {
    vec![
        Value::Int(id),
        Value::Text(name.to_string()),
        Value::Decimal(balance.to_string()),
    ]
}

// `modified` is maintained by the database on every change
pub(crate) fn audited_meta() -> TableMeta {
    TableMeta::builder("audited")
        .not_null_column("id", DataType::Int)
        .column("note", DataType::Varchar)
        .column("score", DataType::Int)
        .on_update_column("modified", DataType::Timestamp)
        .primary_key(&["id"])
        .build()
        .unwrap()
}

pub(crate) fn t1_meta() -> TableMeta {
    TableMeta::builder("t1")
        .not_null_column("id", DataType::Int)
        .column("name", DataType::Varchar)
        .primary_key(&["id"])
        .build()
        .unwrap()
}

pub(crate) fn t2_meta() -> TableMeta {
    TableMeta::builder("t2")
        .not_null_column("id", DataType::Int)
        .column("qty", DataType::Int)
        .primary_key(&["id"])
        .build()
        .unwrap()
}

pub(crate) fn line_meta() -> TableMeta {
    TableMeta::builder("order_line")
        .not_null_column("order_id", DataType::Int)
        .not_null_column("line_no", DataType::Int)
        .column("qty", DataType::Int)
        .primary_key(&["order_id", "line_no"])
        .build()
        .unwrap()
}
