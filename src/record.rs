use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::recognizer::SqlKind;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    PrimaryKey,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub key_type: KeyType,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    pub fields: Vec<Field>,
}

impl Row {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.field(name).map(|f| &f.value)
    }

    pub fn primary_key_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.key_type == KeyType::PrimaryKey)
    }
}

/// Rows of one table at one point in time. `primary_keys` fixes the order in
/// which key values are read from each row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowImage {
    table_name: String,
    primary_keys: Vec<String>,
    rows: Vec<Row>,
}

impl RowImage {
    pub fn new(table_name: impl Into<String>, primary_keys: Vec<String>, rows: Vec<Row>) -> Self {
        RowImage {
            table_name: table_name.into(),
            primary_keys,
            rows,
        }
    }

    pub fn empty(table_name: impl Into<String>, primary_keys: Vec<String>) -> Self {
        RowImage::new(table_name, primary_keys, Vec::new())
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn key_of(&self, row: &Row) -> Vec<Value> {
        self.primary_keys
            .iter()
            .map(|pk| row.value(pk).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Primary-key tuple of every row, in row order.
    pub fn primary_key_values(&self) -> Vec<Vec<Value>> {
        self.rows.iter().map(|row| self.key_of(row)).collect()
    }

    /// Keep the first row of each primary key. A join can return one target
    /// row several times.
    pub fn dedup_by_primary_key(&mut self) {
        let keys: Vec<Vec<Value>> = self.primary_key_values();
        let mut seen = IndexSet::new();
        let mut keys = keys.into_iter();
        self.rows.retain(|_| match keys.next() {
            Some(key) => seen.insert(key),
            None => true,
        });
    }

    /// Drop rows with a NULL in their primary key. An outer join pads the
    /// missing side with NULLs, and such a row is not a row of this table.
    pub fn drop_null_keys(&mut self) {
        let keys: Vec<Vec<Value>> = self.primary_key_values();
        let mut keys = keys.into_iter();
        self.rows.retain(|_| match keys.next() {
            Some(key) => !key.iter().any(Value::is_null),
            None => true,
        });
    }

    /// Reorder rows to follow `order`. Rows whose key is not listed keep
    /// their relative order at the end.
    pub fn align_to(&mut self, order: &[Vec<Value>]) {
        let position: IndexMap<&Vec<Value>, usize> = order
            .iter()
            .enumerate()
            .map(|(i, key)| (key, i))
            .rev()
            .collect();
        let mut keyed: Vec<(usize, Row)> = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|row| {
                let key = self.key_of(&row);
                (position.get(&key).copied().unwrap_or(usize::MAX), row)
            })
            .collect();
        keyed.sort_by_key(|(pos, _)| *pos);
        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
    }

    // `table:pk1,pk2` with composite keys joined by `_`
    fn lock_key(&self) -> Option<String> {
        if self.rows.is_empty() {
            return None;
        }
        let keys: Vec<String> = self
            .primary_key_values()
            .iter()
            .map(|key| {
                key.iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("_")
            })
            .collect();
        Some(format!("{}:{}", self.table_name, keys.join(",")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePair {
    pub table_name: String,
    pub before: RowImage,
    pub after: RowImage,
}

/// Compensation record for one data change statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoLogRecord {
    pub kind: SqlKind,
    pub sql: String,
    pub items: Vec<ImagePair>,
    // Rows the branch must hold global locks on
    pub lock_key: String,
}

impl UndoLogRecord {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub fn build_lock_key<'a>(images: impl IntoIterator<Item = &'a RowImage>) -> String {
    images
        .into_iter()
        .filter_map(RowImage::lock_key)
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, line: i64, qty: i64) -> Row {
        Row {
            fields: vec![
                Field {
                    name: "order_id".to_string(),
                    key_type: KeyType::PrimaryKey,
                    value: Value::Int(id),
                },
                Field {
                    name: "line_no".to_string(),
                    key_type: KeyType::PrimaryKey,
                    value: Value::Int(line),
                },
                Field {
                    name: "qty".to_string(),
                    key_type: KeyType::Null,
                    value: Value::Int(qty),
                },
            ],
        }
    }

    fn lines(rows: Vec<Row>) -> RowImage {
        RowImage::new(
            "order_line",
            vec!["order_id".to_string(), "line_no".to_string()],
            rows,
        )
    }

    #[test]
    fn test_primary_key_values_follow_key_order() {
        let image = RowImage::new(
            "order_line",
            vec!["line_no".to_string(), "order_id".to_string()],
            vec![row(7, 2, 1)],
        );
        assert_eq!(
            image.primary_key_values(),
            vec![vec![Value::Int(2), Value::Int(7)]]
        );
        assert_eq!(image.rows()[0].primary_key_fields().count(), 2);
        assert_eq!(image.rows()[0].value("QTY"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_dedup_by_primary_key() {
        let mut image = lines(vec![row(1, 1, 5), row(1, 2, 6), row(1, 1, 5)]);
        image.dedup_by_primary_key();
        assert_eq!(image.len(), 2);
        assert_eq!(image.rows()[1].value("line_no"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_drop_null_keys() {
        let mut image = lines(vec![row(1, 1, 5), row(1, 2, 6)]);
        image.rows.push(Row {
            fields: vec![
                Field {
                    name: "order_id".to_string(),
                    key_type: KeyType::PrimaryKey,
                    value: Value::Int(1),
                },
                Field {
                    name: "line_no".to_string(),
                    key_type: KeyType::PrimaryKey,
                    value: Value::Null,
                },
            ],
        });
        image.drop_null_keys();
        assert_eq!(image.len(), 2);
    }

    #[test]
    fn test_align_to_before_order() {
        let before = lines(vec![row(2, 1, 0), row(1, 1, 0), row(3, 1, 0)]);
        let mut after = lines(vec![row(1, 1, 9), row(9, 9, 9), row(3, 1, 9), row(2, 1, 9)]);
        after.align_to(&before.primary_key_values());
        let ids: Vec<&Value> = after
            .rows()
            .iter()
            .map(|r| r.value("order_id").unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![&Value::Int(2), &Value::Int(1), &Value::Int(3), &Value::Int(9)]
        );
    }

    #[test]
    fn test_lock_key() {
        let first = lines(vec![row(1, 1, 0), row(1, 2, 0)]);
        let empty = RowImage::empty("audit", vec!["id".to_string()]);
        let second = RowImage::new(
            "orders",
            vec!["id".to_string()],
            vec![Row {
                fields: vec![Field {
                    name: "id".to_string(),
                    key_type: KeyType::PrimaryKey,
                    value: Value::Text("A-1".to_string()),
                }],
            }],
        );
        assert_eq!(
            build_lock_key([&first, &empty, &second]),
            "order_line:1_1,1_2;orders:A-1"
        );
        assert_eq!(build_lock_key([&empty]), "");
    }

    #[test]
    fn test_record_serializes_for_persistence() {
        let record = UndoLogRecord {
            kind: SqlKind::Update,
            sql: "UPDATE order_line SET qty = 2".to_string(),
            items: vec![ImagePair {
                table_name: "order_line".to_string(),
                before: lines(vec![row(1, 1, 1)]),
                after: lines(vec![row(1, 1, 2)]),
            }],
            lock_key: "order_line:1_1".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "Update");
        assert_eq!(json["items"][0]["after"]["rows"][0]["fields"][2]["value"]["Int"], 2);
        let decoded: UndoLogRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
    }
}
