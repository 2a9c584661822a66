use tracing::{debug, warn};

use crate::error::{Result, UndoError};
use crate::recognizer::{SqlFacts, SqlKind};
use crate::record::{build_lock_key, ImagePair, UndoLogRecord};

use super::ImageMap;

pub struct UndoLogPreparer;

impl UndoLogPreparer {
    /// Pair every before image with its after image and check the pairing.
    ///
    /// An UPDATE must leave the same number of rows under the captured keys;
    /// anything else means a primary key changed and the statement cannot
    /// be compensated. Pairs where both sides are empty are dropped.
    pub fn prepare(facts: &SqlFacts, before: &ImageMap, after: &ImageMap) -> Result<UndoLogRecord> {
        if let Some(table) = after.keys().find(|table| !before.contains_key(*table)) {
            return Err(UndoError::ShouldNeverHappen(format!(
                "after image of '{table}' has no before image"
            )));
        }

        let mut items = Vec::with_capacity(before.len());
        for (table, before_image) in before {
            let after_image = after.get(table).ok_or_else(|| {
                UndoError::ShouldNeverHappen(format!("before image of '{table}' has no after image"))
            })?;

            if facts.kind() == SqlKind::Update && before_image.len() != after_image.len() {
                warn!(
                    table = table.as_str(),
                    before = before_image.len(),
                    after = after_image.len(),
                    sql = facts.sql(),
                    "row count changed between images, primary key was updated"
                );
                return Err(UndoError::PrimaryKeyMutationDetected {
                    table: table.clone(),
                    before: before_image.len(),
                    after: after_image.len(),
                });
            }

            if before_image.is_empty() && after_image.is_empty() {
                continue;
            }
            items.push(ImagePair {
                table_name: before_image.table_name().to_string(),
                before: before_image.clone(),
                after: after_image.clone(),
            });
        }

        let lock_key = match facts.kind() {
            SqlKind::Insert => build_lock_key(items.iter().map(|pair| &pair.after)),
            _ => build_lock_key(items.iter().map(|pair| &pair.before)),
        };
        debug!(
            kind = ?facts.kind(),
            tables = items.len(),
            lock_key = lock_key.as_str(),
            "undo log prepared"
        );

        Ok(UndoLogRecord {
            kind: facts.kind(),
            sql: facts.sql().to_string(),
            items,
            lock_key,
        })
    }
}
