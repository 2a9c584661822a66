use serde::{Deserialize, Serialize};

pub fn default_only_care_update_columns() -> bool {
    true
}

// Oracle rejects IN lists longer than 1000 entries
pub fn default_max_in_size() -> usize {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoConfig {
    /// Capture only the written columns (plus primary and on-update columns)
    /// instead of every declared column.
    #[serde(default = "default_only_care_update_columns")]
    pub only_care_update_columns: bool,

    /// Maximum primary-key tuples per `IN (...)` list.
    #[serde(default = "default_max_in_size")]
    pub max_in_size: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        UndoConfig {
            only_care_update_columns: default_only_care_update_columns(),
            max_in_size: default_max_in_size(),
        }
    }
}

impl UndoConfig {
    pub fn with_only_care_update_columns(mut self, enabled: bool) -> Self {
        self.only_care_update_columns = enabled;
        self
    }
}
