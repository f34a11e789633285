use serde::{Deserialize, Serialize};

/// One record from a remote table. No schema is assumed.
pub type Row = serde_json::Value;

/// A row that survived the substring filter, tagged with the table it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub table: String,
    pub row: Row,
}

impl Match {
    pub fn new(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            row,
        }
    }
}

/// Canonical text form of a row: compact JSON with Unicode left unescaped.
/// This is both the text the query is matched against and the text shown
/// to the language model.
pub fn serialize_row(row: &Row) -> String {
    row.to_string()
}
