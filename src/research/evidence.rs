use crate::store::types::{serialize_row, Match};

/// Matches from one table, in the order they were found.
#[derive(Debug)]
pub struct TableEvidence<'a> {
    pub table: &'a str,
    pub rows: Vec<String>,
}

/// Group matches by source table, tables in first-appearance order, rows in input order.
pub fn group_by_table(matches: &[Match]) -> Vec<TableEvidence<'_>> {
    let mut groups: Vec<TableEvidence<'_>> = Vec::new();
    for m in matches {
        let text = serialize_row(&m.row);
        match groups.iter().position(|g| g.table == m.table) {
            Some(i) => groups[i].rows.push(text),
            None => groups.push(TableEvidence {
                table: &m.table,
                rows: vec![text],
            }),
        }
    }
    groups
}

/// Distinct source tables, first-appearance order.
pub fn source_tables(matches: &[Match]) -> Vec<&str> {
    let mut tables: Vec<&str> = Vec::new();
    for m in matches {
        if !tables.contains(&m.table.as_str()) {
            tables.push(&m.table);
        }
    }
    tables
}

/// Pretty JSON of the evidence, for the user to inspect alongside the answer.
pub fn evidence_json(matches: &[Match]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(matches)
}
