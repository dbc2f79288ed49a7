//! Category filters, identity counts and lead projections over a joined table.
//!
//! Identity is always the trimmed contact identifier: the join repeats a
//! contact once per registration, so row counts and names are never used to
//! count people.

use std::collections::{HashMap, HashSet};

use leadboard_core::{ColumnRole, Lead, SchemaError, Stage};
use serde::Serialize;

use crate::join::{trimmed, JoinedTable};

/// Distinct non-null values of a role column, in first-seen order.
pub fn category_options(joined: &JoinedTable, role: ColumnRole) -> Result<Vec<String>, SchemaError> {
    let column = joined.column(role)?;
    let mut seen = HashSet::new();
    let mut options = Vec::new();
    for row in 0..joined.len() {
        if let Some(value) = joined.cell(row, column) {
            if seen.insert(value) {
                options.push(value.to_string());
            }
        }
    }
    Ok(options)
}

/// Rows whose role column equals `value` exactly.
pub fn filter_by_category(
    joined: &JoinedTable,
    role: ColumnRole,
    value: &str,
) -> Result<JoinedTable, SchemaError> {
    let column = joined.column(role)?;
    Ok(joined.subset((0..joined.len()).filter(|&row| joined.cell(row, column) == Some(value))))
}

pub fn count_distinct_identities(view: &JoinedTable) -> usize {
    (0..view.len())
        .filter_map(|row| view.contact_id(row))
        .collect::<HashSet<_>>()
        .len()
}

/// First row per (identifier, name), both compared trimmed.
pub fn dedupe(view: &JoinedTable) -> Result<JoinedTable, SchemaError> {
    let name = view.column(ColumnRole::ContactName)?;
    let mut seen = HashSet::new();
    let keep = (0..view.len())
        .filter(|&row| seen.insert((view.contact_id(row), trimmed(view.cell(row, name)))))
        .collect::<Vec<_>>();
    Ok(view.subset(keep))
}

/// Deduplicated `(id, name)` projection for display.
pub fn leads(view: &JoinedTable) -> Result<Vec<Lead>, SchemaError> {
    let name = view.column(ColumnRole::ContactName)?;
    let unique = dedupe(view)?;
    Ok((0..unique.len())
        .map(|row| Lead {
            id: unique.contact_id(row).unwrap_or_default().to_string(),
            name: trimmed(unique.cell(row, name)).unwrap_or_default().to_string(),
        })
        .collect())
}

/// Rows of every contact with exactly `count` distinct process keys.
/// Contacts without registrations have zero.
pub fn leads_with_process_count(
    joined: &JoinedTable,
    count: usize,
) -> Result<JoinedTable, SchemaError> {
    let key = joined.column(ColumnRole::ProcessKey)?;
    let mut processes: HashMap<&str, HashSet<&str>> = HashMap::new();
    for row in 0..joined.len() {
        let Some(id) = joined.contact_id(row) else {
            continue;
        };
        let entry = processes.entry(id).or_default();
        if let Some(process) = trimmed(joined.cell(row, key)) {
            entry.insert(process);
        }
    }

    Ok(joined.subset((0..joined.len()).filter(|&row| {
        joined
            .contact_id(row)
            .and_then(|id| processes.get(id))
            .is_some_and(|set| set.len() == count)
    })))
}

/// Rows of one stage inside one selection process. Stage labels are matched
/// through the stage vocabulary, so case and padding differences are ignored.
pub fn stage_subset(
    joined: &JoinedTable,
    selection_process: &str,
    stage: Stage,
) -> Result<JoinedTable, SchemaError> {
    let in_process = filter_by_category(joined, ColumnRole::SelectionProcessName, selection_process)?;
    let column = in_process.column(ColumnRole::StageName)?;
    Ok(in_process.subset((0..in_process.len()).filter(|&row| {
        in_process
            .cell(row, column)
            .and_then(Stage::from_label)
            .is_some_and(|s| s == stage)
    })))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCount {
    pub label: String,
    pub stage: Option<Stage>,
    pub leads: usize,
}

/// Distinct identities per stage within a selection process: known stages in
/// funnel order, then unrecognised labels in first-seen order.
pub fn stage_breakdown(
    joined: &JoinedTable,
    selection_process: &str,
) -> Result<Vec<StageCount>, SchemaError> {
    let in_process = filter_by_category(joined, ColumnRole::SelectionProcessName, selection_process)?;
    let column = in_process.column(ColumnRole::StageName)?;

    let mut order: Vec<(Option<Stage>, String)> = Vec::new();
    let mut ids: HashMap<String, HashSet<&str>> = HashMap::new();
    for row in 0..in_process.len() {
        let Some(raw) = trimmed(in_process.cell(row, column)) else {
            continue;
        };
        let stage = Stage::from_label(raw);
        let label = stage.map(|s| s.label().to_string()).unwrap_or_else(|| raw.to_string());
        let entry = ids.entry(label.clone()).or_insert_with(|| {
            order.push((stage, label.clone()));
            HashSet::new()
        });
        if let Some(id) = in_process.contact_id(row) {
            entry.insert(id);
        }
    }

    order.sort_by_key(|(stage, _)| stage.map(Stage::ordinal).unwrap_or(usize::MAX));
    Ok(order
        .into_iter()
        .map(|(stage, label)| StageCount {
            leads: ids.get(&label).map(HashSet::len).unwrap_or_default(),
            label,
            stage,
        })
        .collect())
}
