use std::collections::HashSet;

use leadboard_core::{ColumnRole, SchemaError};
use serde::Serialize;

use crate::join::{trimmed, JoinedTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonAssociation {
    pub process: Option<String>,
    pub selection_process: Option<String>,
    pub stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonLookup {
    pub query: String,
    pub associations: Vec<PersonAssociation>,
    pub distinct_processes: usize,
    pub distinct_selection_processes: usize,
}

impl PersonLookup {
    fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            associations: Vec::new(),
            distinct_processes: 0,
            distinct_selection_processes: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.associations.is_empty()
    }
}

/// Every registration row of the contact(s) named `name`. Names match exactly
/// after trimming both sides. Contacts without registrations contribute no
/// associations. No match is an empty lookup, not an error.
pub fn lookup_person(joined: &JoinedTable, name: &str) -> Result<PersonLookup, SchemaError> {
    let query = name.trim();
    if query.is_empty() {
        return Ok(PersonLookup::empty(query));
    }

    let name_column = joined.column(ColumnRole::ContactName)?;
    let person_column = joined.column(ColumnRole::PersonRef)?;
    let process_column = joined.column(ColumnRole::ProcessName)?;
    let selection_column = joined.column(ColumnRole::SelectionProcessName).ok();
    let stage_column = joined.column(ColumnRole::StageName).ok();

    let owned = |column: Option<usize>, row: usize| {
        column
            .and_then(|c| joined.cell(row, c))
            .map(str::to_string)
    };

    let associations = (0..joined.len())
        .filter(|&row| trimmed(joined.cell(row, name_column)) == Some(query))
        .filter(|&row| joined.cell(row, person_column).is_some())
        .map(|row| PersonAssociation {
            process: owned(Some(process_column), row),
            selection_process: owned(selection_column, row),
            stage: owned(stage_column, row),
        })
        .collect::<Vec<_>>();

    let distinct_processes = associations
        .iter()
        .filter_map(|a| a.process.as_deref())
        .collect::<HashSet<_>>()
        .len();
    let distinct_selection_processes = associations
        .iter()
        .filter_map(|a| a.selection_process.as_deref())
        .collect::<HashSet<_>>()
        .len();

    Ok(PersonLookup {
        query: query.to_string(),
        associations,
        distinct_processes,
        distinct_selection_processes,
    })
}
