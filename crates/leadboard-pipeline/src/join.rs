use std::collections::HashMap;

use leadboard_core::{ColumnMapping, ColumnRole, SchemaError, Table, TableKind};
use tracing::warn;

/// Contacts left-joined onto registrations, with every column role resolved
/// to its post-join header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedTable {
    table: Table,
    role_names: HashMap<ColumnRole, String>,
    id_column: usize,
}

impl JoinedTable {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Post-join header for a role.
    pub fn role_name(&self, role: ColumnRole) -> &str {
        self.role_names.get(&role).map(String::as_str).unwrap_or_default()
    }

    pub fn column(&self, role: ColumnRole) -> Result<usize, SchemaError> {
        self.table.require_column(TableKind::Joined, self.role_name(role))
    }

    /// Trimmed contact identifier; `None` for null or blank cells.
    pub fn contact_id(&self, row: usize) -> Option<&str> {
        trimmed(self.table.cell(row, self.id_column))
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.table.cell(row, column)
    }

    /// Same columns and roles, restricted to the given rows.
    pub fn subset(&self, rows: impl IntoIterator<Item = usize>) -> Self {
        Self {
            table: self.table.select_rows(rows),
            role_names: self.role_names.clone(),
            id_column: self.id_column,
        }
    }
}

pub(crate) fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn contact_column_name(column: &str, mapping: &ColumnMapping, registrations: &Table) -> String {
    if column != mapping.contact_id && registrations.has_column(column) {
        format!("{column}{}", mapping.contacts_suffix)
    } else {
        column.to_string()
    }
}

fn registration_column_name(column: &str, mapping: &ColumnMapping, contacts: &Table) -> String {
    if contacts.has_column(column) {
        format!("{column}{}", mapping.registrations_suffix)
    } else {
        column.to_string()
    }
}

/// Left-joins `contacts` (driving) onto `registrations` on
/// contact identifier = registration person reference.
///
/// Collisions: the contact identifier keeps its header; any other header
/// present in both tables gets the contacts suffix on the contact side and the
/// registrations suffix on the registration side.
pub fn join(
    contacts: &Table,
    registrations: &Table,
    mapping: &ColumnMapping,
) -> Result<JoinedTable, SchemaError> {
    let id_column = contacts.require_column(TableKind::Contacts, &mapping.contact_id)?;
    let person_column =
        registrations.require_column(TableKind::Registrations, &mapping.person_ref)?;

    let mut columns = contacts
        .columns()
        .iter()
        .map(|c| contact_column_name(c, mapping, registrations))
        .collect::<Vec<_>>();
    columns.extend(
        registrations
            .columns()
            .iter()
            .map(|c| registration_column_name(c, mapping, contacts)),
    );

    let role_names = ColumnRole::ALL
        .into_iter()
        .map(|role| {
            let raw = mapping.column(role);
            let name = match role.source() {
                TableKind::Registrations => registration_column_name(raw, mapping, contacts),
                _ => contact_column_name(raw, mapping, registrations),
            };
            (role, name)
        })
        .collect::<HashMap<_, _>>();

    let mut by_person: HashMap<&str, Vec<usize>> = HashMap::new();
    for row in 0..registrations.len() {
        if let Some(person) = trimmed(registrations.cell(row, person_column)) {
            by_person.entry(person).or_default().push(row);
        }
    }

    let mut seen_ids: HashMap<&str, usize> = HashMap::new();
    for row in 0..contacts.len() {
        if let Some(id) = trimmed(contacts.cell(row, id_column)) {
            *seen_ids.entry(id).or_default() += 1;
        }
    }
    let duplicated = seen_ids.values().filter(|count| **count > 1).count();
    if duplicated > 0 {
        warn!(
            duplicated,
            column = %mapping.contact_id,
            "contact identifiers are not unique; joined rows will repeat"
        );
    }

    let width = columns.len();
    let mut joined = Table::new(columns);
    for (row, contact) in contacts.rows().iter().enumerate() {
        let matches = trimmed(contacts.cell(row, id_column)).and_then(|id| by_person.get(id));
        match matches {
            Some(indices) => {
                for &idx in indices {
                    let mut cells = contact.clone();
                    cells.resize(contacts.columns().len(), None);
                    cells.extend(registrations.rows()[idx].iter().cloned());
                    joined.push_row(cells);
                }
            }
            None => {
                let mut cells = contact.clone();
                cells.resize(width, None);
                joined.push_row(cells);
            }
        }
    }

    Ok(JoinedTable {
        table: joined,
        role_names,
        id_column,
    })
}
