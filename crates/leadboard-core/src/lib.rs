//! Core tabular model, column roles and stage vocabulary for Leadboard.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single CSV cell. Empty cells are `None`.
pub type Cell = Option<String>;

/// Which table a column was expected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Contacts,
    Registrations,
    Joined,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Contacts => "contacts",
            Self::Registrations => "registrations",
            Self::Joined => "joined",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{table} table is missing required column `{column}`")]
    MissingColumn { table: TableKind, column: String },
}

/// Immutable, column-ordered table of optional string cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Appends a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn require_column(&self, table: TableKind, name: &str) -> Result<usize, SchemaError> {
        self.column_index(name)
            .ok_or_else(|| SchemaError::MissingColumn {
                table,
                column: name.to_string(),
            })
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .and_then(|c| c.as_deref())
    }

    /// New table holding the given rows, in the order given.
    pub fn select_rows(&self, indices: impl IntoIterator<Item = usize>) -> Self {
        let rows = indices
            .into_iter()
            .filter_map(|idx| self.rows.get(idx).cloned())
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// Logical columns the pipeline reads, independent of export naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    ContactId,
    ContactName,
    PersonRef,
    ProcessName,
    SelectionProcessName,
    StageName,
    ProcessKey,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 7] = [
        ColumnRole::ContactId,
        ColumnRole::ContactName,
        ColumnRole::PersonRef,
        ColumnRole::ProcessName,
        ColumnRole::SelectionProcessName,
        ColumnRole::StageName,
        ColumnRole::ProcessKey,
    ];

    /// The source table that owns this role's column.
    pub const fn source(self) -> TableKind {
        match self {
            Self::ContactId | Self::ContactName => TableKind::Contacts,
            _ => TableKind::Registrations,
        }
    }
}

/// Maps column roles onto concrete CSV header names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub contact_id: String,
    pub contact_name: String,
    pub person_ref: String,
    pub process_name: String,
    pub selection_process_name: String,
    pub stage_name: String,
    pub process_key: String,
    pub contacts_suffix: String,
    pub registrations_suffix: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            contact_id: "id".into(),
            contact_name: "nome".into(),
            person_ref: "pessoa".into(),
            process_name: "processoNome".into(),
            selection_process_name: "processoSeletivoNome".into(),
            stage_name: "etapaNome".into(),
            process_key: "processo".into(),
            contacts_suffix: "_contatos".into(),
            registrations_suffix: "_registros".into(),
        }
    }
}

impl ColumnMapping {
    pub fn column(&self, role: ColumnRole) -> &str {
        match role {
            ColumnRole::ContactId => &self.contact_id,
            ColumnRole::ContactName => &self.contact_name,
            ColumnRole::PersonRef => &self.person_ref,
            ColumnRole::ProcessName => &self.process_name,
            ColumnRole::SelectionProcessName => &self.selection_process_name,
            ColumnRole::StageName => &self.stage_name,
            ColumnRole::ProcessKey => &self.process_key,
        }
    }
}

/// Selection-process stages, in funnel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NoStage,
    PartiallyEnrolled,
    Enrolled,
    DocumentationSent,
    AbsentFromExam,
    PresentAtExam,
    Disqualified,
    Approved,
    Called,
    FitForEnrollment,
    ProvisionalEnrollment,
    EnrolledFinal,
    EnrollmentCancelled,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::NoStage,
        Stage::PartiallyEnrolled,
        Stage::Enrolled,
        Stage::DocumentationSent,
        Stage::AbsentFromExam,
        Stage::PresentAtExam,
        Stage::Disqualified,
        Stage::Approved,
        Stage::Called,
        Stage::FitForEnrollment,
        Stage::ProvisionalEnrollment,
        Stage::EnrolledFinal,
        Stage::EnrollmentCancelled,
    ];

    /// Label as it appears in the registrations export.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoStage => "Sem etapa definida",
            Self::PartiallyEnrolled => "Inscrito parcial",
            Self::Enrolled => "Inscrito",
            Self::DocumentationSent => "Documentação enviada",
            Self::AbsentFromExam => "Ausente na prova",
            Self::PresentAtExam => "Presente na prova",
            Self::Disqualified => "Desclassificado",
            Self::Approved => "Aprovado",
            Self::Called => "Convocado",
            Self::FitForEnrollment => "Apto para matrícula",
            Self::ProvisionalEnrollment => "Matrícula provisória",
            Self::EnrolledFinal => "Matriculado",
            Self::EnrollmentCancelled => "Matrícula cancelada",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let needle = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.label().to_lowercase() == needle)
    }

    /// Position in the funnel, used to order stage breakdowns.
    pub fn ordinal(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Display projection of a contact: identifier and name, both trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn push_row_pads_short_rows_with_nulls() {
        let mut table = Table::new(cols(&["id", "nome", "email"]));
        table.push_row(vec![Some("1".into())]);
        assert_eq!(table.rows()[0], vec![Some("1".into()), None, None]);
        assert_eq!(table.cell(0, 0), Some("1"));
        assert_eq!(table.cell(0, 1), None);
    }

    #[test]
    fn require_column_names_table_and_column() {
        let table = Table::new(cols(&["id"]));
        let err = table
            .require_column(TableKind::Registrations, "pessoa")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "registrations table is missing required column `pessoa`"
        );
    }

    #[test]
    fn select_rows_keeps_requested_order() {
        let table = Table::from_rows(
            cols(&["id"]),
            vec![vec![Some("a".into())], vec![Some("b".into())], vec![Some("c".into())]],
        );
        let subset = table.select_rows([2, 0, 9]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.cell(0, 0), Some("c"));
        assert_eq!(subset.cell(1, 0), Some("a"));
    }

    #[test]
    fn stage_labels_parse_case_insensitively() {
        assert_eq!(Stage::from_label(" inscrito PARCIAL "), Some(Stage::PartiallyEnrolled));
        assert_eq!(Stage::from_label("Inscrito"), Some(Stage::Enrolled));
        assert_eq!(Stage::from_label("Fase desconhecida"), None);
        assert!(Stage::PartiallyEnrolled.ordinal() < Stage::Enrolled.ordinal());
    }

    #[test]
    fn default_mapping_matches_export_headers() {
        let mapping = ColumnMapping::default();
        assert_eq!(mapping.column(ColumnRole::PersonRef), "pessoa");
        assert_eq!(mapping.column(ColumnRole::SelectionProcessName), "processoSeletivoNome");
        assert_eq!(ColumnRole::ContactName.source(), TableKind::Contacts);
        assert_eq!(ColumnRole::StageName.source(), TableKind::Registrations);
    }
}
