use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use leadboard_core::{ColumnRole, Lead, SchemaError, Stage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::duplicates::{stage_near_duplicates, NearDuplicate};
use crate::join::JoinedTable;
use crate::leads::{
    category_options, count_distinct_identities, filter_by_category, leads,
    leads_with_process_count, stage_breakdown, stage_subset, StageCount,
};
use crate::lookup::{lookup_person, PersonLookup};
use crate::run::{DashboardState, Diagnostic};

/// Selector values and search text coming from the UI or CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRequest {
    pub process: Option<String>,
    pub selection_process: Option<String>,
    pub person: Option<String>,
    pub duplicate_threshold: Option<u8>,
}

#[derive(Debug, Clone, Error)]
enum Skip {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("no {0} found in the data")]
    NoOptions(&'static str),
    #[error("data unavailable: {0}")]
    Unavailable(String),
}

/// One dashboard section: computed, or skipped with the reason shown instead.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    Ready(T),
    Skipped { reason: String },
}

impl<T> Section<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Skipped { .. } => None,
        }
    }
}

fn section<T>(result: Result<T, Skip>) -> Section<T> {
    match result {
        Ok(value) => Section::Ready(value),
        Err(skip) => skipped(&skip),
    }
}

fn skipped<T>(skip: &Skip) -> Section<T> {
    Section::Skipped {
        reason: skip.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryLeads {
    pub options: Vec<String>,
    pub selected: String,
    pub distinct_identities: usize,
    pub leads: Vec<Lead>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadGroup {
    pub distinct_identities: usize,
    pub leads: Vec<Lead>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageComparison {
    pub selection_process: String,
    pub partially_enrolled: LeadGroup,
    pub enrolled: LeadGroup,
    pub breakdown: Vec<StageCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateScan {
    pub selection_process: String,
    pub threshold: u8,
    pub matches: Vec<NearDuplicate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessCountLeads {
    pub without_process: LeadGroup,
    pub single_process: LeadGroup,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub processes: Section<CategoryLeads>,
    pub selection_processes: Section<CategoryLeads>,
    pub stages: Section<StageComparison>,
    pub duplicates: Section<DuplicateScan>,
    pub process_counts: Section<ProcessCountLeads>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<Section<PersonLookup>>,
}

impl DashboardReport {
    pub fn build(state: &DashboardState, request: &ReportRequest, default_threshold: u8) -> Self {
        let snapshot = &state.snapshot;
        let mut diagnostics = snapshot.diagnostics.clone();
        if let Some(failed) = &state.failed_refresh {
            diagnostics.extend(failed.diagnostics.iter().cloned());
        }

        let person_query = request
            .person
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());

        let Some(joined) = snapshot.joined.as_ref() else {
            let skip = Skip::Unavailable(
                diagnostics
                    .iter()
                    .map(|d| d.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            );
            return Self {
                run_id: snapshot.run_id,
                fetched_at: snapshot.finished_at,
                stale: state.stale,
                diagnostics,
                processes: skipped(&skip),
                selection_processes: skipped(&skip),
                stages: skipped(&skip),
                duplicates: skipped(&skip),
                process_counts: skipped(&skip),
                person: person_query.map(|_| skipped(&skip)),
            };
        };

        let threshold = request.duplicate_threshold.unwrap_or(default_threshold);
        let selection_process = resolve_selection(
            joined,
            ColumnRole::SelectionProcessName,
            request.selection_process.as_deref(),
            "selection processes",
        );

        Self {
            run_id: snapshot.run_id,
            fetched_at: snapshot.finished_at,
            stale: state.stale,
            diagnostics,
            processes: section(category_leads(
                joined,
                ColumnRole::ProcessName,
                request.process.as_deref(),
                "processes",
            )),
            selection_processes: section(category_leads(
                joined,
                ColumnRole::SelectionProcessName,
                request.selection_process.as_deref(),
                "selection processes",
            )),
            stages: section(
                selection_process
                    .as_ref()
                    .map_err(Skip::clone)
                    .and_then(|(_, ps)| stage_comparison(joined, ps)),
            ),
            duplicates: section(selection_process.as_ref().map_err(Skip::clone).and_then(
                |(_, ps)| {
                    Ok(DuplicateScan {
                        selection_process: ps.clone(),
                        threshold,
                        matches: stage_near_duplicates(
                            joined,
                            ps,
                            Stage::PartiallyEnrolled,
                            Stage::Enrolled,
                            threshold,
                        )?,
                    })
                },
            )),
            process_counts: section(process_counts(joined)),
            person: person_query.map(|q| section(lookup_person(joined, q).map_err(Skip::from))),
        }
    }
}

/// Options plus the selected value: the requested one, else the first option.
fn resolve_selection(
    joined: &JoinedTable,
    role: ColumnRole,
    requested: Option<&str>,
    what: &'static str,
) -> Result<(Vec<String>, String), Skip> {
    let options = category_options(joined, role)?;
    let selected = requested
        .map(str::to_string)
        .or_else(|| options.first().cloned())
        .ok_or(Skip::NoOptions(what))?;
    Ok((options, selected))
}

fn lead_group(view: &JoinedTable) -> Result<LeadGroup, Skip> {
    Ok(LeadGroup {
        distinct_identities: count_distinct_identities(view),
        leads: leads(view)?,
    })
}

fn category_leads(
    joined: &JoinedTable,
    role: ColumnRole,
    requested: Option<&str>,
    what: &'static str,
) -> Result<CategoryLeads, Skip> {
    let (options, selected) = resolve_selection(joined, role, requested, what)?;
    let view = filter_by_category(joined, role, &selected)?;
    let group = lead_group(&view)?;
    Ok(CategoryLeads {
        options,
        selected,
        distinct_identities: group.distinct_identities,
        leads: group.leads,
    })
}

fn stage_comparison(joined: &JoinedTable, selection_process: &str) -> Result<StageComparison, Skip> {
    let partial = stage_subset(joined, selection_process, Stage::PartiallyEnrolled)?;
    let enrolled = stage_subset(joined, selection_process, Stage::Enrolled)?;
    Ok(StageComparison {
        selection_process: selection_process.to_string(),
        partially_enrolled: lead_group(&partial)?,
        enrolled: lead_group(&enrolled)?,
        breakdown: stage_breakdown(joined, selection_process)?,
    })
}

fn process_counts(joined: &JoinedTable) -> Result<ProcessCountLeads, Skip> {
    Ok(ProcessCountLeads {
        without_process: lead_group(&leads_with_process_count(joined, 0)?)?,
        single_process: lead_group(&leads_with_process_count(joined, 1)?)?,
    })
}

fn push_leads(out: &mut String, leads: &[Lead]) {
    if leads.is_empty() {
        out.push_str("_none_\n");
        return;
    }
    out.push_str("| id | nome |\n|---|---|\n");
    for lead in leads {
        let _ = writeln!(out, "| {} | {} |", lead.id, lead.name);
    }
}

fn push_section<T>(out: &mut String, title: &str, section: &Section<T>, body: impl FnOnce(&mut String, &T)) {
    let _ = writeln!(out, "## {title}\n");
    match section {
        Section::Ready(value) => body(out, value),
        Section::Skipped { reason } => {
            let _ = writeln!(out, "_skipped: {reason}_");
        }
    }
    out.push('\n');
}

/// Markdown rendering of a report, for terminals and files.
pub fn render_markdown(report: &DashboardReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Leadboard Report\n");
    let _ = writeln!(out, "- Run ID: `{}`", report.run_id);
    let _ = writeln!(out, "- Fetched: {}", report.fetched_at);
    if report.stale {
        out.push_str("- **Stale:** the latest refresh failed; showing the previous run\n");
    }
    for diagnostic in &report.diagnostics {
        let _ = writeln!(out, "- Warning ({:?}): {}", diagnostic.step, diagnostic.message);
    }
    out.push('\n');

    push_section(&mut out, "Leads per Process", &report.processes, |out, v| {
        let _ = writeln!(out, "Process **{}**: {} people\n", v.selected, v.distinct_identities);
        push_leads(out, &v.leads);
    });
    push_section(&mut out, "Leads per Selection Process", &report.selection_processes, |out, v| {
        let _ = writeln!(out, "Selection process **{}**: {} people\n", v.selected, v.distinct_identities);
        push_leads(out, &v.leads);
    });
    push_section(&mut out, "Stages", &report.stages, |out, v| {
        let _ = writeln!(out, "Selection process **{}**\n", v.selection_process);
        for count in &v.breakdown {
            let _ = writeln!(out, "- {}: {}", count.label, count.leads);
        }
        let _ = writeln!(out, "\n### {} ({})\n", Stage::PartiallyEnrolled, v.partially_enrolled.distinct_identities);
        push_leads(out, &v.partially_enrolled.leads);
        let _ = writeln!(out, "\n### {} ({})\n", Stage::Enrolled, v.enrolled.distinct_identities);
        push_leads(out, &v.enrolled.leads);
    });
    push_section(&mut out, "Similar Names Between Stages", &report.duplicates, |out, v| {
        if v.matches.is_empty() {
            let _ = writeln!(out, "No names above {} similarity.", v.threshold);
            return;
        }
        let _ = writeln!(out, "{} pairs above {} similarity:\n", v.matches.len(), v.threshold);
        out.push_str("| Inscrito parcial | Inscrito | score |\n|---|---|---|\n");
        for m in &v.matches {
            let _ = writeln!(out, "| {} | {} | {} |", m.name_a, m.name_b, m.score);
        }
    });
    push_section(&mut out, "Leads with 0 or 1 Process", &report.process_counts, |out, v| {
        let _ = writeln!(out, "### Without processes ({})\n", v.without_process.distinct_identities);
        push_leads(out, &v.without_process.leads);
        let _ = writeln!(out, "\n### With 1 process ({})\n", v.single_process.distinct_identities);
        push_leads(out, &v.single_process.leads);
    });
    if let Some(person) = &report.person {
        push_section(&mut out, "Processes per Person", person, |out, v| {
            let _ = writeln!(
                out,
                "**{}** is associated with {} distinct processes.\n",
                v.query, v.distinct_processes
            );
            for a in &v.associations {
                let _ = writeln!(
                    out,
                    "- {} / {} / {}",
                    a.process.as_deref().unwrap_or("-"),
                    a.selection_process.as_deref().unwrap_or("-"),
                    a.stage.as_deref().unwrap_or("-")
                );
            }
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::Snapshot;
    use leadboard_core::{ColumnMapping, Table};
    use leadboard_fetch::FetchError;
    use std::sync::Arc;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                        .collect()
                })
                .collect(),
        )
    }

    fn state(snapshot: Snapshot) -> DashboardState {
        DashboardState {
            snapshot: Arc::new(snapshot),
            stale: false,
            failed_refresh: None,
        }
    }

    fn healthy() -> DashboardState {
        let contacts = table(
            &["id", "nome"],
            &[&["1", "Ana Silva"], &["2", "Ana Silva "], &["3", "Bruno Costa"]],
        );
        let registrations = table(
            &["pessoa", "processo", "processoNome", "processoSeletivoNome", "etapaNome"],
            &[
                &["1", "10", "P1", "Vestibular 2025", "Inscrito"],
                &["2", "11", "P2", "Vestibular 2025", "Inscrito parcial"],
                &["3", "11", "P2", "Transferência", "Aprovado"],
            ],
        );
        state(Snapshot::from_tables(contacts, registrations, &ColumnMapping::default()))
    }

    #[test]
    fn defaults_select_first_options() {
        let report = DashboardReport::build(&healthy(), &ReportRequest::default(), 98);
        let processes = report.processes.ready().expect("processes");
        assert_eq!(processes.selected, "P1");
        assert_eq!(processes.options, vec!["P1", "P2"]);
        assert_eq!(processes.distinct_identities, 1);

        let stages = report.stages.ready().expect("stages");
        assert_eq!(stages.selection_process, "Vestibular 2025");
        assert_eq!(stages.partially_enrolled.distinct_identities, 1);
        assert_eq!(stages.enrolled.distinct_identities, 1);

        let duplicates = report.duplicates.ready().expect("duplicates");
        assert_eq!(duplicates.matches.len(), 1);
        assert_eq!(duplicates.matches[0].score, 100);
        assert!(report.person.is_none());
    }

    #[test]
    fn requested_selection_and_person_are_used() {
        let request = ReportRequest {
            process: Some("P2".into()),
            selection_process: Some("Transferência".into()),
            person: Some(" Bruno Costa ".into()),
            duplicate_threshold: None,
        };
        let report = DashboardReport::build(&healthy(), &request, 98);
        assert_eq!(report.processes.ready().expect("processes").distinct_identities, 2);
        let stages = report.stages.ready().expect("stages");
        assert!(stages.partially_enrolled.leads.is_empty());
        let person = report
            .person
            .as_ref()
            .and_then(Section::ready)
            .expect("person");
        assert_eq!(person.distinct_processes, 1);
    }

    #[test]
    fn missing_stage_column_skips_only_dependent_sections() {
        let contacts = table(&["id", "nome"], &[&["1", "Ana"]]);
        let registrations = table(
            &["pessoa", "processo", "processoNome", "processoSeletivoNome"],
            &[&["1", "10", "P1", "PS"]],
        );
        let report = DashboardReport::build(
            &state(Snapshot::from_tables(contacts, registrations, &ColumnMapping::default())),
            &ReportRequest::default(),
            98,
        );
        assert!(report.processes.ready().is_some());
        assert!(report.process_counts.ready().is_some());
        assert!(matches!(report.stages, Section::Skipped { .. }));
        assert!(matches!(report.duplicates, Section::Skipped { .. }));
    }

    #[test]
    fn unavailable_data_skips_every_section_with_reason() {
        let snapshot = Snapshot::assemble(
            Uuid::new_v4(),
            Utc::now(),
            Err(FetchError::HttpStatus {
                status: 401,
                url: "https://crm.example.com/contatos.csv".into(),
            }),
            Ok(Table::default()),
            &ColumnMapping::default(),
        );
        let request = ReportRequest {
            person: Some("Ana".into()),
            ..Default::default()
        };
        let report = DashboardReport::build(&state(snapshot), &request, 98);
        match &report.processes {
            Section::Skipped { reason } => assert!(reason.contains("401")),
            Section::Ready(_) => panic!("expected skipped section"),
        }
        assert!(matches!(report.person, Some(Section::Skipped { .. })));
    }

    #[test]
    fn markdown_lists_sections_and_pairs() {
        let report = DashboardReport::build(&healthy(), &ReportRequest::default(), 98);
        let text = render_markdown(&report);
        assert!(text.contains("# Leadboard Report"));
        assert!(text.contains("## Leads per Process"));
        assert!(text.contains("| Ana Silva | Ana Silva | 100 |"));
        assert!(text.contains("### Without processes (0)"));
    }
}
