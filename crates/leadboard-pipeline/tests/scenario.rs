use leadboard_core::{ColumnMapping, ColumnRole, Table};
use leadboard_pipeline::leads::{count_distinct_identities, filter_by_category};
use leadboard_pipeline::{
    find_near_duplicates, join, lookup_person, render_markdown, DashboardReport, DashboardState,
    ReportRequest, Snapshot,
};
use std::sync::Arc;

fn cell(value: &str) -> Option<String> {
    Some(value.to_string())
}

fn contacts() -> Table {
    Table::from_rows(
        vec!["id".into(), "nome".into()],
        vec![
            vec![cell("1"), cell("Ana Silva")],
            vec![cell("2"), cell("Ana Silva ")],
        ],
    )
}

fn registrations() -> Table {
    Table::from_rows(
        vec!["pessoa".into(), "processoNome".into(), "etapaNome".into()],
        vec![vec![cell("1"), cell("P1"), cell("Inscrito")]],
    )
}

#[test]
fn two_contacts_one_registration() {
    let joined = join(&contacts(), &registrations(), &ColumnMapping::default()).expect("join");
    assert_eq!(joined.len(), 2);

    let process = joined.column(ColumnRole::ProcessName).expect("process column");
    assert_eq!(joined.contact_id(1), Some("2"));
    assert_eq!(joined.cell(1, process), None);

    let p1 = filter_by_category(&joined, ColumnRole::ProcessName, "P1").expect("filter");
    assert_eq!(count_distinct_identities(&p1), 1);

    let pairs = find_near_duplicates(&["Ana Silva"], &["Ana Silva "], 98);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].score, 100);

    let nobody = lookup_person(&joined, "Nonexistent Person").expect("lookup");
    assert!(nobody.associations.is_empty());
    assert_eq!(nobody.distinct_processes, 0);
}

#[test]
fn report_renders_sections_that_have_their_columns() {
    let snapshot = Snapshot::from_tables(contacts(), registrations(), &ColumnMapping::default());
    let state = DashboardState {
        snapshot: Arc::new(snapshot),
        stale: false,
        failed_refresh: None,
    };
    let request = ReportRequest {
        person: Some("Ana Silva".into()),
        ..Default::default()
    };
    let report = DashboardReport::build(&state, &request, 98);

    let processes = report.processes.ready().expect("processes section");
    assert_eq!(processes.selected, "P1");
    assert_eq!(processes.distinct_identities, 1);

    // no processoSeletivoNome column in this export
    assert!(report.stages.ready().is_none());
    assert!(report.duplicates.ready().is_none());

    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["processes"]["status"], "ready");
    assert_eq!(json["stages"]["status"], "skipped");

    let text = render_markdown(&report);
    assert!(text.contains("Processes per Person"));
    assert!(text.contains("processoSeletivoNome"));
}
