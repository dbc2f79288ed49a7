//! Axum + Askama dashboard for Leadboard.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use leadboard_core::{Lead, Stage};
use leadboard_pipeline::report::{CategoryLeads, LeadGroup};
use leadboard_pipeline::{
    lookup_person, render_markdown, Dashboard, DashboardReport, DashboardState, Pipeline,
    PipelineConfig, ReportRequest, Section,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub default_threshold: u8,
}

impl AppState {
    pub fn new(dashboard: Arc<Dashboard>, default_threshold: u8) -> Self {
        Self {
            dashboard,
            default_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct PeopleQuery {
    name: Option<String>,
}

#[derive(Debug, Clone)]
struct SelectOption {
    value: String,
    selected: bool,
}

#[derive(Debug, Clone)]
struct RowsTable {
    caption: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
struct Panel {
    title: String,
    summary: String,
    tables: Vec<RowsTable>,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    run_id: String,
    fetched_at: String,
    stale: bool,
    diagnostics: Vec<String>,
    process_options: Vec<SelectOption>,
    selection_options: Vec<SelectOption>,
    person: String,
    threshold: u8,
    panels: Vec<Panel>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/refresh", post(refresh_redirect_handler))
        .route("/report.md", get(markdown_handler))
        .route("/api/report", get(report_handler))
        .route("/api/options", get(options_handler))
        .route("/api/people", get(people_handler))
        .route("/api/duplicates", get(duplicates_handler))
        .route("/api/refresh", post(refresh_handler))
        .with_state(Arc::new(state))
}

/// Runs the first pipeline pass, then serves until shutdown.
pub async fn serve(config: PipelineConfig, port: u16) -> anyhow::Result<()> {
    let default_threshold = config.duplicate_threshold;
    let dashboard = Arc::new(Dashboard::new(Box::new(Pipeline::new(config)?)));
    let outcome = dashboard.refresh().await;
    if !outcome.diagnostics.is_empty() {
        warn!(
            run_id = %outcome.run_id,
            diagnostics = outcome.diagnostics.len(),
            "initial load finished with diagnostics"
        );
    }

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(addr = %listener.local_addr()?, "dashboard listening");
    axum::serve(listener, app(AppState::new(dashboard, default_threshold))).await?;
    Ok(())
}

async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<ReportRequest>,
) -> Response {
    match state.dashboard.current().await {
        Some(current) => {
            let report = DashboardReport::build(&current, &request, state.default_threshold);
            render_html(index_template(&report, &request, state.default_threshold))
        }
        None => not_loaded(),
    }
}

async fn markdown_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<ReportRequest>,
) -> Response {
    match state.dashboard.current().await {
        Some(current) => {
            let report = DashboardReport::build(&current, &request, state.default_threshold);
            (
                [(axum::http::header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
                render_markdown(&report),
            )
                .into_response()
        }
        None => not_loaded(),
    }
}

async fn report_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<ReportRequest>,
) -> Response {
    match state.dashboard.current().await {
        Some(current) => {
            Json(DashboardReport::build(&current, &request, state.default_threshold)).into_response()
        }
        None => not_loaded(),
    }
}

async fn options_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.dashboard.current().await {
        Some(current) => {
            let report =
                DashboardReport::build(&current, &ReportRequest::default(), state.default_threshold);
            let options = |section: &Section<CategoryLeads>| section.ready().map(|c| c.options.clone());
            Json(serde_json::json!({
                "processes": options(&report.processes),
                "selection_processes": options(&report.selection_processes),
            }))
            .into_response()
        }
        None => not_loaded(),
    }
}

async fn people_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeopleQuery>,
) -> Response {
    let Some(current) = state.dashboard.current().await else {
        return not_loaded();
    };
    let Some(joined) = current.snapshot.joined.as_ref() else {
        return unavailable(&current);
    };
    match lookup_person(joined, query.name.as_deref().unwrap_or_default()) {
        Ok(found) => Json(found).into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn duplicates_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<ReportRequest>,
) -> Response {
    match state.dashboard.current().await {
        Some(current) => {
            let report = DashboardReport::build(&current, &request, state.default_threshold);
            Json(report.duplicates).into_response()
        }
        None => not_loaded(),
    }
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.dashboard.refresh().await).into_response()
}

async fn refresh_redirect_handler(State(state): State<Arc<AppState>>) -> Response {
    let outcome = state.dashboard.refresh().await;
    info!(run_id = %outcome.run_id, applied = outcome.applied, "refresh requested from dashboard");
    Redirect::to("/").into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

fn not_loaded() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Html("No data loaded yet. POST /refresh to run the pipeline.".to_string()),
    )
        .into_response()
}

fn unavailable(current: &DashboardState) -> Response {
    let reasons = current
        .snapshot
        .diagnostics
        .iter()
        .map(|d| d.message.clone())
        .collect::<Vec<_>>();
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": "joined data unavailable", "diagnostics": reasons })),
    )
        .into_response()
}

fn select_options(section: &Section<CategoryLeads>) -> Vec<SelectOption> {
    section
        .ready()
        .map(|c| {
            c.options
                .iter()
                .map(|value| SelectOption {
                    selected: *value == c.selected,
                    value: value.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn leads_table(caption: String, leads: &[Lead]) -> RowsTable {
    RowsTable {
        caption,
        headers: vec!["id".into(), "nome".into()],
        rows: leads
            .iter()
            .map(|l| vec![l.id.clone(), l.name.clone()])
            .collect(),
    }
}

fn group_table(caption: &str, group: &LeadGroup) -> RowsTable {
    leads_table(
        format!("{caption} ({})", group.distinct_identities),
        &group.leads,
    )
}

fn panel<T>(title: &str, section: &Section<T>, build: impl FnOnce(&T) -> (String, Vec<RowsTable>)) -> Panel {
    let (summary, tables) = match section {
        Section::Ready(value) => build(value),
        Section::Skipped { reason } => (format!("Skipped: {reason}"), Vec::new()),
    };
    Panel {
        title: title.to_string(),
        summary,
        tables,
    }
}

fn index_template(report: &DashboardReport, request: &ReportRequest, default_threshold: u8) -> IndexTemplate {
    let mut panels = vec![
        panel("Leads per Process", &report.processes, |c| {
            (
                format!("{}: {} people", c.selected, c.distinct_identities),
                vec![leads_table("Leads".into(), &c.leads)],
            )
        }),
        panel("Leads per Selection Process", &report.selection_processes, |c| {
            (
                format!("{}: {} people", c.selected, c.distinct_identities),
                vec![leads_table("Leads".into(), &c.leads)],
            )
        }),
        panel("Stages", &report.stages, |s| {
            let breakdown = RowsTable {
                caption: "People per stage".into(),
                headers: vec!["stage".into(), "people".into()],
                rows: s
                    .breakdown
                    .iter()
                    .map(|c| vec![c.label.clone(), c.leads.to_string()])
                    .collect(),
            };
            (
                s.selection_process.clone(),
                vec![
                    breakdown,
                    group_table(Stage::PartiallyEnrolled.label(), &s.partially_enrolled),
                    group_table(Stage::Enrolled.label(), &s.enrolled),
                ],
            )
        }),
        panel("Similar Names Between Stages", &report.duplicates, |d| {
            (
                format!("{} pairs above {} similarity", d.matches.len(), d.threshold),
                vec![RowsTable {
                    caption: format!(
                        "{} vs {}",
                        Stage::PartiallyEnrolled.label(),
                        Stage::Enrolled.label()
                    ),
                    headers: vec!["name".into(), "similar name".into(), "score".into()],
                    rows: d
                        .matches
                        .iter()
                        .map(|m| vec![m.name_a.clone(), m.name_b.clone(), m.score.to_string()])
                        .collect(),
                }],
            )
        }),
        panel("Leads with 0 or 1 Process", &report.process_counts, |p| {
            (
                format!(
                    "{} without processes, {} with one",
                    p.without_process.distinct_identities, p.single_process.distinct_identities
                ),
                vec![
                    group_table("Without processes", &p.without_process),
                    group_table("With 1 process", &p.single_process),
                ],
            )
        }),
    ];
    if let Some(person) = &report.person {
        panels.push(panel("Processes per Person", person, |found| {
            (
                format!(
                    "{} is associated with {} distinct processes",
                    found.query, found.distinct_processes
                ),
                vec![RowsTable {
                    caption: "Associations".into(),
                    headers: vec!["process".into(), "selection process".into(), "stage".into()],
                    rows: found
                        .associations
                        .iter()
                        .map(|a| {
                            [&a.process, &a.selection_process, &a.stage]
                                .into_iter()
                                .map(|v| v.clone().unwrap_or_else(|| "-".into()))
                                .collect()
                        })
                        .collect(),
                }],
            )
        }));
    }

    IndexTemplate {
        run_id: report.run_id.to_string(),
        fetched_at: report.fetched_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        stale: report.stale,
        diagnostics: report.diagnostics.iter().map(|d| d.message.clone()).collect(),
        process_options: select_options(&report.processes),
        selection_options: select_options(&report.selection_processes),
        person: request.person.clone().unwrap_or_default(),
        threshold: request.duplicate_threshold.unwrap_or(default_threshold),
        panels,
    }
}
