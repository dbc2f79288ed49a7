use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadboard_core::{ColumnMapping, Table};
use leadboard_fetch::{FetchError, HttpFetcher};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::join::{join, JoinedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    FetchContacts,
    FetchRegistrations,
    Join,
}

/// A recoverable failure shown to the user next to whatever data survived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub step: PipelineStep,
    pub message: String,
}

/// Result of one fetch + join pass. Failed fetches leave an empty table and a
/// diagnostic; `joined` is only present when both fetches and the join
/// succeeded.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub contacts: Table,
    pub registrations: Table,
    pub joined: Option<JoinedTable>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Snapshot {
    pub fn assemble(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        contacts: Result<Table, FetchError>,
        registrations: Result<Table, FetchError>,
        mapping: &ColumnMapping,
    ) -> Self {
        let mut diagnostics = Vec::new();
        let mut take = |step: PipelineStep, fetched: Result<Table, FetchError>| match fetched {
            Ok(table) => Some(table),
            Err(err) => {
                warn!(%run_id, ?step, error = %err, "dataset fetch failed");
                diagnostics.push(Diagnostic {
                    step,
                    message: err.to_string(),
                });
                None
            }
        };
        let contacts = take(PipelineStep::FetchContacts, contacts);
        let registrations = take(PipelineStep::FetchRegistrations, registrations);

        let joined = match (&contacts, &registrations) {
            (Some(contacts), Some(registrations)) => match join(contacts, registrations, mapping) {
                Ok(joined) => Some(joined),
                Err(err) => {
                    warn!(%run_id, error = %err, "join skipped");
                    diagnostics.push(Diagnostic {
                        step: PipelineStep::Join,
                        message: err.to_string(),
                    });
                    None
                }
            },
            _ => None,
        };

        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            contacts: contacts.unwrap_or_default(),
            registrations: registrations.unwrap_or_default(),
            joined,
            diagnostics,
        }
    }

    /// Snapshot over tables already in memory.
    pub fn from_tables(contacts: Table, registrations: Table, mapping: &ColumnMapping) -> Self {
        Self::assemble(Uuid::new_v4(), Utc::now(), Ok(contacts), Ok(registrations), mapping)
    }

    pub fn is_healthy(&self) -> bool {
        self.diagnostics.is_empty() && self.joined.is_some()
    }
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self) -> Snapshot;
}

pub struct Pipeline {
    config: PipelineConfig,
    http: HttpFetcher,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        let http = HttpFetcher::new(config.http_client_config(), Some(config.credentials.clone()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches both datasets concurrently, then joins.
    pub async fn run_once(&self) -> Snapshot {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let (contacts, registrations) = tokio::join!(
            self.http.fetch_table(run_id, "contacts", &self.config.contacts_url),
            self.http.fetch_table(run_id, "registrations", &self.config.records_url),
        );
        let snapshot = Snapshot::assemble(
            run_id,
            started_at,
            contacts,
            registrations,
            &self.config.columns,
        );
        info!(
            %run_id,
            contacts = snapshot.contacts.len(),
            registrations = snapshot.registrations.len(),
            joined = snapshot.joined.as_ref().map(JoinedTable::len).unwrap_or_default(),
            diagnostics = snapshot.diagnostics.len(),
            "pipeline run finished"
        );
        snapshot
    }
}

#[async_trait]
impl SnapshotSource for Pipeline {
    async fn load(&self) -> Snapshot {
        self.run_once().await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRefresh {
    pub run_id: Uuid,
    pub attempted_at: DateTime<Utc>,
    pub diagnostics: Vec<Diagnostic>,
}

/// What the dashboard currently shows. `stale` means the latest refresh
/// failed and `snapshot` comes from an earlier run.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub snapshot: Arc<Snapshot>,
    pub stale: bool,
    pub failed_refresh: Option<FailedRefresh>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub run_id: Uuid,
    pub applied: bool,
    pub stale: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Holds the displayed snapshot and swaps it whole on refresh.
pub struct Dashboard {
    source: Box<dyn SnapshotSource>,
    state: RwLock<Option<DashboardState>>,
    refresh_lock: Mutex<()>,
}

impl Dashboard {
    pub fn new(source: Box<dyn SnapshotSource>) -> Self {
        Self {
            source,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn current(&self) -> Option<DashboardState> {
        self.state.read().await.clone()
    }

    /// Reruns the pipeline. A healthy result replaces the current snapshot;
    /// a failed one keeps the previous snapshot and marks it stale. With
    /// nothing loaded yet, whatever came back is shown.
    pub async fn refresh(&self) -> RefreshOutcome {
        let _serialized = self.refresh_lock.lock().await;
        let snapshot = self.source.load().await;
        let healthy = snapshot.is_healthy();
        let run_id = snapshot.run_id;
        let diagnostics = snapshot.diagnostics.clone();

        let mut state = self.state.write().await;
        let applied = healthy || state.is_none();
        if applied {
            *state = Some(DashboardState {
                snapshot: Arc::new(snapshot),
                stale: false,
                failed_refresh: None,
            });
        } else if let Some(current) = state.as_mut() {
            warn!(%run_id, "refresh failed; keeping previous snapshot");
            current.stale = true;
            current.failed_refresh = Some(FailedRefresh {
                run_id,
                attempted_at: snapshot.finished_at,
                diagnostics: diagnostics.clone(),
            });
        }

        RefreshOutcome {
            run_id,
            applied,
            stale: state.as_ref().is_some_and(|s| s.stale),
            diagnostics,
        }
    }
}
