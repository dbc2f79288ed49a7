//! Fetch, join and lead views for the Leadboard dashboard.
//!
//! The view functions in [`leads`], [`duplicates`] and [`lookup`] are pure
//! functions over an immutable [`JoinedTable`]; [`run`] wires them to the
//! HTTP fetcher and keeps the snapshot the dashboard shows.

pub mod config;
pub mod duplicates;
pub mod join;
pub mod leads;
pub mod lookup;
pub mod report;
pub mod run;

pub use config::{ConfigError, PipelineConfig};
pub use duplicates::{find_near_duplicates, similarity, NearDuplicate, DEFAULT_DUPLICATE_THRESHOLD};
pub use join::{join, JoinedTable};
pub use lookup::{lookup_person, PersonLookup};
pub use report::{render_markdown, DashboardReport, ReportRequest, Section};
pub use run::{Dashboard, DashboardState, Diagnostic, Pipeline, RefreshOutcome, Snapshot, SnapshotSource};
