use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use leadboard_core::Stage;
use leadboard_pipeline::config::web_port_from_env;
use leadboard_pipeline::{
    lookup_person, render_markdown, Dashboard, DashboardReport, DashboardState, Pipeline,
    PipelineConfig, ReportRequest, Section,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const LOG_VAR: &str = "LEADBOARD_LOG";

#[derive(Debug, Parser)]
#[command(name = "leadboard")]
#[command(about = "Contact and registration lead views")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, join and print every dashboard section.
    Report(ReportArgs),
    /// Processes a person is associated with.
    Lookup { name: String },
    /// Similar names between "Inscrito parcial" and "Inscrito".
    Duplicates {
        #[arg(long)]
        selection_process: Option<String>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,
    },
    /// Run the web dashboard.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Default, Args)]
struct ReportArgs {
    #[arg(long)]
    process: Option<String>,
    #[arg(long)]
    selection_process: Option<String>,
    #[arg(long)]
    person: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: Option<u8>,
    /// Print JSON instead of markdown.
    #[arg(long)]
    json: bool,
}

impl ReportArgs {
    fn request(&self) -> ReportRequest {
        ReportRequest {
            process: self.process.clone(),
            selection_process: self.selection_process.clone(),
            person: self.person.clone(),
            duplicate_threshold: self.threshold,
        }
    }
}

fn init_logging() {
    let filter = std::env::var(LOG_VAR)
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs the pipeline once and returns what the dashboard would show.
async fn load(config: PipelineConfig) -> Result<DashboardState> {
    let dashboard = Dashboard::new(Box::new(Pipeline::new(config)?));
    let outcome = dashboard.refresh().await;
    for diagnostic in &outcome.diagnostics {
        warn!(step = ?diagnostic.step, "{}", diagnostic.message);
    }
    dashboard
        .current()
        .await
        .context("pipeline run produced no snapshot")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PipelineConfig::from_env().context("loading configuration")?;
    init_logging();
    let default_threshold = config.duplicate_threshold;

    match cli.command.unwrap_or(Commands::Report(ReportArgs::default())) {
        Commands::Report(args) => {
            let state = load(config).await?;
            let report = DashboardReport::build(&state, &args.request(), default_threshold);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_markdown(&report));
            }
        }
        Commands::Lookup { name } => {
            let state = load(config).await?;
            let Some(joined) = state.snapshot.joined.as_ref() else {
                bail!("joined data unavailable; see warnings above");
            };
            let found = lookup_person(joined, &name)?;
            if found.is_empty() {
                println!("no registrations found for `{}`", found.query);
            } else {
                println!(
                    "{}: {} distinct processes, {} distinct selection processes",
                    found.query, found.distinct_processes, found.distinct_selection_processes
                );
                for a in &found.associations {
                    println!(
                        "  {} | {} | {}",
                        a.process.as_deref().unwrap_or("-"),
                        a.selection_process.as_deref().unwrap_or("-"),
                        a.stage.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Duplicates {
            selection_process,
            threshold,
        } => {
            let state = load(config).await?;
            let request = ReportRequest {
                selection_process,
                duplicate_threshold: threshold,
                ..Default::default()
            };
            match DashboardReport::build(&state, &request, default_threshold).duplicates {
                Section::Ready(scan) => {
                    println!(
                        "{}: {} vs {} (threshold {})",
                        scan.selection_process,
                        Stage::PartiallyEnrolled,
                        Stage::Enrolled,
                        scan.threshold
                    );
                    for m in &scan.matches {
                        println!("  {:>3}  {}  ~  {}", m.score, m.name_a, m.name_b);
                    }
                }
                Section::Skipped { reason } => bail!("duplicate scan skipped: {reason}"),
            }
        }
        Commands::Serve { port } => {
            leadboard_web::serve(config, port.unwrap_or_else(web_port_from_env)).await?;
        }
    }

    Ok(())
}
