//! # masterchef CLI
//!
//! Thin wrapper over the `masterchef` library: parses a document, plans it,
//! and either reports what it finds (`plan`/`check`/`snapshot diff`) or
//! carries it out (`apply`). Exit codes follow §6's collaborator-facing
//! convention.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use masterchef::config::EngineConfig;
use masterchef::executor::CancellationToken;
use masterchef::handlers::HandlerRegistry;
use masterchef::model::{Document, Plan};
use masterchef::run_store::RunStore;
use masterchef::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use masterchef::transport::TransportRegistry;
use masterchef::{blast_radius, canonical, expander, loader, planner, simulator, snapshot, validation};

const EXIT_SUCCESS: u8 = 0;
const EXIT_GENERIC_ERROR: u8 = 1;
const EXIT_CHANGES_WOULD_APPLY: u8 = 2;
const EXIT_CONFIDENCE_BELOW_THRESHOLD: u8 = 3;
const EXIT_DIAGNOSTICS_BLOCKING: u8 = 4;
const EXIT_APPLY_REQUIRES_APPROVAL: u8 = 5;
const EXIT_SNAPSHOT_REGRESSION: u8 = 9;

#[derive(Parser)]
#[command(name = "masterchef")]
#[command(about = "Desired-state configuration and deployment engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress informational logs; only warnings and errors are printed.
    #[arg(long, global = true, default_value = "false")]
    quiet: bool,

    /// Root directory for `.masterchef/runs` and `.masterchef/sessions`.
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose, expand, validate, and plan a document; print the resulting
    /// Plan as JSON.
    Plan {
        document: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Plan a document and simulate applying it, without touching any host.
    Check {
        document: PathBuf,
        /// Exit with code 3 if the simulator's confidence falls below this
        /// threshold.
        #[arg(long, default_value = "0.0")]
        min_confidence: f64,
    },
    /// Plan and execute a document against real hosts.
    Apply {
        document: PathBuf,
        /// Apply without first confirming that changes are expected.
        #[arg(long, default_value = "false")]
        yes: bool,
    },
    /// Coarse estimate of how much of the fleet a plan touches.
    BlastRadius { document: PathBuf },
    /// Snapshot operations.
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
    /// Run-history operations.
    #[command(subcommand)]
    Runs(RunsCommands),
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// Plan `document` and write its snapshot to `out`.
    Save { document: PathBuf, out: PathBuf },
    /// Compare two saved snapshots.
    Diff { baseline: PathBuf, current: PathBuf },
}

#[derive(Subcommand)]
enum RunsCommands {
    List {
        #[arg(long, default_value = "0")]
        limit: usize,
    },
    Show {
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env();
    telemetry_config.log_level = if cli.quiet { Level::WARN } else { Level::INFO };
    if let Err(e) = init_telemetry(telemetry_config) {
        if !cli.quiet {
            eprintln!("warning: failed to initialize telemetry: {}", e);
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    let mut config = EngineConfig::from_env();
    if let Some(base_dir) = cli.base_dir.clone() {
        config.base_dir = base_dir;
    }

    let code = run(cli, &config).await;
    shutdown_telemetry();
    ExitCode::from(code)
}

async fn run(cli: Cli, config: &EngineConfig) -> u8 {
    match cli.command {
        Commands::Plan { document, out } => cmd_plan(&document, out.as_deref()),
        Commands::Check { document, min_confidence } => cmd_check(&document, min_confidence),
        Commands::Apply { document, yes } => cmd_apply(&document, yes, config).await,
        Commands::BlastRadius { document } => cmd_blast_radius(&document),
        Commands::Snapshot(SnapshotCommands::Save { document, out }) => cmd_snapshot_save(&document, &out),
        Commands::Snapshot(SnapshotCommands::Diff { baseline, current }) => cmd_snapshot_diff(&baseline, &current),
        Commands::Runs(RunsCommands::List { limit }) => cmd_runs_list(config, limit),
        Commands::Runs(RunsCommands::Show { id }) => cmd_runs_show(config, &id),
    }
}

fn build_plan(document_path: &std::path::Path) -> Result<Plan, u8> {
    let mut document: Document = match loader::load_document(document_path) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "failed to load document");
            return Err(EXIT_GENERIC_ERROR);
        }
    };

    expander::expand(&mut document);

    if let Err(errors) = validation::validate_and_normalize(&mut document) {
        error!("document failed validation with {} error(s)", errors.len());
        for err in &errors {
            error!("  - {}", err);
        }
        return Err(EXIT_DIAGNOSTICS_BLOCKING);
    }

    let canonical_document = canonical::canonicalize(&document);

    planner::plan(&canonical_document).map_err(|e| {
        error!(error = %e, "failed to plan document");
        EXIT_GENERIC_ERROR
    })
}

fn cmd_plan(document_path: &std::path::Path, out: Option<&std::path::Path>) -> u8 {
    let plan = match build_plan(document_path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let json = match serde_json::to_string_pretty(&plan) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "failed to serialize plan");
            return EXIT_GENERIC_ERROR;
        }
    };

    match out {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json) {
                error!(error = %e, "failed to write plan");
                return EXIT_GENERIC_ERROR;
            }
            info!(path = %path.display(), "plan written");
        }
        None => println!("{}", json),
    }

    EXIT_SUCCESS
}

fn cmd_check(document_path: &std::path::Path, min_confidence: f64) -> u8 {
    let plan = match build_plan(document_path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let report = simulator::simulate(&plan);
    let json = serde_json::to_string_pretty(&report).expect("report always serializes");
    println!("{}", json);

    if report.confidence < min_confidence {
        return EXIT_CONFIDENCE_BELOW_THRESHOLD;
    }
    if report.changes_needed > 0 {
        return EXIT_CHANGES_WOULD_APPLY;
    }
    EXIT_SUCCESS
}

async fn cmd_apply(document_path: &std::path::Path, yes: bool, config: &EngineConfig) -> u8 {
    let plan = match build_plan(document_path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    if !yes {
        let report = simulator::simulate(&plan);
        if report.changes_needed > 0 {
            error!(
                changes_needed = report.changes_needed,
                "apply would change state; re-run with --yes to proceed"
            );
            return EXIT_APPLY_REQUIRES_APPROVAL;
        }
    }

    let transports = TransportRegistry::new();
    let handlers = HandlerRegistry::new();
    let token = CancellationToken::new();

    let run_record = match masterchef::executor::execute(&plan, &transports, &handlers, config, &token).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "run aborted");
            return EXIT_GENERIC_ERROR;
        }
    };

    let store = RunStore::new(config.runs_dir());
    if let Err(e) = store.save_run(&run_record) {
        error!(error = %e, "failed to persist run record");
    }

    let json = serde_json::to_string_pretty(&run_record).expect("run record always serializes");
    println!("{}", json);

    if run_record.status == masterchef::model::RunStatus::Failed {
        EXIT_GENERIC_ERROR
    } else {
        EXIT_SUCCESS
    }
}

fn cmd_blast_radius(document_path: &std::path::Path) -> u8 {
    let plan = match build_plan(document_path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let radius = blast_radius::analyze(&plan);
    println!("{}", serde_json::to_string_pretty(&radius).expect("always serializes"));
    EXIT_SUCCESS
}

fn cmd_snapshot_save(document_path: &std::path::Path, out: &std::path::Path) -> u8 {
    let plan = match build_plan(document_path) {
        Ok(p) => p,
        Err(code) => return code,
    };

    match snapshot::to_json(&plan) {
        Ok(json) => {
            if let Err(e) = std::fs::write(out, json) {
                error!(error = %e, "failed to write snapshot");
                return EXIT_GENERIC_ERROR;
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to encode snapshot");
            EXIT_GENERIC_ERROR
        }
    }
}

fn cmd_snapshot_diff(baseline_path: &std::path::Path, current_path: &std::path::Path) -> u8 {
    let baseline_raw = match std::fs::read_to_string(baseline_path) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to read baseline snapshot");
            return EXIT_GENERIC_ERROR;
        }
    };
    let current_raw = match std::fs::read_to_string(current_path) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to read current snapshot");
            return EXIT_GENERIC_ERROR;
        }
    };

    let baseline = match snapshot::from_json(&baseline_raw) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to decode baseline snapshot");
            return EXIT_GENERIC_ERROR;
        }
    };
    let current = match snapshot::from_json(&current_raw) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to decode current snapshot");
            return EXIT_GENERIC_ERROR;
        }
    };

    let diff = snapshot::diff(&baseline.plan, &current.plan);
    println!("{}", serde_json::to_string_pretty(&diff).expect("always serializes"));

    if diff.r#match {
        EXIT_SUCCESS
    } else {
        EXIT_SNAPSHOT_REGRESSION
    }
}

fn cmd_runs_list(config: &EngineConfig, limit: usize) -> u8 {
    let store = RunStore::new(config.runs_dir());
    match store.list_runs(limit) {
        Ok(runs) => {
            println!("{}", serde_json::to_string_pretty(&runs).expect("always serializes"));
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to list runs");
            EXIT_GENERIC_ERROR
        }
    }
}

fn cmd_runs_show(config: &EngineConfig, id: &str) -> u8 {
    let store = RunStore::new(config.runs_dir());
    match store.get_run(id) {
        Ok(run) => {
            println!("{}", serde_json::to_string_pretty(&run).expect("always serializes"));
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to read run");
            EXIT_GENERIC_ERROR
        }
    }
}
