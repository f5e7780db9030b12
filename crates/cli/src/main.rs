//! `status-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: load-time validation of workflow files.
//! - `run`: create a record and run one automatic pass, offline.
//! - `serve`: start the API server and the after-job worker.
//! - `migrate`: run pending database migrations.

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use api::{AppState, MemoryRecordStore, PgRecordStore, RecordStore, WorkflowRegistry};
use engine::{Engine, ExecutionContext, InMemoryFailureRecorder};
use providers::LogNotifier;
use queue::{HttpGateway, JobQueue, Worker, DEFAULT_QUEUE_CAPACITY};

use settings::Settings;

#[derive(Parser)]
#[command(
    name = "status-engine",
    about = "Workflow status-transition engine",
    version
)]
struct Cli {
    /// TOML settings file (`[engine]` and `[gateway]` sections).
    #[arg(long, global = true, env = "STATUS_ENGINE_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate workflow definition files.
    Validate {
        /// A workflow JSON file or a directory of them.
        path: PathBuf,
    },
    /// Create a record and run one automatic pass, printing the result.
    Run {
        /// Workflow JSON file.
        workflow: PathBuf,
        /// Record data as a JSON object.
        #[arg(long, default_value = "{}")]
        data: String,
        #[arg(long)]
        submitter: Option<String>,
        /// JSON file with the directory's roles and users.
        #[arg(long)]
        directory: Option<PathBuf>,
    },
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,
        /// A workflow JSON file or a directory of them.
        #[arg(long)]
        workflows: PathBuf,
        #[arg(long)]
        directory: Option<PathBuf>,
        /// Postgres URL; records are kept in memory without one.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.settings.as_deref())?;

    match cli.command {
        Command::Validate { path } => validate(&settings, &path),
        Command::Run {
            workflow,
            data,
            submitter,
            directory,
        } => run(&settings, &workflow, &data, submitter, directory),
        Command::Serve {
            bind,
            workflows,
            directory,
            database_url,
        } => serve(settings.for_serving(), &bind, &workflows, directory, database_url).await,
        Command::Migrate { database_url } => {
            info!("running migrations");
            let pool = db::pool::create_pool(&database_url, 2).await?;
            db::pool::run_migrations(&pool).await?;
            info!("migrations applied");
            Ok(())
        }
    }
}

fn validate(settings: &Settings, path: &Path) -> Result<()> {
    let evaluator = settings.evaluator();
    let mut failed = 0;
    for file in settings::workflow_files(path)? {
        match settings::load_workflow(&file, &evaluator) {
            Ok(graph) => println!(
                "ok      {} ({} statuses)",
                file.display(),
                graph.workflow().statuses.len()
            ),
            Err(err) => {
                failed += 1;
                println!("invalid {}: {err:#}", file.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} invalid workflow(s)");
    }
    Ok(())
}

fn run(
    settings: &Settings,
    workflow: &Path,
    data: &str,
    submitter: Option<String>,
    directory: Option<PathBuf>,
) -> Result<()> {
    let data: Map<String, Value> =
        serde_json::from_str(data).context("--data must be a JSON object")?;
    let engine = Engine::new(
        settings.engine.clone(),
        Arc::new(settings::load_directory(directory.as_deref())?),
        Arc::new(LogNotifier),
        Arc::new(InMemoryFailureRecorder::new()),
    );

    let graph = settings::load_workflow(workflow, engine.evaluator())?;
    let mut record = engine.create_record(&graph, data, submitter);
    let outcome = engine.run(&graph, &mut record, &ExecutionContext::automatic())?;

    let report = json!({
        "record": record,
        "outcome": outcome,
        "errors": engine.recorder().list(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn serve(
    settings: Settings,
    bind: &str,
    workflows: &Path,
    directory: Option<PathBuf>,
    database_url: Option<String>,
) -> Result<()> {
    let recorder = Arc::new(InMemoryFailureRecorder::new());
    // Not reached: `for_serving` defers every notification to the worker.
    let engine = Engine::new(
        settings.engine.clone(),
        Arc::new(settings::load_directory(directory.as_deref())?),
        Arc::new(LogNotifier),
        recorder.clone(),
    );

    let registry = WorkflowRegistry::new();
    for file in settings::workflow_files(workflows)? {
        let graph = settings::load_workflow(&file, engine.evaluator())?;
        info!(workflow = graph.id(), file = %file.display(), "workflow loaded");
        registry.insert(graph);
    }

    let store: Arc<dyn RecordStore> = match database_url {
        Some(url) => {
            let pool = db::pool::create_pool(&url, 10).await?;
            db::pool::run_migrations(&pool).await?;
            for summary in registry.summaries() {
                if let Some(graph) = registry.get(&summary.id) {
                    let definition = serde_json::to_value(graph.workflow())?;
                    db::repository::workflows::upsert_workflow(
                        &pool,
                        &summary.id,
                        &summary.name,
                        &definition,
                    )
                    .await?;
                }
            }
            Arc::new(PgRecordStore::new(pool))
        }
        None => {
            info!("no DATABASE_URL, records are kept in memory");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let gateway = Arc::new(HttpGateway::new(settings.gateway.clone())?);
    let (jobs, rx) = JobQueue::new(DEFAULT_QUEUE_CAPACITY);
    let worker = Worker::new(gateway.clone(), gateway, recorder).spawn(rx);

    let state = AppState::new(Arc::new(engine), registry, store).with_jobs(jobs);
    let served = api::serve(bind, state, shutdown_signal()).await;
    if let Err(err) = &served {
        error!(error = %err, "server stopped");
    }

    // The queue's senders went away with the state; the worker stops once
    // the remaining jobs are done.
    info!("draining after-jobs");
    if let Err(err) = worker.await {
        error!(error = %err, "after-job worker crashed");
    }
    served.context("api server failed")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            error!(error = %err, "cannot listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
