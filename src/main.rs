use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use hirequeue::aggregate::{AggregatedView, Aggregator};
use hirequeue::api::{run_api, ListJobsQuery};
use hirequeue::client::ApiClient;
use hirequeue::config::{EngineConfig, ServerConfig};
use hirequeue::engine::JobEngine;
use hirequeue::handlers::default_registry;
use hirequeue::poller::{poll_until_terminal, PollPolicy};
use hirequeue::scheduler::JobSnapshot;
use hirequeue::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "hirequeue")]
#[command(version)]
#[command(about = "Asynchronous job engine for document and scoring work")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the engine and its HTTP API
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },

    /// Judge panel commands
    Panel {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: PanelCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind the HTTP API to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Number of concurrent workers
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Maximum number of queued jobs
    #[arg(long, default_value = "1000")]
    queue_capacity: usize,

    /// Maximum number of job records retained
    #[arg(long, default_value = "10000")]
    max_jobs: usize,

    /// Execution budget for kinds without a specific one
    #[arg(long, default_value = "60")]
    default_timeout_secs: u64,

    /// How long finished jobs stay readable (0 keeps them forever)
    #[arg(long, default_value = "86400")]
    retention_secs: u64,

    /// How long shutdown waits for in-flight jobs
    #[arg(long, default_value = "30")]
    drain_timeout_secs: u64,

    /// Base URI for rendered documents
    #[arg(long, default_value = "documents://resumes")]
    document_base_uri: String,
}

// =============================================================================
// Client Arguments (shared by job and panel commands)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Job Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a new job
    Submit {
        /// Job kind (parse_template, render_pdf, score_ats, evaluate_interview, judge_evaluate)
        kind: String,

        /// Payload as a JSON object
        #[arg(long)]
        payload: String,

        /// Id of the user submitting the job
        #[arg(long)]
        owner: String,
    },
    /// Get status of a specific job
    Status {
        /// The job ID (UUID)
        job_id: Uuid,
    },
    /// Poll a job until it finishes
    Wait {
        /// The job ID (UUID)
        job_id: Uuid,

        /// Delay between polls
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Polls before giving up
        #[arg(long, default_value = "30")]
        attempts: u32,
    },
    /// Cancel a queued or running job
    Cancel {
        /// The job ID (UUID)
        job_id: Uuid,
    },
    /// List jobs
    List {
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        kind: Option<String>,

        /// Number of jobs per page (default: 100, max: 1000)
        #[arg(long, default_value = "100")]
        page_size: usize,

        /// Fetch all pages automatically
        #[arg(long)]
        all: bool,
    },
}

// =============================================================================
// Panel Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum PanelCommands {
    /// Record a judge's contribution
    Contribute {
        /// Aggregation key (interview id)
        key: String,

        #[arg(long)]
        role: String,

        #[arg(long)]
        weight: f64,

        #[arg(long)]
        score: f64,
    },
    /// Show the aggregated view
    Show { key: String },
    /// Request finalization
    Finalize { key: String },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobSubmitOutput {
    job_id: Uuid,
}

#[derive(Serialize)]
struct ContributionOutput {
    contribution_id: Uuid,
}

#[derive(Serialize)]
struct JobListOutput {
    jobs: Vec<JobSnapshot>,
    has_more: bool,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn print_job(job: &JobSnapshot) -> Result<(), Box<dyn std::error::Error>> {
    println!("Job ID:     {}", job.job_id);
    println!("Kind:       {}", job.kind);
    println!("Owner:      {}", job.owner_id);
    println!("Status:     {}", job.status);
    if let Some(progress) = job.progress {
        println!("Progress:   {}%", progress);
    }
    println!("Created:    {}", job.created_at.to_rfc3339());
    if let Some(started) = job.started_at {
        println!("Started:    {}", started.to_rfc3339());
    }
    if let Some(finished) = job.finished_at {
        println!("Finished:   {}", finished.to_rfc3339());
    }
    if let Some(result) = &job.result {
        println!("Result:");
        for line in serde_json::to_string_pretty(result)?.lines() {
            println!("  {}", line);
        }
    }
    if let Some(error) = &job.error {
        match job.error_kind {
            Some(kind) => println!("Error:      [{}] {}", kind, error),
            None => println!("Error:      {}", error),
        }
    }
    Ok(())
}

fn print_panel(view: &AggregatedView) {
    println!("Panel:      {}", view.aggregation_key);
    match view.aggregated_score {
        Some(score) => println!("Score:      {:.2}", score),
        None => println!("Score:      -"),
    }
    match view.contributions_expected {
        Some(expected) => println!(
            "Judges:     {} of {}",
            view.contributions_received, expected
        ),
        None => println!("Judges:     {}", view.contributions_received),
    }
    println!("Complete:   {}", view.complete);
    println!("Finalized:  {}", view.finalize_requested);
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let retention = (args.retention_secs > 0).then(|| Duration::from_secs(args.retention_secs));
    let engine_config = EngineConfig::default()
        .with_workers(args.workers)
        .with_queue_capacity(args.queue_capacity)
        .with_max_jobs(args.max_jobs)
        .with_default_timeout(Duration::from_secs(args.default_timeout_secs))
        .with_retention(retention)
        .with_drain_timeout(Duration::from_secs(args.drain_timeout_secs));
    let mut config = ServerConfig::new(listen_addr).with_engine(engine_config);
    config.document_base_uri = args.document_base_uri;

    tracing::info!(
        listen_addr = %config.listen_addr,
        workers = config.engine.worker_count,
        queue_capacity = config.engine.queue_capacity,
        retention_secs = args.retention_secs,
        "Starting hirequeue server"
    );

    let aggregator = Arc::new(Aggregator::new());
    let registry = default_registry(aggregator.clone(), &config.document_base_uri);
    let engine = JobEngine::start(config.engine, registry, aggregator);

    let shutdown = install_shutdown_handler();
    let served = run_api(config.listen_addr, engine.clone(), shutdown.clone()).await;

    engine.shutdown().await;
    served?;
    tracing::info!("Server stopped");
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_command(
    client: &ApiClient,
    command: JobCommands,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        JobCommands::Submit {
            kind,
            payload,
            owner,
        } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let job_id = client.submit(&kind, payload, &owner).await?;
            match output_format {
                OutputFormat::Json => print_json(&JobSubmitOutput { job_id })?,
                OutputFormat::Table => {
                    println!("Job submitted successfully!");
                    println!("Job ID: {}", job_id);
                }
            }
        }
        JobCommands::Status { job_id } => {
            let job = client.status(job_id).await?;
            match output_format {
                OutputFormat::Json => print_json(&job)?,
                OutputFormat::Table => print_job(&job)?,
            }
        }
        JobCommands::Wait {
            job_id,
            interval_ms,
            attempts,
        } => {
            let policy = PollPolicy::new(Duration::from_millis(interval_ms), attempts);
            let job = poll_until_terminal(client, job_id, policy).await?;
            match output_format {
                OutputFormat::Json => print_json(&job)?,
                OutputFormat::Table => print_job(&job)?,
            }
        }
        JobCommands::Cancel { job_id } => {
            let response = client.cancel(job_id).await?;
            match output_format {
                OutputFormat::Json => print_json(&response)?,
                OutputFormat::Table => {
                    println!("Job {} cancel: {:?}", response.job_id, response.outcome)
                }
            }
        }
        JobCommands::List {
            owner,
            status,
            kind,
            page_size,
            all,
        } => {
            let mut query = ListJobsQuery {
                owner_id: owner,
                status,
                kind,
                page_size: Some(page_size),
                page_token: None,
            };
            let mut jobs = Vec::new();
            let has_more = loop {
                let page = client.list(&query).await?;
                jobs.extend(page.jobs);
                match page.next_page_token {
                    Some(token) if all => query.page_token = Some(token),
                    next => break next.is_some(),
                }
            };

            match output_format {
                OutputFormat::Json => print_json(&JobListOutput { jobs, has_more })?,
                OutputFormat::Table => {
                    if jobs.is_empty() {
                        println!("No jobs found.");
                    } else {
                        println!(
                            "{:<38} {:<20} {:<10} {:<9} OWNER",
                            "JOB ID", "KIND", "STATUS", "PROGRESS"
                        );
                        println!("{}", "-".repeat(90));
                        for job in &jobs {
                            let progress = job
                                .progress
                                .map(|p| format!("{}%", p))
                                .unwrap_or_else(|| "-".to_string());
                            println!(
                                "{:<38} {:<20} {:<10} {:<9} {}",
                                job.job_id, job.kind, job.status, progress, job.owner_id
                            );
                        }
                        println!();
                        println!("Showing {} jobs", jobs.len());
                        if has_more {
                            println!("(Use --all to fetch all pages)");
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_panel_command(
    client: &ApiClient,
    command: PanelCommands,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        PanelCommands::Contribute {
            key,
            role,
            weight,
            score,
        } => {
            let contribution_id = client.contribute(&key, &role, weight, score).await?;
            match output_format {
                OutputFormat::Json => print_json(&ContributionOutput { contribution_id })?,
                OutputFormat::Table => println!("Contribution recorded: {}", contribution_id),
            }
        }
        PanelCommands::Show { key } => {
            let view = client.panel(&key).await?;
            match output_format {
                OutputFormat::Json => print_json(&view)?,
                OutputFormat::Table => print_panel(&view),
            }
        }
        PanelCommands::Finalize { key } => {
            let view = client.finalize(&key).await?;
            match output_format {
                OutputFormat::Json => print_json(&view)?,
                OutputFormat::Table => print_panel(&view),
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let api = ApiClient::new(&client.addr);
            handle_job_command(&api, command, &client.output).await?;
        }
        Commands::Panel { client, command } => {
            let api = ApiClient::new(&client.addr);
            handle_panel_command(&api, command, &client.output).await?;
        }
    }

    Ok(())
}
