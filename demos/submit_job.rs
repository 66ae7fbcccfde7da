use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use hirequeue::aggregate::Aggregator;
use hirequeue::config::EngineConfig;
use hirequeue::engine::JobEngine;
use hirequeue::handlers::default_registry;
use hirequeue::poller::{poll_until_terminal, PollPolicy};
use hirequeue::scheduler::JobKind;

#[derive(Parser, Debug)]
#[command(name = "submit-job")]
#[command(about = "Runs a resume render and a judge panel on an in-process engine")]
struct Args {
    /// Resume to render
    #[arg(long, default_value = "resume-42")]
    resume_id: String,

    /// Interview the judge panel scores
    #[arg(long, default_value = "interview-7")]
    interview_id: String,

    /// Number of workers
    #[arg(long, default_value = "2")]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let aggregator = Arc::new(Aggregator::new());
    let registry = default_registry(aggregator.clone(), "documents://resumes");
    let engine = JobEngine::start(
        EngineConfig::default().with_workers(args.workers),
        registry,
        aggregator,
    );
    let policy = PollPolicy::new(Duration::from_millis(100), 50);

    let render_id = engine
        .submit(
            JobKind::RenderPdf,
            json!({ "resume_id": args.resume_id }),
            "demo-user",
        )
        .await?;
    println!("Submitted render_pdf job {}", render_id);

    let rendered = poll_until_terminal(&engine, render_id, policy).await?;
    println!("render_pdf finished: {}", rendered.status);
    if let Some(result) = &rendered.result {
        println!("{}", serde_json::to_string_pretty(result)?);
    }

    let roles = ["hiring-manager", "technical-lead", "hr"];
    let judges = [("hiring-manager", 1.0, 80.0), ("technical-lead", 2.0, 90.0), ("hr", 1.0, 75.0)];
    let mut judge_jobs = Vec::new();
    for (role, weight, score) in judges {
        let id = engine
            .submit(
                JobKind::JudgeEvaluate,
                json!({
                    "interview_id": args.interview_id,
                    "judge_role": role,
                    "weight": weight,
                    "score": score,
                    "expected_roles": roles,
                }),
                "demo-user",
            )
            .await?;
        judge_jobs.push(id);
    }

    for id in judge_jobs {
        let job = poll_until_terminal(&engine, id, policy).await?;
        println!("judge job {} finished: {}", id, job.status);
    }

    let view = engine.get_aggregated(&args.interview_id).await?;
    println!(
        "Panel {}: score {:?}, {} of {:?} judges, complete = {}",
        view.aggregation_key,
        view.aggregated_score,
        view.contributions_received,
        view.contributions_expected,
        view.complete
    );

    engine.shutdown().await;
    Ok(())
}
