mod cli;
mod ui;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use visitflow::api::ApiClient;
use visitflow::config::AppConfig;
use visitflow::job::{Job, JobId};
use visitflow::poller::{PollEvent, PollOutcome, StatusPoller};
use visitflow::workflow::{VisitAction, WorkflowStepResolver};

// Exit code used when the user interrupts the wait with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "visitflow=debug" } else { "visitflow=info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AppConfig::load()?,
    };
    config.apply_base_url_override(cli.base_url.clone());
    if let Some(secs) = cli.deadline_secs {
        config.poll.deadline_ms = secs.saturating_mul(1000);
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let client = Arc::new(ApiClient::from_config(&config)?);
    tracing::debug!(base_url = %client.base_url(), "backend client ready");

    match cli.command {
        Command::Submit {
            subject,
            visit,
            file,
            no_wait,
        } => {
            let media = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("recording");
            let job = client
                .submit_job(&JobId::new(subject, visit), file_name, media)
                .await
                .context("upload failed")?;
            println!("  Submitted {} ({})", job.id, job.submitted_at.to_rfc3339());
            if no_wait {
                return Ok(ExitCode::SUCCESS);
            }
            watch(client, &config, job, cli.json).await
        }
        Command::Watch { subject, visit } => {
            watch(client, &config, Job::new(JobId::new(subject, visit)), cli.json).await
        }
        Command::Steps { visit } => {
            let resolver = WorkflowStepResolver::new(client);
            match resolver.fetch_steps(&visit).await {
                Ok(state) => {
                    ui::print_steps(&state, cli.json);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    ui::print_workflow_error(&err);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

async fn watch(client: Arc<ApiClient>, config: &AppConfig, job: Job, json: bool) -> Result<ExitCode> {
    let poller = StatusPoller::new(Arc::clone(&client), config.poll.backoff());
    let progress = ui::PollProgress::start(&job.id);
    let visit_id = job.id.visit_id.clone();
    let mut handle = poller.start(job, config.poll.deadline());

    let outcome = loop {
        let interrupted = tokio::select! {
            event = handle.next_event() => match event {
                Some(PollEvent::Attempt { attempt, job_state, phase }) => {
                    progress.attempt(&attempt, job_state, phase);
                    continue;
                }
                Some(PollEvent::Finished(outcome)) => break Some(outcome),
                None => break None,
            },
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            handle.cancel();
            progress.cancelled();
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    let Some(outcome) = outcome else {
        progress.cancelled();
        return Ok(ExitCode::FAILURE);
    };
    progress.finish(&outcome);

    match outcome {
        PollOutcome::Succeeded(artifact) => {
            ui::print_artifact(&artifact, json);
            let resolver = WorkflowStepResolver::new(client);
            match resolver
                .refresh_after(&visit_id, VisitAction::TranscriptionCompleted)
                .await
            {
                Ok(state) => ui::print_steps(&state, json),
                Err(err) => ui::print_workflow_error(&err),
            }
            Ok(ExitCode::SUCCESS)
        }
        PollOutcome::Failed(_) | PollOutcome::TimedOut { .. } => Ok(ExitCode::FAILURE),
    }
}
