//! Job command handlers
//!
//! Handles all job-related CLI commands including listing, viewing details,
//! waiting for completion, cancellation and deletion.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::*;
use quarry_client::{Client, ClientError, JobStream, Options};
use quarry_core::domain::job::{Job, JobReference, JobState};
use quarry_core::dto::job::{JobRequest, ListJobsRequest};

use crate::config::Config;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// List jobs in the project
    List {
        /// Only show jobs in this state
        #[arg(long, value_enum)]
        state: Option<StateFilter>,

        /// Stop after this many jobs
        #[arg(long)]
        limit: Option<usize>,

        /// Jobs fetched per request
        #[arg(long)]
        max_results: Option<u32>,

        /// Start from this page token instead of the first page
        #[arg(long)]
        page_token: Option<String>,
    },
    /// Get job details
    Get {
        /// Job ID
        id: String,
    },
    /// Wait until a job finishes
    Wait {
        /// Job ID
        id: String,
    },
    /// Request cancellation of a running job
    Cancel {
        /// Job ID
        id: String,
    },
    /// Delete a job's metadata
    Delete {
        /// Job ID
        id: String,
    },
}

/// State filter accepted by `job list`
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StateFilter {
    Pending,
    Running,
    Done,
}

impl From<StateFilter> for JobState {
    fn from(filter: StateFilter) -> Self {
        match filter {
            StateFilter::Pending => JobState::Pending,
            StateFilter::Running => JobState::Running,
            StateFilter::Done => JobState::Done,
        }
    }
}

/// Handle job commands
///
/// Routes job subcommands to their respective handlers.
///
/// # Arguments
/// * `command` - The job command to execute
/// * `config` - The CLI configuration
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client()?;
    let project = config.project()?;

    match command {
        JobCommands::List {
            state,
            limit,
            max_results,
            page_token,
        } => {
            let request = ListJobsRequest {
                project_id: project.to_string(),
                state_filter: state.map(JobState::from),
                max_results,
                page_token,
            };
            list_jobs(&client, request, limit).await
        }
        JobCommands::Get { id } => get_job(&client, &job_request(config, project, id)).await,
        JobCommands::Wait { id } => wait_job(&client, config, project, id).await,
        JobCommands::Cancel { id } => cancel_job(&client, &job_request(config, project, id)).await,
        JobCommands::Delete { id } => delete_job(&client, &job_request(config, project, id)).await,
    }
}

fn job_request(config: &Config, project: &str, id: String) -> JobRequest {
    let request = JobRequest::new(project, id);
    match &config.location {
        Some(location) => request.with_location(location.clone()),
        None => request,
    }
}

/// List jobs across as many pages as needed
async fn list_jobs(client: &Client, request: ListJobsRequest, limit: Option<usize>) -> Result<()> {
    let mut stream = client.list_jobs(request, Options::new());
    let jobs = take_jobs(&mut stream, limit)
        .await
        .context("Failed to list jobs")?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in &jobs {
            print_job_summary(job);
        }
    }

    Ok(())
}

/// Read up to `limit` jobs; no page is requested once the limit is reached
async fn take_jobs(stream: &mut JobStream, limit: Option<usize>) -> Result<Vec<Job>, ClientError> {
    let mut jobs = Vec::new();
    while limit.is_none_or(|max| jobs.len() < max) {
        match stream.next().await {
            Some(job) => jobs.push(job?),
            None => break,
        }
    }
    Ok(jobs)
}

/// Get and display a single job
async fn get_job(client: &Client, request: &JobRequest) -> Result<()> {
    let job = client
        .get_job(request, Options::new())
        .await
        .with_context(|| format!("Failed to get job {}", request.job_id))?;

    print_job_details(&job);

    Ok(())
}

/// Poll a job until it finishes
async fn wait_job(client: &Client, config: &Config, project: &str, id: String) -> Result<()> {
    let mut reference = JobReference::new(project, id);
    if let Some(location) = &config.location {
        reference = reference.with_location(location.clone());
    }

    println!("Waiting for job {}...", reference.to_string().cyan());

    match client.await_job(reference, Options::new()).await {
        Ok(job) => {
            print_job_details(&job);
            Ok(())
        }
        Err(ClientError::JobFailed { job_id, detail }) => {
            println!("{} {}", "✗ Job failed:".red().bold(), job_id);
            println!("  {}", detail.to_string().red());
            Ok(())
        }
        Err(e) => Err(e).context("Failed waiting for job"),
    }
}

/// Request cancellation of a job
async fn cancel_job(client: &Client, request: &JobRequest) -> Result<()> {
    let job = client
        .cancel_job(request, Options::new())
        .await
        .with_context(|| format!("Failed to cancel job {}", request.job_id))?;

    println!(
        "{} {} ({})",
        "✓ Cancellation requested for".green(),
        job.reference.to_string().cyan(),
        colorize_state(job.state)
    );

    Ok(())
}

/// Delete a job
async fn delete_job(client: &Client, request: &JobRequest) -> Result<()> {
    client
        .delete_job(request, Options::new())
        .await
        .with_context(|| format!("Failed to delete job {}", request.job_id))?;

    println!("{} {}", "✓ Deleted job".green(), request.job_id.cyan());

    Ok(())
}

/// Print a one-entry job summary
fn print_job_summary(job: &Job) {
    println!("  {} Job {}", "▸".cyan(), job.reference.job_id.dimmed());
    println!("    State:    {}", colorize_state(job.state));
    if let Some(created) = job.creation_time {
        println!(
            "    Created:  {}",
            created.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    if let Some(error) = &job.error_result {
        println!("    Error:    {}", error.to_string().red());
    }
    println!();
}

/// Print detailed job information
fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.reference.job_id.cyan());
    println!("  Project:     {}", job.reference.project_id);
    if let Some(location) = &job.reference.location {
        println!("  Location:    {}", location);
    }
    println!("  State:       {}", colorize_state(job.state));

    if let Some(created) = job.creation_time {
        println!("  Created:     {}", created.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(ended) = job.end_time {
        println!("  Ended:       {}", ended.format("%Y-%m-%d %H:%M:%S"));

        if let Some(created) = job.creation_time {
            let duration = ended.signed_duration_since(created);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    if let Some(query) = &job.configuration.query {
        println!("\n{}", "Query:".bold());
        println!("{}", query.query);
    }

    if let Some(table) = &job.destination_table {
        println!(
            "\n{} {}.{}.{}",
            "Destination:".bold(),
            table.project_id,
            table.dataset_id,
            table.table_id
        );
    }

    if let Some(error) = &job.error_result {
        println!("\n{}", "Error:".bold());
        println!("{}", error.to_string().red());
    }

    if !job.errors.is_empty() {
        println!("\n{}", "Warnings:".bold());
        for error in &job.errors {
            println!("  {}", error.to_string().yellow());
        }
    }
}

/// Colorize job state for display
fn colorize_state(state: JobState) -> ColoredString {
    let state_str = state.to_string();
    match state {
        JobState::Pending => state_str.yellow(),
        JobState::Running => state_str.cyan(),
        JobState::Done => state_str.green(),
        JobState::Error => state_str.red(),
    }
}
