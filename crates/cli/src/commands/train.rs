//! Training job commands

use anyhow::{bail, Result};
use colored::Colorize;
use std::time::Duration;
use tabled::Tabled;

use crate::client::{ApiClient, Job};
use crate::output::{color_state, print_info, print_json, print_success, print_table, OutputFormat};

/// Row for jobs table
#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "K")]
    k: usize,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Progress")]
    progress: String,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Model Version")]
    model_version: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            mode: job.mode.clone(),
            k: job.fold_count,
            state: color_state(&job.state),
            progress: format!("{}%", job.progress),
            started: job.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            model_version: job.model_version.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn print_job(job: &Job) {
    println!("{}", "Training Job".bold());
    println!("{}", "=".repeat(50));
    println!("ID:                     {}", job.id.cyan());
    println!("Mode:                   {} (k={})", job.mode, job.fold_count);
    println!("State:                  {}", color_state(&job.state));
    println!("Progress:               {}%", job.progress);
    if let Some(version) = &job.model_version {
        println!("Model version:          {}", version);
    }
    if let Some(error) = &job.error {
        println!("Error:                  {}", error.red());
    }
    if !job.log.is_empty() {
        println!();
        println!("{}", "Log".bold());
        println!("{}", "-".repeat(50));
        for line in &job.log {
            println!("{}", line.dimmed());
        }
    }
}

/// Poll a job until it reaches READY or FAILED
pub async fn wait_for_job(client: &ApiClient, job_id: &str, interval: Duration) -> Result<Job> {
    let mut last_progress = None;
    loop {
        let job = client.job_status(job_id).await?;
        if last_progress != Some(job.progress) {
            print_info(&format!("{} {}%", job.state, job.progress));
            last_progress = Some(job.progress);
        }
        if job.is_terminal() {
            return Ok(job);
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn start(
    client: &ApiClient,
    mode: &str,
    k: usize,
    wait: bool,
    interval: Duration,
    format: OutputFormat,
) -> Result<()> {
    let accepted = client.start_training(mode, k).await?;

    if !wait {
        match format {
            OutputFormat::Json => print_json(&accepted)?,
            OutputFormat::Table => print_success(&format!("Submitted job {}", accepted.job_id)),
        }
        return Ok(());
    }

    if format == OutputFormat::Table {
        print_success(&format!("Submitted job {}, waiting", accepted.job_id));
    }
    let job = wait_for_job(client, &accepted.job_id, interval).await?;
    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Table => print_job(&job),
    }

    if job.state == "FAILED" {
        bail!(
            "job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub async fn status(client: &ApiClient, job_id: &str, format: OutputFormat) -> Result<()> {
    let job = client.job_status(job_id).await?;
    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Table => print_job(&job),
    }
    Ok(())
}

pub async fn list(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let jobs = client.list_jobs().await?;
    match format {
        OutputFormat::Json => print_json(&jobs)?,
        OutputFormat::Table => {
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            print_table(&rows);
        }
    }
    Ok(())
}
