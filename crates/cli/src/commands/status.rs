//! Serving status and reload commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, ServingStatus};
use crate::output::{print_json, print_success, print_warning, yes_no, OutputFormat};

fn print_status(status: &ServingStatus) {
    println!("{}", "Serving Status".bold());
    println!("{}", "=".repeat(50));
    println!("Model version:          {}", status.model_version.cyan());
    println!(
        "Generation:             {}",
        status.generation.as_deref().unwrap_or("-")
    );
    println!("Pipeline A:             {}", yes_no(status.has_a));
    println!("Pipeline B:             {}", yes_no(status.has_b));
    println!("Manifest:               {}", yes_no(status.manifest_present));
    println!(
        "Best model:             {}",
        status.best_key.as_deref().unwrap_or("-")
    );
    println!(
        "Ensemble weights:       A {:.3} / B {:.3} ({})",
        status.effective_weights.w_a, status.effective_weights.w_b, status.effective_weights.source
    );

    for issue in &status.load_issues {
        print_warning(issue);
    }
}

pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;
    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => print_status(&status),
    }
    Ok(())
}

pub async fn reload(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.reload().await?;
    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_success(&format!("Reloaded, now serving {}", status.model_version));
            println!();
            print_status(&status);
        }
    }
    Ok(())
}
