//! Prediction command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::cli::PredictArgs;
use crate::client::{ApiClient, Prediction};
use crate::output::{
    color_label, color_source, format_amount, format_pct, print_json, print_table, print_warning,
    OutputFormat,
};

/// Row for the yearly projection table
#[derive(Tabled)]
struct YearRow {
    #[tabled(rename = "Year")]
    year: i32,
    #[tabled(rename = "After (kWh)")]
    after: String,
    #[tabled(rename = "Saving (kWh)")]
    saving: String,
    #[tabled(rename = "Cost Saving")]
    cost_saving: String,
}

fn year_rows(prediction: &Prediction) -> Vec<YearRow> {
    prediction
        .years
        .iter()
        .enumerate()
        .map(|(i, year)| YearRow {
            year: *year,
            after: prediction.after_series.get(i).map(|v| format_amount(*v)).unwrap_or_default(),
            saving: prediction.saving_series.get(i).map(|v| format_amount(*v)).unwrap_or_default(),
            cost_saving: prediction
                .cost_saving_series
                .get(i)
                .map(|v| format_amount(*v))
                .unwrap_or_default(),
        })
        .collect()
}

/// Request and print one prediction
pub async fn predict(client: &ApiClient, args: &PredictArgs, format: OutputFormat) -> Result<()> {
    let prediction = client.predict(&args.to_request(), args.variant.as_str()).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => {
            println!("{}", "Saving Prediction".bold());
            println!("{}", "=".repeat(50));
            println!("Model version:          {}", prediction.model_version.cyan());
            println!("Variant:                {}", prediction.variant);
            println!("Source:                 {}", color_source(&prediction.source));
            println!();

            let kpi = &prediction.kpi;
            println!("{}", "KPI".bold());
            println!("{}", "-".repeat(50));
            println!("Saving:                 {}", format_pct(kpi.saving_pct).green().bold());
            println!("Saving (kWh/yr):        {}", format_amount(kpi.saving_kwh_yr));
            println!("Cost saving (last yr):  {}", format_amount(kpi.saving_cost_yr));
            println!("Payback (years):        {:.1}", kpi.payback_years);
            println!("Recommendation:         {}", color_label(&kpi.label));
            println!();

            print_table(&year_rows(&prediction));

            for warning in &prediction.warnings {
                print_warning(warning);
            }
        }
    }

    Ok(())
}
