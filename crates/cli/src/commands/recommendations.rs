//! Right-sizing recommendations published by the agent

use agent_lib::RightSizingRecommendation;
use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_savings, print_json, print_warning, OutputFormat};

/// Row for recommendations table
#[derive(Tabled)]
pub(crate) struct RecommendationRow {
    #[tabled(rename = "Function")]
    function: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Timeout")]
    timeout: String,
    #[tabled(rename = "Monthly Savings")]
    savings: String,
}

impl From<&RightSizingRecommendation> for RecommendationRow {
    fn from(r: &RightSizingRecommendation) -> Self {
        let memory = if r.changes_memory() {
            format!("{} → {} MB", r.current_memory_mb, r.recommended_memory_mb)
        } else {
            format!("{} MB", r.current_memory_mb)
        };
        let timeout = match (r.current_timeout_secs, r.recommended_timeout_secs) {
            (Some(current), Some(recommended)) if current != recommended => {
                format!("{}s → {}s", current, recommended)
            }
            (Some(current), _) => format!("{}s", current),
            _ => "-".to_string(),
        };

        Self {
            function: r.resource_id.clone(),
            memory,
            timeout,
            savings: color_savings(r.estimated_monthly_savings),
        }
    }
}

pub async fn list_recommendations(
    client: &ApiClient,
    changes_only: bool,
    verbose: bool,
    format: OutputFormat,
) -> Result<()> {
    let recommendations: Vec<RightSizingRecommendation> = client
        .recommendations()
        .await?
        .into_iter()
        .filter(|r| !changes_only || r.changes_memory())
        .collect();

    match format {
        OutputFormat::Json => print_json(&recommendations)?,
        OutputFormat::Table => {
            if recommendations.is_empty() {
                print_warning("No recommendations found");
                return Ok(());
            }

            let rows: Vec<RecommendationRow> =
                recommendations.iter().map(RecommendationRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            let total: f64 = recommendations
                .iter()
                .map(|r| r.estimated_monthly_savings.max(0.0))
                .sum();
            println!(
                "\nTotal: {} recommendations, {} potential monthly savings",
                recommendations.len(),
                color_savings(total)
            );

            if verbose {
                for r in &recommendations {
                    println!("\n{}", r.resource_id);
                    for line in &r.reasoning {
                        println!("  - {}", line);
                    }
                }
            }
        }
    }

    Ok(())
}
