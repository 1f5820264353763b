//! Offline right-sizing calculator

use agent_lib::advisor::{
    recommend_concurrency, AdvisorConfig, ConcurrencyStats, FunctionUsage, RightSizingAdvisor,
};
use anyhow::Result;
use colored::Colorize;

use crate::commands::recommendations::RecommendationRow;
use crate::output::{print_info, print_json, OutputFormat};

/// Inputs to the local memory calculation
#[derive(Debug, Clone)]
pub struct MemoryArgs {
    pub function: String,
    pub avg_duration_ms: f64,
    pub memory_utilization_pct: f64,
    pub memory_mb: u32,
    pub invocations_per_month: f64,
    pub timeout_secs: Option<u32>,
    pub unit_price: Option<f64>,
}

pub fn advise_memory(args: MemoryArgs, format: OutputFormat) -> Result<()> {
    let mut config = AdvisorConfig::default();
    if let Some(price) = args.unit_price {
        config.unit_price_per_gb_second = price;
    }

    let advisor = RightSizingAdvisor::with_config(config);
    let recommendation = advisor.recommend(&FunctionUsage {
        resource_id: args.function,
        avg_duration_ms: args.avg_duration_ms,
        memory_utilization_pct: args.memory_utilization_pct,
        current_memory_mb: args.memory_mb,
        invocations_per_month: args.invocations_per_month,
        current_timeout_secs: args.timeout_secs,
    });

    match format {
        OutputFormat::Json => print_json(&recommendation)?,
        OutputFormat::Table => {
            let table = tabled::Table::new([RecommendationRow::from(&recommendation)])
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            for line in &recommendation.reasoning {
                println!("  - {}", line);
            }
        }
    }

    Ok(())
}

pub fn advise_concurrency(stats: ConcurrencyStats, format: OutputFormat) -> Result<()> {
    let recommendation = recommend_concurrency(&stats);

    match format {
        OutputFormat::Json => print_json(&recommendation)?,
        OutputFormat::Table => {
            match recommendation.reserved_concurrency {
                Some(reserved) if recommendation.optional => {
                    println!("Reserved concurrency: {} {}", reserved.to_string().cyan(), "(optional)".dimmed());
                }
                Some(reserved) => println!("Reserved concurrency: {}", reserved.to_string().green().bold()),
                None => println!("Reserved concurrency: {}", "none".yellow()),
            }
            print_info(&recommendation.reasoning);
        }
    }

    Ok(())
}
