//! Operator override commands

use anyhow::Result;
use colored::Colorize;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

/// Force a signal's emergency to be treated as not confirmed
pub async fn abort(client: &ApiClient, signal_id: Uuid, format: OutputFormat) -> Result<()> {
    let response = client.abort_signal(signal_id).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Emergency for signal {} aborted", signal_id));
            if response.cancelled_executions > 0 {
                print_info(&format!(
                    "{} running execution(s) cancelled",
                    response.cancelled_executions
                ));
            }
        }
    }

    Ok(())
}

/// Pre-approve irreversible actions for a signal
pub async fn approve(client: &ApiClient, signal_id: Uuid, format: OutputFormat) -> Result<()> {
    let response = client.approve_signal(signal_id).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Irreversible actions approved for signal {}",
                signal_id
            ));
            match &response.breach {
                Some(breach) => print_info(&format!(
                    "The next response to {} on {} may run irreversible actions",
                    breach.kind, breach.resource_id
                )),
                None => print_warning("No execution recorded for this signal; the approval covers that signal id only"),
            }
        }
    }

    Ok(())
}

pub async fn list(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let overrides = client.overrides().await?;

    if format == OutputFormat::Json {
        return print_json(&overrides);
    }

    if overrides.aborted.is_empty() && overrides.approved.is_empty() && overrides.approved_breaches.is_empty() {
        print_info("No operator overrides in effect");
        return Ok(());
    }

    println!("{}", "Aborted signals".bold());
    for id in &overrides.aborted {
        println!("  {}", id.to_string().red());
    }
    println!("{}", "Approved signals".bold());
    for id in &overrides.approved {
        println!("  {}", id.to_string().green());
    }
    if !overrides.approved_breaches.is_empty() {
        println!("{}", "Pending breach approvals".bold());
        for breach in &overrides.approved_breaches {
            println!("  {} on {}", breach.kind.to_string().green(), breach.resource_id);
        }
    }

    Ok(())
}
