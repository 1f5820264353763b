//! Emergency workflow execution commands

use agent_lib::workflow::WorkflowExecution;
use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{
    color_savings, color_severity, color_status, print_json, print_success, print_warning, short_id,
    OutputFormat,
};

/// Row for executions table
#[derive(Tabled)]
struct ExecutionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Anomaly")]
    kind: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Actions")]
    actions: String,
    #[tabled(rename = "Started")]
    started_at: String,
}

/// Row for the remediation branches of one execution
#[derive(Tabled)]
struct BranchRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Outcome")]
    status: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Savings")]
    savings: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

pub async fn list_executions(
    client: &ApiClient,
    status: Option<String>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let executions: Vec<WorkflowExecution> = client
        .list_executions()
        .await?
        .into_iter()
        .filter(|e| {
            status
                .as_ref()
                .map(|s| e.status.as_str().eq_ignore_ascii_case(s))
                .unwrap_or(true)
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    match format {
        OutputFormat::Json => print_json(&executions)?,
        OutputFormat::Table => {
            if executions.is_empty() {
                print_warning("No executions found");
                return Ok(());
            }

            let rows: Vec<ExecutionRow> = executions
                .iter()
                .map(|e| ExecutionRow {
                    id: short_id(&e.id),
                    kind: e.signal.kind.to_string(),
                    resource: e.signal.resource_id.clone(),
                    severity: color_severity(&e.signal.severity.to_string()),
                    status: color_status(e.status.as_str()),
                    actions: format!(
                        "{}/{} ok",
                        e.actions_succeeded.len(),
                        e.actions_attempted.len()
                    ),
                    started_at: e.started_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} executions", executions.len());
        }
    }

    Ok(())
}

pub async fn show_execution(client: &ApiClient, id: Uuid, format: OutputFormat) -> Result<()> {
    let execution = client.get_execution(id).await?;

    if format == OutputFormat::Json {
        return print_json(&execution);
    }

    let signal = &execution.signal;
    println!("{}", "Emergency Response Execution".bold());
    println!("{}", "=".repeat(60));
    println!("ID:        {}", execution.id.to_string().cyan());
    println!("Signal:    {}", execution.anomaly_signal_id);
    println!(
        "Anomaly:   {} on {} ({})",
        signal.kind,
        signal.resource_id.cyan(),
        color_severity(&signal.severity.to_string())
    );
    println!(
        "Observed:  {:.2} against threshold {:.2}",
        signal.observed_value, signal.threshold
    );
    println!("State:     {}", execution.state);
    println!("Status:    {}", color_status(execution.status.as_str()));
    println!(
        "Started:   {}",
        execution.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(completed_at) = execution.completed_at {
        println!("Completed: {}", completed_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    let Some(report) = &execution.report else {
        println!();
        print_warning("Execution still running; no report yet");
        return Ok(());
    };

    if let Some(note) = &report.note {
        println!("Note:      {}", note);
    }
    println!(
        "Savings:   {} realized of {} planned",
        color_savings(report.realized_savings),
        color_savings(report.planned_savings)
    );
    println!();

    if report.branches.is_empty() {
        print_warning("No remediation actions were attempted");
        return Ok(());
    }

    let rows: Vec<BranchRow> = report
        .branches
        .iter()
        .map(|b| BranchRow {
            action: b.action.action.to_string(),
            target: b.action.target.clone(),
            status: color_status(b.status.as_str()),
            attempts: b.attempts,
            savings: color_savings(b.action.estimated_savings),
            detail: b.detail.clone().unwrap_or_default(),
        })
        .collect();

    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);

    Ok(())
}

/// Print the agent's rendered report verbatim
pub async fn show_report(client: &ApiClient, id: Uuid) -> Result<()> {
    let report = client.execution_report(id).await?;
    print!("{}", report);
    Ok(())
}

pub async fn cancel_execution(client: &ApiClient, id: Uuid, format: OutputFormat) -> Result<()> {
    let response = client.cancel_execution(id).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Cancellation requested for execution {}", id));
        }
    }

    Ok(())
}
