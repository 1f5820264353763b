//! Cost Guard operator CLI
//!
//! Inspect and steer the cost agent's emergency workflows, manage operator
//! overrides, and compute right-sizing advice offline.

mod client;
mod commands;
mod config;
mod output;

use agent_lib::advisor::ConcurrencyStats;
use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{advise, executions, health, overrides, recommendations};
use uuid::Uuid;

/// Cost Guard operator CLI
#[derive(Parser)]
#[command(name = "costctl")]
#[command(author, version, about = "CLI for the Cost Guard anomaly response agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (default http://localhost:8080, or api_url from the config file)
    #[arg(long, env = "COSTCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect emergency workflow executions
    #[command(subcommand)]
    Executions(ExecutionCommands),

    /// Manage operator overrides
    #[command(subcommand)]
    Override(OverrideCommands),

    /// Show the agent's right-sizing recommendations
    Recommendations {
        /// Only functions whose memory should change
        #[arg(long)]
        changes_only: bool,
    },

    /// Compute right-sizing advice locally
    #[command(subcommand)]
    Advise(AdviseCommands),

    /// Show agent health
    Health,
}

#[derive(Subcommand)]
pub enum ExecutionCommands {
    /// List executions, running first
    List {
        /// Filter by status (running, completed, no_action_required, timed_out, cancelled, failed)
        #[arg(long)]
        status: Option<String>,

        /// Show at most this many executions
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show one execution and its remediation branches
    Show {
        /// Execution ID
        id: Uuid,
    },

    /// Print the execution report
    Report {
        /// Execution ID
        id: Uuid,
    },

    /// Cancel a running execution
    Cancel {
        /// Execution ID
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum OverrideCommands {
    /// Treat a signal's emergency as not confirmed
    Abort {
        /// Anomaly signal ID
        signal_id: Uuid,
    },

    /// Pre-approve irreversible actions for a signal
    Approve {
        /// Anomaly signal ID
        signal_id: Uuid,
    },

    /// List overrides in effect
    List,
}

#[derive(Subcommand)]
pub enum AdviseCommands {
    /// Recommend a memory size and timeout
    Memory {
        /// Average duration in milliseconds
        #[arg(long)]
        duration_ms: f64,

        /// Peak memory utilization in percent
        #[arg(long)]
        utilization: f64,

        /// Current memory size in MB
        #[arg(long)]
        memory_mb: u32,

        /// Monthly invocations
        #[arg(long, default_value_t = 1_000_000.0)]
        invocations: f64,

        /// Current timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u32>,

        /// Price per GB-second
        #[arg(long)]
        price: Option<f64>,

        /// Function name shown in the output
        #[arg(long, default_value = "function")]
        function: String,
    },

    /// Recommend reserved concurrency
    Concurrency {
        /// Peak concurrent executions
        #[arg(long)]
        peak: f64,

        /// Average concurrent executions
        #[arg(long)]
        average: f64,

        /// Share of intervals spent bursting, in percent
        #[arg(long)]
        burst_pct: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();

    // Local calculations need no agent
    if let Commands::Advise(advise_cmd) = &cli.command {
        return match advise_cmd {
            AdviseCommands::Memory {
                duration_ms,
                utilization,
                memory_mb,
                invocations,
                timeout_secs,
                price,
                function,
            } => advise::advise_memory(
                advise::MemoryArgs {
                    function: function.clone(),
                    avg_duration_ms: *duration_ms,
                    memory_utilization_pct: *utilization,
                    memory_mb: *memory_mb,
                    invocations_per_month: *invocations,
                    timeout_secs: *timeout_secs,
                    unit_price: *price,
                },
                format,
            ),
            AdviseCommands::Concurrency {
                peak,
                average,
                burst_pct,
            } => advise::advise_concurrency(
                ConcurrencyStats {
                    peak: *peak,
                    average: *average,
                    burst_frequency_pct: *burst_pct,
                },
                format,
            ),
        };
    }

    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    match cli.command {
        Commands::Executions(cmd) => match cmd {
            ExecutionCommands::List { status, limit } => {
                executions::list_executions(&client, status, limit, format).await?;
            }
            ExecutionCommands::Show { id } => {
                executions::show_execution(&client, id, format).await?;
            }
            ExecutionCommands::Report { id } => {
                executions::show_report(&client, id).await?;
            }
            ExecutionCommands::Cancel { id } => {
                executions::cancel_execution(&client, id, format).await?;
            }
        },
        Commands::Override(cmd) => match cmd {
            OverrideCommands::Abort { signal_id } => {
                overrides::abort(&client, signal_id, format).await?;
            }
            OverrideCommands::Approve { signal_id } => {
                overrides::approve(&client, signal_id, format).await?;
            }
            OverrideCommands::List => {
                overrides::list(&client, format).await?;
            }
        },
        Commands::Recommendations { changes_only } => {
            recommendations::list_recommendations(&client, changes_only, cli.verbose, format).await?;
        }
        Commands::Health => {
            health::show_health(&client, format).await?;
        }
        Commands::Advise(_) => {}
    }

    Ok(())
}
