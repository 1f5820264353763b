//! Cost Agent - cloud cost anomaly response daemon
//!
//! Ingests the cost feed, detects budget and spike anomalies, runs the
//! emergency remediation workflow and publishes right-sizing advice.

use agent_lib::{
    advisor::{AdvisorScheduler, RightSizingAdvisor},
    collector::{MetricWindow, MonitorLoopBuilder},
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    workflow::{
        EmergencyWorkflow, ExecutionHistory, LogNotifier, MetricRevalidator, NotificationSink,
        WebhookNotifier,
    },
    ResourceInventory,
};
use anyhow::{Context, Result};
use cost_agent::{api, config::AgentConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = AgentConfig::load()?;
    info!(node_name = %config.node_name, "Agent configured");

    let health_registry = HealthRegistry::new();
    for component in [
        components::METRIC_SOURCE,
        components::DETECTOR,
        components::WORKFLOW,
        components::NOTIFIER,
        components::ADVISOR,
    ] {
        health_registry.register(component).await;
    }

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION);

    let inventory = match &config.inventory_path {
        Some(path) => ResourceInventory::load(path)?,
        None => {
            warn!("No inventory configured; only account-level actions can be proposed");
            ResourceInventory::default()
        }
    };
    info!(resources = inventory.resources.len(), "Inventory loaded");

    let history = Arc::new(match &config.history_path {
        Some(path) => ExecutionHistory::with_archive(path.clone())
            .context("Failed to open execution archive")?,
        None => ExecutionHistory::new(),
    });

    let notifier: Arc<dyn NotificationSink> = match &config.notification_webhook {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), config.outbound_timeout())?),
        None => {
            warn!("No notification webhook configured; alerts are logged only");
            Arc::new(LogNotifier)
        }
    };

    let window = MetricWindow::default();
    let validator = Arc::new(MetricRevalidator::new(
        Arc::new(window.clone()),
        config.thresholds.clone(),
    ));

    let workflow = Arc::new(
        EmergencyWorkflow::new(
            config.workflow.clone(),
            validator,
            notifier,
            config.executor_registry()?,
            history.clone(),
        )
        .with_logger(logger.clone())
        .with_health(health_registry.clone()),
    );

    let monitor = MonitorLoopBuilder::new()
        .source(Arc::new(window.clone()))
        .workflow(workflow)
        .inventory(Arc::new(inventory))
        .interval(config.evaluation_interval())
        .thresholds(config.thresholds.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    let (advisor, mut recommendations) = AdvisorScheduler::new(
        RightSizingAdvisor::with_config(config.advisor.clone()),
        config.advisor_interval(),
    );
    let advisor = Arc::new(advisor.with_health(health_registry.clone()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        window,
        history,
        advisor.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let monitor_handle = {
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { monitor.run(shutdown).await })
    };

    let advisor_handle = {
        let advisor = advisor.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { advisor.run(shutdown).await })
    };

    let recommendation_handle = tokio::spawn(async move {
        while let Some(recommendation) = recommendations.recv().await {
            if recommendation.changes_memory() {
                info!(
                    event = "right_sizing",
                    resource_id = %recommendation.resource_id,
                    current_memory_mb = recommendation.current_memory_mb,
                    recommended_memory_mb = recommendation.recommended_memory_mb,
                    monthly_savings = recommendation.estimated_monthly_savings,
                    "Right-sizing recommendation"
                );
            }
        }
    });

    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    if let Err(e) = monitor_handle.await {
        warn!(error = %e, "Monitor task ended abnormally");
    }
    if let Err(e) = advisor_handle.await {
        warn!(error = %e, "Advisor task ended abnormally");
    }
    recommendation_handle.abort();
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server stopped with error"),
        Err(e) => warn!(error = %e, "API task ended abnormally"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
