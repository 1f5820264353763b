//! Agent health command

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    if format == OutputFormat::Json {
        return print_json(&health);
    }

    println!("Agent: {}", color_status(health.status.as_str()));

    let mut components: Vec<_> = health.components.into_iter().collect();
    components.sort_by(|a, b| a.0.cmp(&b.0));

    let rows: Vec<ComponentRow> = components
        .into_iter()
        .map(|(name, component)| ComponentRow {
            name,
            status: color_status(component.status.as_str()),
            message: component.message.unwrap_or_default(),
        })
        .collect();

    if !rows.is_empty() {
        let table = tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string();
        println!("{}", table);
    }

    Ok(())
}
