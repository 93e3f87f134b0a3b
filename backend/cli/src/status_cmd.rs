//! CLI Status Command
//!
//! Queries a running gateway's health endpoint.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::terminal_output::{note_error, note_success};

pub async fn run(port: u16) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    match client
        .get(format!("http://localhost:{port}/api/health"))
        .send()
        .await
    {
        Ok(resp) => {
            let body: serde_json::Value = resp.json().await?;
            note_success(&format!("ChatRelay is running on port {port}"));
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Err(_) => note_error(&format!("ChatRelay is not running on port {port}")),
    }
    Ok(())
}
