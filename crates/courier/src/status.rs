// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` command implementation.
//!
//! Queries the gateway health endpoint of a local server. Reports "not
//! running" instead of failing when nothing answers.

use std::io::IsTerminal;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::CourierError;
use serde::{Deserialize, Serialize};

/// Health endpoint response from the gateway.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub endpoint: String,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Address a local client should dial for a server bound to `host`.
pub fn dial_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" => "::1",
        other => other,
    }
}

/// Base `http://host:port` of the configured gateway.
pub fn gateway_base(config: &CourierConfig) -> String {
    let host = dial_host(&config.gateway.host);
    if host.contains(':') {
        format!("http://[{host}]:{}", config.gateway.port)
    } else {
        format!("http://{host}:{}", config.gateway.port)
    }
}

/// Run the `courier status` command.
pub async fn run_status(config: &CourierConfig, json: bool, plain: bool) -> Result<(), CourierError> {
    let endpoint = format!("{}/api/health", gateway_base(config));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| CourierError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(&endpoint).send().await {
        Ok(resp) if resp.status().is_success() => Some(
            resp.json::<HealthResponse>()
                .await
                .map_err(|e| CourierError::Internal(format!("failed to parse health response: {e}")))?,
        ),
        _ => None,
    };

    let status_resp = match health {
        Some(health) => StatusResponse {
            running: true,
            uptime_human: Some(format_uptime(health.uptime_secs)),
            status: health.status,
            version: Some(health.version),
            uptime_secs: Some(health.uptime_secs),
            endpoint,
        },
        None => StatusResponse {
            running: false,
            status: "not running".to_string(),
            version: None,
            uptime_secs: None,
            uptime_human: None,
            endpoint,
        },
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status_resp).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status_resp, use_color);
    }
    Ok(())
}

fn print_status(status: &StatusResponse, use_color: bool) {
    println!();
    println!("  courier status");
    println!("  {}", "-".repeat(35));

    match (status.running, use_color) {
        (true, true) => {
            use colored::Colorize;
            println!(
                "    State:    {} {} (uptime: {})",
                "✓".green(),
                status.status.green(),
                status.uptime_human.as_deref().unwrap_or("?")
            );
        }
        (true, false) => println!(
            "    State:    [OK] {} (uptime: {})",
            status.status,
            status.uptime_human.as_deref().unwrap_or("?")
        ),
        (false, true) => {
            use colored::Colorize;
            println!("    State:    {} {}", "✗".red(), "not running".red());
        }
        (false, false) => println!("    State:    [FAIL] not running"),
    }

    if let Some(version) = &status.version {
        println!("    Version:  {version}");
    }
    println!("    Endpoint: {}", status.endpoint);
    if !status.running {
        println!();
        println!("  Start with: courier serve");
    }
    println!();
}
