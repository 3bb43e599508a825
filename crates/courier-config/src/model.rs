// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier messaging backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section is optional and defaults to the values
/// the service ships with.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process-level settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP administration API.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Durable row store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Messenger sessions and their on-disk stores.
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// Initial anti-abuse policy values (seed the settings registry).
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Queue, scheduler and broadcast tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Auto-reply behavior and keyword table.
    #[serde(default)]
    pub bot: BotConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/api` routes. Unset leaves the API open.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Allowed CORS origins.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

/// Row-store configuration.
///
/// When `supabase_url` is set the PostgREST-backed store is used; otherwise
/// records live in the local SQLite database at `database_path`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,

    #[serde(default)]
    pub supabase_key: Option<String>,

    /// Path to the local SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .to_string_lossy()
        .into_owned()
}

/// Messenger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessengerConfig {
    /// Base URL of the WhatsApp-Web bridge sidecar.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Directory holding `accounts.json` and the per-account session stores.
    #[serde(default = "default_session_dir")]
    pub session_dir: String,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            session_dir: default_session_dir(),
        }
    }
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

fn default_session_dir() -> String {
    ".".to_string()
}

/// Anti-abuse policy seeds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// First hour (local time) at which system messages may be sent.
    #[serde(default = "default_operating_hour_start")]
    pub operating_hour_start: u32,

    /// Hour (exclusive) at which the operating window closes.
    #[serde(default = "default_operating_hour_end")]
    pub operating_hour_end: u32,

    /// Lower bound of the pre-send jitter.
    #[serde(default = "default_min_delay_seconds")]
    pub min_delay_seconds: u64,

    /// Upper bound of the pre-send jitter.
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u64,

    /// System messages allowed per user per day.
    #[serde(default = "default_max_system_msg_per_day")]
    pub max_system_msg_per_day: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            operating_hour_start: default_operating_hour_start(),
            operating_hour_end: default_operating_hour_end(),
            min_delay_seconds: default_min_delay_seconds(),
            max_delay_seconds: default_max_delay_seconds(),
            max_system_msg_per_day: default_max_system_msg_per_day(),
        }
    }
}

fn default_operating_hour_start() -> u32 {
    8
}

fn default_operating_hour_end() -> u32 {
    20
}

fn default_min_delay_seconds() -> u64 {
    3
}

fn default_max_delay_seconds() -> u64 {
    10
}

fn default_max_system_msg_per_day() -> u32 {
    1
}

/// Background engine tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Capacity of the outbound job queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds between scheduler scans.
    #[serde(default = "default_scheduler_interval_secs")]
    pub scheduler_interval_secs: u64,

    /// Minimum pause between broadcast sends. Cannot go below 3000.
    #[serde(default = "default_broadcast_min_delay_ms")]
    pub broadcast_min_delay_ms: u64,

    /// Timeout applied to every messenger and row-store call.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Upper bound on waiting for the queue to drain at shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            scheduler_interval_secs: default_scheduler_interval_secs(),
            broadcast_min_delay_ms: default_broadcast_min_delay_ms(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_queue_capacity() -> usize {
    100
}

fn default_scheduler_interval_secs() -> u64 {
    30
}

fn default_broadcast_min_delay_ms() -> u64 {
    3000
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_drain_timeout_secs() -> u64 {
    30
}

/// Auto-reply configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    #[serde(default = "default_true")]
    pub auto_reply_enabled: bool,

    #[serde(default = "default_true")]
    pub away_enabled: bool,

    /// Text sent to inbound messages outside operating hours.
    #[serde(default = "default_away_message")]
    pub away_message: String,

    /// Trigger word (matched lowercased and trimmed) to response text.
    #[serde(default = "default_keywords")]
    pub keywords: BTreeMap<String, String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            auto_reply_enabled: true,
            away_enabled: true,
            away_message: default_away_message(),
            keywords: default_keywords(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_away_message() -> String {
    "Terima kasih telah menghubungi kami. Saat ini kami sedang di luar jam operasional.\n\n\
     📅 Jam Operasional:\nSenin - Sabtu: 08.00 - 20.00 WIB\n\n\
     Pesan Anda akan kami balas saat jam kerja. Terima kasih! 🙏"
        .to_string()
}

fn default_keywords() -> BTreeMap<String, String> {
    [
        (
            "info",
            "Halo 👋\nSelamat datang! Ini adalah bot informasi Esther.\n\nKetik:\n\
             • *jadwal* - Lihat jadwal\n• *bantuan* - Hubungi CS",
        ),
        (
            "jadwal",
            "📅 Jadwal operasional:\nSenin - Sabtu: 08.00 - 20.00 WIB",
        ),
        (
            "bantuan",
            "🙋 Tim CS kami akan segera menghubungi Anda.\nTerima kasih telah menunggu.",
        ),
        (
            "stop",
            "✅ Anda telah berhenti berlangganan notifikasi.\n\
             Ketik *start* untuk berlangganan kembali.",
        ),
        (
            "start",
            "✅ Anda telah berlangganan notifikasi.\nKetik *stop* untuk berhenti.",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
