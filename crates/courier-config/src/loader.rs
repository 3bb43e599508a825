// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./courier.toml` > `~/.config/courier/courier.toml`
//! > `/etc/courier/courier.toml`, with `COURIER_*` overrides and the flat
//! deployment variables (`SUPABASE_URL`, `PORT`, ...) on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CourierConfig;

/// Config sections addressable through `COURIER_<SECTION>_<KEY>`.
const SECTIONS: &[&str] = &[
    "agent", "gateway", "store", "messenger", "policy", "engine", "bot",
];

/// Flat deployment variables and the keys they feed.
const LEGACY_VARS: &[(&str, &str)] = &[
    ("supabase_url", "store.supabase_url"),
    ("supabase_key", "store.supabase_key"),
    ("port", "gateway.port"),
    ("max_system_msg_per_day", "policy.max_system_msg_per_day"),
    ("operating_hour_start", "policy.operating_hour_start"),
    ("operating_hour_end", "policy.operating_hour_end"),
    ("min_delay_seconds", "policy.min_delay_seconds"),
    ("max_delay_seconds", "policy.max_delay_seconds"),
];

/// Load a `.env` file from the working directory into the process environment.
///
/// Variables already set in the environment win. A missing file is fine.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }
}

/// Standard config file locations, lowest precedence first.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/courier/courier.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("courier/courier.toml"));
    }
    paths.push(PathBuf::from("courier.toml"));
    paths
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/courier/courier.toml`
/// 3. `~/.config/courier/courier.toml`
/// 4. `./courier.toml`
/// 5. `COURIER_*` environment variables
/// 6. Flat deployment variables (`SUPABASE_URL`, `PORT`, ...)
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no environment).
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    with_env(
        Figment::new()
            .merge(Serialized::defaults(CourierConfig::default()))
            .merge(Toml::file(path)),
    )
    .extract()
}

/// Build the Figment used for the standard lookup, before extraction.
pub fn build_figment() -> Figment {
    let figment = config_file_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(CourierConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        );
    with_env(figment)
}

fn with_env(figment: Figment) -> Figment {
    figment.merge(prefixed_env()).merge(legacy_env())
}

/// `COURIER_POLICY_MIN_DELAY_SECONDS` -> `policy.min_delay_seconds`.
///
/// Uses `Env::map()` rather than `split("_")` because key names contain
/// underscores themselves.
fn prefixed_env() -> Env {
    Env::prefixed("COURIER_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        let mapped = SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(*section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or(key_str.clone());
        mapped.into()
    })
}

fn legacy_env() -> Env {
    let names: Vec<&str> = LEGACY_VARS.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        LEGACY_VARS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, target)| (*target).into())
            .unwrap_or_else(|| key.as_str().to_ascii_lowercase().into())
    })
}
