// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the cross-field constraints serde cannot express: hour windows,
//! delay ordering, the broadcast safety floor.

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Broadcast pacing may be raised in config but never lowered below this.
pub const BROADCAST_FLOOR_MS: u64 = 3000;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure rather than stopping at the first one.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.gateway.host.trim().is_empty() {
        fail("gateway.host must not be empty".to_string());
    }
    if config.gateway.port == 0 {
        fail("gateway.port must be non-zero".to_string());
    }

    let policy = &config.policy;
    if policy.operating_hour_start > 23 {
        fail(format!(
            "policy.operating_hour_start must be in 0..=23, got {}",
            policy.operating_hour_start
        ));
    }
    if policy.operating_hour_end > 24 {
        fail(format!(
            "policy.operating_hour_end must be in 0..=24, got {}",
            policy.operating_hour_end
        ));
    }
    if policy.operating_hour_start >= policy.operating_hour_end {
        fail(format!(
            "policy.operating_hour_start ({}) must be before policy.operating_hour_end ({})",
            policy.operating_hour_start, policy.operating_hour_end
        ));
    }
    if policy.min_delay_seconds < 1 {
        fail("policy.min_delay_seconds must be at least 1".to_string());
    }
    if policy.max_delay_seconds < policy.min_delay_seconds {
        fail(format!(
            "policy.max_delay_seconds ({}) must not be below policy.min_delay_seconds ({})",
            policy.max_delay_seconds, policy.min_delay_seconds
        ));
    }
    if policy.max_system_msg_per_day < 1 {
        fail("policy.max_system_msg_per_day must be at least 1".to_string());
    }

    let engine = &config.engine;
    if engine.queue_capacity == 0 {
        fail("engine.queue_capacity must be at least 1".to_string());
    }
    if engine.scheduler_interval_secs == 0 {
        fail("engine.scheduler_interval_secs must be at least 1".to_string());
    }
    if engine.broadcast_min_delay_ms < BROADCAST_FLOOR_MS {
        fail(format!(
            "engine.broadcast_min_delay_ms must be at least {BROADCAST_FLOOR_MS}, got {}",
            engine.broadcast_min_delay_ms
        ));
    }
    if engine.rpc_timeout_secs == 0 {
        fail("engine.rpc_timeout_secs must be at least 1".to_string());
    }

    if config.messenger.session_dir.trim().is_empty() {
        fail("messenger.session_dir must not be empty".to_string());
    }
    if config.messenger.bridge_url.trim().is_empty() {
        fail("messenger.bridge_url must not be empty".to_string());
    }

    match (&config.store.supabase_url, &config.store.supabase_key) {
        (Some(url), _) if !url.starts_with("http://") && !url.starts_with("https://") => {
            fail(format!("store.supabase_url `{url}` must be an http(s) URL"));
        }
        (Some(_), None) => fail("store.supabase_key is required when store.supabase_url is set".to_string()),
        (None, _) if config.store.database_path.trim().is_empty() => {
            fail("store.database_path must not be empty".to_string());
        }
        _ => {}
    }

    for key in config.bot.keywords.keys() {
        if key.trim().is_empty() {
            fail("bot.keywords must not contain an empty trigger".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &CourierConfig) -> Vec<String> {
        match validate_config(config) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_failure() {
        let mut config = CourierConfig::default();
        config.policy.operating_hour_start = 21;
        config.policy.min_delay_seconds = 0;
        config.engine.broadcast_min_delay_ms = 100;
        let errs = messages(&config);
        assert_eq!(errs.len(), 3, "{errs:?}");
        assert!(errs[0].contains("must be before"));
        assert!(errs[1].contains("min_delay_seconds"));
        assert!(errs[2].contains("broadcast_min_delay_ms"));
    }

    #[test]
    fn supabase_url_requires_key() {
        let mut config = CourierConfig::default();
        config.store.supabase_url = Some("https://x.supabase.co".into());
        let errs = messages(&config);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("supabase_key"));

        config.store.supabase_key = Some("anon".into());
        assert!(messages(&config).is_empty());
    }

    #[test]
    fn end_hour_24_is_allowed() {
        let mut config = CourierConfig::default();
        config.policy.operating_hour_end = 24;
        assert!(validate_config(&config).is_ok());
    }
}
