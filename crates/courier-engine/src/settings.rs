// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide runtime settings.
//!
//! Seeded from `[policy]` and `[bot]` at startup and mutated by operators
//! through the admin API. Every read and write goes through one
//! reader-writer lock, so a read observes the latest completed write.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use courier_config::model::{BotConfig, PolicyConfig};
use courier_core::{Clock, CourierError};

/// Smallest accepted `min_delay_ms`.
pub const MIN_DELAY_FLOOR_MS: u64 = 1000;

/// The mutable settings fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsState {
    pub auto_reply_enabled: bool,
    pub away_enabled: bool,
    pub away_message: String,
    pub operating_start: u32,
    pub operating_end: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub daily_limit_per_user: u32,
}

/// Jitter bounds and the per-user daily cap, read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub daily_cap: u32,
}

/// Point-in-time view including the derived `is_operating` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
    #[serde(flatten)]
    pub state: SettingsState,
    pub is_operating: bool,
}

/// Partial settings update as accepted by `POST /api/settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub auto_reply_enabled: Option<bool>,
    #[serde(default)]
    pub away_enabled: Option<bool>,
    #[serde(default)]
    pub away_message: Option<String>,
    #[serde(default)]
    pub operating_start: Option<u32>,
    #[serde(default)]
    pub operating_end: Option<u32>,
    #[serde(default)]
    pub min_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    #[serde(default)]
    pub daily_limit_per_user: Option<u32>,
}

/// Runtime settings registry.
pub struct Settings {
    state: RwLock<SettingsState>,
    clock: Arc<dyn Clock>,
}

impl Settings {
    pub fn new(state: SettingsState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(state),
            clock,
        }
    }

    /// Seeds the registry from the loaded configuration.
    pub fn from_config(policy: &PolicyConfig, bot: &BotConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            SettingsState {
                auto_reply_enabled: bot.auto_reply_enabled,
                away_enabled: bot.away_enabled,
                away_message: bot.away_message.clone(),
                operating_start: policy.operating_hour_start,
                operating_end: policy.operating_hour_end,
                min_delay_ms: policy.min_delay_seconds.saturating_mul(1000),
                max_delay_ms: policy.max_delay_seconds.saturating_mul(1000),
                daily_limit_per_user: policy.max_system_msg_per_day,
            },
            clock,
        )
    }

    fn read(&self) -> RwLockReadGuard<'_, SettingsState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SettingsState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn auto_reply_enabled(&self) -> bool {
        self.read().auto_reply_enabled
    }

    pub fn set_auto_reply_enabled(&self, enabled: bool) {
        self.write().auto_reply_enabled = enabled;
    }

    pub fn away_enabled(&self) -> bool {
        self.read().away_enabled
    }

    pub fn set_away_enabled(&self, enabled: bool) {
        self.write().away_enabled = enabled;
    }

    pub fn away_message(&self) -> String {
        self.read().away_message.clone()
    }

    pub fn set_away_message(&self, message: impl Into<String>) {
        self.write().away_message = message.into();
    }

    /// `(start, end)` with `end` exclusive.
    pub fn operating_hours(&self) -> (u32, u32) {
        let state = self.read();
        (state.operating_start, state.operating_end)
    }

    /// Replaces the operating window. Both hours change together or not at all.
    pub fn set_operating_hours(&self, start: u32, end: u32) -> Result<(), CourierError> {
        if start > 23 || end > 24 || start >= end {
            return Err(CourierError::Validation(format!(
                "operating hours must satisfy 0 <= start < end <= 24, got {start}..{end}"
            )));
        }
        let mut state = self.write();
        state.operating_start = start;
        state.operating_end = end;
        Ok(())
    }

    pub fn rate_limits(&self) -> RateLimits {
        let state = self.read();
        RateLimits {
            min_delay_ms: state.min_delay_ms,
            max_delay_ms: state.max_delay_ms,
            daily_cap: state.daily_limit_per_user,
        }
    }

    /// Updates the rate limits, silently skipping any field that breaks its
    /// constraint. `max` is checked against the minimum in force after this
    /// call, so the jitter range can never invert.
    pub fn set_rate_limits(&self, min_delay_ms: u64, max_delay_ms: u64, daily_cap: u32) {
        let mut state = self.write();
        if min_delay_ms >= MIN_DELAY_FLOOR_MS {
            state.min_delay_ms = min_delay_ms;
        } else {
            debug!(min_delay_ms, "ignoring min delay below floor");
        }
        if max_delay_ms >= state.min_delay_ms {
            state.max_delay_ms = max_delay_ms;
        } else {
            debug!(max_delay_ms, "ignoring max delay below min delay");
        }
        if daily_cap >= 1 {
            state.daily_limit_per_user = daily_cap;
        }
        if state.max_delay_ms < state.min_delay_ms {
            state.max_delay_ms = state.min_delay_ms;
        }
    }

    /// Whether the local time is inside the operating window. Sunday is always closed.
    pub fn is_within_operating_hours(&self) -> bool {
        let now = self.clock.now();
        if now.weekday() == Weekday::Sun {
            return false;
        }
        let hour = now.hour();
        let state = self.read();
        hour >= state.operating_start && hour < state.operating_end
    }

    pub fn should_send_away(&self) -> bool {
        self.away_enabled() && !self.is_within_operating_hours()
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        let state = self.read().clone();
        SettingsSnapshot {
            state,
            is_operating: self.is_within_operating_hours(),
        }
    }

    /// Applies an operator patch.
    ///
    /// Hours apply only when both are present. Rate-limit fields merge over
    /// the current values before going through the clamping setter.
    pub fn apply(&self, patch: &SettingsPatch) -> Result<(), CourierError> {
        if let (Some(start), Some(end)) = (patch.operating_start, patch.operating_end) {
            self.set_operating_hours(start, end)?;
        }
        if let Some(enabled) = patch.auto_reply_enabled {
            self.set_auto_reply_enabled(enabled);
        }
        if let Some(enabled) = patch.away_enabled {
            self.set_away_enabled(enabled);
        }
        if let Some(message) = &patch.away_message {
            self.set_away_message(message.clone());
        }
        if patch.min_delay_ms.is_some()
            || patch.max_delay_ms.is_some()
            || patch.daily_limit_per_user.is_some()
        {
            let current = self.rate_limits();
            self.set_rate_limits(
                patch.min_delay_ms.unwrap_or(current.min_delay_ms),
                patch.max_delay_ms.unwrap_or(current.max_delay_ms),
                patch.daily_limit_per_user.unwrap_or(current.daily_cap),
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings").field("state", &*self.read()).finish()
    }
}
