//! Ledger configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Reaction to a detected token reuse.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenReuseAction {
    /// Revoke every token in every chain belonging to the user (full
    /// session invalidation).
    #[default]
    RevokeAll,
    /// Walk forward from the reused token and revoke only that chain.
    RevokeChain,
    /// Record the event, take no revocation action.
    LogOnly,
}

/// Refresh-token ledger tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub refresh_token_lifetime_days: i64,
    pub max_active_tokens_per_user: usize,

    /// Window after a rotation during which the rotated-out token still
    /// validates instead of counting as reuse (tolerates duplicate refresh
    /// calls in flight). Zero means strict replay protection.
    pub token_rotation_grace_period_minutes: i64,

    pub detect_token_reuse: bool,
    pub token_reuse_action: TokenReuseAction,

    pub auto_revoke_inactive_tokens: bool,
    pub inactive_token_revocation_days: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            refresh_token_lifetime_days: 30,
            max_active_tokens_per_user: 5,
            token_rotation_grace_period_minutes: 0,
            detect_token_reuse: true,
            token_reuse_action: TokenReuseAction::RevokeAll,
            auto_revoke_inactive_tokens: true,
            inactive_token_revocation_days: 90,
        }
    }
}

impl LedgerConfig {
    pub fn with_lifetime_days(mut self, days: i64) -> Self {
        self.refresh_token_lifetime_days = days;
        self
    }

    pub fn with_max_active_tokens(mut self, max: usize) -> Self {
        self.max_active_tokens_per_user = max;
        self
    }

    pub fn with_grace_period_minutes(mut self, minutes: i64) -> Self {
        self.token_rotation_grace_period_minutes = minutes;
        self
    }

    pub fn with_reuse_action(mut self, action: TokenReuseAction) -> Self {
        self.token_reuse_action = action;
        self
    }

    pub fn with_inactive_revocation_days(mut self, days: i64) -> Self {
        self.inactive_token_revocation_days = days;
        self
    }

    pub(crate) fn lifetime(&self) -> Duration {
        Duration::days(self.refresh_token_lifetime_days)
    }

    pub(crate) fn grace_period(&self) -> Duration {
        Duration::minutes(self.token_rotation_grace_period_minutes)
    }

    pub(crate) fn inactivity_window(&self) -> Duration {
        Duration::days(self.inactive_token_revocation_days)
    }
}
