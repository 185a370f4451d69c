//! Refresh-token model.

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use sentra_core::{AccessTokenId, UserId};

/// One link in a per-user rotation chain.
///
/// # Invariants
/// - `token_value` is unique across all time; a value is never reused, even
///   after revocation.
/// - The chain is strictly linear: each token points at most at one successor
///   via `replaced_by_token_value`, and successors are always freshly
///   generated, so no cycles can form.
/// - Tokens are never physically deleted; revoked and expired links are
///   retained for reuse-detection audit and the inactivity sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Opaque, unguessable, high-entropy value presented by clients.
    pub token_value: String,

    /// The short-lived access token this refresh token was issued alongside.
    pub access_token_id: AccessTokenId,

    pub user_id: UserId,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,

    /// Set when this token is rotated forward; forms the forward-linked chain.
    pub replaced_by_token_value: Option<String>,

    pub created_by_ip: Option<String>,

    /// Last successful validation, recorded best-effort for the inactivity
    /// sweep.
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Active = not revoked and not expired. At most one token per chain is
    /// active at any instant under normal operation.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }

    /// True when revocation happened as part of a rotation (a successor
    /// exists), as opposed to an explicit or reactive revoke.
    pub fn was_rotated(&self) -> bool {
        self.replaced_by_token_value.is_some()
    }

    /// The terminal-state view of this token at `now`.
    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_revoked {
            if self.was_rotated() {
                TokenState::Rotated
            } else {
                TokenState::Revoked
            }
        } else if self.is_expired(now) {
            TokenState::Expired
        } else {
            TokenState::Active
        }
    }

    /// The most recent rotation or validation activity on this link.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_validated_at
            .map_or(self.issued_at, |v| v.max(self.issued_at))
    }
}

/// Per-token lifecycle state.
///
/// `Rotated`, `Revoked` and `Expired` are terminal and mutually exclusive; a
/// token never transitions out of a terminal state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Active,
    Rotated,
    Revoked,
    Expired,
}

/// Generate a fresh opaque token value (256 bits from the OS RNG, hex).
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
