//! Issuance, validation, rotation and reuse reaction.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use sentra_core::{AccessTokenId, Clock, UserId};

use crate::config::{LedgerConfig, TokenReuseAction};
use crate::repository::{RepositoryError, TokenRepository};
use crate::token::{RefreshToken, generate_token_value};

/// Outcome of presenting a refresh token.
///
/// A first-class value, not an error: reuse detection drives a revocation
/// reaction but the caller still receives an ordinary result to act on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The token is active and may be rotated.
    Valid,
    /// No such token.
    Invalid,
    /// Natural expiry; no reuse implication.
    Expired,
    /// The token was already consumed by a rotation or revocation — a
    /// replay signal.
    ReuseDetected,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown token")]
    UnknownToken,

    /// The token presented for rotation is revoked or expired. Callers must
    /// validate immediately before rotating, inside the same logical
    /// operation.
    #[error("token is not active")]
    NotActive,

    /// A concurrent rotation or revocation won the conditional write. The
    /// caller should treat the token as consumed.
    #[error("rotation lost a concurrent race")]
    Conflict,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Owns the refresh-token rotation chain per user.
///
/// `rotate` is the only mutation path that links two tokens into a chain,
/// and its atomicity rests on the repository's conditional write: two
/// concurrent rotations of the same token yield exactly one success and one
/// [`LedgerError::Conflict`], never a branching chain.
pub struct RefreshTokenLedger {
    repo: Arc<dyn TokenRepository>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl RefreshTokenLedger {
    pub fn new(repo: Arc<dyn TokenRepository>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            repo,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Issue a fresh token for a login or registration.
    ///
    /// Enforces the per-user active-token cap by revoking the oldest active
    /// tokens (revoked, not rotated — they get no successor) before the new
    /// one is created.
    pub async fn issue(
        &self,
        user_id: UserId,
        access_token_id: AccessTokenId,
        client_ip: Option<&str>,
    ) -> Result<RefreshToken, LedgerError> {
        let now = self.clock.now();

        let active = self.repo.active_for_user(user_id, now).await?;
        if active.len() >= self.config.max_active_tokens_per_user {
            let excess = active.len() + 1 - self.config.max_active_tokens_per_user;
            for stale in active.iter().take(excess) {
                self.repo
                    .revoke_if_active(&stale.token_value, now, client_ip, None)
                    .await?;
                debug!(user_id = %user_id, "revoked oldest active token to honor cap");
            }
        }

        let token = self.mint(user_id, access_token_id, client_ip, now);
        self.repo.save(&token).await?;
        info!(user_id = %user_id, "issued refresh token");
        Ok(token)
    }

    /// Classify a presented token and react to reuse.
    pub async fn validate(&self, token_value: &str) -> Result<Validation, LedgerError> {
        let Some(token) = self.repo.get(token_value).await? else {
            return Ok(Validation::Invalid);
        };
        let now = self.clock.now();

        if token.is_revoked {
            if self.within_grace(&token, now) {
                // Duplicate refresh calls in flight: classification is
                // suppressed, the revocation reaction is not triggered.
                debug!(user_id = %token.user_id, "rotated token presented inside grace window");
                return Ok(Validation::Valid);
            }

            warn!(
                user_id = %token.user_id,
                action = ?self.config.token_reuse_action,
                "refresh token reuse detected"
            );
            if self.config.detect_token_reuse {
                self.react_to_reuse(&token, now).await?;
            }
            return Ok(Validation::ReuseDetected);
        }

        if token.is_expired(now) {
            return Ok(Validation::Expired);
        }

        // Activity signal for the inactivity sweep; losing it must not fail
        // the validation itself.
        if let Err(e) = self.repo.record_validation(token_value, now).await {
            warn!(error = %e, "failed to record token validation activity");
        }
        Ok(Validation::Valid)
    }

    /// Replace-and-revoke: consume the old token and hand out its successor.
    ///
    /// Requires a [`Validation::Valid`] result for `old_token_value`
    /// immediately beforehand. The conditional write on the old token decides
    /// concurrent races; the loser's freshly minted successor is never
    /// persisted.
    pub async fn rotate(
        &self,
        old_token_value: &str,
        access_token_id: AccessTokenId,
        client_ip: Option<&str>,
    ) -> Result<RefreshToken, LedgerError> {
        let Some(old) = self.repo.get(old_token_value).await? else {
            return Err(LedgerError::UnknownToken);
        };
        let now = self.clock.now();
        if !old.is_active(now) {
            return Err(LedgerError::NotActive);
        }

        let successor = self.mint(old.user_id, access_token_id, client_ip, now);

        let won = self
            .repo
            .revoke_if_active(
                old_token_value,
                now,
                client_ip,
                Some(&successor.token_value),
            )
            .await?;
        if !won {
            return Err(LedgerError::Conflict);
        }

        self.repo.save(&successor).await?;
        debug!(user_id = %old.user_id, "rotated refresh token");
        Ok(successor)
    }

    /// Revoke every non-expired token belonging to the user.
    pub async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        client_ip: Option<&str>,
    ) -> Result<usize, LedgerError> {
        let now = self.clock.now();
        let active = self.repo.active_for_user(user_id, now).await?;

        let mut revoked = 0;
        for token in active {
            if self
                .repo
                .revoke_if_active(&token.token_value, now, client_ip, None)
                .await?
            {
                revoked += 1;
            }
        }
        info!(user_id = %user_id, revoked, "revoked all refresh tokens for user");
        Ok(revoked)
    }

    /// Revoke active tokens with no rotation or validation activity inside
    /// the configured window. Background maintenance, not request-path.
    pub async fn sweep_inactive(&self) -> Result<usize, LedgerError> {
        if !self.config.auto_revoke_inactive_tokens {
            return Ok(0);
        }
        let now = self.clock.now();
        let cutoff = now - self.config.inactivity_window();
        let stale = self.repo.inactive_tokens(cutoff).await?;

        let mut revoked = 0;
        for token in stale {
            if token.is_expired(now) {
                // Natural expiry needs no revocation.
                continue;
            }
            if self
                .repo
                .revoke_if_active(&token.token_value, now, None, None)
                .await?
            {
                revoked += 1;
            }
        }
        if revoked > 0 {
            info!(revoked, "inactivity sweep revoked stale tokens");
        }
        Ok(revoked)
    }

    fn mint(
        &self,
        user_id: UserId,
        access_token_id: AccessTokenId,
        client_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> RefreshToken {
        RefreshToken {
            token_value: generate_token_value(),
            access_token_id,
            user_id,
            issued_at: now,
            expires_at: now + self.config.lifetime(),
            is_revoked: false,
            revoked_at: None,
            revoked_by_ip: None,
            replaced_by_token_value: None,
            created_by_ip: client_ip.map(str::to_string),
            last_validated_at: None,
        }
    }

    /// Grace applies only to tokens consumed *by rotation* (a successor
    /// exists) and only suppresses the reuse classification — a token
    /// revoked outright is never grace-eligible.
    fn within_grace(&self, token: &RefreshToken, now: DateTime<Utc>) -> bool {
        if self.config.token_rotation_grace_period_minutes <= 0 || !token.was_rotated() {
            return false;
        }
        token
            .revoked_at
            .is_some_and(|revoked_at| now <= revoked_at + self.config.grace_period())
    }

    async fn react_to_reuse(
        &self,
        token: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        match self.config.token_reuse_action {
            TokenReuseAction::RevokeAll => {
                self.revoke_all_for_user(token.user_id, None).await?;
            }
            TokenReuseAction::RevokeChain => {
                self.revoke_chain(token, now).await?;
            }
            TokenReuseAction::LogOnly => {}
        }
        Ok(())
    }

    /// Walk forward through `replaced_by_token_value` links from the reused
    /// token and revoke every still-active link. Chains are linear by
    /// construction; the visited set terminates the walk on malformed data.
    async fn revoke_chain(
        &self,
        start: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<usize, LedgerError> {
        let mut revoked = 0;
        let mut visited: HashSet<String> = HashSet::new();
        let mut cursor = start.clone();
        visited.insert(cursor.token_value.clone());

        loop {
            if self
                .repo
                .revoke_if_active(&cursor.token_value, now, None, None)
                .await?
            {
                revoked += 1;
            }
            let Some(next) = cursor.replaced_by_token_value.clone() else {
                break;
            };
            if !visited.insert(next.clone()) {
                break;
            }
            match self.repo.get(&next).await? {
                Some(token) => cursor = token,
                None => break,
            }
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::RwLock;

    use async_trait::async_trait;
    use chrono::Duration;

    use sentra_core::ManualClock;

    use crate::token::TokenState;

    use super::*;

    /// Map-backed repository with the same conditional-write semantics the
    /// production store provides.
    #[derive(Default)]
    struct MemRepo {
        tokens: RwLock<HashMap<String, RefreshToken>>,
    }

    #[async_trait]
    impl TokenRepository for MemRepo {
        async fn get(&self, token_value: &str) -> Result<Option<RefreshToken>, RepositoryError> {
            Ok(self.tokens.read().unwrap().get(token_value).cloned())
        }

        async fn save(&self, token: &RefreshToken) -> Result<(), RepositoryError> {
            self.tokens
                .write()
                .unwrap()
                .insert(token.token_value.clone(), token.clone());
            Ok(())
        }

        async fn active_for_user(
            &self,
            user_id: UserId,
            now: DateTime<Utc>,
        ) -> Result<Vec<RefreshToken>, RepositoryError> {
            let mut active: Vec<RefreshToken> = self
                .tokens
                .read()
                .unwrap()
                .values()
                .filter(|t| t.user_id == user_id && t.is_active(now))
                .cloned()
                .collect();
            active.sort_by_key(|t| t.issued_at);
            Ok(active)
        }

        async fn revoke_if_active(
            &self,
            token_value: &str,
            revoked_at: DateTime<Utc>,
            revoked_by_ip: Option<&str>,
            replaced_by: Option<&str>,
        ) -> Result<bool, RepositoryError> {
            let mut tokens = self.tokens.write().unwrap();
            match tokens.get_mut(token_value) {
                Some(token) if !token.is_revoked => {
                    token.is_revoked = true;
                    token.revoked_at = Some(revoked_at);
                    token.revoked_by_ip = revoked_by_ip.map(str::to_string);
                    token.replaced_by_token_value = replaced_by.map(str::to_string);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn record_validation(
            &self,
            token_value: &str,
            at: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            if let Some(token) = self.tokens.write().unwrap().get_mut(token_value) {
                token.last_validated_at = Some(at);
            }
            Ok(())
        }

        async fn inactive_tokens(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<RefreshToken>, RepositoryError> {
            Ok(self
                .tokens
                .read()
                .unwrap()
                .values()
                .filter(|t| !t.is_revoked && t.last_activity_at() < cutoff)
                .cloned()
                .collect())
        }
    }

    struct Fixture {
        repo: Arc<MemRepo>,
        clock: Arc<ManualClock>,
        ledger: RefreshTokenLedger,
    }

    fn fixture(config: LedgerConfig) -> Fixture {
        let repo = Arc::new(MemRepo::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = RefreshTokenLedger::new(
            Arc::clone(&repo) as Arc<dyn TokenRepository>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            config,
        );
        Fixture {
            repo,
            clock,
            ledger,
        }
    }

    async fn stored(f: &Fixture, value: &str) -> RefreshToken {
        f.repo.get(value).await.unwrap().expect("token should exist")
    }

    #[tokio::test]
    async fn issue_persists_an_active_token() {
        let f = fixture(LedgerConfig::default());
        let user = UserId::new();
        let token = f
            .ledger
            .issue(user, AccessTokenId::new(), Some("10.0.0.1"))
            .await
            .unwrap();

        let saved = stored(&f, &token.token_value).await;
        assert_eq!(saved.user_id, user);
        assert_eq!(saved.created_by_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(saved.state(f.clock.now()), TokenState::Active);
        assert_eq!(saved.expires_at - saved.issued_at, Duration::days(30));
    }

    #[tokio::test]
    async fn issuing_past_the_cap_revokes_the_oldest() {
        let f = fixture(LedgerConfig::default().with_max_active_tokens(2));
        let user = UserId::new();

        let first = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        f.clock.advance(Duration::minutes(1));
        let second = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        f.clock.advance(Duration::minutes(1));
        let third = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();

        let now = f.clock.now();
        assert!(!stored(&f, &first.token_value).await.is_active(now));
        assert!(stored(&f, &second.token_value).await.is_active(now));
        assert!(stored(&f, &third.token_value).await.is_active(now));

        // Revoked for cap reasons, not rotated: no successor link.
        let oldest = stored(&f, &first.token_value).await;
        assert_eq!(oldest.state(now), TokenState::Revoked);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let f = fixture(LedgerConfig::default());
        assert_eq!(f.ledger.validate("missing").await.unwrap(), Validation::Invalid);
    }

    #[tokio::test]
    async fn expired_token_is_expired_not_reuse() {
        let f = fixture(LedgerConfig::default());
        let token = f
            .ledger
            .issue(UserId::new(), AccessTokenId::new(), None)
            .await
            .unwrap();

        f.clock.advance(Duration::days(31));
        assert_eq!(
            f.ledger.validate(&token.token_value).await.unwrap(),
            Validation::Expired
        );
        // Natural expiry leaves the token un-revoked.
        assert!(!stored(&f, &token.token_value).await.is_revoked);
    }

    #[tokio::test]
    async fn validation_records_activity() {
        let f = fixture(LedgerConfig::default());
        let token = f
            .ledger
            .issue(UserId::new(), AccessTokenId::new(), None)
            .await
            .unwrap();

        f.clock.advance(Duration::hours(1));
        assert_eq!(
            f.ledger.validate(&token.token_value).await.unwrap(),
            Validation::Valid
        );
        assert_eq!(
            stored(&f, &token.token_value).await.last_validated_at,
            Some(f.clock.now())
        );
    }

    #[tokio::test]
    async fn rotation_chain_stays_linear_with_one_active_tip() {
        let f = fixture(LedgerConfig::default());
        let user = UserId::new();
        let t0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();

        let mut values = vec![t0.token_value.clone()];
        let mut current = t0.token_value.clone();
        for _ in 0..4 {
            assert_eq!(f.ledger.validate(&current).await.unwrap(), Validation::Valid);
            let next = f
                .ledger
                .rotate(&current, AccessTokenId::new(), None)
                .await
                .unwrap();
            values.push(next.token_value.clone());
            current = next.token_value;
        }

        let now = f.clock.now();
        // Exactly one active token: the tip.
        for (i, value) in values.iter().enumerate() {
            let token = stored(&f, value).await;
            if i == values.len() - 1 {
                assert_eq!(token.state(now), TokenState::Active);
                assert_eq!(token.replaced_by_token_value, None);
            } else {
                assert_eq!(token.state(now), TokenState::Rotated);
                assert_eq!(
                    token.replaced_by_token_value.as_deref(),
                    Some(values[i + 1].as_str())
                );
            }
        }
    }

    #[tokio::test]
    async fn replaying_a_rotated_token_revokes_everything_by_default() {
        let f = fixture(LedgerConfig::default());
        let user = UserId::new();
        let t0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        let t1 = f
            .ledger
            .rotate(&t0.token_value, AccessTokenId::new(), None)
            .await
            .unwrap();

        // Replay of the consumed token.
        assert_eq!(
            f.ledger.validate(&t0.token_value).await.unwrap(),
            Validation::ReuseDetected
        );

        // RevokeAll took the successor down too, so it now reports reuse as
        // well (revoked, not merely expired).
        assert_eq!(
            f.ledger.validate(&t1.token_value).await.unwrap(),
            Validation::ReuseDetected
        );
    }

    #[tokio::test]
    async fn revoke_chain_leaves_other_chains_alone() {
        let f = fixture(
            LedgerConfig::default().with_reuse_action(TokenReuseAction::RevokeChain),
        );
        let user = UserId::new();

        let a0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        let a1 = f
            .ledger
            .rotate(&a0.token_value, AccessTokenId::new(), None)
            .await
            .unwrap();
        let b0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();

        assert_eq!(
            f.ledger.validate(&a0.token_value).await.unwrap(),
            Validation::ReuseDetected
        );

        let now = f.clock.now();
        assert!(!stored(&f, &a1.token_value).await.is_active(now));
        assert!(stored(&f, &b0.token_value).await.is_active(now));
    }

    #[tokio::test]
    async fn log_only_takes_no_revocation_action() {
        let f = fixture(LedgerConfig::default().with_reuse_action(TokenReuseAction::LogOnly));
        let user = UserId::new();
        let t0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        let t1 = f
            .ledger
            .rotate(&t0.token_value, AccessTokenId::new(), None)
            .await
            .unwrap();

        assert_eq!(
            f.ledger.validate(&t0.token_value).await.unwrap(),
            Validation::ReuseDetected
        );
        assert!(stored(&f, &t1.token_value).await.is_active(f.clock.now()));
    }

    #[tokio::test]
    async fn grace_window_suppresses_classification_only() {
        let f = fixture(LedgerConfig::default().with_grace_period_minutes(5));
        let user = UserId::new();
        let t0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        let t1 = f
            .ledger
            .rotate(&t0.token_value, AccessTokenId::new(), None)
            .await
            .unwrap();

        // Inside the window the rotated-out token still validates and no
        // revocation reaction fires.
        assert_eq!(
            f.ledger.validate(&t0.token_value).await.unwrap(),
            Validation::Valid
        );
        assert!(stored(&f, &t1.token_value).await.is_active(f.clock.now()));

        // Past the window the same presentation is reuse.
        f.clock.advance(Duration::minutes(6));
        assert_eq!(
            f.ledger.validate(&t0.token_value).await.unwrap(),
            Validation::ReuseDetected
        );
        assert!(!stored(&f, &t1.token_value).await.is_active(f.clock.now()));
    }

    #[tokio::test]
    async fn grace_never_applies_to_outright_revocation() {
        let f = fixture(LedgerConfig::default().with_grace_period_minutes(5));
        let user = UserId::new();
        let t0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        f.ledger.revoke_all_for_user(user, None).await.unwrap();

        assert_eq!(
            f.ledger.validate(&t0.token_value).await.unwrap(),
            Validation::ReuseDetected
        );
    }

    #[tokio::test]
    async fn concurrent_rotations_yield_one_success_one_conflict() {
        let f = fixture(LedgerConfig::default());
        let user = UserId::new();
        let t0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();

        let (a, b) = tokio::join!(
            f.ledger.rotate(&t0.token_value, AccessTokenId::new(), None),
            f.ledger.rotate(&t0.token_value, AccessTokenId::new(), None),
        );

        let outcomes = [a, b];
        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::Conflict)))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);

        // The chain did not branch: the old token has exactly one successor,
        // which is the winner's token.
        let winner = outcomes
            .iter()
            .find_map(|r| r.as_ref().ok())
            .unwrap()
            .token_value
            .clone();
        assert_eq!(
            stored(&f, &t0.token_value).await.replaced_by_token_value,
            Some(winner)
        );
    }

    #[tokio::test]
    async fn rotating_a_revoked_token_is_refused() {
        let f = fixture(LedgerConfig::default());
        let user = UserId::new();
        let t0 = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        f.ledger.revoke_all_for_user(user, None).await.unwrap();

        let err = f
            .ledger
            .rotate(&t0.token_value, AccessTokenId::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotActive);
    }

    #[tokio::test]
    async fn sweep_revokes_only_inactive_tokens() {
        let f = fixture(
            LedgerConfig::default()
                .with_lifetime_days(365)
                .with_inactive_revocation_days(90),
        );
        let user = UserId::new();

        let idle = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();
        f.clock.advance(Duration::days(91));
        let fresh = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();

        let revoked = f.ledger.sweep_inactive().await.unwrap();
        assert_eq!(revoked, 1);

        let now = f.clock.now();
        assert!(!stored(&f, &idle.token_value).await.is_active(now));
        assert!(stored(&f, &fresh.token_value).await.is_active(now));
    }

    #[tokio::test]
    async fn validation_activity_keeps_a_token_out_of_the_sweep() {
        let f = fixture(LedgerConfig::default().with_lifetime_days(365));
        let user = UserId::new();
        let token = f.ledger.issue(user, AccessTokenId::new(), None).await.unwrap();

        f.clock.advance(Duration::days(60));
        assert_eq!(
            f.ledger.validate(&token.token_value).await.unwrap(),
            Validation::Valid
        );

        // 60 + 60 days since issue, but only 60 since last validation.
        f.clock.advance(Duration::days(60));
        assert_eq!(f.ledger.sweep_inactive().await.unwrap(), 0);
        assert!(stored(&f, &token.token_value).await.is_active(f.clock.now()));
    }

    #[tokio::test]
    async fn sweep_disabled_is_a_no_op() {
        let mut config = LedgerConfig::default();
        config.auto_revoke_inactive_tokens = false;
        let f = fixture(config);
        let token = f
            .ledger
            .issue(UserId::new(), AccessTokenId::new(), None)
            .await
            .unwrap();

        f.clock.advance(Duration::days(91));
        assert_eq!(f.ledger.sweep_inactive().await.unwrap(), 0);
        // Still expired naturally, just never revoked by the sweep.
        assert!(!stored(&f, &token.token_value).await.is_revoked);
    }
}
