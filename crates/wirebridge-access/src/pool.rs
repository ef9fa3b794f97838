// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend credential pool.
//!
//! Usage counters reset once per calendar date, where the date is taken in a
//! fixed reference UTC offset rather than the host's local zone. Selection
//! favours the least-used eligible credential and spreads ties randomly.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};
use wirebridge_config::model::PoolConfig;
use wirebridge_core::{
    BackendCredential, CredentialStore, StatsPeriod, WirebridgeError, format_timestamp,
};

use crate::token;

/// Default daily quota for new credentials.
pub const DEFAULT_DAILY_QUOTA: i64 = 500;

pub struct CredentialPool<S: ?Sized> {
    store: Arc<S>,
    reset_offset: FixedOffset,
}

impl<S: CredentialStore + ?Sized> CredentialPool<S> {
    pub fn new(store: Arc<S>, reset_offset: FixedOffset) -> Self {
        Self {
            store,
            reset_offset,
        }
    }

    pub fn from_config(store: Arc<S>, config: &PoolConfig) -> Self {
        let offset = FixedOffset::east_opt(config.reset_utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!(
                minutes = config.reset_utc_offset_minutes,
                "invalid pool reset offset, using UTC"
            );
            Utc.fix()
        });
        Self::new(store, offset)
    }

    /// Calendar date at `now` in the reset offset.
    pub fn today_at(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.reset_offset).date_naive()
    }

    /// Earliest instant covered by a reporting period. `Today` starts at
    /// midnight in the reset offset.
    pub fn period_start(&self, period: StatsPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
        match period {
            StatsPeriod::Today => self
                .today_at(now)
                .and_hms_opt(0, 0, 0)
                .and_then(|midnight| midnight.and_local_timezone(self.reset_offset).single())
                .map(|start| start.to_utc())
                .unwrap_or(now),
            StatsPeriod::Week => now - chrono::Duration::days(7),
            StatsPeriod::Month => now - chrono::Duration::days(30),
        }
    }

    pub async fn select_best_credential(
        &self,
    ) -> Result<Option<BackendCredential>, WirebridgeError> {
        self.select_best_credential_at(Utc::now()).await
    }

    /// Reset stale counters, then pick the least-used eligible credential.
    pub async fn select_best_credential_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<BackendCredential>, WirebridgeError> {
        let today = self.today_at(now);
        let reset = self.store.reset_daily_usage(today).await?;
        if reset > 0 {
            info!(count = reset, %today, "reset daily credential usage");
        }

        let eligible: Vec<BackendCredential> = self
            .store
            .list_credentials()
            .await?
            .into_iter()
            .filter(|c| is_eligible(c, now))
            .collect();

        let Some(min_used) = eligible.iter().map(|c| c.used_count).min() else {
            warn!("no eligible backend credential");
            return Ok(None);
        };
        let least_used: Vec<&BackendCredential> =
            eligible.iter().filter(|c| c.used_count == min_used).collect();
        let chosen = least_used
            .choose(&mut rand::thread_rng())
            .map(|c| (*c).clone());
        if let Some(c) = &chosen {
            debug!(credential_id = %c.id, used = c.used_count, quota = c.daily_quota, "selected credential");
        }
        Ok(chosen)
    }

    pub async fn increment_usage(&self, id: &str) -> Result<(), WirebridgeError> {
        self.store.increment_credential_usage(id).await
    }
}

/// Active, under quota, and not carrying a past expiry claim.
pub fn is_eligible(credential: &BackendCredential, now: DateTime<Utc>) -> bool {
    credential.active
        && credential.used_count < credential.daily_quota
        && !token::is_expired_at(&credential.token, now)
}

/// A fresh, active credential record with a random id.
pub fn new_credential(label: &str, token: &str, daily_quota: Option<i64>) -> BackendCredential {
    let now = format_timestamp(Utc::now());
    BackendCredential {
        id: uuid::Uuid::new_v4().to_string(),
        label: label.to_string(),
        token: token.to_string(),
        daily_quota: daily_quota.unwrap_or(DEFAULT_DAILY_QUOTA),
        used_count: 0,
        active: true,
        last_reset_date: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::fake_jwt;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashSet;
    use wirebridge_test_utils::MemoryStore;

    fn cred(id: &str, used: i64, quota: i64) -> BackendCredential {
        let mut c = new_credential(id, &format!("tok-{id}"), Some(quota));
        c.id = id.to_string();
        c.used_count = used;
        c
    }

    fn utc8() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    async fn seeded(creds: Vec<BackendCredential>, now: DateTime<Utc>) -> CredentialPool<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let pool = CredentialPool::new(store.clone(), utc8());
        // Mark every seeded credential as already reset today so counts stick.
        let today = pool.today_at(now);
        for mut c in creds {
            c.last_reset_date = Some(today);
            store.insert_credential(&c).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn picks_least_used_eligible() {
        let now = Utc::now();
        let mut off = cred("off", 0, 10);
        off.active = false;
        let full = cred("full", 10, 10);
        let mut expired = cred("expired", 0, 10);
        expired.token = fake_jwt(&json!({"exp": now.timestamp() - 60}));
        let pool = seeded(
            vec![off, full, expired, cred("busy", 7, 10), cred("idle", 2, 10)],
            now,
        )
        .await;

        let chosen = pool.select_best_credential_at(now).await.unwrap().unwrap();
        assert_eq!(chosen.id, "idle");
    }

    #[tokio::test]
    async fn unexpired_jwt_stays_eligible() {
        let now = Utc::now();
        let mut c = cred("jwt", 0, 10);
        c.token = fake_jwt(&json!({"exp": now.timestamp() + 3600}));
        let pool = seeded(vec![c], now).await;
        assert!(pool.select_best_credential_at(now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn exhausted_pool_yields_none() {
        let now = Utc::now();
        let pool = seeded(vec![cred("a", 5, 5), cred("b", 9, 5)], now).await;
        assert!(pool.select_best_credential_at(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ties_are_spread() {
        let now = Utc::now();
        let pool = seeded(vec![cred("a", 1, 10), cred("b", 1, 10), cred("c", 4, 10)], now).await;
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let c = pool.select_best_credential_at(now).await.unwrap().unwrap();
            seen.insert(c.id);
        }
        assert_eq!(seen, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn period_start_follows_reference_day() {
        let pool = CredentialPool::new(Arc::new(MemoryStore::new()), utc8());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 17, 0, 0).unwrap();
        assert_eq!(
            pool.period_start(StatsPeriod::Today, now),
            Utc.with_ymd_and_hms(2026, 3, 1, 16, 0, 0).unwrap()
        );
        assert_eq!(
            pool.period_start(StatsPeriod::Week, now),
            Utc.with_ymd_and_hms(2026, 2, 22, 17, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn daily_reset_uses_reference_offset() {
        // 2026-03-01 15:30 UTC is already 2026-03-01 23:30 at +08:00;
        // 16:30 UTC is 2026-03-02 00:30 there.
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 16, 30, 0).unwrap();

        let pool = seeded(vec![cred("a", 10, 10)], before).await;
        assert!(pool.select_best_credential_at(before).await.unwrap().is_none());

        let chosen = pool.select_best_credential_at(after).await.unwrap().unwrap();
        assert_eq!(chosen.used_count, 0);
        assert_eq!(
            chosen.last_reset_date,
            Some(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
        );

        pool.increment_usage("a").await.unwrap();
        let again = pool.select_best_credential_at(after).await.unwrap().unwrap();
        assert_eq!(again.used_count, 1, "second call on the same date must not reset");
    }
}
