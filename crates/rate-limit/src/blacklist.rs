//! TTL'd key quarantine (spec.md §4.5).

use std::time::Duration;

use config::BlacklistConfig;
use jiff::{Timestamp, ToSpan};
use mini_moka::sync::Cache;

use crate::error::StorageError;

/// Why a key was quarantined (spec.md §3: "Blacklist entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistReason {
    /// The key's requests-per-day quota is exhausted.
    RpdExceeded,
    /// The key's tokens-per-day quota is exhausted.
    TpdExceeded,
    /// A generic rate-limit response was observed for the key.
    RateLimited,
    /// The key failed authentication against upstream.
    AuthFailed,
}

impl BlacklistReason {
    /// The wire/log string for this reason (spec.md §3).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RpdExceeded => "rpd_exceeded",
            Self::TpdExceeded => "tpd_exceeded",
            Self::RateLimited => "rate_limited",
            Self::AuthFailed => "auth_failed",
        }
    }

    /// Classify upstream error text into a blacklist reason
    /// (spec.md §4.4: "reason inferred from the error text").
    pub fn classify(status: u16, body: &str) -> Option<Self> {
        let lowercase = body.to_lowercase();

        if status == 401 || status == 403 {
            return Some(Self::AuthFailed);
        }

        if status == 429 {
            if lowercase.contains("daily") || lowercase.contains("quota") {
                return Some(Self::RpdExceeded);
            }
            if lowercase.contains("token") {
                return Some(Self::TpdExceeded);
            }
            return Some(Self::RateLimited);
        }

        None
    }
}

/// A live quarantine entry.
#[derive(Debug, Clone)]
pub struct BlacklistEntry {
    /// The classified reason.
    pub reason: BlacklistReason,
    /// When the key was quarantined.
    pub created_at: Timestamp,
    /// When the quarantine lifts.
    pub expires_at: Timestamp,
}

impl BlacklistEntry {
    fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

/// Storage contract for the blacklist (spec.md §4.5).
///
/// The concrete key-value store (with native TTL) is an external
/// collaborator (spec.md §1); [`InMemoryBlacklistStore`] is the
/// in-process reference implementation.
pub trait BlacklistStore: Send + Sync {
    /// Fetch a key's entry, if it exists and hasn't expired.
    fn get(&self, key_hash: &str, now: Timestamp) -> Result<Option<BlacklistEntry>, StorageError>;

    /// Insert or replace a key's entry.
    fn put(&self, key_hash: &str, entry: BlacklistEntry) -> Result<(), StorageError>;

    /// Remove a key's entry (spec.md §8 scenario 5: a key that
    /// successfully served a request after quarantine may be released).
    fn remove(&self, key_hash: &str) -> Result<(), StorageError>;
}

/// In-memory [`BlacklistStore`] backed by a `mini_moka` cache.
///
/// The cache's own bound gives a native upper TTL as a memory safety net;
/// [`BlacklistEntry::expires_at`] is authoritative for visibility, checked
/// on every read, so a variable per-reason TTL (spec.md §4.5: daily vs.
/// minutes vs. hours) is honored exactly rather than approximated by the
/// cache's single idle timeout.
pub struct InMemoryBlacklistStore {
    cache: Cache<String, BlacklistEntry>,
}

impl InMemoryBlacklistStore {
    /// Create a store whose cache entries are swept out no later than
    /// `max_ttl` after insertion, regardless of their logical `expires_at`.
    pub fn new(max_ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(max_ttl).build();

        Self { cache }
    }
}

impl BlacklistStore for InMemoryBlacklistStore {
    fn get(&self, key_hash: &str, now: Timestamp) -> Result<Option<BlacklistEntry>, StorageError> {
        let _span = fastrace::Span::enter_with_local_parent("rate_limit:blacklist:get");

        Ok(self.cache.get(key_hash).filter(|entry| entry.is_live(now)))
    }

    fn put(&self, key_hash: &str, entry: BlacklistEntry) -> Result<(), StorageError> {
        let _span = fastrace::Span::enter_with_local_parent("rate_limit:blacklist:put");

        self.cache.insert(key_hash.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key_hash: &str) -> Result<(), StorageError> {
        let _span = fastrace::Span::enter_with_local_parent("rate_limit:blacklist:remove");

        self.cache.invalidate(key_hash);
        Ok(())
    }
}

/// Quarantine operations atop a [`BlacklistStore`] (spec.md §4.5).
pub struct BlacklistManager<S> {
    store: S,
    config: BlacklistConfig,
}

impl<S: BlacklistStore> BlacklistManager<S> {
    /// Build a manager over `store`, using `config`'s per-reason TTLs.
    pub fn new(store: S, config: BlacklistConfig) -> Self {
        Self { store, config }
    }

    /// Whether `key_hash` is currently quarantined.
    pub fn is_blacklisted(&self, key_hash: &str, now: Timestamp) -> bool {
        match self.store.get(key_hash, now) {
            Ok(entry) => entry.is_some(),
            Err(err) => {
                log::warn!("blacklist read failed, failing open: {err}");
                false
            }
        }
    }

    /// Split `candidates` into `(not_blacklisted, blacklisted)`, the
    /// latter carrying each key's live entry (spec.md §4.4 step 1).
    pub fn filter<'a>(
        &self,
        candidates: &'a [(String, Timestamp)],
        now: Timestamp,
    ) -> (Vec<&'a str>, Vec<(&'a str, BlacklistEntry)>) {
        let mut clear = Vec::new();
        let mut blocked = Vec::new();

        for (hash, _) in candidates {
            match self.store.get(hash, now) {
                Ok(Some(entry)) => blocked.push((hash.as_str(), entry)),
                Ok(None) => clear.push(hash.as_str()),
                Err(err) => {
                    log::warn!("blacklist read failed for {hash}, failing open: {err}");
                    clear.push(hash.as_str());
                }
            }
        }

        (clear, blocked)
    }

    /// Quarantine `key_hash` for `reason`, computing `expires_at` from the
    /// configured TTL table (spec.md §4.5, §8: daily-quota TTLs are
    /// strictly ≥ now + 60s).
    pub fn add(&self, key_hash: &str, reason: BlacklistReason, now: Timestamp) {
        let expires_at = self.expiry_for(reason, now);

        let entry = BlacklistEntry {
            reason,
            created_at: now,
            expires_at,
        };

        if let Err(err) = self.store.put(key_hash, entry) {
            log::warn!("failed to persist blacklist entry for {key_hash}: {err}");
        }
    }

    /// Release a key early, e.g. after it serves a request successfully
    /// post-quarantine (spec.md §8 scenario 5).
    pub fn release(&self, key_hash: &str) {
        if let Err(err) = self.store.remove(key_hash) {
            log::warn!("failed to release blacklist entry for {key_hash}: {err}");
        }
    }

    /// Fetch the live entry for `key_hash`, if any.
    pub fn get(&self, key_hash: &str, now: Timestamp) -> Option<BlacklistEntry> {
        self.store.get(key_hash, now).unwrap_or_else(|err| {
            log::warn!("blacklist read failed for {key_hash}, failing open: {err}");
            None
        })
    }

    fn expiry_for(&self, reason: BlacklistReason, now: Timestamp) -> Timestamp {
        match reason {
            BlacklistReason::RpdExceeded | BlacklistReason::TpdExceeded => {
                let next_midnight = next_utc_midnight(now);
                let floor = now + i64::try_from(self.config.min_daily_secs).unwrap_or(60).seconds();
                next_midnight.max(floor)
            }
            BlacklistReason::RateLimited => now + i64::try_from(self.config.rate_limited_secs).unwrap_or(60).seconds(),
            BlacklistReason::AuthFailed => now + i64::try_from(self.config.auth_failed_secs).unwrap_or(3600).seconds(),
        }
    }
}

fn next_utc_midnight(now: Timestamp) -> Timestamp {
    let zoned = now.to_zoned(jiff::tz::TimeZone::UTC);
    let next_day = zoned.date().tomorrow().expect("date arithmetic in range");
    next_day
        .to_zoned(jiff::tz::TimeZone::UTC)
        .expect("midnight is always a valid UTC instant")
        .timestamp()
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::*;

    fn manager() -> BlacklistManager<InMemoryBlacklistStore> {
        let store = InMemoryBlacklistStore::new(StdDuration::from_secs(7 * 86_400));
        BlacklistManager::new(store, BlacklistConfig::default())
    }

    #[test]
    fn classify_daily_quota() {
        assert_eq!(
            BlacklistReason::classify(429, "daily quota exceeded"),
            Some(BlacklistReason::RpdExceeded)
        );
    }

    #[test]
    fn classify_token_quota() {
        assert_eq!(
            BlacklistReason::classify(429, "token limit exceeded for this model"),
            Some(BlacklistReason::TpdExceeded)
        );
    }

    #[test]
    fn classify_generic_rate_limit() {
        assert_eq!(BlacklistReason::classify(429, "too many requests"), Some(BlacklistReason::RateLimited));
    }

    #[test]
    fn classify_auth() {
        assert_eq!(BlacklistReason::classify(401, "invalid key"), Some(BlacklistReason::AuthFailed));
        assert_eq!(BlacklistReason::classify(403, "forbidden"), Some(BlacklistReason::AuthFailed));
    }

    #[test]
    fn classify_non_error_is_none() {
        assert_eq!(BlacklistReason::classify(200, "ok"), None);
    }

    #[test]
    fn entry_expires() {
        let manager = manager();
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        manager.add("hash-a", BlacklistReason::RateLimited, now);
        assert!(manager.is_blacklisted("hash-a", now));

        let later = now + i64::try_from(manager.config.rate_limited_secs).unwrap().seconds() + 1.second();
        assert!(!manager.is_blacklisted("hash-a", later));
    }

    #[test]
    fn daily_ttl_is_at_least_sixty_seconds_out() {
        let manager = manager();
        // One second before UTC midnight: next_utc_midnight would be only
        // 1s away, which must be floored up to `min_daily_secs`.
        let almost_midnight = Timestamp::from_second(1_700_000_000).unwrap();
        let zoned = almost_midnight.to_zoned(jiff::tz::TimeZone::UTC);
        let next_midnight = zoned
            .date()
            .tomorrow()
            .unwrap()
            .to_zoned(jiff::tz::TimeZone::UTC)
            .unwrap()
            .timestamp();
        let now = next_midnight - 1.second();

        let expires_at = manager.expiry_for(BlacklistReason::RpdExceeded, now);
        assert!(expires_at >= now + StdDuration::from_secs(60).try_into().unwrap());
    }

    #[test]
    fn auth_failed_outlasts_rate_limited() {
        let manager = manager();
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        let auth_expiry = manager.expiry_for(BlacklistReason::AuthFailed, now);
        let rate_limit_expiry = manager.expiry_for(BlacklistReason::RateLimited, now);

        assert!(auth_expiry > rate_limit_expiry);
    }

    #[test]
    fn release_clears_entry() {
        let manager = manager();
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        manager.add("hash-a", BlacklistReason::AuthFailed, now);
        assert!(manager.is_blacklisted("hash-a", now));

        manager.release("hash-a");
        assert!(!manager.is_blacklisted("hash-a", now));
    }
}
