//! Bearer-credential store with durable persistence and expiry-aware reads.
//!
//! Single source of truth for the current credential. Persists three keys
//! (token, expiry, profile JSON) as a unit and hydrates them together on
//! first read after a reload. Expired credentials are indistinguishable
//! from absent ones to callers.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::error::StoreError;
use crate::onboarding::Profile;
use crate::storage::KeyValueStorage;

/// Durable key holding the bearer value.
pub const TOKEN_KEY: &str = "session.token";
/// Durable key holding the expiry instant as integer milliseconds.
pub const EXPIRY_KEY: &str = "session.expiry";
/// Durable key holding the cached profile JSON.
pub const PROFILE_KEY: &str = "session.profile";

/// Time source, injectable so expiry boundaries are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
struct CredentialState {
    bearer: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    profile: Option<Profile>,
}

struct Inner {
    hydrated: bool,
    credential: Option<CredentialState>,
}

/// Holds the current credential, its expiry, and the cached profile.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    validity_window: ChronoDuration,
    inner: Mutex<Inner>,
}

impl TokenStore {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        validity_window: std::time::Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            validity_window: ChronoDuration::from_std(validity_window)
                .unwrap_or_else(|_| ChronoDuration::seconds(3600)),
            inner: Mutex::new(Inner {
                hydrated: false,
                credential: None,
            }),
        }
    }

    /// Store a new credential, replacing the previous one and its cached
    /// profile atomically. `None` clears everything: the explicit logout
    /// path.
    pub fn set_credential(
        &self,
        bearer: Option<&str>,
        profile: Option<Profile>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("token store poisoned");

        let Some(bearer) = bearer.map(str::trim).filter(|b| !b.is_empty()) else {
            self.clear_persisted()?;
            inner.hydrated = true;
            inner.credential = None;
            return Ok(());
        };

        let issued_at = self.clock.now();
        let expires_at = issued_at + self.validity_window;

        // Token, expiry, and profile are written together so a reload never
        // observes a partial credential.
        self.storage.set(TOKEN_KEY, bearer)?;
        self.storage
            .set(EXPIRY_KEY, &expires_at.timestamp_millis().to_string())?;
        match &profile {
            Some(profile) => {
                self.storage
                    .set(PROFILE_KEY, &serde_json::to_string(profile)?)?;
            }
            None => self.storage.remove(PROFILE_KEY)?,
        }

        inner.hydrated = true;
        inner.credential = Some(CredentialState {
            bearer: SecretString::from(bearer.to_string()),
            issued_at,
            expires_at,
            profile,
        });
        Ok(())
    }

    /// Replace only the cached profile, re-persisting it together with the
    /// unchanged credential.
    pub fn update_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("token store poisoned");
        self.hydrate_locked(&mut inner);
        self.expire_locked(&mut inner);

        let Some(credential) = inner.credential.as_mut() else {
            return Ok(());
        };

        self.storage
            .set(TOKEN_KEY, credential.bearer.expose_secret())?;
        self.storage.set(
            EXPIRY_KEY,
            &credential.expires_at.timestamp_millis().to_string(),
        )?;
        self.storage
            .set(PROFILE_KEY, &serde_json::to_string(profile)?)?;
        credential.profile = Some(profile.clone());
        Ok(())
    }

    /// The current bearer value, hydrating from durable storage when memory
    /// is empty. Expired credentials are cleared and reported as absent.
    pub fn credential(&self) -> Option<SecretString> {
        let mut inner = self.inner.lock().expect("token store poisoned");
        self.hydrate_locked(&mut inner);
        self.expire_locked(&mut inner);
        inner.credential.as_ref().map(|c| c.bearer.clone())
    }

    /// The cached profile, hydrated together with the credential.
    pub fn cached_profile(&self) -> Option<Profile> {
        let mut inner = self.inner.lock().expect("token store poisoned");
        self.hydrate_locked(&mut inner);
        self.expire_locked(&mut inner);
        inner.credential.as_ref().and_then(|c| c.profile.clone())
    }

    /// Whole seconds until expiry; 0 when absent or already expired.
    pub fn remaining_validity_secs(&self) -> u64 {
        let mut inner = self.inner.lock().expect("token store poisoned");
        self.hydrate_locked(&mut inner);
        let Some(credential) = inner.credential.as_ref() else {
            return 0;
        };
        let remaining_ms = (credential.expires_at - self.clock.now()).num_milliseconds();
        if remaining_ms <= 0 {
            0
        } else {
            (remaining_ms / 1000) as u64
        }
    }

    /// True when no credential is held or the expiry instant has been
    /// reached (the boundary itself counts as expired).
    pub fn is_expired(&self) -> bool {
        let mut inner = self.inner.lock().expect("token store poisoned");
        self.hydrate_locked(&mut inner);
        match inner.credential.as_ref() {
            Some(credential) => self.clock.now() >= credential.expires_at,
            None => true,
        }
    }

    fn hydrate_locked(&self, inner: &mut Inner) {
        if inner.hydrated {
            return;
        }
        inner.hydrated = true;
        inner.credential = self.read_persisted();
    }

    /// Reads the three durable keys. A missing or corrupt profile entry
    /// discards only the profile; a missing token or unusable expiry means
    /// no credential.
    fn read_persisted(&self) -> Option<CredentialState> {
        let bearer = match self.storage.get(TOKEN_KEY) {
            Ok(Some(value)) if !value.trim().is_empty() => value.trim().to_string(),
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!("Failed to read persisted token: {e}");
                return None;
            }
        };

        let expires_at = self
            .storage
            .get(EXPIRY_KEY)
            .ok()
            .flatten()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        let Some(expires_at) = expires_at else {
            tracing::warn!("Persisted expiry missing or corrupt; discarding credential");
            let _ = self.clear_persisted();
            return None;
        };

        let profile = self
            .storage
            .get(PROFILE_KEY)
            .ok()
            .flatten()
            .and_then(|raw| match serde_json::from_str::<Profile>(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::warn!("Persisted profile is corrupt, discarding it: {e}");
                    None
                }
            });

        Some(CredentialState {
            bearer: SecretString::from(bearer),
            issued_at: expires_at - self.validity_window,
            expires_at,
            profile,
        })
    }

    fn expire_locked(&self, inner: &mut Inner) {
        let expired = inner
            .credential
            .as_ref()
            .is_some_and(|c| self.clock.now() >= c.expires_at);
        if expired {
            inner.credential = None;
            if let Err(e) = self.clear_persisted() {
                tracing::warn!("Failed to clear expired credential: {e}");
            }
        }
    }

    /// Remove all three keys, even if some are already absent.
    fn clear_persisted(&self) -> Result<(), StoreError> {
        let results = [
            self.storage.remove(TOKEN_KEY),
            self.storage.remove(EXPIRY_KEY),
            self.storage.remove(PROFILE_KEY),
        ];
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Instant the current credential was issued, if one is held.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        let mut inner = self.inner.lock().expect("token store poisoned");
        self.hydrate_locked(&mut inner);
        self.expire_locked(&mut inner);
        inner.credential.as_ref().map(|c| c.issued_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::KycStatus;
    use crate::storage::MemoryStorage;
    use crate::testutil::{ManualClock, test_epoch};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn profile() -> Profile {
        Profile {
            id: "usr_1".to_string(),
            kyc_status: KycStatus::Pending,
            is_phone_validated: false,
            terms_accepted: true,
            is_source_of_funds_answered: false,
            safe_address: None,
            safe_configured: false,
            has_card: false,
        }
    }

    fn start() -> DateTime<Utc> {
        test_epoch()
    }

    fn store_with_clock(
        storage: Arc<MemoryStorage>,
        clock: Arc<ManualClock>,
    ) -> TokenStore {
        TokenStore::new(storage, clock, Duration::from_secs(3600))
    }

    #[test]
    fn set_and_get_round_trip() {
        let clock = ManualClock::new(start());
        let store = store_with_clock(Arc::new(MemoryStorage::new()), clock);

        store.set_credential(Some("abc"), Some(profile())).unwrap();
        assert_eq!(store.credential().unwrap().expose_secret(), "abc");
        assert_eq!(store.cached_profile().unwrap(), profile());
        assert_eq!(store.remaining_validity_secs(), 3600);
        assert!(!store.is_expired());
    }

    #[test]
    fn reload_round_trip_preserves_token_and_profile() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(start());

        let store = store_with_clock(storage.clone(), clock.clone());
        store.set_credential(Some("abc"), Some(profile())).unwrap();

        // Simulated reload: fresh memory, same durable storage.
        let reloaded = store_with_clock(storage, clock);
        assert_eq!(reloaded.credential().unwrap().expose_secret(), "abc");
        assert_eq!(reloaded.cached_profile().unwrap(), profile());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let clock = ManualClock::new(start());
        let store = store_with_clock(Arc::new(MemoryStorage::new()), clock.clone());
        store.set_credential(Some("abc"), None).unwrap();

        clock.advance(Duration::from_secs(3600));
        assert!(store.is_expired());
        assert!(store.credential().is_none());
        assert_eq!(store.remaining_validity_secs(), 0);
    }

    #[test]
    fn expired_credential_is_cleared_from_durable_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(start());
        let store = store_with_clock(storage.clone(), clock.clone());
        store.set_credential(Some("abc"), Some(profile())).unwrap();

        clock.advance(Duration::from_secs(3601));
        assert!(store.credential().is_none());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EXPIRY_KEY).unwrap(), None);
        assert_eq!(storage.get(PROFILE_KEY).unwrap(), None);
    }

    #[test]
    fn clearing_removes_all_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(start());
        let store = store_with_clock(storage.clone(), clock);
        store.set_credential(Some("abc"), Some(profile())).unwrap();

        store.set_credential(None, None).unwrap();
        assert!(store.credential().is_none());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(EXPIRY_KEY).unwrap(), None);
        assert_eq!(storage.get(PROFILE_KEY).unwrap(), None);
    }

    #[test]
    fn setting_same_value_twice_does_not_shift_expiry() {
        let clock = ManualClock::new(start());
        let store = store_with_clock(Arc::new(MemoryStorage::new()), clock);

        store.set_credential(Some("abc"), None).unwrap();
        let first = store.remaining_validity_secs();
        store.set_credential(Some("abc"), None).unwrap();
        assert_eq!(store.remaining_validity_secs(), first);
    }

    #[test]
    fn corrupt_profile_discards_only_the_profile() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(start());
        {
            let store = store_with_clock(storage.clone(), clock.clone());
            store.set_credential(Some("abc"), Some(profile())).unwrap();
        }
        storage.set(PROFILE_KEY, "{not json").unwrap();

        let store = store_with_clock(storage, clock);
        assert_eq!(store.credential().unwrap().expose_secret(), "abc");
        assert!(store.cached_profile().is_none());
    }

    #[test]
    fn corrupt_expiry_discards_the_credential() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(start());
        storage.set(TOKEN_KEY, "abc").unwrap();
        storage.set(EXPIRY_KEY, "not-a-number").unwrap();

        let store = store_with_clock(storage.clone(), clock);
        assert!(store.credential().is_none());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn new_credential_replaces_profile_cache() {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(start());
        let store = store_with_clock(storage.clone(), clock);
        store.set_credential(Some("abc"), Some(profile())).unwrap();

        // Second credential without a profile must not keep the old cache.
        store.set_credential(Some("def"), None).unwrap();
        assert!(store.cached_profile().is_none());
        assert_eq!(storage.get(PROFILE_KEY).unwrap(), None);
    }

    #[test]
    fn update_profile_keeps_the_credential() {
        let clock = ManualClock::new(start());
        let store = store_with_clock(Arc::new(MemoryStorage::new()), clock.clone());
        store.set_credential(Some("abc"), None).unwrap();

        clock.advance(Duration::from_secs(600));
        let mut refreshed = profile();
        refreshed.kyc_status = KycStatus::Approved;
        store.update_profile(&refreshed).unwrap();

        assert_eq!(store.credential().unwrap().expose_secret(), "abc");
        assert_eq!(store.cached_profile().unwrap(), refreshed);
        assert_eq!(store.remaining_validity_secs(), 3000);
    }

    #[test]
    fn remaining_validity_floors_to_whole_seconds() {
        let clock = ManualClock::new(start());
        let store = store_with_clock(Arc::new(MemoryStorage::new()), clock.clone());
        store.set_credential(Some("abc"), None).unwrap();

        clock.advance(Duration::from_millis(500));
        assert_eq!(store.remaining_validity_secs(), 3599);
    }
}
