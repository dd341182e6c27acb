//! Per-identity session tokens with de-duplicated refresh.
//!
//! Each uid owns a slot guarded by its own mutex. Whoever finds the slot
//! empty performs the credential exchange while holding that mutex, so
//! concurrent callers for the same uid wait for its result instead of
//! issuing their own exchange. Callers for other uids are not blocked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// A session token and the generation it was issued in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub generation: u64,
}

#[derive(Default)]
struct Slot {
    role_id: String,
    session: Option<Session>,
}

/// Session tokens keyed by uid. Held in memory only.
#[derive(Default)]
pub struct SessionCache {
    slots: RwLock<HashMap<u32, Arc<Mutex<Slot>>>>,
    generation: AtomicU64,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, uid: u32) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&uid)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(uid).or_default())
    }

    /// The cached session for `uid`, or a fresh one from `login`.
    ///
    /// A session issued for a different role id is not reused. Failed
    /// exchanges are not cached.
    pub fn session<E>(
        &self,
        uid: u32,
        role_id: &str,
        login: impl FnOnce() -> Result<String, E>,
    ) -> Result<Session, E> {
        let slot = self.slot(uid);
        let mut slot = lock(&slot);

        if let Some(session) = &slot.session {
            if slot.role_id == role_id {
                return Ok(session.clone());
            }
        }

        tracing::debug!(uid, "exchanging role id for a session token");
        let token = login()?;
        let session = Session {
            token,
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        };
        slot.role_id = role_id.to_string();
        slot.session = Some(session.clone());
        Ok(session)
    }

    /// Drop the session of `uid` if it is still the one from `generation`.
    ///
    /// A newer session installed by a concurrent refresh is kept.
    pub fn invalidate(&self, uid: u32, generation: u64) {
        let slot = self.slot(uid);
        let mut slot = lock(&slot);
        if slot
            .session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
        {
            tracing::debug!(uid, generation, "dropping rejected session token");
            slot.session = None;
        }
    }

    /// Number of identities currently holding a session.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| lock(slot).session.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn counting_login(counter: &AtomicUsize, token: &str) -> Result<String, ()> {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(token.to_string())
    }

    #[test]
    fn caches_per_uid() {
        let cache = SessionCache::new();
        let logins = AtomicUsize::new(0);

        let a = cache.session(1000, "role-a", || counting_login(&logins, "t1")).unwrap();
        let b = cache.session(1000, "role-a", || counting_login(&logins, "t2")).unwrap();
        assert_eq!(a, b);
        assert_eq!(logins.load(Ordering::SeqCst), 1);

        let c = cache.session(1001, "role-b", || counting_login(&logins, "t3")).unwrap();
        assert_eq!(c.token, "t3");
        assert_eq!(logins.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn changed_role_id_forces_exchange() {
        let cache = SessionCache::new();
        let logins = AtomicUsize::new(0);

        cache.session(1000, "old", || counting_login(&logins, "t1")).unwrap();
        let s = cache.session(1000, "new", || counting_login(&logins, "t2")).unwrap();
        assert_eq!(s.token, "t2");
        assert_eq!(logins.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_login_is_not_cached() {
        let cache = SessionCache::new();
        let err = cache.session(1000, "role", || Err::<String, _>("denied"));
        assert_eq!(err.unwrap_err(), "denied");
        assert!(cache.is_empty());

        let s = cache
            .session(1000, "role", || Ok::<_, ()>("t".to_string()))
            .unwrap();
        assert_eq!(s.token, "t");
    }

    #[test]
    fn invalidate_checks_generation() {
        let cache = SessionCache::new();
        let logins = AtomicUsize::new(0);

        let old = cache.session(1000, "r", || counting_login(&logins, "t1")).unwrap();
        cache.invalidate(1000, old.generation);
        let new = cache.session(1000, "r", || counting_login(&logins, "t2")).unwrap();
        assert_ne!(old.generation, new.generation);

        // A late invalidation of the old token keeps the new one.
        cache.invalidate(1000, old.generation);
        let again = cache.session(1000, "r", || counting_login(&logins, "t3")).unwrap();
        assert_eq!(again, new);
        assert_eq!(logins.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_refresh_exchanges_once() {
        const CALLERS: usize = 16;

        let cache = Arc::new(SessionCache::new());
        let logins = Arc::new(AtomicUsize::new(0));

        let stale = cache.session(1000, "r", || counting_login(&logins, "stale")).unwrap();
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let logins = Arc::clone(&logins);
                let barrier = Arc::clone(&barrier);
                let stale = stale.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.invalidate(1000, stale.generation);
                    cache
                        .session(1000, "r", || counting_login(&logins, "fresh"))
                        .unwrap()
                })
            })
            .collect();

        let sessions: Vec<Session> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(logins.load(Ordering::SeqCst), 2);
        assert!(sessions.iter().all(|s| s.token == "fresh"));
        assert!(sessions.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn other_identities_do_not_wait() {
        let cache = Arc::new(SessionCache::new());
        let slow = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache
                    .session(1000, "r", || {
                        thread::sleep(Duration::from_millis(300));
                        Ok::<_, ()>("slow".to_string())
                    })
                    .unwrap()
            })
        };

        thread::sleep(Duration::from_millis(50));
        let started = std::time::Instant::now();
        cache
            .session(1001, "r", || Ok::<_, ()>("fast".to_string()))
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));

        assert_eq!(slow.join().unwrap().token, "slow");
    }
}
