//! Striped async locks
//!
//! Serializes multi-step read-modify-write sequences per key without one
//! global lock. Used by the settler to order position updates within a
//! (portfolio, symbol) pair while distinct pairs settle concurrently.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of lazily created per-key mutexes.
pub struct StripeLock<K> {
    stripes: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> StripeLock<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            stripes: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the stripe for `key`, waiting if another task holds it.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let stripe = {
            let mut stripes = self.stripes.lock().unwrap_or_else(PoisonError::into_inner);
            stripes
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        stripe.lock_owned().await
    }
}

impl<K> Default for StripeLock<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
