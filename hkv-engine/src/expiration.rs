//! # Expiration Timers
//!
//! Purpose: Actively delete a key once its TTL elapses, instead of relying
//! solely on the next lazy read to notice. Each live deadline gets its own
//! `tokio::spawn` task sleeping until that instant; installing a new
//! deadline on the same key aborts the previous task first.
//!
//! The race this module exists to close: a task scheduled for deadline D1
//! must not delete a key whose deadline was since moved to D2 (via another
//! `EXPIRE`) or cleared (via `PERSIST`). `Keyspace::delete_if_deadline_is`
//! re-checks the live deadline immediately before deleting, so a superseded
//! task is a no-op even if it isn't aborted in time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::keyspace::{now_epoch, Keyspace};

/// Tracks the in-flight deletion task for each key with a live deadline.
pub struct ExpirationTimers {
    keyspace: Arc<Keyspace>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ExpirationTimers {
    pub fn new(keyspace: Arc<Keyspace>) -> Self {
        ExpirationTimers {
            keyspace,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Installs (or replaces) the deletion task for `key` at `deadline`
    /// (Unix-epoch seconds). Called after `Keyspace::set_expire` succeeds.
    pub fn install(&self, key: &str, deadline: i64) {
        self.cancel(key);

        let wait = Duration::from_secs((deadline - now_epoch()).max(0) as u64);
        let fire_at = Instant::now() + wait;
        let keyspace = Arc::clone(&self.keyspace);
        let key_owned = key.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(fire_at).await;
            keyspace.delete_if_deadline_is(&key_owned, deadline);
        });

        self.tasks.lock().insert(key.to_string(), handle);
    }

    /// Cancels any pending deletion task for `key`. Called after
    /// `Keyspace::persist` succeeds, and before re-`install`ing on the same
    /// key so the old task never races the new deadline.
    pub fn cancel(&self, key: &str) {
        if let Some(handle) = self.tasks.lock().remove(key) {
            handle.abort();
        }
    }

    /// Re-installs timers for every key the keyspace already holds a
    /// deadline for. Called once at startup after a snapshot restore, since
    /// a freshly rebuilt `Keyspace` has deadlines recorded in its entries
    /// but no scheduled tasks behind them yet.
    pub fn rehydrate(&self, keys_with_deadlines: Vec<(String, i64)>) {
        for (key, deadline) in keys_with_deadlines {
            self.install(&key, deadline);
        }
    }
}

impl Drop for ExpirationTimers {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.lock().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_key_is_deleted_by_its_task() {
        let keyspace = Arc::new(Keyspace::new());
        keyspace.set_string("k".into(), "v".into(), None);
        keyspace.set_expire("k", 0);
        let timers = ExpirationTimers::new(Arc::clone(&keyspace));
        let deadline = keyspace.current_deadline("k").unwrap();
        timers.install("k", deadline);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(keyspace.type_of("k"), "none");
    }

    #[tokio::test]
    async fn persist_cancels_the_pending_task() {
        let keyspace = Arc::new(Keyspace::new());
        keyspace.set_string("k".into(), "v".into(), None);
        keyspace.set_expire("k", 0);
        let timers = ExpirationTimers::new(Arc::clone(&keyspace));
        let deadline = keyspace.current_deadline("k").unwrap();
        timers.install("k", deadline);

        keyspace.persist("k");
        timers.cancel("k");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(keyspace.type_of("k"), "string");
    }
}
