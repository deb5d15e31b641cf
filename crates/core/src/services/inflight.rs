use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::errors::CoreError;

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, CoreError>>>;

/// Coalesces concurrent requests for the same key into one producer run.
///
/// The producer is spawned onto the runtime, so it runs to completion (or
/// its own timeout) even when every caller has gone away. The entry is
/// removed when the producer finishes; every waiter gets a clone of the
/// same outcome, success or error.
pub struct InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pending: Arc<Mutex<HashMap<String, SharedOutcome<T>>>>,
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys with a producer currently running.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join the producer already running for `key`, or start `producer`.
    ///
    /// Returns the shared outcome and whether an existing run was joined.
    /// `producer` is not called when one is joined. Must be called from
    /// within a Tokio runtime.
    pub fn dedupe<F, Fut>(&self, key: &str, producer: F) -> (SharedOutcome<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = pending.get(key) {
            return (running.clone(), true);
        }

        // The lock is held until the entry is inserted, so the task's
        // removal always comes after its own insertion.
        let release = Release {
            pending: Arc::clone(&self.pending),
            key: key.to_string(),
        };
        let work = producer();
        let handle = tokio::spawn(async move {
            let _release = release;
            work.await
        });

        let shared = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(CoreError::from(e)),
            }
        }
        .boxed()
        .shared();

        pending.insert(key.to_string(), shared.clone());
        (shared, false)
    }

    /// `dedupe` and await the outcome.
    pub async fn run<F, Fut>(&self, key: &str, producer: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let (outcome, _) = self.dedupe(key, producer);
        outcome.await
    }
}

/// Removes a key from the pending map when the producer task ends,
/// whether it returned or panicked.
struct Release<T>
where
    T: Clone + Send + Sync + 'static,
{
    pending: Arc<Mutex<HashMap<String, SharedOutcome<T>>>>,
    key: String,
}

impl<T> Drop for Release<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

impl<T> Default for InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
