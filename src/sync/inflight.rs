use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt as _, Shared};

type Handle = Shared<BoxFuture<'static, ()>>;

/// Registry of running tasks keyed by `K`; at most one task per key at a time.
#[derive(Clone)]
pub struct InFlight<K> {
    registry: Arc<Mutex<Registry<K>>>,
}

struct Registry<K> {
    next_id: u64,
    tasks: HashMap<K, Entry>,
}

struct Entry {
    id: u64,
    handle: Handle,
}

impl<K> Default for InFlight<K> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                tasks: HashMap::new(),
            })),
        }
    }
}

impl<K> InFlight<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &K) -> bool {
        lock(&self.registry).tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for the task registered under `key`, spawning `make()` first if none is.
    ///
    /// `make` runs under the registry lock and should only build the future.
    /// The spawned task runs to completion even if every caller stops waiting,
    /// and its entry is removed when it ends, including by panic.
    pub async fn run_deduplicated<F, Fut>(&self, key: K, make: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = {
            let mut registry = lock(&self.registry);
            match registry.tasks.get(&key) {
                Some(entry) => entry.handle.clone(),
                None => {
                    let fut = make();
                    let id = registry.next_id;
                    registry.next_id += 1;

                    // Release guards are only built once their future runs, never
                    // while this lock is held.
                    let task = tokio::spawn({
                        let release = self.release_later(&key, id);
                        async move {
                            let _release = release();
                            fut.await;
                        }
                    });
                    let handle = {
                        let release = self.release_later(&key, id);
                        async move {
                            if let Err(err) = task.await {
                                tracing::error!(error = %err, "deduplicated task did not complete");
                            }
                            // Covers a task its runtime dropped before first poll.
                            drop(release());
                        }
                    }
                    .boxed()
                    .shared();
                    registry.tasks.insert(
                        key,
                        Entry {
                            id,
                            handle: handle.clone(),
                        },
                    );
                    handle
                }
            }
        };
        handle.await;
    }

    fn release_later(&self, key: &K, id: u64) -> impl FnOnce() -> Release<K> + Send + 'static {
        let registry = self.registry.clone();
        let key = key.clone();
        move || Release { registry, key, id }
    }
}

fn lock<K>(registry: &Mutex<Registry<K>>) -> MutexGuard<'_, Registry<K>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes its entry on drop, unless the key has since been taken by a newer run.
struct Release<K: Eq + Hash> {
    registry: Arc<Mutex<Registry<K>>>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash> Drop for Release<K> {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        if registry.tasks.get(&self.key).is_some_and(|e| e.id == self.id) {
            registry.tasks.remove(&self.key);
        }
    }
}
