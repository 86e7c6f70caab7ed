//! Single-flight execution with short-lived result retention.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, warn};
use turbo_net::{CacheSettings, Endpoint, NetworkError, Session, DEFAULT_CACHE_TTL};

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a successful result stays visible after completing. Zero
    /// disables retention; concurrent callers are still deduplicated.
    pub ttl: Duration,
    /// Prefix applied by [`SingleFlightCache::task_key`].
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            namespace: String::new(),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            ttl: settings.ttl(),
            namespace: settings.namespace.clone(),
        }
    }
}

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, NetworkError>>>;

struct CachedExecution<T> {
    generation: u64,
    task: SharedOutcome<T>,
    completed_at: Option<Instant>,
}

struct State<T> {
    entries: HashMap<String, CachedExecution<T>>,
    next_generation: u64,
}

impl<T> State<T> {
    fn sweep(&mut self, ttl: Duration, now: Instant) {
        self.entries.retain(|_, entry| match entry.completed_at {
            Some(at) => now.duration_since(at) < ttl,
            None => true,
        });
    }
}

/// Collapses concurrent requests for the same key into one execution and
/// keeps its successful result for a short TTL.
///
/// Work runs on its own tokio task, so a caller that stops waiting never
/// cancels the execution for the others. Failures are never retained: the
/// entry is dropped as soon as the work fails.
pub struct SingleFlightCache<T> {
    config: CacheConfig,
    state: Arc<Mutex<State<T>>>,
}

impl<T> SingleFlightCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cache with the default TTL.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with `config`.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Run `work` under `key`, or join the execution already registered for
    /// it.
    ///
    /// Without a key the work runs directly and nothing is shared. On a hit
    /// `work` is dropped unpolled.
    pub async fn execute<F>(&self, key: Option<String>, work: F) -> Result<T, NetworkError>
    where
        F: Future<Output = Result<T, NetworkError>> + Send + 'static,
    {
        let Some(key) = key else {
            debug!("uncached execution");
            return work.await;
        };

        let task = {
            let mut state = lock(&self.state);
            state.sweep(self.config.ttl, Instant::now());

            match state.entries.get(&key) {
                Some(existing) => {
                    debug!(%key, "cache hit");
                    existing.task.clone()
                }
                None => {
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    let task = self.spawn(key.clone(), generation, work);
                    state.entries.insert(
                        key.clone(),
                        CachedExecution {
                            generation,
                            task: task.clone(),
                            completed_at: None,
                        },
                    );
                    debug!(%key, generation, "task created");
                    task
                }
            }
        };

        task.await
    }

    /// Perform `endpoint` through `session`, deduplicated under
    /// [`task_key`](Self::task_key).
    pub async fn fetch(&self, endpoint: &Endpoint, session: &Session) -> Result<T, NetworkError>
    where
        T: DeserializeOwned,
    {
        let key = self.task_key(endpoint, session.base_url());
        let endpoint = endpoint.clone();
        let session = session.clone();
        self.execute(key, async move { session.request::<T>(&endpoint).await })
            .await
    }

    /// Key for `endpoint`: its explicit task id, else its resolved URL,
    /// prefixed with the namespace. `None` when neither is available.
    pub fn task_key(&self, endpoint: &Endpoint, base_url: &str) -> Option<String> {
        let key = match endpoint.explicit_task_id() {
            Some(id) => id.to_string(),
            None => endpoint.to_request(base_url).ok()?.url.to_string(),
        };
        Some(format!("{}{}", self.config.namespace, key))
    }

    /// Forget `key`. Callers already joined keep their result.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = lock(&self.state).entries.remove(key).is_some();
        if removed {
            debug!(%key, "invalidated");
        }
        removed
    }

    /// Forget every key.
    pub fn clear(&self) {
        lock(&self.state).entries.clear();
    }

    /// Number of in-flight and retained entries, including expired ones
    /// not yet swept.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    /// Check if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn<F>(&self, key: String, generation: u64, work: F) -> SharedOutcome<T>
    where
        F: Future<Output = Result<T, NetworkError>> + Send + 'static,
    {
        let ttl = self.config.ttl;
        let state = Arc::clone(&self.state);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = work.await;
            settle(&state, &task_key, generation, outcome.is_ok(), ttl);
            outcome
        });

        let state = Arc::clone(&self.state);
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(%key, %error, "task aborted");
                    settle(&state, &key, generation, false, ttl);
                    Err(NetworkError::Cancelled)
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl<T> Default for SingleFlightCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Stamp or drop the entry for a finished execution, unless it has been
/// replaced since.
fn settle<T>(state: &Mutex<State<T>>, key: &str, generation: u64, succeeded: bool, ttl: Duration) {
    let mut state = lock(state);
    let Some(entry) = state.entries.get_mut(key) else {
        return;
    };
    if entry.generation != generation {
        return;
    }

    if succeeded && !ttl.is_zero() {
        entry.completed_at = Some(Instant::now());
        debug!(%key, generation, "task finished");
    } else {
        state.entries.remove(key);
        debug!(%key, generation, succeeded, "task finished; not retained");
    }
}

fn lock<T>(state: &Mutex<State<T>>) -> MutexGuard<'_, State<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
