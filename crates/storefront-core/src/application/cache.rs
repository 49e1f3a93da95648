use crate::domain::app::App;
use crate::domain::app_list::AppList;
use crate::error::CoreError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum acceptable age for cached ratings-class data
pub const RATINGS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A value memoized by the result cache
#[derive(Debug, Clone)]
pub enum CacheValue {
    /// A single produced entity
    App(Box<App>),
    /// A produced entity list
    List(AppList),
}

impl CacheValue {
    /// The entity list form, wrapping a single entity into a list of one
    pub fn into_list(self) -> AppList {
        match self {
            CacheValue::App(app) => {
                let mut list = AppList::new();
                list.merge(*app);
                list
            }
            CacheValue::List(list) => list,
        }
    }
}

enum Slot {
    Ready {
        value: CacheValue,
        inserted: Instant,
    },
    InFlight(broadcast::Sender<Result<CacheValue, CoreError>>),
}

/// Session-scoped memoization of expensive backend lookups.
///
/// Keys are namespaced per backend. For any key, at most one production
/// runs at a time: concurrent requests for an uncached key register on
/// the in-flight producer's channel and receive its result instead of
/// triggering duplicate work. A failed production clears the slot, so
/// the next request retries rather than caching the failure.
#[derive(Default)]
pub struct ResultCache {
    slots: DashMap<String, Slot>,
}

impl ResultCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle scoped to `backend`'s key namespace
    pub fn namespace(self: &Arc<Self>, backend: &str) -> CacheNamespace {
        CacheNamespace {
            cache: Arc::clone(self),
            prefix: format!("{backend}:"),
        }
    }

    /// Drop every entry belonging to `backend`, e.g. after a settings
    /// change invalidates what it produced
    pub fn invalidate_namespace(&self, backend: &str) {
        let prefix = format!("{backend}:");
        self.slots.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of ready or in-flight entries
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

enum Claim {
    Hit(CacheValue),
    Produce(broadcast::Sender<Result<CacheValue, CoreError>>),
    Wait(broadcast::Receiver<Result<CacheValue, CoreError>>),
}

/// A [`ResultCache`] handle scoped to one backend's namespace
#[derive(Clone)]
pub struct CacheNamespace {
    cache: Arc<ResultCache>,
    prefix: String,
}

impl CacheNamespace {
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// A ready value no older than `max_age`, if present
    pub fn lookup(&self, key: &str, max_age: Duration) -> Option<CacheValue> {
        let slot = self.cache.slots.get(&self.full_key(key))?;
        match slot.value() {
            Slot::Ready { value, inserted } if inserted.elapsed() <= max_age => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    /// Whether a ready value no older than `max_age` is present
    pub fn is_fresh(&self, key: &str, max_age: Duration) -> bool {
        self.lookup(key, max_age).is_some()
    }

    /// Store a produced value, replacing any previous entry
    pub fn store(&self, key: &str, value: CacheValue) {
        self.cache.slots.insert(
            self.full_key(key),
            Slot::Ready {
                value,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop the entry for `key`
    pub fn invalidate(&self, key: &str) {
        self.cache.slots.remove(&self.full_key(key));
    }

    /// Return the cached value for `key` if fresh, otherwise run
    /// `producer`, at most once across all concurrent callers.
    ///
    /// The first caller to find the key uncached (or stale) claims the
    /// slot and runs the producer; every caller arriving while the
    /// production is in flight waits for and receives the same result.
    /// A failed production clears the slot and hands the error to all
    /// waiters; it is not cached.
    pub async fn get_or_produce<F, Fut>(
        &self,
        key: &str,
        max_age: Duration,
        producer: F,
    ) -> Result<CacheValue, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue, CoreError>>,
    {
        let full_key = self.full_key(key);
        let mut producer = Some(producer);

        loop {
            // The claim decision happens atomically under the entry
            // guard; waiters subscribe before the guard is released, so
            // a producer completing concurrently cannot slip its result
            // past them.
            let claim = match self.cache.slots.entry(full_key.clone()) {
                Entry::Occupied(mut occupied) => match occupied.get() {
                    Slot::Ready { value, inserted } => {
                        if inserted.elapsed() <= max_age {
                            Claim::Hit(value.clone())
                        } else {
                            let (tx, _) = broadcast::channel(1);
                            occupied.insert(Slot::InFlight(tx.clone()));
                            Claim::Produce(tx)
                        }
                    }
                    Slot::InFlight(tx) => Claim::Wait(tx.subscribe()),
                },
                Entry::Vacant(vacant) => {
                    let (tx, _) = broadcast::channel(1);
                    vacant.insert(Slot::InFlight(tx.clone()));
                    Claim::Produce(tx)
                }
            };

            match claim {
                Claim::Hit(value) => return Ok(value),
                Claim::Produce(tx) => {
                    let produce = match producer.take() {
                        Some(produce) => produce,
                        None => {
                            // This caller already ran its producer in a
                            // previous loop turn and failed; clear the
                            // claim so others can retry.
                            self.cache.slots.remove(&full_key);
                            return Err(CoreError::Failed(
                                "cache production already attempted".to_string(),
                            ));
                        }
                    };
                    let result = produce().await;
                    match &result {
                        Ok(value) => {
                            self.cache.slots.insert(
                                full_key.clone(),
                                Slot::Ready {
                                    value: value.clone(),
                                    inserted: Instant::now(),
                                },
                            );
                        }
                        Err(err) => {
                            debug!(key = %full_key, error = %err, "cache production failed");
                            self.cache.slots.remove(&full_key);
                        }
                    }
                    let _ = tx.send(result.clone());
                    return result;
                }
                Claim::Wait(mut rx) => match rx.recv().await {
                    Ok(result) => return result,
                    // The producer went away without completing; race
                    // for the slot again.
                    Err(_) => continue,
                },
            }
        }
    }
}
