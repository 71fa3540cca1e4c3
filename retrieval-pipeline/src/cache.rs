//! In-process memo for finished relevance analyses.
//!
//! Each key owns a `OnceCell`, so concurrent callers asking for the same key wait on a single
//! computation instead of racing. Entries expire `ttl` after they were computed and the oldest
//! finished entries are evicted once `capacity` is reached. Nothing is persisted.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use common::error::AppError;
use serde::Serialize;
use serde_json::Value;
use tokio::{
    sync::{Mutex, OnceCell},
    time::Instant,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: &'static str,
    query: String,
    corpus_id: String,
    /// Options rendered as JSON with object keys sorted.
    options: String,
}

impl CacheKey {
    pub fn new<O: Serialize>(
        operation: &'static str,
        query: &str,
        corpus_id: &str,
        options: &O,
    ) -> Result<Self, AppError> {
        let options = serde_json::to_value(options)?;
        Ok(Self {
            operation,
            query: query.to_string(),
            corpus_id: corpus_id.to_string(),
            options: canonical_json(&options),
        })
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(key, value)| format!("{}:{}", Value::String(key.clone()), canonical_json(value)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        Value::Array(items) => {
            let body = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub ttl: Option<Duration>,
    pub capacity: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(15 * 60)),
            capacity: 256,
        }
    }
}

struct Computed<V> {
    value: Arc<V>,
    computed_at: Instant,
}

type Slot<V> = Arc<OnceCell<Computed<V>>>;

pub struct ResultCache<V> {
    policy: CachePolicy,
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
}

impl<V: Send + Sync> ResultCache<V> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key`, running `compute` only if no live entry exists.
    ///
    /// A failed computation is not cached; the next caller computes again.
    pub async fn get_or_try_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<Arc<V>, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, AppError>>,
    {
        let slot = self.slot_for(&key).await;
        let operation = key.operation;

        let outcome = slot
            .get_or_try_init(|| async move {
                debug!(operation, "cache miss; computing");
                let value = compute().await?;
                Ok::<_, AppError>(Computed {
                    value: Arc::new(value),
                    computed_at: Instant::now(),
                })
            })
            .await;

        match outcome {
            Ok(computed) => Ok(Arc::clone(&computed.value)),
            Err(err) => {
                self.discard_failed(&key, &slot).await;
                Err(err)
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }

    async fn slot_for(&self, key: &CacheKey) -> Slot<V> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();

        if let Some(slot) = slots.get(key) {
            if !self.is_expired(slot, now) {
                if slot.initialized() {
                    debug!(operation = key.operation, "cache hit");
                }
                return Arc::clone(slot);
            }
            slots.remove(key);
        }

        self.evict(&mut slots, now);

        let slot: Slot<V> = Arc::new(OnceCell::new());
        slots.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    async fn discard_failed(&self, key: &CacheKey, slot: &Slot<V>) {
        let mut slots = self.slots.lock().await;
        let unfinished = slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if unfinished {
            slots.remove(key);
        }
    }

    fn is_expired(&self, slot: &Slot<V>, now: Instant) -> bool {
        match (self.policy.ttl, slot.get()) {
            (Some(ttl), Some(computed)) => now.duration_since(computed.computed_at) >= ttl,
            _ => false,
        }
    }

    /// Drops expired entries, then the oldest finished ones until a new key fits.
    /// Entries still being computed are never evicted.
    fn evict(&self, slots: &mut HashMap<CacheKey, Slot<V>>, now: Instant) {
        slots.retain(|_, slot| !self.is_expired(slot, now));

        let capacity = self.policy.capacity.max(1);
        while slots.len() >= capacity {
            let oldest = slots
                .iter()
                .filter_map(|(key, slot)| slot.get().map(|computed| (key, computed.computed_at)))
                .min_by_key(|(_, computed_at)| *computed_at)
                .map(|(key, _)| key.clone());

            match oldest {
                Some(key) => {
                    debug!(operation = key.operation, "evicting cached analysis");
                    slots.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl<V: Send + Sync> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}
