//! Result cache for pipeline runs
//!
//! Results are memoized by [`CacheKey`], a SHA-256 digest of the input bytes and
//! every processing option. The cache is single-flight: concurrent requests for
//! the same key share one computation, while distinct keys never wait on each
//! other. Entries expire after a fixed TTL and the least recently used entry is
//! evicted once the capacity is exceeded. Failed computations are not stored.

use crate::{
    config::{BackgroundColor, PipelineSettings, ProcessingConfig},
    error::Result,
    types::PipelineResult,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// Layout version of the config encoding mixed into every key
const KEY_LAYOUT_VERSION: u8 = 1;

/// Identity of a pipeline request
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive the key for `bytes` processed with `config`
    ///
    /// The digest covers the raw bytes followed by a fixed-size encoding of every
    /// config field, so changing any option yields a different key.
    #[must_use]
    pub fn for_request(bytes: &[u8], config: &ProcessingConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hasher.update(encode_config(config));

        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        Self(key)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{:02x}", byte)).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.iter().take(6).map(|byte| format!("{:02x}", byte)).collect();
        write!(f, "CacheKey({})", prefix)
    }
}

fn encode_config(config: &ProcessingConfig) -> [u8; 11] {
    let (tag, rgba) = match config.background_color {
        BackgroundColor::Transparent => (0, [0; 4]),
        BackgroundColor::Rgba(rgba) => (1, rgba),
    };
    let [r, g, b, a] = rgba;

    [
        KEY_LAYOUT_VERSION,
        u8::from(config.alpha_matting),
        config.foreground_threshold,
        config.background_threshold,
        tag,
        r,
        g,
        b,
        a,
        u8::from(config.use_sharpen),
        u8::from(config.use_contrast),
    ]
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered without computing, including those that joined an in-flight run
    pub hits: u64,
    /// Requests that started a computation
    pub misses: u64,
    /// Entries dropped to respect the capacity
    pub evictions: u64,
    /// Entries dropped because they outlived the TTL
    pub expirations: u64,
    /// Completed results currently stored
    pub entries: usize,
}

impl CacheStats {
    /// Hit ratio as a percentage
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

type SharedResult = Arc<PipelineResult>;
type Outcome = Option<Result<SharedResult>>;

struct CacheEntry {
    result: SharedResult,
    inserted_at: Instant,
    last_access: u64,
}

enum Slot {
    Ready(CacheEntry),
    Pending {
        flight: u64,
        receiver: watch::Receiver<Outcome>,
    },
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, Slot>,
    /// Logical clock for recency ordering
    tick: u64,
    next_flight: u64,
    stats: CacheStats,
}

enum Lookup {
    Hit(SharedResult),
    Wait(watch::Receiver<Outcome>),
    Lead(u64, watch::Sender<Outcome>),
}

/// Single-flight, TTL-bounded, LRU-evicting cache of pipeline results
pub struct PipelineCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    capacity: usize,
}

impl PipelineCache {
    /// Create a cache holding up to `capacity` results for `ttl` each
    ///
    /// A capacity of 0 is treated as 1.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.cache_ttl, settings.cache_capacity)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the cached result for `key`, or compute and store it
    ///
    /// If another caller is already computing `key`, this waits for that
    /// computation and shares its outcome, error included. Should the computing
    /// caller be cancelled, one waiter takes over. `compute` is invoked at most
    /// once per call.
    ///
    /// # Errors
    /// - Whatever `compute` (or the computation this call joined) returned
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<SharedResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PipelineResult>>,
    {
        loop {
            match self.lookup(key) {
                Lookup::Hit(result) => {
                    tracing::debug!(key = %key, "cache hit");
                    return Ok(result);
                },
                Lookup::Wait(mut receiver) => {
                    tracing::debug!(key = %key, "joining in-flight computation");
                    let outcome = match receiver.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        // The computing caller was dropped; retry, possibly as the new leader
                        Err(_) => continue,
                    };
                    if let Some(outcome) = outcome {
                        if outcome.is_ok() {
                            self.lock().stats.hits += 1;
                        }
                        return outcome;
                    }
                },
                Lookup::Lead(flight, sender) => {
                    tracing::debug!(key = %key, "cache miss");
                    let guard = FlightGuard {
                        cache: self,
                        key,
                        flight,
                        sender,
                        finished: false,
                    };
                    let outcome = compute().await.map(Arc::new);
                    return guard.finish(outcome);
                },
            }
        }
    }

    fn lookup(&self, key: CacheKey) -> Lookup {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.tick += 1;
        let tick = state.tick;
        let now = Instant::now();

        let expired = match state.slots.get_mut(&key) {
            Some(Slot::Ready(entry)) => {
                if now.duration_since(entry.inserted_at) < self.ttl {
                    entry.last_access = tick;
                    state.stats.hits += 1;
                    return Lookup::Hit(Arc::clone(&entry.result));
                }
                true
            },
            Some(Slot::Pending { receiver, .. }) => return Lookup::Wait(receiver.clone()),
            None => false,
        };

        if expired {
            state.slots.remove(&key);
            state.stats.expirations += 1;
            tracing::debug!(key = %key, "cache entry expired");
        }

        state.stats.misses += 1;
        state.next_flight += 1;
        let flight = state.next_flight;
        let (sender, receiver) = watch::channel(None);
        state.slots.insert(key, Slot::Pending { flight, receiver });
        Lookup::Lead(flight, sender)
    }

    /// Store or discard the outcome of the flight that owns `key`
    fn complete(&self, key: CacheKey, flight: u64, outcome: &Result<SharedResult>) {
        let mut guard = self.lock();
        let state = &mut *guard;

        let owned = matches!(
            state.slots.get(&key),
            Some(Slot::Pending { flight: current, .. }) if *current == flight
        );
        if !owned {
            return;
        }

        match outcome {
            Ok(result) => {
                state.tick += 1;
                let entry = CacheEntry {
                    result: Arc::clone(result),
                    inserted_at: Instant::now(),
                    last_access: state.tick,
                };
                state.slots.insert(key, Slot::Ready(entry));
                self.enforce_limits(state);
            },
            Err(e) => {
                state.slots.remove(&key);
                tracing::debug!(key = %key, error = %e, "computation failed; not cached");
            },
        }
    }

    /// Drop the in-flight marker of a flight that will never finish
    fn abandon(&self, key: CacheKey, flight: u64) {
        let mut state = self.lock();
        let owned = matches!(
            state.slots.get(&key),
            Some(Slot::Pending { flight: current, .. }) if *current == flight
        );
        if owned {
            state.slots.remove(&key);
            tracing::warn!(key = %key, "computation cancelled before completion");
        }
    }

    fn enforce_limits(&self, state: &mut CacheState) {
        let now = Instant::now();
        let before = state.slots.len();
        state.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => now.duration_since(entry.inserted_at) < self.ttl,
            Slot::Pending { .. } => true,
        });
        state.stats.expirations += (before - state.slots.len()) as u64;

        while ready_count(state) > self.capacity {
            let oldest = state
                .slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready(entry) => Some((entry.last_access, *key)),
                    Slot::Pending { .. } => None,
                })
                .min()
                .map(|(_, key)| key);

            let Some(key) = oldest else { break };
            state.slots.remove(&key);
            state.stats.evictions += 1;
            tracing::debug!(key = %key, "evicted least recently used entry");
        }
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let now = Instant::now();
        let before = state.slots.len();
        state.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => now.duration_since(entry.inserted_at) < self.ttl,
            Slot::Pending { .. } => true,
        });
        let purged = before - state.slots.len();
        state.stats.expirations += purged as u64;
        purged
    }

    /// Remove every completed entry; in-flight computations are unaffected
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let before = state.slots.len();
        state.slots.retain(|_, slot| matches!(slot, Slot::Pending { .. }));
        before - state.slots.len()
    }

    /// Number of completed results currently stored (expired ones included until purged)
    #[must_use]
    pub fn len(&self) -> usize {
        ready_count(&self.lock())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a fresh result is stored for `key` (does not affect recency or stats)
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        matches!(
            self.lock().slots.get(key),
            Some(Slot::Ready(entry)) if now.duration_since(entry.inserted_at) < self.ttl
        )
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: ready_count(&state),
            ..state.stats
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}

impl fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

fn ready_count(state: &CacheState) -> usize {
    state
        .slots
        .values()
        .filter(|slot| matches!(slot, Slot::Ready(_)))
        .count()
}

/// Owns an in-flight marker until the computation finishes or is dropped
struct FlightGuard<'a> {
    cache: &'a PipelineCache,
    key: CacheKey,
    flight: u64,
    sender: watch::Sender<Outcome>,
    finished: bool,
}

impl FlightGuard<'_> {
    fn finish(mut self, outcome: Result<SharedResult>) -> Result<SharedResult> {
        self.cache.complete(self.key, self.flight, &outcome);
        self.sender.send_replace(Some(outcome.clone()));
        self.finished = true;
        outcome
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // Runs before `sender` is dropped, so woken waiters never see a stale marker
        if !self.finished {
            self.cache.abandon(self.key, self.flight);
        }
    }
}
