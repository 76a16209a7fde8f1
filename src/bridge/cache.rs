//! Memoizing translation cache with single-flight engine calls.
//!
//! Entry lifecycle: absent -> Pending (engine call in flight, waiters
//! queued) -> Ready (cached, LRU-evictable) or removed on failure. Failures
//! are handed to every waiter and never cached.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::bridge::engine::TranslationEngine;
use crate::common::error::{TranslateError, TranslateResult};
use crate::common::types::Language;

/// Cache key. `text` is the emoji-normalized message text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslationKey {
    pub text: String,
    pub source: Language,
    pub target: Language,
}

impl TranslationKey {
    pub fn new(text: impl Into<String>, source: Language, target: Language) -> Self {
        Self {
            text: text.into(),
            source,
            target,
        }
    }
}

type Waiter = oneshot::Sender<TranslateResult<String>>;

#[derive(Debug)]
enum Entry {
    Pending(Vec<Waiter>),
    Ready { text: String, tick: u64 },
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<TranslationKey, Entry>,
    /// Ready entries by last use, oldest first.
    recency: BTreeMap<u64, TranslationKey>,
    tick: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Evict least-recently-used Ready entries beyond `capacity`.
    fn evict(&mut self, capacity: usize) {
        while self.recency.len() > capacity {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if matches!(self.entries.get(&key), Some(Entry::Ready { .. })) {
                self.entries.remove(&key);
            }
        }
    }
}

/// Translation cache settings.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    /// Maximum number of Ready entries.
    pub capacity: usize,
    /// Upper bound on a single engine call.
    pub call_timeout: Duration,
}

/// Memoizes `(text, source, target) -> translation`.
pub struct TranslationCache {
    engine: Arc<dyn TranslationEngine>,
    state: Arc<Mutex<CacheState>>,
    settings: CacheSettings,
    tasks: TaskTracker,
}

impl TranslationCache {
    pub fn new(engine: Arc<dyn TranslationEngine>, settings: CacheSettings, tasks: TaskTracker) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(CacheState::default())),
            settings,
            tasks,
        }
    }

    /// Translate through the cache.
    ///
    /// Concurrent calls for one key share a single engine call. The call
    /// runs in its own task, so dropping this future does not strand other
    /// waiters.
    pub async fn translate(&self, text: &str, source: Language, target: Language) -> TranslateResult<String> {
        if source == target {
            return Ok(text.to_string());
        }

        let key = TranslationKey::new(text, source, target);
        let rx = {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let state = &mut *guard;
            let tick = state.next_tick();

            match state.entries.get_mut(&key) {
                Some(Entry::Ready { text, tick: last }) => {
                    state.recency.remove(last);
                    *last = tick;
                    state.recency.insert(tick, key.clone());
                    return Ok(text.clone());
                }
                Some(Entry::Pending(waiters)) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
                None => {
                    if !self.engine.is_ready() {
                        return Err(TranslateError::EngineUnavailable);
                    }
                    let (tx, rx) = oneshot::channel();
                    state.entries.insert(key.clone(), Entry::Pending(vec![tx]));
                    self.tasks.spawn(run_flight(
                        Arc::clone(&self.engine),
                        Arc::clone(&self.state),
                        key,
                        self.settings,
                    ));
                    rx
                }
            }
        };

        rx.await.unwrap_or(Err(TranslateError::EngineUnavailable))
    }

    /// Cached value for a key, without touching recency.
    #[cfg(test)]
    pub fn peek(&self, key: &TranslationKey) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.entries.get(key) {
            Some(Entry::Ready { text, .. }) => Some(text.clone()),
            _ => None,
        }
    }

    /// Number of Ready entries.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recency
            .len()
    }

    /// Number of keys with an engine call in flight.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .filter(|e| matches!(e, Entry::Pending(_)))
            .count()
    }
}

/// Run one engine call and publish its outcome to every waiter.
async fn run_flight(
    engine: Arc<dyn TranslationEngine>,
    state: Arc<Mutex<CacheState>>,
    key: TranslationKey,
    settings: CacheSettings,
) {
    let result = match tokio::time::timeout(
        settings.call_timeout,
        engine.translate(&key.text, key.source, key.target),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(TranslateError::Timeout),
    };

    let waiters = {
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        let waiters = match state.entries.remove(&key) {
            Some(Entry::Pending(waiters)) => waiters,
            _ => Vec::new(),
        };

        if let Ok(ref text) = result {
            let tick = state.next_tick();
            state.recency.insert(tick, key.clone());
            state.entries.insert(
                key.clone(),
                Entry::Ready {
                    text: text.clone(),
                    tick,
                },
            );
            state.evict(settings.capacity);
        }
        waiters
    };

    if let Err(ref e) = result {
        debug!(source = %key.source, target = %key.target, "Translation failed: {}", e);
    }

    for waiter in waiters {
        // Receiver gone means that caller stopped waiting
        let _ = waiter.send(result.clone());
    }
}
