//! Per-run memoization of named computations.
//!
//! A [`ComputationCache`] keeps one map per computation name. Inputs are
//! compared structurally: the key is the input's canonical JSON form, so two
//! separately built but equal inputs share an entry.
//!
//! On a miss the requesting thread inserts a `Pending` entry before it starts
//! computing. Other threads asking for the same key block on the entry's
//! condition variable and receive the same outcome once it resolves. Errors
//! are stored like values and replayed to every later request.
//!
//! ```
//! use lantern::cache::{Computation, ComputationCache};
//! use lantern::error::Result;
//!
//! struct Square;
//!
//! impl Computation for Square {
//!     type Input = u64;
//!     type Output = u64;
//!
//!     fn name(&self) -> &'static str {
//!         "Square"
//!     }
//!
//!     fn compute(&self, input: &u64, _cache: &ComputationCache) -> Result<u64> {
//!         Ok(input * input)
//!     }
//! }
//!
//! let cache = ComputationCache::new();
//! assert_eq!(*cache.request(&Square, &12).unwrap(), 144);
//! assert_eq!(*cache.request(&Square, &12).unwrap(), 144);
//! assert_eq!(cache.stats().executions, 1);
//! ```

use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{LanternError, Result};
use crate::stats::{CacheStats, Measure, TimingRecorder};

/// Category attached to computation measures.
pub const MEASURE_CATEGORY: &str = "computation";

type ErasedOutput = Arc<dyn Any + Send + Sync>;
type ErasedResult = std::result::Result<ErasedOutput, LanternError>;

/// A named, memoizable unit of work.
pub trait Computation: Send + Sync {
    /// Serialized to build the cache key.
    type Input: Serialize + ?Sized;
    type Output: Send + Sync + 'static;

    /// Name of the cache this computation lives in.
    fn name(&self) -> &'static str;

    /// Computes the output. Nested computations go through `cache`.
    fn compute(&self, input: &Self::Input, cache: &ComputationCache) -> Result<Self::Output>;
}

enum EntryState {
    Pending { owner: ThreadId },
    Resolved(ErasedResult),
}

struct CacheEntry {
    state: Mutex<EntryState>,
    resolved: Condvar,
}

impl CacheEntry {
    fn pending() -> Self {
        Self {
            state: Mutex::new(EntryState::Pending {
                owner: thread::current().id(),
            }),
            resolved: Condvar::new(),
        }
    }

    fn resolve(&self, outcome: ErasedResult) {
        *self.state.lock() = EntryState::Resolved(outcome);
        self.resolved.notify_all();
    }
}

/// Resolves the entry with an error, and counts the failed execution, if
/// the computation unwinds.
struct PanicGuard<'a> {
    entry: &'a CacheEntry,
    stats: &'a RwLock<CacheStats>,
    name: &'static str,
    armed: bool,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.entry.resolve(Err(LanternError::Cache(format!(
                "computation {} panicked",
                self.name
            ))));
            let mut stats = self.stats.write();
            stats.executions += 1;
            stats.failures += 1;
        }
    }
}

/// Memoizes computations for the lifetime of one analysis run.
pub struct ComputationCache {
    entries: Mutex<HashMap<&'static str, HashMap<String, Arc<CacheEntry>>>>,
    stats: RwLock<CacheStats>,
    recorder: TimingRecorder,
}

impl ComputationCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            recorder: TimingRecorder::new(),
        }
    }

    /// Returns the memoized output of `computation` for `input`, computing it
    /// on first request.
    pub fn request<C: Computation>(
        &self,
        computation: &C,
        input: &C::Input,
    ) -> Result<Arc<C::Output>> {
        let name = computation.name();
        let key = Self::cache_key(input)?;

        let (entry, owner) = {
            let mut entries = self.entries.lock();
            let map = entries.entry(name).or_default();
            match map.get(&key) {
                Some(entry) => (Arc::clone(entry), false),
                None => {
                    let entry = Arc::new(CacheEntry::pending());
                    map.insert(key, Arc::clone(&entry));
                    (entry, true)
                }
            }
        };

        {
            let mut stats = self.stats.write();
            stats.requests += 1;
            if !owner {
                stats.hits += 1;
            }
        }

        if owner {
            self.execute(computation, input, &entry)
        } else {
            trace!(computation = name, "cache hit");
            Self::wait::<C>(name, &entry)
        }
    }

    /// Canonical key: `serde_json::Value` keeps object keys sorted.
    fn cache_key<T: Serialize + ?Sized>(input: &T) -> Result<String> {
        let value = serde_json::to_value(input)?;
        Ok(value.to_string())
    }

    fn execute<C: Computation>(
        &self,
        computation: &C,
        input: &C::Input,
        entry: &CacheEntry,
    ) -> Result<Arc<C::Output>> {
        let name = computation.name();
        let mut guard = PanicGuard {
            entry,
            stats: &self.stats,
            name,
            armed: true,
        };

        debug!(computation = name, "computing");
        let started = Instant::now();
        let outcome = computation.compute(input, self).map(Arc::new);
        self.recorder.record(
            format!("lantern:computed:{}", name),
            MEASURE_CATEGORY,
            started,
            started.elapsed(),
        );

        let erased = outcome.clone().map(|output| output as ErasedOutput);
        guard.armed = false;
        entry.resolve(erased);

        let mut stats = self.stats.write();
        stats.executions += 1;
        if let Err(err) = &outcome {
            stats.failures += 1;
            warn!(computation = name, error = %err, "computation failed");
        }
        outcome
    }

    fn wait<C: Computation>(name: &'static str, entry: &CacheEntry) -> Result<Arc<C::Output>> {
        let me = thread::current().id();
        let mut state = entry.state.lock();
        loop {
            let outcome = match &*state {
                EntryState::Pending { owner } if *owner == me => {
                    Some(Err(LanternError::Cache(format!(
                        "re-entrant request for {} while it is being computed on this thread",
                        name
                    ))))
                }
                EntryState::Pending { .. } => None,
                EntryState::Resolved(outcome) => Some(outcome.clone()),
            };

            match outcome {
                Some(outcome) => return Self::downcast::<C>(name, outcome),
                None => entry.resolved.wait(&mut state),
            }
        }
    }

    fn downcast<C: Computation>(
        name: &'static str,
        outcome: ErasedResult,
    ) -> Result<Arc<C::Output>> {
        outcome?
            .downcast::<C::Output>()
            .map_err(|_| {
                LanternError::Cache(format!(
                    "computation {} registered with another output type",
                    name
                ))
            })
    }

    /// Number of entries, resolved or pending, across all computations.
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries stored for one computation name.
    pub fn entries_for(&self, name: &str) -> usize {
        self.entries.lock().get(name).map_or(0, HashMap::len)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Measures of every executed computation so far.
    pub fn measures(&self) -> Vec<Measure> {
        self.recorder.measures()
    }
}

impl Default for ComputationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComputationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputationCache")
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
