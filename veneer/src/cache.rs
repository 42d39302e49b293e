// Copyright 2026 veneer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The loader/writer-integrated cache engine.
//!
//! Every operation follows one skeleton: check the status gate, build a compute closure around a
//! per-call result record, hand it to the store, then interpret the outcome. The closure drives
//! the external source of truth from inside the store's per-key atomicity: the writer runs
//! before a value is installed, the loader runs before a loaded value becomes observable. When
//! the store itself fails, the engine hands the operation to the resilience strategy together
//! with the loader/writer failure the record captured, if any.

use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Duration};

use itertools::Itertools;
use veneer_common::{
    code::{Key, Value},
    event::{EventListener, Mutation},
    metrics::Metrics,
};

use crate::{
    bulk::{LoadAccounting, WriteAccounting},
    error::Error,
    expiry::{EternalExpiry, ExpiryPolicy},
    loader_writer::{BulkLoadError, BulkWriteError, LoaderWriter},
    resilience::{ResilienceStrategy, RobustResilience},
    status::{Status, StatusGate},
    store::{Compute, ComputeError, MemoryStore, SourceError, Store},
};

/// Per-call result record filled in by the compute closure.
///
/// Synchronized solely by the store's per-key atomicity: the closure runs on the calling thread
/// under the store's lock equivalent, and the record is read only after the store call returned.
#[derive(Debug)]
struct OpRecord<V> {
    hit: bool,
    modified: bool,
    success: bool,
    wrote: bool,
    old: Option<V>,
    source_error: Option<SourceError>,
}

impl<V> Default for OpRecord<V> {
    fn default() -> Self {
        Self {
            hit: false,
            modified: false,
            success: false,
            wrote: false,
            old: None,
            source_error: None,
        }
    }
}

impl<V> OpRecord<V> {
    /// Keep the loader/writer failure around for resilience classification, then pass it on.
    fn capture(&mut self, e: SourceError) -> SourceError {
        self.source_error = Some(e.clone());
        e
    }
}

/// The in-cache value a conditional operation decides on.
enum Resolved<V> {
    Absent,
    InCache(V),
    Loaded(V),
}

/// Builder for [`Cache`].
pub struct CacheBuilder<K, V, L, S = MemoryStore<K, V>>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    name: String,
    store: S,
    loader_writer: Arc<L>,
    use_loader_in_atomics: bool,
    expiry: Arc<dyn ExpiryPolicy<K, V>>,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    metrics: Arc<Metrics>,
    resilience: Option<Arc<dyn ResilienceStrategy<K, V>>>,
}

impl<K, V, L> CacheBuilder<K, V, L>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
{
    /// Build a cache over the default in-memory store.
    pub fn new(loader_writer: L) -> Self {
        Self::with_store(MemoryStore::default(), loader_writer)
    }
}

impl<K, V, L, S> CacheBuilder<K, V, L, S>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    /// Build a cache over the given store.
    pub fn with_store(store: S, loader_writer: L) -> Self {
        Self {
            name: "veneer".to_string(),
            store,
            loader_writer: Arc::new(loader_writer),
            use_loader_in_atomics: true,
            expiry: Arc::new(EternalExpiry),
            event_listener: None,
            metrics: Arc::new(Metrics::default()),
            resilience: None,
        }
    }

    /// Set the name for log scoping.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Control whether the atomic operations (`put_if_absent`, `compare_and_remove`,
    /// `replace`, `compare_and_replace`) consult the loader for the authoritative value when
    /// the store has none. Defaults to true.
    pub fn with_loader_in_atomics(mut self, use_loader_in_atomics: bool) -> Self {
        self.use_loader_in_atomics = use_loader_in_atomics;
        self
    }

    /// Set the expiry policy.
    pub fn with_expiry(mut self, expiry: impl ExpiryPolicy<K, V>) -> Self {
        self.expiry = Arc::new(expiry);
        self
    }

    /// Set the mutation listener.
    pub fn with_event_listener(mut self, listener: Arc<dyn EventListener<Key = K, Value = V>>) -> Self {
        self.event_listener = Some(listener);
        self
    }

    /// Share an externally owned metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the default robust resilience strategy.
    pub fn with_resilience(mut self, resilience: Arc<dyn ResilienceStrategy<K, V>>) -> Self {
        self.resilience = Some(resilience);
        self
    }

    /// Build the cache. The returned cache is initialized and available.
    pub fn build(self) -> Cache<K, V, L, S> {
        let store = Arc::new(self.store);
        let resilience = self
            .resilience
            .unwrap_or_else(|| Arc::new(RobustResilience::new(store.clone(), self.loader_writer.clone())));
        let gate = StatusGate::new();
        if gate.init().is_err() {
            unreachable!("a fresh status gate is uninitialized");
        }
        tracing::debug!(name = %self.name, "cache available");
        Cache {
            inner: Arc::new(CacheInner {
                name: self.name,
                store,
                loader_writer: self.loader_writer,
                resilience,
                gate,
                metrics: self.metrics,
                event_listener: self.event_listener,
                expiry: self.expiry,
                use_loader_in_atomics: self.use_loader_in_atomics,
            }),
        }
    }
}

struct CacheInner<K, V, L, S>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    name: String,
    store: Arc<S>,
    loader_writer: Arc<L>,
    resilience: Arc<dyn ResilienceStrategy<K, V>>,
    gate: StatusGate,
    metrics: Arc<Metrics>,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    expiry: Arc<dyn ExpiryPolicy<K, V>>,
    use_loader_in_atomics: bool,
}

/// A key/value cache fronting an external source of truth.
///
/// The cache is cheaply cloneable; clones share the same store, loader/writer and lifecycle.
pub struct Cache<K, V, L, S = MemoryStore<K, V>>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    inner: Arc<CacheInner<K, V, L, S>>,
}

impl<K, V, L, S> Clone for Cache<K, V, L, S>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, L, S> Debug for Cache<K, V, L, S>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("name", &self.inner.name).finish()
    }
}

/// Accessors and lifecycle.
impl<K, V, L, S> Cache<K, V, L, S>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    /// The cache name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The operation outcome counters.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The external source of truth.
    pub fn loader_writer(&self) -> &L {
        &self.inner.loader_writer
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.inner.gate.status()
    }

    /// Shut the cache down. Further operations fail with a lifecycle error; closing twice is a
    /// no-op.
    pub fn close(&self) -> Result<(), Error<K, V>> {
        self.inner.gate.close().map_err(Error::Lifecycle)?;
        tracing::debug!(name = %self.inner.name, "cache closed");
        Ok(())
    }

    fn check_available(&self) -> Result<(), Error<K, V>> {
        self.inner.gate.check_available().map_err(Error::Lifecycle)
    }

    fn notify(&self, mutation: Mutation, key: &K, value: Option<&V>) {
        if let Some(listener) = self.inner.event_listener.as_ref() {
            listener.on_mutation(mutation, key, value);
        }
    }

    fn notify_clear(&self) {
        if let Some(listener) = self.inner.event_listener.as_ref() {
            listener.on_clear();
        }
    }

    fn load_through(&self, record: &mut OpRecord<V>, key: &K) -> Result<Option<V>, SourceError> {
        self.inner
            .loader_writer
            .load(key)
            .map_err(|e| record.capture(SourceError::loading(e)))
    }

    fn write_through(&self, record: &mut OpRecord<V>, key: &K, value: &V) -> Result<(), SourceError> {
        self.inner
            .loader_writer
            .write(key, value)
            .map_err(|e| record.capture(SourceError::writing(e)))
    }

    fn delete_through(&self, record: &mut OpRecord<V>, key: &K) -> Result<(), SourceError> {
        self.inner
            .loader_writer
            .delete(key)
            .map_err(|e| record.capture(SourceError::writing(e)))
    }

    /// Resolve the value an atomic conditional operation decides on: the in-cache value, or the
    /// authoritative one iff the store has none and `use_loader_in_atomics` is set.
    fn resolve_for_atomic(
        &self,
        record: &mut OpRecord<V>,
        key: &K,
        in_cache: Option<&V>,
    ) -> Result<Resolved<V>, SourceError> {
        match in_cache {
            Some(value) => Ok(Resolved::InCache(value.clone())),
            None if self.inner.use_loader_in_atomics => Ok(match self.load_through(record, key)? {
                Some(loaded) => Resolved::Loaded(loaded),
                None => Resolved::Absent,
            }),
            None => Ok(Resolved::Absent),
        }
    }

    /// Whether the expiry policy rejects the replacement value outright.
    fn new_value_already_expired(&self, key: &K, old: Option<&V>, new: &V) -> bool {
        let duration = match old {
            Some(old) => self.inner.expiry.expiry_for_update(key, old, new),
            None => self.inner.expiry.expiry_for_creation(key, new),
        };
        duration == Some(Duration::ZERO)
    }
}

/// Per-key operations.
impl<K, V, L, S> Cache<K, V, L, S>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    /// Read the value for `key`, consulting the loader on a store miss.
    ///
    /// A loaded value is installed atomically before it becomes observable; a loader miss
    /// leaves the store absent.
    pub fn get(&self, key: &K) -> Result<Option<V>, Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self
            .inner
            .store
            .compute_if_absent(key, |k| self.load_through(&mut record, k));

        match result {
            Ok(holder) => {
                match &holder {
                    Some(_) => Metrics::increase(&metrics.get_hit),
                    None => Metrics::increase(&metrics.get_miss),
                }
                Ok(holder.map(|h| h.into_value()))
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.get_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.get_failure);
                self.inner.resilience.get_failure(key, e, record.source_error.take())
            }
        }
    }

    /// Write `value` for `key`, through to the source of truth first.
    pub fn put(&self, key: &K, value: V) -> Result<(), Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self.inner.store.compute(key, |k, current| {
            record.hit = current.is_some();
            self.write_through(&mut record, k, &value)?;
            Ok(Compute::Put(value.clone()))
        });

        match result {
            Ok(_) => {
                Metrics::increase(&metrics.put);
                let mutation = if record.hit { Mutation::Updated } else { Mutation::Created };
                self.notify(mutation, key, Some(&value));
                Ok(())
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.put_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.put_failure);
                self.inner
                    .resilience
                    .put_failure(key, &value, e, record.source_error.take())
            }
        }
    }

    /// Remove the mapping for `key`, deleting it from the source of truth first.
    pub fn remove(&self, key: &K) -> Result<(), Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self.inner.store.compute(key, |k, current| {
            record.modified = current.is_some();
            self.delete_through(&mut record, k)?;
            Ok(Compute::Remove)
        });

        match result {
            Ok(_) => {
                if record.modified {
                    Metrics::increase(&metrics.remove_success);
                    self.notify(Mutation::Removed, key, None);
                } else {
                    Metrics::increase(&metrics.remove_noop);
                }
                Ok(())
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.remove_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.remove_failure);
                self.inner.resilience.remove_failure(key, e, record.source_error.take())
            }
        }
    }

    /// Install `value` for `key` unless a mapping exists.
    ///
    /// With `use_loader_in_atomics`, the loader is consulted first; a value it returns counts
    /// as "already present according to the source of truth", is installed, and the writer is
    /// not invoked. Returns the present-or-loaded value, or `None` when `value` was installed
    /// and written through.
    pub fn put_if_absent(&self, key: &K, value: V) -> Result<Option<V>, Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self.inner.store.compute_if_absent(key, |k| {
            if self.inner.use_loader_in_atomics {
                if let Some(loaded) = self.load_through(&mut record, k)? {
                    return Ok(Some(loaded));
                }
            }
            self.write_through(&mut record, k, &value)?;
            record.wrote = true;
            Ok(Some(value.clone()))
        });

        match result {
            Ok(holder) => {
                if record.wrote {
                    Metrics::increase(&metrics.put);
                    self.notify(Mutation::Created, key, Some(&value));
                    Ok(None)
                } else {
                    Metrics::increase(&metrics.put_noop);
                    Ok(holder.map(|h| h.into_value()))
                }
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.put_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.put_failure);
                self.inner
                    .resilience
                    .put_if_absent_failure(key, &value, e, record.source_error.take())
            }
        }
    }

    /// Remove the mapping for `key` iff its value equals `expected`.
    pub fn compare_and_remove(&self, key: &K, expected: &V) -> Result<bool, Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self.inner.store.compute(key, |k, current| {
            match self.resolve_for_atomic(&mut record, k, current)? {
                Resolved::Absent => Ok(Compute::Retain),
                Resolved::InCache(value) => {
                    record.hit = true;
                    if value == *expected {
                        self.delete_through(&mut record, k)?;
                        record.success = true;
                        Ok(Compute::Remove)
                    } else {
                        Ok(Compute::Retain)
                    }
                }
                Resolved::Loaded(value) => {
                    record.hit = true;
                    if value == *expected {
                        self.delete_through(&mut record, k)?;
                        record.success = true;
                        Ok(Compute::Remove)
                    } else {
                        // Keep the freshly loaded authoritative value.
                        Ok(Compute::Put(value))
                    }
                }
            }
        });

        match result {
            Ok(_) => {
                if record.success {
                    Metrics::increase(&metrics.conditional_remove_success);
                    self.notify(Mutation::Removed, key, None);
                } else if record.hit {
                    Metrics::increase(&metrics.conditional_remove_failure_key_present);
                } else {
                    Metrics::increase(&metrics.conditional_remove_failure_key_missing);
                }
                Ok(record.success)
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.conditional_remove_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.conditional_remove_failure);
                self.inner
                    .resilience
                    .conditional_remove_failure(key, expected, e, record.source_error.take())
            }
        }
    }

    /// Replace the value for `key` if a mapping is present. Returns the prior value.
    pub fn replace(&self, key: &K, value: V) -> Result<Option<V>, Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self.inner.store.compute(key, |k, current| {
            match self.resolve_for_atomic(&mut record, k, current)? {
                Resolved::Absent => Ok(Compute::Retain),
                Resolved::InCache(old) | Resolved::Loaded(old) => {
                    self.write_through(&mut record, k, &value)?;
                    let expired = self.new_value_already_expired(k, Some(&old), &value);
                    record.old = Some(old);
                    if expired {
                        Ok(Compute::Remove)
                    } else {
                        Ok(Compute::Put(value.clone()))
                    }
                }
            }
        });

        match result {
            Ok(_) => {
                if record.old.is_some() {
                    Metrics::increase(&metrics.replace_hit);
                    self.notify(Mutation::Updated, key, Some(&value));
                } else {
                    Metrics::increase(&metrics.replace_miss_not_present);
                }
                Ok(record.old.take())
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.replace_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.replace_failure);
                self.inner
                    .resilience
                    .replace_failure(key, &value, e, record.source_error.take())
            }
        }
    }

    /// Replace the value for `key` with `new` iff its current value equals `old`.
    pub fn compare_and_replace(&self, key: &K, old: &V, new: V) -> Result<bool, Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self.inner.store.compute(key, |k, current| {
            match self.resolve_for_atomic(&mut record, k, current)? {
                Resolved::Absent => Ok(Compute::Retain),
                Resolved::InCache(value) => {
                    record.hit = true;
                    if value == *old {
                        self.write_through(&mut record, k, &new)?;
                        record.success = true;
                        if self.new_value_already_expired(k, Some(&value), &new) {
                            Ok(Compute::Remove)
                        } else {
                            Ok(Compute::Put(new.clone()))
                        }
                    } else {
                        Ok(Compute::Retain)
                    }
                }
                Resolved::Loaded(value) => {
                    record.hit = true;
                    if value == *old {
                        self.write_through(&mut record, k, &new)?;
                        record.success = true;
                        if self.new_value_already_expired(k, Some(&value), &new) {
                            Ok(Compute::Remove)
                        } else {
                            Ok(Compute::Put(new.clone()))
                        }
                    } else {
                        // Keep the freshly loaded authoritative value.
                        Ok(Compute::Put(value))
                    }
                }
            }
        });

        match result {
            Ok(_) => {
                if record.success {
                    Metrics::increase(&metrics.replace_hit);
                    self.notify(Mutation::Updated, key, Some(&new));
                } else if record.hit {
                    Metrics::increase(&metrics.replace_miss_present);
                } else {
                    Metrics::increase(&metrics.replace_miss_not_present);
                }
                Ok(record.success)
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.replace_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.replace_failure);
                self.inner
                    .resilience
                    .conditional_replace_failure(key, old, &new, e, record.source_error.take())
            }
        }
    }

    /// Atomically read the prior value and write `value`, through to the source of truth first.
    ///
    /// Returns `None` when the prior value is unknown because the store failed and the write
    /// was recovered through the resilience path.
    pub fn get_and_put(&self, key: &K, value: V) -> Result<Option<V>, Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self.inner.store.compute(key, |k, current| {
            record.hit = current.is_some();
            record.old = current.cloned();
            self.write_through(&mut record, k, &value)?;
            if self.new_value_already_expired(k, current, &value) {
                Ok(Compute::Remove)
            } else {
                Ok(Compute::Put(value.clone()))
            }
        });

        match result {
            Ok(_) => {
                if record.hit {
                    Metrics::increase(&metrics.get_hit);
                } else {
                    Metrics::increase(&metrics.get_miss);
                }
                Metrics::increase(&metrics.put);
                let mutation = if record.hit { Mutation::Updated } else { Mutation::Created };
                self.notify(mutation, key, Some(&value));
                Ok(record.old.take())
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.get_failure);
                Metrics::increase(&metrics.put_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.get_failure);
                Metrics::increase(&metrics.put_failure);
                self.inner
                    .resilience
                    .put_failure(key, &value, e, record.source_error.take())?;
                Ok(None)
            }
        }
    }

    /// Atomically read the prior value and remove the mapping, deleting it from the source of
    /// truth first.
    ///
    /// Returns `None` when the prior value is unknown because the store failed and the delete
    /// was recovered through the resilience path.
    pub fn get_and_remove(&self, key: &K) -> Result<Option<V>, Error<K, V>> {
        self.check_available()?;
        let metrics = &self.inner.metrics;
        let mut record = OpRecord::default();

        let result = self.inner.store.compute(key, |k, current| {
            record.hit = current.is_some();
            record.old = current.cloned();
            self.delete_through(&mut record, k)?;
            Ok(Compute::Remove)
        });

        match result {
            Ok(_) => {
                if record.hit {
                    Metrics::increase(&metrics.get_hit);
                    Metrics::increase(&metrics.remove_success);
                    self.notify(Mutation::Removed, key, None);
                } else {
                    Metrics::increase(&metrics.get_miss);
                    Metrics::increase(&metrics.remove_noop);
                }
                Ok(record.old.take())
            }
            Err(ComputeError::Source(e)) => {
                Metrics::increase(&metrics.get_failure);
                Metrics::increase(&metrics.remove_failure);
                Err(e.into())
            }
            Err(ComputeError::Store(e)) => {
                Metrics::increase(&metrics.get_failure);
                Metrics::increase(&metrics.remove_failure);
                self.inner.resilience.remove_failure(key, e, record.source_error.take())?;
                Ok(None)
            }
        }
    }

    /// Whether the store holds a mapping for `key`. Never consults the loader.
    pub fn contains_key(&self, key: &K) -> Result<bool, Error<K, V>> {
        self.check_available()?;
        match self.inner.store.contains(key) {
            Ok(contained) => Ok(contained),
            Err(e) => self.inner.resilience.contains_key_failure(key, e),
        }
    }

    /// Drop every cached mapping. The source of truth is untouched.
    pub fn clear(&self) -> Result<(), Error<K, V>> {
        self.check_available()?;
        match self.inner.store.clear() {
            Ok(()) => {
                self.notify_clear();
                Ok(())
            }
            Err(e) => self.inner.resilience.clear_failure(e),
        }
    }
}

/// Bulk operations.
///
/// A bulk operation is a set of independent per-key atomic effects; there is no cross-key
/// atomicity. Accounting lives in plain locals captured by the batch closure, which the store
/// invokes serially per sub-batch.
impl<K, V, L, S> Cache<K, V, L, S>
where
    K: Key,
    V: Value,
    L: LoaderWriter<K, V>,
    S: Store<K, V>,
{
    /// Read the values for a batch of keys, consulting the loader for the missing ones.
    ///
    /// The result holds an entry for every distinct input key, `None` for misses. On partial
    /// loader failure the error carries the resolved entries and the per-key causes.
    pub fn get_all(&self, keys: impl IntoIterator<Item = K>) -> Result<HashMap<K, Option<V>>, Error<K, V>> {
        self.check_available()?;
        let keys = keys.into_iter().collect_vec();
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let metrics = &self.inner.metrics;
        let loader_writer = self.inner.loader_writer.as_ref();
        let mut accounting = LoadAccounting::new();

        let computed = self.inner.store.bulk_compute_if_absent(&keys, |batch| {
            let loaded = match loader_writer.load_all(batch) {
                Ok(loaded) => loaded,
                Err(BulkLoadError::Partial(failure)) => {
                    accounting.merge(failure);
                    HashMap::new()
                }
                Err(BulkLoadError::Other(e)) => {
                    accounting.fail_batch(batch, e);
                    HashMap::new()
                }
            };
            batch
                .iter()
                .map(|key| {
                    let value = loaded.get(key).cloned().flatten();
                    if !loaded.is_empty() {
                        accounting.successes.insert(key.clone(), value.clone());
                    }
                    (key.clone(), value)
                })
                .collect_vec()
        });

        let computed = match computed {
            Ok(computed) => computed,
            Err(e) => return self.inner.resilience.get_all_failure(&keys, e),
        };

        let key_count = computed.len() as u64;
        let mut result = HashMap::with_capacity(computed.len());
        let mut hits = 0u64;
        for (key, holder) in computed {
            match holder {
                Some(holder) => {
                    hits += 1;
                    result.insert(key, Some(holder.into_value()));
                }
                None if !accounting.has_failures() => {
                    result.insert(key, None);
                }
                None => {}
            }
        }

        Metrics::increase_by(&metrics.get_all_hit, hits);
        if accounting.has_failures() {
            for (key, value) in result {
                accounting.successes.insert(key, value);
            }
            Err(Error::BulkLoading(accounting.into_failure()))
        } else {
            Metrics::increase_by(&metrics.get_all_miss, key_count - hits);
            Ok(result)
        }
    }

    /// Write a batch of entries, through to the source of truth first.
    ///
    /// Entries whose write reached the source are installed; the rest keep their prior cached
    /// value, and a bulk writing error carries the per-key outcome.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<(), Error<K, V>> {
        self.check_available()?;
        let mut entries_to_remap: HashMap<K, V> = entries.into_iter().collect();
        if entries_to_remap.is_empty() {
            return Ok(());
        }
        let all_entries = entries_to_remap.clone();
        let keys = entries_to_remap.keys().cloned().collect_vec();
        let metrics = &self.inner.metrics;
        let loader_writer = self.inner.loader_writer.as_ref();
        let mut accounting = WriteAccounting::new();
        let mut installed = 0u64;

        let result = self.inner.store.bulk_compute(&keys, |batch| {
            let to_write = batch
                .iter()
                .filter_map(|(key, _)| entries_to_remap.get(key).map(|value| (key.clone(), value.clone())))
                .collect_vec();
            if !to_write.is_empty() {
                match loader_writer.write_all(&to_write) {
                    Ok(()) => accounting.successes.extend(to_write.iter().map(|(key, _)| key.clone())),
                    Err(BulkWriteError::Partial(failure)) => accounting.merge(failure),
                    Err(BulkWriteError::Other(e)) => accounting.fail_batch(to_write.iter().map(|(key, _)| key), e),
                }
            }
            batch
                .iter()
                .map(|(key, existing)| match entries_to_remap.remove(key) {
                    // Another sub-batch already handled this key.
                    None => (key.clone(), existing.clone()),
                    Some(new) => {
                        if self.new_value_already_expired(key, existing.as_ref(), &new) {
                            (key.clone(), None)
                        } else if accounting.successes.contains(key) {
                            installed += 1;
                            (key.clone(), Some(new))
                        } else {
                            (key.clone(), existing.clone())
                        }
                    }
                })
                .collect_vec()
        });

        if let Err(e) = result {
            return self.inner.resilience.put_all_failure(&all_entries, e);
        }

        Metrics::increase_by(&metrics.put_all, installed);
        if accounting.has_failures() {
            Err(Error::BulkWriting(accounting.into_failure()))
        } else {
            Ok(())
        }
    }

    /// Remove a batch of keys, deleting them from the source of truth first.
    ///
    /// Keys whose source state is undetermined after a failed batch delete are invalidated in
    /// the store best-effort.
    pub fn remove_all(&self, keys: impl IntoIterator<Item = K>) -> Result<(), Error<K, V>> {
        self.check_available()?;
        let keys = keys.into_iter().collect_vec();
        if keys.is_empty() {
            return Ok(());
        }
        let metrics = &self.inner.metrics;
        let loader_writer = self.inner.loader_writer.as_ref();
        let mut remaining: hashbrown::HashSet<K> = keys.iter().cloned().collect();
        let mut accounting = WriteAccounting::new();
        let mut removed = 0u64;

        let result = self.inner.store.bulk_compute(&keys, |batch| {
            let to_delete = batch
                .iter()
                .map(|(key, _)| key)
                .filter(|key| remaining.contains(*key))
                .cloned()
                .collect_vec();
            let mut unknowns = hashbrown::HashSet::new();
            match loader_writer.delete_all(&to_delete) {
                Ok(()) => accounting.successes.extend(to_delete.iter().cloned()),
                Err(BulkWriteError::Partial(failure)) => accounting.merge(failure),
                Err(BulkWriteError::Other(e)) => {
                    // State at the source is undetermined; the cached entries must go.
                    unknowns.extend(to_delete.iter().cloned());
                    accounting.fail_batch(&to_delete, e);
                }
            }
            batch
                .iter()
                .map(|(key, existing)| {
                    if accounting.successes.contains(key) {
                        if existing.is_some() {
                            removed += 1;
                        }
                        remaining.remove(key);
                        (key.clone(), None)
                    } else if unknowns.contains(key) {
                        (key.clone(), None)
                    } else {
                        (key.clone(), existing.clone())
                    }
                })
                .collect_vec()
        });

        if let Err(e) = result {
            return self.inner.resilience.remove_all_failure(&keys, e);
        }

        Metrics::increase_by(&metrics.remove_all, removed);
        if accounting.has_failures() {
            Err(Error::BulkWriting(accounting.into_failure()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        store::StoreError,
        test_utils::{FaultyStore, RecordingListener, RecordingLoaderWriter, SourceOp, StoreFault},
    };

    type TestCache = Cache<u64, u64, RecordingLoaderWriter<u64, u64>>;
    type FaultyCache = Cache<u64, u64, RecordingLoaderWriter<u64, u64>, FaultyStore<u64, u64, MemoryStore<u64, u64>>>;

    fn cache() -> TestCache {
        CacheBuilder::new(RecordingLoaderWriter::default()).build()
    }

    fn faulty_cache() -> FaultyCache {
        CacheBuilder::with_store(FaultyStore::new(MemoryStore::default()), RecordingLoaderWriter::default()).build()
    }

    fn counter(c: &std::sync::atomic::AtomicU64) -> u64 {
        c.load(Ordering::Relaxed)
    }

    #[test]
    fn test_put_then_get_does_not_consult_loader() {
        let cache = cache();
        cache.put(&1, 10).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(10));
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Write(1, 10)]);
        assert_eq!(counter(&cache.metrics().put), 1);
        assert_eq!(counter(&cache.metrics().get_hit), 1);
    }

    #[test]
    fn test_get_miss_with_empty_source() {
        let cache = cache();
        assert_eq!(cache.get(&1).unwrap(), None);
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Load(1)]);
        // A loader miss installs nothing.
        assert!(!cache.store().contains(&1).unwrap());
        assert_eq!(counter(&cache.metrics().get_miss), 1);
    }

    #[test]
    fn test_get_loader_failure() {
        let cache = cache();
        cache.loader_writer().set_fail_loads(true);
        let err = cache.get(&1).unwrap_err();
        assert!(matches!(err, Error::Loading(_)));
        assert_eq!(counter(&cache.metrics().get_failure), 1);
    }

    #[test]
    fn test_put_writer_failure_installs_nothing() {
        let cache = cache();
        cache.loader_writer().set_fail_writes(true);
        let err = cache.put(&1, 10).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));
        assert!(!cache.store().contains(&1).unwrap());
        assert_eq!(counter(&cache.metrics().put_failure), 1);
    }

    #[test]
    fn test_remove_outcomes() {
        let cache = cache();
        cache.put(&1, 10).unwrap();

        cache.remove(&1).unwrap();
        assert_eq!(counter(&cache.metrics().remove_success), 1);
        assert!(!cache.store().contains(&1).unwrap());
        assert!(cache.loader_writer().data().is_empty());

        cache.remove(&2).unwrap();
        assert_eq!(counter(&cache.metrics().remove_noop), 1);
        // The delete still reached the source.
        assert!(cache.loader_writer().ops().contains(&SourceOp::Delete(2)));
    }

    #[test]
    fn test_put_if_absent_installs_and_writes() {
        let cache = cache();
        assert_eq!(cache.put_if_absent(&5, 7).unwrap(), None);
        assert_eq!(cache.store().get(&5).unwrap().unwrap().into_value(), 7);
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Load(5), SourceOp::Write(5, 7)]);
        assert_eq!(counter(&cache.metrics().put), 1);
    }

    #[test]
    fn test_put_if_absent_populates_from_loader_without_write() {
        let cache = cache();
        cache.loader_writer().insert(5, 99);

        assert_eq!(cache.put_if_absent(&5, 7).unwrap(), Some(99));

        assert_eq!(cache.store().get(&5).unwrap().unwrap().into_value(), 99);
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Load(5)]);
        assert_eq!(counter(&cache.metrics().put_noop), 1);
    }

    #[test]
    fn test_put_if_absent_present_in_store() {
        let cache = cache();
        cache.put(&5, 1).unwrap();
        cache.loader_writer().clear_ops();

        assert_eq!(cache.put_if_absent(&5, 7).unwrap(), Some(1));
        assert!(cache.loader_writer().ops().is_empty());
    }

    #[test]
    fn test_put_if_absent_without_loader_in_atomics() {
        let cache: TestCache = CacheBuilder::new(RecordingLoaderWriter::default())
            .with_loader_in_atomics(false)
            .build();
        cache.loader_writer().insert(5, 99);

        assert_eq!(cache.put_if_absent(&5, 7).unwrap(), None);
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Write(5, 7)]);
        assert_eq!(cache.store().get(&5).unwrap().unwrap().into_value(), 7);
    }

    #[test]
    fn test_compare_and_remove() {
        let cache = cache();
        cache.put(&1, 10).unwrap();
        cache.loader_writer().clear_ops();

        assert!(!cache.compare_and_remove(&1, &11).unwrap());
        assert_eq!(counter(&cache.metrics().conditional_remove_failure_key_present), 1);
        assert!(cache.store().contains(&1).unwrap());
        assert!(cache.loader_writer().ops().is_empty());

        assert!(cache.compare_and_remove(&1, &10).unwrap());
        assert_eq!(counter(&cache.metrics().conditional_remove_success), 1);
        assert!(!cache.store().contains(&1).unwrap());
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Delete(1)]);
    }

    #[test]
    fn test_compare_and_remove_missing_key() {
        let cache = cache();
        assert!(!cache.compare_and_remove(&1, &10).unwrap());
        assert_eq!(counter(&cache.metrics().conditional_remove_failure_key_missing), 1);
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_compare_and_remove_mismatch_keeps_loaded_value() {
        let cache = cache();
        cache.loader_writer().insert(1, 42);

        assert!(!cache.compare_and_remove(&1, &10).unwrap());
        // The authoritative value got populated while deciding.
        assert_eq!(cache.store().get(&1).unwrap().unwrap().into_value(), 42);
        assert_eq!(counter(&cache.metrics().conditional_remove_failure_key_present), 1);
    }

    #[test]
    fn test_replace_outcomes() {
        let cache = cache();
        assert_eq!(cache.replace(&1, 20).unwrap(), None);
        assert_eq!(counter(&cache.metrics().replace_miss_not_present), 1);

        cache.put(&1, 10).unwrap();
        assert_eq!(cache.replace(&1, 20).unwrap(), Some(10));
        assert_eq!(counter(&cache.metrics().replace_hit), 1);
        assert_eq!(cache.store().get(&1).unwrap().unwrap().into_value(), 20);
        assert!(cache.loader_writer().ops().contains(&SourceOp::Write(1, 20)));
    }

    #[test]
    fn test_compare_and_replace() {
        let cache = cache();
        cache.put(&1, 10).unwrap();
        cache.loader_writer().clear_ops();

        assert!(!cache.compare_and_replace(&1, &11, 20).unwrap());
        assert_eq!(counter(&cache.metrics().replace_miss_present), 1);
        assert!(cache.loader_writer().ops().is_empty());
        assert_eq!(cache.store().get(&1).unwrap().unwrap().into_value(), 10);

        assert!(cache.compare_and_replace(&1, &10, 20).unwrap());
        assert_eq!(counter(&cache.metrics().replace_hit), 1);
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Write(1, 20)]);
        assert_eq!(cache.store().get(&1).unwrap().unwrap().into_value(), 20);
    }

    #[test]
    fn test_get_and_put() {
        let cache = cache();
        assert_eq!(cache.get_and_put(&1, 10).unwrap(), None);
        assert_eq!(cache.get_and_put(&1, 20).unwrap(), Some(10));
        assert_eq!(cache.store().get(&1).unwrap().unwrap().into_value(), 20);
        assert_eq!(
            cache.loader_writer().ops(),
            vec![SourceOp::Write(1, 10), SourceOp::Write(1, 20)]
        );
    }

    #[test]
    fn test_get_and_remove() {
        let cache = cache();
        cache.put(&1, 10).unwrap();

        assert_eq!(cache.get_and_remove(&1).unwrap(), Some(10));
        assert!(!cache.store().contains(&1).unwrap());
        assert!(cache.loader_writer().ops().contains(&SourceOp::Delete(1)));

        assert_eq!(cache.get_and_remove(&2).unwrap(), None);
        assert_eq!(counter(&cache.metrics().remove_noop), 1);
    }

    #[test]
    fn test_contains_key_never_loads() {
        let cache = cache();
        cache.loader_writer().insert(1, 10);
        assert!(!cache.contains_key(&1).unwrap());
        assert!(cache.loader_writer().ops().is_empty());
    }

    #[test]
    fn test_clear_leaves_source_untouched() {
        let cache = cache();
        cache.put(&1, 10).unwrap();
        cache.clear().unwrap();
        assert!(cache.store().is_empty());
        assert_eq!(cache.loader_writer().data().get(&1), Some(&10));
    }

    #[test]
    fn test_lifecycle_gate() {
        let cache = cache();
        cache.close().unwrap();
        assert_eq!(cache.status(), Status::Closed);
        assert!(matches!(cache.get(&1), Err(Error::Lifecycle(Status::Closed))));
        assert!(matches!(cache.put(&1, 10), Err(Error::Lifecycle(Status::Closed))));
        assert!(matches!(cache.get_all([1]), Err(Error::Lifecycle(Status::Closed))));
        // Closing twice is fine.
        cache.close().unwrap();
    }

    #[test]
    fn test_events() {
        let listener = Arc::new(RecordingListener::default());
        let cache: TestCache = CacheBuilder::new(RecordingLoaderWriter::default())
            .with_event_listener(listener.clone())
            .build();

        cache.put(&1, 10).unwrap();
        cache.put(&1, 20).unwrap();
        cache.remove(&1).unwrap();
        cache.clear().unwrap();

        assert_eq!(
            listener.mutations(),
            vec![
                (Mutation::Created, 1, Some(10)),
                (Mutation::Updated, 1, Some(20)),
                (Mutation::Removed, 1, None),
            ]
        );
        assert_eq!(listener.clears(), 1);
    }

    struct RejectUpdates;

    impl ExpiryPolicy<u64, u64> for RejectUpdates {
        fn expiry_for_update(&self, _: &u64, _: &u64, _: &u64) -> Option<Duration> {
            Some(Duration::ZERO)
        }
    }

    #[test]
    fn test_stillborn_update_installs_absent() {
        let cache: TestCache = CacheBuilder::new(RecordingLoaderWriter::default())
            .with_expiry(RejectUpdates)
            .build();
        cache.put(&1, 10).unwrap();

        assert_eq!(cache.replace(&1, 20).unwrap(), Some(10));
        // The write reached the source but the mapping is gone from the store.
        assert_eq!(cache.loader_writer().data().get(&1), Some(&20));
        assert!(!cache.store().contains(&1).unwrap());
    }

    #[test]
    fn test_put_recovers_from_store_failure() {
        let cache = faulty_cache();
        cache.store().set_fault(StoreFault::Fail);

        cache.put(&1, 100).unwrap();

        // The entry was invalidated and the writer driven exactly once.
        assert!(cache.store().removes() > 0);
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Write(1, 100)]);
        assert_eq!(cache.loader_writer().data().get(&1), Some(&100));
        assert_eq!(counter(&cache.metrics().put_failure), 1);
    }

    #[test]
    fn test_put_store_failure_after_writer_is_at_least_once() {
        let cache = faulty_cache();
        cache.store().set_fault(StoreFault::FailAfterClosure);

        cache.put(&1, 100).unwrap();

        // The closure wrote, then the store failed, then recovery wrote again.
        assert_eq!(
            cache.loader_writer().ops(),
            vec![SourceOp::Write(1, 100), SourceOp::Write(1, 100)]
        );
    }

    #[test]
    fn test_store_failure_with_known_writer_cause_skips_rewrite() {
        let cache = faulty_cache();
        cache.store().set_fault(StoreFault::FailAfterClosure);
        cache.loader_writer().set_fail_writes(true);

        let err = cache.put(&1, 100).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));

        // The recorded failure is translated; the writer is not driven a second time.
        assert_eq!(cache.loader_writer().ops(), vec![SourceOp::Write(1, 100)]);
    }

    #[test]
    fn test_get_store_failure_falls_back_to_loader() {
        let cache = faulty_cache();
        cache.loader_writer().insert(3, 33);
        cache.store().set_fault(StoreFault::Fail);

        assert_eq!(cache.get(&3).unwrap(), Some(33));
        assert_eq!(counter(&cache.metrics().get_failure), 1);
    }

    #[test]
    fn test_rethrowing_store_failure_surfaces() {
        let cache = faulty_cache();
        cache.store().set_fault(StoreFault::Rethrow);

        let err = cache.get(&1).unwrap_err();
        assert!(matches!(err, Error::Rethrown(_)));
    }

    #[test]
    fn test_custom_resilience_is_injectable() {
        struct GiveUp;

        impl ResilienceStrategy<u64, u64> for GiveUp {
            fn get_failure(&self, _: &u64, e: StoreError, _: Option<SourceError>) -> Result<Option<u64>, Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn contains_key_failure(&self, _: &u64, e: StoreError) -> Result<bool, Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn put_failure(&self, _: &u64, _: &u64, e: StoreError, _: Option<SourceError>) -> Result<(), Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn remove_failure(&self, _: &u64, e: StoreError, _: Option<SourceError>) -> Result<(), Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn clear_failure(&self, e: StoreError) -> Result<(), Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn put_if_absent_failure(
                &self,
                _: &u64,
                _: &u64,
                e: StoreError,
                _: Option<SourceError>,
            ) -> Result<Option<u64>, Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn conditional_remove_failure(
                &self,
                _: &u64,
                _: &u64,
                e: StoreError,
                _: Option<SourceError>,
            ) -> Result<bool, Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn replace_failure(
                &self,
                _: &u64,
                _: &u64,
                e: StoreError,
                _: Option<SourceError>,
            ) -> Result<Option<u64>, Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn conditional_replace_failure(
                &self,
                _: &u64,
                _: &u64,
                _: &u64,
                e: StoreError,
                _: Option<SourceError>,
            ) -> Result<bool, Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn get_all_failure(&self, _: &[u64], e: StoreError) -> Result<HashMap<u64, Option<u64>>, Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn put_all_failure(&self, _: &HashMap<u64, u64>, e: StoreError) -> Result<(), Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
            fn remove_all_failure(&self, _: &[u64], e: StoreError) -> Result<(), Error<u64, u64>> {
                Err(Error::Rethrown(e.into_cause()))
            }
        }

        let cache: FaultyCache =
            CacheBuilder::with_store(FaultyStore::new(MemoryStore::default()), RecordingLoaderWriter::default())
                .with_resilience(Arc::new(GiveUp))
                .build();
        cache.store().set_fault(StoreFault::Fail);

        assert!(matches!(cache.put(&1, 1), Err(Error::Rethrown(_))));
        assert!(cache.loader_writer().ops().is_empty());
    }
}

