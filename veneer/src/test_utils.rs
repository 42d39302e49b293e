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

//! Utilities for testing.

use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    marker::PhantomData,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use equivalent::Equivalent;
use parking_lot::Mutex;
use veneer_common::{
    code::{Key, Value},
    event::{EventListener, Mutation},
};

use crate::{
    loader_writer::{BulkLoadError, BulkWriteError, LoaderWriter},
    store::{Compute, ComputeError, SourceError, Store, StoreError, ValueHolder},
};

/// One recorded loader/writer invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOp<K, V> {
    /// `load` was called.
    Load(K),
    /// `load_all` was called.
    LoadAll(Vec<K>),
    /// `write` was called.
    Write(K, V),
    /// `write_all` was called.
    WriteAll(Vec<(K, V)>),
    /// `delete` was called.
    Delete(K),
    /// `delete_all` was called.
    DeleteAll(Vec<K>),
}

/// A map-backed [`LoaderWriter`] that records every invocation and fails on demand.
#[derive(Debug)]
pub struct RecordingLoaderWriter<K, V>
where
    K: Key,
    V: Value,
{
    data: Mutex<HashMap<K, V>>,
    ops: Mutex<Vec<SourceOp<K, V>>>,
    fail_loads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    next_load_all_error: Mutex<Option<BulkLoadError<K, V>>>,
    next_write_all_error: Mutex<Option<BulkWriteError<K>>>,
    next_delete_all_error: Mutex<Option<BulkWriteError<K>>>,
}

impl<K, V> Default for RecordingLoaderWriter<K, V>
where
    K: Key,
    V: Value,
{
    fn default() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            fail_loads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            next_load_all_error: Mutex::new(None),
            next_write_all_error: Mutex::new(None),
            next_delete_all_error: Mutex::new(None),
        }
    }
}

impl<K, V> RecordingLoaderWriter<K, V>
where
    K: Key,
    V: Value,
{
    /// Seed the backing map.
    pub fn insert(&self, key: K, value: V) {
        self.data.lock().insert(key, value);
    }

    /// Snapshot of the backing map.
    pub fn data(&self) -> HashMap<K, V> {
        self.data.lock().clone()
    }

    /// Snapshot of the recorded invocations, in order.
    pub fn ops(&self) -> Vec<SourceOp<K, V>> {
        self.ops.lock().clone()
    }

    /// Forget the recorded invocations.
    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    /// Make every `load`/`load_all` fail.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make every `write`/`write_all` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every `delete`/`delete_all` fail.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Script the next `load_all` to fail with the given error.
    pub fn fail_next_load_all(&self, error: BulkLoadError<K, V>) {
        *self.next_load_all_error.lock() = Some(error);
    }

    /// Script the next `write_all` to fail with the given error.
    ///
    /// For a partial failure, the succeeded keys still land in the backing map.
    pub fn fail_next_write_all(&self, error: BulkWriteError<K>) {
        *self.next_write_all_error.lock() = Some(error);
    }

    /// Script the next `delete_all` to fail with the given error.
    ///
    /// For a partial failure, the succeeded keys are still deleted from the backing map.
    pub fn fail_next_delete_all(&self, error: BulkWriteError<K>) {
        *self.next_delete_all_error.lock() = Some(error);
    }

    fn record(&self, op: SourceOp<K, V>) {
        self.ops.lock().push(op);
    }
}

impl<K, V> LoaderWriter<K, V> for RecordingLoaderWriter<K, V>
where
    K: Key,
    V: Value,
{
    fn load(&self, key: &K) -> anyhow::Result<Option<V>> {
        self.record(SourceOp::Load(key.clone()));
        if self.fail_loads.load(Ordering::SeqCst) {
            anyhow::bail!("injected load failure");
        }
        Ok(self.data.lock().get(key).cloned())
    }

    fn load_all(&self, keys: &[K]) -> Result<HashMap<K, Option<V>>, BulkLoadError<K, V>> {
        self.record(SourceOp::LoadAll(keys.to_vec()));
        if let Some(error) = self.next_load_all_error.lock().take() {
            return Err(error);
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(BulkLoadError::Other(anyhow::anyhow!("injected load failure")));
        }
        let data = self.data.lock();
        Ok(keys.iter().map(|k| (k.clone(), data.get(k).cloned())).collect())
    }

    fn write(&self, key: &K, value: &V) -> anyhow::Result<()> {
        self.record(SourceOp::Write(key.clone(), value.clone()));
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("injected write failure");
        }
        self.data.lock().insert(key.clone(), value.clone());
        Ok(())
    }

    fn write_all(&self, entries: &[(K, V)]) -> Result<(), BulkWriteError<K>> {
        self.record(SourceOp::WriteAll(entries.to_vec()));
        if let Some(error) = self.next_write_all_error.lock().take() {
            if let BulkWriteError::Partial(failure) = &error {
                let mut data = self.data.lock();
                for (key, value) in entries {
                    if failure.successes.contains(key) {
                        data.insert(key.clone(), value.clone());
                    }
                }
            }
            return Err(error);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BulkWriteError::Other(anyhow::anyhow!("injected write failure")));
        }
        let mut data = self.data.lock();
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, key: &K) -> anyhow::Result<()> {
        self.record(SourceOp::Delete(key.clone()));
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("injected delete failure");
        }
        self.data.lock().remove(key);
        Ok(())
    }

    fn delete_all(&self, keys: &[K]) -> Result<(), BulkWriteError<K>> {
        self.record(SourceOp::DeleteAll(keys.to_vec()));
        if let Some(error) = self.next_delete_all_error.lock().take() {
            if let BulkWriteError::Partial(failure) = &error {
                let mut data = self.data.lock();
                for key in keys {
                    if failure.successes.contains(key) {
                        data.remove(key);
                    }
                }
            }
            return Err(error);
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BulkWriteError::Other(anyhow::anyhow!("injected delete failure")));
        }
        let mut data = self.data.lock();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }
}

/// Failure mode of a [`FaultyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFault {
    /// Delegate everything.
    #[default]
    None,
    /// Fail compute calls before the closure runs.
    Fail,
    /// Run the compute closure against the current mapping, skip the install, then fail.
    ///
    /// Simulates a store that broke mid-operation, after the loader/writer side effects.
    FailAfterClosure,
    /// Fail compute calls with a rethrowing diagnostic error.
    Rethrow,
}

fn injected() -> StoreError {
    StoreError::new(anyhow::anyhow!("injected store failure"))
}

/// A [`Store`] wrapper that trips injected failures per operation family.
#[derive(Debug)]
pub struct FaultyStore<K, V, S>
where
    K: Key,
    V: Value,
    S: Store<K, V>,
{
    inner: S,
    fault: Mutex<StoreFault>,
    fail_reads: AtomicBool,
    fail_removes: AtomicBool,
    fail_clear: AtomicBool,
    removes: AtomicUsize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, S> FaultyStore<K, V, S>
where
    K: Key,
    V: Value,
    S: Store<K, V>,
{
    /// Wrap a store.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fault: Mutex::new(StoreFault::None),
            fail_reads: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            fail_clear: AtomicBool::new(false),
            removes: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    /// The wrapped store, for direct inspection.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Set the compute failure mode. Bulk computes fail before running the closure in every
    /// non-[`StoreFault::None`] mode.
    pub fn set_fault(&self, fault: StoreFault) {
        *self.fault.lock() = fault;
    }

    /// Make `get`/`contains` fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `remove` fail, to exercise swallowed invalidation failures.
    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Make `clear` fail.
    pub fn set_fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }

    /// Number of `remove` calls seen, including failed ones.
    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    fn compute_fault(&self) -> StoreFault {
        *self.fault.lock()
    }
}

impl<K, V, S> Store<K, V> for FaultyStore<K, V, S>
where
    K: Key,
    V: Value,
    S: Store<K, V>,
{
    fn compute<F>(&self, key: &K, mut f: F) -> Result<Option<ValueHolder<V>>, ComputeError>
    where
        F: FnMut(&K, Option<&V>) -> Result<Compute<V>, SourceError>,
    {
        match self.compute_fault() {
            StoreFault::None => self.inner.compute(key, f),
            StoreFault::Fail => Err(injected().into()),
            StoreFault::FailAfterClosure => {
                let current = self.inner.get(key)?;
                let _ = f(key, current.as_ref().map(|holder| holder.value()));
                Err(injected().into())
            }
            StoreFault::Rethrow => Err(ComputeError::Store(StoreError::rethrowing(anyhow::anyhow!(
                "injected rethrowing store failure"
            )))),
        }
    }

    fn compute_if_absent<F>(&self, key: &K, mut f: F) -> Result<Option<ValueHolder<V>>, ComputeError>
    where
        F: FnMut(&K) -> Result<Option<V>, SourceError>,
    {
        match self.compute_fault() {
            StoreFault::None => self.inner.compute_if_absent(key, f),
            StoreFault::Fail => Err(injected().into()),
            StoreFault::FailAfterClosure => {
                if self.inner.get(key)?.is_none() {
                    let _ = f(key);
                }
                Err(injected().into())
            }
            StoreFault::Rethrow => Err(ComputeError::Store(StoreError::rethrowing(anyhow::anyhow!(
                "injected rethrowing store failure"
            )))),
        }
    }

    fn bulk_compute<F>(&self, keys: &[K], f: F) -> Result<HashMap<K, Option<ValueHolder<V>>>, StoreError>
    where
        F: FnMut(&[(K, Option<V>)]) -> Vec<(K, Option<V>)>,
    {
        match self.compute_fault() {
            StoreFault::None => self.inner.bulk_compute(keys, f),
            StoreFault::Rethrow => Err(StoreError::rethrowing(anyhow::anyhow!(
                "injected rethrowing store failure"
            ))),
            _ => Err(injected()),
        }
    }

    fn bulk_compute_if_absent<F>(&self, keys: &[K], f: F) -> Result<HashMap<K, Option<ValueHolder<V>>>, StoreError>
    where
        F: FnMut(&[K]) -> Vec<(K, Option<V>)>,
    {
        match self.compute_fault() {
            StoreFault::None => self.inner.bulk_compute_if_absent(keys, f),
            StoreFault::Rethrow => Err(StoreError::rethrowing(anyhow::anyhow!(
                "injected rethrowing store failure"
            ))),
            _ => Err(injected()),
        }
    }

    fn get<Q>(&self, key: &Q) -> Result<Option<ValueHolder<V>>, StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.get(key)
    }

    fn contains<Q>(&self, key: &Q) -> Result<bool, StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.contains(key)
    }

    fn remove<Q>(&self, key: &Q) -> Result<(), StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.clear()
    }
}

/// An [`EventListener`] that records every mutation.
#[derive(Debug)]
pub struct RecordingListener<K, V>
where
    K: Key,
    V: Value,
{
    mutations: Mutex<Vec<(Mutation, K, Option<V>)>>,
    clears: AtomicUsize,
}

impl<K, V> Default for RecordingListener<K, V>
where
    K: Key,
    V: Value,
{
    fn default() -> Self {
        Self {
            mutations: Mutex::new(Vec::new()),
            clears: AtomicUsize::new(0),
        }
    }
}

impl<K, V> RecordingListener<K, V>
where
    K: Key,
    V: Value,
{
    /// Snapshot of the recorded mutations, in order.
    pub fn mutations(&self) -> Vec<(Mutation, K, Option<V>)> {
        self.mutations.lock().clone()
    }

    /// Number of clears seen.
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl<K, V> EventListener for RecordingListener<K, V>
where
    K: Key,
    V: Value,
{
    type Key = K;
    type Value = V;

    fn on_mutation(&self, mutation: Mutation, key: &K, value: Option<&V>) {
        self.mutations.lock().push((mutation, key.clone(), value.cloned()));
    }

    fn on_clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}
