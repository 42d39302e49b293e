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

use std::{collections::HashMap, fmt::Debug, hash::Hash};

use equivalent::Equivalent;
use itertools::Itertools;
use parking_lot::RwLock;
use veneer_common::code::{DefaultHashBuilder, HashBuilder, Key, Value};

use crate::store::{Compute, ComputeError, SourceError, Store, StoreError, ValueHolder};

/// Configuration for [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryStoreConfig<S = DefaultHashBuilder>
where
    S: HashBuilder,
{
    /// Number of shards. More shards, less contention.
    pub shards: usize,
    /// Hash builder for shard selection.
    pub hash_builder: S,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            shards: 8,
            hash_builder: DefaultHashBuilder::default(),
        }
    }
}

/// A sharded in-memory [`Store`].
///
/// Per-key atomicity comes from the shard lock: a compute closure runs on the calling thread
/// while its shard is write-locked, so closures for one key are linearized. The loader/writer
/// may block inside a closure; contention is bounded by the shard count. No eviction, no
/// capacity: this store holds what the engine installs until it is removed.
pub struct MemoryStore<K, V, S = DefaultHashBuilder>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    shards: Vec<RwLock<hashbrown::HashMap<K, ValueHolder<V>>>>,
    hash_builder: S,
}

impl<K, V, S> Debug for MemoryStore<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("shards", &self.shards.len()).finish()
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Key,
    V: Value,
{
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl<K, V, S> MemoryStore<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Create a store with the given config.
    pub fn new(config: MemoryStoreConfig<S>) -> Self {
        assert!(config.shards > 0, "shards must be greater than zero.");
        Self {
            shards: (0..config.shards).map(|_| RwLock::new(hashbrown::HashMap::new())).collect_vec(),
            hash_builder: config.hash_builder,
        }
    }

    /// Number of mappings currently held.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Whether the store holds no mapping.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        self.hash_builder.hash_one(key) as usize % self.shards.len()
    }

    /// Group the deduplicated input keys per shard, preserving input order within each group.
    fn shard_groups(&self, keys: &[K]) -> Vec<Vec<K>> {
        let mut groups = vec![vec![]; self.shards.len()];
        let mut seen = hashbrown::HashSet::with_capacity(keys.len());
        for key in keys {
            if seen.insert(key) {
                groups[self.shard(key)].push(key.clone());
            }
        }
        groups
    }
}

impl<K, V, S> Store<K, V> for MemoryStore<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn compute<F>(&self, key: &K, mut f: F) -> Result<Option<ValueHolder<V>>, ComputeError>
    where
        F: FnMut(&K, Option<&V>) -> Result<Compute<V>, SourceError>,
    {
        let mut shard = self.shards[self.shard(key)].write();
        let current = shard.get(key).cloned();
        let decision = f(key, current.as_ref().map(|holder| holder.value())).map_err(ComputeError::Source)?;
        match decision {
            Compute::Put(value) => {
                let holder = ValueHolder::new(value);
                shard.insert(key.clone(), holder.clone());
                Ok(Some(holder))
            }
            Compute::Remove => {
                shard.remove(key);
                Ok(None)
            }
            Compute::Retain => Ok(current),
        }
    }

    fn compute_if_absent<F>(&self, key: &K, mut f: F) -> Result<Option<ValueHolder<V>>, ComputeError>
    where
        F: FnMut(&K) -> Result<Option<V>, SourceError>,
    {
        let mut shard = self.shards[self.shard(key)].write();
        if let Some(holder) = shard.get(key) {
            return Ok(Some(holder.clone()));
        }
        match f(key).map_err(ComputeError::Source)? {
            Some(value) => {
                let holder = ValueHolder::new(value);
                shard.insert(key.clone(), holder.clone());
                Ok(Some(holder))
            }
            None => Ok(None),
        }
    }

    fn bulk_compute<F>(&self, keys: &[K], mut f: F) -> Result<HashMap<K, Option<ValueHolder<V>>>, StoreError>
    where
        F: FnMut(&[(K, Option<V>)]) -> Vec<(K, Option<V>)>,
    {
        let mut result = HashMap::with_capacity(keys.len());
        for (index, group) in self.shard_groups(keys).into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let mut shard = self.shards[index].write();
            let batch = group
                .iter()
                .map(|key| (key.clone(), shard.get(key).map(|holder| holder.value().clone())))
                .collect_vec();
            for (key, replacement) in f(&batch) {
                match replacement {
                    Some(value) => {
                        let holder = ValueHolder::new(value);
                        shard.insert(key.clone(), holder.clone());
                        result.insert(key, Some(holder));
                    }
                    None => {
                        shard.remove(&key);
                        result.insert(key, None);
                    }
                }
            }
            // Keys the closure left uncovered keep their current state.
            for (key, _) in batch {
                if !result.contains_key(&key) {
                    let current = shard.get(&key).cloned();
                    result.insert(key, current);
                }
            }
        }
        Ok(result)
    }

    fn bulk_compute_if_absent<F>(&self, keys: &[K], mut f: F) -> Result<HashMap<K, Option<ValueHolder<V>>>, StoreError>
    where
        F: FnMut(&[K]) -> Vec<(K, Option<V>)>,
    {
        let mut result = HashMap::with_capacity(keys.len());
        for (index, group) in self.shard_groups(keys).into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let mut shard = self.shards[index].write();
            let mut absent = vec![];
            for key in group {
                match shard.get(&key) {
                    Some(holder) => {
                        result.insert(key, Some(holder.clone()));
                    }
                    None => absent.push(key),
                }
            }
            if absent.is_empty() {
                continue;
            }
            for (key, replacement) in f(&absent) {
                match replacement {
                    Some(value) => {
                        let holder = ValueHolder::new(value);
                        shard.insert(key.clone(), holder.clone());
                        result.insert(key, Some(holder));
                    }
                    None => {
                        result.insert(key, None);
                    }
                }
            }
            for key in absent {
                if !result.contains_key(&key) {
                    result.insert(key, None);
                }
            }
        }
        Ok(result)
    }

    fn get<Q>(&self, key: &Q) -> Result<Option<ValueHolder<V>>, StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let shard = self.shards[self.shard(key)].read();
        Ok(shard.get(key).cloned())
    }

    fn contains<Q>(&self, key: &Q) -> Result<bool, StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let shard = self.shards[self.shard(key)].read();
        Ok(shard.contains_key(key))
    }

    fn remove<Q>(&self, key: &Q) -> Result<(), StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.shards[self.shard(key)].write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for shard in self.shards.iter() {
            shard.write().clear();
        }
        Ok(())
    }
}
