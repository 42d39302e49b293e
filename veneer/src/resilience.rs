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

//! Recovery path for operations that hit a store failure.
//!
//! The store is only a cache of the loader/writer, so when the store itself fails the strategy
//! can still satisfy the caller from the source of truth. Every entry point first invalidates
//! the possibly inconsistent cached entry, then performs the operation the caller intended
//! directly against the loader/writer.

use std::{collections::HashMap, marker::PhantomData, sync::Arc};

use veneer_common::code::{Key, Value};

use crate::{
    error::{cause, Error},
    loader_writer::{BulkLoadError, BulkWriteError, LoaderWriter},
    store::{SourceError, Store, StoreError},
};

/// Strategy invoked when the store raises an access failure.
///
/// `known` carries the proximate loader/writer failure when the engine's per-call record
/// captured one before the store failed; the strategy then translates it directly instead of
/// driving the loader/writer again.
pub trait ResilienceStrategy<K, V>: Send + Sync + 'static
where
    K: Key,
    V: Value,
{
    /// Diagnostic escape hatch: a rethrowing store failure surfaces its cause instead of being
    /// recovered.
    fn filter(&self, error: &StoreError) -> Result<(), Error<K, V>> {
        if error.is_rethrowing() {
            Err(Error::Rethrown(error.cause().clone()))
        } else {
            Ok(())
        }
    }

    /// Recover a failed `get`.
    fn get_failure(&self, key: &K, error: StoreError, known: Option<SourceError>) -> Result<Option<V>, Error<K, V>>;

    /// Recover a failed `contains_key`.
    fn contains_key_failure(&self, key: &K, error: StoreError) -> Result<bool, Error<K, V>>;

    /// Recover a failed `put`.
    fn put_failure(
        &self,
        key: &K,
        value: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<(), Error<K, V>>;

    /// Recover a failed `remove`.
    fn remove_failure(&self, key: &K, error: StoreError, known: Option<SourceError>) -> Result<(), Error<K, V>>;

    /// Recover a failed `clear`.
    fn clear_failure(&self, error: StoreError) -> Result<(), Error<K, V>>;

    /// Recover a failed `put_if_absent`.
    fn put_if_absent_failure(
        &self,
        key: &K,
        value: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<Option<V>, Error<K, V>>;

    /// Recover a failed conditional `remove(key, expected)`.
    fn conditional_remove_failure(
        &self,
        key: &K,
        expected: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<bool, Error<K, V>>;

    /// Recover a failed `replace(key, value)`.
    fn replace_failure(
        &self,
        key: &K,
        value: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<Option<V>, Error<K, V>>;

    /// Recover a failed conditional `replace(key, old, new)`.
    fn conditional_replace_failure(
        &self,
        key: &K,
        old: &V,
        new: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<bool, Error<K, V>>;

    /// Recover a failed `get_all`.
    fn get_all_failure(&self, keys: &[K], error: StoreError) -> Result<HashMap<K, Option<V>>, Error<K, V>>;

    /// Recover a failed `put_all`.
    fn put_all_failure(&self, entries: &HashMap<K, V>, error: StoreError) -> Result<(), Error<K, V>>;

    /// Recover a failed `remove_all`.
    fn remove_all_failure(&self, keys: &[K], error: StoreError) -> Result<(), Error<K, V>>;
}

/// The default strategy: treat the loader/writer as authoritative and keep going.
///
/// Holds non-owning handles to the same store and loader/writer the engine uses.
pub struct RobustResilience<K, V, S, L>
where
    K: Key,
    V: Value,
    S: Store<K, V>,
    L: LoaderWriter<K, V>,
{
    store: Arc<S>,
    loader_writer: Arc<L>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, S, L> RobustResilience<K, V, S, L>
where
    K: Key,
    V: Value,
    S: Store<K, V>,
    L: LoaderWriter<K, V>,
{
    /// Create a strategy over the given collaborators.
    pub fn new(store: Arc<S>, loader_writer: Arc<L>) -> Self {
        Self {
            store,
            loader_writer,
            _marker: PhantomData,
        }
    }

    /// Best-effort invalidation of a possibly inconsistent cached entry.
    ///
    /// Invalidation failures are swallowed: the entry may be stale afterwards, which is exactly
    /// the state the caller was already in.
    fn invalidate(&self, key: &K) {
        if let Err(e) = self.store.remove(key) {
            tracing::debug!(?key, "swallowing invalidation failure: {e}");
        }
    }

    fn recover(&self, op: &'static str, error: &StoreError) -> Result<(), Error<K, V>> {
        self.filter(error)?;
        tracing::warn!(op, "recovering from store failure via loader/writer: {error}");
        Ok(())
    }

    fn load(&self, key: &K) -> Result<Option<V>, Error<K, V>> {
        self.loader_writer.load(key).map_err(|e| Error::Loading(cause(e)))
    }

    fn write(&self, key: &K, value: &V) -> Result<(), Error<K, V>> {
        self.loader_writer.write(key, value).map_err(|e| Error::Writing(cause(e)))
    }

    fn delete(&self, key: &K) -> Result<(), Error<K, V>> {
        self.loader_writer.delete(key).map_err(|e| Error::Writing(cause(e)))
    }
}

impl<K, V, S, L> ResilienceStrategy<K, V> for RobustResilience<K, V, S, L>
where
    K: Key,
    V: Value,
    S: Store<K, V>,
    L: LoaderWriter<K, V>,
{
    fn get_failure(&self, key: &K, error: StoreError, known: Option<SourceError>) -> Result<Option<V>, Error<K, V>> {
        self.recover("get", &error)?;
        self.invalidate(key);
        if let Some(source) = known {
            return Err(source.into());
        }
        self.load(key)
    }

    fn contains_key_failure(&self, key: &K, error: StoreError) -> Result<bool, Error<K, V>> {
        self.recover("contains_key", &error)?;
        self.invalidate(key);
        Ok(false)
    }

    fn put_failure(
        &self,
        key: &K,
        value: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<(), Error<K, V>> {
        self.recover("put", &error)?;
        self.invalidate(key);
        if let Some(source) = known {
            return Err(source.into());
        }
        self.write(key, value)
    }

    fn remove_failure(&self, key: &K, error: StoreError, known: Option<SourceError>) -> Result<(), Error<K, V>> {
        self.recover("remove", &error)?;
        self.invalidate(key);
        if let Some(source) = known {
            return Err(source.into());
        }
        self.delete(key)
    }

    fn clear_failure(&self, error: StoreError) -> Result<(), Error<K, V>> {
        self.recover("clear", &error)?;
        if let Err(e) = self.store.clear() {
            tracing::debug!("swallowing clear invalidation failure: {e}");
        }
        Ok(())
    }

    fn put_if_absent_failure(
        &self,
        key: &K,
        value: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<Option<V>, Error<K, V>> {
        self.recover("put_if_absent", &error)?;
        self.invalidate(key);
        if let Some(source) = known {
            return Err(source.into());
        }
        match self.load(key)? {
            Some(loaded) => Ok(Some(loaded)),
            None => {
                self.write(key, value)?;
                Ok(None)
            }
        }
    }

    fn conditional_remove_failure(
        &self,
        key: &K,
        expected: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<bool, Error<K, V>> {
        self.recover("remove(key, expected)", &error)?;
        self.invalidate(key);
        if let Some(source) = known {
            return Err(source.into());
        }
        match self.load(key)? {
            Some(loaded) if loaded == *expected => {
                self.delete(key)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn replace_failure(
        &self,
        key: &K,
        value: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<Option<V>, Error<K, V>> {
        self.recover("replace", &error)?;
        self.invalidate(key);
        if let Some(source) = known {
            return Err(source.into());
        }
        match self.load(key)? {
            Some(old) => {
                self.write(key, value)?;
                Ok(Some(old))
            }
            None => Ok(None),
        }
    }

    fn conditional_replace_failure(
        &self,
        key: &K,
        old: &V,
        new: &V,
        error: StoreError,
        known: Option<SourceError>,
    ) -> Result<bool, Error<K, V>> {
        self.recover("replace(key, old, new)", &error)?;
        self.invalidate(key);
        if let Some(source) = known {
            return Err(source.into());
        }
        match self.load(key)? {
            Some(loaded) if loaded == *old => {
                self.write(key, new)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get_all_failure(&self, keys: &[K], error: StoreError) -> Result<HashMap<K, Option<V>>, Error<K, V>> {
        self.recover("get_all", &error)?;
        for key in keys {
            self.invalidate(key);
        }
        match self.loader_writer.load_all(keys) {
            Ok(loaded) => Ok(loaded),
            // Structured bulk outcomes pass through unchanged.
            Err(BulkLoadError::Partial(failure)) => Err(Error::BulkLoading(failure)),
            Err(BulkLoadError::Other(e)) => Err(Error::Loading(cause(e))),
        }
    }

    fn put_all_failure(&self, entries: &HashMap<K, V>, error: StoreError) -> Result<(), Error<K, V>> {
        self.recover("put_all", &error)?;
        for key in entries.keys() {
            self.invalidate(key);
        }
        let batch = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>();
        match self.loader_writer.write_all(&batch) {
            Ok(()) => Ok(()),
            Err(BulkWriteError::Partial(failure)) => Err(Error::BulkWriting(failure)),
            Err(BulkWriteError::Other(e)) => Err(Error::Writing(cause(e))),
        }
    }

    fn remove_all_failure(&self, keys: &[K], error: StoreError) -> Result<(), Error<K, V>> {
        self.recover("remove_all", &error)?;
        for key in keys {
            self.invalidate(key);
        }
        match self.loader_writer.delete_all(keys) {
            Ok(()) => Ok(()),
            Err(BulkWriteError::Partial(failure)) => Err(Error::BulkWriting(failure)),
            Err(BulkWriteError::Other(e)) => Err(Error::Writing(cause(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashSet;

    use super::*;
    use crate::{
        error::{BulkLoadFailure, BulkWriteFailure},
        store::{Compute, MemoryStore},
        test_utils::{RecordingLoaderWriter, SourceOp},
    };

    type Strategy = RobustResilience<u64, u64, MemoryStore<u64, u64>, RecordingLoaderWriter<u64, u64>>;

    fn fixture() -> (Arc<MemoryStore<u64, u64>>, Arc<RecordingLoaderWriter<u64, u64>>, Strategy) {
        let store = Arc::new(MemoryStore::default());
        let loader_writer = Arc::new(RecordingLoaderWriter::default());
        let strategy = RobustResilience::new(store.clone(), loader_writer.clone());
        (store, loader_writer, strategy)
    }

    fn seed_store(store: &MemoryStore<u64, u64>, key: u64, value: u64) {
        store.compute(&key, |_, _| Ok(Compute::Put(value))).unwrap();
    }

    fn access_error() -> StoreError {
        StoreError::new(anyhow::anyhow!("the failure"))
    }

    #[test]
    fn test_get_failure() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);
        lw.insert(1, 1);

        assert_eq!(strategy.get_failure(&1, access_error(), None).unwrap(), Some(1));

        assert!(!store.contains(&1).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_get_failure_failed_loader() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);
        lw.set_fail_loads(true);

        let err = strategy.get_failure(&1, access_error(), None).unwrap_err();
        assert!(matches!(err, Error::Loading(_)));

        assert!(!store.contains(&1).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_get_failure_known_cause_skips_loader() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);

        let known = SourceError::loading(anyhow::anyhow!("load blew up"));
        let err = strategy.get_failure(&1, access_error(), Some(known)).unwrap_err();
        assert!(matches!(err, Error::Loading(_)));
        assert_eq!(err.cause().unwrap().to_string(), "load blew up");

        assert!(!store.contains(&1).unwrap());
        assert!(lw.ops().is_empty());
    }

    #[test]
    fn test_contains_key_failure() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);

        assert!(!strategy.contains_key_failure(&1, access_error()).unwrap());

        assert!(!store.contains(&1).unwrap());
        assert!(lw.ops().is_empty());
    }

    #[test]
    fn test_put_failure() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);

        strategy.put_failure(&1, &1, access_error(), None).unwrap();

        assert!(!store.contains(&1).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Write(1, 1)]);
        assert_eq!(lw.data().get(&1), Some(&1));
    }

    #[test]
    fn test_put_failure_failed_writer() {
        let (store, lw, strategy) = fixture();
        lw.set_fail_writes(true);

        let err = strategy.put_failure(&1, &1, access_error(), None).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));
        assert_eq!(lw.ops(), vec![SourceOp::Write(1, 1)]);
    }

    #[test]
    fn test_put_failure_known_cause_skips_writer() {
        let (_, lw, strategy) = fixture();

        let known = SourceError::writing(anyhow::anyhow!("write blew up"));
        let err = strategy.put_failure(&1, &1, access_error(), Some(known)).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));
        assert!(lw.ops().is_empty());
    }

    #[test]
    fn test_remove_failure() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);
        lw.insert(1, 1);

        strategy.remove_failure(&1, access_error(), None).unwrap();

        assert!(!store.contains(&1).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Delete(1)]);
        assert!(lw.data().is_empty());
    }

    #[test]
    fn test_remove_failure_failed_writer() {
        let (_, lw, strategy) = fixture();
        lw.set_fail_deletes(true);

        let err = strategy.remove_failure(&1, access_error(), None).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));
        assert_eq!(lw.ops(), vec![SourceOp::Delete(1)]);
    }

    #[test]
    fn test_clear_failure() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);
        seed_store(&store, 2, 98);

        strategy.clear_failure(access_error()).unwrap();

        assert!(store.is_empty());
        assert!(lw.ops().is_empty());
    }

    #[test]
    fn test_put_if_absent_failure_found() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);
        lw.insert(1, 1);

        assert_eq!(strategy.put_if_absent_failure(&1, &2, access_error(), None).unwrap(), Some(1));

        assert!(!store.contains(&1).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_put_if_absent_failure_not_found() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);

        assert_eq!(strategy.put_if_absent_failure(&1, &1, access_error(), None).unwrap(), None);

        assert!(!store.contains(&1).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1), SourceOp::Write(1, 1)]);
        assert_eq!(lw.data().get(&1), Some(&1));
    }

    #[test]
    fn test_put_if_absent_failure_load_fails() {
        let (_, lw, strategy) = fixture();
        lw.set_fail_loads(true);

        let err = strategy.put_if_absent_failure(&1, &1, access_error(), None).unwrap_err();
        assert!(matches!(err, Error::Loading(_)));
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_put_if_absent_failure_write_fails() {
        let (_, lw, strategy) = fixture();
        lw.set_fail_writes(true);

        let err = strategy.put_if_absent_failure(&1, &1, access_error(), None).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));
        assert_eq!(lw.ops(), vec![SourceOp::Load(1), SourceOp::Write(1, 1)]);
    }

    #[test]
    fn test_conditional_remove_failure_not_found() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);

        assert!(!strategy.conditional_remove_failure(&1, &1, access_error(), None).unwrap());

        assert!(!store.contains(&1).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_conditional_remove_failure_found_not_equals() {
        let (_, lw, strategy) = fixture();
        lw.insert(1, 2);

        assert!(!strategy.conditional_remove_failure(&1, &1, access_error(), None).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
        assert_eq!(lw.data().get(&1), Some(&2));
    }

    #[test]
    fn test_conditional_remove_failure_found_equals() {
        let (_, lw, strategy) = fixture();
        lw.insert(1, 1);

        assert!(strategy.conditional_remove_failure(&1, &1, access_error(), None).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1), SourceOp::Delete(1)]);
        assert!(lw.data().is_empty());
    }

    #[test]
    fn test_conditional_remove_failure_load_fails() {
        let (_, lw, strategy) = fixture();
        lw.set_fail_loads(true);

        let err = strategy.conditional_remove_failure(&1, &1, access_error(), None).unwrap_err();
        assert!(matches!(err, Error::Loading(_)));
    }

    #[test]
    fn test_conditional_remove_failure_delete_fails() {
        let (_, lw, strategy) = fixture();
        lw.insert(1, 1);
        lw.set_fail_deletes(true);

        let err = strategy.conditional_remove_failure(&1, &1, access_error(), None).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));
        assert_eq!(lw.ops(), vec![SourceOp::Load(1), SourceOp::Delete(1)]);
    }

    #[test]
    fn test_replace_failure_not_found() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);

        assert_eq!(strategy.replace_failure(&1, &1, access_error(), None).unwrap(), None);

        assert!(!store.contains(&1).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_replace_failure_found() {
        let (_, lw, strategy) = fixture();
        lw.insert(1, 2);

        assert_eq!(strategy.replace_failure(&1, &1, access_error(), None).unwrap(), Some(2));
        assert_eq!(lw.ops(), vec![SourceOp::Load(1), SourceOp::Write(1, 1)]);
        assert_eq!(lw.data().get(&1), Some(&1));
    }

    #[test]
    fn test_replace_failure_write_fails() {
        let (_, lw, strategy) = fixture();
        lw.insert(1, 2);
        lw.set_fail_writes(true);

        let err = strategy.replace_failure(&1, &1, access_error(), None).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));
    }

    #[test]
    fn test_conditional_replace_failure_found_equals() {
        let (_, lw, strategy) = fixture();
        lw.insert(1, 1);

        assert!(strategy.conditional_replace_failure(&1, &1, &2, access_error(), None).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1), SourceOp::Write(1, 2)]);
        assert_eq!(lw.data().get(&1), Some(&2));
    }

    #[test]
    fn test_conditional_replace_failure_found_not_equals() {
        let (_, lw, strategy) = fixture();
        lw.insert(1, 3);

        assert!(!strategy.conditional_replace_failure(&1, &1, &2, access_error(), None).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_conditional_replace_failure_not_found() {
        let (_, lw, strategy) = fixture();

        assert!(!strategy.conditional_replace_failure(&1, &1, &2, access_error(), None).unwrap());
        assert_eq!(lw.ops(), vec![SourceOp::Load(1)]);
    }

    #[test]
    fn test_get_all_failure() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);
        seed_store(&store, 2, 98);
        lw.insert(1, 1);

        let keys = vec![1, 2];
        let loaded = strategy.get_all_failure(&keys, access_error()).unwrap();
        assert_eq!(loaded[&1], Some(1));
        assert_eq!(loaded[&2], None);

        assert!(store.is_empty());
        assert_eq!(lw.ops(), vec![SourceOp::LoadAll(vec![1, 2])]);
    }

    #[test]
    fn test_get_all_failure_load_fails() {
        let (_, lw, strategy) = fixture();
        lw.set_fail_loads(true);

        let err = strategy.get_all_failure(&[1, 2], access_error()).unwrap_err();
        assert!(matches!(err, Error::Loading(_)));
    }

    #[test]
    fn test_get_all_failure_bulk_passthrough() {
        let (_, lw, strategy) = fixture();
        lw.fail_next_load_all(BulkLoadError::Partial(BulkLoadFailure {
            successes: HashMap::from_iter([(2, Some(2))]),
            failures: HashMap::from_iter([(1, cause(anyhow::anyhow!("failed")))]),
        }));

        let err = strategy.get_all_failure(&[1, 2], access_error()).unwrap_err();
        match err {
            Error::BulkLoading(failure) => {
                assert_eq!(failure.successes[&2], Some(2));
                assert!(failure.failures.contains_key(&1));
            }
            other => panic!("expected bulk loading failure, got {other:?}"),
        }
    }

    #[test]
    fn test_put_all_failure() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);

        let entries = HashMap::from_iter([(1, 1), (2, 2)]);
        strategy.put_all_failure(&entries, access_error()).unwrap();

        assert!(store.is_empty());
        assert_eq!(lw.data().get(&1), Some(&1));
        assert_eq!(lw.data().get(&2), Some(&2));
    }

    #[test]
    fn test_put_all_failure_bulk_passthrough() {
        let (_, lw, strategy) = fixture();
        lw.fail_next_write_all(BulkWriteError::Partial(BulkWriteFailure {
            successes: HashSet::from_iter([2]),
            failures: HashMap::from_iter([(1, cause(anyhow::anyhow!("failed")))]),
        }));

        let entries = HashMap::from_iter([(1, 1), (2, 2)]);
        let err = strategy.put_all_failure(&entries, access_error()).unwrap_err();
        assert!(matches!(err, Error::BulkWriting(_)));
    }

    #[test]
    fn test_remove_all_failure() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);
        lw.insert(1, 1);
        lw.insert(2, 2);

        strategy.remove_all_failure(&[1, 2], access_error()).unwrap();

        assert!(store.is_empty());
        assert!(lw.data().is_empty());
        assert_eq!(lw.ops(), vec![SourceOp::DeleteAll(vec![1, 2])]);
    }

    #[test]
    fn test_remove_all_failure_delete_fails() {
        let (_, lw, strategy) = fixture();
        lw.set_fail_deletes(true);

        let err = strategy.remove_all_failure(&[1, 2], access_error()).unwrap_err();
        assert!(matches!(err, Error::Writing(_)));
    }

    #[test]
    fn test_filter_plain_error_is_recovered() {
        let (_, _, strategy) = fixture();
        strategy.filter(&access_error()).unwrap();
    }

    #[test]
    fn test_filter_rethrowing_error_surfaces() {
        let (store, lw, strategy) = fixture();
        seed_store(&store, 1, 99);

        let error = StoreError::rethrowing(anyhow::anyhow!("injected"));
        let err = strategy.get_failure(&1, error, None).unwrap_err();
        assert!(matches!(err, Error::Rethrown(_)));

        // A rethrowing failure short-circuits before invalidation or loading.
        assert!(store.contains(&1).unwrap());
        assert!(lw.ops().is_empty());
    }
}
