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

//! The atomic per-key mapping abstraction the cache engine computes against.

use std::{collections::HashMap, hash::Hash};

use equivalent::Equivalent;
use veneer_common::code::{Key, Value};

use crate::error::Cause;

mod memory;

pub use memory::{MemoryStore, MemoryStoreConfig};

/// An immutable wrapper around a stored value.
///
/// The store owns the wrapper and whatever metadata it wants to attach; the engine only ever
/// reads the value out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueHolder<V> {
    value: V,
}

impl<V> ValueHolder<V> {
    /// Wrap a value.
    pub fn new(value: V) -> Self {
        Self { value }
    }

    /// Borrow the stored value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Unwrap the stored value.
    pub fn into_value(self) -> V {
        self.value
    }
}

/// Decision returned by a per-key compute closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Compute<V> {
    /// Install the value as the new mapping for the key.
    Put(V),
    /// Drop any existing mapping for the key.
    Remove,
    /// Leave the current mapping untouched, absent or not.
    Retain,
}

/// Category of a loader/writer failure carried across the store compute boundary.
///
/// Closures return this instead of raising through the store, so the store can abort the install
/// and hand the categorized cause straight back to the engine. It never escapes the engine.
#[derive(Debug, Clone)]
pub enum SourceError {
    /// The loader failed.
    Loading(Cause),
    /// The writer failed.
    Writing(Cause),
}

impl SourceError {
    /// Categorize a loader failure.
    pub fn loading(e: impl Into<anyhow::Error>) -> Self {
        Self::Loading(crate::error::cause(e))
    }

    /// Categorize a writer failure.
    pub fn writing(e: impl Into<anyhow::Error>) -> Self {
        Self::Writing(crate::error::cause(e))
    }

    /// The carried cause.
    pub fn cause(&self) -> &Cause {
        match self {
            Self::Loading(c) | Self::Writing(c) => c,
        }
    }
}

impl<K, V> From<SourceError> for crate::error::Error<K, V>
where
    K: Key,
    V: Value,
{
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Loading(c) => Self::Loading(c),
            SourceError::Writing(c) => Self::Writing(c),
        }
    }
}

/// Failure of the store itself.
///
/// Always routed through the resilience strategy; callers never see it raw.
#[derive(thiserror::Error, Debug, Clone)]
#[error("store access failure: {cause}")]
pub struct StoreError {
    cause: Cause,
    rethrow: bool,
}

impl StoreError {
    /// A regular store access failure.
    pub fn new(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            cause: crate::error::cause(cause),
            rethrow: false,
        }
    }

    /// A diagnostic store failure whose cause must surface to the caller instead of being
    /// recovered. Used by failure injection and tests.
    pub fn rethrowing(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            cause: crate::error::cause(cause),
            rethrow: true,
        }
    }

    /// Whether this failure must surface instead of being recovered.
    pub fn is_rethrowing(&self) -> bool {
        self.rethrow
    }

    /// The underlying cause.
    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// Unwrap the underlying cause.
    pub fn into_cause(self) -> Cause {
        self.cause
    }
}

/// Result envelope of a per-key compute call.
#[derive(thiserror::Error, Debug)]
pub enum ComputeError {
    /// The closure reported a loader/writer failure; nothing was installed.
    #[error("compute aborted by source failure")]
    Source(SourceError),
    /// The store itself failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An atomic per-key mapping primitive.
///
/// # Atomicity
///
/// For a single key, `compute` / `compute_if_absent` closures are linearized: closures for the
/// same key never run concurrently, and each closure observes the mapping state its install will
/// replace. Cross-key atomicity is not provided.
///
/// # Bulk calls
///
/// The bulk methods may invoke their closure several times with disjoint, ordered sub-batches of
/// the input. The closure is taken as `FnMut`, which rules out concurrent invocation within one
/// bulk call by construction; engine-side accounting can therefore live in plain captured state.
/// Returned replacement entries must cover the sub-batch and preserve its order.
pub trait Store<K, V>: Send + Sync + 'static
where
    K: Key,
    V: Value,
{
    /// Atomically remap `key` through `f`.
    ///
    /// Returns the holder resulting from the decision: the installed holder for
    /// [`Compute::Put`], `None` for [`Compute::Remove`], the untouched current holder for
    /// [`Compute::Retain`].
    fn compute<F>(&self, key: &K, f: F) -> Result<Option<ValueHolder<V>>, ComputeError>
    where
        F: FnMut(&K, Option<&V>) -> Result<Compute<V>, SourceError>;

    /// Atomically install a mapping for `key` if absent.
    ///
    /// `f` runs only when the key has no mapping; returning `None` leaves the key absent.
    /// Returns the pre-existing or freshly installed holder.
    fn compute_if_absent<F>(&self, key: &K, f: F) -> Result<Option<ValueHolder<V>>, ComputeError>
    where
        F: FnMut(&K) -> Result<Option<V>, SourceError>;

    /// Atomically remap a batch of keys through `f`, per-key atomic, possibly in sub-batches.
    ///
    /// `f` receives `(key, current value)` pairs and returns the replacement entries, `None`
    /// meaning absent. Returns the resulting state for every input key.
    fn bulk_compute<F>(&self, keys: &[K], f: F) -> Result<HashMap<K, Option<ValueHolder<V>>>, StoreError>
    where
        F: FnMut(&[(K, Option<V>)]) -> Vec<(K, Option<V>)>;

    /// Like [`Store::bulk_compute`], but `f` only receives the keys that are absent.
    fn bulk_compute_if_absent<F>(&self, keys: &[K], f: F) -> Result<HashMap<K, Option<ValueHolder<V>>>, StoreError>
    where
        F: FnMut(&[K]) -> Vec<(K, Option<V>)>;

    /// Look up the current holder for `key`.
    fn get<Q>(&self, key: &Q) -> Result<Option<ValueHolder<V>>, StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized;

    /// Whether `key` currently has a mapping.
    fn contains<Q>(&self, key: &Q) -> Result<bool, StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized;

    /// Drop the mapping for `key`, if any. Used as best-effort invalidation by resilience.
    fn remove<Q>(&self, key: &Q) -> Result<(), StoreError>
    where
        Q: Hash + Equivalent<K> + ?Sized;

    /// Drop all mappings.
    fn clear(&self) -> Result<(), StoreError>;
}
