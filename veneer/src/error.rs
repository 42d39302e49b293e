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

use std::{collections::HashMap, sync::Arc};

use hashbrown::HashSet;
use veneer_common::code::{Key, Value};

use crate::status::Status;

/// A shared failure cause.
///
/// Bulk outcomes hand the same cause to several keys, so causes are reference counted rather
/// than owned per key.
pub type Cause = Arc<anyhow::Error>;

/// Wrap an error into a shared [`Cause`].
pub fn cause(e: impl Into<anyhow::Error>) -> Cause {
    Arc::new(e.into())
}

/// Per-key outcome of a failed bulk load.
///
/// `successes` holds the mappings that were resolved before or besides the failure (`None` is a
/// resolved miss); `failures` maps each unresolved key to its cause. A key never appears in
/// both.
#[derive(thiserror::Error, Debug)]
#[error("bulk load failure: {} keys failed, {} keys resolved", failures.len(), successes.len())]
pub struct BulkLoadFailure<K, V>
where
    K: Key,
    V: Value,
{
    /// Mappings resolved despite the failure.
    pub successes: HashMap<K, Option<V>>,
    /// Causes per unresolved key.
    pub failures: HashMap<K, Cause>,
}

/// Per-key outcome of a failed bulk write or delete.
#[derive(thiserror::Error, Debug)]
#[error("bulk write failure: {} keys failed, {} keys succeeded", failures.len(), successes.len())]
pub struct BulkWriteFailure<K>
where
    K: Key,
{
    /// Keys whose write or delete reached the source of truth.
    pub successes: HashSet<K>,
    /// Causes per failed key.
    pub failures: HashMap<K, Cause>,
}

/// Error returned by all cache operations.
///
/// Store failures never surface here raw; the resilience strategy either satisfies the caller
/// from the source of truth or reports the loader/writer failure it ran into while doing so.
#[derive(thiserror::Error, Debug)]
pub enum Error<K, V>
where
    K: Key,
    V: Value,
{
    /// The loader failed; the cause is preserved.
    #[error("loading failed: {0}")]
    Loading(Cause),
    /// The writer failed; the cause is preserved.
    #[error("writing failed: {0}")]
    Writing(Cause),
    /// A bulk load failed for part of the batch; per-key outcomes are preserved.
    #[error(transparent)]
    BulkLoading(#[from] BulkLoadFailure<K, V>),
    /// A bulk write or delete failed for part of the batch; per-key outcomes are preserved.
    #[error(transparent)]
    BulkWriting(#[from] BulkWriteFailure<K>),
    /// The operation was invoked while the cache is not available.
    #[error("cache is {0}, operations require an available cache")]
    Lifecycle(Status),
    /// A diagnostic store failure was configured to surface instead of being recovered.
    #[error("store failure surfaced by diagnostics: {0}")]
    Rethrown(Cause),
}

impl<K, V> Error<K, V>
where
    K: Key,
    V: Value,
{
    /// The proximate cause for the single-cause variants.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Loading(c) | Self::Writing(c) | Self::Rethrown(c) => Some(c.as_ref()),
            _ => None,
        }
    }

    /// Whether this is a loading failure, bulk or not.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_) | Self::BulkLoading(_))
    }

    /// Whether this is a writing failure, bulk or not.
    pub fn is_writing(&self) -> bool {
        matches!(self, Self::Writing(_) | Self::BulkWriting(_))
    }
}
