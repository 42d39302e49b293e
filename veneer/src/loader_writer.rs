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

use std::collections::HashMap;

use veneer_common::code::{Key, Value};

use crate::error::{BulkLoadFailure, BulkWriteFailure};

/// Failure of a bulk load.
#[derive(thiserror::Error, Debug)]
pub enum BulkLoadError<K, V>
where
    K: Key,
    V: Value,
{
    /// Part of the batch resolved; per-key outcomes attached.
    #[error(transparent)]
    Partial(#[from] BulkLoadFailure<K, V>),
    /// The whole batch failed with no per-key detail.
    #[error("bulk load failed: {0}")]
    Other(#[from] anyhow::Error),
}

/// Failure of a bulk write or delete.
#[derive(thiserror::Error, Debug)]
pub enum BulkWriteError<K>
where
    K: Key,
{
    /// Part of the batch succeeded; per-key outcomes attached.
    #[error(transparent)]
    Partial(#[from] BulkWriteFailure<K>),
    /// The whole batch failed with no per-key detail.
    #[error("bulk write failed: {0}")]
    Other(#[from] anyhow::Error),
}

/// Read/write access to the external source of truth the cache fronts.
///
/// The engine drives this before any install: a write reaches the source before the value lands
/// in the store, a load happens before a loaded value becomes observable. Implementations may
/// block; the engine runs them on the calling thread, under the store's per-key lock
/// equivalent, so a slow source slows exactly the keys it is asked about.
pub trait LoaderWriter<K, V>: Send + Sync + 'static
where
    K: Key,
    V: Value,
{
    /// Load the authoritative value for `key`. `Ok(None)` means the source has no mapping.
    fn load(&self, key: &K) -> anyhow::Result<Option<V>>;

    /// Load the authoritative values for a batch of keys.
    ///
    /// Keys missing from the returned map are treated like explicit `None` entries: misses.
    fn load_all(&self, keys: &[K]) -> Result<HashMap<K, Option<V>>, BulkLoadError<K, V>> {
        let mut loaded = HashMap::with_capacity(keys.len());
        for key in keys {
            loaded.insert(key.clone(), self.load(key)?);
        }
        Ok(loaded)
    }

    /// Write `value` for `key` to the source of truth.
    fn write(&self, key: &K, value: &V) -> anyhow::Result<()>;

    /// Write a batch of entries to the source of truth.
    fn write_all(&self, entries: &[(K, V)]) -> Result<(), BulkWriteError<K>> {
        for (key, value) in entries {
            self.write(key, value)?;
        }
        Ok(())
    }

    /// Delete the mapping for `key` from the source of truth.
    fn delete(&self, key: &K) -> anyhow::Result<()>;

    /// Delete a batch of keys from the source of truth.
    fn delete_all(&self, keys: &[K]) -> Result<(), BulkWriteError<K>> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }
}
