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

//! Success/failure accounting shared by the bulk operations.
//!
//! One accumulator lives per bulk call and is fed by the batch closure as the store works
//! through sub-batches. A key lands in `successes` or `failures`, never both: the store hands
//! each key to exactly one sub-batch, and partial bulk failures from the source already keep
//! the two sides disjoint.

use std::collections::HashMap;

use hashbrown::HashSet;
use veneer_common::code::{Key, Value};

use crate::error::{cause, BulkLoadFailure, BulkWriteFailure, Cause};

/// Accounting for one bulk load call.
#[derive(Debug)]
pub(crate) struct LoadAccounting<K, V>
where
    K: Key,
    V: Value,
{
    pub successes: HashMap<K, Option<V>>,
    pub failures: HashMap<K, Cause>,
}

impl<K, V> LoadAccounting<K, V>
where
    K: Key,
    V: Value,
{
    /// Bulk failures are the exception; start empty and small.
    pub fn new() -> Self {
        Self {
            successes: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// Fold in the per-key outcome of a partial bulk load failure.
    pub fn merge(&mut self, failure: BulkLoadFailure<K, V>) {
        self.successes.extend(failure.successes);
        self.failures.extend(failure.failures);
    }

    /// Mark every key of a batch as failed with one shared cause.
    pub fn fail_batch<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>, e: anyhow::Error)
    where
        K: 'a,
    {
        let shared = cause(e);
        for key in keys {
            self.failures.insert(key.clone(), shared.clone());
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn into_failure(self) -> BulkLoadFailure<K, V> {
        BulkLoadFailure {
            successes: self.successes,
            failures: self.failures,
        }
    }
}

/// Accounting for one bulk write or delete call.
#[derive(Debug)]
pub(crate) struct WriteAccounting<K>
where
    K: Key,
{
    pub successes: HashSet<K>,
    pub failures: HashMap<K, Cause>,
}

impl<K> WriteAccounting<K>
where
    K: Key,
{
    pub fn new() -> Self {
        Self {
            successes: HashSet::new(),
            failures: HashMap::new(),
        }
    }

    /// Fold in the per-key outcome of a partial bulk write failure.
    pub fn merge(&mut self, failure: BulkWriteFailure<K>) {
        self.successes.extend(failure.successes);
        self.failures.extend(failure.failures);
    }

    /// Mark every key of a batch as failed with one shared cause.
    pub fn fail_batch<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>, e: anyhow::Error)
    where
        K: 'a,
    {
        let shared = cause(e);
        for key in keys {
            self.failures.insert(key.clone(), shared.clone());
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn into_failure(self) -> BulkWriteFailure<K> {
        BulkWriteFailure {
            successes: self.successes,
            failures: self.failures,
        }
    }
}
