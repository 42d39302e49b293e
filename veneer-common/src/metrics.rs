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

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation outcome counters.
///
/// One counter per observable outcome. The engine bumps exactly one counter of an operation's
/// family per call, except bulk families which count entries.
#[derive(Debug, Default)]
pub struct Metrics {
    /// get hits, including values installed from the loader during the get
    pub get_hit: AtomicU64,
    /// get misses
    pub get_miss: AtomicU64,
    /// get operations that hit a store failure
    pub get_failure: AtomicU64,

    /// installed puts, also counts installs by `put_if_absent`
    pub put: AtomicU64,
    /// puts that left the cache untouched
    pub put_noop: AtomicU64,
    /// put operations that hit a store failure
    pub put_failure: AtomicU64,

    /// removes of an existing mapping
    pub remove_success: AtomicU64,
    /// removes of an absent mapping
    pub remove_noop: AtomicU64,
    /// remove operations that hit a store failure
    pub remove_failure: AtomicU64,

    /// replaces of an existing mapping
    pub replace_hit: AtomicU64,
    /// conditional replaces that found a different value
    pub replace_miss_present: AtomicU64,
    /// replaces that found no mapping
    pub replace_miss_not_present: AtomicU64,
    /// replace operations that hit a store failure
    pub replace_failure: AtomicU64,

    /// conditional removes that removed the mapping
    pub conditional_remove_success: AtomicU64,
    /// conditional removes that found a different value
    pub conditional_remove_failure_key_present: AtomicU64,
    /// conditional removes that found no mapping
    pub conditional_remove_failure_key_missing: AtomicU64,
    /// conditional remove operations that hit a store failure
    pub conditional_remove_failure: AtomicU64,

    /// entries resolved by `get_all`, cached or loaded
    pub get_all_hit: AtomicU64,
    /// entries `get_all` could not resolve
    pub get_all_miss: AtomicU64,
    /// entries installed by `put_all`
    pub put_all: AtomicU64,
    /// mappings removed by `remove_all`
    pub remove_all: AtomicU64,
}

impl Metrics {
    /// Bump a counter by one.
    pub fn increase(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump a counter by `n`.
    pub fn increase_by(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read a counter.
    pub fn value(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
