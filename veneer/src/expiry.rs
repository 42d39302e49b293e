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

use std::time::Duration;

/// Decides how long a mapping may live.
///
/// The engine consults this before installing a new value: a zero duration marks the value
/// stillborn, and the operation installs absent instead while the source of truth still receives
/// the write. `None` means no expiry. Enforcement of non-zero durations belongs to the storage
/// tier and is not the engine's concern.
pub trait ExpiryPolicy<K, V>: Send + Sync + 'static {
    /// Lifetime of a mapping created for a previously absent key.
    #[expect(unused_variables)]
    fn expiry_for_creation(&self, key: &K, value: &V) -> Option<Duration> {
        None
    }

    /// Lifetime of a mapping replacing an existing one.
    #[expect(unused_variables)]
    fn expiry_for_update(&self, key: &K, old: &V, new: &V) -> Option<Duration> {
        None
    }
}

/// The default policy: mappings never expire.
#[derive(Debug, Default, Clone, Copy)]
pub struct EternalExpiry;

impl<K, V> ExpiryPolicy<K, V> for EternalExpiry {}
