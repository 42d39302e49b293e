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

/// Mutation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// A mapping was installed for a previously absent key.
    Created,
    /// An existing mapping was replaced.
    Updated,
    /// An existing mapping was removed.
    Removed,
}

/// Trait for the customized mutation listener.
///
/// Listeners run on the calling thread after the mutation is installed in the store, outside any
/// store lock. Keep them cheap or hand off to a channel.
pub trait EventListener: Send + Sync + 'static {
    /// Associated key type.
    type Key;
    /// Associated value type.
    type Value;

    /// Called after a per-key mutation took effect.
    ///
    /// `value` is the newly installed value for [`Mutation::Created`] and [`Mutation::Updated`],
    /// and `None` for [`Mutation::Removed`].
    #[expect(unused_variables)]
    fn on_mutation(&self, mutation: Mutation, key: &Self::Key, value: Option<&Self::Value>) {}

    /// Called after the cache was cleared.
    fn on_clear(&self) {}
}
