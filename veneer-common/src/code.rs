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

use std::{fmt::Debug, hash::BuildHasher};

/// Key trait for the cache.
///
/// `Clone` is required because both the store and the external source of truth keep their own
/// copy of the key; wrap large keys in `Arc` if cloning is expensive.
pub trait Key: Send + Sync + 'static + std::hash::Hash + Eq + Clone + Debug {}
impl<T> Key for T where T: Send + Sync + 'static + std::hash::Hash + Eq + Clone + Debug {}

/// Value trait for the cache.
///
/// `PartialEq` backs the conditional operations (`remove(key, expected)`, `replace(key, old,
/// new)`), which compare the in-cache value against a caller-supplied one.
pub trait Value: Send + Sync + 'static + Clone + PartialEq + Debug {}
impl<T> Value for T where T: Send + Sync + 'static + Clone + PartialEq + Debug {}

/// Hash builder trait.
pub trait HashBuilder: BuildHasher + Send + Sync + 'static {}
impl<T> HashBuilder for T where T: BuildHasher + Send + Sync + 'static {}

/// The default hash builder.
pub type DefaultHashBuilder = ahash::RandomState;
