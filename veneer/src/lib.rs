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

//! A key/value cache engine that keeps an external source of truth in the loop of every
//! operation.
//!
//! veneer routes each mutation through an atomic store compute step and a user-supplied
//! [`LoaderWriter`](crate::loader_writer::LoaderWriter): writes reach the source of truth before
//! they are installed, reads load through on a miss, and when the store itself fails a
//! [resilience strategy](crate::resilience) satisfies the caller from the source directly.
//!
//! ```
//! use veneer::prelude::*;
//! # use veneer::test_utils::RecordingLoaderWriter;
//!
//! let source = RecordingLoaderWriter::<u64, String>::default();
//! source.insert(7, "forty-two".to_string());
//!
//! let cache = CacheBuilder::new(source).with_name("demo").build();
//!
//! // Miss in the store, loaded from the source of truth.
//! assert_eq!(cache.get(&7).unwrap(), Some("forty-two".to_string()));
//! // Written through before it is installed.
//! cache.put(&1, "one".to_string()).unwrap();
//! assert_eq!(cache.loader_writer().data().get(&1), Some(&"one".to_string()));
//! ```

/// Success/failure accounting shared by the bulk operations.
mod bulk;
/// The cache engine and its builder.
pub mod cache;
/// The error taxonomy of the cache.
pub mod error;
/// The expiry hook consulted before installs.
pub mod expiry;
/// The external source of truth abstraction.
pub mod loader_writer;
/// The recovery path for store failures.
pub mod resilience;
/// The lifecycle state machine.
pub mod status;
/// The atomic per-key mapping abstraction and the reference in-memory store.
pub mod store;
/// Utilities for testing.
pub mod test_utils;

pub mod prelude;
pub use prelude::*;
