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

//! The prelude of the crate.

pub use veneer_common::{
    code::{DefaultHashBuilder, HashBuilder, Key, Value},
    event::{EventListener, Mutation},
    metrics::Metrics,
};

pub use crate::{
    cache::{Cache, CacheBuilder},
    error::{BulkLoadFailure, BulkWriteFailure, Cause, Error},
    expiry::{EternalExpiry, ExpiryPolicy},
    loader_writer::{BulkLoadError, BulkWriteError, LoaderWriter},
    resilience::{ResilienceStrategy, RobustResilience},
    status::{Status, StatusGate},
    store::{Compute, ComputeError, MemoryStore, MemoryStoreConfig, SourceError, Store, StoreError, ValueHolder},
};
