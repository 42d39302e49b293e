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

use std::{
    fmt::Display,
    sync::atomic::{AtomicU8, Ordering},
};

/// Lifecycle state of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Constructed but not yet initialized.
    Uninitialized = 0,
    /// Serving operations.
    Available = 1,
    /// Shut down; terminal.
    Closed = 2,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Available => "available",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Available,
            _ => Self::Closed,
        }
    }
}

/// Lifecycle state machine gating cache operations.
///
/// Transitions are monotonic: `Uninitialized → Available → Closed`, no reopen. Concurrent
/// callers during a transition either observe the old state and complete, or see the new state;
/// there are no half states since the whole state is one atomic word.
#[derive(Debug, Default)]
pub struct StatusGate {
    state: AtomicU8,
}

impl StatusGate {
    /// Create a gate in [`Status::Uninitialized`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn status(&self) -> Status {
        Status::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Assert the gate is open for operations.
    ///
    /// Returns the offending status otherwise.
    pub fn check_available(&self) -> Result<(), Status> {
        match self.status() {
            Status::Available => Ok(()),
            other => Err(other),
        }
    }

    /// Transition `Uninitialized → Available`.
    ///
    /// Returns the current status if the gate was not uninitialized.
    pub fn init(&self) -> Result<(), Status> {
        self.state
            .compare_exchange(
                Status::Uninitialized as u8,
                Status::Available as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(Status::from_u8)
    }

    /// Transition `Available → Closed`.
    ///
    /// Closing an already closed gate is a no-op; closing an uninitialized gate is an error.
    pub fn close(&self) -> Result<(), Status> {
        match self.state.compare_exchange(
            Status::Available as u8,
            Status::Closed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) if Status::from_u8(current) == Status::Closed => Ok(()),
            Err(current) => Err(Status::from_u8(current)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let gate = StatusGate::new();
        assert_eq!(gate.status(), Status::Uninitialized);
        assert_eq!(gate.check_available(), Err(Status::Uninitialized));

        gate.init().unwrap();
        assert_eq!(gate.status(), Status::Available);
        gate.check_available().unwrap();

        // No double init.
        assert_eq!(gate.init(), Err(Status::Available));

        gate.close().unwrap();
        assert_eq!(gate.status(), Status::Closed);
        assert_eq!(gate.check_available(), Err(Status::Closed));

        // Close is idempotent, reopen is not a thing.
        gate.close().unwrap();
        assert_eq!(gate.init(), Err(Status::Closed));
    }

    #[test]
    fn test_close_uninitialized() {
        let gate = StatusGate::new();
        assert_eq!(gate.close(), Err(Status::Uninitialized));
    }
}
