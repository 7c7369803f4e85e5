// Copyright 2025 eraflo
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

//! A clearable, memoized asynchronous value.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

/// Runs an async initializer at most once and shares its result.
///
/// Concurrent callers of [`Memo::get_or_init`] attach to the in-flight
/// initializer instead of starting their own. [`Memo::clear`] swaps in a fresh
/// cell, so the next caller runs the initializer again while callers already
/// waiting on the old cell still receive the old result.
pub struct Memo<T> {
    cell: Mutex<Arc<OnceCell<T>>>,
}

impl<T: Clone> Memo<T> {
    /// Creates an empty memo.
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Arc<OnceCell<T>>> {
        // The guarded value is only ever replaced whole, so a poisoned lock is still consistent.
        self.cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> Arc<OnceCell<T>> {
        Arc::clone(&self.slot())
    }

    /// Returns the value, running `init` if no caller has produced it yet.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = self.current();
        cell.get_or_init(init).await.clone()
    }

    /// The value, if an initializer already completed.
    pub fn get(&self) -> Option<T> {
        self.slot().get().cloned()
    }

    /// Forgets the value and returns it.
    pub fn clear(&self) -> Option<T> {
        let old = std::mem::replace(&mut *self.slot(), Arc::new(OnceCell::new()));
        old.get().cloned()
    }
}

impl<T: Clone, E: Clone> Memo<Result<T, E>> {
    /// Like [`Memo::get_or_init`] for a fallible initializer.
    ///
    /// Every caller attached to a run receives that run's outcome, success or
    /// error. A failed outcome is forgotten once the run completes, so the
    /// next call after it starts a fresh run.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cell = self.current();
        let outcome = cell.get_or_init(init).await.clone();
        if outcome.is_err() {
            let mut slot = self.slot();
            if Arc::ptr_eq(&slot, &cell) {
                *slot = Arc::new(OnceCell::new());
            }
        }
        outcome
    }

    /// The stored value, if a run succeeded.
    pub fn get_ok(&self) -> Option<T> {
        self.get().and_then(Result::ok)
    }

    /// Forgets the outcome and returns the value if the run had succeeded.
    pub fn clear_ok(&self) -> Option<T> {
        self.clear().and_then(Result::ok)
    }
}

impl<T: Clone> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}
