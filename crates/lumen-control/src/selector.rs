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

//! Backend selection with an ordered fallback chain.

use lumen_core::capability::CapabilityReport;
use lumen_core::traits::{BackendFactory, GpuDevice, RenderBackend};
use lumen_core::{BackendDescription, BackendError, BackendKind, SelectionPolicy};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// The single active backend, tagged with its kind.
///
/// Clones share the same backend instance.
#[derive(Clone)]
pub struct BackendHandle {
    kind: BackendKind,
    backend: Arc<dyn RenderBackend>,
    score: u8,
}

impl BackendHandle {
    /// The capability family of the backend.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// The backend itself.
    pub fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    /// The effective performance score: the report's score on the modern
    /// backend, `0` on the legacy one.
    pub fn score(&self) -> u8 {
        self.score
    }

    /// Human-readable information about the device.
    pub fn description(&self) -> BackendDescription {
        self.backend.description()
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("kind", &self.kind)
            .field("score", &self.score)
            .finish()
    }
}

/// Picks and constructs the active backend, then keeps it.
pub struct BackendSelector {
    factory: Arc<dyn BackendFactory>,
    handle: Mutex<Option<BackendHandle>>,
    constructions: AtomicUsize,
}

impl BackendSelector {
    /// Creates a selector building backends through `factory`.
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            handle: Mutex::new(None),
            constructions: AtomicUsize::new(0),
        }
    }

    /// Returns `true` if `policy` and `report` allow the modern backend.
    pub fn wants_modern(report: &CapabilityReport, policy: &SelectionPolicy) -> bool {
        policy.prefer_modern
            && report.is_supported()
            && report.is_recommended()
            && report.performance_score() >= policy.min_performance_score
    }

    fn slot(&self) -> Result<MutexGuard<'_, Option<BackendHandle>>, BackendError> {
        self.handle.lock().map_err(|e| {
            BackendError::ConstructionFailed(format!("Failed to lock backend handle: {e}"))
        })
    }

    /// Returns the active backend, constructing it on first call.
    ///
    /// The modern backend is attempted only when [`BackendSelector::wants_modern`]
    /// holds; its construction failure is logged and the legacy backend is built
    /// instead. A legacy construction failure is returned as
    /// [`BackendError::LegacyConstructionFailed`]. Once a backend exists, every
    /// call returns it regardless of the arguments.
    pub fn select(
        &self,
        report: &CapabilityReport,
        device: Option<Arc<dyn GpuDevice>>,
        policy: &SelectionPolicy,
    ) -> Result<BackendHandle, BackendError> {
        let mut slot = self.slot()?;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let score = report.performance_score();
        let mut handle = None;
        if Self::wants_modern(report, policy) {
            self.constructions.fetch_add(1, Ordering::SeqCst);
            match self.factory.create_modern(device) {
                Ok(backend) => {
                    handle = Some(BackendHandle {
                        kind: BackendKind::Modern,
                        backend,
                        score,
                    })
                }
                Err(e) => log::warn!("{e}. Falling back to the legacy backend."),
            }
        } else {
            log::debug!(
                "Modern backend not eligible (supported: {}, recommended: {}, score {} < {} or not preferred)",
                report.is_supported(),
                report.is_recommended(),
                score,
                policy.min_performance_score
            );
        }

        let handle = match handle {
            Some(handle) => handle,
            None => {
                self.constructions.fetch_add(1, Ordering::SeqCst);
                let backend = self.factory.create_legacy().map_err(|e| match e {
                    BackendError::ConstructionFailed(msg) => {
                        BackendError::LegacyConstructionFailed(msg)
                    }
                    other => other,
                })?;
                BackendHandle {
                    kind: BackendKind::Legacy,
                    backend,
                    score: 0,
                }
            }
        };

        match handle.kind {
            BackendKind::Modern => log::info!(
                "Selected {} backend: {} (score {})",
                handle.kind,
                handle.description(),
                handle.score
            ),
            BackendKind::Legacy => log::info!(
                "Selected {} backend: {}",
                handle.kind,
                handle.description()
            ),
        }
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// The active backend, if one was selected.
    pub fn current(&self) -> Option<BackendHandle> {
        self.handle.lock().ok()?.clone()
    }

    /// Number of backend constructions attempted, successful or not.
    pub fn construction_attempts(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Shuts the active backend down and forgets it.
    pub fn release(&self) {
        let handle = match self.handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(e) => {
                log::error!("Backend handle lock poisoned, nothing released: {e}");
                None
            }
        };
        if let Some(handle) = handle {
            handle.backend.shutdown();
            log::info!("Released {} backend", handle.kind);
        }
    }
}
