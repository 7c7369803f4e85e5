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

//! One-time capability detection.

use crate::memo::Memo;
use lumen_core::capability::CapabilityReport;
use lumen_core::traits::{GpuDevice, GpuRuntime};
use lumen_core::DetectionError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Queries a [`GpuRuntime`] once and caches the resulting [`CapabilityReport`].
///
/// The logical device acquired while probing is retained so the modern backend
/// can be built on it without a second device request.
pub struct CapabilityProbe {
    runtime: Arc<dyn GpuRuntime>,
    report: Memo<Arc<CapabilityReport>>,
    device: Mutex<Option<Arc<dyn GpuDevice>>>,
    detections: AtomicUsize,
}

impl CapabilityProbe {
    /// Creates a probe over `runtime`. Nothing is queried until [`CapabilityProbe::detect`].
    pub fn new(runtime: Arc<dyn GpuRuntime>) -> Self {
        Self {
            runtime,
            report: Memo::new(),
            device: Mutex::new(None),
            detections: AtomicUsize::new(0),
        }
    }

    /// Returns the capability report, probing the runtime on first use.
    ///
    /// Concurrent callers share a single detection and receive the same `Arc`.
    /// Detection never fails: every error becomes an unsupported report
    /// carrying the error message.
    pub async fn detect(&self) -> Arc<CapabilityReport> {
        self.report.get_or_init(|| self.run()).await
    }

    /// The cached report, without probing.
    pub fn cached(&self) -> Option<Arc<CapabilityReport>> {
        self.report.get()
    }

    /// Forgets the report and the retained device so the next `detect` re-probes.
    pub fn clear_cache(&self) {
        self.report.clear();
        if let Ok(mut device) = self.device.lock() {
            *device = None;
        }
        log::debug!("Capability cache cleared");
    }

    /// The logical device acquired by the last successful detection.
    pub fn device(&self) -> Option<Arc<dyn GpuDevice>> {
        self.device.lock().ok()?.clone()
    }

    /// How many times the runtime was actually probed.
    pub fn detection_count(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }

    async fn run(&self) -> Arc<CapabilityReport> {
        self.detections.fetch_add(1, Ordering::SeqCst);
        log::info!("Probing GPU capabilities...");

        let report = match self.query().await {
            Ok((report, device)) => {
                log::info!(
                    "Modern backend available on {} (score {}, {} features)",
                    device.label(),
                    report.performance_score(),
                    report.features().len()
                );
                if let Ok(mut slot) = self.device.lock() {
                    *slot = Some(device);
                }
                report
            }
            Err(e) => {
                log::warn!("Modern backend unavailable: {e}");
                CapabilityReport::unsupported(e.to_string())
            }
        };
        Arc::new(report)
    }

    async fn query(&self) -> Result<(CapabilityReport, Arc<dyn GpuDevice>), DetectionError> {
        if !self.runtime.has_modern_entry_point() {
            return Err(DetectionError::EntryPointUnavailable);
        }
        let adapter = self.runtime.request_adapter().await?;
        let device = adapter.request_device().await?;
        let report = CapabilityReport::supported(
            adapter.features(),
            adapter.limits(),
            adapter.supports_compute(),
            Some(adapter.info()),
        );
        Ok((report, device))
    }
}
