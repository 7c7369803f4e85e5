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

//! Sequencing of probe, selection, compute and resources behind one entry point.

use crate::cache::{ResourceCache, ResourceCacheConfig};
use crate::compute::ComputeDispatcher;
use crate::memo::Memo;
use crate::probe::CapabilityProbe;
use crate::selector::{BackendHandle, BackendSelector};
use lumen_core::capability::CapabilityReport;
use lumen_core::traits::{BackendFactory, GpuRuntime};
use lumen_core::{
    BackendDescription, BackendError, BackendKind, ComputeError, RecommendedSettings,
    SelectionPolicy, SystemError,
};
use std::sync::Arc;

/// Switches for the orchestrated subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Probe the runtime. When off, the modern backend is never considered.
    pub enable_auto_detection: bool,
    /// Create a compute dispatcher when the modern backend is active.
    pub enable_compute: bool,
    /// Log the score, feature count and quality tier after initialization.
    pub log_performance_stats: bool,
    /// Configuration of the resource cache.
    pub cache: ResourceCacheConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enable_auto_detection: true,
            enable_compute: true,
            log_performance_stats: false,
            cache: ResourceCacheConfig::default(),
        }
    }
}

/// Snapshot of the subsystem state.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    /// `true` once `initialize` succeeded and until `dispose`.
    pub initialized: bool,
    /// The active backend kind.
    pub backend_kind: Option<BackendKind>,
    /// The report the selection was based on.
    pub capability_report: Option<Arc<CapabilityReport>>,
    /// Sizing hints derived from [`SystemStatus::performance_score`].
    pub recommended_settings: RecommendedSettings,
    /// The effective score: the report's score on the modern backend, `0` otherwise.
    pub performance_score: u8,
    /// Information about the active device.
    pub backend: Option<BackendDescription>,
    /// Human-readable summary of the initialization outcome.
    pub message: String,
}

impl SystemStatus {
    /// The status reported before initialization.
    pub fn uninitialized() -> Self {
        Self {
            initialized: false,
            backend_kind: None,
            capability_report: None,
            recommended_settings: RecommendedSettings::low(),
            performance_score: 0,
            backend: None,
            message: "Backend system not initialized".to_string(),
        }
    }
}

struct ActiveSystem {
    status: SystemStatus,
    handle: BackendHandle,
    compute: Option<Arc<ComputeDispatcher>>,
    resources: Arc<ResourceCache>,
}

/// Owns the probe and the selector and brings the subsystem up and down.
///
/// Initialization either yields a fully working backend, with compute and the
/// resource cache ready, or exactly one error. Concurrent `initialize` calls
/// share a single run and its outcome; a failed run is forgotten once every
/// caller attached to it has the error.
pub struct SystemOrchestrator {
    config: OrchestratorConfig,
    probe: Arc<CapabilityProbe>,
    selector: BackendSelector,
    active: Memo<Result<Arc<ActiveSystem>, SystemError>>,
}

impl SystemOrchestrator {
    /// Creates an idle orchestrator over `runtime` and `factory`.
    pub fn new(
        runtime: Arc<dyn GpuRuntime>,
        factory: Arc<dyn BackendFactory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            config,
            probe: Arc::new(CapabilityProbe::new(runtime)),
            selector: BackendSelector::new(factory),
            active: Memo::new(),
        }
    }

    /// The configuration the orchestrator was created with.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Brings the subsystem up under `policy` and returns its status.
    ///
    /// After the first success, later calls return the same status whatever
    /// their policy. If a stage fails while the modern backend is active and
    /// `policy.fallback_to_legacy` is set, the sequence restarts on the legacy
    /// backend; a failure there is returned.
    pub async fn initialize(&self, policy: SelectionPolicy) -> Result<SystemStatus, SystemError> {
        let active = self
            .active
            .get_or_try_init(|| self.bring_up(policy))
            .await?;
        Ok(active.status.clone())
    }

    fn current(&self) -> Option<Arc<ActiveSystem>> {
        self.active.get_ok()
    }

    async fn bring_up(&self, policy: SelectionPolicy) -> Result<Arc<ActiveSystem>, SystemError> {
        log::info!("Initializing backend system...");
        let err = match self.run_once(&policy).await {
            Ok(active) => return Ok(Arc::new(active)),
            Err(err) => err,
        };

        let was_modern = self
            .selector
            .current()
            .is_some_and(|h| h.kind() == BackendKind::Modern);
        let fatal = matches!(
            err,
            SystemError::Backend(BackendError::LegacyConstructionFailed(_))
        );
        self.selector.release();
        if fatal || !was_modern || !policy.fallback_to_legacy {
            log::error!("Backend system initialization failed: {err}");
            return Err(err);
        }

        log::warn!("Initialization on the modern backend failed ({err}), restarting on legacy");
        match self.run_once(&policy.forcing_legacy()).await {
            Ok(active) => Ok(Arc::new(active)),
            Err(err) => {
                self.selector.release();
                log::error!("Backend system initialization failed: {err}");
                Err(err)
            }
        }
    }

    async fn run_once(&self, policy: &SelectionPolicy) -> Result<ActiveSystem, SystemError> {
        let report = if self.config.enable_auto_detection {
            self.probe.detect().await
        } else {
            Arc::new(CapabilityReport::unsupported("capability detection disabled"))
        };

        let handle = self.selector.select(&report, self.probe.device(), policy)?;

        let compute = if handle.kind() == BackendKind::Modern && self.config.enable_compute {
            let device = handle
                .backend()
                .compute_device()
                .ok_or(ComputeError::Unavailable)?;
            Some(Arc::new(ComputeDispatcher::new(device)))
        } else {
            None
        };

        let resources = Arc::new(ResourceCache::new(
            Arc::clone(handle.backend()),
            compute.clone(),
            self.config.cache,
        )?);

        let description = handle.description();
        let score = handle.score();
        let message = match handle.kind() {
            BackendKind::Modern => format!(
                "Modern backend active on {} (score {score})",
                description.adapter_name
            ),
            BackendKind::Legacy => match report.error_message() {
                Some(reason) => format!("Legacy backend active: {reason}"),
                None => "Legacy backend active".to_string(),
            },
        };
        let status = SystemStatus {
            initialized: true,
            backend_kind: Some(handle.kind()),
            capability_report: Some(Arc::clone(&report)),
            recommended_settings: RecommendedSettings::from_score(score),
            performance_score: score,
            backend: Some(description),
            message,
        };

        if self.config.log_performance_stats {
            log::info!(
                "Backend stats: score {}, {} features, {:?} tier, compute {}",
                status.performance_score,
                report.features().len(),
                status.recommended_settings.quality_tier,
                if compute.is_some() { "on" } else { "off" }
            );
        }
        log::info!("{}", status.message);

        Ok(ActiveSystem {
            status,
            handle,
            compute,
            resources,
        })
    }

    /// The current status, or [`SystemStatus::uninitialized`] before `initialize`.
    pub fn system_status(&self) -> SystemStatus {
        self.current()
            .map(|a| a.status.clone())
            .unwrap_or_else(SystemStatus::uninitialized)
    }

    /// Returns `true` between a successful `initialize` and `dispose`.
    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    /// Whether the active backend reports the named feature. `false` before init.
    pub fn supports_feature(&self, name: &str) -> bool {
        self.current()
            .is_some_and(|a| a.handle.backend().supports_feature(name))
    }

    /// Sizing hints for the application. The low tier before init.
    pub fn recommended_settings(&self) -> RecommendedSettings {
        self.current()
            .map_or_else(RecommendedSettings::low, |a| a.status.recommended_settings)
    }

    /// The resource cache of the active backend.
    pub fn resources(&self) -> Result<Arc<ResourceCache>, SystemError> {
        self.current()
            .map(|a| Arc::clone(&a.resources))
            .ok_or(SystemError::NotInitialized)
    }

    /// The compute dispatcher, present only on the modern backend with compute enabled.
    pub fn compute(&self) -> Option<Arc<ComputeDispatcher>> {
        self.current().and_then(|a| a.compute.clone())
    }

    /// The active backend.
    pub fn backend(&self) -> Option<BackendHandle> {
        self.current().map(|a| a.handle.clone())
    }

    /// The capability probe.
    pub fn probe(&self) -> &Arc<CapabilityProbe> {
        &self.probe
    }

    /// Tears everything down so the next `initialize` starts from a fresh probe.
    ///
    /// Batches, geometry and materials already handed out stay with their owners.
    pub fn dispose(&self) {
        if let Some(active) = self.active.clear_ok() {
            active.resources.dispose();
            if let Some(compute) = &active.compute {
                compute.dispose();
            }
        }
        self.selector.release();
        self.probe.clear_cache();
        log::info!("Backend system disposed");
    }

    /// Logs the current status at `info` level.
    pub fn log_system_info(&self) {
        let status = self.system_status();
        if !status.initialized {
            log::info!("{}", status.message);
            return;
        }
        log::info!("=== Backend System ===");
        if let Some(kind) = status.backend_kind {
            log::info!("Backend: {kind}");
        }
        if let Some(description) = &status.backend {
            log::info!("Device: {description}");
        }
        log::info!("Performance score: {}", status.performance_score);
        let settings = status.recommended_settings;
        log::info!(
            "Recommended: {:?} tier, compute {}, {} particles, {} instances",
            settings.quality_tier,
            settings.enable_compute,
            settings.particle_count_ceiling,
            settings.instance_count_ceiling
        );
        if let Some(report) = &status.capability_report {
            log::info!(
                "Capabilities: supported {}, {} features, {} limits",
                report.is_supported(),
                report.features().len(),
                report.limits().len()
            );
            if let Some(message) = report.error_message() {
                log::info!("Detection: {message}");
            }
        }
    }
}
