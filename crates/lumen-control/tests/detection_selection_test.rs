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

//! Integration tests for capability detection and backend selection.
//!
//! Both services run against the in-memory runtime and factory from `common`.

mod common;

use common::{init_logging, RuntimeProfile, StubFactory, StubRuntime};
use lumen_control::{BackendSelector, CapabilityProbe};
use lumen_core::{BackendError, BackendKind, CapabilityReport, SelectionPolicy};
use std::sync::atomic::Ordering;
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// CapabilityProbe
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_capable_runtime_produces_recommended_report() {
    init_logging();
    let runtime = StubRuntime::new(RuntimeProfile::capable());
    let probe = CapabilityProbe::new(runtime.clone());

    let report = probe.detect().await;

    assert!(report.is_supported());
    assert!(report.is_recommended());
    assert!(
        report.performance_score() >= 80,
        "score was {}",
        report.performance_score()
    );
    assert_eq!(report.adapter().map(|a| a.name.as_str()), Some("Stub GPU"));
    assert!(probe.device().is_some(), "probe should retain the device");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_detect_runs_one_probe() {
    let runtime = StubRuntime::new(RuntimeProfile::capable());
    let probe = Arc::new(CapabilityProbe::new(runtime.clone()));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let probe = Arc::clone(&probe);
            tokio::spawn(async move { probe.detect().await })
        })
        .collect();
    let mut reports = Vec::new();
    for task in tasks {
        reports.push(task.await.unwrap());
    }

    assert_eq!(runtime.adapter_requests(), 1);
    assert_eq!(runtime.device_requests(), 1);
    assert_eq!(probe.detection_count(), 1);
    assert!(
        reports.iter().all(|r| Arc::ptr_eq(r, &reports[0])),
        "every caller must receive the same report"
    );
}

#[tokio::test]
async fn test_missing_entry_point_is_an_unsupported_report() {
    let runtime = StubRuntime::new(RuntimeProfile::without_entry_point());
    let probe = CapabilityProbe::new(runtime.clone());

    let report = probe.detect().await;

    assert!(!report.is_supported());
    assert_eq!(report.performance_score(), 0);
    assert!(report.error_message().is_some());
    assert_eq!(runtime.adapter_requests(), 0, "no adapter without an entry point");
}

#[tokio::test]
async fn test_missing_adapter_carries_diagnostic() {
    let runtime = StubRuntime::new(RuntimeProfile {
        adapter: false,
        ..RuntimeProfile::capable()
    });
    let probe = CapabilityProbe::new(runtime);

    let report = probe.detect().await;

    assert!(!report.is_supported());
    let message = report.error_message().unwrap_or_default();
    assert!(message.contains("no adapter"), "message was {message:?}");
    assert!(probe.device().is_none());
}

#[tokio::test]
async fn test_device_failure_is_recovered_as_unsupported() {
    let runtime = StubRuntime::new(RuntimeProfile {
        device: false,
        ..RuntimeProfile::capable()
    });
    let probe = CapabilityProbe::new(runtime.clone());

    let report = probe.detect().await;

    assert!(!report.is_supported());
    assert!(report
        .error_message()
        .unwrap_or_default()
        .contains("device lost"));
    assert_eq!(runtime.device_requests(), 1);
}

#[tokio::test]
async fn test_clear_cache_forces_reprobe() {
    let runtime = StubRuntime::new(RuntimeProfile::capable());
    let probe = CapabilityProbe::new(runtime.clone());

    let first = probe.detect().await;
    assert!(probe.cached().is_some());
    probe.clear_cache();
    assert!(probe.cached().is_none());
    assert!(probe.device().is_none());
    let second = probe.detect().await;

    assert_eq!(runtime.adapter_requests(), 2);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second, "structurally identical runtimes give equal reports");
    assert_eq!(first.performance_score(), second.performance_score());
}

// ─────────────────────────────────────────────────────────────────────────────
// BackendSelector
// ─────────────────────────────────────────────────────────────────────────────

fn capable_report() -> CapabilityReport {
    CapabilityReport::supported(
        ["timestamp-query", "texture-compression-bc"],
        common::capable_limits(),
        true,
        None,
    )
}

#[test]
fn test_scenario_a_capable_report_selects_modern() {
    init_logging();
    let factory = StubFactory::new();
    let selector = BackendSelector::new(factory.clone());

    let handle = selector
        .select(&capable_report(), None, &SelectionPolicy::default())
        .unwrap();

    assert_eq!(handle.kind(), BackendKind::Modern);
    assert!(handle.score() >= 80);
    assert_eq!(factory.modern_attempts(), 1);
    assert_eq!(factory.legacy_attempts(), 0);
}

#[test]
fn test_scenario_b_unsupported_report_never_attempts_modern() {
    let factory = StubFactory::new();
    let selector = BackendSelector::new(factory.clone());
    let report = CapabilityReport::unsupported("No modern GPU backend is available");

    let handle = selector
        .select(&report, None, &SelectionPolicy::default())
        .unwrap();

    assert_eq!(report.performance_score(), 0);
    assert_eq!(handle.kind(), BackendKind::Legacy);
    assert_eq!(handle.score(), 0);
    assert_eq!(factory.modern_attempts(), 0, "modern must not be attempted");
    assert_eq!(factory.legacy_attempts(), 1);
}

#[test]
fn test_modern_construction_failure_falls_back_to_legacy() {
    let factory = StubFactory::new();
    factory.fail_modern.store(true, Ordering::SeqCst);
    let selector = BackendSelector::new(factory.clone());

    let handle = selector
        .select(&capable_report(), None, &SelectionPolicy::default())
        .unwrap();

    assert_eq!(handle.kind(), BackendKind::Legacy);
    assert_eq!(factory.modern_attempts(), 1);
    assert_eq!(factory.legacy_attempts(), 1);
}

#[test]
fn test_legacy_failure_is_fatal() {
    let factory = StubFactory::new();
    factory.fail_legacy.store(true, Ordering::SeqCst);
    let selector = BackendSelector::new(factory.clone());

    let err = selector
        .select(
            &CapabilityReport::unsupported("none"),
            None,
            &SelectionPolicy::default(),
        )
        .unwrap_err();

    assert!(matches!(err, BackendError::LegacyConstructionFailed(_)));
    assert!(selector.current().is_none());
}

#[test]
fn test_min_score_and_preference_gate_modern() {
    let report = capable_report();
    let strict = SelectionPolicy {
        min_performance_score: 101,
        ..SelectionPolicy::default()
    };
    assert!(!BackendSelector::wants_modern(&report, &strict));
    assert!(!BackendSelector::wants_modern(
        &report,
        &SelectionPolicy::default().forcing_legacy()
    ));
    assert!(BackendSelector::wants_modern(&report, &SelectionPolicy::default()));
}

#[test]
fn test_repeat_select_returns_cached_handle() {
    let factory = StubFactory::new();
    let selector = BackendSelector::new(factory.clone());

    let first = selector
        .select(&capable_report(), None, &SelectionPolicy::default())
        .unwrap();
    // A different report and policy do not rebuild the active backend.
    let second = selector
        .select(
            &CapabilityReport::unsupported("ignored"),
            None,
            &SelectionPolicy::default().forcing_legacy(),
        )
        .unwrap();

    assert_eq!(second.kind(), BackendKind::Modern);
    assert!(Arc::ptr_eq(first.backend(), second.backend()));
    assert_eq!(selector.construction_attempts(), 1);
}

#[test]
fn test_release_shuts_backend_down() {
    let factory = StubFactory::new();
    let selector = BackendSelector::new(factory.clone());
    selector
        .select(&capable_report(), None, &SelectionPolicy::default())
        .unwrap();
    let backend = factory.last_built().unwrap();

    selector.release();

    assert!(selector.current().is_none());
    assert_eq!(backend.shutdowns.load(Ordering::SeqCst), 1);
}
