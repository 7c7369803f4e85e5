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

//! # Lumen Control
//!
//! The services that sit between an application and a GPU runtime:
//!
//! - [`CapabilityProbe`] queries the runtime once and scores what it finds.
//! - [`BackendSelector`] turns the report and a policy into one active backend.
//! - [`ComputeDispatcher`] caches compute pipelines on the modern backend.
//! - [`ResourceCache`] builds geometry, materials and instanced batches.
//! - [`SystemOrchestrator`] sequences all of the above behind `initialize` and `dispose`.
//!
//! None of these types name a concrete runtime. They are driven through the
//! traits of `lumen-core`, implemented by `lumen-infra` or by test stubs.

#![warn(missing_docs)]

pub mod cache;
pub mod compute;
pub mod memo;
pub mod orchestrator;
pub mod probe;
pub mod selector;

pub use cache::{BatchUpdatePath, CacheStats, ResourceCache, ResourceCacheConfig};
pub use compute::ComputeDispatcher;
pub use orchestrator::{OrchestratorConfig, SystemOrchestrator, SystemStatus};
pub use probe::CapabilityProbe;
pub use selector::{BackendHandle, BackendSelector};
