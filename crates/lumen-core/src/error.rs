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

//! Defines the hierarchy of error types for the backend subsystem.

use crate::compute::{BindGroupId, BufferId, ComputePipelineId};
use std::fmt;

/// An error raised while probing the GPU runtime.
///
/// These never escape the capability probe: each one is converted into an
/// unsupported report whose diagnostic message is the error's `Display` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// No modern backend is compiled into or exposed by the runtime.
    EntryPointUnavailable,
    /// The entry point exists but no suitable adapter could be obtained.
    AdapterUnavailable(String),
    /// An adapter was obtained but the logical device request failed.
    DeviceCreationFailed(String),
    /// Any other failure raised by the runtime during detection.
    Runtime(String),
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionError::EntryPointUnavailable => {
                write!(f, "No modern GPU backend is available in this environment")
            }
            DetectionError::AdapterUnavailable(msg) => {
                write!(f, "No suitable GPU adapter found: {msg}")
            }
            DetectionError::DeviceCreationFailed(msg) => {
                write!(f, "Failed to create a GPU device: {msg}")
            }
            DetectionError::Runtime(msg) => write!(f, "Capability detection failed: {msg}"),
        }
    }
}

impl std::error::Error for DetectionError {}

/// An error raised while constructing a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The modern backend could not be constructed despite a positive report.
    ConstructionFailed(String),
    /// The legacy backend could not be constructed. This is fatal.
    LegacyConstructionFailed(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ConstructionFailed(msg) => {
                write!(f, "Modern backend construction failed: {msg}")
            }
            BackendError::LegacyConstructionFailed(msg) => {
                write!(f, "Legacy backend construction failed: {msg}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// An error related to cached resources and instanced batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// An instance update targeted an index outside `[0, capacity)`.
    InvalidInstanceIndex {
        /// The rejected index.
        index: usize,
        /// The capacity of the batch.
        capacity: usize,
    },
    /// The requested live count is larger than the batch capacity.
    LiveCountExceedsCapacity {
        /// The requested live count.
        requested: usize,
        /// The capacity of the batch.
        capacity: usize,
    },
    /// The requested capacity exceeds what the backend can store.
    CapacityTooLarge {
        /// The requested capacity.
        requested: usize,
        /// The largest capacity the backend accepts.
        max: usize,
    },
    /// A batch with zero capacity was requested.
    ZeroCapacity,
    /// A descriptor contained a value the backend cannot build from.
    InvalidDescriptor(String),
    /// The active backend failed to create or upload a resource.
    BackendError(String),
    /// A resource referenced by handle no longer exists.
    NotFound(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::InvalidInstanceIndex { index, capacity } => write!(
                f,
                "Instance index {index} is out of range for a batch of capacity {capacity}"
            ),
            ResourceError::LiveCountExceedsCapacity {
                requested,
                capacity,
            } => write!(
                f,
                "Live count {requested} exceeds batch capacity {capacity}"
            ),
            ResourceError::CapacityTooLarge { requested, max } => write!(
                f,
                "Batch capacity {requested} exceeds the backend maximum of {max}"
            ),
            ResourceError::ZeroCapacity => write!(f, "Instanced batch capacity must be non-zero"),
            ResourceError::InvalidDescriptor(msg) => write!(f, "Invalid descriptor: {msg}"),
            ResourceError::BackendError(msg) => write!(f, "Backend resource error: {msg}"),
            ResourceError::NotFound(msg) => write!(f, "Resource not found: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {}

/// An error related to compute pipelines, buffers and dispatches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// Compute is not available on the active backend.
    Unavailable,
    /// The shader failed to compile into a pipeline.
    CompilationFailed {
        /// A descriptive label for the pipeline.
        label: String,
        /// Details reported by the backend.
        details: String,
    },
    /// The workgroup size is zero or exceeds the device limit.
    InvalidWorkgroupSize {
        /// The requested size.
        requested: u32,
        /// The device maximum.
        max: u32,
    },
    /// The dispatch dimensions are zero or exceed the device limit.
    InvalidDispatch(String),
    /// The buffer ID is not known to the device.
    BufferNotFound(BufferId),
    /// The pipeline ID is not known to the device.
    PipelineNotFound(ComputePipelineId),
    /// The bind group ID is not known to the device.
    BindGroupNotFound(BindGroupId),
    /// A write or read range lies outside the buffer.
    OutOfBounds {
        /// The buffer that was accessed.
        buffer: BufferId,
        /// Offset of the access in bytes.
        offset: u64,
        /// Length of the access in bytes.
        len: u64,
        /// Size of the buffer in bytes.
        size: u64,
    },
    /// Mapping a staging buffer for read-back failed.
    MapFailed(String),
    /// Any other backend failure.
    Backend(String),
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeError::Unavailable => write!(f, "Compute is not available on this backend"),
            ComputeError::CompilationFailed { label, details } => {
                write!(f, "Compute pipeline compilation failed for '{label}': {details}")
            }
            ComputeError::InvalidWorkgroupSize { requested, max } => write!(
                f,
                "Workgroup size {requested} is invalid (must be between 1 and {max})"
            ),
            ComputeError::InvalidDispatch(msg) => write!(f, "Invalid dispatch: {msg}"),
            ComputeError::BufferNotFound(id) => write!(f, "Compute buffer not found: {id:?}"),
            ComputeError::PipelineNotFound(id) => {
                write!(f, "Compute pipeline not found: {id:?}")
            }
            ComputeError::BindGroupNotFound(id) => write!(f, "Bind group not found: {id:?}"),
            ComputeError::OutOfBounds {
                buffer,
                offset,
                len,
                size,
            } => write!(
                f,
                "Access of {len} bytes at offset {offset} is out of bounds for {buffer:?} of size {size}"
            ),
            ComputeError::MapFailed(msg) => write!(f, "Buffer mapping failed: {msg}"),
            ComputeError::Backend(msg) => write!(f, "Compute backend error: {msg}"),
        }
    }
}

impl std::error::Error for ComputeError {}

/// The top-level error type of the system orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// An operation that needs an active backend was called before `initialize`.
    NotInitialized,
    /// Backend construction failed.
    Backend(BackendError),
    /// A compute operation failed.
    Compute(ComputeError),
    /// A resource operation failed.
    Resource(ResourceError),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::NotInitialized => write!(f, "The backend system is not initialized"),
            SystemError::Backend(err) => write!(f, "Backend error: {err}"),
            SystemError::Compute(err) => write!(f, "Compute error: {err}"),
            SystemError::Resource(err) => write!(f, "Resource error: {err}"),
        }
    }
}

impl std::error::Error for SystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SystemError::NotInitialized => None,
            SystemError::Backend(err) => Some(err),
            SystemError::Compute(err) => Some(err),
            SystemError::Resource(err) => Some(err),
        }
    }
}

impl From<BackendError> for SystemError {
    fn from(err: BackendError) -> Self {
        SystemError::Backend(err)
    }
}

impl From<ComputeError> for SystemError {
    fn from(err: ComputeError) -> Self {
        SystemError::Compute(err)
    }
}

impl From<ResourceError> for SystemError {
    fn from(err: ResourceError) -> Self {
        SystemError::Resource(err)
    }
}

impl From<ComputeError> for ResourceError {
    fn from(err: ComputeError) -> Self {
        ResourceError::BackendError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn invalid_index_message_names_index_and_capacity() {
        let err = ResourceError::InvalidInstanceIndex {
            index: 1000,
            capacity: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("capacity"));
    }

    #[test]
    fn system_error_exposes_source() {
        let err: SystemError = BackendError::LegacyConstructionFailed("no GL".into()).into();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("no GL"));
        assert!(SystemError::NotInitialized.source().is_none());
    }
}
