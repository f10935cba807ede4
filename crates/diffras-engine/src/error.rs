//! Error types for diffras-engine.

use thiserror::Error;

use crate::bindings::{BufferSlot, PassKind};
use crate::store::{ConstructionReport, Section};

/// Failure reported by a device backend.
///
/// Once a backend reports one of these the scene store is in an undefined
/// state; drop it and build a new one.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Buffer allocation was refused.
    #[error("failed to allocate {size} bytes for `{label}`: {reason}")]
    Allocation {
        label: String,
        size: u64,
        reason: String,
    },

    /// Host to device copy failed.
    #[error("failed to upload {size} bytes into `{label}`: {reason}")]
    Upload {
        label: String,
        size: u64,
        reason: String,
    },

    /// Device to host copy failed.
    #[error("failed to read back `{label}`: {reason}")]
    Readback { label: String, reason: String },

    /// A kernel launch reported a device fault.
    #[error("kernel `{kernel}` failed: {reason}")]
    KernelLaunch { kernel: String, reason: String },
}

/// Result alias for backend operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Main error type for scene construction and pass execution.
#[derive(Debug, Error)]
pub enum RasterError {
    /// One or more input sections failed validation under the strict policy.
    #[error("malformed scene input: {0}")]
    MalformedInput(ConstructionReport),

    /// A face references a vertex outside `[0, vertex_count)`.
    #[error(
        "face {face} corner {corner} references vertex {index}, outside [0, {vertex_count})"
    )]
    FaceIndexOutOfRange {
        face: usize,
        corner: usize,
        index: i64,
        vertex_count: usize,
    },

    /// A required buffer was not wired before the pass.
    #[error("{pass} pass requires `{slot}`, which has not been wired since the last gradient pass")]
    UnwiredBuffer { slot: BufferSlot, pass: PassKind },

    /// A wired buffer cannot hold what the pass reads or writes.
    #[error("`{slot}` holds {actual} bytes, the {pass} pass needs at least {expected}")]
    BufferTooSmall {
        slot: BufferSlot,
        pass: PassKind,
        expected: u64,
        actual: u64,
    },

    /// The pass needs a section that failed validation at construction.
    #[error("{pass} pass needs the {section} section, which was rejected at construction")]
    SectionUnavailable { section: Section, pass: PassKind },

    /// No kernel was installed for the pass.
    #[error("no {0} kernel installed")]
    KernelNotInstalled(PassKind),

    /// The device reported a fault during allocation, copy or launch.
    #[error(transparent)]
    DeviceExecution(#[from] DeviceError),
}

/// Result type alias using [`RasterError`].
pub type Result<T> = std::result::Result<T, RasterError>;
