//! Device memory.
//!
//! This module is responsible for:
//! - the [`DeviceBackend`] interface the store and kernels allocate through
//! - the ownership wrappers ([`OwnedBuffer`] releases, [`BufferRef`] borrows)
//! - the wgpu and host-memory backends

mod backend;
mod buffer;
mod gpu;
mod host;
mod init;

pub use backend::{DeviceBackend, read_pod};
pub use buffer::{BufferRef, OwnedBuffer};
pub use gpu::WgpuDevice;
pub use host::{HostBuffer, HostDevice};
pub use init::{DeviceInit, STORAGE_BUFFERS_PER_STAGE};
