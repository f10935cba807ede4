use std::fmt;

use bytemuck::Pod;

use crate::error::DeviceResult;

/// Device memory interface used by the scene store and kernel launchers.
///
/// A backend is a cheap, clonable handle; every [`OwnedBuffer`] keeps a clone
/// so it can release itself on drop.
///
/// # Implementations
/// - [`WgpuDevice`]: wgpu storage buffers
/// - [`HostDevice`]: host memory with an allocation ledger
///
/// [`OwnedBuffer`]: super::OwnedBuffer
/// [`WgpuDevice`]: super::WgpuDevice
/// [`HostDevice`]: super::HostDevice
pub trait DeviceBackend: Clone {
    /// Device allocation handle.
    ///
    /// Clones share the allocation. Only the owner releases it.
    type Buffer: fmt::Debug + Clone;

    /// Backend name for diagnostics (e.g. "wgpu", "host").
    fn name(&self) -> &str;

    /// Allocates a buffer holding exactly `contents` (one bulk copy).
    fn create_buffer_init(&self, label: &str, contents: &[u8]) -> DeviceResult<Self::Buffer>;

    /// Allocates a zero-filled buffer of `size` bytes.
    fn create_buffer(&self, label: &str, size: u64) -> DeviceResult<Self::Buffer>;

    /// Copies `data` into `buffer` at byte `offset`.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> DeviceResult<()>;

    /// Copies the full contents of `buffer` back to the host.
    ///
    /// Backends may pad allocations; the result can be longer than what was
    /// uploaded.
    fn read_buffer(&self, buffer: &Self::Buffer) -> DeviceResult<Vec<u8>>;

    /// Allocated size in bytes.
    fn buffer_size(&self, buffer: &Self::Buffer) -> u64;

    /// Frees `buffer`. Called exactly once per allocation, by its owner.
    fn release(&self, buffer: &Self::Buffer);
}

/// Reads `buffer` back as a vector of `T`, dropping trailing padding.
pub fn read_pod<T: Pod, B: DeviceBackend>(
    device: &B,
    buffer: &B::Buffer,
    len: usize,
) -> DeviceResult<Vec<T>> {
    let bytes = device.read_buffer(buffer)?;
    Ok(bytes
        .chunks_exact(std::mem::size_of::<T>())
        .take(len)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}
