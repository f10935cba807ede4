use std::fmt;

use bytemuck::Pod;

use super::{DeviceBackend, read_pod};
use crate::error::DeviceResult;

/// Device allocation owned by this value.
///
/// Released through the backend exactly once, when the value is dropped.
/// Sections that were never allocated have no `OwnedBuffer`, so there is
/// nothing to release for them.
pub struct OwnedBuffer<B: DeviceBackend> {
    device: B,
    buffer: B::Buffer,
    label: String,
    /// Logical length in bytes (allocations may be padded).
    len_bytes: u64,
}

impl<B: DeviceBackend> OwnedBuffer<B> {
    /// Allocates and uploads `data` in one bulk copy.
    pub fn upload<T: Pod>(device: &B, label: &str, data: &[T]) -> DeviceResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = device.create_buffer_init(label, bytes)?;
        log::trace!("uploaded `{label}` ({} bytes) via {}", bytes.len(), device.name());
        Ok(Self {
            device: device.clone(),
            buffer,
            label: label.to_owned(),
            len_bytes: bytes.len() as u64,
        })
    }

    /// Allocates `len_bytes` of zeroed storage.
    pub fn zeroed(device: &B, label: &str, len_bytes: u64) -> DeviceResult<Self> {
        let buffer = device.create_buffer(label, len_bytes)?;
        log::trace!("allocated `{label}` ({len_bytes} bytes) via {}", device.name());
        Ok(Self {
            device: device.clone(),
            buffer,
            label: label.to_owned(),
            len_bytes,
        })
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Logical size in bytes.
    #[inline]
    pub fn len_bytes(&self) -> u64 {
        self.len_bytes
    }

    /// Backend handle. Do not release it; the owner does that.
    #[inline]
    pub fn raw(&self) -> &B::Buffer {
        &self.buffer
    }

    /// Non-owning view of this allocation.
    #[inline]
    pub fn view(&self) -> BufferRef<'_, B> {
        BufferRef::new(&self.buffer)
    }

    /// Reads the logical contents back as `T`s.
    pub fn read<T: Pod>(&self) -> DeviceResult<Vec<T>> {
        let len = self.len_bytes as usize / std::mem::size_of::<T>();
        read_pod(&self.device, &self.buffer, len)
    }
}

impl<B: DeviceBackend> Drop for OwnedBuffer<B> {
    fn drop(&mut self) {
        log::trace!("releasing `{}`", self.label);
        self.device.release(&self.buffer);
    }
}

impl<B: DeviceBackend> fmt::Debug for OwnedBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBuffer")
            .field("label", &self.label)
            .field("len_bytes", &self.len_bytes)
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// Non-owning view of a device allocation.
///
/// The borrow keeps the allocation alive for `'a`; dropping a view never
/// releases anything.
pub struct BufferRef<'a, B: DeviceBackend> {
    buffer: &'a B::Buffer,
}

impl<'a, B: DeviceBackend> BufferRef<'a, B> {
    #[inline]
    pub fn new(buffer: &'a B::Buffer) -> Self {
        Self { buffer }
    }

    #[inline]
    pub fn raw(&self) -> &'a B::Buffer {
        self.buffer
    }
}

impl<B: DeviceBackend> Clone for BufferRef<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: DeviceBackend> Copy for BufferRef<'_, B> {}

impl<B: DeviceBackend> fmt::Debug for BufferRef<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BufferRef").field(self.buffer).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostDevice;

    #[test]
    fn drop_releases_exactly_once() {
        let device = HostDevice::new();
        let owned = OwnedBuffer::upload(&device, "faces", &[0i32, 1, 2]).unwrap();
        assert_eq!(device.live_count(), 1);
        drop(owned);
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.release_count(), 1);
        assert_eq!(device.double_releases(), 0);
    }

    #[test]
    fn views_never_release() {
        let device = HostDevice::new();
        let owned = OwnedBuffer::zeroed(&device, "scratch", 16).unwrap();
        {
            let view = owned.view();
            let copy = view;
            let _ = (view.raw(), copy.raw());
        }
        assert_eq!(device.release_count(), 0);
        drop(owned);
        assert_eq!(device.release_count(), 1);
    }

    #[test]
    fn read_returns_logical_contents() {
        let device = HostDevice::new();
        let owned = OwnedBuffer::upload(&device, "coords", &[0.5f32, 0.25, 1.0]).unwrap();
        assert_eq!(owned.len_bytes(), 12);
        assert_eq!(owned.read::<f32>().unwrap(), vec![0.5, 0.25, 1.0]);
    }
}
