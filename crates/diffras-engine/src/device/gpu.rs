use std::borrow::Cow;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use super::{DeviceBackend, DeviceInit};
use crate::error::{DeviceError, DeviceResult};

/// Usage flags for every buffer this backend allocates.
const STORAGE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_DST)
    .union(wgpu::BufferUsages::COPY_SRC);

/// Owns the wgpu device and queue used for scene buffers and kernel launches.
///
/// Headless: no surface is created. Cloning shares the same device.
#[derive(Debug, Clone)]
pub struct WgpuDevice {
    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,
}

impl WgpuDevice {
    /// Acquires an adapter and device.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: DeviceInit) -> Result<Self> {
        let DeviceInit {
            backends,
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let info = adapter.get_info();
        log::info!("using adapter `{}` ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("diffras-engine device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        Ok(Self::from_parts(device, queue))
    }

    /// Blocking variant of [`WgpuDevice::new`].
    pub fn new_blocking(init: DeviceInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    /// Wraps an existing device, e.g. one shared with a renderer.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Runs `f` inside out-of-memory and validation error scopes.
    ///
    /// Faults raised by the calls in `f` come back as `Err` instead of
    /// reaching the uncaptured-error handler, which panics by default.
    pub(crate) fn scoped<T>(
        &self,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> std::result::Result<T, wgpu::Error> {
        let oom = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = f(&self.device);

        // scopes pop innermost first
        let validation = pollster::block_on(validation.pop());
        let oom = pollster::block_on(oom.pop());
        match validation.or(oom) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    /// Blocks until all submitted work has finished.
    pub(crate) fn wait_idle(&self) -> std::result::Result<(), wgpu::PollError> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
    }

    fn check_size(&self, label: &str, size: u64) -> DeviceResult<()> {
        let max = self.device.limits().max_buffer_size;
        if size > max {
            return Err(DeviceError::Allocation {
                label: label.to_owned(),
                size,
                reason: format!("exceeds device max_buffer_size ({max})"),
            });
        }
        Ok(())
    }
}

/// Rounds up to the copy alignment; wgpu rejects empty bindings, so the
/// minimum is one word.
fn padded_size(size: u64) -> u64 {
    size.max(wgpu::COPY_BUFFER_ALIGNMENT)
        .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

impl DeviceBackend for WgpuDevice {
    type Buffer = wgpu::Buffer;

    fn name(&self) -> &str {
        "wgpu"
    }

    fn create_buffer_init(&self, label: &str, contents: &[u8]) -> DeviceResult<wgpu::Buffer> {
        let size = padded_size(contents.len() as u64);
        self.check_size(label, size)?;

        let contents: Cow<'_, [u8]> = if size == contents.len() as u64 {
            Cow::Borrowed(contents)
        } else {
            let mut padded = contents.to_vec();
            padded.resize(size as usize, 0);
            Cow::Owned(padded)
        };

        self.scoped(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &contents,
                usage: STORAGE_USAGE,
            })
        })
        .map_err(|e| DeviceError::Allocation {
            label: label.to_owned(),
            size,
            reason: e.to_string(),
        })
    }

    fn create_buffer(&self, label: &str, size: u64) -> DeviceResult<wgpu::Buffer> {
        let size = padded_size(size);
        self.check_size(label, size)?;

        // wgpu zero-initialises new buffers.
        self.scoped(|device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: STORAGE_USAGE,
                mapped_at_creation: false,
            })
        })
        .map_err(|e| DeviceError::Allocation {
            label: label.to_owned(),
            size,
            reason: e.to_string(),
        })
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let end = offset + data.len() as u64;
        let aligned = offset % wgpu::COPY_BUFFER_ALIGNMENT == 0
            && data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0;
        if !aligned || end > buffer.size() {
            return Err(DeviceError::Upload {
                label: format!("{buffer:?}"),
                size: data.len() as u64,
                reason: format!(
                    "write of [{offset}, {end}) is unaligned or past end ({} bytes)",
                    buffer.size()
                ),
            });
        }
        self.scoped(|_| self.queue.write_buffer(buffer, offset, data))
            .map_err(|e| DeviceError::Upload {
                label: format!("{buffer:?}"),
                size: data.len() as u64,
                reason: e.to_string(),
            })
    }

    fn read_buffer(&self, buffer: &wgpu::Buffer) -> DeviceResult<Vec<u8>> {
        let readback_err = |reason: String| DeviceError::Readback {
            label: format!("{buffer:?}"),
            reason,
        };

        let size = buffer.size();
        let staging = self
            .scoped(|device| {
                let staging = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("diffras readback"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("diffras readback encoder"),
                });
                encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
                self.queue.submit(std::iter::once(encoder.finish()));
                staging
            })
            .map_err(|e| readback_err(e.to_string()))?;

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.wait_idle().map_err(|e| readback_err(e.to_string()))?;
        rx.recv()
            .map_err(|e| readback_err(e.to_string()))?
            .map_err(|e| readback_err(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        staging.destroy();
        Ok(data)
    }

    fn buffer_size(&self, buffer: &wgpu::Buffer) -> u64 {
        buffer.size()
    }

    fn release(&self, buffer: &wgpu::Buffer) {
        buffer.destroy();
    }
}
