/// Storage buffers per shader stage requested by [`DeviceInit::default`].
///
/// Software adapters such as llvmpipe stop at 16. A [`WgslKernel`] declares
/// only the bindings it reads or writes, so it has to stay within this limit.
///
/// [`WgslKernel`]: crate::kernel::WgslKernel
pub const STORAGE_BUFFERS_PER_STAGE: u32 = 16;

/// Initialization parameters for the wgpu backend.
///
/// Keep this structure minimal. Add fields only when a concrete backend
/// requirement exists.
#[derive(Debug, Clone)]
pub struct DeviceInit {
    /// Backends wgpu may pick from.
    pub backends: wgpu::Backends,

    /// Adapter preference. Training loops want the discrete GPU.
    pub power_preference: wgpu::PowerPreference,

    /// Accept a software adapter (useful on CI).
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    ///
    /// The default raises the storage-buffer limit to
    /// [`STORAGE_BUFFERS_PER_STAGE`]. Scene storage alone needs nothing above
    /// [`wgpu::Limits::default`].
    pub required_limits: wgpu::Limits,
}

impl Default for DeviceInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits {
                max_storage_buffers_per_shader_stage: STORAGE_BUFFERS_PER_STAGE,
                ..wgpu::Limits::default()
            },
        }
    }
}
