//! WGSL compute-shader launcher.
//!
//! Bind group 0 layout seen by the shader:
//! - binding 0: `KernelParams` uniform
//! - bindings 1..=19: `array<…>` storage buffers, numbered by position in
//!   [`BINDING_ORDER`]
//!
//! A kernel declares only the storage bindings its shader uses; the rest are
//! left out of the layout. The declared set must fit the device's
//! `max_storage_buffers_per_shader_stage`.
//!
//! Every storage binding is `read_write`. Declared bindings whose optional
//! slot is unwired, or whose section is absent, are bound to a 4-byte zero
//! buffer; shaders must consult the parameter block before touching them.
//!
//! Caller-owned buffers must be created with `BufferUsages::STORAGE`. Device
//! faults during creation or launch, including a caller buffer without that
//! usage, are returned as [`DeviceError::KernelLaunch`].

use std::num::NonZeroU32;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{GradientKernel, KernelInputs, RasterizationKernel, StaticBuffer};
use crate::bindings::{BufferSlot, PassKind};
use crate::device::WgpuDevice;
use crate::error::{DeviceError, DeviceResult};

/// Source of one storage binding.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Binding {
    Static(StaticBuffer),
    Slot(BufferSlot),
}

impl Binding {
    /// Shader binding number, or `None` for [`BufferSlot::VertexNormals`],
    /// which is bound through [`StaticBuffer::VertexNormals`].
    pub fn number(self) -> Option<u32> {
        BINDING_ORDER
            .iter()
            .position(|b| *b == self)
            .map(|i| i as u32 + 1)
    }
}

/// Every storage binding a shader can declare, in binding-number order
/// starting at 1.
pub const BINDING_ORDER: [Binding; 19] = [
    Binding::Static(StaticBuffer::Faces),
    Binding::Static(StaticBuffer::FaceOfVertex),
    Binding::Static(StaticBuffer::VertexFaceRanges),
    Binding::Static(StaticBuffer::TextureCoordinates),
    Binding::Static(StaticBuffer::Extrinsics),
    Binding::Static(StaticBuffer::Intrinsics),
    Binding::Static(StaticBuffer::VertexNormals),
    Binding::Static(StaticBuffer::FaceNormals),
    Binding::Slot(BufferSlot::Vertices),
    Binding::Slot(BufferSlot::VertexColors),
    Binding::Slot(BufferSlot::TextureMap),
    Binding::Slot(BufferSlot::ShCoefficients),
    Binding::Slot(BufferSlot::FaceIds),
    Binding::Slot(BufferSlot::Barycentrics),
    Binding::Slot(BufferSlot::RenderBufferGrad),
    Binding::Slot(BufferSlot::VertexPosGrad),
    Binding::Slot(BufferSlot::VertexColorGrad),
    Binding::Slot(BufferSlot::TextureGrad),
    Binding::Slot(BufferSlot::ShCoeffGrad),
];

/// What one shader invocation covers.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DispatchDomain {
    /// One per pixel per camera.
    Pixels,
    Vertices,
    Faces,
}

/// Uniform parameter block at binding 0.
///
/// A shader recovers its linear index as
/// `gid.y * workgroups_x * workgroup_size + gid.x` and returns when it is at
/// or past `invocation_count`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Pod, Zeroable, Eq, PartialEq)]
pub struct KernelParams {
    pub vertex_count: u32,
    pub face_count: u32,
    pub camera_count: u32,
    pub frame_width: u32,

    pub frame_height: u32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub albedo_mode: u32,

    pub shading_mode: u32,
    pub image_filter_size: u32,
    pub texture_filter_size: u32,
    /// 0 = rasterization, 1 = gradient.
    pub pass: u32,

    pub invocation_count: u32,
    pub workgroups_x: u32,
    /// Bit `i` set when storage binding `i + 1` is declared and backed by a
    /// real buffer.
    pub bound_mask: u32,
    pub _pad: u32,
}

/// Everything [`WgslKernel::new`] needs to build a pipeline.
#[derive(Debug, Clone)]
pub struct KernelDescriptor<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub entry_point: &'a str,
    pub domain: DispatchDomain,
    /// Must match the shader's `@workgroup_size` x dimension.
    pub workgroup_size: NonZeroU32,
    /// Storage bindings the shader declares, in any order.
    pub bindings: &'a [Binding],
}

/// A compute pipeline usable as either entry point.
#[derive(Debug)]
pub struct WgslKernel {
    name: String,
    bindings: Vec<(Binding, u32)>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    domain: DispatchDomain,
    workgroup_size: NonZeroU32,
}

impl WgslKernel {
    /// Compiles the shader and builds the pipeline for its entry point.
    ///
    /// Fails without touching the device when the binding set is invalid or
    /// larger than the device allows. Compile and layout errors are returned
    /// as [`DeviceError::KernelLaunch`].
    pub fn new(device: &WgpuDevice, desc: &KernelDescriptor<'_>) -> DeviceResult<Self> {
        let KernelDescriptor {
            name,
            source,
            entry_point,
            domain,
            workgroup_size,
            bindings,
        } = *desc;
        let kernel_err = |reason: String| DeviceError::KernelLaunch {
            kernel: name.to_owned(),
            reason,
        };

        let max = device.device().limits().max_storage_buffers_per_shader_stage;
        let numbers = binding_numbers(bindings, max).map_err(kernel_err)?;

        let mut entries = Vec::with_capacity(numbers.len() + 1);
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: std::num::NonZeroU64::new(
                    std::mem::size_of::<KernelParams>() as u64,
                ),
            },
            count: None,
        });
        entries.extend(numbers.iter().map(|&binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }));

        let (bind_group_layout, pipeline) = device
            .scoped(|gpu| {
                let shader = gpu.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(name),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });

                let bind_group_layout =
                    gpu.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("diffras kernel bgl"),
                        entries: &entries,
                    });

                let pipeline_layout = gpu.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("diffras kernel pipeline layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

                let pipeline = gpu.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(name),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    cache: None,
                });

                (bind_group_layout, pipeline)
            })
            .map_err(|e| kernel_err(e.to_string()))?;

        log::debug!(
            "compiled kernel `{name}` (entry `{entry_point}`, {domain:?}, {} storage bindings)",
            numbers.len()
        );

        Ok(Self {
            name: name.to_owned(),
            bindings: bindings.iter().copied().zip(numbers).collect(),
            bind_group_layout,
            pipeline,
            domain,
            workgroup_size,
        })
    }

    fn invocation_count(&self, inputs: &KernelInputs<'_, WgpuDevice>) -> u64 {
        match self.domain {
            DispatchDomain::Pixels => inputs.dims.pixel_count() as u64,
            DispatchDomain::Vertices => inputs.dims.vertex_count as u64,
            DispatchDomain::Faces => inputs.dims.face_count as u64,
        }
    }

    fn launch(&self, inputs: &KernelInputs<'_, WgpuDevice>) -> DeviceResult<()> {
        let device = inputs.device;
        let launch_err = |reason: String| DeviceError::KernelLaunch {
            kernel: self.name.clone(),
            reason,
        };
        let gpu = device.device();

        let invocations = self.invocation_count(inputs);
        if invocations == 0 {
            log::debug!("kernel `{}`: nothing to dispatch", self.name);
            return Ok(());
        }
        let (workgroups_x, workgroups_y) = split_workgroups(
            invocations.div_ceil(u64::from(self.workgroup_size.get())),
            gpu.limits().max_compute_workgroups_per_dimension,
        )
        .ok_or_else(|| launch_err(format!("{invocations} invocations exceed dispatch limits")))?;

        let sources: Vec<Option<&wgpu::Buffer>> = self
            .bindings
            .iter()
            .map(|&(binding, _)| {
                let buffer = match binding {
                    Binding::Static(which) => inputs.static_buffer(which),
                    Binding::Slot(slot) => inputs.slot(slot),
                };
                buffer.map(|b| b.raw())
            })
            .collect();

        let bound_mask = self
            .bindings
            .iter()
            .zip(&sources)
            .filter(|(_, source)| source.is_some())
            .fold(0u32, |mask, (&(_, number), _)| mask | (1 << (number - 1)));

        let params = KernelParams {
            vertex_count: to_u32(inputs.dims.vertex_count),
            face_count: to_u32(inputs.dims.face_count),
            camera_count: to_u32(inputs.dims.camera_count),
            frame_width: inputs.dims.frame_width,
            frame_height: inputs.dims.frame_height,
            texture_width: inputs.texture_size.width,
            texture_height: inputs.texture_size.height,
            albedo_mode: inputs.config.albedo_mode.code(),
            shading_mode: inputs.config.shading_mode.code(),
            image_filter_size: inputs.config.image_filter_size,
            texture_filter_size: inputs.config.texture_filter_size,
            pass: match inputs.pass {
                PassKind::Rasterize => 0,
                PassKind::Gradient => 1,
            },
            invocation_count: to_u32(invocations as usize),
            workgroups_x,
            bound_mask,
            _pad: 0,
        };

        let submitted = device.scoped(|gpu| {
            let params_buf = gpu.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("diffras kernel params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let placeholders: Vec<Option<wgpu::Buffer>> = sources
                .iter()
                .map(|b| b.is_none().then(|| placeholder(gpu)))
                .collect();

            // a missing entry fails bind group validation inside this scope
            let mut entries = Vec::with_capacity(sources.len() + 1);
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buf.as_entire_binding(),
            });
            for ((&(_, number), source), spare) in
                self.bindings.iter().zip(&sources).zip(&placeholders)
            {
                if let Some(buffer) = source.or(spare.as_ref()) {
                    entries.push(wgpu::BindGroupEntry {
                        binding: number,
                        resource: buffer.as_entire_binding(),
                    });
                }
            }

            let bind_group = gpu.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("diffras kernel bg"),
                layout: &self.bind_group_layout,
                entries: &entries,
            });

            let mut encoder = gpu.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("diffras kernel encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(self.name.as_str()),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(workgroups_x, workgroups_y, 1);
            }
            device.queue().submit(std::iter::once(encoder.finish()));

            let mut temporaries = vec![params_buf];
            temporaries.extend(placeholders.into_iter().flatten());
            temporaries
        });
        let temporaries = submitted.map_err(|e| launch_err(e.to_string()))?;

        log::trace!(
            "kernel `{}` ({}): {invocations} invocations in {workgroups_x}x{workgroups_y} workgroups",
            self.name,
            inputs.pass
        );

        let result = device.wait_idle().map_err(|e| launch_err(e.to_string()));
        for buffer in &temporaries {
            buffer.destroy();
        }
        result
    }
}

impl RasterizationKernel<WgpuDevice> for WgslKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn rasterize(&mut self, inputs: &KernelInputs<'_, WgpuDevice>) -> DeviceResult<()> {
        self.launch(inputs)
    }
}

impl GradientKernel<WgpuDevice> for WgslKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn accumulate_gradients(&mut self, inputs: &KernelInputs<'_, WgpuDevice>) -> DeviceResult<()> {
        self.launch(inputs)
    }
}

fn placeholder(gpu: &wgpu::Device) -> wgpu::Buffer {
    gpu.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("diffras unbound slot"),
        contents: &[0u8; 4],
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    })
}

/// Shader binding numbers for `bindings`, checked against the catalogue and
/// the device's per-stage storage-buffer limit.
fn binding_numbers(bindings: &[Binding], max: u32) -> Result<Vec<u32>, String> {
    if bindings.len() > max as usize {
        return Err(format!(
            "{} storage bindings exceed the device limit of {max}",
            bindings.len()
        ));
    }
    let mut numbers = Vec::with_capacity(bindings.len());
    for &binding in bindings {
        let number = binding
            .number()
            .ok_or_else(|| format!("{binding:?} has no shader binding"))?;
        if numbers.contains(&number) {
            return Err(format!("{binding:?} declared twice"));
        }
        numbers.push(number);
    }
    Ok(numbers)
}

/// Dimensions and counts are bounded by `max_buffer_size`, far below `u32::MAX`
/// elements in practice.
fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Splits `workgroups` into an `x * y` grid with both sides within `max_dim`.
fn split_workgroups(workgroups: u64, max_dim: u32) -> Option<(u32, u32)> {
    let max_dim = u64::from(max_dim.max(1));
    if workgroups <= max_dim {
        return Some((workgroups as u32, 1));
    }
    let y = workgroups.div_ceil(max_dim);
    (y <= max_dim).then_some((max_dim as u32, y as u32))
}
