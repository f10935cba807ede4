//! Kernel entry points.
//!
//! The rasterization and gradient kernels are external collaborators: the
//! orchestrator validates the buffer set, gathers it into [`KernelInputs`] and
//! hands it to whichever kernel was installed. [`WgslKernel`] launches a
//! caller-supplied compute shader on a [`WgpuDevice`](crate::device::WgpuDevice).

mod wgsl;

pub use wgsl::{Binding, BINDING_ORDER, DispatchDomain, KernelDescriptor, KernelParams, WgslKernel};

use std::fmt;

use crate::bindings::{BufferSlot, FrameBindings, PassKind};
use crate::config::RasterizerConfig;
use crate::device::{BufferRef, DeviceBackend};
use crate::error::{DeviceResult, RasterError, Result};
use crate::scene::{SceneDims, TextureSize};
use crate::store::{DeviceSceneStore, Section};

/// Store-owned buffer handed to a kernel.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StaticBuffer {
    Faces,
    FaceOfVertex,
    VertexFaceRanges,
    TextureCoordinates,
    Extrinsics,
    Intrinsics,
    /// Caller override if wired, store-owned storage otherwise.
    VertexNormals,
    FaceNormals,
}

impl StaticBuffer {
    pub fn name(self) -> &'static str {
        match self {
            Self::Faces => "faces",
            Self::FaceOfVertex => "face of vertex",
            Self::VertexFaceRanges => "vertex face ranges",
            Self::TextureCoordinates => "texture coordinates",
            Self::Extrinsics => "extrinsics",
            Self::Intrinsics => "intrinsics",
            Self::VertexNormals => "vertex normals",
            Self::FaceNormals => "face normals",
        }
    }
}

impl fmt::Display for StaticBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a kernel launch reads or writes.
///
/// Built by [`KernelInputs::prepare`] after the wiring has been validated, so
/// kernels can rely on required slots being present and large enough.
pub struct KernelInputs<'r, B: DeviceBackend> {
    pub device: &'r B,
    pub pass: PassKind,
    pub dims: SceneDims,
    pub config: &'r RasterizerConfig,
    pub texture_size: TextureSize,

    pub faces: BufferRef<'r, B>,
    pub face_of_vertex: BufferRef<'r, B>,
    pub vertex_face_ranges: BufferRef<'r, B>,
    pub extrinsics: BufferRef<'r, B>,
    pub intrinsics: BufferRef<'r, B>,
    /// `None` unless the texture-coordinate section was accepted.
    pub texture_coordinates: Option<BufferRef<'r, B>>,
    pub vertex_normals: Option<BufferRef<'r, B>>,
    pub face_normals: Option<BufferRef<'r, B>>,

    pub bindings: &'r FrameBindings<B>,
}

impl<'r, B: DeviceBackend> KernelInputs<'r, B> {
    /// Gathers the store-owned buffers `pass` needs.
    ///
    /// Topology and cameras are always needed; texture coordinates only when
    /// the albedo mode samples the texture.
    pub fn prepare(
        pass: PassKind,
        store: &'r DeviceSceneStore<B>,
        config: &'r RasterizerConfig,
        bindings: &'r FrameBindings<B>,
    ) -> Result<Self> {
        let unavailable = |section| RasterError::SectionUnavailable { section, pass };

        let topology = store.topology().ok_or(unavailable(Section::Topology))?;
        let cameras = store.cameras().ok_or(unavailable(Section::Cameras))?;
        let texture_coordinates = store.texture_coordinates().map(|b| b.view());
        if config.uses_texture() && texture_coordinates.is_none() {
            return Err(unavailable(Section::TextureCoordinates));
        }

        let vertex_normals = bindings
            .get(BufferSlot::VertexNormals)
            .or_else(|| store.vertex_normals().map(|b| b.view()));

        Ok(Self {
            device: store.device(),
            pass,
            dims: *store.dims(),
            config,
            texture_size: bindings.texture_size,
            faces: topology.faces.view(),
            face_of_vertex: topology.face_of_vertex.view(),
            vertex_face_ranges: topology.vertex_face_ranges.view(),
            extrinsics: cameras.extrinsics.view(),
            intrinsics: cameras.intrinsics.view(),
            texture_coordinates,
            vertex_normals,
            face_normals: store.face_normals().map(|b| b.view()),
            bindings,
        })
    }

    /// Caller-owned buffer in `slot`.
    ///
    /// For [`BufferSlot::VertexNormals`] this is the caller override or the
    /// store-owned storage.
    #[inline]
    pub fn slot(&self, slot: BufferSlot) -> Option<BufferRef<'r, B>> {
        match slot {
            BufferSlot::VertexNormals => self.vertex_normals,
            other => self.bindings.get(other),
        }
    }

    pub fn static_buffer(&self, which: StaticBuffer) -> Option<BufferRef<'r, B>> {
        match which {
            StaticBuffer::Faces => Some(self.faces),
            StaticBuffer::FaceOfVertex => Some(self.face_of_vertex),
            StaticBuffer::VertexFaceRanges => Some(self.vertex_face_ranges),
            StaticBuffer::TextureCoordinates => self.texture_coordinates,
            StaticBuffer::Extrinsics => Some(self.extrinsics),
            StaticBuffer::Intrinsics => Some(self.intrinsics),
            StaticBuffer::VertexNormals => self.vertex_normals,
            StaticBuffer::FaceNormals => self.face_normals,
        }
    }
}

impl<B: DeviceBackend> fmt::Debug for KernelInputs<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelInputs")
            .field("backend", &self.device.name())
            .field("pass", &self.pass)
            .field("dims", &self.dims)
            .field("texture_size", &self.texture_size)
            .field("bindings", self.bindings)
            .finish_non_exhaustive()
    }
}

/// Forward entry point: fills the face-ID and barycentric buffers.
pub trait RasterizationKernel<B: DeviceBackend> {
    fn name(&self) -> &str;

    fn rasterize(&mut self, inputs: &KernelInputs<'_, B>) -> DeviceResult<()>;
}

/// Backward entry point: scatters the render-buffer gradient into the
/// gradient outputs.
pub trait GradientKernel<B: DeviceBackend> {
    fn name(&self) -> &str;

    fn accumulate_gradients(&mut self, inputs: &KernelInputs<'_, B>) -> DeviceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlbedoMode, ValidationPolicy};
    use crate::device::{DeviceBackend, HostDevice};
    use crate::scene::SceneDescriptor;

    const EXTRINSICS: [f32; 12] = [0.0; 12];
    const INTRINSICS: [f32; 9] = [0.0; 9];

    fn store(device: &HostDevice, texture_coordinates: &[f32]) -> DeviceSceneStore<HostDevice> {
        let desc = SceneDescriptor {
            faces: &[0, 1, 2],
            texture_coordinates,
            vertex_count: 3,
            extrinsics: &EXTRINSICS,
            intrinsics: &INTRINSICS,
            frame_width: 2,
            frame_height: 2,
        };
        DeviceSceneStore::new(device.clone(), &desc, ValidationPolicy::Permissive).unwrap()
    }

    #[test]
    fn owned_normals_back_the_slot_until_overridden() {
        let device = HostDevice::new();
        let store = store(&device, &[0.0; 6]);
        let config = RasterizerConfig::default();
        let owned_id = store.vertex_normals().unwrap().raw().id();

        let bindings = FrameBindings::new();
        let inputs = KernelInputs::prepare(PassKind::Gradient, &store, &config, &bindings).unwrap();
        assert_eq!(inputs.slot(BufferSlot::VertexNormals).unwrap().raw().id(), owned_id);

        let caller = device.create_buffer("caller normals", 36).unwrap();
        let mut bindings = FrameBindings::new();
        bindings.set(BufferSlot::VertexNormals, &caller);
        let inputs = KernelInputs::prepare(PassKind::Gradient, &store, &config, &bindings).unwrap();
        assert_eq!(inputs.slot(BufferSlot::VertexNormals).unwrap().raw().id(), caller.id());
        assert_ne!(caller.id(), owned_id);
    }

    #[test]
    fn textured_mode_needs_texture_coordinates() {
        let device = HostDevice::new();
        let store = store(&device, &[0.0; 5]);
        let config = RasterizerConfig {
            albedo_mode: AlbedoMode::Textured,
            ..RasterizerConfig::default()
        };
        let bindings = FrameBindings::new();
        let err = KernelInputs::prepare(PassKind::Rasterize, &store, &config, &bindings).unwrap_err();
        assert!(matches!(
            err,
            RasterError::SectionUnavailable {
                section: Section::TextureCoordinates,
                pass: PassKind::Rasterize
            }
        ));

        // vertex-color mode does not sample the texture
        let config = RasterizerConfig::default();
        let inputs = KernelInputs::prepare(PassKind::Rasterize, &store, &config, &bindings).unwrap();
        assert!(inputs.static_buffer(StaticBuffer::TextureCoordinates).is_none());
    }
}
