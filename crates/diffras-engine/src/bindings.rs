//! Per-iteration buffer wiring.
//!
//! [`FrameBindings`] is the single record of every caller-owned buffer the
//! kernels read or write. Each field holds a cloned backend handle, which
//! shares the caller's allocation without owning it: the caller still
//! releases the buffer. Whether a field must be present depends on the pass
//! and the render configuration (see [`BufferSlot::requirement`]).

use std::fmt;

use crate::config::RasterizerConfig;
use crate::device::{BufferRef, DeviceBackend};
use crate::error::{RasterError, Result};
use crate::scene::{SH_COEFFS_PER_CAMERA, SceneDims, TextureSize};

const F32: u64 = 4;
const I32: u64 = 4;

/// Kernel entry point.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PassKind {
    /// Forward pass: writes face-ID and barycentric buffers.
    Rasterize,
    /// Backward pass: scatters render-buffer gradients to the gradient outputs.
    Gradient,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rasterize => "rasterization",
            Self::Gradient => "gradient",
        })
    }
}

/// Whether a pass needs a slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Requirement {
    Required,
    /// Bound if wired, replaced by a placeholder otherwise.
    Optional,
    /// Not bound by this pass.
    Unused,
}

/// Named caller-owned buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferSlot {
    Vertices,
    VertexColors,
    /// Overrides the store-owned normal storage when wired.
    VertexNormals,
    TextureMap,
    ShCoefficients,
    FaceIds,
    Barycentrics,
    RenderBufferGrad,
    VertexPosGrad,
    VertexColorGrad,
    TextureGrad,
    ShCoeffGrad,
}

impl BufferSlot {
    pub const ALL: [Self; 12] = [
        Self::Vertices,
        Self::VertexColors,
        Self::VertexNormals,
        Self::TextureMap,
        Self::ShCoefficients,
        Self::FaceIds,
        Self::Barycentrics,
        Self::RenderBufferGrad,
        Self::VertexPosGrad,
        Self::VertexColorGrad,
        Self::TextureGrad,
        Self::ShCoeffGrad,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Vertices => "vertices",
            Self::VertexColors => "vertex colors",
            Self::VertexNormals => "vertex normals",
            Self::TextureMap => "texture map",
            Self::ShCoefficients => "SH coefficients",
            Self::FaceIds => "face-ID buffer",
            Self::Barycentrics => "barycentric buffer",
            Self::RenderBufferGrad => "render-buffer gradient",
            Self::VertexPosGrad => "vertex position gradient",
            Self::VertexColorGrad => "vertex color gradient",
            Self::TextureGrad => "texture gradient",
            Self::ShCoeffGrad => "SH coefficient gradient",
        }
    }

    /// How `pass` treats this slot under `config`.
    pub fn requirement(self, pass: PassKind, config: &RasterizerConfig) -> Requirement {
        use Requirement::*;

        let when = |cond: bool| if cond { Required } else { Optional };
        match (self, pass) {
            (Self::Vertices | Self::FaceIds | Self::Barycentrics, _) => Required,
            (Self::VertexNormals, _) => Optional,
            (Self::VertexColors, _) => when(config.uses_vertex_colors()),
            (Self::TextureMap, _) => when(config.uses_texture()),
            (Self::ShCoefficients, _) => when(config.uses_shading()),

            (Self::RenderBufferGrad | Self::VertexPosGrad, PassKind::Gradient) => Required,
            (Self::VertexColorGrad, PassKind::Gradient) => when(config.uses_vertex_colors()),
            (Self::TextureGrad, PassKind::Gradient) => when(config.uses_texture()),
            (Self::ShCoeffGrad, PassKind::Gradient) => when(config.uses_shading()),

            (
                Self::RenderBufferGrad
                | Self::VertexPosGrad
                | Self::VertexColorGrad
                | Self::TextureGrad
                | Self::ShCoeffGrad,
                PassKind::Rasterize,
            ) => Unused,
        }
    }

    /// Minimum size in bytes a buffer in this slot must have.
    pub fn min_size(self, dims: &SceneDims, texture: TextureSize) -> u64 {
        let vertices = dims.vertex_count as u64;
        let pixels = dims.pixel_count() as u64;
        let texels = texture.texel_count() as u64;
        let sh = (dims.camera_count * SH_COEFFS_PER_CAMERA) as u64;

        match self {
            Self::Vertices | Self::VertexColors | Self::VertexPosGrad | Self::VertexColorGrad => {
                vertices * 3 * F32
            }
            Self::VertexNormals => vertices * dims.camera_count as u64 * 3 * F32,
            Self::TextureMap | Self::TextureGrad => texels * 3 * F32,
            Self::ShCoefficients | Self::ShCoeffGrad => sh * F32,
            Self::FaceIds => pixels * I32,
            Self::Barycentrics => pixels * 2 * F32,
            Self::RenderBufferGrad => pixels * 3 * F32,
        }
    }
}

impl fmt::Display for BufferSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller-owned buffers wired for the current iteration.
///
/// Handles are cloned in, so a buffer allocated for one iteration can be wired
/// without outliving the orchestrator.
pub struct FrameBindings<B: DeviceBackend> {
    pub vertices: Option<B::Buffer>,
    pub vertex_colors: Option<B::Buffer>,
    pub vertex_normals: Option<B::Buffer>,
    pub texture_map: Option<B::Buffer>,
    pub sh_coefficients: Option<B::Buffer>,
    pub face_ids: Option<B::Buffer>,
    pub barycentrics: Option<B::Buffer>,
    pub render_buffer_grad: Option<B::Buffer>,
    pub vertex_pos_grad: Option<B::Buffer>,
    pub vertex_color_grad: Option<B::Buffer>,
    pub texture_grad: Option<B::Buffer>,
    pub sh_coeff_grad: Option<B::Buffer>,

    /// Dimensions of the wired texture map. Survives [`FrameBindings::clear`].
    pub texture_size: TextureSize,
}

impl<B: DeviceBackend> Default for FrameBindings<B> {
    fn default() -> Self {
        Self {
            vertices: None,
            vertex_colors: None,
            vertex_normals: None,
            texture_map: None,
            sh_coefficients: None,
            face_ids: None,
            barycentrics: None,
            render_buffer_grad: None,
            vertex_pos_grad: None,
            vertex_color_grad: None,
            texture_grad: None,
            sh_coeff_grad: None,
            texture_size: TextureSize::default(),
        }
    }
}

impl<B: DeviceBackend> FrameBindings<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: BufferSlot) -> Option<BufferRef<'_, B>> {
        let handle = match slot {
            BufferSlot::Vertices => &self.vertices,
            BufferSlot::VertexColors => &self.vertex_colors,
            BufferSlot::VertexNormals => &self.vertex_normals,
            BufferSlot::TextureMap => &self.texture_map,
            BufferSlot::ShCoefficients => &self.sh_coefficients,
            BufferSlot::FaceIds => &self.face_ids,
            BufferSlot::Barycentrics => &self.barycentrics,
            BufferSlot::RenderBufferGrad => &self.render_buffer_grad,
            BufferSlot::VertexPosGrad => &self.vertex_pos_grad,
            BufferSlot::VertexColorGrad => &self.vertex_color_grad,
            BufferSlot::TextureGrad => &self.texture_grad,
            BufferSlot::ShCoeffGrad => &self.sh_coeff_grad,
        };
        handle.as_ref().map(BufferRef::new)
    }

    fn slot_mut(&mut self, slot: BufferSlot) -> &mut Option<B::Buffer> {
        match slot {
            BufferSlot::Vertices => &mut self.vertices,
            BufferSlot::VertexColors => &mut self.vertex_colors,
            BufferSlot::VertexNormals => &mut self.vertex_normals,
            BufferSlot::TextureMap => &mut self.texture_map,
            BufferSlot::ShCoefficients => &mut self.sh_coefficients,
            BufferSlot::FaceIds => &mut self.face_ids,
            BufferSlot::Barycentrics => &mut self.barycentrics,
            BufferSlot::RenderBufferGrad => &mut self.render_buffer_grad,
            BufferSlot::VertexPosGrad => &mut self.vertex_pos_grad,
            BufferSlot::VertexColorGrad => &mut self.vertex_color_grad,
            BufferSlot::TextureGrad => &mut self.texture_grad,
            BufferSlot::ShCoeffGrad => &mut self.sh_coeff_grad,
        }
    }

    /// Installs a clone of `buffer`'s handle, replacing any previous one.
    #[inline]
    pub fn set(&mut self, slot: BufferSlot, buffer: &B::Buffer) {
        *self.slot_mut(slot) = Some(buffer.clone());
    }

    #[inline]
    pub fn is_wired(&self, slot: BufferSlot) -> bool {
        self.get(slot).is_some()
    }

    /// Drops every handle. Texture dimensions are kept.
    pub fn clear(&mut self) {
        for slot in BufferSlot::ALL {
            *self.slot_mut(slot) = None;
        }
    }

    /// Checks that `pass` can run with the current wiring.
    ///
    /// Every required slot must be wired, and every wired slot the pass binds
    /// must be large enough for `dims`.
    pub fn validate(
        &self,
        device: &B,
        pass: PassKind,
        config: &RasterizerConfig,
        dims: &SceneDims,
    ) -> Result<()> {
        for slot in BufferSlot::ALL {
            let requirement = slot.requirement(pass, config);
            if requirement == Requirement::Unused {
                continue;
            }

            let Some(buffer) = self.get(slot) else {
                if requirement == Requirement::Required {
                    return Err(RasterError::UnwiredBuffer { slot, pass });
                }
                continue;
            };

            let expected = slot.min_size(dims, self.texture_size);
            let actual = device.buffer_size(buffer.raw());
            if actual < expected {
                return Err(RasterError::BufferTooSmall {
                    slot,
                    pass,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl<B: DeviceBackend> fmt::Debug for FrameBindings<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wired: Vec<_> = BufferSlot::ALL
            .into_iter()
            .filter(|s| self.is_wired(*s))
            .collect();
        f.debug_struct("FrameBindings")
            .field("wired", &wired)
            .field("texture_size", &self.texture_size)
            .finish()
    }
}
