//! Host-side scene description and the dimensions derived from it.
//!
//! Layout conventions shared with the kernels:
//! - faces are flat `i32` triples
//! - texture coordinates are `(u, v)` per corner, 6 floats per face
//! - extrinsics are row-major 3x4, intrinsics row-major 3x3, one per camera
//! - per-pixel buffers are laid out `[camera][row][column]`

/// Floats per camera in the extrinsics list (3x4 pose).
pub const EXTRINSICS_STRIDE: usize = 12;

/// Floats per camera in the intrinsics list (3x3 projection).
pub const INTRINSICS_STRIDE: usize = 9;

/// Texture-coordinate floats per triangle.
pub const TEX_COORDS_PER_FACE: usize = 6;

/// Spherical-harmonic coefficients per camera (9 bands, RGB).
pub const SH_COEFFS_PER_CAMERA: usize = 27;

/// Face-ID value for pixels no triangle covers.
pub const NO_FACE: i32 = -1;

/// Constructor input for a scene.
///
/// All slices are copied to the device during construction; the descriptor can
/// be dropped afterwards.
#[derive(Debug, Clone, Copy)]
pub struct SceneDescriptor<'d> {
    /// Flat triangle list, three vertex indices per face.
    pub faces: &'d [i32],
    /// Flat `(u, v)` list, three corners per face.
    pub texture_coordinates: &'d [f32],
    pub vertex_count: usize,
    /// 12 floats per camera.
    pub extrinsics: &'d [f32],
    /// 9 floats per camera.
    pub intrinsics: &'d [f32],
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Dimensions of a constructed scene.
///
/// Counts belonging to a section that failed validation are zero.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct SceneDims {
    pub vertex_count: usize,
    pub face_count: usize,
    pub camera_count: usize,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl SceneDims {
    /// Pixels across all cameras.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.frame_width as usize * self.frame_height as usize * self.camera_count
    }
}

/// Size of the texture map in texels.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TextureSize {
    pub width: u32,
    pub height: u32,
}

impl TextureSize {
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
