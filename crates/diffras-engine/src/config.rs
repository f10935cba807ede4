//! Render configuration: albedo and shading modes, filter sizes and the
//! validation policy.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Source of the per-pixel base color.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum AlbedoMode {
    /// Interpolated per-vertex colors.
    #[default]
    VertexColor,
    /// Texture lookup through the per-face texture coordinates.
    Textured,
    /// Shaded normal visualisation.
    Normal,
    /// Illumination only (white albedo).
    Lighting,
    /// Binary coverage mask.
    ForegroundMask,
}

/// Whether the spherical-harmonic illumination is applied.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum ShadingMode {
    #[default]
    Shaded,
    Shadeless,
}

/// Construction-time validation behaviour.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum ValidationPolicy {
    /// Record per-section warnings and keep the degraded store.
    #[default]
    Permissive,
    /// Reject the store if any section failed or any vertex is isolated.
    Strict,
}

/// Rasterizer configuration.
///
/// Follows the init-struct pattern; start from `Default` and override fields.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RasterizerConfig {
    pub albedo_mode: AlbedoMode,
    pub shading_mode: ShadingMode,

    /// Box-filter radius (pixels) applied to the render-buffer gradient.
    pub image_filter_size: u32,

    /// Box-filter radius (texels) applied to texture lookups.
    pub texture_filter_size: u32,

    pub validation: ValidationPolicy,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            albedo_mode: AlbedoMode::default(),
            shading_mode: ShadingMode::default(),
            image_filter_size: 1,
            texture_filter_size: 1,
            validation: ValidationPolicy::default(),
        }
    }
}

impl RasterizerConfig {
    #[inline]
    pub fn uses_vertex_colors(&self) -> bool {
        self.albedo_mode == AlbedoMode::VertexColor
    }

    #[inline]
    pub fn uses_texture(&self) -> bool {
        self.albedo_mode == AlbedoMode::Textured
    }

    #[inline]
    pub fn uses_shading(&self) -> bool {
        self.shading_mode == ShadingMode::Shaded
    }
}

/// Unrecognised mode name.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
#[error("unknown {kind} mode `{name}`")]
pub struct ParseModeError {
    kind: &'static str,
    name: String,
}

impl AlbedoMode {
    /// Value written into kernel parameter blocks.
    pub(crate) fn code(self) -> u32 {
        match self {
            Self::VertexColor => 0,
            Self::Textured => 1,
            Self::Normal => 2,
            Self::Lighting => 3,
            Self::ForegroundMask => 4,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::VertexColor => "vertexColor",
            Self::Textured => "textured",
            Self::Normal => "normal",
            Self::Lighting => "lighting",
            Self::ForegroundMask => "foregroundMask",
        }
    }
}

impl ShadingMode {
    pub(crate) fn code(self) -> u32 {
        match self {
            Self::Shaded => 0,
            Self::Shadeless => 1,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Shaded => "shaded",
            Self::Shadeless => "shadeless",
        }
    }
}

impl fmt::Display for AlbedoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ShadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlbedoMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::VertexColor,
            Self::Textured,
            Self::Normal,
            Self::Lighting,
            Self::ForegroundMask,
        ]
        .into_iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| ParseModeError {
            kind: "albedo",
            name: s.to_owned(),
        })
    }
}

impl FromStr for ShadingMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Shaded, Self::Shadeless]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseModeError {
                kind: "shading",
                name: s.to_owned(),
            })
    }
}
