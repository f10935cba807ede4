use std::fmt;

use thiserror::Error;

use crate::scene::{EXTRINSICS_STRIDE, INTRINSICS_STRIDE, TEX_COORDS_PER_FACE};

/// Independently validated part of the scene store.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Section {
    /// Faces, `faceOfVertex` and the per-vertex ranges.
    Topology,
    TextureCoordinates,
    /// Extrinsics and intrinsics.
    Cameras,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Topology => "topology",
            Self::TextureCoordinates => "texture coordinate",
            Self::Cameras => "camera",
        })
    }
}

/// Non-fatal diagnostic recorded while building a store.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ConstructionWarning {
    #[error("no triangular faces: face list has {len} indices, not a multiple of 3")]
    MalformedFaces { len: usize },

    #[error(
        "texture coordinates have wrong dimensionality: {len} floats, not a multiple of {}",
        TEX_COORDS_PER_FACE
    )]
    MalformedTextureCoordinates { len: usize },

    #[error(
        "texture coordinates have wrong dimensionality: {len} floats for {face_count} faces \
         (expected {})",
        .face_count * TEX_COORDS_PER_FACE
    )]
    TextureFaceMismatch { len: usize, face_count: usize },

    #[error(
        "camera extrinsics or intrinsics have wrong dimensionality: extrinsics have dimension \
         {extrinsics_len} (stride {}), intrinsics have dimension {intrinsics_len} (stride {})",
        EXTRINSICS_STRIDE,
        INTRINSICS_STRIDE
    )]
    MalformedCameras {
        extrinsics_len: usize,
        intrinsics_len: usize,
    },

    #[error("no faces for vertex {vertex}")]
    ZeroAdjacency { vertex: u32 },

    #[error("vertex count is 0")]
    NoVertices,

    #[error("frame size {width}x{height} has no pixels")]
    EmptyFrame { width: u32, height: u32 },
}

impl ConstructionWarning {
    /// Section this warning disables, if any.
    pub fn section(&self) -> Option<Section> {
        match self {
            Self::MalformedFaces { .. } => Some(Section::Topology),
            Self::MalformedTextureCoordinates { .. } | Self::TextureFaceMismatch { .. } => {
                Some(Section::TextureCoordinates)
            }
            Self::MalformedCameras { .. } => Some(Section::Cameras),
            Self::ZeroAdjacency { .. } | Self::NoVertices | Self::EmptyFrame { .. } => None,
        }
    }
}

/// Outcome of building a store: what was rejected and why.
///
/// A harness can check [`is_clean`](Self::is_clean) to refuse silently
/// degraded instances.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ConstructionReport {
    warnings: Vec<ConstructionWarning>,
}

impl ConstructionReport {
    pub(crate) fn record(&mut self, warning: ConstructionWarning) {
        match warning.section() {
            Some(section) => log::warn!("{section} section rejected: {warning}"),
            // isolated vertices are already logged by the adjacency builder
            None if matches!(warning, ConstructionWarning::ZeroAdjacency { .. }) => {}
            None => log::warn!("{warning}"),
        }
        self.warnings.push(warning);
    }

    #[inline]
    pub fn warnings(&self) -> &[ConstructionWarning] {
        &self.warnings
    }

    /// `true` if no warnings were recorded.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// `true` if `section` passed validation.
    pub fn is_ready(&self, section: Section) -> bool {
        !self.warnings.iter().any(|w| w.section() == Some(section))
    }

    pub fn rejected_sections(&self) -> impl Iterator<Item = Section> + '_ {
        self.warnings.iter().filter_map(ConstructionWarning::section)
    }

    /// Vertices without incident faces.
    pub fn isolated_vertices(&self) -> impl Iterator<Item = u32> + '_ {
        self.warnings.iter().filter_map(|w| match w {
            ConstructionWarning::ZeroAdjacency { vertex } => Some(*vertex),
            _ => None,
        })
    }
}

impl fmt::Display for ConstructionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.warnings.is_empty() {
            return f.write_str("no warnings");
        }
        write!(f, "{} warning(s)", self.warnings.len())?;
        for w in &self.warnings {
            write!(f, "; {w}")?;
        }
        Ok(())
    }
}
