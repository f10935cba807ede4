use std::fmt;

use crate::config::ValidationPolicy;
use crate::device::{DeviceBackend, OwnedBuffer};
use crate::error::{RasterError, Result};
use crate::mesh::VertexAdjacency;
use crate::scene::{
    EXTRINSICS_STRIDE, INTRINSICS_STRIDE, SceneDescriptor, SceneDims, TEX_COORDS_PER_FACE,
};

use super::{ConstructionReport, ConstructionWarning};

const F32_BYTES: u64 = 4;

/// Device buffers of the topology section.
#[derive(Debug)]
pub struct TopologyBuffers<B: DeviceBackend> {
    /// `i32` triples, one per face.
    pub faces: OwnedBuffer<B>,
    /// Flattened incident-face ids (`u32`).
    pub face_of_vertex: OwnedBuffer<B>,
    /// `(offset, count)` per vertex, dense (`count == 0` for isolated ones).
    pub vertex_face_ranges: OwnedBuffer<B>,
}

/// Device buffers of the camera section.
#[derive(Debug)]
pub struct CameraBuffers<B: DeviceBackend> {
    /// 12 floats per camera.
    pub extrinsics: OwnedBuffer<B>,
    /// 9 floats per camera.
    pub intrinsics: OwnedBuffer<B>,
}

/// Owns every device buffer derived from constructor input.
///
/// All owned allocations are [`OwnedBuffer`]s and are released when the store
/// is dropped. Sections that failed validation are `None` and release nothing.
pub struct DeviceSceneStore<B: DeviceBackend> {
    device: B,
    dims: SceneDims,
    adjacency: Option<VertexAdjacency>,
    topology: Option<TopologyBuffers<B>>,
    texture_coordinates: Option<OwnedBuffer<B>>,
    cameras: Option<CameraBuffers<B>>,
    /// `vertex_count * camera_count` float3s.
    vertex_normals: Option<OwnedBuffer<B>>,
    /// `face_count * camera_count` float3s.
    face_normals: Option<OwnedBuffer<B>>,
    report: ConstructionReport,
}

impl<B: DeviceBackend> DeviceSceneStore<B> {
    /// Validates and uploads every section of `desc`.
    ///
    /// Sections are validated in order (faces, texture coordinates, cameras)
    /// and independently. Under [`ValidationPolicy::Permissive`] rejected
    /// sections are recorded in the report and left unallocated; under
    /// [`ValidationPolicy::Strict`] any warning fails construction.
    ///
    /// A zero vertex count or frame dimension is recorded as a warning that
    /// rejects no section.
    ///
    /// Out-of-range face indices and device faults always fail construction.
    pub fn new(device: B, desc: &SceneDescriptor<'_>, policy: ValidationPolicy) -> Result<Self> {
        let mut report = ConstructionReport::default();
        if desc.vertex_count == 0 {
            report.record(ConstructionWarning::NoVertices);
        }
        if desc.frame_width == 0 || desc.frame_height == 0 {
            report.record(ConstructionWarning::EmptyFrame {
                width: desc.frame_width,
                height: desc.frame_height,
            });
        }

        let topology = upload_topology(&device, desc, &mut report)?;
        let face_count = topology.as_ref().map_or(0, |_| desc.faces.len() / 3);
        let (adjacency, topology) = match topology {
            Some((adjacency, buffers)) => (Some(adjacency), Some(buffers)),
            None => (None, None),
        };

        let texture_coordinates = upload_texture_coordinates(
            &device,
            desc.texture_coordinates,
            adjacency.as_ref().map(|_| face_count),
            &mut report,
        )?;

        let cameras = upload_cameras(&device, desc, &mut report)?;
        let camera_count = cameras.as_ref().map_or(0, |_| desc.extrinsics.len() / EXTRINSICS_STRIDE);

        let normal_bytes = |count: usize| (count * camera_count * 3) as u64 * F32_BYTES;
        let vertex_normals = match normal_bytes(desc.vertex_count) {
            0 => None,
            bytes => Some(OwnedBuffer::zeroed(&device, "diffras vertex normals", bytes)?),
        };
        let face_normals = match normal_bytes(face_count) {
            0 => None,
            bytes => Some(OwnedBuffer::zeroed(&device, "diffras face normals", bytes)?),
        };

        let store = Self {
            device,
            dims: SceneDims {
                vertex_count: desc.vertex_count,
                face_count,
                camera_count,
                frame_width: desc.frame_width,
                frame_height: desc.frame_height,
            },
            adjacency,
            topology,
            texture_coordinates,
            cameras,
            vertex_normals,
            face_normals,
            report,
        };

        if policy == ValidationPolicy::Strict && !store.report.is_clean() {
            return Err(RasterError::MalformedInput(store.report.clone()));
        }

        log::debug!(
            "scene store ready on {}: {:?} ({})",
            store.device.name(),
            store.dims,
            store.report
        );
        Ok(store)
    }

    #[inline]
    pub fn device(&self) -> &B {
        &self.device
    }

    #[inline]
    pub fn dims(&self) -> &SceneDims {
        &self.dims
    }

    #[inline]
    pub fn report(&self) -> &ConstructionReport {
        &self.report
    }

    /// Host copy of the adjacency, if the topology section was accepted.
    #[inline]
    pub fn adjacency(&self) -> Option<&VertexAdjacency> {
        self.adjacency.as_ref()
    }

    #[inline]
    pub fn topology(&self) -> Option<&TopologyBuffers<B>> {
        self.topology.as_ref()
    }

    #[inline]
    pub fn texture_coordinates(&self) -> Option<&OwnedBuffer<B>> {
        self.texture_coordinates.as_ref()
    }

    #[inline]
    pub fn cameras(&self) -> Option<&CameraBuffers<B>> {
        self.cameras.as_ref()
    }

    #[inline]
    pub fn vertex_normals(&self) -> Option<&OwnedBuffer<B>> {
        self.vertex_normals.as_ref()
    }

    #[inline]
    pub fn face_normals(&self) -> Option<&OwnedBuffer<B>> {
        self.face_normals.as_ref()
    }
}

impl<B: DeviceBackend> fmt::Debug for DeviceSceneStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSceneStore")
            .field("backend", &self.device.name())
            .field("dims", &self.dims)
            .field("topology", &self.topology.is_some())
            .field("texture_coordinates", &self.texture_coordinates.is_some())
            .field("cameras", &self.cameras.is_some())
            .field("report", &self.report)
            .finish()
    }
}

fn upload_topology<B: DeviceBackend>(
    device: &B,
    desc: &SceneDescriptor<'_>,
    report: &mut ConstructionReport,
) -> Result<Option<(VertexAdjacency, TopologyBuffers<B>)>> {
    if desc.faces.len() % 3 != 0 {
        report.record(ConstructionWarning::MalformedFaces {
            len: desc.faces.len(),
        });
        return Ok(None);
    }

    let adjacency = VertexAdjacency::build(desc.vertex_count, desc.faces)?;
    for &vertex in adjacency.isolated() {
        report.record(ConstructionWarning::ZeroAdjacency { vertex });
    }

    let buffers = TopologyBuffers {
        faces: OwnedBuffer::upload(device, "diffras faces", desc.faces)?,
        face_of_vertex: OwnedBuffer::upload(
            device,
            "diffras face of vertex",
            adjacency.face_of_vertex(),
        )?,
        vertex_face_ranges: OwnedBuffer::upload(
            device,
            "diffras vertex face ranges",
            adjacency.ranges(),
        )?,
    };

    Ok(Some((adjacency, buffers)))
}

/// `face_count` is `None` when the topology section was rejected; only the
/// stride is checked then.
fn upload_texture_coordinates<B: DeviceBackend>(
    device: &B,
    coords: &[f32],
    face_count: Option<usize>,
    report: &mut ConstructionReport,
) -> Result<Option<OwnedBuffer<B>>> {
    let len = coords.len();
    if len % TEX_COORDS_PER_FACE != 0 {
        report.record(ConstructionWarning::MalformedTextureCoordinates { len });
        return Ok(None);
    }
    if let Some(face_count) = face_count.filter(|&f| f * TEX_COORDS_PER_FACE != len) {
        report.record(ConstructionWarning::TextureFaceMismatch { len, face_count });
        return Ok(None);
    }

    Ok(Some(OwnedBuffer::upload(
        device,
        "diffras texture coordinates",
        coords,
    )?))
}

fn upload_cameras<B: DeviceBackend>(
    device: &B,
    desc: &SceneDescriptor<'_>,
    report: &mut ConstructionReport,
) -> Result<Option<CameraBuffers<B>>> {
    let extrinsics_len = desc.extrinsics.len();
    let intrinsics_len = desc.intrinsics.len();

    let well_formed = extrinsics_len % EXTRINSICS_STRIDE == 0
        && intrinsics_len % INTRINSICS_STRIDE == 0
        && extrinsics_len / EXTRINSICS_STRIDE == intrinsics_len / INTRINSICS_STRIDE;
    if !well_formed {
        report.record(ConstructionWarning::MalformedCameras {
            extrinsics_len,
            intrinsics_len,
        });
        return Ok(None);
    }

    Ok(Some(CameraBuffers {
        extrinsics: OwnedBuffer::upload(device, "diffras camera extrinsics", desc.extrinsics)?,
        intrinsics: OwnedBuffer::upload(device, "diffras camera intrinsics", desc.intrinsics)?,
    }))
}
