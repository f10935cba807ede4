use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::error::{RasterError, Result};

/// Run of face ids belonging to one vertex inside
/// [`VertexAdjacency::face_of_vertex`].
///
/// This is also the device layout of the vertex index buffer: one
/// `(offset, count)` pair per vertex.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct FaceRange {
    pub offset: u32,
    pub count: u32,
}

impl FaceRange {
    #[inline]
    pub fn as_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.count as usize
    }
}

/// Vertex → incident-face mapping.
///
/// Faces are grouped per vertex in vertex order, and within a vertex in the
/// order they appear in the triangle list. A degenerate triangle that repeats a
/// vertex is listed once for that vertex.
///
/// Vertices without incident faces are reported by [`isolated`] and are absent
/// from [`range`] / [`iter`]. The dense [`ranges`] table still carries an entry
/// for them (`count == 0`) so device-side lookups can index by vertex id.
///
/// [`isolated`]: VertexAdjacency::isolated
/// [`range`]: VertexAdjacency::range
/// [`iter`]: VertexAdjacency::iter
/// [`ranges`]: VertexAdjacency::ranges
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct VertexAdjacency {
    face_of_vertex: Vec<u32>,
    ranges: Vec<FaceRange>,
    isolated: Vec<u32>,
}

impl VertexAdjacency {
    /// Builds the mapping in a single pass over the triangles.
    ///
    /// `faces` is a flat triangle list; indices beyond the last full triple
    /// are ignored. Fails if any index lies outside `[0, vertex_count)`.
    pub fn build(vertex_count: usize, faces: &[i32]) -> Result<Self> {
        let triangles = checked_triangles(vertex_count, faces)?;

        let mut counts = vec![0u32; vertex_count];
        for tri in &triangles {
            for v in distinct_corners(tri) {
                counts[v as usize] += 1;
            }
        }

        let mut ranges = Vec::with_capacity(vertex_count);
        let mut isolated = Vec::new();
        let mut offset = 0u32;
        for (v, &count) in counts.iter().enumerate() {
            if count == 0 {
                log::warn!("no faces for vertex {v}");
                isolated.push(v as u32);
            }
            ranges.push(FaceRange { offset, count });
            offset += count;
        }

        // Second pass fills each bucket in triangle order.
        let mut face_of_vertex = vec![0u32; offset as usize];
        let mut cursor: Vec<u32> = ranges.iter().map(|r| r.offset).collect();
        for (face, tri) in triangles.iter().enumerate() {
            for v in distinct_corners(tri) {
                let slot = &mut cursor[v as usize];
                face_of_vertex[*slot as usize] = face as u32;
                *slot += 1;
            }
        }

        log::debug!(
            "built adjacency: {} vertices, {} faces, {} entries, {} isolated",
            vertex_count,
            triangles.len(),
            face_of_vertex.len(),
            isolated.len()
        );

        Ok(Self {
            face_of_vertex,
            ranges,
            isolated,
        })
    }

    /// Flattened face ids, grouped per vertex.
    #[inline]
    pub fn face_of_vertex(&self) -> &[u32] {
        &self.face_of_vertex
    }

    /// Dense `(offset, count)` table, one entry per vertex.
    #[inline]
    pub fn ranges(&self) -> &[FaceRange] {
        &self.ranges
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.ranges.len()
    }

    /// Vertices that no face references, ascending.
    #[inline]
    pub fn isolated(&self) -> &[u32] {
        &self.isolated
    }

    /// Range of `vertex`, or `None` if it is isolated or out of bounds.
    pub fn range(&self, vertex: u32) -> Option<FaceRange> {
        self.ranges
            .get(vertex as usize)
            .copied()
            .filter(|r| r.count > 0)
    }

    /// Faces incident to `vertex`; empty for isolated vertices.
    pub fn faces_of(&self, vertex: u32) -> &[u32] {
        self.range(vertex)
            .map_or(&[][..], |r| &self.face_of_vertex[r.as_range()])
    }

    /// Iterates `(vertex, range)` for every vertex with at least one face.
    pub fn iter(&self) -> impl Iterator<Item = (u32, FaceRange)> + '_ {
        self.ranges
            .iter()
            .enumerate()
            .filter(|(_, r)| r.count > 0)
            .map(|(v, r)| (v as u32, *r))
    }
}

/// Splits `faces` into triangles, validating every index.
pub(crate) fn checked_triangles(vertex_count: usize, faces: &[i32]) -> Result<Vec<[u32; 3]>> {
    faces
        .chunks_exact(3)
        .enumerate()
        .map(|(face, tri)| {
            let mut out = [0u32; 3];
            for (corner, &index) in tri.iter().enumerate() {
                if index < 0 || index as usize >= vertex_count {
                    return Err(RasterError::FaceIndexOutOfRange {
                        face,
                        corner,
                        index: i64::from(index),
                        vertex_count,
                    });
                }
                out[corner] = index as u32;
            }
            Ok(out)
        })
        .collect()
}

/// Corners of `tri` with repeats removed, in corner order.
fn distinct_corners(tri: &[u32; 3]) -> impl Iterator<Item = u32> {
    let [a, b, c] = *tri;
    let b = (b != a).then_some(b);
    let c = (c != a && Some(c) != b).then_some(c);
    std::iter::once(a).chain(b).chain(c)
}
