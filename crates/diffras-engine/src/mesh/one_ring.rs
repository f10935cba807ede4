use crate::error::Result;

use super::checked_triangles;

/// Edge-connected neighbours of every vertex, sorted and deduplicated.
///
/// Used by edge-length regularisers, which compare each vertex against its
/// one-ring in a rest pose.
pub fn one_ring(vertex_count: usize, faces: &[i32]) -> Result<Vec<Vec<u32>>> {
    let triangles = checked_triangles(vertex_count, faces)?;

    let mut rings: Vec<Vec<u32>> = vec![Vec::new(); vertex_count];
    for [a, b, c] in triangles {
        for (v0, v1) in [(a, b), (b, c), (c, a)] {
            if v0 == v1 {
                continue;
            }
            rings[v0 as usize].push(v1);
            rings[v1 as usize].push(v0);
        }
    }

    for ring in &mut rings {
        ring.sort_unstable();
        ring.dedup();
    }

    Ok(rings)
}
