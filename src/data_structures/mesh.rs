//! Renderable geometry rebuilt from mesh records.

use cgmath::{InnerSpace, Vector3};

use crate::data_structures::{
    bounds::Aabb, buffer_view::SceneBuffers, mesh_record::MeshRecord,
};

/// World-space geometry of one mesh record.
///
/// Positions already carry the record's transform; nothing is applied at
/// render time.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedMesh {
    pub node_id: u32,
    pub material_index: usize,
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub normals: Vec<[f32; 3]>,
    pub bounds: Aabb,
}

impl DecodedMesh {
    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|c| [c[0] as usize, c[1] as usize, c[2] as usize])
    }
}

/// Rebuilds one mesh from its record.
///
/// Returns `None` when any read falls outside its buffer. Face indices that
/// point past the vertex count are clamped to 0 rather than rejected.
pub fn reconstruct(record: &MeshRecord, buffers: &SceneBuffers) -> Option<DecodedMesh> {
    let vertex_offset = record.vertex_byte_offset?;
    let face_offset = record.face_byte_offset?;

    let view = buffers.vertex_view(record.quant_max);
    let scale = if record.quant_max == 0 {
        1.0
    } else {
        record.quant_range / record.quant_max as f32
    };
    let transform = match record.transform_byte_offset {
        Some(at) => buffers.transform(at)?,
        None => cgmath::Matrix4::from_scale(1.0),
    };

    // Read the last element first so corrupt counts never drive an allocation.
    let position_scalars = record.vertex_count.checked_mul(3)?;
    view.get(vertex_offset, position_scalars.checked_sub(1)?)?;
    let mut positions = Vec::with_capacity(record.vertex_count);
    for i in 0..record.vertex_count {
        let local = Vector3::new(
            view.get(vertex_offset, i * 3)? * scale,
            view.get(vertex_offset, i * 3 + 1)? * scale,
            view.get(vertex_offset, i * 3 + 2)? * scale,
        );
        let world = transform * local.extend(1.0);
        positions.push([world.x, world.y, world.z]);
    }

    let faces = buffers.face_view(record.wide_faces);
    let index_count = record.face_count.checked_mul(3)?;
    faces.get(face_offset, index_count.checked_sub(1)?)?;
    let mut indices = Vec::with_capacity(index_count);
    for i in 0..index_count {
        let index = faces.get(face_offset, i)?;
        indices.push(if (index as usize) < record.vertex_count { index } else { 0 });
    }

    let uvs = match record.uv0_byte_offset {
        Some(uv_offset) => {
            let uv_view = buffers.uv_view(record.quant_uv0_max);
            let uv_scale = if record.quant_uv0_max == 0 {
                1.0
            } else {
                record.quant_uv0_range / record.quant_uv0_max as f32
            };
            uv_view.get(uv_offset, record.vertex_count.checked_mul(2)?.checked_sub(1)?)?;
            let mut uvs = Vec::with_capacity(record.vertex_count);
            for i in 0..record.vertex_count {
                uvs.push([
                    uv_view.get(uv_offset, i * 2)? * uv_scale,
                    uv_view.get(uv_offset, i * 2 + 1)? * uv_scale,
                ]);
            }
            Some(uvs)
        }
        None => None,
    };

    let normals = compute_normals(&positions, &indices);
    let bounds = record
        .bounds
        .unwrap_or_else(|| Aabb::from_points(positions.iter()));

    Some(DecodedMesh {
        node_id: record.node_id,
        material_index: record.material_index,
        positions,
        indices,
        uvs,
        normals,
        bounds,
    })
}

/// Area-weighted vertex normals.
///
/// The un-normalized cross product of two triangle edges has a length of twice
/// the triangle's area, so summing them weights larger faces more.
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut sums = vec![Vector3::new(0.0f32, 0.0, 0.0); positions.len()];
    for c in indices.chunks_exact(3) {
        let (i0, i1, i2) = (c[0] as usize, c[1] as usize, c[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let face = face_normal(positions[i0], positions[i1], positions[i2]);
        sums[i0] += face;
        sums[i1] += face;
        sums[i2] += face;
    }
    sums.into_iter()
        .map(|n| {
            // only a zero or non-finite sum has no direction
            let length = n.magnitude();
            if length > 0.0 && length.is_finite() {
                (n / length).into()
            } else {
                [0.0, 0.0, 1.0]
            }
        })
        .collect()
}

/// Un-normalized face normal, its length is twice the triangle area.
pub fn face_normal(p0: [f32; 3], p1: [f32; 3], p2: [f32; 3]) -> Vector3<f32> {
    let p0 = Vector3::from(p0);
    let delta_pos1 = Vector3::from(p1) - p0;
    let delta_pos2 = Vector3::from(p2) - p0;
    delta_pos1.cross(delta_pos2)
}
