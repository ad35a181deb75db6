use crate::data_structures::mesh::DecodedMesh;

/// Planar UV of a world position, projected along the normal's dominant axis.
///
/// X-facing vertices map to (y, z), Y-facing to (x, z), everything else to
/// (x, y). The mapping only depends on the position and the normal, so
/// neighbouring meshes that share an edge get the same UVs along it.
pub fn planar_uv(position: [f32; 3], normal: [f32; 3], texels_per_unit: f32) -> [f32; 2] {
    let [nx, ny, nz] = normal.map(f32::abs);
    let [x, y, z] = position;
    let (u, v) = if nx >= ny && nx >= nz {
        (y, z)
    } else if ny >= nz {
        (x, z)
    } else {
        (x, y)
    };
    [u * texels_per_unit, v * texels_per_unit]
}

/// Replaces the mesh's UVs with a world-space planar projection.
pub fn project_uvs(mesh: &mut DecodedMesh, texels_per_unit: f32) {
    let uvs = mesh
        .positions
        .iter()
        .zip(&mesh.normals)
        .map(|(p, n)| planar_uv(*p, *n, texels_per_unit))
        .collect();
    mesh.uvs = Some(uvs);
}
