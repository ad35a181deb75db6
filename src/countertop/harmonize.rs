//! Normal harmonization across adjacent countertop pieces.
//!
//! Slabs are often modelled as several meshes whose shared edges carry
//! slightly different normals, which shows up as seams once they are lit with
//! a single continuous texture. Vertices at (almost) the same position are
//! grouped into buckets and every member of a bucket gets the same normal.

use std::collections::HashMap;

use cgmath::{InnerSpace, Vector3, Zero};

use crate::data_structures::mesh::{DecodedMesh, face_normal};

/// Minimum Z component of a normal that counts as pointing up.
pub const UP_THRESHOLD: f32 = 0.85;
/// Height band below a mesh's top, relative to its height.
pub const TOP_BAND_FRACTION: f32 = 0.02;
pub const TOP_BAND_MIN: f32 = 0.002;
pub const BUCKET_XY: f32 = 0.005;
pub const BUCKET_Z: f32 = 0.02;

const UP: [f32; 3] = [0.0, 0.0, 1.0];

type BucketKey = (i64, i64, i64);

struct Bucket {
    members: Vec<(usize, usize)>,
    weighted: Vector3<f32>,
    top: bool,
}

impl Bucket {
    fn new() -> Self {
        Self {
            members: Vec::new(),
            weighted: Vector3::zero(),
            top: false,
        }
    }
}

fn bucket_key(p: [f32; 3]) -> BucketKey {
    (
        (p[0] / BUCKET_XY).round() as i64,
        (p[1] / BUCKET_XY).round() as i64,
        (p[2] / BUCKET_Z).round() as i64,
    )
}

/// Whether a face normal points mostly along +Z.
fn faces_up(normal: Vector3<f32>) -> bool {
    normal.z > 0.0 && normal.z >= normal.x.abs() && normal.z >= normal.y.abs()
}

/// Top-facing flags and incident face area of every vertex of `mesh`.
fn classify(mesh: &DecodedMesh) -> (Vec<bool>, Vec<f32>) {
    let count = mesh.positions.len();
    let (min_z, max_z) = mesh
        .positions
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[2]), hi.max(p[2]))
        });
    let band = ((max_z - min_z) * TOP_BAND_FRACTION).max(TOP_BAND_MIN);

    let mut top: Vec<bool> = mesh
        .positions
        .iter()
        .zip(&mesh.normals)
        .map(|(p, n)| n[2] >= UP_THRESHOLD || p[2] >= max_z - band)
        .collect();
    let mut area = vec![0.0f32; count];

    for [i0, i1, i2] in mesh.triangles() {
        if i0 >= count || i1 >= count || i2 >= count {
            continue;
        }
        let face = face_normal(mesh.positions[i0], mesh.positions[i1], mesh.positions[i2]);
        let face_area = face.magnitude() * 0.5;
        let up = faces_up(face);
        for i in [i0, i1, i2] {
            area[i] += face_area;
            top[i] |= up;
        }
    }
    (top, area)
}

/// Unifies the normals of the meshes at `targets` (indices into `meshes`).
///
/// Running it again on its own output changes nothing.
pub fn harmonize_normals(meshes: &mut [DecodedMesh], targets: &[usize]) {
    let mut buckets: HashMap<BucketKey, Bucket> = HashMap::new();
    for &mesh_index in targets {
        let Some(mesh) = meshes.get(mesh_index) else {
            continue;
        };
        let (top, area) = classify(mesh);
        for (vertex, position) in mesh.positions.iter().enumerate() {
            let bucket = buckets.entry(bucket_key(*position)).or_insert_with(Bucket::new);
            bucket.members.push((mesh_index, vertex));
            bucket.top |= top[vertex];
            let normal = Vector3::from(mesh.normals[vertex]);
            // vertices of degenerate faces still vote
            bucket.weighted += normal * area[vertex].max(f32::EPSILON);
        }
    }

    let mut vertical = 0;
    for bucket in buckets.values() {
        let normal = if bucket.top {
            UP
        } else if bucket.weighted.is_zero() {
            continue;
        } else {
            let mean = bucket.weighted.normalize();
            if mean.z >= UP_THRESHOLD { UP } else { mean.into() }
        };
        if normal == UP {
            vertical += 1;
        }
        for &(mesh_index, vertex) in &bucket.members {
            meshes[mesh_index].normals[vertex] = normal;
        }
    }
    log::debug!(
        "harmonized {} vertex buckets, {} of them vertical",
        buckets.len(),
        vertical
    );
}
