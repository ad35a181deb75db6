//! Mesh record table decoding.
//!
//! ```text
//! word 0      format version
//! word 1      record stride in 32-bit words (>= 21)
//! word 2..    records, `stride` words each:
//!   0  node id                  u32
//!   1  material index           u32
//!   2  face index width         u32 (0 = 16-bit, else 32-bit)
//!   3  face byte offset         i32
//!   4  face count               i32 (triangles)
//!   5  vertex byte offset       i32
//!   6  vertex count             i32
//!   7  normal byte offset       i32
//!   8  uv0 byte offset          i32
//!   9  position quant range     f32
//!   10 position quant max       u32
//!   11 uv0 quant range          f32
//!   12 uv0 quant max            u32
//!   13 transform byte offset    i32
//!   14 bounds byte offset       i32
//!   15 lightmap width hint      u32
//!   16 lightmap height hint     u32
//!   17 surface area             f32
//!   18..20 reserved
//! ```
//!
//! Negative offsets mean "absent".

use crate::{
    data_structures::{
        bounds::Aabb,
        buffer_view::{read_f32, read_i32, read_u32},
    },
    error::SceneError,
};

/// Smallest record layout this decoder understands, in words.
pub const MIN_RECORD_STRIDE: u32 = 21;

const HEADER_WORDS: usize = 2;
const LIGHTMAP_TEXELS_PER_UNIT: f32 = 32.0;
const MIN_LIGHTMAP_RESOLUTION: u32 = 16;
const MAX_LIGHTMAP_RESOLUTION: u32 = 2048;

#[derive(Clone, Debug, PartialEq)]
pub struct MeshRecord {
    pub node_id: u32,
    pub material_index: usize,
    pub wide_faces: bool,
    pub face_byte_offset: Option<usize>,
    pub face_count: usize,
    pub vertex_byte_offset: Option<usize>,
    pub vertex_count: usize,
    pub normal_byte_offset: Option<usize>,
    pub uv0_byte_offset: Option<usize>,
    pub quant_range: f32,
    pub quant_max: u32,
    pub quant_uv0_range: f32,
    pub quant_uv0_max: u32,
    pub transform_byte_offset: Option<usize>,
    pub bounds_byte_offset: Option<usize>,
    pub bounds: Option<Aabb>,
    /// Only present for format version 2 and later.
    pub auto_lightmap_resolution: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct MeshRecordTable {
    pub version: u32,
    pub stride: u32,
    pub records: Vec<MeshRecord>,
    /// Placeholder records with no faces or vertices that were dropped.
    pub inert: usize,
}

pub fn decode_mesh_records(records: &[u8], bounds: &[u8]) -> Result<MeshRecordTable, SceneError> {
    let (Some(version), Some(stride)) = (read_u32(records, 0), read_u32(records, 4)) else {
        return Err(SceneError::MissingHeader(records.len()));
    };
    if stride < MIN_RECORD_STRIDE {
        return Err(SceneError::UnsupportedStride {
            stride,
            minimum: MIN_RECORD_STRIDE,
        });
    }

    let mut table = MeshRecordTable {
        version,
        stride,
        ..Default::default()
    };
    let Some(record_bytes) = usize::try_from(stride).ok().and_then(|s| s.checked_mul(4)) else {
        return Ok(table);
    };
    let mut start = HEADER_WORDS * 4;
    while let Some(end) = start.checked_add(record_bytes).filter(|&end| end <= records.len()) {
        let raw = &records[start..end];
        start = end;
        match decode_record(raw, bounds, version) {
            Some(record) => table.records.push(record),
            None => table.inert += 1,
        }
    }
    Ok(table)
}

/// Returns `None` for inert records.
fn decode_record(raw: &[u8], bounds: &[u8], version: u32) -> Option<MeshRecord> {
    let word = |i: usize| read_u32(raw, i * 4).unwrap_or(0);
    let int = |i: usize| read_i32(raw, i * 4).unwrap_or(-1);
    let float = |i: usize| read_f32(raw, i * 4).unwrap_or(0.0);
    let offset = |i: usize| usize::try_from(int(i)).ok();

    let face_count = int(4);
    let vertex_count = int(6);
    if face_count <= 0 || vertex_count <= 0 {
        return None;
    }

    let bounds_byte_offset = offset(14);
    let surface_area = float(17);
    let auto_lightmap_resolution =
        (version >= 2).then(|| lightmap_resolution(surface_area, word(15), word(16)));

    Some(MeshRecord {
        node_id: word(0),
        material_index: word(1) as usize,
        wide_faces: word(2) != 0,
        face_byte_offset: offset(3),
        face_count: face_count as usize,
        vertex_byte_offset: offset(5),
        vertex_count: vertex_count as usize,
        normal_byte_offset: offset(7),
        uv0_byte_offset: offset(8),
        quant_range: float(9),
        quant_max: word(10),
        quant_uv0_range: float(11),
        quant_uv0_max: word(12),
        transform_byte_offset: offset(13),
        bounds_byte_offset,
        bounds: bounds_byte_offset.and_then(|at| read_bounds(bounds, at)),
        auto_lightmap_resolution,
    })
}

fn read_bounds(bounds: &[u8], at: usize) -> Option<Aabb> {
    let f = |i: usize| read_f32(bounds, at + i * 4);
    let aabb = Aabb::new([f(0)?, f(1)?, f(2)?], [f(3)?, f(4)?, f(5)?]);
    (!aabb.is_empty()).then_some(aabb)
}

fn lightmap_resolution(surface_area: f32, width_hint: u32, height_hint: u32) -> u32 {
    let texels = if surface_area > 0.0 {
        (surface_area.sqrt() * LIGHTMAP_TEXELS_PER_UNIT).ceil() as u32
    } else {
        width_hint.max(height_hint)
    };
    texels
        .clamp(1, MAX_LIGHTMAP_RESOLUTION)
        .next_power_of_two()
        .clamp(MIN_LIGHTMAP_RESOLUTION, MAX_LIGHTMAP_RESOLUTION)
}
