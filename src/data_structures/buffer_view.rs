//! Typed read-only windows over the raw scene buffers.
//!
//! A scene ships its geometry as a handful of flat byte buffers. Which
//! interpretation applies to a given range depends on the mesh record that
//! points into it, so the views here are tagged unions with a single `get`
//! per view instead of width checks sprinkled over every call site.
//! Every read is bounds checked and returns `None` past the end of a buffer.

/// The seven byte buffers that make up one scene.
#[derive(Clone, Debug, Default)]
pub struct SceneBuffers {
    pub mesh_records: Vec<u8>,
    pub bounds: Vec<u8>,
    pub faces16: Vec<u8>,
    pub faces32: Vec<u8>,
    pub vertices: Vec<u8>,
    pub transforms: Vec<u8>,
    pub uv0: Vec<u8>,
}

impl SceneBuffers {
    pub fn vertex_view(&self, quant_max: u32) -> VertexView<'_> {
        VertexView::for_quant_max(&self.vertices, quant_max)
    }

    pub fn face_view(&self, wide: bool) -> FaceView<'_> {
        if wide {
            FaceView::Long(&self.faces32)
        } else {
            FaceView::Short(&self.faces16)
        }
    }

    pub fn uv_view(&self, quant_uv0_max: u32) -> UvView<'_> {
        if quant_uv0_max != 0 {
            UvView::Quantized(&self.uv0)
        } else {
            UvView::Float(&self.uv0)
        }
    }

    /// Reads a row-major 4x4 matrix of 16 floats at `byte_offset`.
    pub fn transform(&self, byte_offset: usize) -> Option<cgmath::Matrix4<f32>> {
        let mut m = [0.0f32; 16];
        for (i, value) in m.iter_mut().enumerate() {
            *value = read_f32(&self.transforms, byte_offset + i * 4)?;
        }
        // cgmath takes columns, the buffer stores rows
        Some(cgmath::Matrix4::new(
            m[0], m[4], m[8], m[12], m[1], m[5], m[9], m[13], m[2], m[6], m[10], m[14], m[3],
            m[7], m[11], m[15],
        ))
    }
}

/// Integer or float view over the vertex buffer.
///
/// The narrowest signed integer type able to hold the record's quantization
/// maximum is used. A maximum of zero marks unquantized geometry stored as f32.
#[derive(Clone, Copy, Debug)]
pub enum VertexView<'a> {
    Narrow(&'a [u8]),
    Medium(&'a [u8]),
    Wide(&'a [u8]),
    Float(&'a [u8]),
}

impl<'a> VertexView<'a> {
    pub fn for_quant_max(bytes: &'a [u8], quant_max: u32) -> Self {
        match quant_max {
            0 => Self::Float(bytes),
            1..=0x7f => Self::Narrow(bytes),
            0x80..=0x7fff => Self::Medium(bytes),
            _ => Self::Wide(bytes),
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Self::Narrow(_) => 1,
            Self::Medium(_) => 2,
            Self::Wide(_) | Self::Float(_) => 4,
        }
    }

    /// Element `index` counted from `byte_offset`, widened to f32.
    pub fn get(&self, byte_offset: usize, index: usize) -> Option<f32> {
        let at = byte_offset.checked_add(index.checked_mul(self.width())?)?;
        match self {
            Self::Narrow(bytes) => bytes.get(at).map(|b| *b as i8 as f32),
            Self::Medium(bytes) => read_array::<2>(bytes, at).map(|b| i16::from_le_bytes(b) as f32),
            Self::Wide(bytes) => read_array::<4>(bytes, at).map(|b| i32::from_le_bytes(b) as f32),
            Self::Float(bytes) => read_f32(bytes, at),
        }
    }
}

/// Face index view: 16-bit indices live in `faces16`, 32-bit ones in `faces32`.
#[derive(Clone, Copy, Debug)]
pub enum FaceView<'a> {
    Short(&'a [u8]),
    Long(&'a [u8]),
}

impl FaceView<'_> {
    pub fn get(&self, byte_offset: usize, index: usize) -> Option<u32> {
        match self {
            Self::Short(bytes) => {
                let at = byte_offset.checked_add(index.checked_mul(2)?)?;
                read_array::<2>(bytes, at).map(|b| u16::from_le_bytes(b) as u32)
            }
            Self::Long(bytes) => {
                let at = byte_offset.checked_add(index.checked_mul(4)?)?;
                read_array::<4>(bytes, at).map(u32::from_le_bytes)
            }
        }
    }
}

/// UV0 view: unsigned 16-bit when quantized, f32 otherwise.
#[derive(Clone, Copy, Debug)]
pub enum UvView<'a> {
    Quantized(&'a [u8]),
    Float(&'a [u8]),
}

impl UvView<'_> {
    pub fn get(&self, byte_offset: usize, index: usize) -> Option<f32> {
        match self {
            Self::Quantized(bytes) => {
                let at = byte_offset.checked_add(index.checked_mul(2)?)?;
                read_array::<2>(bytes, at).map(|b| u16::from_le_bytes(b) as f32)
            }
            Self::Float(bytes) => {
                let at = byte_offset.checked_add(index.checked_mul(4)?)?;
                read_f32(bytes, at)
            }
        }
    }
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> Option<[u8; N]> {
    bytes.get(at..at.checked_add(N)?)?.try_into().ok()
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    read_array::<4>(bytes, at).map(u32::from_le_bytes)
}

pub(crate) fn read_i32(bytes: &[u8], at: usize) -> Option<i32> {
    read_array::<4>(bytes, at).map(i32::from_le_bytes)
}

pub(crate) fn read_f32(bytes: &[u8], at: usize) -> Option<f32> {
    read_array::<4>(bytes, at).map(f32::from_le_bytes)
}
