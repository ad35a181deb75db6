#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::HashMap,
    io::Cursor,
};

use slab_ngin::{
    config::ScenePaths,
    data_structures::buffer_view::SceneBuffers,
    resources::{AssetSource, yield_now},
};

/// Asset source backed by a map that records every fetch.
#[derive(Default)]
pub(crate) struct MemorySource {
    files: RefCell<HashMap<String, Vec<u8>>>,
    fetches: RefCell<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.borrow_mut().insert(path.into(), bytes.into());
    }

    pub fn remove(&self, path: &str) {
        self.files.borrow_mut().remove(path);
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.borrow().clone()
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.borrow().iter().filter(|p| *p == path).count()
    }

    pub fn clear_fetches(&self) {
        self.fetches.borrow_mut().clear();
    }
}

impl AssetSource for MemorySource {
    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.fetches.borrow_mut().push(path.to_string());
        // let concurrent requests overlap like real network fetches
        yield_now().await;
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 {}", path))
    }
}

pub(crate) fn png(image: &image::RgbaImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png encoding");
    bytes.into_inner()
}

pub(crate) fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    png(&image::RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
}

/// Solid backdrop with a centred square of another colour.
pub(crate) fn square_on_backdrop(
    size: u32,
    square: u32,
    backdrop: [u8; 4],
    fill: [u8; 4],
) -> image::RgbaImage {
    let start = (size - square) / 2;
    image::RgbaImage::from_fn(size, size, |x, y| {
        let inside = (start..start + square).contains(&x) && (start..start + square).contains(&y);
        image::Rgba(if inside { fill } else { backdrop })
    })
}

pub(crate) const STRIDE: usize = 21;

/// Builds the binary buffers of a scene one mesh at a time.
pub(crate) struct SceneBuilder {
    pub version: u32,
    pub stride: u32,
    records: Vec<[u32; STRIDE]>,
    bounds: Vec<u8>,
    faces16: Vec<u8>,
    faces32: Vec<u8>,
    vertices: Vec<u8>,
    transforms: Vec<u8>,
    uv0: Vec<u8>,
}

fn absent() -> u32 {
    (-1i32) as u32
}

fn blank_record() -> [u32; STRIDE] {
    let mut words = [0u32; STRIDE];
    for i in [3, 5, 7, 8, 13, 14] {
        words[i] = absent();
    }
    words
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self {
            version: 2,
            stride: STRIDE as u32,
            records: Vec::new(),
            bounds: Vec::new(),
            faces16: Vec::new(),
            faces32: Vec::new(),
            vertices: Vec::new(),
            transforms: Vec::new(),
            uv0: Vec::new(),
        }
    }

    fn push_faces(&mut self, words: &mut [u32; STRIDE], indices: &[u32], wide: bool) {
        words[2] = wide as u32;
        words[4] = (indices.len() / 3) as u32;
        if wide {
            words[3] = self.faces32.len() as u32;
            for i in indices {
                self.faces32.extend_from_slice(&i.to_le_bytes());
            }
        } else {
            words[3] = self.faces16.len() as u32;
            for i in indices {
                self.faces16.extend_from_slice(&(*i as u16).to_le_bytes());
            }
        }
    }

    /// Unquantized mesh with 16-bit faces.
    pub fn mesh(&mut self, node_id: u32, material: u32, positions: &[[f32; 3]], indices: &[u32]) -> &mut Self {
        let mut words = blank_record();
        words[0] = node_id;
        words[1] = material;
        words[5] = self.vertices.len() as u32;
        words[6] = positions.len() as u32;
        for p in positions {
            for c in p {
                self.vertices.extend_from_slice(&c.to_le_bytes());
            }
        }
        self.push_faces(&mut words, indices, false);
        self.records.push(words);
        self
    }

    /// Mesh with 16-bit quantized positions and 32-bit faces.
    pub fn quantized_mesh(
        &mut self,
        node_id: u32,
        material: u32,
        positions: &[[i16; 3]],
        range: f32,
        max: u32,
        indices: &[u32],
    ) -> &mut Self {
        let mut words = blank_record();
        words[0] = node_id;
        words[1] = material;
        words[5] = self.vertices.len() as u32;
        words[6] = positions.len() as u32;
        words[9] = range.to_bits();
        words[10] = max;
        for p in positions {
            for c in p {
                self.vertices.extend_from_slice(&c.to_le_bytes());
            }
        }
        self.push_faces(&mut words, indices, true);
        self.records.push(words);
        self
    }

    /// Adds quantized u16 UVs to the last mesh.
    pub fn with_quantized_uvs(&mut self, uvs: &[[u16; 2]], range: f32, max: u32) -> &mut Self {
        let offset = self.uv0.len() as u32;
        for uv in uvs {
            for c in uv {
                self.uv0.extend_from_slice(&c.to_le_bytes());
            }
        }
        if let Some(words) = self.records.last_mut() {
            words[8] = offset;
            words[11] = range.to_bits();
            words[12] = max;
        }
        self
    }

    /// Adds a row-major transform to the last mesh.
    pub fn with_transform(&mut self, rows: [[f32; 4]; 4]) -> &mut Self {
        let offset = self.transforms.len() as u32;
        for row in rows {
            for c in row {
                self.transforms.extend_from_slice(&c.to_le_bytes());
            }
        }
        if let Some(words) = self.records.last_mut() {
            words[13] = offset;
        }
        self
    }

    pub fn with_bounds(&mut self, min: [f32; 3], max: [f32; 3]) -> &mut Self {
        let offset = self.bounds.len() as u32;
        for c in min.iter().chain(max.iter()) {
            self.bounds.extend_from_slice(&c.to_le_bytes());
        }
        if let Some(words) = self.records.last_mut() {
            words[14] = offset;
        }
        self
    }

    pub fn with_surface_area(&mut self, area: f32, width_hint: u32, height_hint: u32) -> &mut Self {
        if let Some(words) = self.records.last_mut() {
            words[15] = width_hint;
            words[16] = height_hint;
            words[17] = area.to_bits();
        }
        self
    }

    /// Sets any word of the last record.
    pub fn patch(&mut self, word: usize, value: u32) -> &mut Self {
        if let Some(words) = self.records.last_mut() {
            words[word] = value;
        }
        self
    }

    /// A placeholder record without any geometry.
    pub fn empty_mesh(&mut self, node_id: u32, material: u32) -> &mut Self {
        let mut words = blank_record();
        words[0] = node_id;
        words[1] = material;
        self.records.push(words);
        self
    }

    pub fn mesh_records(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.stride.to_le_bytes());
        for record in &self.records {
            for word in record {
                bytes.extend_from_slice(&word.to_le_bytes());
            }
            // wider strides pad every record
            for _ in STRIDE..self.stride as usize {
                bytes.extend_from_slice(&0u32.to_le_bytes());
            }
        }
        bytes
    }

    pub fn buffers(&self) -> SceneBuffers {
        SceneBuffers {
            mesh_records: self.mesh_records(),
            bounds: self.bounds.clone(),
            faces16: self.faces16.clone(),
            faces32: self.faces32.clone(),
            vertices: self.vertices.clone(),
            transforms: self.transforms.clone(),
            uv0: self.uv0.clone(),
        }
    }

    /// Stores the binary buffers of the scene under `paths`.
    pub fn store(&self, source: &MemorySource, paths: &ScenePaths) {
        let buffers = self.buffers();
        source.insert(paths.mesh_records(), buffers.mesh_records);
        source.insert(paths.bounds(), buffers.bounds);
        source.insert(paths.faces16(), buffers.faces16);
        source.insert(paths.faces32(), buffers.faces32);
        source.insert(paths.vertices(), buffers.vertices);
        source.insert(paths.transforms(), buffers.transforms);
        source.insert(paths.uv0(), buffers.uv0);
    }
}

/// Axis-aligned unit quad in the XY plane at height `z`, wound
/// counter-clockwise seen from above.
pub(crate) fn quad(x: f32, y: f32, size: f32, z: f32) -> (Vec<[f32; 3]>, Vec<u32>) {
    (
        vec![
            [x, y, z],
            [x + size, y, z],
            [x + size, y + size, z],
            [x, y + size, z],
        ],
        vec![0, 1, 2, 0, 2, 3],
    )
}

/// Closed box with its top at `z + height`. Faces are wound outwards.
pub(crate) fn slab(min: [f32; 3], max: [f32; 3]) -> (Vec<[f32; 3]>, Vec<u32>) {
    let [x0, y0, z0] = min;
    let [x1, y1, z1] = max;
    let positions = vec![
        [x0, y0, z0],
        [x1, y0, z0],
        [x1, y1, z0],
        [x0, y1, z0],
        [x0, y0, z1],
        [x1, y0, z1],
        [x1, y1, z1],
        [x0, y1, z1],
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // bottom
        4, 5, 6, 4, 6, 7, // top
        0, 1, 5, 0, 5, 4, // front
        1, 2, 6, 1, 6, 5, // right
        2, 3, 7, 2, 7, 6, // back
        3, 0, 4, 3, 4, 7, // left
    ];
    (positions, indices)
}

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
