//! Resolved, renderer-agnostic materials.

use std::sync::Arc;

use image::RgbaImage;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapMode {
    #[default]
    Repeat,
    /// Used by the environment map, whose poles must not bleed into each other.
    Clamp,
}

/// A decoded image plus the sub-rectangle of it a material samples.
///
/// Atlas regions share the underlying image and only differ in `scale` and
/// `offset`.
#[derive(Clone, Debug)]
pub struct TextureHandle {
    pub key: String,
    pub image: Arc<RgbaImage>,
    pub scale: [f32; 2],
    pub offset: [f32; 2],
    pub wrap: WrapMode,
}

impl TextureHandle {
    pub fn new(key: impl Into<String>, image: Arc<RgbaImage>) -> Self {
        Self {
            key: key.into(),
            image,
            scale: [1.0, 1.0],
            offset: [0.0, 0.0],
            wrap: WrapMode::Repeat,
        }
    }

    pub fn region(&self, scale: [f32; 2], offset: [f32; 2]) -> Self {
        Self {
            scale,
            offset,
            wrap: WrapMode::Repeat,
            ..self.clone()
        }
    }

}

#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub base_color: [f32; 3],
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
    pub transparent: bool,
    pub double_sided: bool,
    pub emissive: Option<[f32; 3]>,
    pub emissive_intensity: f32,
    pub texture: Option<TextureHandle>,
    /// Flat shaded, ignores lighting.
    pub unlit: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: [1.0, 1.0, 1.0],
            roughness: 1.0,
            metalness: 0.0,
            opacity: 1.0,
            transparent: false,
            double_sided: false,
            emissive: None,
            emissive_intensity: 1.0,
            texture: None,
            unlit: false,
        }
    }
}

/// Which material a decoded mesh currently renders with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialSlot {
    Authored(usize),
    Override(usize),
}
