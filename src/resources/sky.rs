//! Sky backdrop and environment reflection source.
//!
//! Skies are authored Y-up while the render space is Z-up, so the sphere is
//! first rotated a quarter turn around X and only then by the authored yaw
//! around Z. The reflection copy keeps the image unrotated.

use std::sync::Arc;

use cgmath::{Deg, Matrix4};

use crate::{
    config::EngineConfig,
    data_structures::{
        bounds::Aabb,
        manifest::SceneManifest,
        material::{TextureHandle, WrapMode},
    },
    resources::{AssetSource, texture::TextureCache},
};

const SPHERE_SEGMENTS: u32 = 48;
const SPHERE_RINGS: u32 = 24;

/// Unit sphere geometry with faces wound to be seen from the inside.
#[derive(Clone, Debug)]
pub struct SphereGeometry {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct Backdrop {
    pub radius: f32,
    pub sphere: SphereGeometry,
    /// Axis correction followed by the authored yaw. Applies to the sphere only.
    pub rotation: Matrix4<f32>,
    pub texture: TextureHandle,
    /// Separate copy of the sky image, sampled by lit materials for
    /// reflections. Looked up with [`environment_uv`], never rotated.
    pub environment: TextureHandle,
}

impl Backdrop {
    /// Model matrix that keeps the sphere centred on `center`.
    pub fn model_matrix(&self, center: [f32; 3]) -> Matrix4<f32> {
        Matrix4::from_translation(center.into())
            * self.rotation
            * Matrix4::from_scale(self.radius)
    }
}

pub fn backdrop_radius(bounds: &Aabb, config: &EngineConfig) -> f32 {
    (bounds.radius() + config.sky_margin).max(config.sky_min_radius)
}

pub fn sky_rotation(yaw_degrees: f32) -> Matrix4<f32> {
    Matrix4::from_angle_z(Deg(yaw_degrees)) * Matrix4::from_angle_x(Deg(90.0))
}

/// Equirectangular lookup of a Z-up direction. Mirrors `environment_uv` in
/// `scene.wgsl`.
pub fn environment_uv(direction: [f32; 3]) -> [f32; 2] {
    let [x, y, z] = direction;
    let length = (x * x + y * y + z * z).sqrt();
    if length == 0.0 || !length.is_finite() {
        return [0.5, 0.5];
    }
    let u = y.atan2(x) / std::f32::consts::TAU + 0.5;
    let v = (z / length).clamp(-1.0, 1.0).acos() / std::f32::consts::PI;
    [u, v]
}

/// Builds the backdrop of the first sky that has a texture.
///
/// Returns `None` when there is no such sky or its texture can't be loaded,
/// in which case the viewer falls back to its clear colour.
pub async fn build_backdrop<S: AssetSource + 'static>(
    manifest: &SceneManifest,
    bounds: &Aabb,
    textures: &TextureCache<S>,
    config: &EngineConfig,
) -> Option<Backdrop> {
    let (sky, texture_id) = manifest
        .skies
        .iter()
        .find_map(|sky| sky.texture.as_deref().map(|texture| (sky, texture)))?;
    let definition = manifest.texture_or_default(texture_id);
    let Some(texture) = textures.resolve(&definition, &config.texture_root).await else {
        log::warn!("sky {} disabled, its texture could not be loaded", sky.id);
        return None;
    };
    let environment = TextureHandle {
        wrap: WrapMode::Clamp,
        ..TextureHandle::new(
            format!("{}#environment", texture.key),
            Arc::new(texture.image.as_ref().clone()),
        )
    };

    Some(Backdrop {
        radius: backdrop_radius(bounds, config),
        sphere: inward_sphere(SPHERE_SEGMENTS, SPHERE_RINGS),
        rotation: sky_rotation(sky.yaw),
        texture,
        environment,
    })
}

/// Unit UV sphere in its authored Y-up frame.
pub fn inward_sphere(segments: u32, rings: u32) -> SphereGeometry {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut positions = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    let mut uvs = Vec::with_capacity(positions.capacity());
    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let theta = v * std::f32::consts::PI;
        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let phi = u * std::f32::consts::TAU;
            positions.push([
                -phi.cos() * theta.sin(),
                theta.cos(),
                phi.sin() * theta.sin(),
            ]);
            uvs.push([u, v]);
        }
    }

    let stride = segments + 1;
    let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            // reversed winding so the faces point towards the centre
            indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
    }

    SphereGeometry {
        positions,
        uvs,
        indices,
    }
}
