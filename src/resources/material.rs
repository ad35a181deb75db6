use std::collections::{BTreeSet, HashMap};

use crate::{
    data_structures::{
        manifest::{MaterialDefinition, SceneManifest, TextureRef},
        material::{Material, TextureHandle},
    },
    resources::{AssetSource, texture::TextureCache},
};

/// Decorative overlays that always render double-sided, whatever their
/// authored flag says. Matched case-insensitively against the material name
/// and the texture id.
pub const DOUBLE_SIDED_OVERRIDES: &[&str] = &["foliage", "plant", "curtain", "decal", "glass"];

/// Resolves the materials of every index in `used`.
///
/// Only referenced indices are resolved so that no texture is fetched for a
/// material no mesh renders with. Indices without a definition get a neutral
/// default. Texture failures leave the material untextured.
pub async fn resolve_materials<S: AssetSource + 'static>(
    manifest: &SceneManifest,
    used: &BTreeSet<usize>,
    textures: &TextureCache<S>,
    texture_root: &str,
) -> HashMap<usize, Material> {
    let pending = used.iter().map(|&index| async move {
        let material = match manifest.materials.get(index) {
            Some(definition) => resolve_material(manifest, definition, textures, texture_root).await,
            None => {
                log::warn!("mesh references undefined material {}", index);
                Material::default()
            }
        };
        (index, material)
    });
    futures::future::join_all(pending).await.into_iter().collect()
}

pub async fn resolve_material<S: AssetSource + 'static>(
    manifest: &SceneManifest,
    definition: &MaterialDefinition,
    textures: &TextureCache<S>,
    texture_root: &str,
) -> Material {
    let texture = match &definition.base_color_texture {
        Some(reference) => resolve_texture_ref(manifest, reference, textures, texture_root).await,
        None => None,
    };
    let texture_id = definition.base_color_texture.as_ref().map(|r| r.id.as_str());

    Material {
        name: definition.name.clone(),
        base_color: definition.color,
        roughness: definition.roughness,
        metalness: definition.metalness,
        opacity: definition.opacity,
        transparent: definition.opacity < 1.0,
        double_sided: definition.double_sided || forced_double_sided(&definition.name, texture_id),
        emissive: definition.emissive,
        emissive_intensity: definition.emissive_intensity,
        texture,
        unlit: false,
    }
}

/// Atlas references resolve the shared atlas image first and then narrow it
/// down to the referenced region.
pub async fn resolve_texture_ref<S: AssetSource + 'static>(
    manifest: &SceneManifest,
    reference: &TextureRef,
    textures: &TextureCache<S>,
    texture_root: &str,
) -> Option<TextureHandle> {
    match manifest.atlas(&reference.id) {
        Some(atlas) => {
            let definition = manifest.texture_or_default(&atlas.texture);
            let image = textures.resolve(&definition, texture_root).await?;
            Some(image.region(reference.scale, reference.offset))
        }
        None => {
            let definition = manifest.texture_or_default(&reference.id);
            textures.resolve(&definition, texture_root).await
        }
    }
}

fn forced_double_sided(name: &str, texture_id: Option<&str>) -> bool {
    let name = name.to_lowercase();
    let texture_id = texture_id.map(str::to_lowercase);
    DOUBLE_SIDED_OVERRIDES.iter().any(|needle| {
        name.contains(needle) || texture_id.as_deref().is_some_and(|id| id.contains(needle))
    })
}
