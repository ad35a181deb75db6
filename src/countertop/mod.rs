//! Countertop retexturing.
//!
//! Countertops are the meshes whose node names a material listed in the
//! configured target group. Applying a texture to them harmonizes their
//! normals (once per scene), reprojects their UVs in world space and swaps
//! their materials for flat override materials bound to the texture.

use std::collections::HashMap;

use crate::data_structures::{
    material::{Material, MaterialSlot, TextureHandle},
    mesh::DecodedMesh,
};

pub mod background;
pub mod harmonize;
pub mod projection;
pub mod targets;

use targets::CountertopTargets;

/// Progress of a countertop apply, reported to the status listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyStatus {
    Loading,
    Applied { meshes: usize },
    /// The scene has no countertop meshes, nothing was fetched.
    NoTargets,
    /// The texture could not be loaded from any candidate.
    LoadFailed,
    /// The scene was reloaded or another countertop was requested while the
    /// texture was in flight.
    Superseded,
}

/// Countertop state of one loaded scene. Dropped together with the scene.
#[derive(Debug, Default)]
pub struct CountertopState {
    targets: CountertopTargets,
    harmonized: bool,
    overrides: HashMap<usize, Material>,
    applied: Option<String>,
}

impl CountertopState {
    pub fn new(targets: CountertopTargets) -> Self {
        Self {
            targets,
            ..Default::default()
        }
    }

    pub fn targets(&self) -> &CountertopTargets {
        &self.targets
    }

    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    /// Normalized id of the texture currently applied.
    pub fn applied(&self) -> Option<&str> {
        self.applied.as_deref()
    }

    pub fn is_harmonized(&self) -> bool {
        self.harmonized
    }

    pub fn override_material(&self, material_index: usize) -> Option<&Material> {
        self.overrides.get(&material_index)
    }

    /// Applies `texture` to every countertop mesh and returns how many meshes
    /// were retextured.
    pub fn apply(
        &mut self,
        id: &str,
        texture: TextureHandle,
        meshes: &mut [DecodedMesh],
        authored: &HashMap<usize, Material>,
        slots: &mut [MaterialSlot],
        texels_per_unit: f32,
    ) -> usize {
        if !self.harmonized {
            harmonize::harmonize_normals(meshes, &self.targets.meshes);
            self.harmonized = true;
        }
        for &index in &self.targets.meshes {
            if let Some(mesh) = meshes.get_mut(index) {
                projection::project_uvs(mesh, texels_per_unit);
            }
        }

        for &material_index in &self.targets.material_indices {
            match self.overrides.get_mut(&material_index) {
                Some(material) => material.texture = Some(texture.clone()),
                None => {
                    let material = override_material(authored.get(&material_index), texture.clone());
                    self.overrides.insert(material_index, material);
                }
            }
        }

        let mut swapped = 0;
        for (slot, mesh) in slots.iter_mut().zip(meshes.iter()) {
            if self.targets.material_indices.contains(&mesh.material_index) {
                *slot = MaterialSlot::Override(mesh.material_index);
                swapped += 1;
            }
        }
        self.applied = Some(id.to_string());
        log::info!("countertop {} applied to {} meshes", id, swapped);
        swapped
    }
}

/// Flat, unlit, opaque material that keeps the sidedness of `original`.
pub fn override_material(original: Option<&Material>, texture: TextureHandle) -> Material {
    let name = original.map_or_else(String::new, |m| format!("{} (countertop)", m.name));
    Material {
        name,
        double_sided: original.is_some_and(|m| m.double_sided),
        texture: Some(texture),
        unlit: true,
        ..Default::default()
    }
}
