//! Engine configuration and scene file layout.

use serde::Deserialize;

/// Tunables of the engine. Every field has a default, so a partial JSON
/// document (or none at all) is a valid configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Meshes reconstructed between two cooperative yields.
    pub decode_batch_size: usize,
    /// Selection or target group whose material names mark countertops.
    pub target_group: String,
    /// Texture repeats per world unit for reprojected countertop UVs.
    pub uv_texels_per_unit: f32,
    pub texture_root: String,
    pub countertop_texture_root: String,
    pub sky_margin: f32,
    pub sky_min_radius: f32,
    /// Vertical field of view of the default camera in degrees.
    pub fov_degrees: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decode_batch_size: 40,
            target_group: "countertops".to_string(),
            uv_texels_per_unit: 0.5,
            texture_root: "textures".to_string(),
            countertop_texture_root: "countertops".to_string(),
            sky_margin: 10.0,
            sky_min_radius: 50.0,
            fov_degrees: 60.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// File names of one scene, relative to its directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenePaths {
    pub root: String,
}

impl ScenePaths {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    fn join(&self, file: &str) -> String {
        let root = self.root.trim_end_matches('/');
        if root.is_empty() {
            file.to_string()
        } else {
            format!("{root}/{file}")
        }
    }

    pub fn manifest(&self) -> String {
        self.join("manifest.json")
    }

    pub fn targets(&self) -> String {
        self.join("targets.json")
    }

    pub fn mesh_records(&self) -> String {
        self.join("meshes.bin")
    }

    pub fn bounds(&self) -> String {
        self.join("bounds.bin")
    }

    pub fn faces16(&self) -> String {
        self.join("faces16.bin")
    }

    pub fn faces32(&self) -> String {
        self.join("faces32.bin")
    }

    pub fn vertices(&self) -> String {
        self.join("vertices.bin")
    }

    pub fn transforms(&self) -> String {
        self.join("transforms.bin")
    }

    pub fn uv0(&self) -> String {
        self.join("uv0.bin")
    }
}
