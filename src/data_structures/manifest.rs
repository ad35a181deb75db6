//! Authored scene description and countertop target configuration.
//!
//! Both documents are JSON with camelCase keys. Every list is optional and
//! defaults to empty so that sparse manifests still load.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneManifest {
    pub materials: Vec<MaterialDefinition>,
    pub textures: Vec<TextureDefinition>,
    pub atlases: Vec<AtlasDefinition>,
    pub skies: Vec<SkyDefinition>,
    pub views: Vec<ViewDefinition>,
    pub nodes: Option<SceneNode>,
}

impl SceneManifest {
    pub fn texture(&self, id: &str) -> Option<&TextureDefinition> {
        self.textures.iter().find(|t| t.id == id)
    }

    pub fn atlas(&self, id: &str) -> Option<&AtlasDefinition> {
        self.atlases.iter().find(|a| a.id == id)
    }

    /// The manifest entry for `id`, or a definition with default format hints.
    pub fn texture_or_default(&self, id: &str) -> TextureDefinition {
        self.texture(id)
            .cloned()
            .unwrap_or_else(|| TextureDefinition::new(id))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialDefinition {
    pub name: String,
    pub color: [f32; 3],
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
    pub double_sided: bool,
    pub emissive: Option<[f32; 3]>,
    pub emissive_intensity: f32,
    pub base_color_texture: Option<TextureRef>,
}

impl Default for MaterialDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: [1.0, 1.0, 1.0],
            roughness: 1.0,
            metalness: 0.0,
            opacity: 1.0,
            double_sided: false,
            emissive: None,
            emissive_intensity: 1.0,
            base_color_texture: None,
        }
    }
}

/// Reference from a material to a texture or to a region of an atlas.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureRef {
    pub id: String,
    #[serde(default = "unit_scale")]
    pub scale: [f32; 2],
    #[serde(default)]
    pub offset: [f32; 2],
}

fn unit_scale() -> [f32; 2] {
    [1.0, 1.0]
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureDefinition {
    pub id: String,
    #[serde(default = "default_ext")]
    pub ext: String,
    #[serde(default = "default_ext")]
    pub raw_ext: String,
    /// Advertised square sizes, used for the small and large fallbacks.
    #[serde(default)]
    pub sizes: Vec<u32>,
    /// Advertised file names under the texture's own directory.
    #[serde(default)]
    pub variants: Vec<String>,
}

fn default_ext() -> String {
    "jpg".to_string()
}

impl TextureDefinition {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ext: default_ext(),
            raw_ext: default_ext(),
            sizes: Vec::new(),
            variants: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AtlasDefinition {
    pub id: String,
    pub texture: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SkyDefinition {
    pub id: String,
    #[serde(default)]
    pub texture: Option<String>,
    /// Degrees around the render space's up axis.
    #[serde(default)]
    pub yaw: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ViewDefinition {
    #[serde(default)]
    pub name: String,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

/// One node of the authored node tree.
///
/// Nodes carry their configuration as a free-form string in which a material
/// name may be embedded between braces. The name is extracted once during
/// deserialization.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "RawNode")]
pub struct SceneNode {
    pub id: u32,
    pub name: Option<String>,
    pub hint: Option<String>,
    pub children: Vec<SceneNode>,
}

#[derive(Deserialize)]
struct RawNode {
    id: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    config: Option<String>,
    #[serde(default)]
    children: Vec<SceneNode>,
}

impl From<RawNode> for SceneNode {
    fn from(raw: RawNode) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            hint: raw.config.as_deref().and_then(parse_material_hint),
            children: raw.children,
        }
    }
}

impl SceneNode {
    /// Depth-first walk over this node and all descendants.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a SceneNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Extracts the material name of a brace-delimited configuration string.
///
/// `"slab {Granite-01} v2"` yields `Some("granite-01")`. Names are normalized
/// the same way as target names so they compare directly.
pub fn parse_material_hint(config: &str) -> Option<String> {
    let start = config.find('{')?;
    let len = config[start + 1..].find('}')?;
    let name = normalize_name(&config[start + 1..start + 1 + len]);
    (!name.is_empty()).then_some(name)
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Which authored material names count as which kind of target surface.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetConfig {
    pub target_groups: HashMap<String, Vec<String>>,
    pub selection_groups: HashMap<String, Vec<String>>,
}
