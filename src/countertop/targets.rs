use std::collections::{BTreeSet, HashSet};

use crate::data_structures::{
    manifest::{SceneNode, TargetConfig, normalize_name},
    mesh::DecodedMesh,
};

/// The countertop surfaces of one loaded scene.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountertopTargets {
    pub nodes: HashSet<u32>,
    /// Indices into the scene's decoded meshes.
    pub meshes: Vec<usize>,
    pub material_indices: BTreeSet<usize>,
}

impl CountertopTargets {
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Material names that make a node count as a member of `group`.
///
/// A selection group of that name takes precedence and unions the target
/// groups it lists. Otherwise the target group itself is used.
pub fn collect_target_names(config: &TargetConfig, group: &str) -> HashSet<String> {
    let groups: Vec<&str> = match config.selection_groups.get(group) {
        Some(selection) => selection.iter().map(String::as_str).collect(),
        None => vec![group],
    };

    let mut names = HashSet::new();
    for id in groups {
        match config.target_groups.get(id) {
            Some(members) => names.extend(
                members
                    .iter()
                    .map(|name| normalize_name(name))
                    .filter(|name| !name.is_empty()),
            ),
            None => log::debug!("target group {} is not defined", id),
        }
    }
    names
}

pub fn select_targets(
    tree: Option<&SceneNode>,
    names: &HashSet<String>,
    meshes: &[DecodedMesh],
) -> CountertopTargets {
    let mut nodes = HashSet::new();
    if let Some(root) = tree {
        root.walk(&mut |node| {
            if node.hint.as_ref().is_some_and(|hint| names.contains(hint)) {
                nodes.insert(node.id);
            }
        });
    }

    let mut selected = Vec::new();
    let mut material_indices = BTreeSet::new();
    for (index, mesh) in meshes.iter().enumerate() {
        if nodes.contains(&mesh.node_id) {
            selected.push(index);
            material_indices.insert(mesh.material_index);
        }
    }

    CountertopTargets {
        nodes,
        meshes: selected,
        material_indices,
    }
}
