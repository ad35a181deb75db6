use std::{cell::RefCell, rc::Rc};

use crate::common::test_utils::{MemorySource, SceneBuilder, init_logger, png, quad, slab, square_on_backdrop};
use slab_ngin::{
    ApplyStatus, EngineConfig, SceneEngine, ScenePaths,
    countertop::{
        harmonize::harmonize_normals,
        projection::planar_uv,
        targets::collect_target_names,
    },
    data_structures::{
        bounds::Aabb,
        manifest::{TargetConfig, parse_material_hint},
        material::MaterialSlot,
        mesh::{DecodedMesh, compute_normals},
    },
};

mod common;

const MANIFEST: &str = r#"{
    "materials": [
        { "name": "Granite", "doubleSided": true },
        { "name": "Cabinet", "color": [0.8, 0.7, 0.6] }
    ],
    "nodes": {
        "id": 0,
        "name": "kitchen",
        "children": [
            { "id": 1, "config": "slab {Granite} left" },
            { "id": 2, "config": "slab { granite }" },
            { "id": 3, "name": "doors", "config": "{Cabinet}" }
        ]
    }
}"#;

const TARGETS: &str = r#"{
    "targetGroups": {
        "countertops": ["Granite "],
        "cabinets": ["cabinet"]
    }
}"#;

const PAPER: [u8; 4] = [240, 240, 236, 255];
const STONE: [u8; 4] = [120, 80, 40, 255];

/// Two slab pieces meeting at x = 1 plus a cabinet front.
fn store_kitchen(source: &MemorySource, paths: &ScenePaths, with_targets: bool) {
    let (left, left_faces) = slab([0.0, 0.0, 0.0], [1.0, 0.6, 0.04]);
    let (right, right_faces) = slab([1.0, 0.0, 0.0], [2.0, 0.6, 0.04]);
    let (front, front_faces) = quad(0.0, 0.0, 2.0, -0.9);
    let mut scene = SceneBuilder::new();
    scene.mesh(1, 0, &left, &left_faces);
    scene.mesh(2, 0, &right, &right_faces);
    scene.mesh(3, 1, &front, &front_faces);
    scene.store(source, paths);
    source.insert(paths.manifest(), MANIFEST);
    if with_targets {
        source.insert(paths.targets(), TARGETS);
    }
}

fn store_countertop(source: &MemorySource, id: &str) {
    let image = square_on_backdrop(64, 32, PAPER, STONE);
    source.insert(format!("countertops/{id}.jpg"), png(&image));
}

async fn kitchen(with_targets: bool) -> (SceneEngine<MemorySource>, ScenePaths) {
    init_logger();
    let paths = ScenePaths::new("kitchen");
    let mut engine = SceneEngine::new(MemorySource::new(), EngineConfig::default());
    store_kitchen(engine.source(), &paths, with_targets);
    store_countertop(engine.source(), "marble-white");
    engine.load(&paths).await.unwrap();
    (engine, paths)
}

fn authored(engine: &SceneEngine<MemorySource>) -> bool {
    engine
        .assignments()
        .iter()
        .all(|slot| matches!(slot, MaterialSlot::Authored(_)))
}

fn piece(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> DecodedMesh {
    DecodedMesh {
        node_id: 0,
        material_index: 0,
        normals: compute_normals(&positions, &indices),
        bounds: Aabb::from_points(positions.iter()),
        positions,
        indices,
        uvs: None,
    }
}

/// Upright panel along X at y = 0, facing -Y.
fn panel(width: f32, height: f32) -> (Vec<[f32; 3]>, Vec<u32>) {
    (
        vec![
            [0.0, 0.0, 0.0],
            [width, 0.0, 0.0],
            [width, 0.0, height],
            [0.0, 0.0, height],
        ],
        vec![0, 1, 2, 0, 2, 3],
    )
}

fn near(a: [f32; 3], b: [f32; 3]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
}

#[test]
fn should_parse_material_hints() {
    assert_eq!(parse_material_hint("slab {Granite-01} v2"), Some("granite-01".to_string()));
    assert_eq!(parse_material_hint("{ Oak }"), Some("oak".to_string()));
    assert_eq!(parse_material_hint("slab without braces"), None);
    assert_eq!(parse_material_hint("{  }"), None);
    assert_eq!(parse_material_hint("open {brace"), None);
}

#[test]
fn should_prefer_selection_groups() {
    let config: TargetConfig = serde_json::from_str(
        r#"{
            "targetGroups": {
                "granite": ["Granite"],
                "quartz": [" QUARTZ-1 "],
                "countertops": ["laminate"]
            },
            "selectionGroups": { "countertops": ["granite", "quartz", "unknown"] }
        }"#,
    )
    .unwrap();

    let mut names: Vec<String> = collect_target_names(&config, "countertops").into_iter().collect();
    names.sort();
    assert_eq!(names, vec!["granite", "quartz-1"]);

    let names = collect_target_names(&config, "granite");
    assert!(names.contains("granite") && names.len() == 1);
    assert!(collect_target_names(&config, "missing").is_empty());
}

#[test]
fn should_project_along_the_dominant_axis() {
    assert_eq!(planar_uv([1.0, 2.0, 3.0], [0.9, 0.1, 0.0], 0.5), [1.0, 1.5]);
    assert_eq!(planar_uv([1.0, 2.0, 3.0], [0.0, -1.0, 0.2], 0.5), [0.5, 1.5]);
    assert_eq!(planar_uv([1.0, 2.0, 3.0], [0.0, 0.0, 1.0], 2.0), [2.0, 4.0]);
}

#[tokio::test]
async fn should_retexture_countertops() {
    let (mut engine, _) = kitchen(true).await;
    let statuses = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&statuses);
    engine.set_status_listener(move |status| log.borrow_mut().push(status.clone()));

    let status = engine.apply_countertop(" Marble-White").await;
    assert_eq!(status, ApplyStatus::Applied { meshes: 2 });
    assert_eq!(
        *statuses.borrow(),
        vec![ApplyStatus::Loading, ApplyStatus::Applied { meshes: 2 }]
    );
    assert_eq!(
        engine.assignments(),
        &[
            MaterialSlot::Override(0),
            MaterialSlot::Override(0),
            MaterialSlot::Authored(1)
        ]
    );

    let material = engine.material_for(0).unwrap();
    assert!(material.unlit);
    assert!(material.double_sided);
    assert!(!material.transparent);
    assert_eq!(material.base_color, [1.0, 1.0, 1.0]);
    assert_eq!(material.name, "Granite (countertop)");
    let texture = material.texture.as_ref().unwrap();
    assert_eq!(texture.key, "countertop/marble-white");
    // backdrop cropped away
    assert_eq!(texture.image.dimensions(), (36, 36));
    assert_eq!(engine.material_for(2).unwrap().name, "Cabinet");

    let scene = engine.scene().unwrap();
    assert!(scene.countertops.is_harmonized());
    assert_eq!(scene.countertops.applied(), Some("marble-white"));
    assert!(scene.meshes[0].uvs.is_some());
    assert!(scene.meshes[1].uvs.is_some());
    assert!(scene.meshes[2].uvs.is_none());
}

#[tokio::test]
async fn should_reapply_without_fetching() {
    let (mut engine, _) = kitchen(true).await;
    engine.apply_countertop("marble-white").await;
    let revision = engine.revision();
    engine.source().clear_fetches();

    let status = engine.apply_countertop("MARBLE-WHITE").await;
    assert_eq!(status, ApplyStatus::Applied { meshes: 2 });
    assert!(engine.source().fetches().is_empty());
    assert_eq!(engine.revision(), revision);
}

#[tokio::test]
async fn should_rebind_the_override_on_switch() {
    let (mut engine, _) = kitchen(true).await;
    store_countertop(engine.source(), "basalt");
    engine.apply_countertop("marble-white").await;

    let status = engine.apply_countertop("basalt").await;
    assert_eq!(status, ApplyStatus::Applied { meshes: 2 });
    let texture = engine.material_for(1).unwrap().texture.as_ref().unwrap();
    assert_eq!(texture.key, "countertop/basalt");
    assert_eq!(engine.scene().unwrap().countertops.applied(), Some("basalt"));
}

#[tokio::test]
async fn should_keep_state_when_texture_fails() {
    let (mut engine, _) = kitchen(true).await;
    engine.apply_countertop("marble-white").await;
    let before = engine.assignments().to_vec();

    let status = engine.apply_countertop("unobtainium").await;
    assert_eq!(status, ApplyStatus::LoadFailed);
    assert_eq!(engine.status(), Some(&ApplyStatus::LoadFailed));
    assert_eq!(engine.assignments(), before.as_slice());
    let texture = engine.material_for(0).unwrap().texture.as_ref().unwrap();
    assert_eq!(texture.key, "countertop/marble-white");
    assert_eq!(engine.scene().unwrap().countertops.applied(), Some("marble-white"));
}

#[tokio::test]
async fn should_fail_first_apply_without_side_effects() {
    let (mut engine, _) = kitchen(true).await;
    let status = engine.apply_countertop("unobtainium").await;
    assert_eq!(status, ApplyStatus::LoadFailed);
    assert!(authored(&engine));
    assert!(!engine.scene().unwrap().countertops.is_harmonized());
}

#[tokio::test]
async fn should_report_missing_targets() {
    let (mut engine, _) = kitchen(false).await;
    engine.source().clear_fetches();

    let status = engine.apply_countertop("marble-white").await;
    assert_eq!(status, ApplyStatus::NoTargets);
    assert!(engine.source().fetches().is_empty());
    assert!(authored(&engine));
}

#[tokio::test]
async fn should_harmonize_shared_edges() {
    let (mut engine, _) = kitchen(true).await;
    engine.apply_countertop("marble-white").await;
    let scene = engine.scene().unwrap();
    let (left, right) = (&scene.meshes[0], &scene.meshes[1]);

    let mut shared = 0;
    for (i, p) in left.positions.iter().enumerate() {
        for (j, q) in right.positions.iter().enumerate() {
            if p == q {
                shared += 1;
                assert_eq!(left.normals[i], right.normals[j]);
                assert_eq!(left.uvs.as_ref().unwrap()[i], right.uvs.as_ref().unwrap()[j]);
            }
        }
    }
    assert_eq!(shared, 4);

    for mesh in [left, right] {
        for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
            if p[2] > 0.03 {
                assert_eq!(*n, [0.0, 0.0, 1.0]);
            }
        }
    }

    // a second pass is a no-op
    let mut meshes = scene.meshes.clone();
    harmonize_normals(&mut meshes, &[0, 1]);
    for (before, after) in scene.meshes.iter().zip(&meshes) {
        for (a, b) in before.normals.iter().zip(&after.normals) {
            for axis in 0..3 {
                assert!((a[axis] - b[axis]).abs() < 1e-6);
            }
        }
    }
}

#[tokio::test]
async fn should_reset_on_reload() {
    let (mut engine, paths) = kitchen(true).await;
    engine.apply_countertop("marble-white").await;
    assert!(!authored(&engine));

    engine.load(&paths).await.unwrap();
    assert!(authored(&engine));
    let scene = engine.scene().unwrap();
    assert_eq!(scene.countertops.applied(), None);
    assert!(!scene.countertops.is_harmonized());
    assert!(scene.countertops.override_material(0).is_none());

    // the processed image outlives the scene
    engine.source().clear_fetches();
    let status = engine.apply_countertop("marble-white").await;
    assert_eq!(status, ApplyStatus::Applied { meshes: 2 });
    assert!(engine.source().fetches().is_empty());
}

#[tokio::test]
async fn should_discard_completions_of_a_previous_scene() {
    let (mut engine, paths) = kitchen(true).await;
    let request = match engine.request_countertop("marble-white") {
        Ok(request) => request,
        Err(status) => panic!("nothing to fetch: {status:?}"),
    };
    let generation = engine.generation();

    engine.load(&paths).await.unwrap();
    let fetched = request.fetch().await;
    assert!(fetched.is_loaded());
    assert_eq!(fetched.generation(), generation);
    assert_eq!(engine.complete_countertop(fetched), ApplyStatus::Superseded);
    assert!(authored(&engine));
    assert_eq!(engine.scene().unwrap().countertops.applied(), None);
}

#[tokio::test]
async fn should_apply_only_the_latest_request() {
    let (mut engine, _) = kitchen(true).await;
    store_countertop(engine.source(), "basalt");

    let first = engine.request_countertop("marble-white").unwrap();
    let second = engine.request_countertop("basalt").unwrap();
    let second = second.fetch().await;
    assert_eq!(engine.complete_countertop(second), ApplyStatus::Applied { meshes: 2 });

    // the older request finishes last
    let first = first.fetch().await;
    assert!(first.is_loaded());
    assert_eq!(engine.complete_countertop(first), ApplyStatus::Superseded);
    assert_eq!(engine.scene().unwrap().countertops.applied(), Some("basalt"));
    let texture = engine.material_for(0).unwrap().texture.as_ref().unwrap();
    assert_eq!(texture.key, "countertop/basalt");
}

#[tokio::test]
async fn should_supersede_pending_requests_when_reselecting() {
    let (mut engine, _) = kitchen(true).await;
    store_countertop(engine.source(), "basalt");
    engine.apply_countertop("basalt").await;

    let pending = engine.request_countertop("marble-white").unwrap();
    // picking the applied texture again needs no fetch but still wins
    assert_eq!(
        engine.request_countertop("basalt").err(),
        Some(ApplyStatus::Applied { meshes: 2 })
    );
    let revision = engine.revision();
    assert_eq!(
        engine.complete_countertop(pending.fetch().await),
        ApplyStatus::Superseded
    );
    assert_eq!(engine.revision(), revision);
    assert_eq!(engine.scene().unwrap().countertops.applied(), Some("basalt"));
}

#[test]
fn should_flatten_the_top_band() {
    let (positions, indices) = panel(1.0, 1.0);
    let mut meshes = vec![piece(positions, indices)];
    harmonize_normals(&mut meshes, &[0]);

    // the upper edge lies within 2 cm of the top, the lower one doesn't
    let normals = &meshes[0].normals;
    assert_eq!(normals[2], [0.0, 0.0, 1.0]);
    assert_eq!(normals[3], [0.0, 0.0, 1.0]);
    assert!(near(normals[0], [0.0, -1.0, 0.0]));
    assert!(near(normals[1], [0.0, -1.0, 0.0]));
}

#[test]
fn should_flatten_vertices_of_upward_faces() {
    let (mut positions, mut indices) = panel(1.0, 1.0);
    // a sliver of floor along the panel's lower edge
    positions.push([0.5, -0.05, 0.0]);
    indices.extend([0, 4, 1]);
    let mut meshes = vec![piece(positions, indices)];
    // the panel dominates the lower corners' own normals
    assert!(meshes[0].normals[0][2] < 0.85);

    harmonize_normals(&mut meshes, &[0]);
    for vertex in 0..5 {
        assert_eq!(meshes[0].normals[vertex], [0.0, 0.0, 1.0]);
    }
}

#[test]
fn should_weight_shared_normals_by_area() {
    // two upright panels meeting in a corner at the origin
    let (long, long_faces) = panel(2.0, 1.0);
    let short = vec![
        [0.0, 0.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 0.5, 1.0],
        [0.0, 0.5, 0.0],
    ];
    let mut meshes = vec![
        piece(long, long_faces),
        piece(short, vec![0, 1, 2, 0, 2, 3]),
    ];
    assert!(near(meshes[1].normals[0], [-1.0, 0.0, 0.0]));

    harmonize_normals(&mut meshes, &[0, 1]);
    // incident areas 2 and 0.5 pull the corner towards the long panel
    let length = 4.25f32.sqrt();
    let expected = [-0.5 / length, -2.0 / length, 0.0];
    assert!(near(meshes[0].normals[0], expected));
    assert!(near(meshes[1].normals[0], expected));
    // away from the corner each panel keeps its own normal
    assert!(near(meshes[0].normals[1], [0.0, -1.0, 0.0]));
    assert!(near(meshes[1].normals[3], [-1.0, 0.0, 0.0]));
}
