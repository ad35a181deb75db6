use std::{collections::BTreeSet, rc::Rc};

use cgmath::{InnerSpace, Vector3, Vector4};
use crate::common::test_utils::{MemorySource, init_logger, solid_png};
use slab_ngin::{
    EngineConfig,
    data_structures::{
        bounds::Aabb,
        manifest::{SceneManifest, TextureDefinition},
        material::WrapMode,
    },
    resources::{
        material::resolve_materials,
        sky::{backdrop_radius, build_backdrop, environment_uv, inward_sphere, sky_rotation},
        texture::{TextureCache, candidate_paths},
    },
};

mod common;

fn oak() -> TextureDefinition {
    TextureDefinition {
        raw_ext: "png".to_string(),
        sizes: vec![512],
        ..TextureDefinition::new("oak")
    }
}

#[test]
fn should_rank_candidates() {
    let texture = TextureDefinition {
        ext: "webp".to_string(),
        raw_ext: "png".to_string(),
        sizes: vec![2048, 512, 1024],
        variants: vec![
            "oak-std.webp".to_string(),
            "oak.png".to_string(),
            "hd-std.jpg".to_string(),
        ],
        ..TextureDefinition::new("oak")
    };
    assert_eq!(
        candidate_paths(&texture, "textures/"),
        vec![
            "textures/oak/oak-std.webp",
            "textures/oak/hd-std.jpg",
            "textures/oak/512-std.webp",
            "textures/oak/2048-std.webp",
            "textures/oak.png",
        ]
    );
}

#[test]
fn should_not_repeat_candidates() {
    let texture = TextureDefinition {
        sizes: vec![512],
        variants: vec!["512-std.jpg".to_string()],
        ..TextureDefinition::new("oak")
    };
    assert_eq!(
        candidate_paths(&texture, "t"),
        vec!["t/oak/512-std.jpg", "t/oak.jpg"]
    );
}

#[tokio::test]
async fn should_fall_back_to_the_next_candidate() {
    init_logger();
    let source = Rc::new(MemorySource::new());
    source.insert("t/oak.png", solid_png(4, 2, [10, 20, 30, 255]));
    let cache = TextureCache::new(Rc::clone(&source));

    let handle = cache.resolve(&oak(), "t").await.unwrap();
    assert_eq!(handle.key, "t/oak");
    assert_eq!(handle.image.dimensions(), (4, 2));
    assert_eq!(source.fetches(), vec!["t/oak/512-std.jpg", "t/oak.png"]);

    // a cache hit never retries the failed candidate
    let again = cache.resolve(&oak(), "t").await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&handle.image, &again.image));
    assert_eq!(source.fetches().len(), 2);
}

#[tokio::test]
async fn should_skip_undecodable_candidates() {
    let source = Rc::new(MemorySource::new());
    source.insert("t/oak/512-std.jpg", b"not an image".to_vec());
    source.insert("t/oak.png", solid_png(1, 1, [0, 0, 0, 255]));
    let cache = TextureCache::new(Rc::clone(&source));

    assert!(cache.resolve(&oak(), "t").await.is_some());
    assert_eq!(source.fetch_count("t/oak/512-std.jpg"), 1);
    assert_eq!(source.fetch_count("t/oak.png"), 1);
}

#[tokio::test]
async fn should_remember_exhausted_textures() {
    let source = Rc::new(MemorySource::new());
    let cache = TextureCache::new(Rc::clone(&source));

    assert!(cache.resolve(&oak(), "t").await.is_none());
    assert!(cache.resolve(&oak(), "t").await.is_none());
    assert_eq!(source.fetches().len(), 2);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn should_collapse_concurrent_requests() {
    let source = Rc::new(MemorySource::new());
    source.insert("t/oak.png", solid_png(2, 2, [255, 0, 0, 255]));
    let cache = TextureCache::new(Rc::clone(&source));

    let texture = oak();
    let (a, b, c) = futures::join!(
        cache.resolve(&texture, "t"),
        cache.resolve(&texture, "t"),
        cache.resolve(&texture, "t"),
    );
    assert!(a.is_some() && b.is_some() && c.is_some());
    assert_eq!(source.fetch_count("t/oak.png"), 1);
    assert_eq!(source.fetch_count("t/oak/512-std.jpg"), 1);
}

fn manifest() -> SceneManifest {
    serde_json::from_str(
        r#"{
            "materials": [
                { "name": "Backsplash", "color": [0.5, 0.5, 0.5],
                  "baseColorTexture": { "id": "tiles", "scale": [0.5, 0.25], "offset": [0.5, 0.0] } },
                { "name": "Kitchen Curtain" },
                { "name": "Window", "opacity": 0.4, "doubleSided": true },
                { "name": "Wall", "baseColorTexture": { "id": "missing" } },
                { "name": "Leaves", "baseColorTexture": { "id": "foliage-01" } }
            ],
            "textures": [ { "id": "sheet", "rawExt": "png" } ],
            "atlases": [ { "id": "tiles", "texture": "sheet" } ]
        }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn should_map_atlas_regions() {
    let source = Rc::new(MemorySource::new());
    source.insert("textures/sheet.png", solid_png(8, 8, [0, 255, 0, 255]));
    let cache = TextureCache::new(Rc::clone(&source));
    let manifest = manifest();

    let materials = resolve_materials(&manifest, &BTreeSet::from([0]), &cache, "textures").await;
    let texture = materials[&0].texture.as_ref().unwrap();
    assert_eq!(texture.key, "textures/sheet");
    assert_eq!(texture.scale, [0.5, 0.25]);
    assert_eq!(texture.offset, [0.5, 0.0]);
    assert_eq!(texture.wrap, WrapMode::Repeat);
    assert_eq!(materials[&0].base_color, [0.5, 0.5, 0.5]);
}

#[tokio::test]
async fn should_resolve_only_used_materials() {
    let source = Rc::new(MemorySource::new());
    let cache = TextureCache::new(Rc::clone(&source));
    let manifest = manifest();

    let used = BTreeSet::from([1, 2, 3, 4, 9]);
    let materials = resolve_materials(&manifest, &used, &cache, "textures").await;
    assert_eq!(materials.len(), 5);
    assert!(!source.fetches().iter().any(|p| p.contains("sheet")));

    // allow-listed overlays are double sided whatever was authored
    assert!(materials[&1].double_sided);
    assert!(materials[&4].double_sided);
    assert!(materials[&2].double_sided);
    assert!(materials[&2].transparent);
    assert!(!materials[&3].double_sided);
    // a failed texture degrades to an untextured material
    assert!(materials[&3].texture.is_none());
    assert_eq!(materials[&9].name, "");
    assert!(!materials[&9].transparent);
}

#[test]
fn should_floor_the_backdrop_radius() {
    let config = EngineConfig::default();
    let small = Aabb::new([0.0; 3], [1.0; 3]);
    assert_eq!(backdrop_radius(&small, &config), 50.0);

    let large = Aabb::new([0.0; 3], [200.0; 3]);
    let expected = (3.0f32 * 200.0 * 200.0).sqrt() * 0.5 + 10.0;
    assert!((backdrop_radius(&large, &config) - expected).abs() < 1e-3);
}

#[test]
fn should_wind_the_sky_sphere_inwards() {
    let sphere = inward_sphere(16, 8);
    let mut faces = 0;
    for c in sphere.indices.chunks_exact(3) {
        let [a, b, d] = [c[0], c[1], c[2]].map(|i| Vector3::from(sphere.positions[i as usize]));
        let normal = (b - a).cross(d - a);
        if normal.magnitude() < 1e-6 {
            // collapsed pole triangle
            continue;
        }
        let centroid = (a + b + d) / 3.0;
        assert!(normal.dot(centroid) < 0.0);
        faces += 1;
    }
    assert!(faces > 0);
}

#[test]
fn should_turn_authored_up_into_render_up() {
    let up = sky_rotation(0.0) * Vector4::new(0.0, 1.0, 0.0, 0.0);
    assert!((up.truncate() - Vector3::new(0.0, 0.0, 1.0)).magnitude() < 1e-6);

    // yaw spins around the render space's up axis
    let forward = sky_rotation(90.0) * Vector4::new(1.0, 0.0, 0.0, 0.0);
    assert!((forward.truncate() - Vector3::new(0.0, 1.0, 0.0)).magnitude() < 1e-6);
}

#[test]
fn should_look_up_environment_by_direction() {
    let close = |a: [f32; 2], b: [f32; 2]| (a[0] - b[0]).abs() < 1e-6 && (a[1] - b[1]).abs() < 1e-6;
    // zenith and nadir map to the top and bottom rows
    assert_eq!(environment_uv([0.0, 0.0, 2.0])[1], 0.0);
    assert!(close([0.5, 1.0], environment_uv([0.0, 0.0, -1.0])));
    // the horizon runs through the middle row, +X at the centre column
    assert!(close(environment_uv([1.0, 0.0, 0.0]), [0.5, 0.5]));
    assert!(close(environment_uv([0.0, 3.0, 0.0]), [0.75, 0.5]));
    assert!(close(environment_uv([0.0, 0.0, 0.0]), [0.5, 0.5]));
}

#[tokio::test]
async fn should_build_backdrop_from_first_textured_sky() {
    let source = Rc::new(MemorySource::new());
    source.insert("textures/dusk.jpg", solid_png(4, 2, [200, 120, 60, 255]));
    let cache = TextureCache::new(Rc::clone(&source));
    let config = EngineConfig::default();
    let manifest: SceneManifest = serde_json::from_str(
        r#"{ "skies": [ { "id": "blank" }, { "id": "evening", "texture": "dusk", "yaw": 30 } ] }"#,
    )
    .unwrap();

    let backdrop = build_backdrop(&manifest, &Aabb::new([0.0; 3], [1.0; 3]), &cache, &config)
        .await
        .unwrap();
    assert_eq!(backdrop.radius, 50.0);
    assert_eq!(backdrop.rotation, sky_rotation(30.0));
    assert_ne!(backdrop.environment.key, backdrop.texture.key);
    assert_eq!(backdrop.texture.wrap, WrapMode::Repeat);
    assert_eq!(backdrop.environment.wrap, WrapMode::Clamp);
    assert!(!std::sync::Arc::ptr_eq(&backdrop.environment.image, &backdrop.texture.image));
    assert_eq!(*backdrop.environment.image, *backdrop.texture.image);

    let missing: SceneManifest =
        serde_json::from_str(r#"{ "skies": [ { "id": "night", "texture": "stars" } ] }"#).unwrap();
    assert!(build_backdrop(&missing, &Aabb::empty(), &cache, &config).await.is_none());
}
