//! The scene engine.
//!
//! [`SceneEngine`] owns everything that belongs to a loaded scene (decoded
//! meshes, resolved materials, the backdrop and the countertop state) next to
//! the caches that outlive a scene. All state is mutated between frames on a
//! single thread; asynchronous completions are tagged with the generation of
//! the scene they were started for and dropped if that scene is gone. Of
//! several countertop requests only the latest one is ever applied.

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
    rc::Rc,
    sync::Arc,
};

use anyhow::Context as _;
use image::RgbaImage;

use crate::{
    config::{EngineConfig, ScenePaths},
    countertop::{
        ApplyStatus, CountertopState,
        background::remove_background,
        targets::{collect_target_names, select_targets},
    },
    data_structures::{
        bounds::Aabb,
        manifest::{SceneManifest, TargetConfig, TextureDefinition, normalize_name},
        material::{Material, MaterialSlot, TextureHandle},
        mesh::DecodedMesh,
    },
    resources::{
        AssetSource, fetch_json,
        material::resolve_materials,
        scene::{LoadReport, decode_scene, fetch_buffers},
        sky::{Backdrop, build_backdrop},
        texture::{ImageFuture, TextureCache},
    },
    view::CameraDefaults,
};

/// Size advertised for countertop textures.
const COUNTERTOP_TEXTURE_SIZE: u32 = 1024;

type ProcessedImages = Rc<RefCell<HashMap<String, Arc<RgbaImage>>>>;

pub struct LoadedScene {
    pub manifest: SceneManifest,
    pub meshes: Vec<DecodedMesh>,
    pub bounds: Aabb,
    /// Resolved materials of every index some mesh refers to.
    pub materials: HashMap<usize, Material>,
    /// Current material of each mesh, parallel to `meshes`.
    pub slots: Vec<MaterialSlot>,
    pub backdrop: Option<Backdrop>,
    pub camera: CameraDefaults,
    pub report: LoadReport,
    pub countertops: CountertopState,
}

impl LoadedScene {
    pub fn material(&self, slot: MaterialSlot) -> Option<&Material> {
        match slot {
            MaterialSlot::Authored(index) => self.materials.get(&index),
            MaterialSlot::Override(index) => self.countertops.override_material(index),
        }
    }
}

pub struct SceneEngine<S> {
    source: Rc<S>,
    config: EngineConfig,
    textures: TextureCache<S>,
    processed: ProcessedImages,
    generation: u64,
    revision: u64,
    /// Sequence number of the latest countertop request.
    request: u64,
    scene: Option<LoadedScene>,
    status: Option<ApplyStatus>,
    listener: Option<Box<dyn FnMut(&ApplyStatus)>>,
}

impl<S: AssetSource + 'static> SceneEngine<S> {
    pub fn new(source: S, config: EngineConfig) -> Self {
        let source = Rc::new(source);
        Self {
            textures: TextureCache::new(Rc::clone(&source)),
            source,
            config,
            processed: Rc::new(RefCell::new(HashMap::new())),
            generation: 0,
            revision: 0,
            request: 0,
            scene: None,
            status: None,
            listener: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn textures(&self) -> &TextureCache<S> {
        &self.textures
    }

    pub fn scene(&self) -> Option<&LoadedScene> {
        self.scene.as_ref()
    }

    /// Incremented on every load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Incremented whenever anything the renderer draws has changed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn status(&self) -> Option<&ApplyStatus> {
        self.status.as_ref()
    }

    pub fn set_status_listener(&mut self, listener: impl FnMut(&ApplyStatus) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Material the mesh at `mesh_index` currently renders with.
    pub fn material_for(&self, mesh_index: usize) -> Option<&Material> {
        let scene = self.scene.as_ref()?;
        scene.material(*scene.slots.get(mesh_index)?)
    }

    pub fn assignments(&self) -> &[MaterialSlot] {
        self.scene
            .as_ref()
            .map(|scene| scene.slots.as_slice())
            .unwrap_or_default()
    }

    /// Loads the scene at `paths`, replacing the current one.
    ///
    /// The previous scene, including its countertop state, is dropped before
    /// anything is fetched. Textures stay cached across loads.
    pub async fn load(&mut self, paths: &ScenePaths) -> anyhow::Result<LoadReport> {
        self.generation += 1;
        self.scene = None;
        self.status = None;
        self.revision += 1;
        let generation = self.generation;
        log::info!("loading scene {} (generation {})", paths.root, generation);

        let source = &*self.source;
        let (manifest_path, targets_path) = (paths.manifest(), paths.targets());
        let (manifest, buffers, targets) = futures::join!(
            fetch_json::<_, SceneManifest>(source, &manifest_path),
            fetch_buffers(source, paths),
            fetch_json::<_, TargetConfig>(source, &targets_path),
        );
        let manifest = manifest.with_context(|| format!("failed to load scene {}", paths.root))?;
        let buffers = buffers.with_context(|| format!("failed to load scene {}", paths.root))?;
        let targets = targets.unwrap_or_else(|e| {
            log::warn!("no countertop targets: {}", e);
            TargetConfig::default()
        });

        let decoded = decode_scene(&buffers, self.config.decode_batch_size)
            .await
            .with_context(|| format!("failed to decode scene {}", paths.root))?;
        let meshes = decoded.meshes;
        let bounds = decoded.bounds;

        let used: BTreeSet<usize> = meshes.iter().map(|m| m.material_index).collect();
        let (materials, backdrop) = futures::join!(
            resolve_materials(&manifest, &used, &self.textures, &self.config.texture_root),
            build_backdrop(&manifest, &bounds, &self.textures, &self.config),
        );

        let names = collect_target_names(&targets, &self.config.target_group);
        let countertops = select_targets(manifest.nodes.as_ref(), &names, &meshes);
        log::info!(
            "{} countertop meshes with {} materials",
            countertops.meshes.len(),
            countertops.material_indices.len()
        );

        let mut camera = match manifest.views.first() {
            Some(view) => CameraDefaults::from_view(view, &bounds, self.config.fov_degrees),
            None => CameraDefaults::fit(&bounds, self.config.fov_degrees),
        };
        if let Some(backdrop) = &backdrop {
            // the sphere follows the camera, so its radius is the farthest depth
            camera.zfar = camera.zfar.max(backdrop.radius * 1.5);
        }
        let slots = meshes
            .iter()
            .map(|m| MaterialSlot::Authored(m.material_index))
            .collect();

        self.scene = Some(LoadedScene {
            manifest,
            meshes,
            bounds,
            materials,
            slots,
            backdrop,
            camera,
            report: decoded.report,
            countertops: CountertopState::new(countertops),
        });
        self.revision += 1;
        Ok(decoded.report)
    }

    fn emit(&mut self, status: ApplyStatus) -> ApplyStatus {
        if let Some(listener) = self.listener.as_mut() {
            listener(&status);
        }
        self.status = Some(status.clone());
        status
    }

    /// Starts applying the countertop texture `id`.
    ///
    /// `Err` carries the final status when nothing needs to be fetched: the
    /// scene has no countertops, or `id` is already applied. Any request
    /// still in flight is superseded either way.
    pub fn request_countertop(&mut self, id: &str) -> Result<CountertopRequest, ApplyStatus> {
        self.request += 1;
        self.emit(ApplyStatus::Loading);
        let id = normalize_name(id);

        let Some(scene) = self.scene.as_ref() else {
            return Err(self.emit(ApplyStatus::NoTargets));
        };
        if !scene.countertops.has_targets() {
            log::info!("no countertops to apply {} to", id);
            return Err(self.emit(ApplyStatus::NoTargets));
        }
        if scene.countertops.applied() == Some(id.as_str()) {
            let meshes = scene
                .slots
                .iter()
                .filter(|slot| matches!(slot, MaterialSlot::Override(_)))
                .count();
            return Err(self.emit(ApplyStatus::Applied { meshes }));
        }

        let image = match self.processed.borrow().get(&id) {
            Some(image) => PendingImage::Processed(Arc::clone(image)),
            None => PendingImage::Fetching(
                self.textures
                    .request(&countertop_texture(&id), &self.config.countertop_texture_root),
            ),
        };
        Ok(CountertopRequest {
            generation: self.generation,
            request: self.request,
            id,
            image,
            processed: Rc::clone(&self.processed),
        })
    }

    /// Applies a fetched countertop texture to the current scene.
    pub fn complete_countertop(&mut self, fetched: CountertopFetched) -> ApplyStatus {
        if fetched.generation != self.generation {
            log::debug!("discarding countertop {} of a previous scene", fetched.id);
            return ApplyStatus::Superseded;
        }
        if fetched.request != self.request {
            log::debug!("discarding countertop {}, a newer one was requested", fetched.id);
            return ApplyStatus::Superseded;
        }
        let Some(image) = fetched.image else {
            log::warn!("countertop {} could not be loaded", fetched.id);
            return self.emit(ApplyStatus::LoadFailed);
        };
        let Some(scene) = self.scene.as_mut() else {
            return ApplyStatus::Superseded;
        };

        let texture = TextureHandle::new(format!("countertop/{}", fetched.id), image);
        let meshes = scene.countertops.apply(
            &fetched.id,
            texture,
            &mut scene.meshes,
            &scene.materials,
            &mut scene.slots,
            self.config.uv_texels_per_unit,
        );
        self.revision += 1;
        self.emit(ApplyStatus::Applied { meshes })
    }

    /// Fetches and applies the countertop texture `id` in one go.
    pub async fn apply_countertop(&mut self, id: &str) -> ApplyStatus {
        match self.request_countertop(id) {
            Ok(request) => {
                let fetched = request.fetch().await;
                self.complete_countertop(fetched)
            }
            Err(status) => status,
        }
    }
}

fn countertop_texture(id: &str) -> TextureDefinition {
    TextureDefinition {
        sizes: vec![COUNTERTOP_TEXTURE_SIZE],
        ..TextureDefinition::new(id)
    }
}

enum PendingImage {
    Processed(Arc<RgbaImage>),
    Fetching(ImageFuture),
}

/// A countertop texture in flight. Holds no borrow of the engine.
pub struct CountertopRequest {
    generation: u64,
    request: u64,
    id: String,
    image: PendingImage,
    processed: ProcessedImages,
}

pub struct CountertopFetched {
    generation: u64,
    request: u64,
    id: String,
    image: Option<Arc<RgbaImage>>,
}

impl CountertopFetched {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }
}

impl CountertopRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolves the texture and strips its backdrop. Processed images are
    /// kept per id, so switching back to an earlier texture is free.
    pub async fn fetch(self) -> CountertopFetched {
        let image = match self.image {
            PendingImage::Processed(image) => Some(image),
            PendingImage::Fetching(pending) => match pending.await {
                Some(raw) => {
                    let processed = Arc::new(remove_background(&raw));
                    self.processed
                        .borrow_mut()
                        .insert(self.id.clone(), Arc::clone(&processed));
                    Some(processed)
                }
                None => None,
            },
        };
        CountertopFetched {
            generation: self.generation,
            request: self.request,
            id: self.id,
            image,
        }
    }
}
