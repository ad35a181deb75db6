//! Application event loop of the viewer.
//!
//! The loop owns the GPU [`Context`], the [`SceneEngine`] and its GPU mirror.
//! Loading a scene and fetching countertop textures are asynchronous: on
//! native targets they are driven to completion on a tokio runtime, on the
//! web they are spawned locally and report back through the event loop proxy.
//!
//! # Lifecycle
//!
//! 1. `resumed` creates the window and the GPU context, then starts loading
//!    the configured scene
//! 2. once loaded, the camera source is reset to the scene's default placement
//! 3. every frame polls the camera source, re-uploads the scene if the engine
//!    changed, recentres the sky on the camera and draws
//! 4. [`ViewerEvent`]s sent through a [`ViewerHandle`] apply countertops or
//!    reload the scene; they are queued while a load is in flight

use std::{collections::VecDeque, iter, sync::Arc};

use instant::Instant;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    config::{EngineConfig, ScenePaths},
    context::Context,
    engine::SceneEngine,
    render::GpuScene,
    resources::PlatformSource,
    view::{CameraSource, ViewLoop},
};

#[cfg(target_arch = "wasm32")]
use crate::{engine::CountertopFetched, resources::scene::LoadReport};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// What the viewer shows on start.
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub scene: ScenePaths,
    pub engine: EngineConfig,
    /// Countertop texture applied right after the first load.
    pub countertop: Option<String>,
    pub clear_colour: wgpu::Color,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scene: ScenePaths::new("scene"),
            engine: EngineConfig::default(),
            countertop: None,
            clear_colour: wgpu::Color {
                r: 0.62,
                g: 0.72,
                b: 0.82,
                a: 1.0,
            },
        }
    }
}

/// Requests from outside the viewer.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    ApplyCountertop(String),
    /// Reloads the current scene, or switches to another one.
    Reload(Option<ScenePaths>),
    Exit,
}

pub(crate) enum AppEvent {
    #[cfg(target_arch = "wasm32")]
    Initialized(Context),
    #[cfg(target_arch = "wasm32")]
    Loaded {
        engine: SceneEngine<PlatformSource>,
        result: anyhow::Result<LoadReport>,
    },
    #[cfg(target_arch = "wasm32")]
    CountertopFetched(CountertopFetched),
    Viewer(ViewerEvent),
}

impl std::fmt::Debug for AppEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(target_arch = "wasm32")]
            Self::Initialized(_) => f.write_str("Initialized"),
            #[cfg(target_arch = "wasm32")]
            Self::Loaded { result, .. } => f.debug_struct("Loaded").field("result", result).finish(),
            #[cfg(target_arch = "wasm32")]
            Self::CountertopFetched(fetched) => {
                f.debug_tuple("CountertopFetched").field(&fetched.id()).finish()
            }
            Self::Viewer(event) => f.debug_tuple("Viewer").field(event).finish(),
        }
    }
}

/// Sends [`ViewerEvent`]s into a running viewer.
#[derive(Clone)]
pub struct ViewerHandle {
    proxy: EventLoopProxy<AppEvent>,
}

impl ViewerHandle {
    /// Returns `false` once the viewer has shut down.
    pub fn send(&self, event: ViewerEvent) -> bool {
        self.proxy.send_event(AppEvent::Viewer(event)).is_ok()
    }

    pub fn apply_countertop(&self, id: impl Into<String>) -> bool {
        self.send(ViewerEvent::ApplyCountertop(id.into()))
    }

    pub fn reload(&self) -> bool {
        self.send(ViewerEvent::Reload(None))
    }
}

pub(crate) struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    proxy: EventLoopProxy<AppEvent>,
    config: ViewerConfig,
    ctx: Option<Context>,
    // None while a load owns the engine
    engine: Option<SceneEngine<PlatformSource>>,
    gpu: Option<GpuScene>,
    camera: Box<dyn CameraSource>,
    view: ViewLoop,
    pending: VecDeque<ViewerEvent>,
    exit_requested: bool,
    is_surface_configured: bool,
    last_time: Instant,
}

impl App {
    fn new(
        event_loop: &EventLoop<AppEvent>,
        config: ViewerConfig,
        engine: SceneEngine<PlatformSource>,
        camera: Box<dyn CameraSource>,
    ) -> anyhow::Result<Self> {
        let mut pending = VecDeque::new();
        if let Some(id) = &config.countertop {
            pending.push_back(ViewerEvent::ApplyCountertop(id.clone()));
        }
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            config,
            ctx: None,
            engine: Some(engine),
            gpu: None,
            camera,
            view: ViewLoop::new(),
            pending,
            exit_requested: false,
            is_surface_configured: false,
            last_time: Instant::now(),
        })
    }

    fn on_context(&mut self, mut ctx: Context) {
        ctx.clear_colour = self.config.clear_colour;
        let size = ctx.window.inner_size();
        self.is_surface_configured = ctx.resize(size.width, size.height);
        self.gpu = Some(GpuScene::new(&ctx));
        ctx.window.request_redraw();
        self.ctx = Some(ctx);
        self.start_load();
    }

    fn start_load(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            log::warn!("a scene is already loading");
            return;
        };
        let paths = self.config.scene.clone();

        #[cfg(not(target_arch = "wasm32"))]
        {
            let result = self.async_runtime.block_on(engine.load(&paths));
            self.engine = Some(engine);
            self.on_loaded(result.map(|_| ()));
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let result = engine.load(&paths).await;
                if proxy.send_event(AppEvent::Loaded { engine, result }).is_err() {
                    log::warn!("viewer closed while loading");
                }
            });
        }
    }

    fn on_loaded(&mut self, result: anyhow::Result<()>) {
        if let Err(e) = result {
            log::error!("{:#}", e);
        }
        if let Some(scene) = self.engine.as_ref().and_then(|engine| engine.scene()) {
            self.camera.reset(&scene.camera);
            if let Some(ctx) = self.ctx.as_mut() {
                ctx.projection.fit(&scene.camera);
            }
        }
        let pending: Vec<ViewerEvent> = self.pending.drain(..).collect();
        for event in pending {
            self.handle(event);
        }
        if let Some(ctx) = &self.ctx {
            ctx.window.request_redraw();
        }
    }

    fn handle(&mut self, event: ViewerEvent) {
        let Some(engine) = self.engine.as_mut() else {
            log::debug!("queueing {:?} until the scene has loaded", event);
            self.pending.push_back(event);
            return;
        };
        match event {
            ViewerEvent::ApplyCountertop(id) => match engine.request_countertop(&id) {
                Err(status) => log::info!("countertop {}: {:?}", id, status),
                Ok(request) => {
                    #[cfg(not(target_arch = "wasm32"))]
                    {
                        let fetched = self.async_runtime.block_on(request.fetch());
                        engine.complete_countertop(fetched);
                    }
                    #[cfg(target_arch = "wasm32")]
                    {
                        let proxy = self.proxy.clone();
                        wasm_bindgen_futures::spawn_local(async move {
                            let fetched = request.fetch().await;
                            if proxy.send_event(AppEvent::CountertopFetched(fetched)).is_err() {
                                log::warn!("viewer closed while fetching a countertop");
                            }
                        });
                    }
                }
            },
            ViewerEvent::Reload(paths) => {
                if let Some(paths) = paths {
                    self.config.scene = paths;
                }
                self.start_load();
            }
            ViewerEvent::Exit => self.exit_requested = true,
        }
        if let Some(ctx) = &self.ctx {
            ctx.window.request_redraw();
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let (Some(ctx), Some(gpu)) = (self.ctx.as_mut(), self.gpu.as_mut()) else {
            return Ok(());
        };
        let dt = self.last_time.elapsed();
        self.last_time = Instant::now();

        let camera = self.camera.current(dt);
        ctx.update_camera(&camera);

        let backdrop = match self.engine.as_ref() {
            Some(engine) => {
                gpu.sync(ctx, engine);
                engine.scene().and_then(|scene| scene.backdrop.as_ref())
            }
            None => None,
        };
        let update = self.view.advance(&camera, backdrop);
        if let Some(model) = update.backdrop {
            gpu.update_backdrop(ctx, model);
        }

        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            ctx.window.request_redraw();
            return Ok(());
        }

        let output = ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            gpu.draw(ctx, &mut render_pass);
        }
        ctx.queue.submit(iter::once(encoder.finish()));
        output.present();

        if update.redraw {
            ctx.window.request_redraw();
        }
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
fn canvas_attributes() -> anyhow::Result<winit::window::WindowAttributes> {
    use wasm_bindgen::JsCast;
    use winit::platform::web::WindowAttributesExtWebSys;

    const CANVAS_ID: &str = "canvas";

    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| anyhow::anyhow!("no document"))?;
    let canvas = document
        .get_element_by_id(CANVAS_ID)
        .ok_or_else(|| anyhow::anyhow!("no element with id {}", CANVAS_ID))?;
    Ok(Window::default_attributes().with_canvas(Some(canvas.unchecked_into())))
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.ctx.is_some() {
            return;
        }

        #[cfg(not(target_arch = "wasm32"))]
        let window_attributes = Window::default_attributes().with_title("slab-ngin");
        #[cfg(target_arch = "wasm32")]
        let window_attributes = match canvas_attributes() {
            Ok(attributes) => attributes,
            Err(e) => {
                log::error!("{:#}", e);
                event_loop.exit();
                return;
            }
        };

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("cannot create a window: {}", e);
                event_loop.exit();
                return;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        match self.async_runtime.block_on(Context::new(window)) {
            Ok(ctx) => self.on_context(ctx),
            Err(e) => {
                log::error!("cannot create the main context: {:#}", e);
                event_loop.exit();
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match Context::new(window).await {
                    Ok(ctx) => {
                        if proxy.send_event(AppEvent::Initialized(ctx)).is_err() {
                            log::warn!("viewer closed during setup");
                        }
                    }
                    Err(e) => log::error!("cannot create the main context: {:#}", e),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            AppEvent::Initialized(ctx) => self.on_context(ctx),
            #[cfg(target_arch = "wasm32")]
            AppEvent::Loaded { engine, result } => {
                self.engine = Some(engine);
                self.on_loaded(result.map(|_| ()));
            }
            #[cfg(target_arch = "wasm32")]
            AppEvent::CountertopFetched(fetched) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.complete_countertop(fetched);
                }
            }
            AppEvent::Viewer(event) => self.handle(event),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(ctx) = self.ctx.as_mut() {
                    self.is_surface_configured = ctx.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => match self.render() {
                Ok(()) => (),
                // Reconfigure the surface if it's lost or outdated
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    if let Some(ctx) = self.ctx.as_mut() {
                        let size = ctx.window.inner_size();
                        self.is_surface_configured = ctx.resize(size.width, size.height);
                    }
                }
                Err(e) => log::error!("Unable to render {}", e),
            },
            _ => {}
        }
    }
}

/// Runs the viewer until its window is closed.
pub fn run(config: ViewerConfig, camera: Box<dyn CameraSource>) -> anyhow::Result<()> {
    run_with_handle(config, camera, |_| ())
}

/// Like [`run`], handing a [`ViewerHandle`] to `on_start` before the event
/// loop starts.
pub fn run_with_handle(
    config: ViewerConfig,
    camera: Box<dyn CameraSource>,
    on_start: impl FnOnce(ViewerHandle),
) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)?;
    }

    #[cfg(not(target_arch = "wasm32"))]
    let source = PlatformSource::default();
    #[cfg(target_arch = "wasm32")]
    let source = PlatformSource::from_location()?;

    let mut engine = SceneEngine::new(source, config.engine.clone());
    engine.set_status_listener(|status| log::info!("countertop status: {:?}", status));

    let event_loop: EventLoop<AppEvent> = EventLoop::with_user_event().build()?;
    on_start(ViewerHandle {
        proxy: event_loop.create_proxy(),
    });
    let mut app = App::new(&event_loop, config, engine, camera)?;

    event_loop.run_app(&mut app)?;

    Ok(())
}

/// Web entry point: shows the scene under `assets/<scene_root>` of the page
/// origin with an orbit camera.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn start_viewer(scene_root: String, countertop: Option<String>) -> Result<(), JsValue> {
    let config = ViewerConfig {
        scene: ScenePaths::new(scene_root),
        countertop,
        ..Default::default()
    };
    let camera = Box::new(crate::view::FixedCamera::new(crate::view::CameraMode::Orbit));
    run(config, camera).map_err(|e| JsValue::from_str(&format!("{e:#}")))
}
