//! slab-ngin
//!
//! A walkthrough viewer for scanned interiors that previews replacement
//! countertop materials. Scenes arrive as a JSON manifest plus a handful of
//! compact binary buffers; the engine decodes them into world-space meshes,
//! resolves materials and the sky backdrop, and retextures the countertop
//! surfaces with a slab photo on request.
//!
//! High-level modules
//! - `engine`: the scene engine owning all loaded state and caches
//! - `data_structures`: binary buffer views, mesh records, meshes, manifest and materials
//! - `resources`: asset fetching, texture and material resolution, sky and scene loading
//! - `countertop`: target selection, background removal, normal harmonization and UV projection
//! - `view`: camera defaults and the per-frame view update
//! - `camera`, `context`, `pipelines`, `render`: GPU state and drawing of the composed scene
//! - `flow`: the winit application loop
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod countertop;
pub mod data_structures;
pub mod engine;
pub mod error;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod view;

// Re-exports commonly used types for convenience in downstream code.
pub use config::{EngineConfig, ScenePaths};
pub use countertop::ApplyStatus;
pub use engine::SceneEngine;
pub use error::SceneError;
pub use flow::{ViewerConfig, ViewerEvent, ViewerHandle, run, run_with_handle};
