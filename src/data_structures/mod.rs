//! Engine data structures: buffers, records, meshes, manifests and textures.
//!
//! - `buffer_view` holds the raw scene buffers and typed views over them
//! - `mesh_record` decodes the mesh record table
//! - `mesh` rebuilds world-space geometry from a record
//! - `bounds` is the axis-aligned box used for meshes and the whole scene
//! - `manifest` is the authored scene description and target configuration
//! - `material` holds resolved CPU-side materials and texture handles
//! - `texture` is the GPU texture wrapper

pub mod bounds;
pub mod buffer_view;
pub mod manifest;
pub mod material;
pub mod mesh;
pub mod mesh_record;
pub mod texture;
