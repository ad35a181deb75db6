use crate::{
    config::ScenePaths,
    data_structures::{
        bounds::Aabb,
        buffer_view::SceneBuffers,
        mesh::{DecodedMesh, reconstruct},
        mesh_record::decode_mesh_records,
    },
    error::SceneError,
    resources::{AssetSource, fetch_required, yield_now},
};

/// Outcome of decoding the geometry of one scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub version: u32,
    pub decoded: usize,
    /// Inert placeholders plus records whose data was out of range.
    pub skipped: usize,
}

#[derive(Clone, Debug, Default)]
pub struct DecodedScene {
    pub meshes: Vec<DecodedMesh>,
    pub bounds: Aabb,
    pub report: LoadReport,
}

/// Fetches all geometry buffers of a scene concurrently.
///
/// Each of them is required; the first failure aborts the load.
pub async fn fetch_buffers<S: AssetSource>(
    source: &S,
    paths: &ScenePaths,
) -> Result<SceneBuffers, SceneError> {
    let files = [
        paths.mesh_records(),
        paths.bounds(),
        paths.faces16(),
        paths.faces32(),
        paths.vertices(),
        paths.transforms(),
        paths.uv0(),
    ];
    let (mesh_records, bounds, faces16, faces32, vertices, transforms, uv0) = futures::try_join!(
        fetch_required(source, &files[0]),
        fetch_required(source, &files[1]),
        fetch_required(source, &files[2]),
        fetch_required(source, &files[3]),
        fetch_required(source, &files[4]),
        fetch_required(source, &files[5]),
        fetch_required(source, &files[6]),
    )?;
    Ok(SceneBuffers {
        mesh_records,
        bounds,
        faces16,
        faces32,
        vertices,
        transforms,
        uv0,
    })
}

/// Decodes every mesh record and rebuilds its geometry.
///
/// Reconstruction runs in batches of `batch_size` meshes with a cooperative
/// yield in between so the host stays responsive during large loads.
/// Only a broken record table is an error; individual records are skipped.
pub async fn decode_scene(
    buffers: &SceneBuffers,
    batch_size: usize,
) -> Result<DecodedScene, SceneError> {
    let table = decode_mesh_records(&buffers.mesh_records, &buffers.bounds)?;
    let batch_size = batch_size.max(1);

    let mut meshes = Vec::with_capacity(table.records.len());
    let mut bounds = Aabb::empty();
    let mut malformed = 0;
    for (i, record) in table.records.iter().enumerate() {
        if i > 0 && i % batch_size == 0 {
            yield_now().await;
        }
        match reconstruct(record, buffers) {
            Some(mesh) => {
                bounds.union(&mesh.bounds);
                meshes.push(mesh);
            }
            None => {
                log::debug!("mesh record of node {} reads past its buffers", record.node_id);
                malformed += 1;
            }
        }
    }

    let skipped = table.inert + malformed;
    if skipped > 0 {
        log::warn!("{} meshes skipped", skipped);
    }
    log::info!(
        "decoded {} meshes (format version {})",
        meshes.len(),
        table.version
    );

    Ok(DecodedScene {
        report: LoadReport {
            version: table.version,
            decoded: meshes.len(),
            skipped,
        },
        meshes,
        bounds,
    })
}
