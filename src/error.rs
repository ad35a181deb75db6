/// Conditions that abort a scene load.
///
/// Everything below this level (a malformed mesh record, a texture that
/// exhausts its candidates, a missing sky) degrades instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("mesh record table is too short ({0} bytes) to hold its header")]
    MissingHeader(usize),
    #[error("unsupported mesh record stride of {stride} words (at least {minimum} required)")]
    UnsupportedStride { stride: u32, minimum: u32 },
    #[error("failed to fetch {path}: {message}")]
    Fetch { path: String, message: String },
    #[error("{path} is malformed: {source}")]
    Manifest {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
