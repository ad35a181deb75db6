use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use serde::de::DeserializeOwned;

use crate::error::SceneError;

/**
 * This module contains all logic for loading scenes, textures and materials from external storage.
 */
pub mod material;
pub mod scene;
pub mod sky;
pub mod texture;

/// Where scene files and textures come from.
///
/// Paths are relative, `/`-separated and never start with a slash. Fetches
/// may run concurrently; implementations don't need to be `Send` because the
/// engine runs on a single cooperative thread.
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>>;
}

/// Reads assets from a directory on disk.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct DirSource {
    root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl DirSource {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for DirSource {
    fn default() -> Self {
        Self::new(std::path::Path::new("./").join("assets"))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetSource for DirSource {
    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.root.join(path);
        Ok(tokio::fs::read(&path).await?)
    }
}

/// Fetches assets over HTTP relative to the page origin.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Debug)]
pub struct HttpSource {
    base: reqwest::Url,
}

#[cfg(target_arch = "wasm32")]
impl HttpSource {
    pub fn new(base: reqwest::Url) -> Self {
        Self { base }
    }

    /// `<origin>/assets/` of the current page.
    pub fn from_location() -> anyhow::Result<Self> {
        let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
        let origin = window
            .location()
            .origin()
            .map_err(|_| anyhow::anyhow!("page origin is not readable"))?;
        let base = reqwest::Url::parse(&format!("{}/assets/", origin))?;
        Ok(Self::new(base))
    }
}

#[cfg(target_arch = "wasm32")]
impl AssetSource for HttpSource {
    async fn fetch(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.base.join(path)?;
        let response = reqwest::get(url).await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// The source used by the viewer on the current platform.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformSource = DirSource;
#[cfg(target_arch = "wasm32")]
pub type PlatformSource = HttpSource;

pub(crate) async fn fetch_required<S: AssetSource>(source: &S, path: &str) -> Result<Vec<u8>, SceneError> {
    source.fetch(path).await.map_err(|e| SceneError::Fetch {
        path: path.to_string(),
        message: format!("{e:#}"),
    })
}

pub(crate) async fn fetch_json<S: AssetSource, T: DeserializeOwned>(
    source: &S,
    path: &str,
) -> Result<T, SceneError> {
    let bytes = fetch_required(source, path).await?;
    serde_json::from_slice(&bytes).map_err(|source| SceneError::Manifest {
        path: path.to_string(),
        source,
    })
}

/// Suspends the current task once so the host gets a chance to run.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
