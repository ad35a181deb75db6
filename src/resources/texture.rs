//! Texture resolution through a ranked list of candidate paths.
//!
//! A texture may exist in several encodings and sizes on the asset host, and
//! not all of them are guaranteed to be present. Candidates are tried one
//! after another, never in parallel, and the first one that fetches and
//! decodes wins. Results are memoised per texture so that concurrent requests
//! share a single in-flight resolution and later requests never retry
//! candidates that already failed.

use std::{cell::RefCell, collections::HashMap, path::Path, rc::Rc, sync::Arc};

use futures::{
    FutureExt,
    future::{LocalBoxFuture, Shared},
};
use image::RgbaImage;

use crate::{
    data_structures::{manifest::TextureDefinition, material::TextureHandle},
    resources::AssetSource,
};

/// File stem suffix of standard quality encodings.
pub const STANDARD_SUFFIX: &str = "-std";

pub type ImageFuture = Shared<LocalBoxFuture<'static, Option<Arc<RgbaImage>>>>;

/// Ordered, de-duplicated candidate paths for one texture.
///
/// 1. advertised variants whose stem ends in [`STANDARD_SUFFIX`]
/// 2. the smallest advertised size
/// 3. the largest advertised size
/// 4. the raw, unscaled upload
pub fn candidate_paths(texture: &TextureDefinition, root: &str) -> Vec<String> {
    let dir = join(root, &texture.id);
    let mut candidates: Vec<String> = texture
        .variants
        .iter()
        .filter(|variant| {
            Path::new(variant.as_str())
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.ends_with(STANDARD_SUFFIX))
        })
        .map(|variant| format!("{dir}/{variant}"))
        .collect();

    let small = texture.sizes.iter().min();
    let large = texture.sizes.iter().max();
    for size in small.into_iter().chain(large) {
        candidates.push(format!("{dir}/{size}{STANDARD_SUFFIX}.{}", texture.ext));
    }
    candidates.push(format!("{dir}.{}", texture.raw_ext));

    let mut seen = Vec::with_capacity(candidates.len());
    candidates.retain(|c| {
        if seen.contains(c) {
            false
        } else {
            seen.push(c.clone());
            true
        }
    });
    candidates
}

fn join(root: &str, id: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        id.to_string()
    } else {
        format!("{root}/{id}")
    }
}

/// In-flight and completed texture resolutions keyed by `root/id`.
pub struct TextureCache<S> {
    source: Rc<S>,
    entries: RefCell<HashMap<String, ImageFuture>>,
}

impl<S: AssetSource + 'static> TextureCache<S> {
    pub fn new(source: Rc<S>) -> Self {
        Self {
            source,
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub fn cache_key(texture: &TextureDefinition, root: &str) -> String {
        join(root, &texture.id)
    }

    /// Shared future of the decoded image, created on first request.
    pub fn request(&self, texture: &TextureDefinition, root: &str) -> ImageFuture {
        let key = Self::cache_key(texture, root);
        if let Some(pending) = self.entries.borrow().get(&key) {
            return pending.clone();
        }

        let candidates = candidate_paths(texture, root);
        let source = Rc::clone(&self.source);
        let label = key.clone();
        let pending = async move { load_first(&*source, &label, &candidates).await }
            .boxed_local()
            .shared();
        self.entries.borrow_mut().insert(key, pending.clone());
        pending
    }

    pub async fn resolve(&self, texture: &TextureDefinition, root: &str) -> Option<TextureHandle> {
        let key = Self::cache_key(texture, root);
        let image = self.request(texture, root).await?;
        Some(TextureHandle::new(key, image))
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

async fn load_first<S: AssetSource>(
    source: &S,
    label: &str,
    candidates: &[String],
) -> Option<Arc<RgbaImage>> {
    for path in candidates {
        let bytes = match source.fetch(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::debug!("texture candidate {} unavailable: {}", path, e);
                continue;
            }
        };
        match image::load_from_memory(&bytes) {
            Ok(img) => {
                log::debug!("texture {} resolved from {}", label, path);
                return Some(Arc::new(img.to_rgba8()));
            }
            Err(e) => log::debug!("texture candidate {} could not be decoded: {}", path, e),
        }
    }
    log::warn!(
        "texture {} could not be loaded from any of {} candidates",
        label,
        candidates.len()
    );
    None
}
