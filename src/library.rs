use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::payload::{ImagePayload, is_supported_image};
use crate::task::new_id;

/// An uploaded image whose `name` is the key used to match prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub id: String,
    /// File name without its extension.
    pub name: String,
    pub data: ImagePayload,
}

impl ReferenceImage {
    pub fn new(name: impl Into<String>, data: ImagePayload) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            data,
        }
    }

    /// Read an image file; its stem (`girl.png` → `girl`) becomes the name.
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Invalid file name: {}", path.display()))?;
        let data = ImagePayload::from_file(path)?;
        Ok(Self::new(name, data))
    }
}

/// The uploaded reference images, in upload order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    images: Vec<ReferenceImage>,
}

impl ReferenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self) -> &[ReferenceImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn extend(&mut self, images: impl IntoIterator<Item = ReferenceImage>) {
        self.images.extend(images);
    }

    /// Remove an image by id. Tasks that already use it keep their copy.
    pub fn remove(&mut self, id: &str) -> Option<ReferenceImage> {
        let index = self.images.iter().position(|img| img.id == id)?;
        Some(self.images.remove(index))
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }
}

/// Read every file into a [`ReferenceImage`], skipping unreadable ones.
pub fn load_references(paths: &[PathBuf]) -> Vec<ReferenceImage> {
    paths
        .iter()
        .filter_map(|path| match ReferenceImage::from_file(path) {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("Skipping reference image {}: {e:#}", path.display());
                None
            }
        })
        .collect()
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks) and their entries sorted by path so
/// imports are reproducible.
///
/// # Example
///
/// ```rust,no_run
/// use gemini_batch::library::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(&[
///     PathBuf::from("girl.png"),    // single file
///     PathBuf::from("./refs/"),     // entire directory
/// ]);
/// println!("Found {} reference images", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_supported_image(p))
                .collect();
            found.sort();
            images.extend(found);
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}
