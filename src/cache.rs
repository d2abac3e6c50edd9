//! # Image Cache
//!
//! Downloads backdrops into the cache directory, one file per title.
//!
//! The filename comes from the title alone (`<title>.jpg`), so fetching the
//! same title again overwrites the previous image. That is the whole eviction
//! policy: the cache never holds more than one image per title.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::ChangeError;
use crate::tmdb::ImageReference;

/// Downloads raw image bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ChangeError>;
}

/// An image sitting in the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub title: String,
    pub file_path: PathBuf,
}

/// The per-title image cache.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache path for a title.
    ///
    /// Path separators in the title become `_` so the file always lands
    /// directly inside the cache directory.
    pub fn path_for(&self, title: &str) -> PathBuf {
        let file_stem: String = title
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{file_stem}.jpg"))
    }

    /// Downloads `image` and stores it as the cached image for `title`.
    ///
    /// Creates the cache directory if needed and overwrites any previous image
    /// for the same title.
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Path of the written file
    /// * `Err(ChangeError::Io)` - The download failed, the payload isn't an
    ///   image, or the write failed
    pub async fn store(
        &self,
        fetcher: &dyn ImageFetcher,
        image: &ImageReference,
        title: &str,
    ) -> Result<PathBuf, ChangeError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ChangeError::Io(format!("failed to create image directory: {e}")))?;

        let bytes = fetcher.fetch_bytes(&image.url).await?;

        // Validate that we received an actual image (check magic bytes)
        // JPEG starts with FF D8 FF, PNG starts with 89 50 4E 47
        if !looks_like_image(&bytes) {
            return Err(ChangeError::Io(
                "downloaded content is not a valid image (may be an error page)".to_string(),
            ));
        }

        let path = self.path_for(title);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ChangeError::Io(format!("failed to save image: {e}")))?;

        Ok(path)
    }

    /// The cached image for `title`, if one exists.
    pub fn cached(&self, title: &str) -> Option<PathBuf> {
        let path = self.path_for(title);
        path.is_file().then_some(path)
    }

    /// Everything in the cache, sorted by title.
    pub fn entries(&self) -> Vec<CachedImage> {
        let mut items: Vec<CachedImage> = std::fs::read_dir(&self.dir)
            .ok()
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "jpg"))
            .filter_map(|path| {
                let title = path.file_stem()?.to_string_lossy().to_string();
                Some(CachedImage { title, file_path: path })
            })
            .collect();

        items.sort_by(|a, b| a.title.cmp(&b.title));
        items
    }
}

fn looks_like_image(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF]) || bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47])
}
