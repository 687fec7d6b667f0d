use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::traits::media_library::MediaLibrary;

const VIDEOS_DIR: &str = "videos";
const IMAGES_DIR: &str = "images";

/// Media library backed by a plain directory.
///
/// Videos are copied to `root/videos/<id>.<ext>` and images written to
/// `root/images/<id>.jpg`, where `<id>` is a fresh UUID returned as the
/// local identifier.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a saved video, if `id` is known.
    pub fn fetch_video(&self, id: &str) -> Option<PathBuf> {
        find_asset(&self.root.join(VIDEOS_DIR), id)
    }

    /// Bytes of a saved image, if `id` is known.
    pub fn fetch_image(&self, id: &str) -> Option<Vec<u8>> {
        let path = find_asset(&self.root.join(IMAGES_DIR), id)?;
        fs::read(path).ok()
    }

    fn ensure_dir(&self, name: &str) -> Result<PathBuf, CaptureError> {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir).map_err(|e| {
            CaptureError::PersistenceFailed(format!("failed to create {}: {}", dir.display(), e))
        })?;
        Ok(dir)
    }
}

impl MediaLibrary for DirectoryLibrary {
    fn save_video(&self, path: &Path) -> Result<String, CaptureError> {
        let dir = self.ensure_dir(VIDEOS_DIR)?;
        let id = uuid::Uuid::new_v4().to_string();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
        let target = dir.join(format!("{}.{}", id, ext));

        fs::copy(path, &target).map_err(|e| {
            CaptureError::PersistenceFailed(format!("failed to save {}: {}", path.display(), e))
        })?;
        log::info!("Saved video {} as {}", path.display(), id);
        Ok(id)
    }

    fn save_image(&self, image: &[u8]) -> Result<String, CaptureError> {
        let dir = self.ensure_dir(IMAGES_DIR)?;
        let id = uuid::Uuid::new_v4().to_string();
        fs::write(dir.join(format!("{}.jpg", id)), image)
            .map_err(|e| CaptureError::PersistenceFailed(format!("failed to save image: {}", e)))?;
        log::info!("Saved image as {}", id);
        Ok(id)
    }
}

fn find_asset(dir: &Path, id: &str) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| path.file_stem().and_then(|s| s.to_str()) == Some(id))
}
