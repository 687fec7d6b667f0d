use std::path::Path;

use crate::models::error::CaptureError;

/// Interface to the persistent media library (camera roll, gallery, ...).
///
/// Returned strings are the library's local identifiers for the new assets.
pub trait MediaLibrary: Send + Sync {
    fn save_video(&self, path: &Path) -> Result<String, CaptureError>;

    fn save_image(&self, image: &[u8]) -> Result<String, CaptureError>;
}
