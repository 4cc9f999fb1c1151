//! Media type detection for items declared as `auto`.

use std::path::Path;
use tracing::{debug, warn};

use reel_models::MediaType;

use crate::probe::probe_media;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv", "webm"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether the path carries a known video extension (case-insensitive).
pub fn is_video_extension(path: impl AsRef<Path>) -> bool {
    extension_of(path.as_ref()).is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

/// Whether the path carries a known image extension (case-insensitive).
pub fn is_image_extension(path: impl AsRef<Path>) -> bool {
    extension_of(path.as_ref()).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// Decide whether a local file is a video or an image.
///
/// Declared types win. For `auto`, the extension decides when it is known;
/// otherwise FFprobe is asked, and anything it opens as a timeline is a
/// video. Files FFprobe cannot read fall back to image, which then fails
/// loudly in the image decoder if the bytes are not a picture either.
pub async fn detect_media_type(path: impl AsRef<Path>, declared: MediaType) -> MediaType {
    let path = path.as_ref();
    match declared {
        MediaType::Video | MediaType::Image => return declared,
        MediaType::Auto => {}
    }

    if is_video_extension(path) {
        return MediaType::Video;
    }
    if is_image_extension(path) {
        return MediaType::Image;
    }

    match probe_media(path).await {
        Ok(info) if !info.is_still_image() => {
            debug!(path = %path.display(), format = %info.format_name, "Probed as video");
            MediaType::Video
        }
        Ok(info) => {
            debug!(path = %path.display(), format = %info.format_name, "Probed as image");
            MediaType::Image
        }
        Err(e) => {
            warn!(path = %path.display(), "Could not probe media, treating as image: {}", e);
            MediaType::Image
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_sets() {
        assert!(is_video_extension("a/b/clip.MP4"));
        assert!(is_video_extension("x.webm"));
        assert!(!is_video_extension("x.png"));
        assert!(is_image_extension("photo.jpeg"));
        assert!(is_image_extension("scan.TIFF"));
        assert!(!is_image_extension("clip.mov"));
        assert!(!is_image_extension("noext"));
    }

    #[tokio::test]
    async fn test_declared_type_wins() {
        assert_eq!(detect_media_type("photo.png", MediaType::Video).await, MediaType::Video);
        assert_eq!(detect_media_type("clip.mp4", MediaType::Image).await, MediaType::Image);
    }

    #[tokio::test]
    async fn test_auto_uses_extension() {
        assert_eq!(detect_media_type("clip.mkv", MediaType::Auto).await, MediaType::Video);
        assert_eq!(detect_media_type("still.gif", MediaType::Auto).await, MediaType::Image);
    }

    #[tokio::test]
    async fn test_auto_unreadable_without_extension_is_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("item_0_uc");
        // Missing file: the probe fails before spawning anything.
        assert_eq!(detect_media_type(&path, MediaType::Auto).await, MediaType::Image);
    }
}
