//! Scratch-file naming and cross-filesystem moves.

use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::MediaResult;

/// Linux/macOS `EXDEV`.
const EXDEV: i32 = 18;

/// Local file name for a downloaded media item.
///
/// Uses the last URL path segment (query and fragment stripped) prefixed
/// with the item index, so two rows pointing at `.../video.mp4` on
/// different hosts never collide. The extension is kept as-is; nothing is
/// appended when the URL has none.
pub fn scratch_name(url: &str, index: usize) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let base = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .unwrap_or("media");

    let sanitized: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    format!("item_{}_{}", index, sanitized)
}

/// Move `src` to `dst`, creating parent directories.
///
/// Falls back to copy + delete when the two paths live on different
/// filesystems (scratch on tmpfs, storage on a mounted volume).
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!("Cross-device move {} -> {}", src.display(), dst.display());
            let staging = dst.with_extension("partial");
            fs::copy(src, &staging).await?;
            if let Err(e) = fs::rename(&staging, dst).await {
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!("Failed to remove {} after copy: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scratch_name_keeps_extension() {
        assert_eq!(scratch_name("https://example.com/media/clip.mp4?sig=abc", 0), "item_0_clip.mp4");
        assert_eq!(scratch_name("https://example.com/photo.JPG#frag", 3), "item_3_photo.JPG");
    }

    #[test]
    fn test_scratch_name_without_extension() {
        assert_eq!(
            scratch_name("https://drive.google.com/uc?export=download&id=abc", 1),
            "item_1_uc"
        );
        assert_eq!(scratch_name("https://example.com/", 2), "item_2_example.com");
        assert_eq!(scratch_name("https://example.com/a b%20c.mov", 4), "item_4_a_b_20c.mov");
    }

    #[tokio::test]
    async fn test_move_file_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("render.mp4");
        let dst = dir.path().join("outputs").join("job").join("output.mp4");
        fs::write(&src, b"frames").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_move_file_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("new.mp4");
        let dst = dir.path().join("out.mp4");
        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();

        move_file(&src, &dst).await.unwrap();
        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_move_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = move_file(dir.path().join("nope"), dir.path().join("dst")).await;
        assert!(result.is_err());
    }
}
