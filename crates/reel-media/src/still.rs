//! Still-image preparation.
//!
//! Pictures are decoded in-process so transparency can be flattened onto
//! white before FFmpeg sees them; otherwise yuv420p encoding turns
//! transparent regions black.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// A decoded picture written back out as an opaque PNG.
#[derive(Debug, Clone)]
pub struct PreparedStill {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Composite an RGBA image over an opaque white background.
pub fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let px = rgba.get_pixel(x, y).0;
        let alpha = px[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(px[0]), blend(px[1]), blend(px[2])])
    })
}

/// Decode `source`, flatten alpha, and write an opaque PNG to `dest`.
pub async fn prepare_still(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> MediaResult<PreparedStill> {
    let source = source.as_ref().to_path_buf();
    let dest = dest.as_ref().to_path_buf();

    if !source.exists() {
        return Err(MediaError::SourceNotFound(source));
    }

    tokio::task::spawn_blocking(move || -> MediaResult<PreparedStill> {
        let decoded = image::open(&source)?;
        let has_alpha = decoded.color().has_alpha();
        let flat = if has_alpha {
            flatten_onto_white(&decoded.to_rgba8())
        } else {
            decoded.to_rgb8()
        };

        debug!(
            source = %source.display(),
            width = flat.width(),
            height = flat.height(),
            has_alpha,
            "Decoded still image"
        );

        flat.save(&dest)?;
        Ok(PreparedStill {
            width: flat.width(),
            height: flat.height(),
            path: dest,
        })
    })
    .await
    .map_err(|e| MediaError::Io(std::io::Error::other(e.to_string())))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    #[test]
    fn test_transparent_becomes_white() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([10, 20, 30, 255]));

        let flat = flatten_onto_white(&img);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_half_transparent_blends() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 128]));
        let flat = flatten_onto_white(&img);
        let v = flat.get_pixel(0, 0).0[0];
        assert!((126..=128).contains(&v), "got {v}");
    }

    #[tokio::test]
    async fn test_prepare_still_writes_opaque_png() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("logo.png");
        let mut img = RgbaImage::new(4, 3);
        for px in img.pixels_mut() {
            *px = Rgba([255, 0, 0, 0]);
        }
        img.save(&src).unwrap();

        let dest = dir.path().join("flat.png");
        let still = prepare_still(&src, &dest).await.unwrap();

        assert_eq!((still.width, still.height), (4, 3));
        let reread = image::open(&dest).unwrap();
        assert!(!reread.color().has_alpha());
        assert_eq!(reread.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[tokio::test]
    async fn test_prepare_still_rejects_non_image() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("fake.png");
        tokio::fs::write(&src, b"definitely not a png").await.unwrap();

        let err = prepare_still(&src, dir.path().join("out.png")).await.unwrap_err();
        assert!(matches!(err, MediaError::Image(_)));
    }

    #[tokio::test]
    async fn test_prepare_still_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = prepare_still(dir.path().join("gone.png"), dir.path().join("out.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::SourceNotFound(_)));
    }
}
