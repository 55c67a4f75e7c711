pub mod watermark;

use std::fs;
use std::io::BufReader;
use std::path::Path;

use fast_image_resize::{self as fir, images::Image as FirImage};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ExtendedColorType, RgbImage};

use crate::error::{Error, Result};

/// Read EXIF orientation tag (1-8). Returns 1 (normal) if missing or unreadable.
pub fn read_exif_orientation(path: &Path) -> u8 {
    let read = || -> Option<u8> {
        let file = fs::File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
        let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
        field.value.get_uint(0).map(|v| v as u8)
    };
    read().unwrap_or(1)
}

/// Apply an EXIF orientation value so the image is displayed upright.
///
/// 1: Normal                    5: Mirror + rotate 90° CW
/// 2: Mirror horizontal         6: Rotate 90° CW
/// 3: Rotate 180°               7: Mirror + rotate 90° CCW
/// 4: Mirror vertical           8: Rotate 90° CCW
pub fn apply_orientation(img: RgbImage, orientation: u8) -> RgbImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

/// Decode any supported format and turn it upright.
pub fn load_oriented(path: &Path) -> Result<RgbImage> {
    let img = image::open(path)?.to_rgb8();
    Ok(apply_orientation(img, read_exif_orientation(path)))
}

/// Scale to `max_width` preserving aspect ratio. Narrower images are returned as-is.
pub fn resize_to_width(img: RgbImage, max_width: u32) -> Result<RgbImage> {
    let (w, h) = img.dimensions();
    if w <= max_width || max_width == 0 {
        return Ok(img);
    }
    let new_h = ((h as u64 * max_width as u64 + w as u64 / 2) / w as u64).max(1) as u32;

    let src = FirImage::from_vec_u8(w, h, img.into_raw(), fir::PixelType::U8x3)
        .map_err(|e| Error::Resize(e.to_string()))?;
    let mut dst = FirImage::new(max_width, new_h, fir::PixelType::U8x3);
    fir::Resizer::new()
        .resize(&src, &mut dst, None)
        .map_err(|e| Error::Resize(e.to_string()))?;

    RgbImage::from_raw(max_width, new_h, dst.buffer().to_vec())
        .ok_or_else(|| Error::Resize("resized buffer has unexpected length".to_string()))
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        img.as_raw(),
        img.width(),
        img.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

/// Write a file, creating parent directories as needed.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Decode `source`, shrink it to `width` and store it as a JPEG at `target`.
pub fn write_preview(source: &Path, target: &Path, width: u32, quality: u8) -> Result<()> {
    let img = resize_to_width(load_oriented(source)?, width)?;
    write_file(target, &encode_jpeg(&img, quality)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_3x2() -> RgbImage {
        // [1, 2, 3]
        // [4, 5, 6]
        RgbImage::from_fn(3, 2, |x, y| {
            let v = (y * 3 + x + 1) as u8;
            image::Rgb([v, v, v])
        })
    }

    fn values(img: &RgbImage) -> Vec<u8> {
        img.pixels().map(|p| p.0[0]).collect()
    }

    // ── Orientation ─────────────────────────────────────────────

    #[test]
    fn test_orientation_identity() {
        let out = apply_orientation(grid_3x2(), 1);
        assert_eq!(out.dimensions(), (3, 2));
        assert_eq!(values(&out), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_orientation_rotate_90_cw() {
        let out = apply_orientation(grid_3x2(), 6);
        // [4, 1]
        // [5, 2]
        // [6, 3]
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(values(&out), vec![4, 1, 5, 2, 6, 3]);
    }

    #[test]
    fn test_orientation_rotate_180() {
        let out = apply_orientation(grid_3x2(), 3);
        assert_eq!(values(&out), vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_orientation_rotate_90_ccw() {
        let out = apply_orientation(grid_3x2(), 8);
        // [3, 6]
        // [2, 5]
        // [1, 4]
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(values(&out), vec![3, 6, 2, 5, 1, 4]);
    }

    #[test]
    fn test_orientation_transpose() {
        let out = apply_orientation(grid_3x2(), 5);
        // [1, 4]
        // [2, 5]
        // [3, 6]
        assert_eq!(values(&out), vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_missing_exif_reads_normal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plain.png");
        grid_3x2().save(&path).unwrap();
        assert_eq!(read_exif_orientation(&path), 1);
        assert_eq!(read_exif_orientation(Path::new("/nonexistent.jpg")), 1);
    }

    // ── Resize ──────────────────────────────────────────────────

    #[test]
    fn test_resize_preserves_aspect() {
        let img = RgbImage::from_pixel(1000, 500, image::Rgb([10, 20, 30]));
        let out = resize_to_width(img, 400).unwrap();
        assert_eq!(out.dimensions(), (400, 200));
    }

    #[test]
    fn test_resize_never_enlarges() {
        let img = RgbImage::from_pixel(120, 90, image::Rgb([0, 0, 0]));
        let out = resize_to_width(img, 400).unwrap();
        assert_eq!(out.dimensions(), (120, 90));
    }

    // ── Encoding ────────────────────────────────────────────────

    #[test]
    fn test_write_preview_from_png() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src.png");
        RgbImage::from_pixel(800, 600, image::Rgb([200, 100, 50]))
            .save(&source)
            .unwrap();
        let target = tmp.path().join("nested/out_preview.jpg");

        write_preview(&source, &target, 400, 80).unwrap();
        let decoded = image::open(&target).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
    }

    #[test]
    fn test_write_preview_rejects_non_image() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("fake.jpg");
        fs::write(&source, b"this is not a jpeg").unwrap();
        assert!(write_preview(&source, &tmp.path().join("out.jpg"), 400, 80).is_err());
        assert!(!tmp.path().join("out.jpg").exists());
    }

    #[test]
    fn test_encode_jpeg_is_deterministic() {
        let img = RgbImage::from_fn(64, 48, |x, y| image::Rgb([x as u8 * 3, y as u8 * 5, 90]));
        assert_eq!(encode_jpeg(&img, 70).unwrap(), encode_jpeg(&img, 70).unwrap());
    }
}
