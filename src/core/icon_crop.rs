//! Alpha-channel cropping of rendered icons onto a fixed square canvas.

use crate::utils::error::{PrepError, Result};
use image::imageops;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropOptions {
    /// Fraction of full-scale alpha a pixel must exceed to count as content.
    pub alpha_threshold: f32,
    pub margin: u32,
    pub canvas_size: u32,
    pub padding: u32,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            alpha_threshold: 0.02,
            margin: 40,
            canvas_size: 256,
            padding: 24,
        }
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Bounds {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Bounds of pixels whose alpha exceeds the threshold, or `None` when the
/// image is fully transparent.
pub fn content_bounds(img: &RgbaImage, alpha_threshold: f32) -> Option<Bounds> {
    let cutoff = alpha_threshold * 255.0;
    let mut bounds: Option<Bounds> = None;

    for (x, y, pixel) in img.enumerate_pixels() {
        if f32::from(pixel[3]) <= cutoff {
            continue;
        }
        bounds = Some(match bounds {
            None => Bounds { x0: x, y0: y, x1: x + 1, y1: y + 1 },
            Some(b) => Bounds {
                x0: b.x0.min(x),
                y0: b.y0.min(y),
                x1: b.x1.max(x + 1),
                y1: b.y1.max(y + 1),
            },
        });
    }
    bounds
}

fn grow(bounds: Bounds, margin: u32, width: u32, height: u32) -> Bounds {
    Bounds {
        x0: bounds.x0.saturating_sub(margin),
        y0: bounds.y0.saturating_sub(margin),
        x1: bounds.x1.saturating_add(margin).min(width),
        y1: bounds.y1.saturating_add(margin).min(height),
    }
}

/// Crops to content, scales to fit inside the padded canvas with
/// nearest-neighbour sampling and centres the result.
pub fn crop_to_canvas(img: &RgbaImage, options: &CropOptions) -> Result<RgbaImage> {
    let content = content_bounds(img, options.alpha_threshold).ok_or_else(|| {
        PrepError::processing("image has no pixels above the alpha threshold")
    })?;
    let region = grow(content, options.margin, img.width(), img.height());
    let cropped = imageops::crop_imm(img, region.x0, region.y0, region.width(), region.height())
        .to_image();

    let inner = options
        .canvas_size
        .saturating_sub(options.padding.saturating_mul(2))
        .max(1) as f64;
    let (cw, ch) = (cropped.width() as f64, cropped.height() as f64);
    let scale = (inner / cw).min(inner / ch);
    let nw = ((cw * scale) as u32).max(1);
    let nh = ((ch * scale) as u32).max(1);

    let scaled = imageops::resize(&cropped, nw, nh, imageops::FilterType::Nearest);

    let mut canvas = RgbaImage::new(options.canvas_size, options.canvas_size);
    let ox = (options.canvas_size.saturating_sub(nw) / 2) as i64;
    let oy = (options.canvas_size.saturating_sub(nh) / 2) as i64;
    imageops::overlay(&mut canvas, &scaled, ox, oy);
    Ok(canvas)
}

pub fn crop_file(src: &Path, dst: &Path, options: &CropOptions) -> Result<()> {
    let img = image::open(src)?.to_rgba8();
    let out = crop_to_canvas(&img, options)?;
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    out.save(dst)?;
    tracing::debug!("Cropped {} -> {}", src.display(), dst.display());
    Ok(())
}

/// Crops every PNG in `input_dir` into `output_dir`, keeping file names.
/// Failures are logged and skipped; the successfully written paths are
/// returned.
pub fn crop_directory(input_dir: &Path, output_dir: &Path, options: &CropOptions) -> Result<Vec<PathBuf>> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png"))
        })
        .collect();
    inputs.sort();

    let mut written = Vec::new();
    for src in inputs {
        let Some(name) = src.file_name() else { continue };
        let dst = output_dir.join(name);
        match crop_file(&src, &dst, options) {
            Ok(()) => written.push(dst),
            Err(e) => tracing::warn!("⚠️ Skipping {}: {}", src.display(), e),
        }
    }
    tracing::info!("✅ Cropped {} icons into {}", written.len(), output_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    fn square(size: u32, from: u32, to: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if (from..to).contains(&x) && (from..to).contains(&y) {
                Rgba([200, 10, 10, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn test_bounds_are_exclusive() {
        let img = square(100, 10, 20);
        let b = content_bounds(&img, 0.02).unwrap();
        assert_eq!(b, Bounds { x0: 10, y0: 10, x1: 20, y1: 20 });
        assert_eq!(grow(b, 40, 100, 100), Bounds { x0: 0, y0: 0, x1: 60, y1: 60 });
    }

    #[test]
    fn test_faint_pixels_are_ignored() {
        let mut img = RgbaImage::new(8, 8);
        img.put_pixel(1, 1, Rgba([0, 0, 0, 3]));
        assert!(content_bounds(&img, 0.02).is_none());
        assert!(crop_to_canvas(&img, &CropOptions::default()).is_err());
    }

    #[test]
    fn test_content_is_centred() {
        let img = square(400, 100, 300);
        let options = CropOptions {
            margin: 0,
            ..CropOptions::default()
        };
        let out = crop_to_canvas(&img, &options).unwrap();
        assert_eq!(out.dimensions(), (256, 256));
        // 200px of content scaled to fill the 208px between the paddings.
        assert_eq!(out.get_pixel(26, 26)[3], 255);
        assert_eq!(out.get_pixel(128, 128)[3], 255);
        assert_eq!(out.get_pixel(229, 229)[3], 255);
        assert_eq!(out.get_pixel(20, 128)[3], 0);
        assert_eq!(out.get_pixel(236, 128)[3], 0);
    }

    #[test]
    fn test_nearest_scaling_keeps_source_colours() {
        let mut img = square(30, 0, 30);
        for y in 0..30 {
            for x in 15..30 {
                img.put_pixel(x, y, Rgba([10, 10, 200, 255]));
            }
        }
        let options = CropOptions {
            margin: 0,
            canvas_size: 100,
            padding: 5,
            ..CropOptions::default()
        };
        let out = crop_to_canvas(&img, &options).unwrap();
        // 30px scaled by 3 into the 90px interior; no blended pixels.
        assert!(out.pixels().all(|p| {
            *p == Rgba([200, 10, 10, 255]) || *p == Rgba([10, 10, 200, 255]) || p[3] == 0
        }));
        assert_eq!(*out.get_pixel(5, 50), Rgba([200, 10, 10, 255]));
        assert_eq!(*out.get_pixel(94, 50), Rgba([10, 10, 200, 255]));
    }

    #[test]
    fn test_oversized_padding_does_not_overflow() {
        let img = square(20, 5, 15);
        let options = CropOptions {
            padding: u32::MAX,
            canvas_size: 32,
            ..CropOptions::default()
        };
        let out = crop_to_canvas(&img, &options).unwrap();
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn test_directory_skips_failures() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        square(64, 8, 40).save(input.path().join("car.png")).unwrap();
        RgbaImage::new(16, 16).save(input.path().join("blank.png")).unwrap();
        std::fs::write(input.path().join("notes.txt"), "x").unwrap();

        let written = crop_directory(input.path(), output.path(), &CropOptions::default()).unwrap();
        assert_eq!(written, vec![output.path().join("car.png")]);
        let saved = image::open(&written[0]).unwrap();
        assert_eq!(saved.width(), 256);
    }
}
