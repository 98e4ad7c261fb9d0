//! Software frames for the headless backend
//!
//! Draws an orthographic XY projection of visible geometry: points as
//! squares, line segments, and triangle vertices. Frames are encoded with
//! the `image` crate.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use std::path::Path;

use crate::backend::{ImageFormat, RawImage};
use crate::colour::Colour;
use crate::error::{BackendError, BackendResult};

/// Geometry prepared for drawing
pub(crate) struct Drawable {
    pub vertices: Vec<f32>,
    /// One colour per vertex, or a single colour for all
    pub colours: Vec<Colour>,
    pub size: u32,
    pub segments: bool,
}

pub(crate) struct Canvas {
    image: RgbaImage,
}

fn image_error(err: impl std::fmt::Display) -> BackendError {
    BackendError::Image {
        message: err.to_string(),
    }
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Colour) -> Self {
        let image = RgbaImage::from_pixel(
            width.max(1),
            height.max(1),
            image::Rgba(background.to_bytes()),
        );
        Self { image }
    }

    /// Draw everything scaled to fit `bounds`
    pub fn draw(&mut self, drawables: &[Drawable], bounds: [[f32; 3]; 2]) {
        let (w, h) = (self.image.width() as f32, self.image.height() as f32);
        let span_x = (bounds[1][0] - bounds[0][0]).max(f32::EPSILON);
        let span_y = (bounds[1][1] - bounds[0][1]).max(f32::EPSILON);
        let scale = ((w - 1.0) / span_x).min((h - 1.0) / span_y) * 0.9;
        let (ox, oy) = (
            (w - span_x * scale) / 2.0,
            (h - span_y * scale) / 2.0,
        );
        let project = |p: &[f32]| -> (i64, i64) {
            let x = ox + (p[0] - bounds[0][0]) * scale;
            let y = h - 1.0 - (oy + (p[1] - bounds[0][1]) * scale);
            (x.round() as i64, y.round() as i64)
        };

        for item in drawables {
            let colour_at = |n: usize| -> Colour {
                match item.colours.len() {
                    0 => Colour::rgb(255, 255, 255),
                    1 => item.colours[0],
                    len => item.colours[n.min(len - 1)],
                }
            };
            let points: Vec<&[f32]> = item
                .vertices
                .chunks_exact(3)
                .filter(|p| p.iter().all(|v| v.is_finite()))
                .collect();
            if item.segments {
                for (n, pair) in points.chunks_exact(2).enumerate() {
                    let (a, b) = (project(pair[0]), project(pair[1]));
                    self.line(a, b, colour_at(n * 2));
                }
            } else {
                for (n, p) in points.iter().enumerate() {
                    self.splat(project(p), item.size, colour_at(n));
                }
            }
        }
    }

    fn put(&mut self, x: i64, y: i64, colour: Colour) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
            self.image.put_pixel(x as u32, y as u32, image::Rgba(colour.to_bytes()));
        }
    }

    fn splat(&mut self, (x, y): (i64, i64), size: u32, colour: Colour) {
        let half = (size.max(1) as i64 - 1) / 2;
        for dy in -half..=half {
            for dx in -half..=half {
                self.put(x + dx, y + dy, colour);
            }
        }
    }

    fn line(&mut self, (x0, y0): (i64, i64), (x1, y1): (i64, i64), colour: Colour) {
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.put(x, y, colour);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Raw pixels with 1 (luminance), 3 (rgb) or 4 (rgba) channels
    pub fn raw(&self, channels: u32) -> BackendResult<RawImage> {
        let (width, height) = self.image.dimensions();
        let pixels: Vec<u8> = match channels {
            4 => self.image.as_raw().clone(),
            3 => self.image.pixels().flat_map(|p| [p[0], p[1], p[2]]).collect(),
            1 => self
                .image
                .pixels()
                .map(|p| Colour::new(p[0], p[1], p[2], p[3]).monochrome().r)
                .collect(),
            other => {
                return Err(BackendError::Unsupported {
                    operation: format!("{} channel images", other),
                })
            }
        };
        Ok(RawImage {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Encode as JPEG (always opaque) or PNG (alpha kept when `transparent`)
    pub fn encode(
        &self,
        format: ImageFormat,
        quality: u8,
        transparent: bool,
    ) -> BackendResult<Vec<u8>> {
        let (width, height) = self.image.dimensions();
        let mut out = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let rgb = self.raw(3)?;
                JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                    .write_image(&rgb.pixels, width, height, ExtendedColorType::Rgb8)
                    .map_err(image_error)?;
            }
            ImageFormat::Png if transparent => {
                PngEncoder::new(&mut out)
                    .write_image(self.image.as_raw(), width, height, ExtendedColorType::Rgba8)
                    .map_err(image_error)?;
            }
            ImageFormat::Png => {
                let rgb = self.raw(3)?;
                PngEncoder::new(&mut out)
                    .write_image(&rgb.pixels, width, height, ExtendedColorType::Rgb8)
                    .map_err(image_error)?;
            }
        }
        Ok(out)
    }
}

/// Load any supported image file as RGBA
pub(crate) fn load(path: &Path) -> BackendResult<RawImage> {
    let image = image::open(path).map_err(image_error)?.to_rgba8();
    let (width, height) = image.dimensions();
    Ok(RawImage {
        width,
        height,
        channels: 4,
        pixels: image.into_raw(),
    })
}

/// Write raw pixels to a file, format chosen by extension
pub(crate) fn save(raw: &RawImage, path: &Path) -> BackendResult<()> {
    let colour_type = match raw.channels {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        4 => ExtendedColorType::Rgba8,
        other => {
            return Err(BackendError::Unsupported {
                operation: format!("{} channel images", other),
            })
        }
    };
    image::save_buffer(path, &raw.pixels, raw.width, raw.height, colour_type).map_err(image_error)
}

/// Mean absolute per-channel difference in [0,1]; 1 when sizes differ
pub(crate) fn diff(a: &RawImage, b: &RawImage) -> f32 {
    if a.width != b.width || a.height != b.height || a.pixels.len() != b.pixels.len() {
        return 1.0;
    }
    if a.pixels.is_empty() {
        return 0.0;
    }
    let total: u64 = a
        .pixels
        .iter()
        .zip(&b.pixels)
        .map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs() as u64)
        .sum();
    total as f32 / (a.pixels.len() as f32 * 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_soi() {
        let canvas = Canvas::new(8, 6, Colour::black());
        let jpeg = canvas.encode(ImageFormat::Jpeg, 90, false).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let png = canvas.encode(ImageFormat::Png, 0, true).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_draw_points() {
        let mut canvas = Canvas::new(10, 10, Colour::black());
        canvas.draw(
            &[Drawable {
                vertices: vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0],
                colours: vec![Colour::rgb(255, 0, 0)],
                size: 1,
                segments: false,
            }],
            [[0.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
        );
        let raw = canvas.raw(3).unwrap();
        let red = raw.pixels.chunks_exact(3).filter(|p| p == &[255, 0, 0]).count();
        assert_eq!(red, 2);
    }

    #[test]
    fn test_diff() {
        let a = Canvas::new(4, 4, Colour::black()).raw(4).unwrap();
        let b = Canvas::new(4, 4, Colour::rgb(255, 255, 255)).raw(4).unwrap();
        assert_eq!(diff(&a, &a), 0.0);
        assert!((diff(&a, &b) - 0.75).abs() < 1e-6);
        let c = Canvas::new(2, 2, Colour::black()).raw(4).unwrap();
        assert_eq!(diff(&a, &c), 1.0);
    }
}
