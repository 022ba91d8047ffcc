//! Raster compositing and artifact encoding.
//!
//! Layer canvases are RGBA images at the output size. Tiles are drawn onto
//! their layer's canvas as they arrive; once every layer is complete the
//! canvases are blended onto one output canvas in layer order (later layers
//! over earlier ones, each at its own opacity) and encoded to PNG.

use std::io::Cursor;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::PrintError;
use crate::tile::PixelRect;

/// Draws a fetched image into its destination rectangle on a layer canvas.
///
/// The image is resized to the destination size when they differ and
/// clipped to the canvas bounds.
pub fn draw_into(canvas: &mut RgbaImage, image: &DynamicImage, dest: &PixelRect) {
    if dest.width == 0 || dest.height == 0 {
        return;
    }
    let rgba = if image.width() == dest.width && image.height() == dest.height {
        image.to_rgba8()
    } else {
        image
            .resize_exact(dest.width, dest.height, FilterType::Triangle)
            .to_rgba8()
    };
    image::imageops::overlay(canvas, &rgba, dest.x, dest.y);
}

/// Source-over blends `layer` onto `canvas` at the given opacity.
///
/// Both images must have the same dimensions; mismatches blend the
/// overlapping region only.
pub fn blend_onto(canvas: &mut RgbaImage, layer: &RgbaImage, opacity: f64) {
    let opacity = opacity.clamp(0.0, 1.0) as f32;
    if opacity == 0.0 {
        return;
    }
    let width = canvas.width().min(layer.width());
    let height = canvas.height().min(layer.height());

    for y in 0..height {
        for x in 0..width {
            let src = layer.get_pixel(x, y).0;
            let dst = canvas.get_pixel(x, y).0;

            let src_a = (src[3] as f32 / 255.0) * opacity;
            if src_a == 0.0 {
                continue;
            }
            let dst_a = dst[3] as f32 / 255.0;
            let out_a = src_a + dst_a * (1.0 - src_a);

            let mut out = [0u8; 4];
            for channel in 0..3 {
                let s = src[channel] as f32 / 255.0;
                let d = dst[channel] as f32 / 255.0;
                let blended = (s * src_a + d * dst_a * (1.0 - src_a)) / out_a;
                out[channel] = (blended * 255.0).round() as u8;
            }
            out[3] = (out_a * 255.0).round() as u8;
            canvas.put_pixel(x, y, image::Rgba(out));
        }
    }
}

/// Composites finished layer canvases in input order and encodes the result
/// as PNG.
///
/// CPU-bound; callers run it on a blocking thread.
pub fn compose_and_encode(
    width: u32,
    height: u32,
    layers: Vec<RgbaImage>,
    opacities: Vec<f64>,
) -> Result<Bytes, PrintError> {
    let mut canvas = RgbaImage::new(width, height);
    for (layer, opacity) in layers.iter().zip(opacities.iter()) {
        blend_onto(&mut canvas, layer, *opacity);
    }
    encode_png(&canvas)
}

/// Encodes a canvas as PNG bytes.
pub fn encode_png(canvas: &RgbaImage) -> Result<Bytes, PrintError> {
    let mut buffer = Cursor::new(Vec::new());
    canvas
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| PrintError::ChannelError(format!("artifact encoding failed: {}", e)))?;
    Ok(Bytes::from(buffer.into_inner()))
}
