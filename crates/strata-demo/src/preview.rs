//! PNG previews of heightfields and splat maps.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use strata_terrain::Heightfield;

use crate::DemoError;

/// A flat RGBA image, row-major.
#[derive(Clone, Debug)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PreviewImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let idx = ((y * self.width + x) * 4) as usize;
        self.pixels[idx..idx + 4].copy_from_slice(&rgba);
    }

    pub fn write_png(&self, path: &Path) -> Result<(), DemoError> {
        let file = File::create(path).map_err(|source| DemoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        Ok(())
    }
}

/// Map a height in `[0, 1]` to an elevation color, given where sea level
/// falls in the same range.
///
/// Color bands: deep water, shallow water, beach, lowlands, mountains, snow.
pub fn height_to_color(normalized: f32, sea_level: f32) -> [u8; 3] {
    if normalized < sea_level * 0.5 {
        [0, 0, 128]
    } else if normalized < sea_level {
        [30, 80, 200]
    } else if normalized < sea_level + 0.02 {
        [220, 200, 130]
    } else if normalized < 0.55 {
        let t = ((normalized - sea_level) / (0.55 - sea_level)).clamp(0.0, 1.0);
        [
            (30.0 + t * 80.0) as u8,
            (160.0 - t * 40.0) as u8,
            (30.0 + t * 20.0) as u8,
        ]
    } else if normalized < 0.75 {
        let t = (normalized - 0.55) / 0.2;
        [
            (110.0 + t * 40.0) as u8,
            (120.0 - t * 50.0) as u8,
            (50.0 + t * 20.0) as u8,
        ]
    } else {
        let t = ((normalized - 0.75) / 0.25).min(1.0);
        let base = (150.0 + t * 105.0) as u8;
        [base, base, base]
    }
}

/// Color-coded elevation preview. `sea_level` is in the field's own units.
pub fn render_heightfield(field: &Heightfield, sea_level: f32) -> PreviewImage {
    let mut image = PreviewImage::new(field.width() as u32, field.height() as u32);
    let (min, max) = field.min_max().unwrap_or((0.0, 0.0));
    let range = max - min;
    let normalize = |h: f32| if range > 0.0 { (h - min) / range } else { 0.5 };
    let sea = normalize(sea_level).clamp(0.0, 1.0);

    for y in 0..field.height() {
        for (x, &h) in field.row(y).iter().enumerate() {
            let [r, g, b] = height_to_color(normalize(h), sea);
            image.set_pixel(x as u32, y as u32, [r, g, b, u8::MAX]);
        }
    }
    image
}

/// One splat map as an RGBA image, alpha forced opaque for viewing.
pub fn render_splat(size: usize, texels: &[[u8; 4]]) -> PreviewImage {
    let mut image = PreviewImage::new(size as u32, size as u32);
    for (i, texel) in texels.iter().enumerate().take(size * size) {
        let [r, g, b, _] = *texel;
        image.set_pixel((i % size) as u32, (i / size) as u32, [r, g, b, u8::MAX]);
    }
    image
}
