// Image loading module
// Decodes the frame image once and prepares it for both render paths

use anyhow::{Context, Result};
use image::{DynamicImage, RgbaImage};
use std::path::Path;

/// Decoded image ready for display
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Natural image width in pixels
    pub width: u32,
    /// Natural image height in pixels
    pub height: u32,
    /// Straight-alpha BGRA pixel data (4 bytes per pixel)
    pub bgra_data: Vec<u8>,
    /// Progressively half-sized versions, used when the frame is much
    /// narrower than the image
    pub mipmaps: Vec<MipmapLevel>,
}

/// A single mipmap level
#[derive(Debug, Clone)]
pub struct MipmapLevel {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageData {
    /// Build display data from an already decoded image
    pub fn from_dynamic(img: DynamicImage) -> Self {
        Self::from_rgba(img.to_rgba8())
    }

    pub fn from_rgba(rgba: RgbaImage) -> Self {
        let (width, height) = rgba.dimensions();

        // Wayland's ARGB8888 is BGRA in little-endian memory
        let mut bgra_data = rgba.into_raw();
        for pixel in bgra_data.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }

        let mipmaps = generate_mipmaps(width, height, &bgra_data);

        Self {
            width,
            height,
            bgra_data,
            mipmaps,
        }
    }

    /// Height of the image when drawn `frame_width` pixels wide, keeping the
    /// natural aspect ratio
    pub fn fitted_height(&self, frame_width: u32) -> u32 {
        let factor = frame_width as f32 / self.width as f32;
        (factor * self.height as f32).round() as u32
    }

    /// Pick the smallest pixel source that is still at least `target_width`
    /// wide. Falls back to the full-resolution data.
    pub fn source_for_width(&self, target_width: u32) -> (u32, u32, &[u8]) {
        self.mipmaps
            .iter()
            .rev()
            .find(|level| level.width >= target_width)
            .map(|level| (level.width, level.height, &level.data[..]))
            .unwrap_or((self.width, self.height, &self.bgra_data[..]))
    }
}

/// Decode the image at `path`
pub fn load_image(path: &Path) -> Result<ImageData> {
    let img = image::open(path)
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;

    if img.width() == 0 || img.height() == 0 {
        anyhow::bail!("Image has no pixels: {}", path.display());
    }

    Ok(ImageData::from_dynamic(img))
}

/// Generate mipmap levels with a 2x2 box filter
fn generate_mipmaps(width: u32, height: u32, data: &[u8]) -> Vec<MipmapLevel> {
    let mut mipmaps: Vec<MipmapLevel> = Vec::new();
    let (mut current_width, mut current_height) = (width, height);

    while current_width >= 128 && current_height >= 128 && mipmaps.len() < 8 {
        let current = mipmaps.last().map(|level| &level.data[..]).unwrap_or(data);
        let next_width = current_width / 2;
        let next_height = current_height / 2;
        let mut next = vec![0u8; (next_width * next_height * 4) as usize];

        for y in 0..next_height {
            for x in 0..next_width {
                let mut sum = [0u32; 4];
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let idx = (((y * 2 + dy) * current_width + x * 2 + dx) * 4) as usize;
                    for (acc, &channel) in sum.iter_mut().zip(&current[idx..idx + 4]) {
                        *acc += channel as u32;
                    }
                }

                let dst = ((y * next_width + x) * 4) as usize;
                for (out, acc) in next[dst..dst + 4].iter_mut().zip(sum) {
                    *out = (acc / 4) as u8;
                }
            }
        }

        mipmaps.push(MipmapLevel {
            width: next_width,
            height: next_height,
            data: next,
        });
        current_width = next_width;
        current_height = next_height;
    }

    mipmaps
}
