// CPU rendering into shared-memory buffers
// Output is premultiplied ARGB8888 (BGRA byte order), as wl_shm expects

use crate::image_loader::ImageData;

/// Draw `image` across the full `width` of a `width` x `height` canvas.
///
/// The image keeps its aspect ratio: rows below its fitted height are left
/// transparent and a fitted image taller than the canvas is cut off at the
/// bottom. `opacity` scales every pixel's alpha.
pub fn render_fitted(image: &ImageData, canvas: &mut [u8], width: u32, height: u32, opacity: f32) {
    canvas.fill(0);
    if width == 0 || height == 0 || opacity <= 0.0 {
        return;
    }

    let fitted_height = image.fitted_height(width).max(1);
    let visible_rows = fitted_height.min(height);
    let (src_width, src_height, src) = image.source_for_width(width);

    let scale_x = src_width as f32 / width as f32;
    let scale_y = src_height as f32 / fitted_height as f32;
    let opacity = opacity.min(1.0);

    let sample = |px: u32, py: u32| -> [f32; 4] {
        let idx = ((py * src_width + px) * 4) as usize;
        [
            src[idx] as f32,
            src[idx + 1] as f32,
            src[idx + 2] as f32,
            src[idx + 3] as f32,
        ]
    };

    for y in 0..visible_rows {
        // Sample at pixel centres so edges don't bias towards the top-left
        let src_y = ((y as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (src_y.floor() as u32).min(src_height - 1);
        let y1 = (y0 + 1).min(src_height - 1);
        let fy = src_y - y0 as f32;

        let row = &mut canvas[(y * width * 4) as usize..((y + 1) * width * 4) as usize];
        for (x, dst) in row.chunks_exact_mut(4).enumerate() {
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (src_x.floor() as u32).min(src_width - 1);
            let x1 = (x0 + 1).min(src_width - 1);
            let fx = src_x - x0 as f32;

            let (p00, p10, p01, p11) = (sample(x0, y0), sample(x1, y0), sample(x0, y1), sample(x1, y1));
            let mut px = [0f32; 4];
            for (c, out) in px.iter_mut().enumerate() {
                let top = p00[c] * (1.0 - fx) + p10[c] * fx;
                let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
                *out = top * (1.0 - fy) + bottom * fy;
            }

            write_premultiplied(dst, px, opacity);
        }
    }
}

/// Store a straight-alpha BGRA pixel as premultiplied, scaled by `opacity`
fn write_premultiplied(dst: &mut [u8], px: [f32; 4], opacity: f32) {
    let alpha = (px[3] / 255.0) * opacity;
    dst[0] = (px[0] * alpha).round().clamp(0.0, 255.0) as u8;
    dst[1] = (px[1] * alpha).round().clamp(0.0, 255.0) as u8;
    dst[2] = (px[2] * alpha).round().clamp(0.0, 255.0) as u8;
    dst[3] = (alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(width: u32, height: u32, color: [u8; 4]) -> ImageData {
        ImageData::from_rgba(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    fn pixel(canvas: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * width + x) * 4) as usize;
        [canvas[idx], canvas[idx + 1], canvas[idx + 2], canvas[idx + 3]]
    }

    #[test]
    fn test_rows_below_image_are_transparent() {
        // 4x2 image at width 8 is 4 rows tall
        let img = solid(4, 2, [255, 0, 0, 255]);
        let mut canvas = vec![0xAA; 8 * 10 * 4];
        render_fitted(&img, &mut canvas, 8, 10, 1.0);

        assert_eq!(pixel(&canvas, 8, 0, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&canvas, 8, 7, 3), [0, 0, 255, 255]);
        assert_eq!(pixel(&canvas, 8, 0, 4), [0, 0, 0, 0]);
        assert_eq!(pixel(&canvas, 8, 7, 9), [0, 0, 0, 0]);
    }

    #[test]
    fn test_tall_image_is_clipped() {
        let img = solid(2, 20, [0, 255, 0, 255]);
        let mut canvas = vec![0; 4 * 5 * 4];
        render_fitted(&img, &mut canvas, 4, 5, 1.0);

        for y in 0..5 {
            assert_eq!(pixel(&canvas, 4, 3, y), [0, 255, 0, 255]);
        }
    }

    #[test]
    fn test_opacity_premultiplies() {
        let img = solid(2, 2, [200, 100, 0, 255]);
        let mut canvas = vec![0; 2 * 2 * 4];
        render_fitted(&img, &mut canvas, 2, 2, 0.5);

        assert_eq!(pixel(&canvas, 2, 1, 1), [0, 50, 100, 128]);
    }

    #[test]
    fn test_image_alpha_combines_with_opacity() {
        let img = solid(2, 2, [255, 255, 255, 128]);
        let mut canvas = vec![0; 2 * 2 * 4];
        render_fitted(&img, &mut canvas, 2, 2, 0.5);

        let [b, g, r, a] = pixel(&canvas, 2, 0, 0);
        assert_eq!(a, 64);
        assert_eq!((b, g, r), (64, 64, 64));
    }

    #[test]
    fn test_zero_opacity_clears_canvas() {
        let img = solid(2, 2, [255, 255, 255, 255]);
        let mut canvas = vec![0xFF; 2 * 2 * 4];
        render_fitted(&img, &mut canvas, 2, 2, 0.0);

        assert!(canvas.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_downscale_uses_mipmaps() {
        let img = solid(512, 512, [10, 20, 30, 255]);
        let mut canvas = vec![0; 100 * 100 * 4];
        render_fitted(&img, &mut canvas, 100, 100, 1.0);

        assert_eq!(pixel(&canvas, 100, 50, 50), [30, 20, 10, 255]);
    }
}
