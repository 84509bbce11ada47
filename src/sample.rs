//! Tiled PNG rendering for periodic sample batches.

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::error::{Error, Result};

/// Grid layout for `count` tiles: `ceil(sqrt)` rows by `floor(sqrt)`
/// columns.
#[must_use]
pub fn grid_shape(count: usize) -> (usize, usize) {
    let root = (count as f64).sqrt();
    (root.ceil() as usize, root.floor() as usize)
}

/// Tiles `count` NHWC images in [0,1] into one grid image, row-major.
/// Cells past the last image stay black.
pub fn render_grid(
    images: &[f32],
    count: usize,
    height: usize,
    width: usize,
    channels: usize,
) -> Result<RgbImage> {
    let (rows, cols) = grid_shape(count);
    if count == 0 || rows * cols < count {
        return Err(Error::Sampling(format!(
            "{count} tiles do not fit a {rows}x{cols} grid"
        )));
    }
    let per_image = height * width * channels;
    if images.len() != count * per_image {
        return Err(Error::Sampling(format!(
            "expected {} values for {count} tiles, got {}",
            count * per_image,
            images.len()
        )));
    }

    let mut grid = RgbImage::new((cols * width) as u32, (rows * height) as u32);
    for idx in 0..count {
        let tile = &images[idx * per_image..(idx + 1) * per_image];
        let (row, col) = (idx / cols, idx % cols);
        for y in 0..height {
            for x in 0..width {
                let base = (y * width + x) * channels;
                let pixel = if channels == 1 {
                    let v = level(tile[base]);
                    Rgb([v, v, v])
                } else {
                    Rgb([level(tile[base]), level(tile[base + 1]), level(tile[base + 2])])
                };
                grid.put_pixel((col * width + x) as u32, (row * height + y) as u32, pixel);
            }
        }
    }
    Ok(grid)
}

/// Renders and writes the grid in one step.
pub fn save_grid(
    path: &Path,
    images: &[f32],
    count: usize,
    height: usize,
    width: usize,
    channels: usize,
) -> Result<()> {
    let grid = render_grid(images, count, height, width, channels)?;
    grid.save(path)?;
    Ok(())
}

fn level(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_grid_shape() {
        assert_eq!(grid_shape(64), (8, 8));
        assert_eq!(grid_shape(10), (4, 3));
        assert_eq!(grid_shape(2), (2, 1));
        assert_eq!(grid_shape(1), (1, 1));
    }

    #[test]
    fn test_render_places_tiles_row_major() {
        // two 1x1 rgb tiles in a 2x1 grid
        let images = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let grid = render_grid(&images, 2, 1, 1, 3).unwrap();
        assert_eq!(grid.dimensions(), (1, 2));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(grid.get_pixel(0, 1), &Rgb([0, 255, 0]));
    }

    #[test]
    fn test_render_rejects_overflowing_count() {
        // three tiles need more than the 2x1 cells the layout yields
        let images = vec![0.5; 9];
        assert!(render_grid(&images, 3, 1, 1, 3).is_err());
    }

    #[test]
    fn test_render_rejects_wrong_length() {
        assert!(render_grid(&[0.0; 5], 2, 1, 1, 3).is_err());
    }

    #[test]
    fn test_values_clamped() {
        let images = vec![1.5, -0.2, 0.5];
        let grid = render_grid(&images, 1, 1, 1, 3).unwrap();
        assert_eq!(grid.get_pixel(0, 0), &Rgb([255, 0, 128]));
    }

    #[test]
    fn test_save_writes_decodable_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train_00_0001.png");
        let images = vec![0.25; 4 * 2 * 2 * 3];
        save_grid(&path, &images, 4, 2, 2, 3).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 2 * 2);
        assert_eq!(decoded.height(), 2 * 2);
    }
}
