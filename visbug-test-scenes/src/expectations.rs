use image::RgbaImage;

/// What one pixel of an undisturbed capture should hold.
#[derive(Debug, Clone, Copy)]
pub struct ExpectedPixel {
    pub x: u32,
    pub y: u32,
    pub rgba: [u8; 4],
    pub slack: u8,
    /// Names the node the pixel belongs to.
    pub node: &'static str,
}

impl ExpectedPixel {
    pub fn rgba(x: u32, y: u32, rgba: [u8; 4], node: &'static str) -> Self {
        Self {
            x,
            y,
            rgba,
            slack: 2,
            node,
        }
    }

    /// `rgb` is `0xRRGGBB`, fully opaque.
    pub fn opaque(x: u32, y: u32, rgb: u32, node: &'static str) -> Self {
        let [_, r, g, b] = rgb.to_be_bytes();
        Self::rgba(x, y, [r, g, b, 255], node)
    }

    /// Background: nothing drawn here.
    pub fn cleared(x: u32, y: u32, node: &'static str) -> Self {
        Self::rgba(x, y, [0; 4], node)
    }

    pub fn with_slack(mut self, slack: u8) -> Self {
        self.slack = slack;
        self
    }

    fn accepts(&self, actual: [u8; 4]) -> bool {
        actual
            .iter()
            .zip(self.rgba)
            .all(|(&got, want)| got.abs_diff(want) <= self.slack)
    }
}

fn pixels(image: &RgbaImage) -> &[[u8; 4]] {
    bytemuck::cast_slice(image.as_raw())
}

/// One line per pixel of `capture` that does not hold what `expected` says.
pub fn pixel_mismatches(capture: &RgbaImage, expected: &[ExpectedPixel]) -> Vec<String> {
    let (width, height) = capture.dimensions();
    let pixels = pixels(capture);

    expected
        .iter()
        .filter_map(|pixel| {
            if pixel.x >= width || pixel.y >= height {
                return Some(format!(
                    "{}: ({}, {}) lies off the {width}x{height} capture",
                    pixel.node, pixel.x, pixel.y
                ));
            }
            let actual = pixels[(pixel.y * width + pixel.x) as usize];
            (!pixel.accepts(actual)).then(|| {
                format!(
                    "{}: ({}, {}) holds {:?}, wanted {:?} within {}",
                    pixel.node, pixel.x, pixel.y, actual, pixel.rgba, pixel.slack
                )
            })
        })
        .collect()
}

/// Pixels that differ between two captures inside `[x0, x1) × [y0, y1)`.
///
/// Captures of different sizes differ everywhere.
pub fn count_differences(a: &RgbaImage, b: &RgbaImage, region: [u32; 4]) -> usize {
    if a.dimensions() != b.dimensions() {
        return usize::MAX;
    }
    let width = a.width();
    let [x0, y0, x1, y1] = region;
    let x1 = x1.min(width);
    let y1 = y1.min(a.height());
    let (left, right) = (pixels(a), pixels(b));

    (y0..y1)
        .flat_map(|y| (x0..x1).map(move |x| (y * width + x) as usize))
        .filter(|&index| left[index] != right[index])
        .count()
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn names_the_node_whose_pixel_is_wrong() {
        let mut capture = RgbaImage::new(4, 4);
        capture.put_pixel(1, 2, Rgba([250, 0, 0, 255]));

        let mismatches = pixel_mismatches(
            &capture,
            &[
                ExpectedPixel::opaque(1, 2, 0xFF0000, "red").with_slack(5),
                ExpectedPixel::cleared(0, 0, "clear"),
                ExpectedPixel::opaque(3, 3, 0x00FF00, "green"),
            ],
        );

        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].starts_with("green:"));
    }

    #[test]
    fn off_capture_pixels_are_mismatches() {
        let capture = RgbaImage::new(2, 2);
        let mismatches = pixel_mismatches(&capture, &[ExpectedPixel::cleared(5, 0, "far")]);
        assert_eq!(mismatches, vec!["far: (5, 0) lies off the 2x2 capture".to_string()]);
    }

    #[test]
    fn counts_differences_inside_region_only() {
        let left = RgbaImage::new(8, 8);
        let mut right = RgbaImage::new(8, 8);
        right.put_pixel(1, 1, Rgba([1, 1, 1, 1]));
        right.put_pixel(6, 6, Rgba([1, 1, 1, 1]));

        assert_eq!(count_differences(&left, &right, [0, 0, 4, 4]), 1);
        assert_eq!(count_differences(&left, &right, [0, 0, 8, 8]), 2);
        assert_eq!(count_differences(&left, &RgbaImage::new(4, 4), [0, 0, 4, 4]), usize::MAX);
    }
}
