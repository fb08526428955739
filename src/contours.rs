// Border extraction on binary masks for the region postprocessor

use image::GrayImage;

#[derive(Debug, Clone, Default)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
}

impl Contour {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest upright rectangle covering every pixel of the contour.
    pub fn bounding_rect(&self) -> BoundingRect {
        let Some(&(x0, y0)) = self.points.first() else {
            return BoundingRect::default();
        };

        let (mut min_x, mut max_x, mut min_y, mut max_y) = (x0, x0, y0, y0);
        for &(x, y) in &self.points[1..] {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }

        // Pixel extents are inclusive
        BoundingRect {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundingRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingRect {
    pub fn area(&self) -> i32 {
        self.width * self.height
    }
}

/// Finds every border in a binary image, outer borders and hole borders alike,
/// in the order they are met by a raster scan. Non-zero pixels are foreground.
///
/// No hierarchy is kept; each border is reduced with [`approx_simple`].
pub fn find_contours(binary_img: &GrayImage) -> Vec<Contour> {
    imageproc::contours::find_contours::<u32>(binary_img)
        .into_iter()
        .map(|c| Contour {
            points: c.points.iter().map(|p| (p.x as i32, p.y as i32)).collect(),
        })
        .map(|c| approx_simple(&c))
        .collect()
}

/// Drops every point that lies on a straight run between its neighbours,
/// keeping only the corner vertices of the chain.
pub fn approx_simple(contour: &Contour) -> Contour {
    if contour.points.len() <= 2 {
        return contour.clone();
    }

    let mut result = Contour::default();
    result.points.push(contour.points[0]);

    for win in contour.points.windows(3) {
        let (prev, curr, next) = (win[0], win[1], win[2]);

        let dx1 = curr.0 - prev.0;
        let dy1 = curr.1 - prev.1;
        let dx2 = next.0 - curr.0;
        let dy2 = next.1 - curr.1;

        // Keep the point only where the chain changes direction
        if dx1 * dy2 != dy1 * dx2 || dx1 * dx2 + dy1 * dy2 < 0 {
            result.points.push(curr);
        }
    }

    if let Some(&last) = contour.points.last() {
        result.points.push(last);
    }

    result
}
