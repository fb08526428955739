use image::{GrayImage, Luma};
use ndarray::ArrayView2;
use tracing::debug;

use crate::contours::find_contours;
use crate::image_impl::Mat;
use crate::types::DetConfig;

/// Upright rectangle around one line of text, in detection-input pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Turns a detection heat-map into text regions.
pub struct RegionPostProcess {
    pub thresh: f32,
    pub min_area: u32,
}

impl RegionPostProcess {
    pub fn new(thresh: f32, min_area: u32) -> Self {
        Self { thresh, min_area }
    }

    pub fn from_cfg(cfg: &DetConfig) -> Self {
        Self::new(cfg.thresh, cfg.min_area)
    }

    /// Regions for a `[H, W]` probability map over an `img_w` x `img_h` image.
    ///
    /// Regions follow the raster order in which their borders are first met.
    /// That is roughly top to bottom but not a reading order; use
    /// [`sort_reading_order`] when layout matters.
    pub fn process(
        &self,
        pred: ArrayView2<'_, f32>,
        img_w: u32,
        img_h: u32,
        margin_ratio: f32,
    ) -> Vec<TextRegion> {
        let (h, w) = pred.dim();
        if h == 0 || w == 0 || img_w == 0 || img_h == 0 {
            return Vec::new();
        }

        let mask = self.binarize(pred);
        let contours = find_contours(&mask);

        let mut regions = Vec::with_capacity(contours.len());
        for contour in &contours {
            let rect = contour.bounding_rect();
            if rect.area() < self.min_area as i32 {
                continue;
            }

            let margin = (rect.height as f32 * margin_ratio).round() as i64;
            let new_x = (rect.x as i64 - margin).max(0);
            let new_y = (rect.y as i64 - margin).max(0);
            let new_w = (rect.width as i64 + 2 * margin).min(img_w as i64 - new_x);
            let new_h = (rect.height as i64 + 2 * margin).min(img_h as i64 - new_y);

            if new_w <= 0 || new_h <= 0 {
                continue;
            }

            regions.push(TextRegion {
                x: new_x as u32,
                y: new_y as u32,
                width: new_w as u32,
                height: new_h as u32,
            });
        }

        debug!(
            contours = contours.len(),
            regions = regions.len(),
            "region postprocess"
        );
        regions
    }

    fn binarize(&self, pred: ArrayView2<'_, f32>) -> GrayImage {
        let (h, w) = pred.dim();
        GrayImage::from_fn(w as u32, h as u32, |x, y| {
            if pred[[y as usize, x as usize]] >= self.thresh {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

impl Default for RegionPostProcess {
    fn default() -> Self {
        Self::from_cfg(&DetConfig::default())
    }
}

/// Cuts every region out of `img`. Regions reaching outside the image are skipped.
pub fn crop_regions(img: &Mat, regions: &[TextRegion]) -> Vec<Mat> {
    if img.empty() {
        return Vec::new();
    }

    regions
        .iter()
        .filter(|r| {
            r.width > 0
                && r.height > 0
                && r.x as u64 + r.width as u64 <= img.cols() as u64
                && r.y as u64 + r.height as u64 <= img.rows() as u64
        })
        .map(|r| img.crop(r.x, r.y, r.width, r.height))
        .collect()
}

/// Top-to-bottom, then left-to-right.
pub fn sort_reading_order(regions: &mut [TextRegion]) {
    regions.sort_by_key(|r| (r.y, r.x));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_impl::PixelBuffer;
    use ndarray::Array2;

    fn heatmap(h: usize, w: usize, blocks: &[(usize, usize, usize, usize)]) -> Array2<f32> {
        let mut map = Array2::<f32>::zeros((h, w));
        for &(x, y, bw, bh) in blocks {
            for yy in y..y + bh {
                for xx in x..x + bw {
                    map[[yy, xx]] = 0.9;
                }
            }
        }
        map
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut map = Array2::<f32>::zeros((20, 20));
        for y in 5..9 {
            for x in 5..11 {
                map[[y, x]] = 0.3;
            }
        }
        let regions = RegionPostProcess::default().process(map.view(), 20, 20, 0.0);
        assert_eq!(
            regions,
            vec![TextRegion { x: 5, y: 5, width: 6, height: 4 }]
        );

        map.mapv_inplace(|v| if v > 0.0 { 0.299 } else { v });
        assert!(RegionPostProcess::default()
            .process(map.view(), 20, 20, 0.0)
            .is_empty());
    }

    #[test]
    fn area_24_kept_area_23_dropped() {
        let map = heatmap(40, 40, &[(2, 2, 23, 1)]);
        assert!(RegionPostProcess::default()
            .process(map.view(), 40, 40, 0.0)
            .is_empty());

        let map = heatmap(40, 40, &[(2, 2, 6, 4)]);
        let regions = RegionPostProcess::default().process(map.view(), 40, 40, 0.0);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].width * regions[0].height, 24);
    }

    #[test]
    fn margin_is_height_times_ratio() {
        let map = heatmap(64, 64, &[(20, 20, 10, 4)]);
        let regions = RegionPostProcess::default().process(map.view(), 64, 64, 1.0);
        assert_eq!(
            regions,
            vec![TextRegion { x: 16, y: 16, width: 18, height: 12 }]
        );

        let regions = RegionPostProcess::default().process(map.view(), 64, 64, 0.5);
        assert_eq!(
            regions,
            vec![TextRegion { x: 18, y: 18, width: 14, height: 8 }]
        );
    }

    #[test]
    fn expanded_box_clamps_to_right_and_bottom_edges() {
        let map = heatmap(32, 64, &[(56, 26, 8, 4)]);
        let regions = RegionPostProcess::default().process(map.view(), 64, 32, 1.0);
        assert_eq!(regions.len(), 1);
        let r = regions[0];
        assert_eq!((r.x, r.y), (52, 22));
        assert_eq!(r.x + r.width, 64);
        assert_eq!(r.y + r.height, 32);
    }

    #[test]
    fn expanded_box_clamps_at_origin() {
        let map = heatmap(32, 32, &[(1, 1, 8, 4)]);
        let regions = RegionPostProcess::default().process(map.view(), 32, 32, 1.0);
        assert_eq!(
            regions,
            vec![TextRegion { x: 0, y: 0, width: 16, height: 12 }]
        );
    }

    #[test]
    fn regions_follow_raster_order() {
        let map = heatmap(64, 64, &[(4, 4, 26, 4), (4, 40, 26, 4)]);
        let regions = RegionPostProcess::default().process(map.view(), 64, 64, 1.0);
        let ys: Vec<u32> = regions.iter().map(|r| r.y).collect();
        assert_eq!(ys, vec![0, 36]);
    }

    #[test]
    fn sort_reading_order_breaks_ties_by_x() {
        let map = heatmap(64, 64, &[(40, 10, 10, 4), (4, 20, 10, 4)]);
        let mut regions = RegionPostProcess::default().process(map.view(), 64, 64, 0.0);
        regions.push(TextRegion { x: 2, y: 10, width: 6, height: 4 });
        sort_reading_order(&mut regions);
        let origins: Vec<(u32, u32)> = regions.iter().map(|r| (r.x, r.y)).collect();
        assert_eq!(origins, vec![(2, 10), (40, 10), (4, 20)]);
    }

    #[test]
    fn empty_map_yields_nothing() {
        let map = Array2::<f32>::zeros((0, 0));
        assert!(RegionPostProcess::default()
            .process(map.view(), 10, 10, 1.0)
            .is_empty());
    }

    #[test]
    fn crops_match_regions() {
        let data = vec![50u8; 32 * 16 * 3];
        let img = Mat::from_pixels(&PixelBuffer::packed(32, 16, 3, &data)).unwrap();
        let regions = [
            TextRegion { x: 0, y: 0, width: 10, height: 5 },
            TextRegion { x: 30, y: 0, width: 10, height: 5 },
        ];
        let crops = crop_regions(&img, &regions);
        assert_eq!(crops.len(), 1);
        assert_eq!((crops[0].cols(), crops[0].rows()), (10, 5));
        assert!(crop_regions(&Mat::default(), &regions).is_empty());
    }
}
