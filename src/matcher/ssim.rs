//! Structural similarity (SSIM) between two glyph rasters.
//!
//! Mean local SSIM over 7×7 uniform windows with K1=0.01, K2=0.03 and a
//! dynamic range of 255, the parameters the decoding pipeline's thresholds
//! were tuned against. Scores are reported as a distance `(1 - ssim) * 10`
//! so that 0 means a pixel-perfect match and the acceptance threshold reads
//! as an upper bound.

use crate::raster::Raster;

const WINDOW: usize = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DYNAMIC_RANGE: f64 = 255.0;

/// Summed-area table for O(1) window sums.
struct IntegralImage {
    stride: usize,
    table: Vec<f64>,
}

impl IntegralImage {
    fn new<F: Fn(usize, usize) -> f64>(n: usize, value: F) -> Self {
        let stride = n + 1;
        let mut table = vec![0.0; stride * stride];
        for y in 0..n {
            let mut row_sum = 0.0;
            for x in 0..n {
                row_sum += value(x, y);
                table[(y + 1) * stride + (x + 1)] = table[y * stride + (x + 1)] + row_sum;
            }
        }
        Self { stride, table }
    }

    /// Sum over the window with top-left (x, y), `WINDOW` wide and tall.
    fn window_sum(&self, x: usize, y: usize) -> f64 {
        let x1 = x + WINDOW;
        let y1 = y + WINDOW;
        self.table[y1 * self.stride + x1] + self.table[y * self.stride + x]
            - self.table[y * self.stride + x1]
            - self.table[y1 * self.stride + x]
    }
}

/// Mean local SSIM between two equally sized rasters.
///
/// Returns `None` when the rasters differ in size or are smaller than the
/// comparison window; the matcher skips such candidates instead of failing
/// the shape.
pub fn ssim(a: &Raster, b: &Raster) -> Option<f32> {
    if a.size() != b.size() {
        return None;
    }
    let n = a.size() as usize;
    if n < WINDOW {
        return None;
    }

    let ad = a.data();
    let bd = b.data();
    let px = |data: &[u8], x: usize, y: usize| data[y * n + x] as f64;

    let ia = IntegralImage::new(n, |x, y| px(ad, x, y));
    let ib = IntegralImage::new(n, |x, y| px(bd, x, y));
    let iaa = IntegralImage::new(n, |x, y| px(ad, x, y) * px(ad, x, y));
    let ibb = IntegralImage::new(n, |x, y| px(bd, x, y) * px(bd, x, y));
    let iab = IntegralImage::new(n, |x, y| px(ad, x, y) * px(bd, x, y));

    let c1 = (K1 * DYNAMIC_RANGE).powi(2);
    let c2 = (K2 * DYNAMIC_RANGE).powi(2);
    let area = (WINDOW * WINDOW) as f64;
    // Unbiased sample normalization for variance and covariance.
    let cov_norm = area / (area - 1.0);

    let mut total = 0.0;
    let mut windows = 0usize;
    for y in 0..=(n - WINDOW) {
        for x in 0..=(n - WINDOW) {
            let mu_a = ia.window_sum(x, y) / area;
            let mu_b = ib.window_sum(x, y) / area;
            let var_a = cov_norm * (iaa.window_sum(x, y) / area - mu_a * mu_a);
            let var_b = cov_norm * (ibb.window_sum(x, y) / area - mu_b * mu_b);
            let cov = cov_norm * (iab.window_sum(x, y) / area - mu_a * mu_b);

            let numerator = (2.0 * mu_a * mu_b + c1) * (2.0 * cov + c2);
            let denominator = (mu_a * mu_a + mu_b * mu_b + c1) * (var_a + var_b + c2);
            total += numerator / denominator;
            windows += 1;
        }
    }

    Some((total / windows as f64) as f32)
}

/// SSIM expressed as a distance: 0 is identical, larger is worse.
pub fn ssim_distance(a: &Raster, b: &Raster) -> Option<f32> {
    ssim(a, b).map(|s| (1.0 - s) * 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_raster(size: u32, offset: u8) -> Raster {
        let data = (0..size * size)
            .map(|i| {
                let x = (i % size) as u32;
                ((x * 255 / size) as u8).wrapping_add(offset)
            })
            .collect();
        Raster::from_raw(size, data).unwrap()
    }

    fn flat_raster(size: u32, value: u8) -> Raster {
        Raster::from_raw(size, vec![value; (size * size) as usize]).unwrap()
    }

    #[test]
    fn test_identical_rasters_score_one() {
        let a = gradient_raster(32, 0);
        let s = ssim(&a, &a).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
        assert!(ssim_distance(&a, &a).unwrap().abs() < 1e-5);
    }

    #[test]
    fn test_flat_identical_rasters_score_one() {
        let a = flat_raster(16, 200);
        let b = flat_raster(16, 200);
        assert!((ssim(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_inverted_raster_scores_low() {
        let a = flat_raster(32, 0);
        let b = flat_raster(32, 255);
        let s = ssim(&a, &b).unwrap();
        assert!(s < 0.1, "inverted similarity was {}", s);
    }

    #[test]
    fn test_small_perturbation_beats_large() {
        let a = gradient_raster(32, 0);
        let slightly_off = gradient_raster(32, 8);
        let very_off = gradient_raster(32, 120);
        let d_small = ssim_distance(&a, &slightly_off).unwrap();
        let d_large = ssim_distance(&a, &very_off).unwrap();
        assert!(d_small < d_large);
    }

    #[test]
    fn test_size_mismatch_is_none() {
        let a = flat_raster(16, 0);
        let b = flat_raster(32, 0);
        assert!(ssim(&a, &b).is_none());
    }

    #[test]
    fn test_tiny_raster_is_none() {
        let a = flat_raster(4, 0);
        assert!(ssim(&a, &a).is_none());
    }
}
