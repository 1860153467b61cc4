//! Global and local binarization.
//!
//! Masks produced here use `1` for ink (dark) and `0` for paper.

use crate::GrayImageView;

/// 256-bin intensity histogram.
pub fn histogram(samples: impl IntoIterator<Item = u8>) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for v in samples {
        hist[v as usize] += 1;
    }
    hist
}

/// Otsu threshold of a histogram. Pixels `<= t` belong to the dark class.
pub fn otsu_from_histogram(hist: &[u32; 256]) -> u8 {
    let total: u64 = hist.iter().map(|&h| h as u64).sum();
    if total == 0 {
        return 127;
    }

    let min_v = hist.iter().position(|&h| h > 0).unwrap_or(0);
    let max_v = hist.iter().rposition(|&h| h > 0).unwrap_or(255);
    if min_v == max_v {
        return min_v as u8;
    }
    let nonzero_bins = hist.iter().filter(|&&h| h > 0).count();
    if nonzero_bins <= 2 {
        return ((min_v + max_v) / 2) as u8;
    }

    let total = total as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += (t as f64) * (h as f64);
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

/// Otsu threshold from a set of sample intensities.
pub fn otsu_threshold(samples: &[u8]) -> u8 {
    otsu_from_histogram(&histogram(samples.iter().copied()))
}

/// Binarize with a single global threshold: `1` where `v <= t`.
pub fn threshold_mask(img: &GrayImageView<'_>, t: u8) -> Vec<u8> {
    img.data.iter().map(|&v| u8::from(v <= t)).collect()
}

/// Summed-area table with one row/column of zero padding.
pub struct IntegralImage {
    width: usize,
    height: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    pub fn new(img: &GrayImageView<'_>) -> Self {
        let w1 = img.width + 1;
        let mut sums = vec![0u64; w1 * (img.height + 1)];
        for y in 0..img.height {
            let mut row = 0u64;
            for x in 0..img.width {
                row += img.get(x, y) as u64;
                sums[(y + 1) * w1 + x + 1] = sums[y * w1 + x + 1] + row;
            }
        }
        Self {
            width: img.width,
            height: img.height,
            sums,
        }
    }

    /// Sum over the inclusive rectangle `[x0, x1] x [y0, y1]`, clipped to the image.
    pub fn rect_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> (u64, usize) {
        let x1 = x1.min(self.width - 1);
        let y1 = y1.min(self.height - 1);
        if x0 > x1 || y0 > y1 {
            return (0, 0);
        }
        let w1 = self.width + 1;
        let a = self.sums[y0 * w1 + x0];
        let b = self.sums[y0 * w1 + x1 + 1];
        let c = self.sums[(y1 + 1) * w1 + x0];
        let d = self.sums[(y1 + 1) * w1 + x1 + 1];
        (d + a - b - c, (x1 - x0 + 1) * (y1 - y0 + 1))
    }
}

/// Local mean threshold: a pixel is ink when it is darker than the mean of
/// its `(2 * radius + 1)^2` neighbourhood by more than `offset`.
pub fn adaptive_threshold_mean(img: &GrayImageView<'_>, radius: usize, offset: f32) -> Vec<u8> {
    let integral = IntegralImage::new(img);
    let mut mask = vec![0u8; img.width * img.height];
    for y in 0..img.height {
        let y0 = y.saturating_sub(radius);
        let y1 = y + radius;
        for x in 0..img.width {
            let x0 = x.saturating_sub(radius);
            let (sum, count) = integral.rect_sum(x0, y0, x + radius, y1);
            let mean = sum as f32 / count.max(1) as f32;
            if (img.get(x, y) as f32) < mean - offset {
                mask[y * img.width + x] = 1;
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GrayImage;

    #[test]
    fn otsu_separates_ink_from_paper() {
        let mut samples = vec![240u8; 80];
        samples.extend(std::iter::repeat_n(40u8, 20));
        samples.extend([235, 245, 38, 45]);
        let t = otsu_threshold(&samples);
        assert!(t >= 45 && t < 235, "threshold {t}");
    }

    #[test]
    fn otsu_handles_flat_and_empty_input() {
        assert_eq!(otsu_threshold(&[]), 127);
        assert_eq!(otsu_threshold(&[200; 10]), 200);
        assert_eq!(otsu_threshold(&[0, 0, 200, 200]), 100);
    }

    #[test]
    fn integral_image_rect_sums() {
        let img = GrayImage::from_raw(3, 2, vec![1, 2, 3, 4, 5, 6]).expect("image");
        let ii = IntegralImage::new(&img.view());
        assert_eq!(ii.rect_sum(0, 0, 2, 1), (21, 6));
        assert_eq!(ii.rect_sum(1, 1, 5, 5), (11, 2));
    }

    #[test]
    fn adaptive_threshold_ignores_illumination_gradient() {
        // Bright-to-dim ramp with one dark dot in the dim half.
        let w = 40;
        let h = 10;
        let mut data: Vec<u8> = (0..w * h)
            .map(|i| (230 - (i % w) as i32 * 2).clamp(0, 255) as u8)
            .collect();
        data[5 * w + 30] = 20;
        let img = GrayImage::from_raw(w, h, data).expect("image");
        let mask = adaptive_threshold_mean(&img.view(), 4, 15.0);
        assert_eq!(mask[5 * w + 30], 1);
        assert_eq!(mask.iter().map(|&m| m as usize).sum::<usize>(), 1);
    }
}
