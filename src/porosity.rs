/**
 * Porosity Measurement
 *
 * Porosity is the share of "void" pixels in a grayscale image. Solid material
 * (tracks) is painted light, voids (background and foam pores) dark, so a
 * pixel counts as void when it lies below a threshold. The threshold is taken
 * from the image's own statistics, chosen by a `PorosityRule`.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Buffers with a single gray value are classified against this level
const MID_GRAY: u8 = 128;

/// Target or measured porosities, all in percent (0..100)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Porosities {
    /// Overall porosity
    pub total: f64,
    /// Porosity caused by foam pores
    pub by_foam_pores: f64,
    /// Porosity of the track-only rendering (measurements only)
    #[serde(default)]
    pub by_tracks: Option<f64>,
}

impl Porosities {
    /// Desired porosities, as specified by a user
    pub fn new(total: f64, by_foam_pores: f64) -> Self {
        Self {
            total,
            by_foam_pores,
            by_tracks: None,
        }
    }

    /// Measured porosities of one rendering pass
    ///
    /// The foam pore share is whatever the pores added on top of the tracks.
    pub fn measured(by_tracks: f64, total: f64) -> Self {
        Self {
            total,
            by_foam_pores: total - by_tracks,
            by_tracks: Some(by_tracks),
        }
    }
}

impl fmt::Display for Porosities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Porosities:\ttotal: {:.2}\tby_foam_pores: {:.2}",
            self.total, self.by_foam_pores
        )?;
        match self.by_tracks {
            Some(t) => write!(f, "\tby_tracks: {:.2}", t),
            None => write!(f, "\tby_tracks: -"),
        }
    }
}

/// How the void threshold is derived from an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PorosityRule {
    /// Arithmetic mean of all pixels
    #[default]
    #[serde(alias = "calculate_porosity_w_mean")]
    Mean,
    /// Median of all pixels plus one
    #[serde(
        alias = "calculate_porosity_w_median",
        alias = "calculate_porosity_w_median_plus_1"
    )]
    MedianPlusOne,
}

impl PorosityRule {
    /// Name used in config files
    pub fn name(self) -> &'static str {
        match self {
            PorosityRule::Mean => "mean",
            PorosityRule::MedianPlusOne => "median_plus_one",
        }
    }

    /// Threshold for the given pixels, `None` for an empty buffer
    pub fn threshold(self, pixels: &[u8]) -> Option<f64> {
        if pixels.is_empty() {
            return None;
        }
        let histogram = histogram(pixels);
        Some(match self {
            PorosityRule::Mean => mean(&histogram, pixels.len()),
            PorosityRule::MedianPlusOne => median(&histogram, pixels.len()) + 1.0,
        })
    }
}

impl fmt::Display for PorosityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Details of one measurement, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PorosityReport {
    /// Threshold the pixels were compared against
    pub threshold: f64,
    /// Pixels counted as void
    pub below_threshold: usize,
    /// All pixels
    pub total_pixels: usize,
    /// Resulting porosity in percent
    pub porosity: f64,
}

impl fmt::Display for PorosityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Absolute: below threshold {} total: {} | Relative: below threshold {:.2}% (POROSITY)",
            self.below_threshold, self.total_pixels, self.porosity
        )
    }
}

/// Porosity in percent of a flattened grayscale buffer
pub fn measure(pixels: &[u8], rule: PorosityRule) -> f64 {
    measure_with_report(pixels, rule).porosity
}

/**
 * Measure porosity and keep the intermediate numbers
 *
 * A buffer holding one gray value has nothing to separate, every pixel would
 * sit exactly on the threshold. For any such buffer, not only pure black or
 * pure white, the rule's threshold is ignored: the buffer is void when darker
 * than mid gray (128) and solid otherwise. Under the median rule this differs
 * from the plain formula, e.g. a uniform 200 buffer measures 0 and not 100.
 */
pub fn measure_with_report(pixels: &[u8], rule: PorosityRule) -> PorosityReport {
    let total_pixels = pixels.len();
    let threshold = match rule.threshold(pixels) {
        Some(t) => t,
        None => {
            return PorosityReport {
                threshold: 0.0,
                below_threshold: 0,
                total_pixels: 0,
                porosity: 0.0,
            }
        }
    };

    let first = pixels[0];
    let below_threshold = if pixels.iter().all(|&p| p == first) {
        if first < MID_GRAY {
            total_pixels
        } else {
            0
        }
    } else {
        pixels.iter().filter(|&&p| (p as f64) < threshold).count()
    };

    PorosityReport {
        threshold,
        below_threshold,
        total_pixels,
        porosity: 100.0 * below_threshold as f64 / total_pixels as f64,
    }
}

/// Whether `actual` lies within `margin` of `desired` (bounds included)
pub fn porosity_in_margin(desired: f64, actual: f64, margin: f64) -> bool {
    desired - margin <= actual && actual <= desired + margin
}

fn histogram(pixels: &[u8]) -> [usize; 256] {
    let mut bins = [0usize; 256];
    for &p in pixels {
        bins[p as usize] += 1;
    }
    bins
}

fn mean(histogram: &[usize; 256], count: usize) -> f64 {
    let sum: u64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &n)| value as u64 * n as u64)
        .sum();
    sum as f64 / count as f64
}

/// Median, averaging the two middle values for even counts
fn median(histogram: &[usize; 256], count: usize) -> f64 {
    let nth = |k: usize| -> f64 {
        let mut seen = 0;
        for (value, &n) in histogram.iter().enumerate() {
            seen += n;
            if seen > k {
                return value as f64;
            }
        }
        255.0
    };

    if count % 2 == 1 {
        nth(count / 2)
    } else {
        (nth(count / 2 - 1) + nth(count / 2)) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: [PorosityRule; 2] = [PorosityRule::Mean, PorosityRule::MedianPlusOne];

    #[test]
    fn test_all_white_is_solid() {
        let pixels = vec![255u8; 1000];
        for rule in RULES {
            assert_eq!(measure(&pixels, rule), 0.0);
        }
    }

    #[test]
    fn test_all_black_is_void() {
        let pixels = vec![0u8; 1000];
        for rule in RULES {
            assert_eq!(measure(&pixels, rule), 100.0);
        }
    }

    #[test]
    fn test_uniform_gray_ignores_the_rule() {
        for rule in RULES {
            assert_eq!(measure(&vec![200u8; 50], rule), 0.0);
            assert_eq!(measure(&vec![128u8; 50], rule), 0.0);
            assert_eq!(measure(&vec![127u8; 50], rule), 100.0);
            assert_eq!(measure(&vec![77u8; 50], rule), 100.0);
        }
    }

    #[test]
    fn test_two_level_image() {
        // 30 dark, 70 light pixels
        let mut pixels = vec![77u8; 30];
        pixels.extend(std::iter::repeat(211u8).take(70));

        assert!((measure(&pixels, PorosityRule::Mean) - 30.0).abs() < 1e-12);
        // median is 211, threshold 212 -> everything is below
        assert_eq!(measure(&pixels, PorosityRule::MedianPlusOne), 100.0);
    }

    #[test]
    fn test_median_threshold() {
        assert_eq!(PorosityRule::MedianPlusOne.threshold(&[1, 5, 9]), Some(6.0));
        assert_eq!(PorosityRule::MedianPlusOne.threshold(&[1, 3, 9, 10]), Some(7.0));
        assert_eq!(PorosityRule::Mean.threshold(&[0, 10, 20]), Some(10.0));
        assert_eq!(PorosityRule::Mean.threshold(&[]), None);
    }

    #[test]
    fn test_range_for_mixed_buffers() {
        let pixels: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        for rule in RULES {
            let p = measure(&pixels, rule);
            assert!((0.0..=100.0).contains(&p));
        }
    }

    #[test]
    fn test_empty_buffer() {
        let report = measure_with_report(&[], PorosityRule::Mean);
        assert_eq!(report.porosity, 0.0);
        assert_eq!(report.total_pixels, 0);
    }

    #[test]
    fn test_report_counts() {
        let pixels = [10u8, 10, 200, 200, 200];
        let report = measure_with_report(&pixels, PorosityRule::Mean);
        assert_eq!(report.below_threshold, 2);
        assert_eq!(report.total_pixels, 5);
        assert!((report.threshold - 124.0).abs() < 1e-12);
        assert!((report.porosity - 40.0).abs() < 1e-12);
    }

    #[test]
    fn test_margin_boundaries() {
        assert!(porosity_in_margin(30.0, 31.0, 1.0));
        assert!(porosity_in_margin(30.0, 29.0, 1.0));
        assert!(!porosity_in_margin(30.0, 31.01, 1.0));
        assert!(!porosity_in_margin(30.0, 28.99, 1.0));
    }

    #[test]
    fn test_measured_porosities() {
        let p = Porosities::measured(35.0, 42.5);
        assert_eq!(p.by_foam_pores, 7.5);
        assert_eq!(p.by_tracks, Some(35.0));
        assert_eq!(p.by_foam_pores, p.total - p.by_tracks.unwrap());
    }

    #[test]
    fn test_rule_names() {
        assert_eq!(serde_json::to_string(&PorosityRule::Mean).unwrap(), "\"mean\"");
        assert_eq!(
            serde_json::to_string(&PorosityRule::MedianPlusOne).unwrap(),
            "\"median_plus_one\""
        );

        let legacy: PorosityRule = serde_json::from_str("\"calculate_porosity_w_median\"").unwrap();
        assert_eq!(legacy, PorosityRule::MedianPlusOne);
        let legacy: PorosityRule = serde_json::from_str("\"calculate_porosity_w_mean\"").unwrap();
        assert_eq!(legacy, PorosityRule::Mean);

        let err = serde_json::from_str::<PorosityRule>("\"calculate_porosity_w_mode\"").unwrap_err();
        assert!(err.to_string().contains("calculate_porosity_w_mode"));
    }
}
