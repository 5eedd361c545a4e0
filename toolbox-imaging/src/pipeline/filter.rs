//! Color filter stage: brightness, contrast, sepia, saturation and hue.

use rayon::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::raster::RasterImage;

use super::default_enabled;

/// Minimum pixel count before parallelizing the per-pixel loop.
const PARALLEL_PIXEL_THRESHOLD: usize = 262_144; // 512x512

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub enabled: bool,
    /// -100..100
    pub brightness: f32,
    /// -100..100
    pub contrast: f32,
    /// -100..100
    pub saturation: f32,
    /// Degrees, 0..360
    pub hue: f32,
    pub sepia: bool,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            hue: 0.0,
            sepia: false,
        }
    }
}

/// Per-pixel adjustments derived from a `FilterSpec`, with `None` for
/// steps left at their default value.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Adjustments {
    brightness_offset: Option<f64>,
    contrast_factor: Option<f64>,
    sepia: bool,
    /// (hue shift as a fraction of a full turn, saturation multiplier)
    hsl: Option<(f64, f64)>,
}

impl Adjustments {
    fn from_spec(spec: &FilterSpec) -> Self {
        let sanitize = |v: f32, lo: f32, hi: f32| {
            if v.is_finite() {
                f64::from(v.clamp(lo, hi))
            } else {
                0.0
            }
        };
        let brightness = sanitize(spec.brightness, -100.0, 100.0);
        let contrast = sanitize(spec.contrast, -100.0, 100.0);
        let saturation = sanitize(spec.saturation, -100.0, 100.0);
        let hue = sanitize(spec.hue, 0.0, 360.0);

        Self {
            brightness_offset: (brightness != 0.0).then_some(brightness * 2.55),
            contrast_factor: (contrast != 0.0).then_some((contrast + 100.0) / 100.0),
            sepia: spec.sepia,
            hsl: (saturation != 0.0 || hue != 0.0)
                .then_some((hue / 360.0, (saturation + 100.0) / 100.0)),
        }
    }

    fn is_identity(&self) -> bool {
        self.brightness_offset.is_none()
            && self.contrast_factor.is_none()
            && !self.sepia
            && self.hsl.is_none()
    }

    fn apply(&self, rgb: [f64; 3]) -> [f64; 3] {
        let [mut r, mut g, mut b] = rgb;

        if let Some(offset) = self.brightness_offset {
            r = clamp_channel(r + offset);
            g = clamp_channel(g + offset);
            b = clamp_channel(b + offset);
        }

        if let Some(factor) = self.contrast_factor {
            r = clamp_channel((r - 128.0) * factor + 128.0);
            g = clamp_channel((g - 128.0) * factor + 128.0);
            b = clamp_channel((b - 128.0) * factor + 128.0);
        }

        if self.sepia {
            let (sr, sg, sb) = (r, g, b);
            r = clamp_channel(0.393 * sr + 0.769 * sg + 0.189 * sb);
            g = clamp_channel(0.349 * sr + 0.686 * sg + 0.168 * sb);
            b = clamp_channel(0.272 * sr + 0.534 * sg + 0.131 * sb);
        }

        if let Some((hue_shift, saturation_factor)) = self.hsl {
            let (h, s, l) = rgb_to_hsl(r / 255.0, g / 255.0, b / 255.0);
            let h = (h + hue_shift).rem_euclid(1.0);
            let s = (s * saturation_factor).clamp(0.0, 1.0);
            let (nr, ng, nb) = hsl_to_rgb(h, s, l);
            r = clamp_channel(nr * 255.0);
            g = clamp_channel(ng * 255.0);
            b = clamp_channel(nb * 255.0);
        }

        [r, g, b]
    }

    fn apply_to_pixel(&self, pixel: &mut [u8]) {
        let [r, g, b] = self.apply([
            f64::from(pixel[0]),
            f64::from(pixel[1]),
            f64::from(pixel[2]),
        ]);
        pixel[0] = store_channel(r);
        pixel[1] = store_channel(g);
        pixel[2] = store_channel(b);
    }
}

fn clamp_channel(value: f64) -> f64 {
    value.clamp(0.0, 255.0)
}

/// Round half to even, as a clamped byte array stores floats.
fn store_channel(value: f64) -> u8 {
    clamp_channel(value).round_ties_even() as u8
}

/// Convert normalized RGB (0..1) to HSL, each component in 0..1.
pub fn rgb_to_hsl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    (h / 6.0, s, l)
}

/// Convert HSL (each 0..1) back to normalized RGB.
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l + s - l * s
    };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f64, q: f64, t: f64) -> f64 {
    let t = if t < 0.0 {
        t + 1.0
    } else if t > 1.0 {
        t - 1.0
    } else {
        t
    };

    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Apply the filter chain to every pixel's RGB channels; alpha is untouched.
///
/// Disabled specs and specs with every value at its default return an
/// identical copy.
pub fn apply_filters(source: &RasterImage, spec: &FilterSpec) -> RasterImage {
    let adjustments = Adjustments::from_spec(spec);
    if !spec.enabled || adjustments.is_identity() {
        return source.clone();
    }

    let mut pixels = source.pixels().clone();
    let total_pixels = (pixels.width() as usize) * (pixels.height() as usize);
    let buffer: &mut [u8] = &mut pixels;

    if total_pixels >= PARALLEL_PIXEL_THRESHOLD {
        buffer
            .par_chunks_exact_mut(4)
            .for_each(|pixel| adjustments.apply_to_pixel(pixel));
    } else {
        buffer
            .chunks_exact_mut(4)
            .for_each(|pixel| adjustments.apply_to_pixel(pixel));
    }

    debug!(
        pixels = total_pixels,
        brightness = spec.brightness,
        contrast = spec.contrast,
        saturation = spec.saturation,
        hue = spec.hue,
        sepia = spec.sepia,
        "Applied color filters"
    );

    RasterImage(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn spec() -> FilterSpec {
        FilterSpec::default()
    }

    fn gradient(width: u32, height: u32) -> RasterImage {
        RasterImage(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                (x * 37 % 256) as u8,
                (y * 53 % 256) as u8,
                ((x + y) * 19 % 256) as u8,
                (x * 11 % 256) as u8,
            ])
        }))
    }

    fn single(pixel: [u8; 4], spec: &FilterSpec) -> [u8; 4] {
        let image = RasterImage(RgbaImage::from_pixel(1, 1, Rgba(pixel)));
        apply_filters(&image, spec).pixels().get_pixel(0, 0).0
    }

    #[test]
    fn test_disabled_is_identity() {
        let image = gradient(16, 16);
        let filters = FilterSpec {
            enabled: false,
            brightness: 50.0,
            sepia: true,
            ..spec()
        };
        assert_eq!(apply_filters(&image, &filters), image);
    }

    #[test]
    fn test_default_values_are_identity() {
        let image = gradient(16, 16);
        assert_eq!(apply_filters(&image, &spec()), image);
    }

    #[test]
    fn test_brightness_offsets_channels() {
        let filters = FilterSpec {
            brightness: 20.0,
            ..spec()
        };
        // 20 * 2.55 = 51
        assert_eq!(single([10, 100, 250, 77], &filters), [61, 151, 255, 77]);
    }

    #[test]
    fn test_brightness_is_monotonic() {
        let image = gradient(32, 32);
        let brighter = apply_filters(
            &image,
            &FilterSpec {
                brightness: 100.0,
                ..spec()
            },
        );
        for (before, after) in image.pixels().pixels().zip(brighter.pixels().pixels()) {
            for c in 0..3 {
                assert!(after[c] >= before[c]);
            }
            assert_eq!(after[3], before[3]);
        }
    }

    #[test]
    fn test_contrast_formula() {
        let filters = FilterSpec {
            contrast: 50.0,
            ..spec()
        };
        // (100 - 128) * 1.5 + 128 = 86, (200 - 128) * 1.5 + 128 = 236
        assert_eq!(single([100, 200, 128, 255], &filters), [86, 236, 128, 255]);

        let flat = FilterSpec {
            contrast: -100.0,
            ..spec()
        };
        assert_eq!(single([0, 90, 255, 255], &flat), [128, 128, 128, 255]);
    }

    #[test]
    fn test_sepia_matrix() {
        let filters = FilterSpec {
            sepia: true,
            ..spec()
        };
        // R' = .393*100 + .769*50 + .189*20 = 81.53
        // G' = .349*100 + .686*50 + .168*20 = 72.56
        // B' = .272*100 + .534*50 + .131*20 = 56.52
        assert_eq!(single([100, 50, 20, 200], &filters), [82, 73, 57, 200]);
        // White saturates red and green
        assert_eq!(single([255, 255, 255, 255], &filters), [255, 255, 239, 255]);
    }

    #[test]
    fn test_full_desaturation_is_grayscale() {
        let image = gradient(40, 40);
        let gray = apply_filters(
            &image,
            &FilterSpec {
                saturation: -100.0,
                ..spec()
            },
        );
        for pixel in gray.pixels().pixels() {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn test_hue_rotation_cycles_primaries() {
        let filters = FilterSpec {
            hue: 120.0,
            ..spec()
        };
        assert_eq!(single([255, 0, 0, 255], &filters), [0, 255, 0, 255]);
        assert_eq!(single([0, 255, 0, 255], &filters), [0, 0, 255, 255]);

        let full_turn = FilterSpec {
            hue: 360.0,
            ..spec()
        };
        assert_eq!(single([200, 30, 90, 255], &full_turn), [200, 30, 90, 255]);
    }

    #[test]
    fn test_hsl_round_trip() {
        for rgb in [(0.2, 0.4, 0.6), (1.0, 0.0, 0.0), (0.5, 0.5, 0.5), (0.9, 0.8, 0.1)] {
            let (h, s, l) = rgb_to_hsl(rgb.0, rgb.1, rgb.2);
            let (r, g, b) = hsl_to_rgb(h, s, l);
            assert!((r - rgb.0).abs() < 1e-9);
            assert!((g - rgb.1).abs() < 1e-9);
            assert!((b - rgb.2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let wild = FilterSpec {
            brightness: 900.0,
            ..spec()
        };
        let capped = FilterSpec {
            brightness: 100.0,
            ..spec()
        };
        let pixel = [10, 20, 30, 255];
        assert_eq!(single(pixel, &wild), single(pixel, &capped));
    }

    #[test]
    fn test_large_image_matches_sequential_path() {
        // 600x600 crosses the parallel threshold
        let image = gradient(600, 600);
        let filters = FilterSpec {
            brightness: -15.0,
            contrast: 30.0,
            saturation: 40.0,
            hue: 45.0,
            sepia: false,
            enabled: true,
        };
        let parallel = apply_filters(&image, &filters);
        let adjustments = Adjustments::from_spec(&filters);
        for (x, y) in [(0, 0), (599, 599), (123, 456), (300, 17)] {
            let mut expected = image.pixels().get_pixel(x, y).0;
            adjustments.apply_to_pixel(&mut expected);
            assert_eq!(parallel.pixels().get_pixel(x, y).0, expected);
        }
    }

    #[test]
    fn test_spec_fields_default_when_missing() {
        let parsed: FilterSpec = serde_json::from_str(r#"{"sepia": true}"#).unwrap();
        assert!(parsed.enabled);
        assert!(parsed.sepia);
        assert_eq!(parsed.brightness, 0.0);
    }
}
