//! In-memory RGBA canvases and the colors used to fill them.

use image::{Rgba, RgbaImage};
use serde::Deserialize;

use crate::error::{ConversionError, ConversionResult};
use crate::format::ImageDimensions;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Decoded RGBA8 pixel grid with non-zero width and height.
///
/// Stages never mutate their input; each returns a fresh `RasterImage`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage(pub(crate) RgbaImage);

impl RasterImage {
    /// Wrap a decoded buffer, rejecting zero-sized images.
    pub fn from_rgba(name: &str, pixels: RgbaImage) -> ConversionResult<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(ConversionError::EmptyImage {
                name: name.to_string(),
            });
        }
        Ok(Self(pixels))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> ImageDimensions {
        ImageDimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.0
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.0
    }
}

/// A CSS-style color value.
///
/// Accepts `white`, `black`, `transparent`, `#rgb`, `#rrggbb` and
/// `#rrggbbaa`. Anything else resolves to black, which is what a canvas
/// does with a fill style it cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct Color(pub Rgba<u8>);

impl Color {
    pub fn parse(input: &str) -> Self {
        Self(parse_color(input).unwrap_or(BLACK))
    }
}

impl From<String> for Color {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self(WHITE)
    }
}

fn parse_color(input: &str) -> Option<Rgba<u8>> {
    let trimmed = input.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "white" => return Some(WHITE),
        "black" => return Some(BLACK),
        "transparent" => return Some(TRANSPARENT),
        _ => {}
    }

    let hex = trimmed.strip_prefix('#')?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (slot, ch) in rgb.iter_mut().zip(hex.chars()) {
                let nibble = ch.to_digit(16)? as u8;
                *slot = nibble * 17;
            }
            Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        6 | 8 => {
            let r = channel(hex.get(0..2)?)?;
            let g = channel(hex.get(2..4)?)?;
            let b = channel(hex.get(4..6)?)?;
            let a = if hex.len() == 8 {
                channel(hex.get(6..8)?)?
            } else {
                255
            };
            Some(Rgba([r, g, b, a]))
        }
        _ => None,
    }
}

/// How empty canvas area is initialized before a stage draws into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Background {
    /// Leave the area fully transparent (no fill).
    Transparent,
    Solid(Rgba<u8>),
}

impl Background {
    pub fn parse(input: &str) -> Self {
        if input.trim().eq_ignore_ascii_case("transparent") {
            Background::Transparent
        } else {
            Background::Solid(Color::parse(input).0)
        }
    }

    pub fn white() -> Self {
        Background::Solid(WHITE)
    }

    /// A new canvas of the given size filled with this background.
    pub fn canvas(self, width: u32, height: u32) -> RgbaImage {
        match self {
            Background::Transparent => RgbaImage::new(width, height),
            Background::Solid(color) => RgbaImage::from_pixel(width, height, color),
        }
    }
}

impl From<String> for Background {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl Default for Background {
    fn default() -> Self {
        Background::Transparent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_and_hex_colors() {
        assert_eq!(Color::parse("white").0, WHITE);
        assert_eq!(Color::parse("BLACK").0, BLACK);
        assert_eq!(Color::parse("#ff8000").0, Rgba([255, 128, 0, 255]));
        assert_eq!(Color::parse("#f80").0, Rgba([255, 136, 0, 255]));
        assert_eq!(Color::parse("#11223380").0, Rgba([0x11, 0x22, 0x33, 0x80]));
    }

    #[test]
    fn test_unparseable_color_is_black() {
        assert_eq!(Color::parse("chartreuse-ish").0, BLACK);
        assert_eq!(Color::parse("#12").0, BLACK);
        assert_eq!(Color::parse("#zzzzzz").0, BLACK);
    }

    #[test]
    fn test_background_canvas() {
        let canvas = Background::Transparent.canvas(2, 3);
        assert_eq!(canvas.dimensions(), (2, 3));
        assert!(canvas.pixels().all(|p| *p == TRANSPARENT));

        let canvas = Background::parse("#000000").canvas(4, 1);
        assert!(canvas.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_background_deserializes_from_string() {
        let bg: Background = serde_json::from_str("\"transparent\"").unwrap();
        assert_eq!(bg, Background::Transparent);
        let bg: Background = serde_json::from_str("\"white\"").unwrap();
        assert_eq!(bg, Background::white());
    }

    #[test]
    fn test_zero_sized_image_rejected() {
        let err = RasterImage::from_rgba("empty.png", RgbaImage::new(0, 5)).unwrap_err();
        assert_eq!(err.error_code(), "empty_image");
    }
}
