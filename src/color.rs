//! Color values and color parsing for palette definitions
//!
//! A [`Color`] is a plain RGBA pixel. Two alpha values carry meaning beyond
//! opacity:
//! - `0` marks a transparent pixel, whatever its RGB channels hold
//! - [`PARAMETRIC_ALPHA`] marks a parametric placeholder whose red channel
//!   encodes a [`Subtype`](crate::palette::Subtype) index
//!
//! Definition files may spell colors as hex (`#RGB`, `#RGBA`, `#RRGGBB`,
//! `#RRGGBBAA`) or any CSS color understood by lightningcss.

use image::Rgba;
use lightningcss::traits::Parse;
use lightningcss::values::color::CssColor;
use thiserror::Error;

/// An RGBA pixel value.
pub type Color = Rgba<u8>;

/// Canonical fully transparent color.
pub const TRANSPARENT: Color = Rgba([0, 0, 0, 0]);

/// Reserved alpha value marking a parametric placeholder pixel.
pub const PARAMETRIC_ALPHA: u8 = 1;

/// Returns true if the pixel is transparent (alpha of zero).
pub fn is_transparent(color: Color) -> bool {
    color[3] == 0
}

/// Returns true if the pixel is a parametric placeholder.
pub fn is_parametric(color: Color) -> bool {
    color[3] == PARAMETRIC_ALPHA
}

/// Returns true for partially transparent literal colors.
pub fn is_translucent(color: Color) -> bool {
    color[3] != 0 && color[3] != 255 && !is_parametric(color)
}

/// Build the canonical placeholder for an encoded subtype index.
pub fn parametric(index: u8) -> Color {
    Rgba([index, 0, 0, PARAMETRIC_ALPHA])
}

/// Rewrite a parametric pixel into its canonical placeholder form.
///
/// Only the red channel carries the subtype index; stray green and blue
/// values left by paint tools are dropped so equal placeholders compare equal.
pub fn canonical_parametric(color: Color) -> Color {
    parametric(color[0])
}

/// Format a color as `#RRGGBBAA`.
pub fn to_hex(color: Color) -> String {
    format!("#{:02X}{:02X}{:02X}{:02X}", color[0], color[1], color[2], color[3])
}

/// Error type for color parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    /// Input string was empty
    #[error("empty color string")]
    Empty,
    /// Invalid length (must be 3, 4, 6, or 8 hex chars after #)
    #[error("invalid color length {0}, expected 3, 4, 6, or 8")]
    InvalidLength(usize),
    /// Contains non-hex characters
    #[error("invalid hex character '{0}'")]
    InvalidHex(char),
    /// CSS parsing error from lightningcss
    #[error("CSS parse error: {0}")]
    CssParse(String),
    /// `param:` placeholder naming no known subtype
    #[error("unknown placeholder subtype '{0}'")]
    UnknownSubtype(String),
}

/// Parse a color string into an RGBA color.
///
/// # Examples
///
/// ```
/// use palbake::color::parse_color;
///
/// let red = parse_color("#F00").unwrap();
/// assert_eq!(red, image::Rgba([255, 0, 0, 255]));
///
/// let blue = parse_color("blue").unwrap();
/// assert_eq!(blue, image::Rgba([0, 0, 255, 255]));
/// ```
///
/// # Errors
///
/// Returns `ColorError` if the input is invalid or unparseable.
pub fn parse_color(s: &str) -> Result<Color, ColorError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ColorError::Empty);
    }

    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex_color(hex);
    }

    parse_css_color(s)
}

/// Parse the digits of a hex color (without the leading '#')
fn parse_hex_color(hex: &str) -> Result<Color, ColorError> {
    if let Some(c) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ColorError::InvalidHex(c));
    }

    let digits: Vec<u8> = hex.bytes().map(hex_value).collect();
    match digits.len() {
        3 => Ok(Rgba([digits[0] * 17, digits[1] * 17, digits[2] * 17, 255])),
        4 => Ok(Rgba([digits[0] * 17, digits[1] * 17, digits[2] * 17, digits[3] * 17])),
        6 => Ok(Rgba([
            digits[0] * 16 + digits[1],
            digits[2] * 16 + digits[3],
            digits[4] * 16 + digits[5],
            255,
        ])),
        8 => Ok(Rgba([
            digits[0] * 16 + digits[1],
            digits[2] * 16 + digits[3],
            digits[4] * 16 + digits[5],
            digits[6] * 16 + digits[7],
        ])),
        len => Err(ColorError::InvalidLength(len)),
    }
}

/// Value of an ASCII hex digit; callers check `is_ascii_hexdigit` first
fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

/// Parse a CSS color using lightningcss (rgb, hsl, hwb, named colors)
fn parse_css_color(s: &str) -> Result<Color, ColorError> {
    use lightningcss::values::color::FloatColor;

    let css_color = CssColor::parse_string(s).map_err(|e| ColorError::CssParse(e.to_string()))?;
    let rgb_color = css_color
        .to_rgb()
        .map_err(|_| ColorError::CssParse("cannot convert color to RGB".to_string()))?;

    match rgb_color {
        CssColor::RGBA(rgba) => Ok(Rgba([rgba.red, rgba.green, rgba.blue, rgba.alpha])),
        CssColor::Float(float_color) => match float_color.as_ref() {
            FloatColor::RGB(rgb) => Ok(Rgba([
                (rgb.r * 255.0).round() as u8,
                (rgb.g * 255.0).round() as u8,
                (rgb.b * 255.0).round() as u8,
                (rgb.alpha * 255.0).round() as u8,
            ])),
            _ => Err(ColorError::CssParse("unexpected float color format".to_string())),
        },
        _ => Err(ColorError::CssParse("color conversion did not produce RGB".to_string())),
    }
}
