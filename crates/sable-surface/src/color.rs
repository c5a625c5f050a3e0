//! Scene colors and their surface-boundary form.
//!
//! Scene styles hold `Rgba`: CSS-style sRGB with 0–255 channels and 0–1
//! alpha, the representation animation interpolates in and the one CSS color
//! strings parse into. Surfaces consume `PremulRgba`: linear-light,
//! alpha-premultiplied floats, converted through `palette` at the boundary.

use palette::{FromColor, LinSrgba, Srgba};
use serde::{Deserialize, Serialize};

/// An sRGB color with 0–255 RGB channels and 0–1 alpha.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn opaque(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const BLACK: Rgba = Rgba {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    /// Channel array in `[r, g, b, a]` order (RGB 0–255, alpha 0–1).
    pub fn channels(&self) -> [f64; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_channels(c: [f64; 4]) -> Self {
        Self {
            r: c[0],
            g: c[1],
            b: c[2],
            a: c[3],
        }
    }

    /// Parse a CSS color string.
    ///
    /// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)` and
    /// `rgba(r, g, b, a)`. Returns `None` for anything else; callers treat an
    /// unparseable string as a discrete (non-interpolating) value.
    pub fn parse(s: &str) -> Option<Rgba> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        let (body, has_alpha) = if let Some(rest) = s.strip_prefix("rgba(") {
            (rest.strip_suffix(')')?, true)
        } else if let Some(rest) = s.strip_prefix("rgb(") {
            (rest.strip_suffix(')')?, false)
        } else {
            return None;
        };
        let mut parts = body.split(',').map(str::trim);
        let r: f64 = parts.next()?.parse().ok()?;
        let g: f64 = parts.next()?.parse().ok()?;
        let b: f64 = parts.next()?.parse().ok()?;
        let a: f64 = if has_alpha {
            parts.next()?.parse().ok()?
        } else {
            1.0
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Rgba { r, g, b, a })
    }

    fn parse_hex(hex: &str) -> Option<Rgba> {
        let nibble = |c: u8| char::from(c).to_digit(16).map(|d| d as f64);
        match hex.len() {
            3 => {
                let h = hex.as_bytes();
                let r = nibble(h[0])?;
                let g = nibble(h[1])?;
                let b = nibble(h[2])?;
                Some(Rgba::opaque(r * 17.0, g * 17.0, b * 17.0))
            }
            6 | 8 => {
                let byte =
                    |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok().map(f64::from);
                let r = byte(0)?;
                let g = byte(2)?;
                let b = byte(4)?;
                let a = if hex.len() == 8 { byte(6)? / 255.0 } else { 1.0 };
                Some(Rgba { r, g, b, a })
            }
            _ => None,
        }
    }

    /// Serialize as `rgba(r,g,b,a)` with floored RGB channels.
    pub fn to_css(&self) -> String {
        format!(
            "rgba({},{},{},{})",
            self.r.floor(),
            self.g.floor(),
            self.b.floor(),
            self.a
        )
    }

    /// Convert to the linear premultiplied form surfaces consume.
    pub fn to_premul(&self) -> PremulRgba {
        let s = Srgba::new(
            (self.r / 255.0) as f32,
            (self.g / 255.0) as f32,
            (self.b / 255.0) as f32,
            self.a as f32,
        );
        let lin: LinSrgba = LinSrgba::from_color(s);
        PremulRgba {
            r: lin.red * lin.alpha,
            g: lin.green * lin.alpha,
            b: lin.blue * lin.alpha,
            a: lin.alpha,
        }
    }
}

/// Linear-light premultiplied RGBA, the form raster surfaces take.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PremulRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl PremulRgba {
    pub const TRANSPARENT: PremulRgba = PremulRgba {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    /// Convert back to sRGB u8, unpremultiplying first.
    pub fn to_srgba_u8(&self) -> [u8; 4] {
        let (r, g, b) = if self.a > 0.0001 {
            (self.r / self.a, self.g / self.a, self.b / self.a)
        } else {
            (0.0, 0.0, 0.0)
        };
        let srgb: Srgba = Srgba::from_color(LinSrgba::new(r, g, b, self.a));
        [
            (srgb.red * 255.0).round().clamp(0.0, 255.0) as u8,
            (srgb.green * 255.0).round().clamp(0.0, 255.0) as u8,
            (srgb.blue * 255.0).round().clamp(0.0, 255.0) as u8,
            (srgb.alpha * 255.0).round().clamp(0.0, 255.0) as u8,
        ]
    }
}
