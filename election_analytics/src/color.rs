//! Gradient color mapping for choropleth map feeds.

/// An RGB color.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }

    /// `#rrggbb`, the form map feeds expect.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Low endpoint of the scale.
pub const SCALE_RED: Rgb = Rgb::new(0xe5, 0x39, 0x35);
/// Midpoint of the scale.
pub const SCALE_YELLOW: Rgb = Rgb::new(0xfd, 0xd8, 0x35);
/// High endpoint of the scale.
pub const SCALE_GREEN: Rgb = Rgb::new(0x43, 0xa0, 0x47);

/// Three-stop linear gradient (red, yellow, green) over a numeric domain.
///
/// Values at or below the minimum clamp to red, at or above the maximum
/// clamp to green, and the exact midpoint renders the exact yellow stop.
/// Interpolation is channel-wise linear within each half of the domain.
/// The domain is caller-supplied; conventional callers use ±20 percentage
/// points for vote-share variation and ±10 for turnout/abstention.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ColorScale {
    min: f64,
    max: f64,
}

impl ColorScale {
    pub fn new(min: f64, max: f64) -> ColorScale {
        if min <= max {
            ColorScale { min, max }
        } else {
            ColorScale { min: max, max: min }
        }
    }

    /// A symmetric domain around zero, the usual shape for variations.
    pub fn symmetric(half_span: f64) -> ColorScale {
        ColorScale::new(-half_span.abs(), half_span.abs())
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn color_for(&self, value: f64) -> Rgb {
        if value <= self.min {
            return SCALE_RED;
        }
        if value >= self.max {
            return SCALE_GREEN;
        }
        let mid = self.midpoint();
        if value == mid {
            return SCALE_YELLOW;
        }
        if value < mid {
            let t = (value - self.min) / (mid - self.min);
            lerp(SCALE_RED, SCALE_YELLOW, t)
        } else {
            let t = (value - mid) / (self.max - mid);
            lerp(SCALE_YELLOW, SCALE_GREEN, t)
        }
    }
}

fn lerp(from: Rgb, to: Rgb, t: f64) -> Rgb {
    Rgb {
        r: lerp_channel(from.r, to.r, t),
        g: lerp_channel(from.g, to.g, t),
        b: lerp_channel(from.b, to.b, t),
    }
}

fn lerp_channel(from: u8, to: u8, t: f64) -> u8 {
    (from as f64 + (to as f64 - from as f64) * t).round() as u8
}
