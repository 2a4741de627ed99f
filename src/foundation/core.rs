use crate::foundation::error::{StitchError, StitchResult};

pub use kurbo::{Point, Vec2};

/// Index of an input stream in job order (0 = first locator).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct StreamId(pub u16);

impl StreamId {
    /// Position in per-stream vectors.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Presentation timestamp in microseconds.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Timestamp zero.
    pub const ZERO: Self = Self(0);

    /// Build from seconds, rounding to the nearest microsecond.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000_000.0).round() as i64)
    }

    /// Convert to seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Absolute distance in microseconds.
    pub fn abs_diff(self, other: Self) -> i64 {
        (self.0 - other.0).abs()
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> StitchResult<Self> {
        if den == 0 {
            return Err(StitchError::configuration("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(StitchError::configuration("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Duration of one frame in microseconds, rounded.
    pub fn frame_duration_us(self) -> i64 {
        ((u64::from(self.den) * 1_000_000 + u64::from(self.num) / 2) / u64::from(self.num)) as i64
    }

    /// Timestamp of frame `index` relative to `start`.
    ///
    /// Computed from the rational directly so long streams do not accumulate rounding drift.
    pub fn frame_timestamp(self, start: Timestamp, index: u64) -> Timestamp {
        let num = u128::from(self.num);
        let offset = (u128::from(index) * u128::from(self.den) * 1_000_000 + num / 2) / num;
        Timestamp(start.0 + offset as i64)
    }

    /// Convert frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create a canvas.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of RGBA8 bytes for one canvas frame.
    pub fn rgba_len(self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }

    /// Equirectangular longitude (radians, `[-pi, pi)`) of canvas x.
    pub fn longitude(self, x: f64) -> f64 {
        x / f64::from(self.width) * std::f64::consts::TAU - std::f64::consts::PI
    }

    /// Equirectangular latitude (radians, `+pi/2` at the top row) of canvas y.
    pub fn latitude(self, y: f64) -> f64 {
        std::f64::consts::FRAC_PI_2 - y / f64::from(self.height) * std::f64::consts::PI
    }

    /// Wrap x into `[0, width)` (longitude seam) and clamp y into `[0, height - 1]`.
    pub fn wrap_clamp(self, p: Point) -> Point {
        let w = f64::from(self.width);
        let x = p.x.rem_euclid(w);
        let y = p.y.clamp(0.0, f64::from(self.height.saturating_sub(1)));
        Point::new(x, y)
    }
}

impl std::fmt::Display for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
