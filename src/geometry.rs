//! Shared geometry types.

use std::ops::{Add, Mul};

/// Full turn in degrees.
pub const FULL_TURN: f64 = 360.;

/// 2D position on the clock face.
#[derive(PartialEq, Copy, Clone, Default, Debug)]
pub struct Position<T = f64> {
    pub x: T,
    pub y: T,
}

impl<T> Position<T> {
    pub const fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

impl<T> From<(T, T)> for Position<T> {
    fn from((x, y): (T, T)) -> Self {
        Self { x, y }
    }
}

impl Position {
    /// Point `distance` away from `self` in the direction of a clock angle.
    ///
    /// Clock angles start at twelve o'clock and grow clockwise, with the Y
    /// axis pointing down like it does in SVG.
    pub fn polar(self, distance: f64, degrees: f64) -> Self {
        let radians = (degrees - 90.).to_radians();
        self + Position::new(radians.cos(), radians.sin()) * distance
    }
}

impl<T: Add<T, Output = T>> Add<Position<T>> for Position<T> {
    type Output = Self;

    fn add(mut self, rhs: Position<T>) -> Self {
        self.x = self.x + rhs.x;
        self.y = self.y + rhs.y;
        self
    }
}

impl Mul<f64> for Position<f64> {
    type Output = Self;

    fn mul(mut self, scale: f64) -> Self {
        self.x *= scale;
        self.y *= scale;
        self
    }
}

/// 2D object size.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub struct Size<T = u32> {
    pub width: T,
    pub height: T,
}

impl<T> Size<T> {
    pub fn new(width: T, height: T) -> Self {
        Self { width, height }
    }
}

impl From<Size> for Size<f32> {
    fn from(size: Size) -> Self {
        Self { width: size.width as f32, height: size.height as f32 }
    }
}

/// Normalize an angle to the `[0, 360)` range.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(FULL_TURN);

    // Tiny negative inputs round up to a full turn.
    if normalized >= FULL_TURN { 0. } else { normalized }
}

/// Forward angular distance from `current` to `target`.
///
/// This is always the clockwise path, so 355° to 5° is 10°, not 350°.
pub fn forward_delta(current: f64, target: f64) -> f64 {
    normalize_degrees(target + FULL_TURN - current)
}
