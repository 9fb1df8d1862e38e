//! Scalar and vector primitives shared by the whole world.
//!
//! Precision is a compile-time choice: the `f64` feature switches every
//! scalar in the engine to double precision. Mixing precisions is not
//! supported.

#[cfg(feature = "f64")]
pub type Scalar = f64;
#[cfg(feature = "f64")]
pub type Vector2 = glam::DVec2;

#[cfg(not(feature = "f64"))]
pub type Scalar = f32;
#[cfg(not(feature = "f64"))]
pub type Vector2 = glam::Vec2;

/// Length tolerance below which directions are considered degenerate.
pub const EPSILON: Scalar = 1e-8;

/// Scalar-cross-vector: `w × v = (-w·v.y, w·v.x)`.
///
/// This is the 2D analogue of crossing an out-of-plane angular velocity with
/// a lever arm; it shows up everywhere the solver turns angular motion into
/// linear motion at a contact point.
#[inline]
pub fn cross_sv(w: Scalar, v: Vector2) -> Vector2 {
    Vector2::new(-w * v.y, w * v.x)
}

/// Axis-aligned bounding rectangle with `min <= max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector2,
    pub max: Vector2,
}

impl Aabb {
    pub fn new(min: Vector2, max: Vector2) -> Self {
        debug_assert!(min.x <= max.x && min.y <= max.y);
        Self { min, max }
    }

    /// Smallest rectangle containing both operands.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.max.x >= other.min.x
            && self.min.x <= other.max.x
            && self.max.y >= other.min.y
            && self.min.y <= other.max.y
    }

    pub fn contains_point(&self, p: Vector2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn center(&self) -> Vector2 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vector2 {
        self.max - self.min
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}
