//! Interpolation helpers
//!
//! Pure functions used by the leaf mutators. Progress values are not clamped
//! here; callers are expected to pass `[0, 1]`.

use crate::ease::Ease;

/// Trait for values that can be linearly interpolated
pub trait Interpolate: Clone + 'static {
    /// Interpolate between self and other by factor t (0.0 to 1.0)
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

// ============================================================================
// Float Implementations
// ============================================================================

impl Interpolate for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for f64 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t as f64
    }
}

impl<const N: usize> Interpolate for [f32; N] {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        let mut out = *self;
        for (value, target) in out.iter_mut().zip(other.iter()) {
            *value = value.lerp(target, t);
        }
        out
    }
}

// ============================================================================
// Integer Implementations
// ============================================================================

// Integers interpolate in f64 and round; `as` saturates at the type bounds.
macro_rules! impl_interpolate_int {
    ($($ty:ty),*) => {
        $(
            impl Interpolate for $ty {
                fn lerp(&self, other: &Self, t: f32) -> Self {
                    let a = *self as f64;
                    let b = *other as f64;
                    (a + (b - a) * t as f64).round() as $ty
                }
            }
        )*
    };
}

impl_interpolate_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

// ============================================================================
// Free Functions
// ============================================================================

/// Return a value between `start` and `end` based on eased `progress`
pub fn lerp<T: Interpolate>(start: &T, end: &T, progress: f32, ease: &Ease) -> T {
    start.lerp(end, ease.apply(progress))
}

/// Map `value` from `[in_start, in_end]` onto `[out_start, out_end]`
///
/// An empty input range maps straight to `out_end`.
pub fn range_map<T: Interpolate>(
    value: f32,
    in_start: f32,
    in_end: f32,
    out_start: &T,
    out_end: &T,
    ease: &Ease,
) -> T {
    let span = in_end - in_start;
    let progress = if span == 0.0 {
        1.0
    } else {
        (value - in_start) / span
    };
    lerp(out_start, out_end, progress, ease)
}

pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Square `x` repeatedly, `n` times
pub fn square(mut x: f32, n: u32) -> f32 {
    for _ in 0..n {
        x *= x;
    }
    x
}

pub fn flip(x: f32) -> f32 {
    1.0 - x
}

pub fn mix(a: f32, b: f32, weight: f32, t: f32) -> f32 {
    let mix = (1.0 - weight) * a + weight * b;
    mix * t
}

pub fn crossfade(a: f32, b: f32, t: f32) -> f32 {
    (1.0 - t) * a + t * b
}

pub fn scale(a: f32, t: f32) -> f32 {
    a * t
}

pub fn reverse_scale(a: f32, t: f32) -> f32 {
    a * (1.0 - t)
}

/// Parabola peaking at t = 0.5
pub fn arch(t: f32) -> f32 {
    t * (1.0 - t)
}
