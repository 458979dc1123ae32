//! Gravity-inclusive acceleration samples and the tilt angles derived from them.
//!
//! Axis convention follows handheld motion sensors: with the device lying flat
//! and face-up, gravity reads as `(0, 0, +g)`.  Tipping the top edge forward
//! (away from the user) drives `x` negative, which the pitch formula maps to a
//! positive angle.

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════
// GravityVector
// ════════════════════════════════════════════════════════════════════════════

/// One accelerometer reading including gravity, in m/s² (or g; the
/// classifier only cares about ratios and differences).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GravityVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GravityVector {
    pub const ZERO: GravityVector = GravityVector { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        GravityVector { x, y, z }
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// L1 distance `|Δx| + |Δy| + |Δz|`.
    pub fn l1_distance(&self, other: &GravityVector) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
    }

    /// Unit vector in the same direction.
    ///
    /// A zero-magnitude vector is divided by 1 instead, so the result is the
    /// zero vector rather than NaN.
    pub fn normalized(&self) -> GravityVector {
        let mag = self.magnitude();
        let div = if mag == 0.0 { 1.0 } else { mag };
        GravityVector {
            x: self.x / div,
            y: self.y / div,
            z: self.z / div,
        }
    }

    /// Forward/backward tilt in degrees, independent of roll.
    ///
    /// `0°` when flat, `+90°` when tipped fully forward.
    pub fn pitch_degrees(&self) -> f64 {
        let n = self.normalized();
        (-n.x).atan2((n.y * n.y + n.z * n.z).sqrt()).to_degrees()
    }

    /// Side-to-side tilt in degrees.  Display only; classification ignores it.
    pub fn roll_degrees(&self) -> f64 {
        let n = self.normalized();
        n.y.atan2(n.z).to_degrees()
    }

    /// Gravity vector a device would report when held at `pitch_deg` forward
    /// tilt and `roll_deg` side tilt, scaled to `g`.
    pub fn from_tilt(pitch_deg: f64, roll_deg: f64, g: f64) -> Self {
        let p = pitch_deg.to_radians();
        let r = roll_deg.to_radians();
        GravityVector {
            x: -p.sin() * g,
            y:  p.cos() * r.sin() * g,
            z:  p.cos() * r.cos() * g,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn flat_face_up_is_zero_pitch() {
        assert_abs_diff_eq!(GravityVector::new(0.0, 0.0, 1.0).pitch_degrees(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn tipped_forward_is_plus_ninety() {
        assert_abs_diff_eq!(GravityVector::new(-1.0, 0.0, 0.0).pitch_degrees(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn tipped_backward_is_negative() {
        assert!(GravityVector::new(1.0, 0.0, 0.2).pitch_degrees() < -60.0);
    }

    #[test]
    fn zero_vector_never_produces_nan() {
        let z = GravityVector::ZERO;
        let n = z.normalized();
        assert_eq!(n, GravityVector::ZERO);
        assert!(z.pitch_degrees().is_finite());
        assert!(z.roll_degrees().is_finite());
    }

    #[test]
    fn pitch_ignores_magnitude() {
        let a = GravityVector::new(-0.5, 0.1, 0.8).pitch_degrees();
        let b = GravityVector::new(-4.9, 0.98, 7.84).pitch_degrees();
        assert_abs_diff_eq!(a, b, epsilon = 1e-9);
    }

    #[test]
    fn pitch_ignores_roll() {
        let upright = GravityVector::from_tilt(30.0, 0.0, 9.81).pitch_degrees();
        let rolled  = GravityVector::from_tilt(30.0, 45.0, 9.81).pitch_degrees();
        assert_abs_diff_eq!(upright, 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rolled, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn from_tilt_recovers_roll() {
        let v = GravityVector::from_tilt(0.0, 20.0, 1.0);
        assert_abs_diff_eq!(v.roll_degrees(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn l1_distance_sums_axes() {
        let a = GravityVector::new(1.0, -2.0, 3.0);
        let b = GravityVector::new(0.5, -1.0, 3.25);
        assert_abs_diff_eq!(a.l1_distance(&b), 1.75, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_detected() {
        assert!(!GravityVector::new(f64::NAN, 0.0, 1.0).is_finite());
        assert!(!GravityVector::new(0.0, f64::INFINITY, 1.0).is_finite());
        assert!(GravityVector::new(0.0, 0.0, 9.81).is_finite());
    }
}
