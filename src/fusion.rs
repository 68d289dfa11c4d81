//! # State Fusion Module
//!
//! Integrates acceleration samples into a running velocity estimate and
//! derives the scalar features fed to the predictor.
//!
//! ## Integration
//!
//! Forward Euler: `velocity += accel * dt`. With [`TimeStep::Unit`] every
//! cycle counts as one time unit, which makes the velocity the exact running
//! sum of the samples. [`TimeStep::WallClock`] uses the real elapsed time
//! between samples instead.
//!
//! ## Usage
//!
//! ```
//! use otto_drive::fusion::StateFusion;
//! use otto_drive::telemetry::TelemetrySample;
//!
//! let mut fusion = StateFusion::new();
//! let features = fusion.integrate(&TelemetrySample::new(3.0, 4.0, 0.0), 1.0);
//! assert_eq!(features.speed, 5.0);
//! assert_eq!(features.accel_magnitude, 5.0);
//! ```

use nalgebra::Vector3;
use serde::Deserialize;

use crate::telemetry::TelemetrySample;

/// How much time one integration step covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeStep {
    /// Real elapsed seconds between consecutive samples
    #[default]
    WallClock,
    /// One cycle is one time unit
    Unit,
}

/// Speed and acceleration magnitudes for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub speed: f32,
    pub accel_magnitude: f32,
}

impl FeatureVector {
    #[must_use]
    pub fn as_array(&self) -> [f32; 2] {
        [self.speed, self.accel_magnitude]
    }
}

/// Accumulated velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedState {
    pub velocity: Vector3<f32>,
}

impl Default for FusedState {
    fn default() -> Self {
        Self {
            velocity: Vector3::zeros(),
        }
    }
}

/// Owns the velocity state of the loop.
#[derive(Debug, Clone, Default)]
pub struct StateFusion {
    state: FusedState,
    /// Optional cap on the velocity magnitude
    max_speed: Option<f32>,
}

impl StateFusion {
    /// Zero velocity, no clamping
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary velocity.
    #[must_use]
    pub fn with_velocity(velocity: Vector3<f32>) -> Self {
        Self {
            state: FusedState { velocity },
            max_speed: None,
        }
    }

    /// Cap the velocity magnitude after every integration step.
    ///
    /// Non-positive or non-finite limits are ignored.
    #[must_use]
    pub fn with_max_speed(mut self, max_speed: Option<f32>) -> Self {
        self.max_speed = max_speed.filter(|limit| limit.is_finite() && *limit > 0.0);
        self
    }

    /// Add `sample * dt_secs` to the velocity and return the features.
    pub fn integrate(&mut self, sample: &TelemetrySample, dt_secs: f32) -> FeatureVector {
        let accel = sample.accel();
        let velocity = &mut self.state.velocity;

        // Component order fixed: x, y, z
        velocity.x += accel.x * dt_secs;
        velocity.y += accel.y * dt_secs;
        velocity.z += accel.z * dt_secs;

        if let Some(limit) = self.max_speed {
            let speed = velocity.norm();
            if speed > limit {
                *velocity *= limit / speed;
            }
        }

        FeatureVector {
            speed: velocity.norm(),
            accel_magnitude: accel.norm(),
        }
    }

    /// Current fused state
    #[must_use]
    pub fn state(&self) -> &FusedState {
        &self.state
    }

    /// Zero the velocity (explicit restart).
    pub fn reset(&mut self) {
        self.state = FusedState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_starts_at_rest() {
        let fusion = StateFusion::new();
        assert_eq!(fusion.state().velocity, Vector3::zeros());
    }

    #[test]
    fn test_unit_step_is_exact_running_sum() {
        let samples = [
            TelemetrySample::new(0.1, -0.2, 0.3),
            TelemetrySample::new(0.7, 0.01, -0.05),
            TelemetrySample::new(-1.3, 2.5, 0.125),
            TelemetrySample::new(0.333, 0.666, -0.999),
            TelemetrySample::new(1e-3, -4.0, 8.0),
        ];

        let mut fusion = StateFusion::new();
        let mut expected = [0.0f32; 3];
        for sample in &samples {
            fusion.integrate(sample, 1.0);
            let a = sample.as_array();
            expected[0] += a[0];
            expected[1] += a[1];
            expected[2] += a[2];
        }

        let v = fusion.state().velocity;
        assert_eq!([v.x, v.y, v.z], expected);
    }

    #[test]
    fn test_features_are_euclidean_norms() {
        let mut fusion = StateFusion::new();
        fusion.integrate(&TelemetrySample::new(1.0, 0.0, 0.0), 1.0);
        let features = fusion.integrate(&TelemetrySample::new(0.0, 2.0, 2.0), 1.0);

        // velocity (1, 2, 2) -> 3; sample (0, 2, 2) -> sqrt(8)
        assert!((features.speed - 3.0).abs() < 1e-6);
        assert!((features.accel_magnitude - 8.0f32.sqrt()).abs() < 1e-6);
        assert_eq!(features.as_array(), [features.speed, features.accel_magnitude]);
    }

    #[test]
    fn test_wall_clock_step_scales_by_dt() {
        let mut fusion = StateFusion::new();
        fusion.integrate(&TelemetrySample::new(2.0, 0.0, -4.0), 0.5);
        assert_eq!(fusion.state().velocity, Vector3::new(1.0, 0.0, -2.0));
    }

    #[test]
    fn test_zero_dt_leaves_velocity_unchanged() {
        let mut fusion = StateFusion::with_velocity(Vector3::new(1.0, 1.0, 1.0));
        let features = fusion.integrate(&TelemetrySample::new(5.0, 5.0, 5.0), 0.0);
        assert_eq!(fusion.state().velocity, Vector3::new(1.0, 1.0, 1.0));
        assert!(features.accel_magnitude > 0.0);
    }

    #[test]
    fn test_injected_initial_velocity() {
        let mut fusion = StateFusion::with_velocity(Vector3::new(3.0, 0.0, 0.0));
        let features = fusion.integrate(&TelemetrySample::new(0.0, 4.0, 0.0), 1.0);
        assert!((features.speed - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_decay_without_clamp() {
        let mut fusion = StateFusion::new();
        for _ in 0..1000 {
            fusion.integrate(&TelemetrySample::new(1.0, 0.0, 0.0), 1.0);
        }
        assert_eq!(fusion.state().velocity.x, 1000.0);
    }

    #[test]
    fn test_max_speed_clamps_magnitude() {
        let mut fusion = StateFusion::new().with_max_speed(Some(2.0));
        for _ in 0..10 {
            fusion.integrate(&TelemetrySample::new(0.0, 1.0, 0.0), 1.0);
        }
        let v = fusion.state().velocity;
        assert!((v.norm() - 2.0).abs() < 1e-6);
        assert!((v.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_max_speed_ignored() {
        let mut fusion = StateFusion::new().with_max_speed(Some(-1.0));
        fusion.integrate(&TelemetrySample::new(10.0, 0.0, 0.0), 1.0);
        assert_eq!(fusion.state().velocity.x, 10.0);
    }

    #[test]
    fn test_reset() {
        let mut fusion = StateFusion::new();
        fusion.integrate(&TelemetrySample::new(1.0, 2.0, 3.0), 1.0);
        fusion.reset();
        assert_eq!(*fusion.state(), FusedState::default());
    }
}
