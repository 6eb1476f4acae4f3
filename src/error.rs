//! Configuration diagnostics.
//!
//! Nothing in the controller fails hard. Infeasible tuning is corrected to the
//! nearest feasible value and reported as a [`ConfigIssue`], which the plugin
//! logs as a warning.

use thiserror::Error;

/// A configuration value that was auto-corrected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigIssue {
    /// The ramp's back-solved final speed was negative, so the start speed was lowered.
    #[error(
        "{ramp} start speed {requested} is too fast to cover {distance} in {time}s, using {applied}"
    )]
    RampStartTooFast {
        ramp: &'static str,
        requested: f32,
        applied: f32,
        distance: f32,
        time: f32,
    },

    /// The ramp would have to accelerate, so it runs at constant speed instead.
    #[error(
        "{ramp} start speed {requested} is too slow to cover {distance} in {time}s, using constant {applied}"
    )]
    RampStartTooSlow {
        ramp: &'static str,
        requested: f32,
        applied: f32,
        distance: f32,
        time: f32,
    },

    /// The ramp has no duration, the transition completes in one step.
    #[error("{ramp} time must be positive, got {time}; the transition will be instant")]
    RampTimeNotPositive { ramp: &'static str, time: f32 },

    /// The held-gravity trajectory peaks below the configured hold distance.
    #[error(
        "jump hold distance {hold_distance} exceeds the held-jump apogee {apogee}, capping hold time at {hold_time}s"
    )]
    JumpHoldDistanceUnreachable {
        hold_distance: f32,
        apogee: f32,
        hold_time: f32,
    },

    /// A value that must be strictly positive was not.
    #[error("{field} must be positive, got {value}; using {applied}")]
    NotPositive {
        field: &'static str,
        value: f32,
        applied: f32,
    },
}
