use serde::{Deserialize, Serialize};

use crate::error::GolfError;

/// Game configuration. All tunables for the orchestration core live here;
/// course layout is configured separately via `CourseSpec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub gravity: [f32; 3],
    /// Fixed physics sub-step (seconds). The frame delta only decides how
    /// many sub-steps run.
    pub fixed_dt: f32,
    /// Catch-up cap: at most this many sub-steps per frame after a stall.
    pub max_steps_per_frame: u32,
    pub ball_radius: f32,
    pub ball_linear_damping: f32,
    pub ball_angular_damping: f32,
    /// Distance from the cup centre within which a hole-in can register (m).
    pub capture_radius: f32,
    /// Below this speed the ball counts as at rest (m/s).
    pub rest_speed: f32,
    /// Above this speed the camera switches to ball-follow (m/s).
    pub follow_speed: f32,
    /// Upper bound on the velocity change a single stroke can impart (m/s).
    pub max_power: f32,
    pub event_history_capacity: usize,
    /// Delay before the "continue" prompt after a hole completes (s).
    pub continue_prompt_delay: f64,
    /// Delay before the ball is returned to its pre-shot spot after a
    /// hazard (s).
    pub hazard_reset_delay: f64,
    pub camera_transition_secs: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            fixed_dt: 1.0 / 120.0,
            max_steps_per_frame: 8,
            ball_radius: 0.05,          // m
            ball_linear_damping: 1.2,
            ball_angular_damping: 1.2,
            capture_radius: 0.12,       // m
            rest_speed: 0.05,           // m/s
            follow_speed: 0.35,         // m/s
            max_power: 12.0,            // m/s
            event_history_capacity: 64,
            continue_prompt_delay: 1.5, // s
            hazard_reset_delay: 1.0,    // s
            camera_transition_secs: 1.0,
        }
    }
}

impl GameConfig {
    /// Validate before starting a game. Returns the first problem found.
    pub fn validate(&self) -> Result<(), GolfError> {
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(GolfError::InvalidConfig("gravity must be finite".into()));
        }
        if !(self.fixed_dt > 0.0 && self.fixed_dt <= 0.1) {
            return Err(GolfError::InvalidConfig(format!(
                "fixedDt must be in (0, 0.1], got {}",
                self.fixed_dt
            )));
        }
        if self.max_steps_per_frame == 0 {
            return Err(GolfError::InvalidConfig(
                "maxStepsPerFrame must be at least 1".into(),
            ));
        }
        if self.ball_radius <= 0.0 {
            return Err(GolfError::InvalidConfig("ballRadius must be positive".into()));
        }
        if self.capture_radius <= 0.0 {
            return Err(GolfError::InvalidConfig(
                "captureRadius must be positive".into(),
            ));
        }
        if self.rest_speed <= 0.0 {
            return Err(GolfError::InvalidConfig("restSpeed must be positive".into()));
        }
        if self.follow_speed <= self.rest_speed {
            return Err(GolfError::InvalidConfig(
                "followSpeed must be greater than restSpeed".into(),
            ));
        }
        if self.max_power <= 0.0 {
            return Err(GolfError::InvalidConfig("maxPower must be positive".into()));
        }
        if self.event_history_capacity == 0 {
            return Err(GolfError::InvalidConfig(
                "eventHistoryCapacity must be at least 1".into(),
            ));
        }
        if self.continue_prompt_delay < 0.0 || self.hazard_reset_delay < 0.0 {
            return Err(GolfError::InvalidConfig(
                "delays must not be negative".into(),
            ));
        }
        if self.camera_transition_secs <= 0.0 {
            return Err(GolfError::InvalidConfig(
                "cameraTransitionSecs must be positive".into(),
            ));
        }
        Ok(())
    }
}
