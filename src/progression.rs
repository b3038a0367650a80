//! Hole and round progression: the single source of truth for which hole is
//! active, hole-entry detection, and advancing through the course.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::distance;
use serde::Serialize;
use serde_json::{json, Value};

use crate::ball::Ball;
use crate::camera::{self, CameraMode, CameraModeController, TransitionOptions};
use crate::clock::TaskQueue;
use crate::config::GameConfig;
use crate::course::Course;
use crate::events::{payload, EventBus, EventType};
use crate::physics::PhysicsStepper;
use crate::scoring::Scorecard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionPhase {
    ActiveHole,
    HoleCompleted,
    RoundCompleted,
}

/// Snapshot of round state for UI collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProgress {
    pub current_hole_index: usize,
    pub total_holes: usize,
    pub hole_completed: bool,
    pub stroke_counts: Vec<u32>,
}

pub struct HoleProgressionController {
    bus: Rc<EventBus>,
    scorecard: Rc<RefCell<Scorecard>>,
    phase: ProgressionPhase,
    current_hole: usize,
    capture_radius: f32,
    rest_speed: f32,
    continue_prompt_delay: f64,
}

impl HoleProgressionController {
    pub fn new(bus: Rc<EventBus>, scorecard: Rc<RefCell<Scorecard>>, config: &GameConfig) -> Self {
        Self {
            bus,
            scorecard,
            phase: ProgressionPhase::ActiveHole,
            current_hole: 0,
            capture_radius: config.capture_radius,
            rest_speed: config.rest_speed,
            continue_prompt_delay: config.continue_prompt_delay,
        }
    }

    pub fn phase(&self) -> ProgressionPhase {
        self.phase
    }

    pub fn current_hole(&self) -> usize {
        self.current_hole
    }

    pub fn progress(&self, course: &Course) -> GameProgress {
        let stroke_counts = {
            let card = self.scorecard.borrow();
            (0..course.total_holes())
                .map(|i| card.hole_strokes(i).unwrap_or(0))
                .collect()
        };
        GameProgress {
            current_hole_index: self.current_hole,
            total_holes: course.total_holes(),
            hole_completed: !matches!(self.phase, ProgressionPhase::ActiveHole),
            stroke_counts,
        }
    }

    /// Per-frame hole-entry check. Returns true only on the frame completion
    /// is detected; afterwards the check is suppressed until the next hole
    /// loads. Entry requires the ball near the cup AND (at rest OR already
    /// sinking below the rim). Either disjunct alone is sufficient, so a
    /// ball resting in a depression beside the cup also counts; that
    /// tolerance is deliberate and characterized in tests.
    pub fn check_ball_in_hole(
        &mut self,
        physics: &PhysicsStepper,
        course: &Course,
        ball: &Ball,
        tasks: &mut TaskQueue,
    ) -> bool {
        if self.phase != ProgressionPhase::ActiveHole {
            return false;
        }
        let Some(hole) = course.hole(self.current_hole) else {
            tracing::warn!("check_ball_in_hole: no course hole loaded");
            return false;
        };
        let Some(position) = ball.position(physics) else {
            tracing::warn!("check_ball_in_hole: ball missing from world");
            return false;
        };

        let cup = hole.cup_point();
        if distance(&position, &cup) > self.capture_radius {
            return false;
        }
        let at_rest = ball.is_at_rest(physics, self.rest_speed);
        let below_rim = position.y < cup.y;
        if !(at_rest || below_rim) {
            return false;
        }

        self.phase = ProgressionPhase::HoleCompleted;
        let (strokes, total) = {
            let card = self.scorecard.borrow();
            (card.current_hole_strokes(), card.total_strokes())
        };

        self.bus.publish(
            EventType::BallInHole,
            payload(json!({
                "holeIndex": self.current_hole,
                "hole": self.current_hole + 1,
                "strokes": strokes,
                "totalStrokes": total,
                "position": [position.x, position.y, position.z],
            })),
            Some("HoleProgression"),
        );
        self.bus.publish(
            EventType::HoleCompleted,
            payload(json!({
                "holeIndex": self.current_hole,
                "hole": self.current_hole + 1,
                "par": hole.par,
                "strokes": strokes,
            })),
            Some("HoleProgression"),
        );

        let bus = self.bus.clone();
        let hole_index = self.current_hole;
        tasks.schedule_in(self.continue_prompt_delay, move || {
            bus.publish(
                EventType::UiContinueRequested,
                payload(json!({"holeIndex": hole_index})),
                Some("HoleProgression"),
            );
        });

        tracing::info!(hole = self.current_hole + 1, strokes, "hole completed");
        true
    }

    /// Advance to the next hole, or finish the round on the last one.
    /// Requires `HoleCompleted`; anything else is rejected with a warning
    /// (and a re-trigger of round completion when already finished).
    pub fn next_hole(
        &mut self,
        physics: &mut PhysicsStepper,
        course: &mut Course,
        ball: &mut Ball,
        cam: &mut CameraModeController,
    ) -> bool {
        match self.phase {
            ProgressionPhase::ActiveHole => {
                tracing::warn!("next_hole requested while the hole is still active");
                false
            }
            ProgressionPhase::RoundCompleted => {
                tracing::warn!("next_hole requested after round completion");
                self.publish_round_completed();
                false
            }
            ProgressionPhase::HoleCompleted => {
                let next = self.current_hole + 1;
                if next >= course.total_holes() {
                    self.phase = ProgressionPhase::RoundCompleted;
                    self.publish_round_completed();
                    tracing::info!("round completed");
                    return true;
                }

                course.teardown_hole(physics);
                if let Err(error) = course.build_hole(physics, next) {
                    tracing::error!(%error, "failed to build next hole");
                    return false;
                }
                self.current_hole = next;
                let Some(hole) = course.hole(next).cloned() else {
                    return false;
                };

                ball.teleport(physics, hole.start_point());
                // reframe the overhead view on the incoming hole and snap to
                // it; update_view syncs the live transform when the camera is
                // already steady in overhead
                let overhead = camera::overhead_view(hole.start_point(), hole.cup_point());
                cam.register_view(CameraMode::Overhead, overhead);
                cam.update_view(CameraMode::Overhead, overhead.into());
                cam.set_mode(CameraMode::Overhead, true, TransitionOptions::default());

                self.bus.publish(
                    EventType::HoleStarted,
                    payload(json!({
                        "holeIndex": next,
                        "hole": next + 1,
                        "par": hole.par,
                    })),
                    Some("HoleProgression"),
                );
                self.phase = ProgressionPhase::ActiveHole;
                tracing::info!(hole = next + 1, par = hole.par, "hole started");
                true
            }
        }
    }

    fn publish_round_completed(&self) {
        let (breakdown, total) = {
            let card = self.scorecard.borrow();
            (card.breakdown(), card.total_strokes())
        };
        let holes = serde_json::to_value(&breakdown).unwrap_or(Value::Null);
        self.bus.publish(
            EventType::GameCompleted,
            payload(json!({
                "totalStrokes": total,
                "holes": holes,
            })),
            Some("HoleProgression"),
        );
    }
}
