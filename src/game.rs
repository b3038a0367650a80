//! Composition root: owns every subsystem and runs the per-frame sequence.
//!
//! Components receive only the collaborators they need (a bus handle, the
//! stepper, the scorecard handle); there is no shared god-object. The frame
//! driver calls [`Game::update`] once per frame and reads back the camera
//! transform and body positions for rendering.

use std::cell::RefCell;
use std::rc::Rc;

use rapier3d::prelude::*;
use serde_json::json;

use crate::ball::Ball;
use crate::camera::{
    self, CameraMode, CameraModeController, CameraViewPatch, Easing, TransitionOptions,
};
use crate::clock::{GameClock, TaskQueue};
use crate::config::GameConfig;
use crate::course::{Course, CourseSpec, HoleSpec};
use crate::error::GolfError;
use crate::events::{payload, EventBus, EventType, SubscriptionId};
use crate::physics::{BodyRole, Contact, PhysicsStepper};
use crate::progression::{GameProgress, HoleProgressionController, ProgressionPhase};
use crate::scoring::{HoleScore, Scorecard};

pub struct Game {
    config: GameConfig,
    clock: GameClock,
    tasks: TaskQueue,
    bus: Rc<EventBus>,
    physics: PhysicsStepper,
    course: Course,
    ball: Option<Ball>,
    scorecard: Rc<RefCell<Scorecard>>,
    #[allow(dead_code)]
    scorecard_subs: Vec<SubscriptionId>,
    progression: HoleProgressionController,
    camera: CameraModeController,
    contacts: Rc<RefCell<Vec<Contact>>>,
    pending_ball_reset: Option<f64>,
    ball_moving: bool,
    started: bool,
    paused: bool,
}

impl Game {
    pub fn new(config: GameConfig, course_spec: CourseSpec) -> Result<Game, GolfError> {
        config.validate()?;
        let course = Course::new(course_spec)?;

        let bus = Rc::new(EventBus::new(config.event_history_capacity));
        let pars = course_pars(&course);
        let scorecard = Rc::new(RefCell::new(Scorecard::new(pars)));
        let scorecard_subs = Scorecard::attach(scorecard.clone(), &bus);

        let mut physics = PhysicsStepper::new(&config);
        let contacts: Rc<RefCell<Vec<Contact>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = contacts.clone();
        physics.set_collision_callback(Box::new(move |contact| {
            sink.borrow_mut().push(contact.clone());
        }));

        let progression = HoleProgressionController::new(bus.clone(), scorecard.clone(), &config);
        let camera = CameraModeController::new(
            CameraMode::Overhead,
            camera::overhead_view(nalgebra::Point3::origin(), nalgebra::Point3::origin()),
        );

        Ok(Game {
            config,
            clock: GameClock::new(),
            tasks: TaskQueue::new(),
            bus,
            physics,
            course,
            ball: None,
            scorecard,
            scorecard_subs,
            progression,
            camera,
            contacts,
            pending_ball_reset: None,
            ball_moving: false,
            started: false,
            paused: false,
        })
    }

    /// Build the first hole, spawn the ball, and announce the round.
    pub fn start(&mut self) -> Result<(), GolfError> {
        if self.started {
            tracing::warn!("game already started");
            return Ok(());
        }
        self.course.build_hole(&mut self.physics, 0)?;
        let hole = self
            .course
            .hole(0)
            .cloned()
            .ok_or(GolfError::NoSuchHole {
                index: 0,
                total: self.course.total_holes(),
            })?;

        let ball = Ball::spawn(&mut self.physics, hole.start_point(), &self.config);
        self.register_hole_views(&hole, hole.start_point());
        let options = self.transition_options();
        self.camera.set_mode(CameraMode::Overhead, true, options);
        self.ball = Some(ball);
        self.started = true;

        self.bus.publish(
            EventType::GameStarted,
            payload(json!({
                "course": self.course.name(),
                "totalHoles": self.course.total_holes(),
            })),
            Some("Game"),
        );
        self.bus.publish(
            EventType::HoleStarted,
            payload(json!({"holeIndex": 0, "hole": 1, "par": hole.par})),
            Some("Game"),
        );
        tracing::info!(
            course = self.course.name(),
            holes = self.course.total_holes(),
            "game started"
        );
        Ok(())
    }

    /// One frame of the orchestration sequence: clock, due tasks, physics
    /// sub-steps, contact routing, hole-entry check, camera interpolation.
    pub fn update(&mut self, frame_dt: f32) {
        if !self.started || self.paused {
            return;
        }
        self.clock.advance(frame_dt as f64);
        self.bus.set_now(self.clock.now());
        self.tasks.run_due(self.clock.now());

        self.physics.step(frame_dt);
        self.process_contacts();
        self.process_pending_reset();
        self.observe_ball();

        self.camera.update(frame_dt);
    }

    fn process_contacts(&mut self) {
        let drained: Vec<Contact> = self.contacts.borrow_mut().drain(..).collect();
        for contact in drained {
            if contact.started
                && contact.involves(BodyRole::Ball, BodyRole::Hazard)
                && self.pending_ball_reset.is_none()
            {
                self.bus.publish(
                    EventType::HazardDetected,
                    payload(json!({
                        "holeIndex": self.progression.current_hole(),
                        "surface": "hazard",
                    })),
                    Some("Game"),
                );
                self.pending_ball_reset = Some(self.clock.now() + self.config.hazard_reset_delay);
                tracing::info!("ball entered a hazard; reset scheduled");
            }
        }
    }

    fn process_pending_reset(&mut self) {
        let Some(due) = self.pending_ball_reset else {
            return;
        };
        if self.clock.now() < due {
            return;
        }
        self.pending_ball_reset = None;
        if let Some(ball) = self.ball.as_mut() {
            let position = ball.last_rest_position();
            ball.teleport(&mut self.physics, position);
            self.ball_moving = false;
            self.bus.publish(
                EventType::BallReset,
                payload(json!({"position": [position.x, position.y, position.z]})),
                Some("Game"),
            );
        }
    }

    fn observe_ball(&mut self) {
        let Some(ball) = self.ball.as_ref() else {
            return;
        };
        let speed = ball.speed(&self.physics);
        let position = ball.position(&self.physics);

        if self.ball_moving && speed < self.config.rest_speed {
            self.ball_moving = false;
            if let Some(position) = position {
                self.bus.publish(
                    EventType::BallStopped,
                    payload(json!({
                        "holeIndex": self.progression.current_hole(),
                        "position": [position.x, position.y, position.z],
                    })),
                    Some("Game"),
                );
            }
        } else if !self.ball_moving && speed > self.config.follow_speed {
            self.ball_moving = true;
        }

        // keep the dynamic views tracking the ball
        if let (Some(position), Some(hole)) = (
            position,
            self.course.hole(self.progression.current_hole()),
        ) {
            let cup = hole.cup_point();
            let follow = camera::follow_view(position);
            self.camera.update_view(
                CameraMode::BallFollow,
                CameraViewPatch {
                    position: Some(follow.position),
                    target: Some(follow.target),
                    ..Default::default()
                },
            );
            if !self.ball_moving {
                self.camera
                    .register_view(CameraMode::Aiming, camera::aiming_view(position, cup));
            }
        }

        if matches!(self.progression.phase(), ProgressionPhase::ActiveHole) {
            let options = self.transition_options();
            if self.ball_moving {
                self.camera.set_mode(CameraMode::BallFollow, false, options);
            } else {
                self.camera.set_mode(CameraMode::Aiming, false, options);
            }
            let completed = self.progression.check_ball_in_hole(
                &self.physics,
                &self.course,
                ball,
                &mut self.tasks,
            );
            if completed {
                self.camera.set_mode(CameraMode::Overhead, false, options);
            }
        }
    }

    /// Strike the ball. Rejected (warning + false) unless the round is
    /// running, the hole is active, and the ball is at rest.
    pub fn hit_ball(&mut self, direction: Vector<Real>, power: f32) -> bool {
        if !self.started {
            tracing::warn!("hit_ball ignored: game not started");
            return false;
        }
        if self.paused {
            tracing::warn!("hit_ball ignored: game paused");
            return false;
        }
        if !matches!(self.progression.phase(), ProgressionPhase::ActiveHole) {
            tracing::warn!("hit_ball ignored: hole is not active");
            return false;
        }
        let Some(dir) = direction.try_normalize(1e-6) else {
            tracing::warn!("hit_ball ignored: zero-length direction");
            return false;
        };
        let power = power.clamp(0.0, self.config.max_power);
        if power <= 0.0 {
            tracing::warn!("hit_ball ignored: no power");
            return false;
        }
        let Some(ball) = self.ball.as_mut() else {
            tracing::warn!("hit_ball ignored: no ball");
            return false;
        };
        if !ball.is_at_rest(&self.physics, self.config.rest_speed) {
            tracing::warn!("hit_ball ignored: ball still moving");
            return false;
        }
        if !ball.strike(&mut self.physics, dir, power) {
            return false;
        }
        self.ball_moving = true;
        self.bus.publish(
            EventType::BallHit,
            payload(json!({
                "power": power,
                "direction": [dir.x, dir.y, dir.z],
                "holeIndex": self.progression.current_hole(),
            })),
            Some("Game"),
        );
        true
    }

    /// Advance after a completed hole; see
    /// [`HoleProgressionController::next_hole`].
    pub fn next_hole(&mut self) -> bool {
        let Some(ball) = self.ball.as_mut() else {
            tracing::warn!("next_hole ignored: no ball");
            return false;
        };
        let advanced = self.progression.next_hole(
            &mut self.physics,
            &mut self.course,
            ball,
            &mut self.camera,
        );
        if advanced {
            self.ball_moving = false;
            self.pending_ball_reset = None;
        }
        advanced
    }

    /// Suspend everything: the bus drops publishes, physics stops stepping.
    /// Idempotent.
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.bus.disable();
        self.physics.pause();
        tracing::info!("game paused");
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.bus.enable();
        self.physics.resume();
        tracing::info!("game resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn register_hole_views(&mut self, hole: &HoleSpec, ball_position: Point<Real>) {
        let start = hole.start_point();
        let cup = hole.cup_point();
        let overhead = camera::overhead_view(start, cup);
        self.camera.register_view(CameraMode::Overhead, overhead);
        self.camera
            .register_view(CameraMode::Manual, camera::manual_view(start, cup));
        self.camera
            .register_view(CameraMode::Aiming, camera::aiming_view(ball_position, cup));
        self.camera
            .register_view(CameraMode::BallFollow, camera::follow_view(ball_position));
        // sync the live transform in case the camera is already steady in
        // overhead (set_mode on the current mode is a no-op)
        self.camera.update_view(CameraMode::Overhead, overhead.into());
    }

    fn transition_options(&self) -> TransitionOptions {
        TransitionOptions {
            duration: self.config.camera_transition_secs,
            easing: Easing::EaseInOut,
        }
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn camera(&self) -> &CameraModeController {
        &self.camera
    }

    pub fn phase(&self) -> ProgressionPhase {
        self.progression.phase()
    }

    pub fn progress(&self) -> GameProgress {
        self.progression.progress(&self.course)
    }

    pub fn current_hole(&self) -> usize {
        self.progression.current_hole()
    }

    pub fn hole_spec(&self, index: usize) -> Option<&HoleSpec> {
        self.course.hole(index)
    }

    pub fn course_name(&self) -> &str {
        self.course.name()
    }

    pub fn ball_position(&self) -> Option<Point<Real>> {
        self.ball.as_ref().and_then(|b| b.position(&self.physics))
    }

    pub fn ball_at_rest(&self) -> bool {
        self.ball
            .as_ref()
            .map(|b| b.is_at_rest(&self.physics, self.config.rest_speed))
            .unwrap_or(false)
    }

    pub fn breakdown(&self) -> Vec<HoleScore> {
        self.scorecard.borrow().breakdown()
    }

    pub fn total_strokes(&self) -> u32 {
        self.scorecard.borrow().total_strokes()
    }

    pub fn clock_now(&self) -> f64 {
        self.clock.now()
    }
}

fn course_pars(course: &Course) -> Vec<u32> {
    (0..course.total_holes())
        .filter_map(|i| course.hole(i).map(|h| h.par))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> Game {
        let mut game = Game::new(GameConfig::default(), CourseSpec::default_course()).unwrap();
        game.start().unwrap();
        game
    }

    #[test]
    fn start_publishes_game_and_hole_events() {
        let game = game();
        let events: Vec<EventType> = game
            .bus()
            .history(None)
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(events, vec![EventType::GameStarted, EventType::HoleStarted]);
        assert_eq!(game.phase(), ProgressionPhase::ActiveHole);
    }

    #[test]
    fn hit_requires_a_started_game() {
        let mut game = Game::new(GameConfig::default(), CourseSpec::default_course()).unwrap();
        assert!(!game.hit_ball(vector![0.0, 0.0, -1.0], 2.0));
    }

    /// Run frames until the ball settles on the green.
    fn settle(game: &mut Game) {
        for _ in 0..240 {
            game.update(1.0 / 60.0);
            if game.ball_at_rest() {
                break;
            }
        }
    }

    #[test]
    fn hit_publishes_ball_hit_with_clamped_power() {
        let mut game = game();
        settle(&mut game);
        assert!(game.hit_ball(vector![0.0, 0.0, -1.0], 99.0));

        let history = game.bus().history(None);
        let hit = history
            .iter()
            .find(|e| e.event_type == EventType::BallHit)
            .unwrap();
        let power = hit.data.get("power").and_then(serde_json::Value::as_f64).unwrap();
        assert_eq!(power as f32, GameConfig::default().max_power);
        assert_eq!(game.total_strokes(), 1);
    }

    #[test]
    fn hit_is_rejected_while_the_ball_is_moving() {
        let mut game = game();
        settle(&mut game);
        assert!(game.hit_ball(vector![0.0, 0.0, -1.0], 3.0));
        game.update(1.0 / 60.0);
        assert!(!game.hit_ball(vector![0.0, 0.0, -1.0], 3.0));
        assert_eq!(game.total_strokes(), 1);
    }

    #[test]
    fn hit_rejects_zero_direction_and_zero_power() {
        let mut game = game();
        settle(&mut game);
        assert!(!game.hit_ball(vector![0.0, 0.0, 0.0], 2.0));
        assert!(!game.hit_ball(vector![0.0, 0.0, -1.0], 0.0));
        assert_eq!(game.total_strokes(), 0);
    }

    #[test]
    fn pause_suspends_events_and_physics_idempotently() {
        let mut game = game();
        game.pause();
        game.pause();

        let history_len = game.bus().history(None).len();
        let position = game.ball_position();
        for _ in 0..10 {
            game.update(1.0 / 60.0);
        }
        assert_eq!(game.bus().history(None).len(), history_len);
        assert_eq!(game.ball_position(), position);
        assert_eq!(game.clock_now(), 0.0);

        game.resume();
        game.resume();
        game.update(1.0 / 60.0);
        assert!(game.clock_now() > 0.0);
    }

    #[test]
    fn camera_settles_into_aiming_while_the_ball_rests() {
        let mut game = game();
        for _ in 0..240 {
            game.update(1.0 / 60.0);
        }
        assert_eq!(game.camera().mode(), CameraMode::Aiming);
    }

    #[test]
    fn starting_twice_is_a_warning_not_an_error() {
        let mut game = game();
        assert!(game.start().is_ok());
    }
}
