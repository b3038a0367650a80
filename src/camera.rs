//! Camera mode state machine with preemptible, eased transitions.
//!
//! Registered views are immutable value records; the live transform is a
//! copy, never an alias into the registry. A transition captures its start
//! once but re-reads its end view every frame, so a moving target (ball
//! follow) stays tracked mid-flight.

use std::collections::HashMap;
use std::fmt;

use nalgebra::{distance, Point3, Vector3};

/// Named, player- or game-selectable viewpoints. `Transitioning` is not a
/// mode: it is reported through [`CameraPhase`] while interpolating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraMode {
    Overhead,
    BallFollow,
    Manual,
    Aiming,
}

impl CameraMode {
    pub fn name(self) -> &'static str {
        match self {
            CameraMode::Overhead => "overhead",
            CameraMode::BallFollow => "ball_follow",
            CameraMode::Manual => "manual",
            CameraMode::Aiming => "aiming",
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A complete camera state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view, degrees.
    pub fov: f32,
}

impl CameraView {
    pub fn looking_at(position: Point3<f32>, target: Point3<f32>, fov: f32) -> Self {
        Self {
            position,
            target,
            up: Vector3::y(),
            fov,
        }
    }

    fn lerp(from: &CameraView, to: &CameraView, t: f32) -> CameraView {
        let up = from.up.lerp(&to.up, t);
        CameraView {
            position: from.position + (to.position - from.position) * t,
            target: from.target + (to.target - from.target) * t,
            up: up.try_normalize(1e-6).unwrap_or_else(Vector3::y),
            fov: from.fov + (to.fov - from.fov) * t,
        }
    }
}

/// Partial update applied to a registered view.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraViewPatch {
    pub position: Option<Point3<f32>>,
    pub target: Option<Point3<f32>>,
    pub up: Option<Vector3<f32>>,
    pub fov: Option<f32>,
}

impl From<CameraView> for CameraViewPatch {
    fn from(view: CameraView) -> Self {
        Self {
            position: Some(view.position),
            target: Some(view.target),
            up: Some(view.up),
            fov: Some(view.fov),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    EaseInOut,
}

impl Easing {
    /// Map linear progress in [0, 1] onto the eased curve.
    pub fn apply(self, t: f32) -> f32 {
        match self {
            Easing::Linear => t,
            Easing::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionOptions {
    pub duration: f32,
    pub easing: Easing,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            duration: 1.0,
            easing: Easing::EaseInOut,
        }
    }
}

#[derive(Debug)]
struct Transition {
    from: CameraView,
    to_mode: CameraMode,
    duration: f32,
    elapsed: f32,
    easing: Easing,
}

/// Reported controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPhase {
    Steady(CameraMode),
    Transitioning { to: CameraMode },
}

pub struct CameraModeController {
    views: HashMap<CameraMode, CameraView>,
    live: CameraView,
    mode: CameraMode,
    transition: Option<Transition>,
}

impl CameraModeController {
    pub fn new(initial_mode: CameraMode, initial_view: CameraView) -> Self {
        Self {
            views: HashMap::from([(initial_mode, initial_view)]),
            live: initial_view,
            mode: initial_mode,
            transition: None,
        }
    }

    /// The transform the renderer consumes this frame.
    pub fn view(&self) -> CameraView {
        self.live
    }

    /// Logical mode: the steady mode, or the target while transitioning.
    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn phase(&self) -> CameraPhase {
        match &self.transition {
            Some(transition) => CameraPhase::Transitioning {
                to: transition.to_mode,
            },
            None => CameraPhase::Steady(self.mode),
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub fn register_view(&mut self, mode: CameraMode, view: CameraView) {
        self.views.insert(mode, view);
    }

    /// Switch modes. Unregistered modes are rejected with a warning.
    /// Already steady in (or transitioning to) `mode` is a no-op, except
    /// that an immediate request snaps an in-flight transition to its end.
    /// Switching to a different mode mid-transition preempts it: the new
    /// transition starts from the live (possibly mid-flight) transform.
    pub fn set_mode(&mut self, mode: CameraMode, immediate: bool, options: TransitionOptions) -> bool {
        let Some(end) = self.views.get(&mode).copied() else {
            tracing::warn!(mode = %mode, "ignoring switch to unregistered camera mode");
            return false;
        };

        if self.mode == mode {
            if immediate && self.transition.is_some() {
                self.live = end;
                self.transition = None;
                return true;
            }
            return false;
        }

        if immediate {
            self.live = end;
            self.mode = mode;
            self.transition = None;
            return true;
        }

        self.transition = Some(Transition {
            from: self.live,
            to_mode: mode,
            duration: options.duration.max(1e-3),
            elapsed: 0.0,
            easing: options.easing,
        });
        self.mode = mode;
        true
    }

    /// Advance an in-flight transition; no-op when steady.
    pub fn update(&mut self, dt: f32) {
        let Some(transition) = self.transition.as_mut() else {
            return;
        };
        transition.elapsed += dt.max(0.0);
        let progress = (transition.elapsed / transition.duration).clamp(0.0, 1.0);
        let eased = transition.easing.apply(progress);
        let end = self
            .views
            .get(&transition.to_mode)
            .copied()
            .unwrap_or(self.live);
        self.live = CameraView::lerp(&transition.from, &end, eased);
        if progress >= 1.0 {
            self.transition = None;
        }
    }

    /// Patch a registered view. When the controller is steady in that mode
    /// the change is applied to the live transform immediately.
    pub fn update_view(&mut self, mode: CameraMode, patch: CameraViewPatch) -> bool {
        let Some(view) = self.views.get_mut(&mode) else {
            tracing::warn!(mode = %mode, "cannot update unregistered camera mode");
            return false;
        };
        if let Some(position) = patch.position {
            view.position = position;
        }
        if let Some(target) = patch.target {
            view.target = target;
        }
        if let Some(up) = patch.up {
            view.up = up;
        }
        if let Some(fov) = patch.fov {
            view.fov = fov;
        }
        let updated = *view;
        if self.transition.is_none() && self.mode == mode {
            self.live = updated;
        }
        true
    }

    /// Jump an in-flight transition straight to its end state.
    pub fn complete_transition(&mut self) {
        if let Some(transition) = self.transition.take() {
            self.live = self
                .views
                .get(&transition.to_mode)
                .copied()
                .unwrap_or(self.live);
        }
    }
}

/// Overhead framing of a hole: high above the start/cup midpoint, pulled
/// back along Z proportionally to the hole length.
pub fn overhead_view(start: Point3<f32>, cup: Point3<f32>) -> CameraView {
    let mid = Point3::from((start.coords + cup.coords) * 0.5);
    let span = distance(&start, &cup).max(4.0);
    CameraView::looking_at(
        Point3::new(mid.x, span * 1.2, mid.z + span * 0.35),
        mid,
        60.0,
    )
}

/// Low view from behind the ball toward the cup.
pub fn aiming_view(ball: Point3<f32>, cup: Point3<f32>) -> CameraView {
    let mut back = ball - cup;
    back.y = 0.0;
    let back = back.try_normalize(1e-6).unwrap_or_else(Vector3::z);
    CameraView::looking_at(ball + back * 2.0 + Vector3::y() * 1.2, cup, 50.0)
}

/// Chase view tracking the ball.
pub fn follow_view(ball: Point3<f32>) -> CameraView {
    CameraView::looking_at(ball + Vector3::new(0.0, 2.5, 3.5), ball, 55.0)
}

/// Fixed corner view for free-look.
pub fn manual_view(start: Point3<f32>, cup: Point3<f32>) -> CameraView {
    let mid = Point3::from((start.coords + cup.coords) * 0.5);
    let span = distance(&start, &cup).max(4.0);
    CameraView::looking_at(mid + Vector3::new(span, span * 0.8, span), mid, 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(x: f32) -> CameraView {
        CameraView::looking_at(Point3::new(x, 5.0, 5.0), Point3::new(x, 0.0, 0.0), 60.0)
    }

    fn controller() -> CameraModeController {
        let mut camera = CameraModeController::new(CameraMode::Overhead, view(0.0));
        camera.register_view(CameraMode::Aiming, view(10.0));
        camera.register_view(CameraMode::BallFollow, view(20.0));
        camera
    }

    #[test]
    fn immediate_switch_copies_the_registered_view() {
        let mut camera = controller();
        assert!(camera.set_mode(CameraMode::Aiming, true, TransitionOptions::default()));
        assert_eq!(camera.view(), view(10.0));
        assert_eq!(camera.phase(), CameraPhase::Steady(CameraMode::Aiming));
    }

    #[test]
    fn unknown_mode_is_rejected_without_effect() {
        let mut camera = controller();
        let before = camera.view();
        assert!(!camera.set_mode(CameraMode::Manual, false, TransitionOptions::default()));
        assert_eq!(camera.view(), before);
        assert!(!camera.is_transitioning());
    }

    #[test]
    fn switching_to_the_current_mode_is_a_no_op() {
        let mut camera = controller();
        assert!(!camera.set_mode(CameraMode::Overhead, false, TransitionOptions::default()));
        assert!(!camera.is_transitioning());
    }

    #[test]
    fn transition_reaches_the_target_after_its_duration() {
        let mut camera = controller();
        let options = TransitionOptions {
            duration: 1.0,
            easing: Easing::EaseInOut,
        };
        assert!(camera.set_mode(CameraMode::Aiming, false, options));
        assert!(camera.is_transitioning());
        assert_eq!(camera.mode(), CameraMode::Aiming);

        for _ in 0..60 {
            camera.update(1.0 / 60.0);
        }
        camera.update(1.0 / 60.0);
        assert!(!camera.is_transitioning());
        assert_eq!(camera.view(), view(10.0));
    }

    #[test]
    fn interpolation_is_eased_not_linear() {
        let mut camera = controller();
        camera.set_mode(
            CameraMode::Aiming,
            false,
            TransitionOptions {
                duration: 1.0,
                easing: Easing::EaseInOut,
            },
        );
        camera.update(0.25);
        // cubic ease-in-out at t=0.25 is 0.0625; linear would be 2.5
        let x = camera.view().position.x;
        assert!((x - 0.625).abs() < 1e-3, "x was {x}");
    }

    #[test]
    fn redirected_transition_ends_at_the_second_target() {
        let mut camera = controller();
        let options = TransitionOptions {
            duration: 1.0,
            easing: Easing::EaseInOut,
        };
        camera.set_mode(CameraMode::Aiming, false, options);
        camera.update(0.3);

        assert!(camera.set_mode(CameraMode::BallFollow, false, options));
        for _ in 0..120 {
            camera.update(1.0 / 60.0);
        }
        assert_eq!(camera.view(), view(20.0));
        assert_eq!(camera.mode(), CameraMode::BallFollow);
    }

    #[test]
    fn repeated_requests_for_the_transition_target_do_not_restart_it() {
        let mut camera = controller();
        let options = TransitionOptions {
            duration: 0.5,
            easing: Easing::Linear,
        };
        camera.set_mode(CameraMode::Aiming, false, options);
        for _ in 0..60 {
            camera.update(1.0 / 60.0);
            camera.set_mode(CameraMode::Aiming, false, options);
        }
        assert!(!camera.is_transitioning());
        assert_eq!(camera.view(), view(10.0));
    }

    #[test]
    fn update_view_applies_immediately_when_steady() {
        let mut camera = controller();
        camera.set_mode(CameraMode::Aiming, true, TransitionOptions::default());
        assert!(camera.update_view(
            CameraMode::Aiming,
            CameraViewPatch {
                target: Some(Point3::new(1.0, 0.0, 2.0)),
                ..Default::default()
            },
        ));
        assert_eq!(camera.view().target, Point3::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn update_view_moves_the_end_of_an_in_flight_transition() {
        let mut camera = controller();
        camera.set_mode(
            CameraMode::BallFollow,
            false,
            TransitionOptions {
                duration: 1.0,
                easing: Easing::Linear,
            },
        );
        camera.update(0.5);
        camera.update_view(
            CameraMode::BallFollow,
            CameraViewPatch {
                position: Some(Point3::new(40.0, 5.0, 5.0)),
                ..Default::default()
            },
        );
        camera.update(0.6);
        assert_eq!(camera.view().position, Point3::new(40.0, 5.0, 5.0));
    }

    #[test]
    fn complete_transition_snaps_to_the_end_state() {
        let mut camera = controller();
        camera.set_mode(CameraMode::Aiming, false, TransitionOptions::default());
        camera.update(0.1);
        camera.complete_transition();
        assert!(!camera.is_transitioning());
        assert_eq!(camera.view(), view(10.0));
    }

    #[test]
    fn easing_endpoints_are_exact() {
        for easing in [Easing::Linear, Easing::EaseInOut] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert_eq!(easing.apply(1.0), 1.0);
        }
        assert!((Easing::EaseInOut.apply(0.5) - 0.5).abs() < 1e-6);
    }
}
