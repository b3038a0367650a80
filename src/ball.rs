//! The player ball: spawn, strike, teleport, rest detection.

use rapier3d::prelude::*;

use crate::config::GameConfig;
use crate::physics::{BodyRole, PhysicsStepper, Surface};

pub struct Ball {
    handle: RigidBodyHandle,
    radius: f32,
    /// Position of the last stroke; hazard resets return the ball here.
    last_rest_position: Point<Real>,
}

impl Ball {
    pub fn spawn(physics: &mut PhysicsStepper, position: Point<Real>, config: &GameConfig) -> Ball {
        let body = RigidBodyBuilder::dynamic()
            .translation(position.coords)
            .linear_damping(config.ball_linear_damping)
            .angular_damping(config.ball_angular_damping)
            .ccd_enabled(true)
            .build();
        let collider = physics.surface_collider(
            Surface::Ball,
            ColliderBuilder::ball(config.ball_radius).density(1.0),
        );
        let handle = physics.add_body(BodyRole::Ball, "ball", body, vec![collider]);
        Ball {
            handle,
            radius: config.ball_radius,
            last_rest_position: position,
        }
    }

    pub fn handle(&self) -> RigidBodyHandle {
        self.handle
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn position(&self, physics: &PhysicsStepper) -> Option<Point<Real>> {
        physics.body_position(self.handle)
    }

    pub fn speed(&self, physics: &PhysicsStepper) -> f32 {
        physics.body_speed(self.handle).unwrap_or(0.0)
    }

    pub fn is_at_rest(&self, physics: &PhysicsStepper, rest_speed: f32) -> bool {
        self.speed(physics) < rest_speed
    }

    pub fn last_rest_position(&self) -> Point<Real> {
        self.last_rest_position
    }

    /// Apply a stroke impulse scaled so `power` is the velocity change in
    /// m/s. Records the pre-shot position for hazard resets. Returns false
    /// (logged) if the ball is missing or the direction is degenerate.
    pub fn strike(&mut self, physics: &mut PhysicsStepper, direction: Vector<Real>, power: f32) -> bool {
        let Some(dir) = direction.try_normalize(1e-6) else {
            tracing::warn!("strike ignored: zero-length direction");
            return false;
        };
        let Some(body) = physics.body_mut(self.handle) else {
            tracing::warn!("strike ignored: ball body missing from world");
            return false;
        };
        self.last_rest_position = Point::from(*body.translation());
        let impulse = dir * power * body.mass();
        body.apply_impulse(impulse, true);
        true
    }

    /// Move the ball with all motion cleared.
    pub fn teleport(&mut self, physics: &mut PhysicsStepper, position: Point<Real>) {
        if let Some(body) = physics.body_mut(self.handle) {
            body.set_translation(position.coords, true);
            body.set_linvel(Vector::zeros(), true);
            body.set_angvel(Vector::zeros(), true);
            body.reset_forces(true);
            body.reset_torques(true);
        } else {
            tracing::warn!("teleport ignored: ball body missing from world");
        }
        self.last_rest_position = position;
    }

    pub fn despawn(self, physics: &mut PhysicsStepper) {
        physics.remove_body(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_green() -> PhysicsStepper {
        let mut physics = PhysicsStepper::new(&GameConfig::default());
        let body = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        let collider =
            physics.surface_collider(Surface::Green, ColliderBuilder::cuboid(10.0, 0.1, 10.0));
        physics.add_body(BodyRole::Green, "green", body, vec![collider]);
        physics
    }

    #[test]
    fn strike_imparts_the_requested_speed() {
        let mut physics = world_with_green();
        let config = GameConfig::default();
        let mut ball = Ball::spawn(&mut physics, point![0.0, 0.06, 0.0], &config);

        assert!(ball.strike(&mut physics, vector![0.0, 0.0, -1.0], 2.0));
        let speed = ball.speed(&physics);
        assert!((speed - 2.0).abs() < 0.05, "speed was {speed}");
    }

    #[test]
    fn strike_rejects_zero_direction() {
        let mut physics = world_with_green();
        let config = GameConfig::default();
        let mut ball = Ball::spawn(&mut physics, point![0.0, 0.06, 0.0], &config);
        assert!(!ball.strike(&mut physics, vector![0.0, 0.0, 0.0], 2.0));
    }

    #[test]
    fn struck_ball_eventually_rests_again() {
        let mut physics = world_with_green();
        let config = GameConfig::default();
        let mut ball = Ball::spawn(&mut physics, point![0.0, 0.06, 0.0], &config);

        ball.strike(&mut physics, vector![1.0, 0.0, 0.0], 1.5);
        for _ in 0..60 * 20 {
            physics.step(1.0 / 60.0);
            if ball.is_at_rest(&physics, config.rest_speed) {
                break;
            }
        }
        assert!(ball.is_at_rest(&physics, config.rest_speed));
        let position = ball.position(&physics).unwrap();
        assert!(position.x > 0.1, "ball should have travelled, x={}", position.x);
    }

    #[test]
    fn teleport_clears_motion_and_updates_rest_position() {
        let mut physics = world_with_green();
        let config = GameConfig::default();
        let mut ball = Ball::spawn(&mut physics, point![0.0, 0.06, 0.0], &config);

        ball.strike(&mut physics, vector![1.0, 0.0, 0.0], 3.0);
        ball.teleport(&mut physics, point![2.0, 0.06, 1.0]);

        assert_eq!(ball.speed(&physics), 0.0);
        let position = ball.position(&physics).unwrap();
        assert_eq!(position, point![2.0, 0.06, 1.0]);
        assert_eq!(ball.last_rest_position(), point![2.0, 0.06, 1.0]);
    }
}
