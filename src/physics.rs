//! Fixed-timestep wrapper around the rapier3d rigid-body pipeline.
//!
//! The frame driver hands in a variable frame delta; the stepper converts it
//! into a bounded number of fixed sub-steps so simulation behaviour does not
//! depend on frame rate. A faulting sub-step freezes the world in place for
//! one frame instead of propagating to the driver.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use rapier3d::prelude::*;

use crate::config::GameConfig;

/// Named surface materials. Every collider carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Ball,
    Green,
    Wall,
    Hazard,
}

impl Surface {
    pub fn name(self) -> &'static str {
        match self {
            Surface::Ball => "ball",
            Surface::Green => "green",
            Surface::Wall => "wall",
            Surface::Hazard => "hazard",
        }
    }

    fn id(self) -> u32 {
        match self {
            Surface::Ball => 0,
            Surface::Green => 1,
            Surface::Wall => 2,
            Surface::Hazard => 3,
        }
    }
}

/// Base friction/restitution of a named surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMaterial {
    pub friction: f32,
    pub restitution: f32,
}

/// Friction/restitution override for a specific surface pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactRule {
    pub friction: f32,
    pub restitution: f32,
}

/// Pair-wise contact rules, applied through rapier's solver-contact hook.
/// Keys are normalized surface-id pairs (low id first).
struct ContactRules {
    rules: HashMap<(u32, u32), ContactRule>,
}

impl ContactRules {
    /// Explicit rules for every pair the ball can touch. Static-static pairs
    /// never produce solver contacts and carry no rule.
    fn standard() -> Self {
        let mut rules = HashMap::new();
        let mut add = |a: Surface, b: Surface, friction: f32, restitution: f32| {
            let key = Self::key(a.id(), b.id());
            rules.insert(key, ContactRule { friction, restitution });
        };
        add(Surface::Ball, Surface::Green, 0.6, 0.2);
        add(Surface::Ball, Surface::Wall, 0.2, 0.7);
        add(Surface::Ball, Surface::Hazard, 0.9, 0.0);
        add(Surface::Ball, Surface::Ball, 0.1, 0.9);
        Self { rules }
    }

    fn key(a: u32, b: u32) -> (u32, u32) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn rule(&self, a: u32, b: u32) -> Option<ContactRule> {
        self.rules.get(&Self::key(a, b)).copied()
    }
}

impl PhysicsHooks for ContactRules {
    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let id1 = context.colliders[context.collider1].user_data as u32;
        let id2 = context.colliders[context.collider2].user_data as u32;
        if let Some(rule) = self.rule(id1, id2) {
            for contact in context.solver_contacts.iter_mut() {
                contact.friction = rule.friction;
                contact.restitution = rule.restitution;
            }
        }
    }
}

/// Game role of a tracked body, used to tag collision notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyRole {
    Ball,
    Green,
    Wall,
    Hazard,
}

impl BodyRole {
    pub fn tag(self) -> &'static str {
        match self {
            BodyRole::Ball => "ball",
            BodyRole::Green => "green",
            BodyRole::Wall => "wall",
            BodyRole::Hazard => "hazard",
        }
    }
}

/// Role-tagged contact handed to the collision callback, decoupled from
/// rapier's native event shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub a: BodyRole,
    pub b: BodyRole,
    pub a_name: String,
    pub b_name: String,
    pub started: bool,
}

impl Contact {
    pub fn involves(&self, x: BodyRole, y: BodyRole) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

struct TrackedBody {
    role: BodyRole,
    name: String,
}

/// Buffers rapier collision events during a sub-step. rapier's
/// `EventHandler` must be `Sync`; the mutex is never contended in this
/// single-threaded core.
#[derive(Default)]
struct CollisionCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl CollisionCollector {
    fn drain(&self) -> Vec<CollisionEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl EventHandler for CollisionCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

pub type CollisionCallback = Box<dyn FnMut(&Contact)>;

pub struct PhysicsStepper {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector<Real>,
    materials: HashMap<Surface, SurfaceMaterial>,
    contact_rules: ContactRules,
    collector: CollisionCollector,
    tracked: HashMap<RigidBodyHandle, TrackedBody>,
    collision_callback: Option<CollisionCallback>,
    fixed_dt: f32,
    max_steps_per_frame: u32,
    accumulator: f32,
    paused: bool,
}

impl PhysicsStepper {
    pub fn new(config: &GameConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.fixed_dt;

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: vector![config.gravity[0], config.gravity[1], config.gravity[2]],
            materials: standard_materials(),
            contact_rules: ContactRules::standard(),
            collector: CollisionCollector::default(),
            tracked: HashMap::new(),
            collision_callback: None,
            fixed_dt: config.fixed_dt,
            max_steps_per_frame: config.max_steps_per_frame,
            accumulator: 0.0,
            paused: false,
        }
    }

    /// Advance the simulation. The frame delta only decides how many fixed
    /// sub-steps run; each sub-step always integrates `fixed_dt` seconds.
    /// Returns the number of sub-steps executed.
    pub fn step(&mut self, frame_dt: f32) -> u32 {
        if self.paused {
            return 0;
        }
        if !frame_dt.is_finite() || frame_dt < 0.0 {
            tracing::warn!(frame_dt, "ignoring invalid frame delta");
            return 0;
        }
        self.accumulator += frame_dt;

        let mut executed = 0;
        while self.accumulator + 1e-6 >= self.fixed_dt && executed < self.max_steps_per_frame {
            self.accumulator -= self.fixed_dt;
            executed += 1;
            if !self.run_substep() {
                break;
            }
        }
        // Drop any backlog beyond the cap instead of replaying a stall.
        self.accumulator = self.accumulator.clamp(0.0, self.fixed_dt);

        self.deliver_contacts();
        executed
    }

    fn run_substep(&mut self) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                None,
                &self.contact_rules,
                &self.collector,
            );
        }));
        match outcome {
            Ok(()) if self.world_is_finite() => true,
            Ok(()) => {
                tracing::error!("physics produced non-finite body state; freezing world for this frame");
                self.freeze_all_bodies();
                false
            }
            Err(panic_payload) => {
                let message = panic_message(panic_payload.as_ref());
                tracing::error!(message, "physics step panicked; freezing world for this frame");
                self.freeze_all_bodies();
                false
            }
        }
    }

    fn world_is_finite(&self) -> bool {
        self.bodies.iter().all(|(_, body)| {
            finite(body.translation()) && finite(body.linvel()) && finite(body.angvel())
        })
    }

    /// Wake every body and zero its motion so the scene holds still for one
    /// frame after a fault. Non-finite translations cannot be integrated
    /// again and are snapped back to the origin.
    fn freeze_all_bodies(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.wake_up(true);
            if !finite(body.translation()) {
                body.set_translation(Vector::zeros(), true);
            }
            body.set_linvel(Vector::zeros(), true);
            body.set_angvel(Vector::zeros(), true);
            body.reset_forces(true);
            body.reset_torques(true);
        }
    }

    fn deliver_contacts(&mut self) {
        let events = self.collector.drain();
        if events.is_empty() {
            return;
        }
        let mut contacts = Vec::with_capacity(events.len());
        for event in events {
            let (h1, h2, started) = match event {
                CollisionEvent::Started(a, b, _) => (a, b, true),
                CollisionEvent::Stopped(a, b, _) => (a, b, false),
            };
            let Some(a) = self.tracked_for_collider(h1) else {
                continue;
            };
            let Some(b) = self.tracked_for_collider(h2) else {
                continue;
            };
            contacts.push(Contact {
                a: a.role,
                b: b.role,
                a_name: a.name.clone(),
                b_name: b.name.clone(),
                started,
            });
        }
        if let Some(callback) = self.collision_callback.as_mut() {
            for contact in &contacts {
                callback(contact);
            }
        }
    }

    fn tracked_for_collider(&self, handle: ColliderHandle) -> Option<&TrackedBody> {
        let parent = self.colliders.get(handle)?.parent()?;
        self.tracked.get(&parent)
    }

    /// Attach surface material, pair-rule wiring and event flags to a
    /// collider under construction.
    pub fn surface_collider(&self, surface: Surface, builder: ColliderBuilder) -> Collider {
        let material = self.material(surface);
        builder
            .friction(material.friction)
            .restitution(material.restitution)
            .user_data(surface.id() as u128)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_hooks(ActiveHooks::MODIFY_SOLVER_CONTACTS)
            .build()
    }

    /// Add a body with its colliders to the world. The body is tracked in
    /// exactly one registry so teardown removes it exactly once.
    pub fn add_body(
        &mut self,
        role: BodyRole,
        name: &str,
        body: RigidBody,
        colliders: Vec<Collider>,
    ) -> RigidBodyHandle {
        let handle = self.bodies.insert(body);
        for collider in colliders {
            self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        }
        self.tracked.insert(
            handle,
            TrackedBody {
                role,
                name: name.to_owned(),
            },
        );
        handle
    }

    /// Remove a body. Its motion is zeroed and it is woken first, so a
    /// removed-but-still-referenced body never retains stale forces.
    /// Returns false (without error) if the body is not tracked.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> bool {
        if self.tracked.remove(&handle).is_none() {
            tracing::warn!(?handle, "remove_body: unknown or already removed body");
            return false;
        }
        if let Some(body) = self.bodies.get_mut(handle) {
            body.wake_up(true);
            body.set_linvel(Vector::zeros(), true);
            body.set_angvel(Vector::zeros(), true);
            body.reset_forces(true);
            body.reset_torques(true);
        }
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        true
    }

    /// Remove every body and rebuild the contact-material table.
    pub fn reset(&mut self) {
        let handles: Vec<RigidBodyHandle> = self.tracked.keys().copied().collect();
        for handle in handles {
            self.remove_body(handle);
        }
        self.contact_rules = ContactRules::standard();
        self.collector.drain();
        self.accumulator = 0.0;
    }

    pub fn set_gravity(&mut self, gravity: Vector<Real>) {
        self.gravity = gravity;
    }

    pub fn gravity(&self) -> Vector<Real> {
        self.gravity
    }

    pub fn material(&self, surface: Surface) -> SurfaceMaterial {
        self.materials
            .get(&surface)
            .copied()
            .unwrap_or(SurfaceMaterial {
                friction: 0.5,
                restitution: 0.0,
            })
    }

    pub fn set_collision_callback(&mut self, callback: CollisionCallback) {
        self.collision_callback = Some(callback);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn body_position(&self, handle: RigidBodyHandle) -> Option<Point<Real>> {
        self.bodies.get(handle).map(|b| Point::from(*b.translation()))
    }

    pub fn body_speed(&self, handle: RigidBodyHandle) -> Option<f32> {
        self.bodies.get(handle).map(|b| b.linvel().norm())
    }

    pub fn role_of(&self, handle: RigidBodyHandle) -> Option<BodyRole> {
        self.tracked.get(&handle).map(|t| t.role)
    }

    pub fn body_count(&self) -> usize {
        self.tracked.len()
    }
}

fn standard_materials() -> HashMap<Surface, SurfaceMaterial> {
    HashMap::from([
        (
            Surface::Ball,
            SurfaceMaterial {
                friction: 0.3,
                restitution: 0.5,
            },
        ),
        (
            Surface::Green,
            SurfaceMaterial {
                friction: 0.6,
                restitution: 0.2,
            },
        ),
        (
            Surface::Wall,
            SurfaceMaterial {
                friction: 0.2,
                restitution: 0.7,
            },
        ),
        (
            Surface::Hazard,
            SurfaceMaterial {
                friction: 0.9,
                restitution: 0.0,
            },
        ),
    ])
}

fn finite(v: &Vector<Real>) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn stepper() -> PhysicsStepper {
        PhysicsStepper::new(&GameConfig::default())
    }

    fn spawn_ball(physics: &mut PhysicsStepper, y: f32) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![0.0, y, 0.0])
            .ccd_enabled(true)
            .build();
        let collider =
            physics.surface_collider(Surface::Ball, ColliderBuilder::ball(0.05).density(1.0));
        physics.add_body(BodyRole::Ball, "ball", body, vec![collider])
    }

    fn spawn_green(physics: &mut PhysicsStepper) -> RigidBodyHandle {
        let body = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -0.1, 0.0])
            .build();
        let collider =
            physics.surface_collider(Surface::Green, ColliderBuilder::cuboid(5.0, 0.1, 5.0));
        physics.add_body(BodyRole::Green, "green", body, vec![collider])
    }

    #[test]
    fn substep_count_scales_with_frame_delta() {
        let mut physics = stepper();
        let dt = physics.fixed_dt();
        assert_eq!(physics.step(dt), 1);
        assert_eq!(physics.step(2.0 * dt), 2);
        assert_eq!(physics.step(4.0 * dt), 4);
    }

    #[test]
    fn substeps_are_capped_after_a_stall() {
        let mut physics = stepper();
        assert_eq!(physics.step(1.0), 8);
        // the backlog is dropped, not replayed
        assert!(physics.step(0.0) <= 1);
    }

    #[test]
    fn leftover_frame_time_carries_to_the_next_frame() {
        let mut physics = stepper();
        let dt = physics.fixed_dt();
        assert_eq!(physics.step(0.6 * dt), 0);
        assert_eq!(physics.step(0.6 * dt), 1);
    }

    #[test]
    fn paused_stepper_does_not_advance() {
        let mut physics = stepper();
        physics.pause();
        physics.pause(); // idempotent
        assert_eq!(physics.step(1.0), 0);
        physics.resume();
        assert!(physics.step(1.0 / 60.0) > 0);
    }

    #[test]
    fn gravity_pulls_a_free_ball_down() {
        let mut physics = stepper();
        let ball = spawn_ball(&mut physics, 2.0);
        for _ in 0..30 {
            physics.step(1.0 / 60.0);
        }
        let position = physics.body_position(ball).unwrap();
        assert!(position.y < 2.0);
    }

    #[test]
    fn non_finite_state_freezes_every_body() {
        let mut physics = stepper();
        spawn_green(&mut physics);
        let ball = spawn_ball(&mut physics, 0.5);

        physics
            .body_mut(ball)
            .unwrap()
            .set_linvel(vector![f32::NAN, 0.0, 0.0], true);
        physics.step(1.0 / 60.0);

        let body = physics.body(ball).unwrap();
        assert_eq!(body.linvel().norm(), 0.0);
        assert_eq!(body.angvel().norm(), 0.0);
        assert!(finite(body.translation()));

        // the next frame steps normally again
        assert!(physics.step(1.0 / 60.0) > 0);
    }

    #[test]
    fn remove_body_is_exactly_once() {
        let mut physics = stepper();
        let ball = spawn_ball(&mut physics, 1.0);
        assert_eq!(physics.body_count(), 1);
        assert!(physics.remove_body(ball));
        assert_eq!(physics.body_count(), 0);
        assert!(physics.body(ball).is_none());
        assert!(!physics.remove_body(ball));
    }

    #[test]
    fn reset_clears_the_world() {
        let mut physics = stepper();
        spawn_green(&mut physics);
        spawn_ball(&mut physics, 1.0);
        physics.reset();
        assert_eq!(physics.body_count(), 0);
    }

    #[test]
    fn contact_rules_are_symmetric() {
        let rules = ContactRules::standard();
        let ab = rules.rule(Surface::Ball.id(), Surface::Wall.id());
        let ba = rules.rule(Surface::Wall.id(), Surface::Ball.id());
        assert_eq!(ab, ba);
        assert!(ab.is_some());
    }

    #[test]
    fn materials_are_registered_for_every_surface() {
        let physics = stepper();
        for surface in [Surface::Ball, Surface::Green, Surface::Wall, Surface::Hazard] {
            assert!(physics.material(surface).friction >= 0.0);
        }
    }

    #[test]
    fn dropped_ball_reports_a_role_tagged_contact() {
        let mut physics = stepper();
        spawn_green(&mut physics);
        spawn_ball(&mut physics, 0.3);

        let contacts: Rc<RefCell<Vec<Contact>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = contacts.clone();
        physics.set_collision_callback(Box::new(move |contact| {
            sink.borrow_mut().push(contact.clone());
        }));

        for _ in 0..120 {
            physics.step(1.0 / 60.0);
        }

        let contacts = contacts.borrow();
        assert!(contacts
            .iter()
            .any(|c| c.started && c.involves(BodyRole::Ball, BodyRole::Green)));
    }

    #[test]
    fn sensor_overlap_reports_a_hazard_contact() {
        let mut physics = stepper();
        spawn_green(&mut physics);
        // sensor volume straddling the drop path
        let body = RigidBodyBuilder::fixed()
            .translation(vector![0.0, 0.1, 0.0])
            .build();
        let collider = physics.surface_collider(
            Surface::Hazard,
            ColliderBuilder::cuboid(0.5, 0.2, 0.5).sensor(true),
        );
        physics.add_body(BodyRole::Hazard, "pond", body, vec![collider]);
        spawn_ball(&mut physics, 0.6);

        let contacts: Rc<RefCell<Vec<Contact>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = contacts.clone();
        physics.set_collision_callback(Box::new(move |contact| {
            sink.borrow_mut().push(contact.clone());
        }));

        for _ in 0..120 {
            physics.step(1.0 / 60.0);
        }

        let contacts = contacts.borrow();
        assert!(contacts
            .iter()
            .any(|c| c.started && c.involves(BodyRole::Ball, BodyRole::Hazard)));
    }
}
