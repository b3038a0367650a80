//! Mini-golf orchestration core.
//!
//! A frame-driven, single-threaded game core: a fault-isolating event bus,
//! a fixed-timestep wrapper around the rapier3d rigid-body world, hole and
//! round progression, and an interpolating camera-mode controller.
//! Rendering, input and UI are external collaborators: they drive
//! [`game::Game::update`] once per frame, publish input onto the bus, and
//! read back the camera transform and body positions.

pub mod ball;
pub mod camera;
pub mod clock;
pub mod config;
pub mod course;
pub mod error;
pub mod events;
pub mod game;
pub mod physics;
pub mod progression;
pub mod scoring;

pub use camera::{CameraMode, CameraModeController, CameraView, Easing, TransitionOptions};
pub use config::GameConfig;
pub use course::{Course, CourseSpec, HoleSpec};
pub use error::GolfError;
pub use events::{payload, Event, EventBus, EventType};
pub use game::Game;
pub use physics::{BodyRole, Contact, PhysicsStepper, Surface};
pub use progression::{GameProgress, ProgressionPhase};
pub use scoring::{HoleScore, Scorecard};
