//! Course definitions and per-hole physics geometry lifecycle.
//!
//! A `CourseSpec` is plain serde data; `Course` owns the runtime state: which
//! hole is built and which bodies belong to it. Only one hole exists in the
//! physics world at a time.

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::GolfError;
use crate::physics::{BodyRole, PhysicsStepper, Surface};

const GREEN_THICKNESS: f32 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WallSpec {
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardSpec {
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoleSpec {
    pub par: u32,
    /// Tee position. Keep it slightly above the green so the ball settles.
    pub start: [f32; 3],
    /// Cup centre at rim level.
    pub cup: [f32; 3],
    /// Half extents of the playable green in the XZ plane, centred on the
    /// start/cup midpoint.
    #[serde(default = "default_green_half_extents")]
    pub green_half_extents: [f32; 2],
    #[serde(default)]
    pub walls: Vec<WallSpec>,
    #[serde(default)]
    pub hazards: Vec<HazardSpec>,
}

fn default_green_half_extents() -> [f32; 2] {
    [4.0, 5.0]
}

impl HoleSpec {
    pub fn start_point(&self) -> Point<Real> {
        point![self.start[0], self.start[1], self.start[2]]
    }

    pub fn cup_point(&self) -> Point<Real> {
        point![self.cup[0], self.cup[1], self.cup[2]]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSpec {
    pub name: String,
    pub holes: Vec<HoleSpec>,
}

impl CourseSpec {
    /// Built-in three-hole course used by the headless driver and tests.
    pub fn default_course() -> CourseSpec {
        CourseSpec {
            name: "Backyard Classic".to_owned(),
            holes: vec![
                HoleSpec {
                    par: 2,
                    start: [0.0, 0.1, 3.0],
                    cup: [0.0, 0.0, -3.0],
                    green_half_extents: [2.5, 4.0],
                    walls: vec![
                        WallSpec {
                            center: [-2.6, 0.2, 0.0],
                            half_extents: [0.1, 0.3, 4.1],
                        },
                        WallSpec {
                            center: [2.6, 0.2, 0.0],
                            half_extents: [0.1, 0.3, 4.1],
                        },
                        WallSpec {
                            center: [0.0, 0.2, -4.1],
                            half_extents: [2.7, 0.3, 0.1],
                        },
                        WallSpec {
                            center: [0.0, 0.2, 4.1],
                            half_extents: [2.7, 0.3, 0.1],
                        },
                    ],
                    hazards: vec![],
                },
                HoleSpec {
                    par: 3,
                    start: [0.0, 0.1, 3.0],
                    cup: [1.5, 0.0, -3.0],
                    green_half_extents: [3.0, 4.0],
                    walls: vec![
                        WallSpec {
                            center: [-2.3, 0.2, 0.0],
                            half_extents: [0.1, 0.3, 4.1],
                        },
                        WallSpec {
                            center: [3.8, 0.2, 0.0],
                            half_extents: [0.1, 0.3, 4.1],
                        },
                        WallSpec {
                            center: [0.75, 0.2, -4.1],
                            half_extents: [3.2, 0.3, 0.1],
                        },
                        WallSpec {
                            center: [0.75, 0.2, 4.1],
                            half_extents: [3.2, 0.3, 0.1],
                        },
                        // bank obstacle beside the direct line
                        WallSpec {
                            center: [-1.0, 0.2, 0.0],
                            half_extents: [0.6, 0.3, 0.1],
                        },
                    ],
                    hazards: vec![],
                },
                HoleSpec {
                    par: 3,
                    start: [0.0, 0.1, 3.5],
                    cup: [0.0, 0.0, -3.5],
                    green_half_extents: [3.0, 4.5],
                    walls: vec![
                        WallSpec {
                            center: [-3.1, 0.2, 0.0],
                            half_extents: [0.1, 0.3, 4.6],
                        },
                        WallSpec {
                            center: [3.1, 0.2, 0.0],
                            half_extents: [0.1, 0.3, 4.6],
                        },
                        WallSpec {
                            center: [0.0, 0.2, -4.6],
                            half_extents: [3.2, 0.3, 0.1],
                        },
                        WallSpec {
                            center: [0.0, 0.2, 4.6],
                            half_extents: [3.2, 0.3, 0.1],
                        },
                    ],
                    // pond beside the fairway
                    hazards: vec![HazardSpec {
                        center: [1.8, 0.05, 0.0],
                        half_extents: [0.8, 0.1, 1.2],
                    }],
                },
            ],
        }
    }

    pub fn validate(&self) -> Result<(), GolfError> {
        if self.holes.is_empty() {
            return Err(GolfError::InvalidCourse("course has no holes".into()));
        }
        for (index, hole) in self.holes.iter().enumerate() {
            if hole.par == 0 {
                return Err(GolfError::InvalidCourse(format!(
                    "hole {index} has par 0"
                )));
            }
            if hole.green_half_extents.iter().any(|e| *e <= 0.0) {
                return Err(GolfError::InvalidCourse(format!(
                    "hole {index} has a degenerate green"
                )));
            }
            if hole.start == hole.cup {
                return Err(GolfError::InvalidCourse(format!(
                    "hole {index} starts inside its own cup"
                )));
            }
        }
        Ok(())
    }
}

struct BuiltHole {
    index: usize,
    handles: Vec<RigidBodyHandle>,
}

pub struct Course {
    spec: CourseSpec,
    built: Option<BuiltHole>,
}

impl Course {
    pub fn new(spec: CourseSpec) -> Result<Course, GolfError> {
        spec.validate()?;
        Ok(Course { spec, built: None })
    }

    pub fn from_json_str(raw: &str) -> Result<Course, GolfError> {
        let spec: CourseSpec = serde_json::from_str(raw)?;
        Course::new(spec)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn total_holes(&self) -> usize {
        self.spec.holes.len()
    }

    pub fn hole(&self, index: usize) -> Option<&HoleSpec> {
        let hole = self.spec.holes.get(index);
        if hole.is_none() {
            tracing::warn!(index, total = self.total_holes(), "no such hole");
        }
        hole
    }

    /// Index of the currently built hole, if any.
    pub fn built_hole(&self) -> Option<usize> {
        self.built.as_ref().map(|b| b.index)
    }

    /// Create the green, walls and hazard sensors for a hole. Any previously
    /// built hole is torn down first.
    pub fn build_hole(&mut self, physics: &mut PhysicsStepper, index: usize) -> Result<(), GolfError> {
        if self.built.is_some() {
            self.teardown_hole(physics);
        }
        let hole = self
            .spec
            .holes
            .get(index)
            .cloned()
            .ok_or(GolfError::NoSuchHole {
                index,
                total: self.spec.holes.len(),
            })?;

        let mut handles = Vec::new();
        let centre_x = (hole.start[0] + hole.cup[0]) * 0.5;
        let centre_z = (hole.start[2] + hole.cup[2]) * 0.5;

        // green slab with its top face at y = 0
        let body = RigidBodyBuilder::fixed()
            .translation(vector![centre_x, -GREEN_THICKNESS, centre_z])
            .build();
        let collider = physics.surface_collider(
            Surface::Green,
            ColliderBuilder::cuboid(
                hole.green_half_extents[0],
                GREEN_THICKNESS,
                hole.green_half_extents[1],
            ),
        );
        handles.push(physics.add_body(BodyRole::Green, "green", body, vec![collider]));

        for (i, wall) in hole.walls.iter().enumerate() {
            let body = RigidBodyBuilder::fixed()
                .translation(vector![wall.center[0], wall.center[1], wall.center[2]])
                .build();
            let collider = physics.surface_collider(
                Surface::Wall,
                ColliderBuilder::cuboid(
                    wall.half_extents[0],
                    wall.half_extents[1],
                    wall.half_extents[2],
                ),
            );
            handles.push(physics.add_body(BodyRole::Wall, &format!("wall-{i}"), body, vec![collider]));
        }

        for (i, hazard) in hole.hazards.iter().enumerate() {
            let body = RigidBodyBuilder::fixed()
                .translation(vector![hazard.center[0], hazard.center[1], hazard.center[2]])
                .build();
            let collider = physics.surface_collider(
                Surface::Hazard,
                ColliderBuilder::cuboid(
                    hazard.half_extents[0],
                    hazard.half_extents[1],
                    hazard.half_extents[2],
                )
                .sensor(true),
            );
            handles.push(physics.add_body(
                BodyRole::Hazard,
                &format!("hazard-{i}"),
                body,
                vec![collider],
            ));
        }

        tracing::info!(hole = index + 1, bodies = handles.len(), "built hole geometry");
        self.built = Some(BuiltHole { index, handles });
        Ok(())
    }

    /// Remove every body belonging to the built hole, each exactly once.
    pub fn teardown_hole(&mut self, physics: &mut PhysicsStepper) {
        if let Some(built) = self.built.take() {
            for handle in built.handles {
                physics.remove_body(handle);
            }
            tracing::debug!(hole = built.index + 1, "tore down hole geometry");
        }
    }
}
