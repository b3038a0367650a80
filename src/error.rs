use thiserror::Error;

/// Failures raised while constructing or loading core game state.
///
/// Runtime faults (listener errors, simulation blow-ups, invalid transition
/// requests) are deliberately *not* represented here: those are contained in
/// their subsystem and reported through logging and the event bus instead of
/// propagating as `Err`.
#[derive(Debug, Error)]
pub enum GolfError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid course definition: {0}")]
    InvalidCourse(String),

    #[error("failed to parse course definition: {0}")]
    CourseParse(#[from] serde_json::Error),

    #[error("no hole at index {index} (course has {total})")]
    NoSuchHole { index: usize, total: usize },
}
