//! Headless frame driver: runs a full round with a minimal putting bot and
//! prints the scorecard. Stands in for the real render loop so the core can
//! be exercised end-to-end without a window.

use std::cell::Cell;
use std::rc::Rc;

use minigolf_core::{payload, CourseSpec, EventType, Game, GameConfig, ProgressionPhase};
use serde_json::json;

const FRAME_DT: f32 = 1.0 / 60.0;
/// Upper bound on simulated frames (ten minutes of play).
const MAX_FRAMES: u32 = 60 * 60 * 10;
/// Frames the ball must stay at rest before the bot putts again.
const SETTLE_FRAMES: u32 = 30;

fn main() {
    tracing_subscriber::fmt::init();

    let config = GameConfig::default();
    if let Err(error) = config.validate() {
        eprintln!("Invalid game configuration: {error}");
        std::process::exit(1);
    }

    let course = course_from_env_or_default();
    let mut game = match Game::new(config, course) {
        Ok(game) => game,
        Err(error) => {
            eprintln!("Failed to set up game: {error}");
            std::process::exit(1);
        }
    };

    let continue_requested = Rc::new(Cell::new(false));
    let flag = continue_requested.clone();
    game.bus().subscribe(
        EventType::UiContinueRequested,
        Some("HeadlessDriver"),
        move |_| {
            flag.set(true);
            Ok(())
        },
    );
    game.bus().subscribe_many(
        &[
            EventType::GameStarted,
            EventType::HoleStarted,
            EventType::BallInHole,
            EventType::HoleCompleted,
            EventType::HazardDetected,
            EventType::GameCompleted,
        ],
        Some("HeadlessDriver"),
        |event| {
            tracing::info!(event = %event.event_type, "event");
            Ok(())
        },
    );

    if let Err(error) = game.start() {
        eprintln!("Failed to start round: {error}");
        std::process::exit(1);
    }

    let mut settled_frames = 0u32;
    for _ in 0..MAX_FRAMES {
        game.update(FRAME_DT);

        match game.phase() {
            ProgressionPhase::RoundCompleted => break,
            ProgressionPhase::HoleCompleted => {
                if continue_requested.get() {
                    continue_requested.set(false);
                    game.bus().publish(
                        EventType::UiContinueConfirmed,
                        payload(json!({})),
                        Some("HeadlessDriver"),
                    );
                    game.next_hole();
                    settled_frames = 0;
                }
            }
            ProgressionPhase::ActiveHole => {
                if game.ball_at_rest() {
                    settled_frames += 1;
                } else {
                    settled_frames = 0;
                }
                if settled_frames >= SETTLE_FRAMES {
                    putt(&mut game);
                    settled_frames = 0;
                }
            }
        }
    }

    print_scorecard(&game);
}

/// Aim straight at the cup with power proportional to the remaining
/// distance; repeated putts converge on the hole.
fn putt(game: &mut Game) {
    let Some(ball) = game.ball_position() else {
        return;
    };
    let Some(hole) = game.hole_spec(game.current_hole()) else {
        return;
    };
    let cup = hole.cup_point();
    let mut direction = cup - ball;
    direction.y = 0.0;
    let distance = direction.norm();
    if distance < 1e-3 {
        return;
    }

    game.bus().publish(
        EventType::InputAim,
        payload(json!({"direction": [direction.x, 0.0, direction.z]})),
        Some("HeadlessDriver"),
    );
    let power = (distance * 1.5).min(10.0);
    game.hit_ball(direction, power);
}

fn print_scorecard(game: &Game) {
    println!();
    println!("=== {} ===", game.course_name());
    for score in game.breakdown() {
        println!(
            "Hole {:>2}  par {}  strokes {}",
            score.hole, score.par, score.strokes
        );
    }
    println!("Total strokes: {}", game.total_strokes());
}

fn course_from_env_or_default() -> CourseSpec {
    match std::env::var("MINIGOLF_COURSE") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).unwrap_or_else(|error| {
                eprintln!("Failed to read course file {path}: {error}");
                std::process::exit(1);
            });
            serde_json::from_str(&raw).unwrap_or_else(|error| {
                eprintln!("Failed to parse course file {path}: {error}");
                std::process::exit(1);
            })
        }
        Err(_) => CourseSpec::default_course(),
    }
}
