use crate::player::Player;
use shared::{hits_pipe, passed_pipe, Course, GRAVITY, PLAYER_RADIUS, PLAY_BOTTOM, RUN_SPEED};

/// Result of advancing one player by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Flying,
    /// Hit the ground or a pipe; the player has already been sent back to the start
    Crashed,
    /// Cleared every pipe and reached the finish line
    Finished,
}

/// Advances a player by exactly one fixed tick against `course`.
///
/// Order matters: move, clamp, then per pipe check collision before scoring
/// so a tick that touches a pipe never also scores it.
pub fn step_player(player: &mut Player, course: &Course) -> StepOutcome {
    player.x += RUN_SPEED;

    // Semi-implicit Euler
    player.vy += GRAVITY;
    player.y += player.vy;

    if player.y - PLAYER_RADIUS < 0.0 {
        player.y = PLAYER_RADIUS;
        player.vy = 0.0;
    }

    if player.y + PLAYER_RADIUS > PLAY_BOTTOM {
        player.reset_round(course.start_x);
        return StepOutcome::Crashed;
    }

    for pipe in &course.pipes {
        if hits_pipe(player.x, player.y, PLAYER_RADIUS, pipe) {
            player.reset_round(course.start_x);
            return StepOutcome::Crashed;
        }
        if passed_pipe(player.x, pipe) {
            player.mark_scored(pipe.seq);
        }
    }

    if player.progress >= course.required_progress() && player.x >= course.finish_x {
        StepOutcome::Finished
    } else {
        StepOutcome::Flying
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Pipe, START_X, START_Y};

    fn course_with(pipes: Vec<Pipe>, finish_x: f32) -> Course {
        Course {
            pipes,
            start_x: START_X,
            finish_x,
        }
    }

    fn wide_gap(seq: u32, x: f32) -> Pipe {
        Pipe {
            seq,
            x,
            top: 100.0,
            bottom: 420.0,
        }
    }

    #[test]
    fn test_gravity_and_run_speed() {
        let course = course_with(vec![], 10_000.0);
        let mut player = Player::new(1, "Ann".to_string(), false);

        assert_eq!(step_player(&mut player, &course), StepOutcome::Flying);
        assert_approx_eq!(player.x, START_X + RUN_SPEED, 1e-3);
        assert_approx_eq!(player.vy, GRAVITY, 1e-3);
        assert_approx_eq!(player.y, START_Y + GRAVITY, 1e-3);

        step_player(&mut player, &course);
        assert_approx_eq!(player.vy, 2.0 * GRAVITY, 1e-3);
        assert_approx_eq!(player.y, START_Y + 3.0 * GRAVITY, 1e-3);
    }

    #[test]
    fn test_ceiling_clamps_and_zeroes_velocity() {
        let course = course_with(vec![], 10_000.0);
        let mut player = Player::new(1, "Ann".to_string(), false);
        player.y = PLAYER_RADIUS + 1.0;
        player.vy = -10.0;

        assert_eq!(step_player(&mut player, &course), StepOutcome::Flying);
        assert_eq!(player.y, PLAYER_RADIUS);
        assert_eq!(player.vy, 0.0);
    }

    #[test]
    fn test_ground_crash_resets_player() {
        let course = course_with(vec![], 10_000.0);
        let mut player = Player::new(1, "Ann".to_string(), false);
        player.x = 800.0;
        player.y = PLAY_BOTTOM - PLAYER_RADIUS;
        player.vy = 5.0;
        player.mark_scored(0);

        assert_eq!(step_player(&mut player, &course), StepOutcome::Crashed);
        assert_eq!(player.x, START_X);
        assert_eq!(player.y, START_Y);
        assert_eq!(player.vy, 0.0);
        assert_eq!(player.progress, 0);
    }

    #[test]
    fn test_pipe_collision_crashes() {
        let pipe = Pipe {
            seq: 0,
            x: 300.0,
            top: 250.0,
            bottom: 410.0,
        };
        let course = course_with(vec![pipe], 10_000.0);
        let mut player = Player::new(1, "Ann".to_string(), false);
        player.x = pipe.leading_edge() - 1.0;
        player.y = 120.0;

        assert_eq!(step_player(&mut player, &course), StepOutcome::Crashed);
        assert_eq!(player.x, START_X);
    }

    #[test]
    fn test_collision_wins_over_scoring_on_boundary() {
        let pipe = Pipe {
            seq: 0,
            x: 300.0,
            top: 250.0,
            bottom: 410.0,
        };
        let course = course_with(vec![pipe], 10_000.0);
        let mut player = Player::new(1, "Ann".to_string(), false);
        // Lands exactly on the trailing edge outside the gap
        player.x = pipe.trailing_edge() - RUN_SPEED;
        player.y = 100.0;

        assert_eq!(step_player(&mut player, &course), StepOutcome::Crashed);
        assert_eq!(player.progress, 0);
        assert!(!player.has_scored(0));
    }

    #[test]
    fn test_scoring_happens_once() {
        let pipe = wide_gap(0, 300.0);
        let course = course_with(vec![pipe], 10_000.0);
        let mut player = Player::new(1, "Ann".to_string(), false);
        player.x = pipe.trailing_edge() - 1.0;

        step_player(&mut player, &course);
        assert_eq!(player.progress, 1);

        for _ in 0..10 {
            player.vy = 0.0;
            step_player(&mut player, &course);
        }
        assert_eq!(player.progress, 1);
    }

    #[test]
    fn test_finish_requires_full_progress() {
        let pipes = vec![wide_gap(0, 300.0), wide_gap(1, 560.0)];
        let course = course_with(pipes, 800.0);
        let mut player = Player::new(1, "Ann".to_string(), false);
        player.mark_scored(0);
        player.mark_scored(1);
        player.progress = 1;
        player.x = 900.0;

        assert_eq!(step_player(&mut player, &course), StepOutcome::Flying);
        assert_eq!(player.progress, 1);
    }

    #[test]
    fn test_finish_with_full_progress() {
        let pipes = vec![wide_gap(0, 300.0)];
        let course = course_with(pipes, 500.0);
        let mut player = Player::new(1, "Ann".to_string(), false);
        player.mark_scored(0);
        player.x = 500.0 - RUN_SPEED;

        assert_eq!(step_player(&mut player, &course), StepOutcome::Finished);
    }
}
