//! Obstacle course generation
//!
//! The layout is fixed (evenly spaced pipes after a run-up) while each gap's
//! vertical position is drawn from the supplied random source. Callers pass
//! any `rand::Rng`, so tests can seed it and check structure without caring
//! about exact values.

use rand::Rng;
use shared::{
    Course, Pipe, FINISH_OFFSET, FIRST_PIPE_OFFSET, GAP_MARGIN, PIPE_GAP, PIPE_SPACING,
    PLAY_BOTTOM, START_X,
};

/// Lowest and highest allowed gap centers.
///
/// Keeps the whole gap plus `GAP_MARGIN` inside the playable band, above
/// the ground.
pub fn gap_center_bounds() -> (f32, f32) {
    let half_gap = PIPE_GAP / 2.0;
    (GAP_MARGIN + half_gap, PLAY_BOTTOM - GAP_MARGIN - half_gap)
}

pub fn generate_course<R: Rng + ?Sized>(rng: &mut R, pipe_count: u32) -> Course {
    let (min_center, max_center) = gap_center_bounds();
    let half_gap = PIPE_GAP / 2.0;

    let pipes: Vec<Pipe> = (0..pipe_count)
        .map(|seq| {
            let center = rng.gen_range(min_center..=max_center);
            Pipe {
                seq,
                x: START_X + FIRST_PIPE_OFFSET + seq as f32 * PIPE_SPACING,
                top: center - half_gap,
                bottom: center + half_gap,
            }
        })
        .collect();

    let finish_x = match pipes.last() {
        Some(last) => last.trailing_edge() + FINISH_OFFSET,
        None => START_X + FIRST_PIPE_OFFSET,
    };

    Course {
        pipes,
        start_x: START_X,
        finish_x,
    }
}
