//! Determinism tests
//!
//! Identical inputs must produce identical runs.

use town_core::fixtures;
use town_core::generation::Capabilities;
use town_core::Simulation;
use town_events::StepFrame;

fn run(seed: u64, steps: usize) -> Vec<StepFrame> {
    let mut config = fixtures::test_config();
    config.clock.seed = seed;
    let mut sim = Simulation::new(
        fixtures::town_grid(),
        &fixtures::neighbours(),
        config,
        Capabilities::offline(),
    )
    .unwrap();
    (0..steps).map(|_| sim.step().unwrap()).collect()
}

#[test]
fn test_same_seed_same_frames() {
    let a = run(7, 30);
    let b = run(7, 30);
    assert_eq!(a.len(), 30);
    assert_eq!(a, b);
}

#[test]
fn test_frames_are_numbered_by_step() {
    let frames = run(11, 5);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.step, i as u64);
        assert_eq!(frame.agents.len(), 2);
    }
    assert!(frames[1].time > frames[0].time);
}
