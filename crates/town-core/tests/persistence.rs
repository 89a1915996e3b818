//! Persistence tests
//!
//! A saved and resumed session continues exactly where it left off.

use tempfile::TempDir;
use town_core::events::{read_frames, FrameLogger};
use town_core::fixtures;
use town_core::generation::Capabilities;
use town_core::interventions::Command;
use town_core::{CommandOutcome, SessionSnapshot, SimError, Simulation};

fn simulation(dir: &TempDir) -> Simulation {
    Simulation::new(
        fixtures::town_grid(),
        &fixtures::neighbours(),
        fixtures::test_config(),
        Capabilities::offline(),
    )
    .unwrap()
    .with_sessions_dir(dir.path())
}

#[test]
fn test_resumed_session_matches_uninterrupted_run() {
    let dir = TempDir::new().unwrap();
    let mut sim = simulation(&dir);
    sim.run(5).unwrap();
    sim.save("midday").unwrap();
    let expected: Vec<_> = (0..5).map(|_| sim.step().unwrap()).collect();

    let snapshot = SessionSnapshot::load(dir.path(), "midday").unwrap();
    assert_eq!(snapshot.clock.step(), 5);
    let mut resumed = Simulation::from_snapshot(snapshot, Capabilities::offline()).unwrap();
    let actual: Vec<_> = (0..5).map(|_| resumed.step().unwrap()).collect();

    assert_eq!(expected, actual);
}

#[test]
fn test_resume_command_rewinds_the_session() {
    let dir = TempDir::new().unwrap();
    let mut sim = simulation(&dir);
    sim.run(3).unwrap();
    let saved = sim.apply(Command::Save { name: "early".into() }).unwrap();
    assert!(matches!(saved, CommandOutcome::Saved { .. }));
    sim.run(4).unwrap();
    assert_eq!(sim.clock().step(), 7);

    let outcome = sim.apply(Command::Resume { name: "early".into() }).unwrap();
    assert_eq!(outcome, CommandOutcome::Resumed { step: 3 });
    assert_eq!(sim.clock().step(), 3);
    assert_eq!(sim.agent_ids().len(), 2);
}

#[test]
fn test_missing_session_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = SessionSnapshot::load(dir.path(), "nowhere").unwrap_err();
    assert!(matches!(err, SimError::SessionNotFound(_)));
}

#[test]
fn test_frames_are_written_one_per_step() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frames.jsonl");
    let mut sim = simulation(&dir).with_frame_logger(FrameLogger::new(&path).unwrap());
    sim.run(4).unwrap();

    let frames = read_frames(&path).unwrap();
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[3].step, 3);
    assert!(frames[0].agent("ada").is_some());
}

#[test]
fn test_appending_logger_continues_the_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("frames.jsonl");
    let frames = town_events::fixtures::sample_frames();
    let (first, rest) = frames.split_at(2);

    let mut logger = FrameLogger::new(&path).unwrap();
    for frame in first {
        logger.log(frame).unwrap();
    }
    drop(logger);
    let mut logger = FrameLogger::append(&path).unwrap();
    for frame in rest {
        logger.log(frame).unwrap();
    }
    logger.flush().unwrap();

    assert_eq!(read_frames(&path).unwrap(), frames);
}
