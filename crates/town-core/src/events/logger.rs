//! Frame Logger
//!
//! Append-only JSONL log of step frames, one frame per line.

use bevy_ecs::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use town_events::StepFrame;
use tracing::warn;

/// Resource for logging frames to a JSONL file
#[derive(Resource)]
pub struct FrameLogger {
    writer: Option<BufWriter<File>>,
    frame_count: u64,
}

impl FrameLogger {
    /// Create a new frame logger writing to the specified path
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::with_file(file))
    }

    /// Continue an existing log, e.g. after resuming a session
    pub fn append(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_file(file))
    }

    fn with_file(file: File) -> Self {
        Self {
            writer: Some(BufWriter::new(file)),
            frame_count: 0,
        }
    }

    /// Create a logger that discards frames (for testing)
    pub fn null() -> Self {
        Self {
            writer: None,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn log(&mut self, frame: &StepFrame) -> std::io::Result<()> {
        self.frame_count += 1;
        if let Some(ref mut writer) = self.writer {
            let json = frame.to_json()?;
            writeln!(writer, "{}", json)?;
        }
        Ok(())
    }

    /// Flush the buffer to disk
    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for FrameLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush frame logger: {}", e);
        }
    }
}

/// Reads every frame back from a JSONL log.
pub fn read_frames(path: impl AsRef<Path>) -> std::io::Result<Vec<StepFrame>> {
    let reader = BufReader::new(File::open(path)?);
    let mut frames = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        frames.push(StepFrame::from_json(&line)?);
    }
    Ok(frames)
}
