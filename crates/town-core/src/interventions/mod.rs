//! Control Commands
//!
//! Intents applied to a running simulation between steps: advance, save,
//! resume, inject memories, whisper. A command file holds one JSON command per
//! line.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;
use crate::setup::SeedMemory;

/// Memories to add to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryBatch {
    pub agent: String,
    pub memories: Vec<SeedMemory>,
}

/// A control intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Run this many steps
    Advance { steps: u64 },
    /// Save the session under a name
    Save { name: String },
    /// Replace the running session with a saved one
    Resume { name: String },
    /// Add memories to agents, as observed now
    InjectMemories { batches: Vec<MemoryBatch> },
    /// Give one agent an inner thought
    Whisper { agent: String, text: String },
}

/// What applying a command did.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Advanced { steps: u64 },
    Saved { path: PathBuf },
    Resumed { step: u64 },
    Injected { memories: usize },
    Whispered { node: String },
}

/// Parses a JSONL command file. Blank lines and `#` comments are skipped.
pub fn load_commands(path: &Path) -> Result<Vec<Command>, ConfigurationError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            serde_json::from_str(line).map_err(|source| ConfigurationError::Json {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let cmd: Command =
            serde_json::from_str(r#"{"type": "whisper", "agent": "ada", "text": "Bo is hosting a party"}"#)
                .unwrap();
        assert_eq!(
            cmd,
            Command::Whisper {
                agent: "ada".into(),
                text: "Bo is hosting a party".into()
            }
        );

        let cmd: Command = serde_json::from_str(
            r#"{"type": "inject_memories", "batches": [{"agent": "bo", "memories": [{"description": "the cafe is closed"}]}]}"#,
        )
        .unwrap();
        let Command::InjectMemories { batches } = cmd else {
            panic!("expected inject_memories");
        };
        assert_eq!(batches[0].memories[0].description, "the cafe is closed");
    }

    #[test]
    fn test_load_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.jsonl");
        fs::write(
            &path,
            "# morning\n{\"type\": \"advance\", \"steps\": 3}\n\n{\"type\": \"save\", \"name\": \"noon\"}\n",
        )
        .unwrap();
        let commands = load_commands(&path).unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Advance { steps: 3 },
                Command::Save { name: "noon".into() }
            ]
        );
    }

    #[test]
    fn test_bad_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.jsonl");
        fs::write(&path, "{\"type\": \"teleport\"}\n").unwrap();
        assert!(matches!(load_commands(&path), Err(ConfigurationError::Json { .. })));
    }
}
