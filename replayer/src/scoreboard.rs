//! Scoreboard files written when a game ends.
//!
//! Each finished game appends `user_name:score` to the file of its game
//! mode. The file is append-only; two replays must not write the same
//! scoreboard at the same time.

use shared::GameMode;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Destination for final scores.
pub trait Scoreboard {
    fn record(&mut self, mode: GameMode, user_name: &str, score: i64) -> io::Result<()>;
}

pub fn file_name(mode: GameMode) -> &'static str {
    match mode {
        GameMode::Static => "score_static.txt",
        GameMode::Moving => "score_moving.txt",
    }
}

pub fn scoreboard_line(user_name: &str, score: i64) -> String {
    format!("{}:{}", user_name, score)
}

/// Appends to `score_static.txt` / `score_moving.txt` in a directory.
#[derive(Debug, Clone)]
pub struct FileScoreboard {
    dir: PathBuf,
}

impl FileScoreboard {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, mode: GameMode) -> PathBuf {
        self.dir.join(file_name(mode))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Scoreboard for FileScoreboard {
    fn record(&mut self, mode: GameMode, user_name: &str, score: i64) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(mode))?;
        writeln!(file, "{}", scoreboard_line(user_name, score))
    }
}

/// A recorded final score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub mode: GameMode,
    pub user_name: String,
    pub score: i64,
}

/// Keeps scores in memory. Lets tests replay without touching disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryScoreboard {
    pub entries: Vec<ScoreEntry>,
}

impl MemoryScoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines as they would appear in the file for `mode`.
    pub fn lines(&self, mode: GameMode) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.mode == mode)
            .map(|e| scoreboard_line(&e.user_name, e.score))
            .collect()
    }
}

impl Scoreboard for MemoryScoreboard {
    fn record(&mut self, mode: GameMode, user_name: &str, score: i64) -> io::Result<()> {
        self.entries.push(ScoreEntry {
            mode,
            user_name: user_name.to_string(),
            score,
        });
        Ok(())
    }
}

/// Drops every score. Used when replaying only to aggregate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardScoreboard;

impl Scoreboard for DiscardScoreboard {
    fn record(&mut self, _mode: GameMode, _user_name: &str, _score: i64) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_scoreboard_partitions_by_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut board = FileScoreboard::new(dir.path().join("Scoreboard"));

        board.record(GameMode::Static, "alice", 1200).unwrap();
        board.record(GameMode::Moving, "bob", 900).unwrap();
        board.record(GameMode::Static, "carol", -50).unwrap();

        let static_scores = std::fs::read_to_string(board.path(GameMode::Static)).unwrap();
        let moving_scores = std::fs::read_to_string(board.path(GameMode::Moving)).unwrap();
        assert_eq!(static_scores, "alice:1200\ncarol:-50\n");
        assert_eq!(moving_scores, "bob:900\n");
    }

    #[test]
    fn test_memory_scoreboard_lines() {
        let mut board = MemoryScoreboard::new();
        board.record(GameMode::Moving, "dave", 10).unwrap();
        board.record(GameMode::Static, "erin", 20).unwrap();

        assert_eq!(board.lines(GameMode::Moving), vec!["dave:10"]);
        assert_eq!(board.lines(GameMode::Static), vec!["erin:20"]);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name(GameMode::Static), "score_static.txt");
        assert_eq!(file_name(GameMode::Moving), "score_moving.txt");
    }
}
