//! # Event Log Replayer Library
//!
//! Reads the session logs written by the ingestion server and folds them
//! back into game state for scoring and plotting.
//!
//! ## Core Responsibilities
//!
//! ### Log Decoding
//! Each log line normally holds one JSON object, but older logs contain
//! several objects glued together as `}{`. Lines are re-split on that
//! boundary before decoding. Fragments that do not decode are skipped and
//! counted, never fatal.
//!
//! ### Event Folding
//! Events are applied in file order to a [`replay::Fold`]. Introduction
//! events (`GOAL`, `SPOTLIGH_OBJ`, `STOP_OBJ`, `DODGE_OBJ`) add an object to
//! the [`registry::EntityRegistry`]; outcome events remove the nearest live
//! object of the matching kind. Failures and leaving the road cost fixed
//! penalties. `END` closes the game and records the final score.
//!
//! ### Study Aggregation
//! The [`aggregate`] module replays every participant's runs and averages
//! collisions, stop and spotlight outcomes, time and estimated distance per
//! game mode.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! - Entity kinds and the events that create or resolve them
//! - Nearest-neighbour resolution
//!
//! ### Replay Module (`replay`)
//! - The fold and its derived session state
//! - File and in-memory replay entry points
//!
//! ### Scoreboard Module (`scoreboard`)
//! - File, in-memory and discarding scoreboards behind one trait
//!
//! ### Aggregate Module (`aggregate`)
//! - Run discovery, per-mode averages, trajectory export
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use replayer::replay::replay_file;
//! use replayer::scoreboard::FileScoreboard;
//! use std::path::Path;
//!
//! let mut scoreboard = FileScoreboard::new("Scoreboard");
//! let fold = replay_file(Path::new("Monitorization/alice/0.txt"), &mut scoreboard)?;
//! if let Some(session) = fold.session {
//!     println!("{} scored {}", session.user_name, session.score);
//! }
//! # Ok::<(), replayer::error::ReplayError>(())
//! ```

pub mod aggregate;
pub mod error;
pub mod registry;
pub mod replay;
pub mod scoreboard;
