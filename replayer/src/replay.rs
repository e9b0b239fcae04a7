//! Single-pass fold of a session log into derived game state.
//!
//! Events are applied in file order. The fold tracks the live objects of
//! each kind, the running score and penalties, and the trajectories needed
//! for plotting. `END` closes the game and nothing after it is consumed.

use crate::error::{ReplayError, ReplayResult};
use crate::registry::{EntityKind, EntityRegistry};
use crate::scoreboard::Scoreboard;
use log::{debug, info, warn};
use serde::Serialize;
use shared::framing;
use shared::log_format::decode_line;
use shared::{EventKind, GameMode, TelemetryEvent, Vec3};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Points deducted for a failed spotlight, stop or dodge.
pub const FAILURE_PENALTY: i64 = 100;
/// Points deducted every time the car leaves the road.
pub const OUT_OF_ROAD_PENALTY: i64 = 50;

/// Score movement caused by a single event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreChange {
    pub line: usize,
    pub kind: EventKind,
    pub delta: f64,
}

/// Per-outcome counters of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OutcomeTally {
    pub checkpoints: u32,
    pub lookaway_success: u32,
    pub lookaway_fail: u32,
    pub stop_success: u32,
    pub stop_fail: u32,
    pub collisions: u32,
    pub out_of_road: u32,
    pub hints: u32,
}

impl OutcomeTally {
    fn count(&mut self, kind: EventKind) {
        let counter = match kind {
            EventKind::Checkpoint => &mut self.checkpoints,
            EventKind::LookawaySucc => &mut self.lookaway_success,
            EventKind::LookawayFail => &mut self.lookaway_fail,
            EventKind::StopSucc => &mut self.stop_success,
            EventKind::StopFail => &mut self.stop_fail,
            EventKind::DodgeFail => &mut self.collisions,
            EventKind::OutOfRoad => &mut self.out_of_road,
            EventKind::Hint => &mut self.hints,
            _ => return,
        };
        *counter += 1;
    }
}

/// An entity removed from the registry and the event that removed it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedEntity {
    pub line: usize,
    pub entity: EntityKind,
    pub event: EventKind,
    pub position: Vec3,
}

/// Paths recorded during a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trajectories {
    /// Every camera position, in order.
    pub camera: Vec<Vec3>,
    /// The most recent road polyline.
    pub road: Vec<Vec3>,
    /// Moving obstacle positions (moving games only).
    pub moving_object: Vec<Vec3>,
    /// Hint arrows shown (static games only).
    pub hints: Vec<Vec3>,
}

/// Final state of one game, fixed once `END` has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSession {
    pub mode: GameMode,
    pub user_name: String,
    pub score: i64,
    pub num_checkpoints: u32,
    pub minutes: u32,
    pub seconds: u32,
    /// Points lost to failures and leaving the road.
    pub penalty: i64,
    pub tally: OutcomeTally,
    pub trajectories: Trajectories,
}

impl GameSession {
    pub fn elapsed_seconds(&self) -> u32 {
        self.minutes * 60 + self.seconds
    }
}

/// Running state of a replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fold {
    /// Mode announced by the last `STATIC`/`MOVING` event. `None` until the
    /// game has started.
    pub mode: Option<GameMode>,
    pub camera: Option<Vec3>,
    pub registry: EntityRegistry,
    pub moving_object: Option<Vec3>,
    /// Last score observed in a `gameState`.
    pub score: f64,
    pub penalty: i64,
    pub tally: OutcomeTally,
    pub trajectories: Trajectories,
    pub resolved: Vec<ResolvedEntity>,
    pub score_changes: Vec<ScoreChange>,
    pub session: Option<GameSession>,
    /// Events applied, ignored kinds included.
    pub events: usize,
    /// Lines and fragments that could not be decoded.
    pub skipped: usize,
}

impl Fold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_some()
    }

    /// Whether a game mode has been announced yet.
    pub fn has_started(&self) -> bool {
        self.mode.is_some()
    }

    /// Like [`Fold::apply_line`] for a line read as raw bytes. A line that is
    /// not valid UTF-8 is skipped and counted.
    pub fn apply_raw_line(
        &mut self,
        line: usize,
        bytes: &[u8],
        scoreboard: &mut dyn Scoreboard,
    ) -> ReplayResult<()> {
        match framing::decode_text(bytes) {
            Ok(text) => self.apply_line(line, text, scoreboard),
            Err(e) => {
                warn!("Skipping line {}: {}", line, e);
                self.skipped += 1;
                Ok(())
            }
        }
    }

    /// Decodes one physical log line and applies every event on it.
    pub fn apply_line(
        &mut self,
        line: usize,
        text: &str,
        scoreboard: &mut dyn Scoreboard,
    ) -> ReplayResult<()> {
        let text = text.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return Ok(());
        }

        for fragment in decode_line(text) {
            if self.is_closed() {
                break;
            }
            match fragment {
                Ok(event) => self.apply(&event, line, scoreboard)?,
                Err(e) => {
                    warn!("Skipping undecodable fragment on line {}: {}", line, e);
                    self.skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Applies a single event. Events after `END` are ignored.
    pub fn apply(
        &mut self,
        event: &TelemetryEvent,
        line: usize,
        scoreboard: &mut dyn Scoreboard,
    ) -> ReplayResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.events += 1;

        match event.kind {
            EventKind::Static | EventKind::Moving => {
                let mode = GameMode::from_kind(event.kind);
                if !self.has_started() {
                    debug!("Line {}: game started in {:?} mode", line, mode);
                }
                self.mode = mode;
            }
            EventKind::Camera => match event.position() {
                Some(position) => {
                    self.camera = Some(position);
                    self.trajectories.camera.push(position);
                }
                None => debug!("Line {}: CAMERA without position", line),
            },
            EventKind::Goal
            | EventKind::SpotlightObject
            | EventKind::StopObject
            | EventKind::DodgeObject => {
                let position = event.position().ok_or(ReplayError::MissingPosition {
                    line,
                    kind: event.kind,
                })?;
                if let Some(entity) = EntityKind::introduced_by(event.kind) {
                    self.registry.insert(entity, position);
                }
            }
            EventKind::Checkpoint | EventKind::LookawaySucc | EventKind::StopSucc => {
                self.resolve(event, line)?;
                if let Some(game_state) = &event.game_state {
                    self.score_changes.push(ScoreChange {
                        line,
                        kind: event.kind,
                        delta: game_state.score - self.score,
                    });
                }
            }
            EventKind::LookawayFail | EventKind::StopFail | EventKind::DodgeFail => {
                self.resolve(event, line)?;
                self.penalize(event.kind, line, FAILURE_PENALTY);
            }
            EventKind::OutOfRoad => self.penalize(event.kind, line, OUT_OF_ROAD_PENALTY),
            EventKind::Hint => {
                if self.mode == Some(GameMode::Static) {
                    if let Some(position) = event.position() {
                        self.trajectories.hints.push(position);
                    }
                    self.tally.count(event.kind);
                }
            }
            EventKind::Line => self.trajectories.road = event.line.clone(),
            EventKind::MovingObject => {
                if self.mode == Some(GameMode::Moving) {
                    if let Some(position) = event.position() {
                        self.moving_object = Some(position);
                        self.trajectories.moving_object.push(position);
                    }
                }
            }
            EventKind::End => self.close(event, line, scoreboard)?,
            EventKind::Registration | EventKind::Unknown => {}
        }

        if let Some(game_state) = &event.game_state {
            self.score = game_state.score;
        }
        Ok(())
    }

    fn resolve(&mut self, event: &TelemetryEvent, line: usize) -> ReplayResult<()> {
        let Some(entity) = EntityKind::resolved_by(event.kind) else {
            return Ok(());
        };
        let query = event
            .position()
            .or(self.camera)
            .ok_or(ReplayError::MissingPosition {
                line,
                kind: event.kind,
            })?;
        let position = self
            .registry
            .resolve_nearest(entity, query)
            .ok_or(ReplayError::Integrity {
                line,
                kind: event.kind,
                entity,
            })?;

        self.resolved.push(ResolvedEntity {
            line,
            entity,
            event: event.kind,
            position,
        });
        self.tally.count(event.kind);
        Ok(())
    }

    fn penalize(&mut self, kind: EventKind, line: usize, points: i64) {
        self.penalty += points;
        if kind == EventKind::OutOfRoad {
            self.tally.count(kind);
        }
        self.score_changes.push(ScoreChange {
            line,
            kind,
            delta: -(points as f64),
        });
    }

    fn close(
        &mut self,
        event: &TelemetryEvent,
        line: usize,
        scoreboard: &mut dyn Scoreboard,
    ) -> ReplayResult<()> {
        let mode = self.mode.ok_or(ReplayError::MissingGameMode { line })?;
        let user_name = event
            .user_name
            .clone()
            .ok_or(ReplayError::MissingUserName { line })?;
        let game_state = event.game_state.unwrap_or_default();

        let session = GameSession {
            mode,
            user_name,
            score: game_state.score as i64,
            num_checkpoints: game_state.num_checkpoints as u32,
            minutes: game_state.minutes as u32,
            seconds: game_state.seconds as u32,
            penalty: self.penalty,
            tally: self.tally,
            trajectories: self.trajectories.clone(),
        };

        scoreboard
            .record(session.mode, &session.user_name, session.score)
            .map_err(ReplayError::Scoreboard)?;
        info!(
            "{} finished a {:?} game with {} points in {:02}:{:02}",
            session.user_name, session.mode, session.score, session.minutes, session.seconds
        );
        self.session = Some(session);
        Ok(())
    }
}

/// Replays in-memory log lines. Line indexes are 0-based.
pub fn replay_lines<I, S>(lines: I, scoreboard: &mut dyn Scoreboard) -> ReplayResult<Fold>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut fold = Fold::new();
    for (index, line) in lines.into_iter().enumerate() {
        fold.apply_line(index, line.as_ref(), scoreboard)?;
        if fold.is_closed() {
            break;
        }
    }
    Ok(fold)
}

/// Replays a session log file.
pub fn replay_file(path: &Path, scoreboard: &mut dyn Scoreboard) -> ReplayResult<Fold> {
    let io_error = |source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_error)?);

    let mut fold = Fold::new();
    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(io_error)?;
        fold.apply_raw_line(index, &line, scoreboard)?;
        if fold.is_closed() {
            break;
        }
    }

    debug!(
        "Replayed {}: {} events, {} skipped",
        path.display(),
        fold.events,
        fold.skipped
    );
    Ok(fold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoreboard::MemoryScoreboard;
    use assert_approx_eq::assert_approx_eq;
    use shared::GameStateSnapshot;

    fn state(score: f64, minutes: f64, seconds: f64) -> GameStateSnapshot {
        GameStateSnapshot {
            score,
            num_checkpoints: 0.0,
            minutes,
            seconds,
        }
    }

    fn json(event: &TelemetryEvent) -> String {
        serde_json::to_string(event).unwrap()
    }

    fn at(kind: EventKind, x: f64, z: f64) -> TelemetryEvent {
        TelemetryEvent::new(kind).with_position(Vec3::new(x, 0.0, z))
    }

    #[test]
    fn test_goal_and_checkpoint_on_one_line() {
        let goal = at(EventKind::Goal, 1.0, 2.0);
        let checkpoint = at(EventKind::Checkpoint, 1.1, 2.0).with_game_state(state(100.0, 0.0, 5.0));
        let line = format!("{}{}", json(&goal), json(&checkpoint));

        let mut board = MemoryScoreboard::new();
        let fold = replay_lines([line], &mut board).unwrap();

        assert_eq!(fold.registry.len(EntityKind::Checkpoint), 0);
        assert_eq!(fold.resolved.len(), 1);
        assert_eq!(fold.resolved[0].entity, EntityKind::Checkpoint);
        assert_eq!(fold.resolved[0].position, Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(fold.tally.checkpoints, 1);
        assert_approx_eq!(fold.score_changes[0].delta, 100.0, 1e-9);
    }

    #[test]
    fn test_resolution_without_live_entity_names_line_and_kind() {
        let lines = vec![
            json(&TelemetryEvent::new(EventKind::Static)),
            json(&at(EventKind::Camera, 0.0, 0.0)),
            json(&at(EventKind::StopFail, 0.0, 1.0)),
        ];

        let err = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap_err();

        match err {
            ReplayError::Integrity { line, kind, entity } => {
                assert_eq!(line, 2);
                assert_eq!(kind, EventKind::StopFail);
                assert_eq!(entity, EntityKind::StopSign);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_penalties_accumulate() {
        let lines = vec![
            json(&TelemetryEvent::new(EventKind::Static)),
            json(&at(EventKind::SpotlightObject, 0.0, 5.0)),
            json(&at(EventKind::DodgeObject, 2.0, 8.0)),
            json(&at(EventKind::LookawayFail, 0.0, 4.5)),
            json(&at(EventKind::DodgeFail, 2.0, 7.9)),
            json(&TelemetryEvent::new(EventKind::OutOfRoad)),
        ];

        let fold = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap();

        assert_eq!(fold.penalty, 2 * FAILURE_PENALTY + OUT_OF_ROAD_PENALTY);
        assert_eq!(fold.tally.lookaway_fail, 1);
        assert_eq!(fold.tally.collisions, 1);
        assert_eq!(fold.tally.out_of_road, 1);
        assert_eq!(fold.registry.total(), 0);
    }

    #[test]
    fn test_resolution_falls_back_to_camera() {
        let lines = vec![
            json(&at(EventKind::Goal, 0.0, 0.0)),
            json(&at(EventKind::Goal, 10.0, 0.0)),
            json(&at(EventKind::Camera, 9.0, 0.0)),
            json(&TelemetryEvent::new(EventKind::Checkpoint)),
        ];

        let fold = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap();

        assert_eq!(fold.resolved[0].position, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(fold.registry.live(EntityKind::Checkpoint), &[Vec3::default()]);
    }

    #[test]
    fn test_resolution_without_any_position_fails() {
        let lines = vec![
            json(&at(EventKind::Goal, 0.0, 0.0)),
            json(&TelemetryEvent::new(EventKind::Checkpoint)),
        ];

        let err = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap_err();

        assert!(matches!(
            err,
            ReplayError::MissingPosition {
                line: 1,
                kind: EventKind::Checkpoint
            }
        ));
    }

    #[test]
    fn test_line_replaces_road() {
        let first = TelemetryEvent::new(EventKind::Line)
            .with_line(vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)]);
        let second = TelemetryEvent::new(EventKind::Line).with_line(vec![Vec3::new(0.0, 0.0, 2.0)]);

        let fold = replay_lines([json(&first), json(&second)], &mut MemoryScoreboard::new()).unwrap();

        assert_eq!(fold.trajectories.road, vec![Vec3::new(0.0, 0.0, 2.0)]);
    }

    #[test]
    fn test_moving_object_only_tracked_in_moving_games() {
        let lines = vec![
            json(&TelemetryEvent::new(EventKind::Static)),
            json(&at(EventKind::MovingObject, 1.0, 1.0)),
            json(&at(EventKind::Hint, 0.5, 0.5)),
            json(&TelemetryEvent::new(EventKind::Moving)),
            json(&at(EventKind::MovingObject, 2.0, 2.0)),
            json(&at(EventKind::Hint, 0.7, 0.7)),
        ];

        let fold = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap();

        assert_eq!(fold.moving_object, Some(Vec3::new(2.0, 0.0, 2.0)));
        assert_eq!(fold.trajectories.moving_object, vec![Vec3::new(2.0, 0.0, 2.0)]);
        assert_eq!(fold.trajectories.hints, vec![Vec3::new(0.5, 0.0, 0.5)]);
        assert_eq!(fold.tally.hints, 1);
    }

    #[test]
    fn test_end_closes_session_and_writes_scoreboard() {
        let end = TelemetryEvent::new(EventKind::End)
            .with_user("alice")
            .with_game_state(GameStateSnapshot {
                score: 1234.0,
                num_checkpoints: 7.0,
                minutes: 2.0,
                seconds: 31.9,
            });
        let after = at(EventKind::Goal, 0.0, 0.0);
        let lines = vec![
            json(&TelemetryEvent::new(EventKind::Moving)),
            json(&TelemetryEvent::new(EventKind::OutOfRoad)),
            json(&end),
            json(&after),
        ];

        let mut board = MemoryScoreboard::new();
        let fold = replay_lines(&lines, &mut board).unwrap();

        let session = fold.session.as_ref().unwrap();
        assert_eq!(session.mode, GameMode::Moving);
        assert_eq!(session.user_name, "alice");
        assert_eq!(session.score, 1234);
        assert_eq!(session.num_checkpoints, 7);
        assert_eq!((session.minutes, session.seconds), (2, 31));
        assert_eq!(session.elapsed_seconds(), 151);
        assert_eq!(session.penalty, OUT_OF_ROAD_PENALTY);
        assert_eq!(board.lines(GameMode::Moving), vec!["alice:1234"]);
        assert!(board.lines(GameMode::Static).is_empty());
        // Nothing after END is applied.
        assert_eq!(fold.registry.total(), 0);
        assert_eq!(fold.events, 3);
    }

    #[test]
    fn test_end_requires_mode_and_user() {
        let end = TelemetryEvent::new(EventKind::End).with_user("bob");
        let err = replay_lines([json(&end)], &mut MemoryScoreboard::new()).unwrap_err();
        assert!(matches!(err, ReplayError::MissingGameMode { line: 0 }));

        let lines = vec![
            json(&TelemetryEvent::new(EventKind::Static)),
            json(&TelemetryEvent::new(EventKind::End)),
        ];
        let err = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap_err();
        assert!(matches!(err, ReplayError::MissingUserName { line: 1 }));
    }

    #[test]
    fn test_unknown_and_registration_ignored() {
        let lines = vec![
            json(&TelemetryEvent::registration("carol")),
            r#"{"type":"FIREWORKS","obj":{"position_x":1}}"#.to_string(),
        ];

        let fold = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap();

        assert_eq!(fold.events, 2);
        assert_eq!(fold.registry.total(), 0);
        assert!(fold.score_changes.is_empty());
    }

    #[test]
    fn test_malformed_fragment_is_skipped() {
        let lines = vec![
            "{\"type\":\"GOAL\",\"obj\":".to_string(),
            String::new(),
            json(&at(EventKind::Goal, 3.0, 3.0)),
        ];

        let fold = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap();

        assert_eq!(fold.skipped, 1);
        assert_eq!(fold.registry.len(EntityKind::Checkpoint), 1);
    }

    #[test]
    fn test_line_with_invalid_utf8_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.txt");
        let mut bytes = json(&TelemetryEvent::new(EventKind::Static)).into_bytes();
        bytes.extend_from_slice(b"\n{\"type\":\"CAMERA\",\"user_name\":\"\xff\"}\n");
        bytes.extend_from_slice(
            json(&TelemetryEvent::new(EventKind::End).with_user("erin")).as_bytes(),
        );
        bytes.push(b'\n');
        std::fs::write(&path, bytes).unwrap();

        let mut board = MemoryScoreboard::new();
        let fold = replay_file(&path, &mut board).unwrap();

        assert_eq!(fold.skipped, 1);
        assert!(fold.is_closed());
        assert!(fold.trajectories.camera.is_empty());
        assert_eq!(board.lines(GameMode::Static), vec!["erin:0"]);
    }

    #[test]
    fn test_started_follows_first_mode_event() {
        let mut fold = Fold::new();
        let mut board = MemoryScoreboard::new();
        fold.apply(&TelemetryEvent::new(EventKind::Camera), 0, &mut board)
            .unwrap();
        assert!(!fold.has_started());

        fold.apply(&TelemetryEvent::new(EventKind::Moving), 1, &mut board)
            .unwrap();
        assert!(fold.has_started());
        assert_eq!(fold.mode, Some(GameMode::Moving));
    }

    #[test]
    fn test_success_delta_uses_last_observed_score() {
        let lines = vec![
            json(&at(EventKind::Camera, 0.0, 0.0).with_game_state(state(300.0, 0.0, 1.0))),
            json(&at(EventKind::StopObject, 0.0, 3.0)),
            json(&at(EventKind::StopSucc, 0.0, 3.0).with_game_state(state(450.0, 0.0, 2.0))),
            json(&at(EventKind::Camera, 0.0, 4.0).with_game_state(state(450.0, 0.0, 3.0))),
        ];

        let fold = replay_lines(&lines, &mut MemoryScoreboard::new()).unwrap();

        assert_eq!(fold.score_changes.len(), 1);
        assert_approx_eq!(fold.score_changes[0].delta, 150.0, 1e-9);
        assert_approx_eq!(fold.score, 450.0, 1e-9);
        assert_eq!(fold.tally.stop_success, 1);
    }

    #[test]
    fn test_replaying_twice_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.txt");
        let lines = [
            json(&TelemetryEvent::registration("dave")),
            json(&TelemetryEvent::new(EventKind::Static)),
            format!(
                "{}{}",
                json(&at(EventKind::Goal, 1.0, 1.0)),
                json(&at(EventKind::Goal, 4.0, 1.0))
            ),
            json(&at(EventKind::Checkpoint, 3.5, 1.0).with_game_state(state(50.0, 0.0, 9.0))),
            json(
                &TelemetryEvent::new(EventKind::End)
                    .with_user("dave")
                    .with_game_state(state(50.0, 1.0, 4.0)),
            ),
        ];
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let mut first_board = MemoryScoreboard::new();
        let mut second_board = MemoryScoreboard::new();
        let first = replay_file(&path, &mut first_board).unwrap();
        let second = replay_file(&path, &mut second_board).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_board.entries, second_board.entries);
        assert_eq!(first.registry.live(EntityKind::Checkpoint), &[Vec3::new(1.0, 0.0, 1.0)]);
    }

    #[test]
    fn test_replay_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = replay_file(&dir.path().join("nope.txt"), &mut MemoryScoreboard::new()).unwrap_err();
        assert!(matches!(err, ReplayError::Io { .. }));
    }
}
