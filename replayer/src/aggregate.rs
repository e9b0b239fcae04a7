//! Study-level statistics over every participant's runs.
//!
//! Logs are expected at `<root>/<participant>/<run>.txt`, participants
//! numbered consecutively from `first_participant`, runs from 0.

use crate::error::{ConfigurationError, ReplayError, ReplayResult};
use crate::replay::{replay_file, GameSession};
use crate::scoreboard::DiscardScoreboard;
use log::info;
use serde::Serialize;
use shared::{GameMode, Vec3};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

/// Score points per meter of distance to the target.
pub const POINTS_PER_METER: f64 = 1500.0;
/// Expected distance in meters to the line, or to the car in-game.
pub const TARGET_DISTANCE: f64 = 1.0;
/// Real distance to the moving car, which sits 0.4 m further away.
pub const REAL_MOVING_DISTANCE: f64 = 1.4;

/// Where the run logs of a study live and how many there are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyLayout {
    pub root: PathBuf,
    pub first_participant: u32,
    pub participants: u32,
    pub runs: u32,
}

/// One run log found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLog {
    pub participant: u32,
    pub run: u32,
    pub path: PathBuf,
}

impl StudyLayout {
    pub fn new(root: impl Into<PathBuf>, first_participant: u32, participants: u32, runs: u32) -> Self {
        Self {
            root: root.into(),
            first_participant,
            participants,
            runs,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.participants == 0 {
            return Err(ConfigurationError::NoParticipants);
        }
        if self.runs == 0 {
            return Err(ConfigurationError::NoRuns);
        }
        Ok(())
    }

    /// Games each participant plays per mode. Runs alternate between the
    /// two modes, so their count must be even.
    pub fn games_per_mode(&self) -> Result<u32, ConfigurationError> {
        self.validate()?;
        if self.runs % 2 != 0 {
            return Err(ConfigurationError::OddRuns { runs: self.runs });
        }
        Ok(self.runs / 2)
    }

    pub fn participant_range(&self) -> Range<u32> {
        self.first_participant..self.first_participant + self.participants
    }

    pub fn run_path(&self, participant: u32, run: u32) -> PathBuf {
        self.root
            .join(participant.to_string())
            .join(format!("{}.txt", run))
    }

    /// Lists every expected run log. All of them must exist.
    pub fn discover(&self) -> Result<Vec<RunLog>, ConfigurationError> {
        self.validate()?;

        let mut logs = Vec::with_capacity((self.participants * self.runs) as usize);
        for participant in self.participant_range() {
            for run in 0..self.runs {
                let path = self.run_path(participant, run);
                if !path.is_file() {
                    return Err(ConfigurationError::MissingRun { path });
                }
                logs.push(RunLog {
                    participant,
                    run,
                    path,
                });
            }
        }
        Ok(logs)
    }
}

/// A run log together with the game it contains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyRun {
    pub log: RunLog,
    pub session: GameSession,
}

/// Replays every run of the study. Scoreboards are left untouched.
pub fn replay_study(layout: &StudyLayout) -> ReplayResult<Vec<StudyRun>> {
    let logs = layout.discover()?;
    let mut runs = Vec::with_capacity(logs.len());

    for log in logs {
        let fold = replay_file(&log.path, &mut DiscardScoreboard)?;
        let session = fold.session.ok_or_else(|| ReplayError::Unfinished {
            path: log.path.clone(),
        })?;
        runs.push(StudyRun { log, session });
    }

    info!(
        "Replayed {} runs from {}",
        runs.len(),
        layout.root.display()
    );
    Ok(runs)
}

/// How far the participant kept from the target, estimated from the score.
///
/// The game awards points in proportion to the distance kept, so the raw
/// points earned (final score plus everything deducted, elapsed seconds
/// included) map back to meters.
pub fn distance_estimate(session: &GameSession, offset: f64) -> f64 {
    let earned = session.score + session.penalty + i64::from(session.elapsed_seconds());
    (offset - earned as f64 / POINTS_PER_METER).abs()
}

/// Sums over every game of one mode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ConditionTotals {
    pub sessions: u32,
    pub collisions: u32,
    pub stop_success: u32,
    pub stop_fail: u32,
    pub lookaway_success: u32,
    pub lookaway_fail: u32,
    pub out_of_road: u32,
    pub elapsed_seconds: u64,
    pub distance: f64,
    pub real_distance: f64,
}

impl ConditionTotals {
    pub fn add(&mut self, session: &GameSession) {
        let tally = &session.tally;
        self.sessions += 1;
        self.collisions += tally.collisions;
        self.stop_success += tally.stop_success;
        self.stop_fail += tally.stop_fail;
        self.lookaway_success += tally.lookaway_success;
        self.lookaway_fail += tally.lookaway_fail;
        self.out_of_road += tally.out_of_road;
        self.elapsed_seconds += u64::from(session.elapsed_seconds());
        self.distance += distance_estimate(session, TARGET_DISTANCE);
        if session.mode == GameMode::Moving {
            self.real_distance += distance_estimate(session, REAL_MOVING_DISTANCE);
        }
    }

    fn average(&self, mode: GameMode, participants: u32) -> ConditionAverages {
        let n = f64::from(participants);
        let per = |count: u32| f64::from(count) / n;
        ConditionAverages {
            mode,
            sessions: self.sessions,
            elapsed_seconds: self.elapsed_seconds as f64 / n,
            collisions: per(self.collisions),
            stop_success: per(self.stop_success),
            stop_fail: per(self.stop_fail),
            lookaway_success: per(self.lookaway_success),
            lookaway_fail: per(self.lookaway_fail),
            out_of_road: per(self.out_of_road),
            distance: self.distance / n,
            real_distance: (mode == GameMode::Moving).then(|| self.real_distance / n),
        }
    }
}

/// Per-participant averages for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConditionAverages {
    pub mode: GameMode,
    pub sessions: u32,
    pub elapsed_seconds: f64,
    pub collisions: f64,
    pub stop_success: f64,
    pub stop_fail: f64,
    pub lookaway_success: f64,
    pub lookaway_fail: f64,
    pub out_of_road: f64,
    /// Distance to the line (static) or in-game distance to the car (moving).
    pub distance: f64,
    /// Real distance to the car, moving games only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_distance: Option<f64>,
}

impl fmt::Display for ConditionAverages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = (self.elapsed_seconds / 60.0).floor();
        let seconds = self.elapsed_seconds - minutes * 60.0;
        writeln!(f, "{:?} games ({} sessions):", self.mode, self.sessions)?;
        writeln!(f, "  Time: {:02}:{:05.2}", minutes as u64, seconds)?;
        writeln!(f, "  Collisions: {:.1}%", self.collisions * 100.0)?;
        writeln!(
            f,
            "  Stop success: {:.1}%, stop fail: {:.1}%",
            self.stop_success * 100.0,
            self.stop_fail * 100.0
        )?;
        writeln!(
            f,
            "  Spotlight deflect success: {:.1}%, fail: {:.1}%",
            self.lookaway_success * 100.0,
            self.lookaway_fail * 100.0
        )?;
        writeln!(f, "  Out of road: {:.2}", self.out_of_road)?;
        match self.real_distance {
            Some(real) => {
                writeln!(f, "  Real avg distance to the car: {:.3} m", real)?;
                write!(f, "  Game avg distance to the car: {:.3} m", self.distance)
            }
            None => write!(f, "  Avg distance to the line: {:.3} m", self.distance),
        }
    }
}

/// Averages of both conditions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StudySummary {
    pub participants: u32,
    pub static_games: ConditionAverages,
    pub moving_games: ConditionAverages,
}

impl fmt::Display for StudySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.static_games)?;
        write!(f, "{}", self.moving_games)
    }
}

/// Averages finished games per participant.
///
/// Every participant must have played `runs / 2` games of each mode; totals
/// are then divided by the number of participants.
pub fn summarize(runs: &[StudyRun], layout: &StudyLayout) -> Result<StudySummary, ConfigurationError> {
    let expected = layout.games_per_mode()?;
    let participants = layout.participant_range();

    let mut played: HashMap<(u32, GameMode), u32> = HashMap::new();
    let mut static_totals = ConditionTotals::default();
    let mut moving_totals = ConditionTotals::default();
    for run in runs {
        let participant = run.log.participant;
        if !participants.contains(&participant) {
            return Err(ConfigurationError::UnknownParticipant { participant });
        }
        *played.entry((participant, run.session.mode)).or_default() += 1;
        match run.session.mode {
            GameMode::Static => static_totals.add(&run.session),
            GameMode::Moving => moving_totals.add(&run.session),
        }
    }

    for participant in participants {
        for mode in [GameMode::Static, GameMode::Moving] {
            let found = played.get(&(participant, mode)).copied().unwrap_or(0);
            if found != expected {
                return Err(ConfigurationError::SessionCount {
                    participant,
                    mode,
                    expected,
                    found,
                });
            }
        }
    }

    Ok(StudySummary {
        participants: layout.participants,
        static_games: static_totals.average(GameMode::Static, layout.participants),
        moving_games: moving_totals.average(GameMode::Moving, layout.participants),
    })
}

/// Replays the study and averages it.
pub fn aggregate(layout: &StudyLayout) -> ReplayResult<StudySummary> {
    layout.games_per_mode()?;
    let runs = replay_study(layout)?;
    let summary = summarize(&runs, layout)?;
    Ok(summary)
}

/// Paths of one run, ready for plotting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTrajectory {
    pub participant: u32,
    pub run: u32,
    pub mode: GameMode,
    pub camera: Vec<Vec3>,
    pub road: Vec<Vec3>,
    pub moving_object: Vec<Vec3>,
}

impl From<StudyRun> for RunTrajectory {
    fn from(run: StudyRun) -> Self {
        let trajectories = run.session.trajectories;
        Self {
            participant: run.log.participant,
            run: run.log.run,
            mode: run.session.mode,
            camera: trajectories.camera,
            road: trajectories.road,
            moving_object: trajectories.moving_object,
        }
    }
}

pub fn trajectories(layout: &StudyLayout) -> ReplayResult<Vec<RunTrajectory>> {
    Ok(replay_study(layout)?
        .into_iter()
        .map(RunTrajectory::from)
        .collect())
}
