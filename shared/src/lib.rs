//! Telemetry protocol shared by the ingestion server and the log replayer.
//!
//! The mobile application streams one JSON object per game event. Every
//! object ends with a `messageEnd` field whose closing text doubles as the
//! message boundary on the wire ([`SENTINEL`]). The server persists each
//! message as one line of a session log; the replayer decodes those lines
//! back into [`TelemetryEvent`]s.

use serde::{Deserialize, Serialize};

pub mod framing;
pub mod log_format;

/// Literal text terminating every wire message.
pub const SENTINEL: &str = "\"messageEnd\":\"split_by_this_message_end\"}";

/// Value of the `messageEnd` field the sender appends to each message.
pub const MESSAGE_END_VALUE: &str = "split_by_this_message_end";

/// A point or position in the AR scene, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Plain 3D Euclidean distance.
    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Pose of the device or of a game object as reported by the application.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub rotation_x: f64,
    pub rotation_y: f64,
    pub rotation_z: f64,
}

impl Pose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position_x: position.x,
            position_y: position.y,
            position_z: position.z,
            ..Self::default()
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.position_x, self.position_y, self.position_z)
    }
}

/// Game counters attached to most events.
///
/// The application serializes `minutes` and `seconds` as floats and the
/// counters as integers; everything is read as `f64` and truncated by the
/// consumer where an integer is needed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameStateSnapshot {
    pub score: f64,
    pub num_checkpoints: f64,
    pub minutes: f64,
    pub seconds: f64,
}

/// The `type` tag of a telemetry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Registration,
    Camera,
    Line,
    Goal,
    Checkpoint,
    // The application really does send the truncated name.
    #[serde(rename = "SPOTLIGH_OBJ")]
    SpotlightObject,
    LookawaySucc,
    LookawayFail,
    #[serde(rename = "STOP_OBJ")]
    StopObject,
    StopSucc,
    StopFail,
    #[serde(rename = "DODGE_OBJ")]
    DodgeObject,
    DodgeFail,
    MovingObject,
    Static,
    Moving,
    OutOfRoad,
    Hint,
    End,
    /// Any tag this version does not know about.
    #[serde(other)]
    Unknown,
}

/// Which variant of the driving game a session is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Track with static objects.
    Static,
    /// Track with a single moving obstacle.
    Moving,
}

impl GameMode {
    pub fn from_kind(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Static => Some(GameMode::Static),
            EventKind::Moving => Some(GameMode::Moving),
            _ => None,
        }
    }
}

/// One decoded telemetry message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj: Option<Pose>,
    #[serde(
        default,
        rename = "gameState",
        skip_serializing_if = "Option::is_none"
    )]
    pub game_state: Option<GameStateSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line: Vec<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_timestamp_s: Option<String>,
}

impl TelemetryEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            user_name: None,
            obj: None,
            game_state: None,
            line: Vec::new(),
            current_timestamp_s: None,
        }
    }

    pub fn registration(user_name: &str) -> Self {
        Self::new(EventKind::Registration).with_user(user_name)
    }

    pub fn with_user(mut self, user_name: &str) -> Self {
        self.user_name = Some(user_name.to_string());
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.obj = Some(Pose::at(position));
        self
    }

    pub fn with_game_state(mut self, game_state: GameStateSnapshot) -> Self {
        self.game_state = Some(game_state);
        self
    }

    pub fn with_line(mut self, line: Vec<Vec3>) -> Self {
        self.line = line;
        self
    }

    /// Decodes a single JSON object. Unknown fields, including the trailing
    /// `messageEnd`, are ignored.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Position carried by `obj`, if any.
    pub fn position(&self) -> Option<Vec3> {
        self.obj.as_ref().map(Pose::position)
    }

    pub fn is_registration(&self) -> bool {
        self.kind == EventKind::Registration
    }

    /// Serializes the event the way the application puts it on the wire:
    /// a JSON object whose last field is `messageEnd`, so the text ends with
    /// [`SENTINEL`].
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        let body = serde_json::to_string(self)?;
        let body = body.strip_suffix('}').unwrap_or(&body);
        let separator = if body.len() > 1 { "," } else { "" };
        Ok(format!("{}{}{}", body, separator, SENTINEL))
    }
}
