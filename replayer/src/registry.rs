//! Live game objects, keyed by kind.

use serde::Serialize;
use shared::{EventKind, Vec3};
use std::collections::HashMap;
use std::fmt;

/// The four kinds of objects the game places on the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Passage point, introduced by `GOAL`
    Checkpoint,
    /// Introduced by `SPOTLIGH_OBJ`
    Spotlight,
    /// Introduced by `STOP_OBJ`
    StopSign,
    /// Introduced by `DODGE_OBJ`
    Obstacle,
}

impl EntityKind {
    /// The registry an introduction event adds to.
    pub fn introduced_by(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Goal => Some(EntityKind::Checkpoint),
            EventKind::SpotlightObject => Some(EntityKind::Spotlight),
            EventKind::StopObject => Some(EntityKind::StopSign),
            EventKind::DodgeObject => Some(EntityKind::Obstacle),
            _ => None,
        }
    }

    /// The registry a resolution event removes from.
    pub fn resolved_by(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Checkpoint => Some(EntityKind::Checkpoint),
            EventKind::LookawaySucc | EventKind::LookawayFail => Some(EntityKind::Spotlight),
            EventKind::StopSucc | EventKind::StopFail => Some(EntityKind::StopSign),
            EventKind::DodgeFail => Some(EntityKind::Obstacle),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Checkpoint => "checkpoint",
            EntityKind::Spotlight => "spotlight",
            EntityKind::StopSign => "stop sign",
            EntityKind::Obstacle => "obstacle",
        };
        write!(f, "{}", name)
    }
}

/// Positions of every live object, in introduction order per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityRegistry {
    live: HashMap<EntityKind, Vec<Vec3>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, position: Vec3) {
        self.live.entry(kind).or_default().push(position);
    }

    pub fn live(&self, kind: EntityKind) -> &[Vec3] {
        self.live.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.live(kind).len()
    }

    pub fn total(&self) -> usize {
        self.live.values().map(Vec::len).sum()
    }

    /// Index of the live entity closest to `query`. On equal distances the
    /// earlier introduced entity wins.
    pub fn nearest(&self, kind: EntityKind, query: Vec3) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, position) in self.live(kind).iter().enumerate() {
            let distance = position.distance(&query);
            match best {
                Some((_, best_distance)) if best_distance <= distance => {}
                _ => best = Some((index, distance)),
            }
        }
        best.map(|(index, _)| index)
    }

    /// Removes and returns the live entity closest to `query`, or `None`
    /// when nothing of that kind is live.
    pub fn resolve_nearest(&mut self, kind: EntityKind, query: Vec3) -> Option<Vec3> {
        let index = self.nearest(kind, query)?;
        self.live.get_mut(&kind).map(|positions| positions.remove(index))
    }
}
