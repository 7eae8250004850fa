pub mod event;
pub mod task;

pub use event::{Attacker, Event, EventKind, EventType};
pub use task::{AgentTask, ChatLine, StepStatus, TaskId, TaskResult, TaskStatus, TaskStep};

use serde::{Deserialize, Serialize};

pub type EntityId = u32;

/// Length of one in-game day in world ticks.
pub const DAY_LENGTH_TICKS: u64 = 24_000;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Unit vector on the horizontal plane pointing from `other` to `self`.
    /// Returns `None` when both points share the same column.
    pub fn horizontal_direction_from(&self, other: &Position) -> Option<(f64, f64)> {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        let len = (dx * dx + dz * dz).sqrt();
        if len < f64::EPSILON {
            return None;
        }
        Some((dx / len, dz / len))
    }

    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Position {
        Position::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn centroid(points: &[Position]) -> Option<Position> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy, sz) = points
            .iter()
            .fold((0.0, 0.0, 0.0), |(x, y, z), p| (x + p.x, y + p.y, z + p.z));
        Some(Position::new(sx / n, sy / n, sz / n))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Clear,
    Rain,
    Thunder,
}

impl Weather {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Clear => "clear",
            Weather::Rain => "rain",
            Weather::Thunder => "thunder",
        }
    }
}

/// Named bucket of the world clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePhase {
    Day,
    Sunset,
    Night,
    Sunrise,
}

impl TimePhase {
    pub fn from_clock(ticks: u64) -> Self {
        match ticks % DAY_LENGTH_TICKS {
            0..=11_999 => TimePhase::Day,
            12_000..=12_999 => TimePhase::Sunset,
            13_000..=22_999 => TimePhase::Night,
            _ => TimePhase::Sunrise,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePhase::Day => "day",
            TimePhase::Sunset => "sunset",
            TimePhase::Night => "night",
            TimePhase::Sunrise => "sunrise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Player,
    Hostile,
    Passive,
    Item,
}

/// Something alive (or dropped) near the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: EntityId,
    pub name: String,
    pub kind: ActorKind,
    pub position: Position,
    /// Horizontal facing in degrees, 0 = +z, 90 = -x (the usual block-game convention).
    #[serde(default)]
    pub yaw: Option<f64>,
}

impl Actor {
    pub fn new(id: EntityId, name: impl Into<String>, kind: ActorKind, position: Position) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            position,
            yaw: None,
        }
    }

    pub fn with_yaw(mut self, yaw: f64) -> Self {
        self.yaw = Some(yaw);
        self
    }

    /// Whether this actor's yaw points at `target` within `tolerance_deg`.
    pub fn is_facing(&self, target: &Position, tolerance_deg: f64) -> bool {
        let Some(yaw) = self.yaw else {
            return false;
        };
        let dx = target.x - self.position.x;
        let dz = target.z - self.position.z;
        if dx.abs() < f64::EPSILON && dz.abs() < f64::EPSILON {
            return false;
        }
        let wanted = (-dx).atan2(dz).to_degrees();
        let mut diff = (yaw - wanted) % 360.0;
        if diff > 180.0 {
            diff -= 360.0;
        } else if diff < -180.0 {
            diff += 360.0;
        }
        diff.abs() <= tolerance_deg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_phase_buckets() {
        assert_eq!(TimePhase::from_clock(0), TimePhase::Day);
        assert_eq!(TimePhase::from_clock(11_999), TimePhase::Day);
        assert_eq!(TimePhase::from_clock(12_000), TimePhase::Sunset);
        assert_eq!(TimePhase::from_clock(13_000), TimePhase::Night);
        assert_eq!(TimePhase::from_clock(23_500), TimePhase::Sunrise);
        assert_eq!(TimePhase::from_clock(24_000 + 500), TimePhase::Day);
    }

    #[test]
    fn test_distance_and_direction() {
        let a = Position::new(0.0, 64.0, 0.0);
        let b = Position::new(3.0, 64.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);

        let (dx, dz) = a.horizontal_direction_from(&b).unwrap();
        assert!((dx + 0.6).abs() < 1e-9);
        assert!((dz + 0.8).abs() < 1e-9);
        assert!(a.horizontal_direction_from(&a.offset(0.0, 3.0, 0.0)).is_none());
    }

    #[test]
    fn test_centroid() {
        let points = vec![
            Position::new(0.0, 0.0, 0.0),
            Position::new(2.0, 0.0, 0.0),
            Position::new(1.0, 0.0, 3.0),
        ];
        assert_eq!(Position::centroid(&points), Some(Position::new(1.0, 0.0, 1.0)));
        assert_eq!(Position::centroid(&[]), None);
    }

    #[test]
    fn test_actor_facing() {
        let agent = Position::new(0.0, 64.0, 5.0);
        let staring = Actor::new(1, "alex", ActorKind::Player, Position::new(0.0, 64.0, 0.0))
            .with_yaw(0.0);
        assert!(staring.is_facing(&agent, 20.0));

        let turned = staring.clone().with_yaw(180.0);
        assert!(!turned.is_facing(&agent, 20.0));

        let no_yaw = Actor::new(2, "steve", ActorKind::Player, Position::new(0.0, 64.0, 0.0));
        assert!(!no_yaw.is_facing(&agent, 20.0));
    }
}
