//! World collaborator contracts.
//!
//! The protocol client and its world cache live outside Kiln. The agent sees
//! them through two traits:
//!
//! - [`World`]: point-in-time, read-only queries (position, health, entities,
//!   blocks, inventory). Answers reflect the current tick's snapshot only.
//! - [`Body`]: low-level controls that are cheap and instantaneous (chat,
//!   jumping, looking around). Anything long-running goes through
//!   [`Skills`](crate::skill::Skills) and the action executor instead.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A position or direction in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn minus(&self, other: Vec3) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance_to(&self, other: Vec3) -> f64 {
        self.minus(other).length()
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len == 0.0 {
            *self
        } else {
            Self::new(self.x / len, self.y / len, self.z / len)
        }
    }

    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

/// Broad entity category reported by the protocol client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Mob,
    Animal,
    Object,
    Other,
}

/// Snapshot of a nearby entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Protocol entity id
    pub id: u64,
    /// Type name, e.g. `zombie`, `item`, `arrow`
    pub name: String,
    /// Username for players
    pub username: Option<String>,
    pub kind: EntityKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub height: f64,
    /// Hostile mob (zombie, skeleton, ...)
    pub hostile: bool,
    /// Animal worth hunting for food
    pub huntable: bool,
    pub is_baby: bool,
}

impl Entity {
    /// Name to show in chat: the username for players, the type otherwise.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.name)
    }
}

/// Snapshot of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub position: Vec3,
}

impl Block {
    pub fn air(position: Vec3) -> Self {
        Self {
            name: "air".to_string(),
            position,
        }
    }
}

/// Weather at the agent's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    Clear,
    Rain,
    Thunder,
}

/// Most recent health loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageEvent {
    pub at: Instant,
    pub amount: f32,
}

/// Derives [`DamageEvent`]s from a stream of health updates.
///
/// World implementations feed every health packet through
/// [`observe`](Self::observe) and report [`last`](Self::last) from
/// [`World::last_damage`].
#[derive(Debug, Clone, Default)]
pub struct DamageTracker {
    previous_health: Option<f32>,
    last: Option<DamageEvent>,
}

impl DamageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, health: f32, now: Instant) {
        if let Some(previous) = self.previous_health {
            if health < previous {
                self.last = Some(DamageEvent {
                    at: now,
                    amount: previous - health,
                });
            }
        }
        self.previous_health = Some(health);
    }

    pub fn last(&self) -> Option<DamageEvent> {
        self.last
    }
}

/// Read-only view of the world around the agent.
#[async_trait]
pub trait World: Send + Sync {
    fn position(&self) -> Vec3;

    fn health(&self) -> f32;

    fn food(&self) -> f32;

    fn last_damage(&self) -> Option<DamageEvent>;

    /// Block at a position, `None` when the chunk is not loaded.
    fn block_at(&self, position: Vec3) -> Option<Block>;

    /// Nearest block with the given name within `max_distance`.
    fn nearest_block(&self, name: &str, max_distance: f64) -> Option<Block>;

    /// Nearest entity (other than the agent) within `max_distance` matching `filter`.
    fn nearest_entity(&self, max_distance: f64, filter: &dyn Fn(&Entity) -> bool) -> Option<Entity>;

    fn nearby_player_names(&self) -> Vec<String>;

    fn nearby_entity_types(&self) -> Vec<String>;

    fn nearby_block_types(&self) -> Vec<String>;

    fn inventory_counts(&self) -> BTreeMap<String, u32>;

    /// Items that can be crafted from the current inventory.
    fn craftable_items(&self) -> Vec<String>;

    fn game_mode(&self) -> String;

    /// Ticks into the day, 0..24000.
    fn time_of_day(&self) -> u32;

    fn weather(&self) -> Weather;

    fn biome(&self) -> String;

    /// Whether the surroundings are dark enough to want a torch.
    fn should_place_torch(&self) -> bool;

    /// Whether a walkable path to the entity exists. May hit the pathfinder.
    async fn is_clear_path(&self, target: &Entity) -> bool;
}

/// Direct, instantaneous body controls.
pub trait Body: Send + Sync {
    /// Send a public chat line.
    fn chat(&self, message: &str);

    fn set_jump(&self, on: bool);

    /// Release every movement key.
    fn clear_control_states(&self);

    /// Drop any pathfinding goal left behind by a finished action.
    fn stop_pathing(&self);

    fn has_path_goal(&self) -> bool;

    fn look_at(&self, target: Vec3);

    fn look(&self, yaw: f32, pitch: f32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_vec3_math() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance_to(b), 5.0);
        assert_eq!(b.normalize(), Vec3::new(0.6, 0.8, 0.0));
        assert_eq!(a.normalize(), a);
        assert_eq!(b.dot(Vec3::new(1.0, 0.0, 0.0)), 3.0);
        assert_eq!(a.offset(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_damage_tracker() {
        let mut tracker = DamageTracker::new();
        let start = Instant::now();
        tracker.observe(20.0, start);
        assert!(tracker.last().is_none());

        tracker.observe(20.0, start + Duration::from_millis(100));
        assert!(tracker.last().is_none());

        let hit = start + Duration::from_millis(200);
        tracker.observe(14.0, hit);
        let damage = tracker.last().unwrap();
        assert_eq!(damage.amount, 6.0);
        assert_eq!(damage.at, hit);

        // Healing keeps the last damage event.
        tracker.observe(16.0, hit + Duration::from_secs(1));
        assert_eq!(tracker.last().unwrap().at, hit);
    }

    #[test]
    fn test_display_name() {
        let mut entity = Entity {
            id: 1,
            name: "player".to_string(),
            username: Some("Bob".to_string()),
            kind: EntityKind::Player,
            position: Vec3::default(),
            velocity: Vec3::default(),
            height: 1.8,
            hostile: false,
            huntable: false,
            is_baby: false,
        };
        assert_eq!(entity.display_name(), "Bob");
        entity.username = None;
        assert_eq!(entity.display_name(), "player");
    }
}
