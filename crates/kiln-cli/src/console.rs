//! Offline collaborators for driving an agent from a terminal.
//!
//! The world is a fixed snapshot, chat goes to stdout and skills only log
//! what they would do. Useful for exercising prompts and commands without a
//! game server.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kiln_core::{Block, Body, DamageEvent, Entity, SkillResult, Skills, Vec3, Weather, World};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How long a simulated skill takes.
const SKILL_DURATION: Duration = Duration::from_millis(500);

pub struct ConsoleWorld;

#[async_trait]
impl World for ConsoleWorld {
    fn position(&self) -> Vec3 {
        Vec3::new(0.0, 64.0, 0.0)
    }

    fn health(&self) -> f32 {
        20.0
    }

    fn food(&self) -> f32 {
        20.0
    }

    fn last_damage(&self) -> Option<DamageEvent> {
        None
    }

    fn block_at(&self, position: Vec3) -> Option<Block> {
        Some(Block::air(position))
    }

    fn nearest_block(&self, _name: &str, _max_distance: f64) -> Option<Block> {
        None
    }

    fn nearest_entity(&self, _max_distance: f64, _filter: &dyn Fn(&Entity) -> bool) -> Option<Entity> {
        None
    }

    fn nearby_player_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn nearby_entity_types(&self) -> Vec<String> {
        Vec::new()
    }

    fn nearby_block_types(&self) -> Vec<String> {
        vec!["grass_block".to_string(), "dirt".to_string()]
    }

    fn inventory_counts(&self) -> BTreeMap<String, u32> {
        BTreeMap::new()
    }

    fn craftable_items(&self) -> Vec<String> {
        Vec::new()
    }

    fn game_mode(&self) -> String {
        "survival".to_string()
    }

    fn time_of_day(&self) -> u32 {
        6000
    }

    fn weather(&self) -> Weather {
        Weather::Clear
    }

    fn biome(&self) -> String {
        "plains".to_string()
    }

    fn should_place_torch(&self) -> bool {
        false
    }

    async fn is_clear_path(&self, _target: &Entity) -> bool {
        true
    }
}

/// Prints chat lines as `<name> message`.
pub struct ConsoleBody {
    name: String,
}

impl ConsoleBody {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Body for ConsoleBody {
    fn chat(&self, message: &str) {
        println!("<{}> {}", self.name, message);
    }

    fn set_jump(&self, _on: bool) {}

    fn clear_control_states(&self) {}

    fn stop_pathing(&self) {}

    fn has_path_goal(&self) -> bool {
        false
    }

    fn look_at(&self, _target: Vec3) {}

    fn look(&self, _yaw: f32, _pitch: f32) {}
}

/// Logs each skill and pretends to work for a moment.
pub struct ConsoleSkills;

impl ConsoleSkills {
    async fn pretend(&self, what: String, cancel: &CancellationToken) -> SkillResult {
        info!(skill = %what, "Simulating skill");
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            _ = tokio::time::sleep(SKILL_DURATION) => Ok(Some(format!("Simulated {}.", what))),
        }
    }

    async fn until_cancelled(&self, what: String, cancel: &CancellationToken) -> SkillResult {
        info!(skill = %what, "Simulating skill until stopped");
        cancel.cancelled().await;
        Ok(None)
    }
}

#[async_trait]
impl Skills for ConsoleSkills {
    async fn move_away(&self, distance: f64, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("moving {} blocks away", distance), cancel).await
    }

    async fn go_to_position(&self, target: Vec3, _closeness: f64, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("walking to {:.1} {:.1} {:.1}", target.x, target.y, target.z), cancel)
            .await
    }

    async fn go_to_player(&self, player: &str, _closeness: f64, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("walking to {}", player), cancel).await
    }

    async fn follow_player(&self, player: &str, _distance: f64, cancel: &CancellationToken) -> SkillResult {
        self.until_cancelled(format!("following {}", player), cancel).await
    }

    async fn avoid_enemies(&self, distance: f64, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("running {} blocks from enemies", distance), cancel).await
    }

    async fn defend_self(&self, _range: f64, cancel: &CancellationToken) -> SkillResult {
        self.pretend("fighting back".to_string(), cancel).await
    }

    async fn dodge(&self, projectile: &Entity, _distance: f64, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("dodging {}", projectile.name), cancel).await
    }

    async fn attack_entity(&self, target: &Entity, _kill: bool, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("attacking {}", target.display_name()), cancel).await
    }

    async fn attack_nearest(&self, entity_type: &str, _kill: bool, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("attacking the nearest {}", entity_type), cancel).await
    }

    async fn pickup_nearby_items(&self, cancel: &CancellationToken) -> SkillResult {
        self.pretend("picking up items".to_string(), cancel).await
    }

    async fn place_block(&self, block_type: &str, _at: Vec3, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("placing {}", block_type), cancel).await
    }

    async fn collect_block(&self, block_type: &str, count: u32, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("collecting {} {}", count, block_type), cancel).await
    }

    async fn craft_recipe(&self, recipe: &str, count: u32, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("crafting {} {}", count, recipe), cancel).await
    }

    async fn smelt_item(&self, item: &str, count: u32, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("smelting {} {}", count, item), cancel).await
    }

    async fn give_to_player(&self, item: &str, player: &str, count: u32, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("giving {} {} to {}", count, item, player), cancel).await
    }

    async fn go_to_bed(&self, cancel: &CancellationToken) -> SkillResult {
        self.pretend("sleeping".to_string(), cancel).await
    }

    async fn activate_nearest_block(&self, block_type: &str, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("activating {}", block_type), cancel).await
    }

    async fn consume(&self, item: &str, cancel: &CancellationToken) -> SkillResult {
        self.pretend(format!("eating {}", item), cancel).await
    }

    async fn stay(&self, cancel: &CancellationToken) -> SkillResult {
        self.until_cancelled("staying put".to_string(), cancel).await
    }

    async fn store_items_in_nearest_container(&self, cancel: &CancellationToken) -> SkillResult {
        self.pretend("storing items".to_string(), cancel).await
    }
}
