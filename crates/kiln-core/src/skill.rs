//! Skill collaborator contract.
//!
//! Skills are the long-running things the agent's body can do: walking,
//! fighting, crafting, collecting. They are implemented on top of the
//! protocol client and are only ever invoked from inside an action submitted
//! to the executor.
//!
//! Every skill receives the action's [`CancellationToken`] and must check it
//! at each suspension point (between path steps, between swings, between
//! crafted items). A skill that ignores the token keeps the executor slot
//! until its grace period runs out and the task is aborted.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::world::{Entity, Vec3};

/// Outcome of a skill: optional human-readable text, or a failure.
pub type SkillResult = anyhow::Result<Option<String>>;

/// Long-running body actions.
#[async_trait]
pub trait Skills: Send + Sync {
    async fn move_away(&self, distance: f64, cancel: &CancellationToken) -> SkillResult;

    async fn go_to_position(&self, target: Vec3, closeness: f64, cancel: &CancellationToken) -> SkillResult;

    async fn go_to_player(&self, player: &str, closeness: f64, cancel: &CancellationToken) -> SkillResult;

    /// Follow a player until cancelled.
    async fn follow_player(&self, player: &str, distance: f64, cancel: &CancellationToken) -> SkillResult;

    async fn avoid_enemies(&self, distance: f64, cancel: &CancellationToken) -> SkillResult;

    async fn defend_self(&self, range: f64, cancel: &CancellationToken) -> SkillResult;

    /// Step out of the path of an incoming projectile.
    async fn dodge(&self, projectile: &Entity, distance: f64, cancel: &CancellationToken) -> SkillResult;

    async fn attack_entity(&self, target: &Entity, kill: bool, cancel: &CancellationToken) -> SkillResult;

    async fn attack_nearest(&self, entity_type: &str, kill: bool, cancel: &CancellationToken) -> SkillResult;

    async fn pickup_nearby_items(&self, cancel: &CancellationToken) -> SkillResult;

    async fn place_block(&self, block_type: &str, at: Vec3, cancel: &CancellationToken) -> SkillResult;

    /// Collect up to `count` blocks. An `Err` means nothing more can be collected.
    async fn collect_block(&self, block_type: &str, count: u32, cancel: &CancellationToken) -> SkillResult;

    async fn craft_recipe(&self, recipe: &str, count: u32, cancel: &CancellationToken) -> SkillResult;

    async fn smelt_item(&self, item: &str, count: u32, cancel: &CancellationToken) -> SkillResult;

    async fn give_to_player(&self, item: &str, player: &str, count: u32, cancel: &CancellationToken) -> SkillResult;

    async fn go_to_bed(&self, cancel: &CancellationToken) -> SkillResult;

    async fn activate_nearest_block(&self, block_type: &str, cancel: &CancellationToken) -> SkillResult;

    /// Eat or drink one of `item` from the inventory.
    async fn consume(&self, item: &str, cancel: &CancellationToken) -> SkillResult;

    /// Stand still until cancelled.
    async fn stay(&self, cancel: &CancellationToken) -> SkillResult;

    async fn store_items_in_nearest_container(&self, cancel: &CancellationToken) -> SkillResult;
}
