//! Modes that keep the agent alive.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use kiln_core::{Block, Vec3};
use tokio::time::Instant;
use tracing::debug;

use super::{mode_action, Behavior, InterruptScope, ModeAction, ModeContext};

/// Blocks that fall on the agent. Matched as substrings (`red_sand`, `sandstone`).
const FALLING_BLOCKS: &[&str] = &["sand", "gravel", "concrete_powder"];
const WATER: &[&str] = &["water", "flowing_water"];
const BURNING: &[&str] = &["lava", "flowing_lava", "fire"];

/// Damage older than this is not treated as an emergency.
const RECENT_DAMAGE: Duration = Duration::from_secs(1);
const CRITICAL_HEALTH: f32 = 5.0;

/// Reacts to drowning, falling blocks, fire, lava and critical damage.
#[derive(Debug, Default)]
pub struct SelfPreservation;

impl SelfPreservation {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Behavior for SelfPreservation {
    fn name(&self) -> &'static str {
        "self_preservation"
    }

    fn description(&self) -> &'static str {
        "Respond to drowning, burning, and damage at low health. Interrupts other actions."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::All
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        let position = ctx.world.position();
        let feet = ctx.world.block_at(position).unwrap_or_else(|| Block::air(position));
        let head_pos = position.offset(0.0, 1.0, 0.0);
        let head = ctx.world.block_at(head_pos).unwrap_or_else(|| Block::air(head_pos));

        let mut action = None;
        let underwater = WATER.contains(&head.name.as_str());

        if underwater {
            // Swim up without taking the executor slot.
            if !ctx.body.has_path_goal() {
                ctx.body.set_jump(true);
            }
        } else if FALLING_BLOCKS.iter().any(|b| head.name.contains(b)) {
            let skills = ctx.skills.clone();
            action = Some(mode_action(move |cancel| async move {
                skills.move_away(2.0, &cancel).await
            }));
        } else if BURNING.contains(&feet.name.as_str()) || BURNING.contains(&head.name.as_str()) {
            ctx.body.chat("I'm on fire!");
            let skills = ctx.skills.clone();
            let body = ctx.body.clone();
            let water = ctx.world.nearest_block("water", 20.0);
            action = Some(mode_action(move |cancel| async move {
                match water {
                    Some(water) => {
                        skills.go_to_position(water.position, 0.2, &cancel).await?;
                        body.chat("Ahhhh that's better!");
                        Ok(None)
                    }
                    None => skills.move_away(5.0, &cancel).await,
                }
            }));
        } else if let Some(damage) = ctx.world.last_damage() {
            let health = ctx.world.health();
            let recent = ctx.now.saturating_duration_since(damage.at) < RECENT_DAMAGE;
            if recent && (health < CRITICAL_HEALTH || damage.amount >= health) {
                debug!(health, damage = damage.amount, "Critical damage, interrupting");
                // Preempting whatever is running is the whole point.
                action = Some(mode_action(|_| async { Ok(None) }));
            }
        }

        if ctx.idle && !underwater {
            ctx.body.clear_control_states();
        }

        action
    }
}

const PROJECTILES: &[&str] = &["arrow", "trident"];
const DODGE_RANGE: f64 = 32.0;
/// Minimum cosine between the projectile's heading and the direction to the agent.
const DODGE_ALIGNMENT: f64 = 0.85;
/// Projectiles stuck in the ground barely move between sightings.
const MIN_TRAVEL: f64 = 0.1;
const DODGE_DISTANCE: f64 = 2.0;

/// Sidesteps arrows and tridents flying at the agent.
#[derive(Debug, Default)]
pub struct ProjectileDodge {
    last_seen: HashMap<u64, Vec3>,
}

impl ProjectileDodge {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Behavior for ProjectileDodge {
    fn name(&self) -> &'static str {
        "projectile_dodge"
    }

    fn description(&self) -> &'static str {
        "Dodge incoming arrows and tridents. Interrupts other actions."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::All
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        if ctx.world.health() <= 0.0 || ctx.body.has_path_goal() {
            return None;
        }

        let Some(projectile) = ctx
            .world
            .nearest_entity(DODGE_RANGE, &|e| PROJECTILES.contains(&e.name.as_str()))
        else {
            self.last_seen.clear();
            return None;
        };

        let previous = self.last_seen.insert(projectile.id, projectile.position);
        self.last_seen.retain(|id, _| *id == projectile.id);
        let previous = previous?;

        let me = ctx.world.position();
        let heading = projectile.velocity.normalize();
        let toward_me = me.minus(projectile.position).normalize();
        let travelled = projectile.position.distance_to(previous);

        if heading.dot(toward_me) < DODGE_ALIGNMENT || travelled <= MIN_TRAVEL {
            return None;
        }

        debug!(projectile = %projectile.name, id = projectile.id, "Incoming projectile");
        let skills = ctx.skills.clone();
        Some(mode_action(move |cancel| async move {
            skills.dodge(&projectile, DODGE_DISTANCE, &cancel).await
        }))
    }
}

/// Eat once food drops below this.
const EAT_BELOW: f32 = 19.0;
/// Wait this long after an attempt before trying again.
const EAT_RETRY: Duration = Duration::from_secs(5);
/// Edible but harmful.
const BANNED_FOODS: &[&str] = &["rotten_flesh", "spider_eye", "poisonous_potato", "pufferfish", "chicken"];
/// Food points restored per item.
const FOOD_POINTS: &[(&str, u32)] = &[
    ("cooked_beef", 8),
    ("cooked_porkchop", 8),
    ("golden_carrot", 6),
    ("cooked_mutton", 6),
    ("cooked_salmon", 6),
    ("cooked_chicken", 6),
    ("baked_potato", 5),
    ("bread", 5),
    ("cooked_cod", 5),
    ("cooked_rabbit", 5),
    ("apple", 4),
    ("rotten_flesh", 4),
    ("beef", 3),
    ("porkchop", 3),
    ("carrot", 3),
    ("rabbit", 3),
    ("mutton", 2),
    ("chicken", 2),
    ("cookie", 2),
    ("melon_slice", 2),
    ("sweet_berries", 2),
    ("spider_eye", 2),
    ("poisonous_potato", 2),
    ("cod", 2),
    ("salmon", 2),
    ("potato", 1),
    ("dried_kelp", 1),
    ("pufferfish", 1),
];

/// The most filling food in `inventory` that is safe to eat.
pub fn best_food(inventory: &BTreeMap<String, u32>) -> Option<&'static str> {
    FOOD_POINTS
        .iter()
        .filter(|(name, _)| !BANNED_FOODS.contains(name))
        .filter(|(name, _)| inventory.get(*name).is_some_and(|count| *count > 0))
        .max_by_key(|(_, points)| *points)
        .map(|(name, _)| *name)
}

/// Eats the most filling safe food when hungry.
#[derive(Debug, Default)]
pub struct AutoEat {
    last_attempt: Option<Instant>,
}

impl AutoEat {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Behavior for AutoEat {
    fn name(&self) -> &'static str {
        "auto_eat"
    }

    fn description(&self) -> &'static str {
        "Eat when hungry, skipping food that makes you sick."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::Defaults
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        if ctx.world.food() >= EAT_BELOW {
            return None;
        }
        if let Some(at) = self.last_attempt {
            if ctx.now.saturating_duration_since(at) < EAT_RETRY {
                return None;
            }
        }

        let food = best_food(&ctx.world.inventory_counts())?;
        self.last_attempt = Some(ctx.now);
        debug!(food, hunger = ctx.world.food(), "Eating");
        let skills = ctx.skills.clone();
        Some(mode_action(move |cancel| async move {
            skills.consume(food, &cancel).await
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_food_skips_banned() {
        let inventory = BTreeMap::from([
            ("rotten_flesh".to_string(), 12),
            ("bread".to_string(), 2),
            ("apple".to_string(), 1),
        ]);
        assert_eq!(best_food(&inventory), Some("bread"));

        let only_bad = BTreeMap::from([("spider_eye".to_string(), 3), ("chicken".to_string(), 1)]);
        assert_eq!(best_food(&only_bad), None);

        let used_up = BTreeMap::from([("cooked_beef".to_string(), 0), ("potato".to_string(), 1)]);
        assert_eq!(best_food(&used_up), Some("potato"));
    }
}
