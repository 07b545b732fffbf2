//! Fight-or-flight modes.

use std::time::Duration;

use async_trait::async_trait;
use kiln_core::EntityKind;
use tokio::time::Instant;
use tracing::info;

use super::{mode_action, Behavior, InterruptScope, ModeAction, ModeContext};

const ENEMY_RANGE: f64 = 16.0;

/// Hits older than this are not answered.
const RECENT_HIT: Duration = Duration::from_secs(1);
/// Healthier than this, a hit is shrugged off.
const RETALIATE_BELOW: f32 = 18.0;
/// Below this, the attacker is fought to the death.
const KILL_BELOW: f32 = 12.0;
const ATTACKER_RANGE: f64 = 10.0;

/// Strikes back at whatever just hurt the agent.
#[derive(Debug, Default)]
pub struct Retaliation {
    answered: Option<Instant>,
}

impl Retaliation {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Behavior for Retaliation {
    fn name(&self) -> &'static str {
        "retaliation"
    }

    fn description(&self) -> &'static str {
        "Fight back when hurt, to the death at low health. Interrupts other actions."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::All
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        let hit = ctx.world.last_damage()?;
        if self.answered == Some(hit.at) || ctx.now.saturating_duration_since(hit.at) >= RECENT_HIT {
            return None;
        }

        let health = ctx.world.health();
        if health <= 0.0 || health >= RETALIATE_BELOW {
            return None;
        }

        let attacker = ctx.world.nearest_entity(ATTACKER_RANGE, &|e| {
            matches!(e.kind, EntityKind::Mob | EntityKind::Player)
        })?;
        self.answered = Some(hit.at);

        let kill = health < KILL_BELOW;
        info!(attacker = %attacker.display_name(), health, kill, "Retaliating");
        let skills = ctx.skills.clone();
        Some(mode_action(move |cancel| async move {
            skills.attack_entity(&attacker, kill, &cancel).await
        }))
    }
}

/// Runs from hostile mobs.
#[derive(Debug, Default)]
pub struct Cowardice;

impl Cowardice {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Behavior for Cowardice {
    fn name(&self) -> &'static str {
        "cowardice"
    }

    fn description(&self) -> &'static str {
        "Run away from enemies. Interrupts other actions."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::All
    }

    fn default_enabled(&self) -> bool {
        false
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        let enemy = ctx.world.nearest_entity(ENEMY_RANGE, &|e| e.hostile)?;
        if !ctx.world.is_clear_path(&enemy).await {
            return None;
        }

        ctx.body.chat(&format!("Aaa! A {}!", enemy.display_name()));
        let skills = ctx.skills.clone();
        Some(mode_action(move |cancel| async move {
            skills.avoid_enemies(24.0, &cancel).await
        }))
    }
}

/// Fights hostile mobs that come close.
#[derive(Debug, Default)]
pub struct SelfDefense;

impl SelfDefense {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Behavior for SelfDefense {
    fn name(&self) -> &'static str {
        "self_defense"
    }

    fn description(&self) -> &'static str {
        "Attack nearby enemies. Interrupts other actions."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::All
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        let enemy = ctx.world.nearest_entity(ENEMY_RANGE, &|e| e.hostile)?;
        if !ctx.world.is_clear_path(&enemy).await {
            return None;
        }

        let skills = ctx.skills.clone();
        Some(mode_action(move |cancel| async move {
            skills.defend_self(8.0, &cancel).await
        }))
    }
}

/// Hunts nearby animals.
#[derive(Debug, Default)]
pub struct Hunting;

impl Hunting {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Behavior for Hunting {
    fn name(&self) -> &'static str {
        "hunting"
    }

    fn description(&self) -> &'static str {
        "Hunt nearby animals when idle."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::Defaults
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        let prey = ctx.world.nearest_entity(8.0, &|e| e.huntable)?;
        if !ctx.world.is_clear_path(&prey).await {
            return None;
        }

        let skills = ctx.skills.clone();
        let body = ctx.body.clone();
        Some(mode_action(move |cancel| async move {
            body.chat(&format!("Hunting {}!", prey.display_name()));
            skills.attack_entity(&prey, true, &cancel).await
        }))
    }
}

/// Attacks nearby players.
#[derive(Debug, Default)]
pub struct Pvp;

impl Pvp {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Behavior for Pvp {
    fn name(&self) -> &'static str {
        "pvp"
    }

    fn description(&self) -> &'static str {
        "Attack nearby players."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::Defaults
    }

    fn default_enabled(&self) -> bool {
        false
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        let target = ctx
            .world
            .nearest_entity(64.0, &|e| e.kind == EntityKind::Player)?;
        if !ctx.world.is_clear_path(&target).await {
            return None;
        }

        let skills = ctx.skills.clone();
        Some(mode_action(move |cancel| async move {
            skills.attack_entity(&target, true, &cancel).await
        }))
    }
}
