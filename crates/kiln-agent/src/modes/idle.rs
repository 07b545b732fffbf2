//! Opportunistic and cosmetic modes that run while the agent has nothing better to do.

use std::f64::consts::PI;
use std::time::Duration;

use async_trait::async_trait;
use kiln_core::EntityKind;
use tokio::time::Instant;

use super::{mode_action, Behavior, InterruptScope, ModeAction, ModeContext};

/// Picks up dropped items once they have been lying around for a moment.
#[derive(Debug)]
pub struct ItemCollecting {
    wait: Duration,
    prev_item: Option<u64>,
    noticed_at: Option<Instant>,
}

impl ItemCollecting {
    pub fn new() -> Self {
        Self {
            wait: Duration::from_secs(2),
            prev_item: None,
            noticed_at: None,
        }
    }
}

impl Default for ItemCollecting {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Behavior for ItemCollecting {
    fn name(&self) -> &'static str {
        "item_collecting"
    }

    fn description(&self) -> &'static str {
        "Collect nearby items when idle."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::named("followPlayer")
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        let item = ctx.world.nearest_entity(3.0, &|e| e.name == "item");
        let item = match item {
            Some(item) if Some(item.id) != self.prev_item => item,
            _ => {
                self.noticed_at = None;
                return None;
            }
        };
        if !ctx.world.is_clear_path(&item).await {
            self.noticed_at = None;
            return None;
        }

        let noticed = *self.noticed_at.get_or_insert(ctx.now);
        if ctx.now.saturating_duration_since(noticed) <= self.wait {
            return None;
        }

        self.prev_item = Some(item.id);
        self.noticed_at = None;
        let skills = ctx.skills.clone();
        Some(mode_action(move |cancel| async move {
            skills.pickup_nearby_items(&cancel).await
        }))
    }
}

/// Lights up dark surroundings.
#[derive(Debug)]
pub struct TorchPlacing {
    cooldown: Duration,
    last_place: Option<Instant>,
}

impl TorchPlacing {
    pub fn new() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            last_place: None,
        }
    }
}

impl Default for TorchPlacing {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Behavior for TorchPlacing {
    fn name(&self) -> &'static str {
        "torch_placing"
    }

    fn description(&self) -> &'static str {
        "Place torches when idle and there are no torches nearby."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::named("followPlayer")
    }

    fn default_enabled(&self) -> bool {
        false
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        if !ctx.world.should_place_torch() {
            return None;
        }
        if let Some(last) = self.last_place {
            if ctx.now.saturating_duration_since(last) < self.cooldown {
                return None;
            }
        }

        self.last_place = Some(ctx.now);
        let skills = ctx.skills.clone();
        let at = ctx.world.position();
        Some(mode_action(move |cancel| async move {
            skills.place_block("torch", at, &cancel).await
        }))
    }
}

/// Looks at nearby entities, or glances around at random.
#[derive(Debug, Default)]
pub struct IdleStaring {
    staring: bool,
    last_entity: Option<u64>,
    next_change: Option<Instant>,
}

impl IdleStaring {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Behavior for IdleStaring {
    fn name(&self) -> &'static str {
        "idle_staring"
    }

    fn description(&self) -> &'static str {
        "Animation to look around at entities when idle."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::Idle
    }

    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction> {
        let entity = ctx.world.nearest_entity(10.0, &|e| e.name != "enderman");

        match &entity {
            Some(entity) => {
                if Some(entity.id) != self.last_entity {
                    self.staring = true;
                    self.last_entity = Some(entity.id);
                    self.next_change = Some(ctx.now + jitter(4000.0, 1000.0));
                }
                if self.staring {
                    let baby = entity.kind != EntityKind::Player && entity.is_baby;
                    let height = if baby { entity.height / 2.0 } else { entity.height };
                    ctx.body.look_at(entity.position.offset(0.0, height, 0.0));
                }
            }
            None => self.last_entity = None,
        }

        if self.next_change.map_or(true, |at| ctx.now > at) {
            self.staring = rand::random::<f64>() < 0.3;
            if !self.staring {
                let yaw = rand::random::<f64>() * PI * 2.0;
                let pitch = rand::random::<f64>() * PI / 2.0 - PI / 4.0;
                ctx.body.look(yaw as f32, pitch as f32);
            }
            self.next_change = Some(ctx.now + jitter(2000.0, 10000.0));
        }

        None
    }
}

/// `base_ms` plus up to `spread_ms` of random delay.
fn jitter(base_ms: f64, spread_ms: f64) -> Duration {
    Duration::from_millis((base_ms + rand::random::<f64>() * spread_ms) as u64)
}

/// Allows skills to use server cheats. Has no per-tick behavior of its own.
#[derive(Debug, Default)]
pub struct Cheat;

impl Cheat {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Behavior for Cheat {
    fn name(&self) -> &'static str {
        "cheat"
    }

    fn description(&self) -> &'static str {
        "Use cheats to instantly place blocks and teleport."
    }

    fn scope(&self) -> InterruptScope {
        InterruptScope::Idle
    }

    fn default_enabled(&self) -> bool {
        false
    }

    async fn update(&mut self, _ctx: &ModeContext) -> Option<ModeAction> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..100 {
            let d = jitter(2000.0, 10000.0);
            assert!(d >= Duration::from_millis(2000));
            assert!(d <= Duration::from_millis(12000));
        }
    }
}
