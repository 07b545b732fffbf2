//! Reactive behaviors ("modes") and their registry.
//!
//! A mode is evaluated every scheduler tick. Its `update` may poke the body
//! directly (jump, look around) and may hand back a [`ModeAction`] for the
//! scheduler to submit to the executor. Priority is the registry order and
//! never changes at runtime.
//!
//! | mode | scope | default |
//! |------|-------|---------|
//! | `self_preservation` | all | on |
//! | `projectile_dodge` | all | on |
//! | `retaliation` | all | on |
//! | `cowardice` | all | off |
//! | `self_defense` | all | on |
//! | `auto_eat` | defaults | on |
//! | `hunting` | defaults | on |
//! | `pvp` | defaults | off |
//! | `item_collecting` | followPlayer | on |
//! | `torch_placing` | followPlayer | off |
//! | `idle_staring` | idle only | on |
//! | `cheat` | idle only | off |

mod combat;
mod idle;
mod survival;

pub use combat::{Cowardice, Hunting, Pvp, Retaliation, SelfDefense};
pub use idle::{Cheat, IdleStaring, ItemCollecting, TorchPlacing};
pub use survival::{best_food, AutoEat, ProjectileDodge, SelfPreservation};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use kiln_core::{Body, Skills, World};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::executor::ActionFuture;

// ============================================================================
// Behavior contract
// ============================================================================

/// Which busy states a mode may preempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptScope {
    /// Always available; preempts anything.
    All,
    /// Available when idle, or when the running action is interruptible.
    Defaults,
    /// Available when idle, or when the running resumable action has this name.
    Named(String),
    /// Only available when idle; never preempts.
    Idle,
}

impl InterruptScope {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for InterruptScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Defaults => write!(f, "defaults"),
            Self::Named(name) => write!(f, "{}", name),
            Self::Idle => write!(f, "idle"),
        }
    }
}

/// Work a mode wants the executor to run.
pub type ModeAction = Box<dyn FnOnce(CancellationToken) -> ActionFuture + Send>;

/// Box an async closure as a [`ModeAction`].
pub fn mode_action<F, Fut>(action: F) -> ModeAction
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
{
    Box::new(move |token| action(token).boxed())
}

/// What a behavior can see and touch during `update`.
#[derive(Clone)]
pub struct ModeContext {
    pub world: Arc<dyn World>,
    pub body: Arc<dyn Body>,
    pub skills: Arc<dyn Skills>,
    /// Executor idle at the start of this update.
    pub idle: bool,
    pub now: Instant,
}

/// One reactive behavior with its own private state.
#[async_trait]
pub trait Behavior: Send {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn scope(&self) -> InterruptScope;

    fn default_enabled(&self) -> bool {
        true
    }

    /// Look at the world and optionally request an action.
    ///
    /// Should return quickly; long work belongs in the returned action.
    async fn update(&mut self, ctx: &ModeContext) -> Option<ModeAction>;
}

// ============================================================================
// Registry
// ============================================================================

/// A registered mode: descriptor, flags, and the behavior instance.
pub struct Mode {
    name: &'static str,
    description: &'static str,
    scope: InterruptScope,
    enabled: AtomicBool,
    paused: AtomicBool,
    active: AtomicBool,
    behavior: AsyncMutex<Box<dyn Behavior>>,
}

impl Mode {
    fn new(behavior: Box<dyn Behavior>) -> Self {
        Self {
            name: behavior.name(),
            description: behavior.description(),
            scope: behavior.scope(),
            enabled: AtomicBool::new(behavior.default_enabled()),
            paused: AtomicBool::new(false),
            active: AtomicBool::new(false),
            behavior: AsyncMutex::new(behavior),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn scope(&self) -> &InterruptScope {
        &self.scope
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub(crate) async fn update(&self, ctx: &ModeContext) -> Option<ModeAction> {
        self.behavior.lock().await.update(ctx).await
    }
}

/// Ordered collection of modes. Index order is priority order.
pub struct ModeRegistry {
    modes: Vec<Arc<Mode>>,
}

impl ModeRegistry {
    /// Build a registry from behaviors in priority order. Duplicate names are dropped.
    pub fn new(behaviors: Vec<Box<dyn Behavior>>) -> Self {
        let mut modes: Vec<Arc<Mode>> = Vec::with_capacity(behaviors.len());
        for behavior in behaviors {
            if modes.iter().any(|m| m.name == behavior.name()) {
                warn!(mode = %behavior.name(), "Duplicate mode ignored");
                continue;
            }
            modes.push(Arc::new(Mode::new(behavior)));
        }
        Self { modes }
    }

    /// The built-in modes in their fixed priority order.
    pub fn with_defaults() -> Self {
        Self::new(default_behaviors())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Mode>> {
        self.modes.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Mode>> {
        self.modes.iter().find(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether the mode is enabled. Unknown modes are reported as off.
    pub fn is_on(&self, name: &str) -> bool {
        self.get(name).map(|m| m.is_enabled()).unwrap_or(false)
    }

    /// Enable or disable a mode. Returns false if the mode does not exist.
    pub fn set_on(&self, name: &str, on: bool) -> bool {
        match self.get(name) {
            Some(mode) => {
                mode.enabled.store(on, Ordering::SeqCst);
                info!(mode = %name, on, "Mode toggled");
                true
            }
            None => false,
        }
    }

    /// Suppress a mode until the agent next becomes idle.
    pub fn pause(&self, name: &str) -> bool {
        match self.get(name) {
            Some(mode) => {
                mode.paused.store(true, Ordering::SeqCst);
                debug!(mode = %name, "Mode paused");
                true
            }
            None => false,
        }
    }

    pub fn unpause_all(&self) {
        for mode in &self.modes {
            if mode.paused.swap(false, Ordering::SeqCst) {
                debug!(mode = %mode.name, "Mode unpaused");
            }
        }
    }

    /// Name of the mode whose action is currently running, if any.
    pub fn active_mode(&self) -> Option<&'static str> {
        self.modes.iter().find(|m| m.is_active()).map(|m| m.name)
    }

    /// Human-readable listing used by `!modes`.
    pub fn describe_all(&self) -> String {
        let mut out = String::from("Available Modes:");
        for mode in &self.modes {
            let state = if mode.is_enabled() { "ON" } else { "OFF" };
            out.push_str(&format!("\n- {}({}): {}", mode.name, state, mode.description));
        }
        out
    }

    /// Enabled flags keyed by mode name.
    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.modes
            .iter()
            .map(|m| (m.name.to_string(), m.is_enabled()))
            .collect()
    }

    /// Merge persisted flags. Unknown names are ignored; missing names keep their value.
    pub fn load_map(&self, map: &BTreeMap<String, bool>) {
        for (name, on) in map {
            match self.get(name) {
                Some(mode) => mode.enabled.store(*on, Ordering::SeqCst),
                None => debug!(mode = %name, "Ignoring unknown mode in config"),
            }
        }
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Fresh instances of every built-in behavior, highest priority first.
pub fn default_behaviors() -> Vec<Box<dyn Behavior>> {
    vec![
        Box::new(SelfPreservation::new()),
        Box::new(ProjectileDodge::new()),
        Box::new(Retaliation::new()),
        Box::new(Cowardice::new()),
        Box::new(SelfDefense::new()),
        Box::new(AutoEat::new()),
        Box::new(Hunting::new()),
        Box::new(Pvp::new()),
        Box::new(ItemCollecting::new()),
        Box::new(TorchPlacing::new()),
        Box::new(IdleStaring::new()),
        Box::new(Cheat::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_and_flags() {
        let registry = ModeRegistry::with_defaults();
        let names: Vec<_> = registry.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec![
                "self_preservation",
                "projectile_dodge",
                "retaliation",
                "cowardice",
                "self_defense",
                "auto_eat",
                "hunting",
                "pvp",
                "item_collecting",
                "torch_placing",
                "idle_staring",
                "cheat",
            ]
        );
        assert!(registry.is_on("self_preservation"));
        assert!(!registry.is_on("pvp"));
        assert!(!registry.is_on("cheat"));
        // Cowardice would shadow self_defense, which shares its trigger.
        assert!(!registry.is_on("cowardice"));
        assert!(registry.is_on("self_defense"));
        assert!(registry.is_on("retaliation"));
        assert!(registry.is_on("auto_eat"));
        assert_eq!(
            registry.get("item_collecting").unwrap().scope(),
            &InterruptScope::named("followPlayer")
        );
    }

    #[test]
    fn test_set_on_and_unknown() {
        let registry = ModeRegistry::with_defaults();
        assert!(registry.set_on("hunting", false));
        assert!(!registry.is_on("hunting"));
        assert!(!registry.set_on("flying", true));
        assert!(!registry.exists("flying"));
        assert!(!registry.is_on("flying"));
    }

    #[test]
    fn test_pause_cleared_by_unpause_all() {
        let registry = ModeRegistry::with_defaults();
        registry.pause("self_defense");
        assert!(registry.get("self_defense").unwrap().is_paused());
        registry.unpause_all();
        assert!(!registry.get("self_defense").unwrap().is_paused());
    }

    #[test]
    fn test_load_map_merges() {
        let registry = ModeRegistry::with_defaults();
        let mut map = BTreeMap::new();
        map.insert("pvp".to_string(), true);
        map.insert("not_a_mode".to_string(), true);
        registry.load_map(&map);

        assert!(registry.is_on("pvp"));
        assert!(registry.is_on("hunting"));
        assert!(!registry.to_map().contains_key("not_a_mode"));
    }

    #[test]
    fn test_describe_all() {
        let registry = ModeRegistry::with_defaults();
        let text = registry.describe_all();
        assert!(text.starts_with("Available Modes:"));
        assert!(text.contains("\n- hunting(ON): "));
        assert!(text.contains("\n- pvp(OFF): "));
    }

    #[test]
    fn test_active_mode() {
        let registry = ModeRegistry::with_defaults();
        assert!(registry.active_mode().is_none());
        registry.get("hunting").unwrap().set_active(true);
        assert_eq!(registry.active_mode(), Some("hunting"));
    }
}
