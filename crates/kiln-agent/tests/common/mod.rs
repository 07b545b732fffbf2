//! Hand-written collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kiln_agent::modes::Behavior;
use kiln_agent::{Agent, AgentBuilder};
use kiln_core::{
    Block, Body, Config, DamageEvent, DamageTracker, Entity, EntityKind, ProviderError, SkillResult,
    Skills, Vec3, Weather, World,
};
use kiln_providers::{CompletionRequest, CompletionResponse, Provider};
use kiln_session::InMemoryHistory;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// World
// ============================================================================

/// A quiet meadow with nobody around.
///
/// Health goes through a [`DamageTracker`] the way a protocol client would
/// feed health packets.
pub struct FakeWorld {
    pub entities: Mutex<Vec<Entity>>,
    pub health: Mutex<f32>,
    pub food: Mutex<f32>,
    pub inventory: Mutex<BTreeMap<String, u32>>,
    damage: Mutex<DamageTracker>,
}

impl FakeWorld {
    pub fn new() -> Self {
        let mut damage = DamageTracker::new();
        damage.observe(20.0, Instant::now());
        Self {
            entities: Mutex::new(Vec::new()),
            health: Mutex::new(20.0),
            food: Mutex::new(18.0),
            inventory: Mutex::new(BTreeMap::from([("oak_log".to_string(), 3)])),
            damage: Mutex::new(damage),
        }
    }

    /// Report a new health value, recording damage when it dropped.
    pub fn set_health(&self, health: f32) {
        *self.health.lock() = health;
        self.damage.lock().observe(health, Instant::now());
    }

    pub fn add_entity(&self, entity: Entity) {
        self.entities.lock().push(entity);
    }
}

/// An entity of the given kind standing `distance` blocks east of the fake world's spawn.
pub fn entity_near(id: u64, name: &str, kind: EntityKind, distance: f64) -> Entity {
    Entity {
        id,
        name: name.to_string(),
        username: None,
        kind,
        position: Vec3::new(10.0 + distance, 64.0, -3.5),
        velocity: Vec3::default(),
        height: 1.8,
        hostile: false,
        huntable: false,
        is_baby: false,
    }
}

#[async_trait]
impl World for FakeWorld {
    fn position(&self) -> Vec3 {
        Vec3::new(10.0, 64.0, -3.5)
    }

    fn health(&self) -> f32 {
        *self.health.lock()
    }

    fn food(&self) -> f32 {
        *self.food.lock()
    }

    fn last_damage(&self) -> Option<DamageEvent> {
        self.damage.lock().last()
    }

    fn block_at(&self, position: Vec3) -> Option<Block> {
        Some(Block::air(position))
    }

    fn nearest_block(&self, _name: &str, _max_distance: f64) -> Option<Block> {
        None
    }

    fn nearest_entity(&self, max_distance: f64, filter: &dyn Fn(&Entity) -> bool) -> Option<Entity> {
        let here = self.position();
        self.entities
            .lock()
            .iter()
            .filter(|e| e.position.distance_to(here) <= max_distance && filter(e))
            .cloned()
            .next()
    }

    fn nearby_player_names(&self) -> Vec<String> {
        vec!["Bob".to_string()]
    }

    fn nearby_entity_types(&self) -> Vec<String> {
        vec!["cow".to_string()]
    }

    fn nearby_block_types(&self) -> Vec<String> {
        vec!["grass_block".to_string(), "oak_log".to_string()]
    }

    fn inventory_counts(&self) -> BTreeMap<String, u32> {
        self.inventory.lock().clone()
    }

    fn craftable_items(&self) -> Vec<String> {
        vec!["oak_planks".to_string()]
    }

    fn game_mode(&self) -> String {
        "survival".to_string()
    }

    fn time_of_day(&self) -> u32 {
        1000
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

// ============================================================================
// Body
// ============================================================================

/// Records every chat line and counts control resets.
#[derive(Default)]
pub struct RecordingBody {
    pub chats: Mutex<Vec<String>>,
    pub clears: AtomicUsize,
    pub stops: AtomicUsize,
}

impl RecordingBody {
    pub fn chats(&self) -> Vec<String> {
        self.chats.lock().clone()
    }
}

impl Body for RecordingBody {
    fn chat(&self, message: &str) {
        self.chats.lock().push(message.to_string());
    }

    fn set_jump(&self, _on: bool) {}

    fn clear_control_states(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_pathing(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn has_path_goal(&self) -> bool {
        false
    }

    fn look_at(&self, _target: Vec3) {}

    fn look(&self, _yaw: f32, _pitch: f32) {}
}

// ============================================================================
// Skills
// ============================================================================

/// Records calls and tracks how many skills overlap in time.
///
/// `follow_player` and `stay` hold until cancelled; everything else takes a
/// short simulated moment and succeeds.
#[derive(Default)]
pub struct ScriptedSkills {
    pub calls: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedSkills {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn enter(&self, call: String) {
        self.calls.lock().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn quick(&self, call: String, result: Option<String>) -> SkillResult {
        self.enter(call);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.exit();
        Ok(result)
    }

    async fn hold(&self, call: String, cancel: &CancellationToken) -> SkillResult {
        self.enter(call);
        cancel.cancelled().await;
        self.exit();
        Ok(None)
    }
}

#[async_trait]
impl Skills for ScriptedSkills {
    async fn move_away(&self, distance: f64, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("move_away {}", distance), Some(format!("Moved away {} blocks.", distance)))
            .await
    }

    async fn go_to_position(&self, target: Vec3, _closeness: f64, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("go_to_position {:?}", target), None).await
    }

    async fn go_to_player(&self, player: &str, closeness: f64, _cancel: &CancellationToken) -> SkillResult {
        self.quick(
            format!("go_to_player {} {}", player, closeness),
            Some(format!("You have reached {}.", player)),
        )
        .await
    }

    async fn follow_player(&self, player: &str, distance: f64, cancel: &CancellationToken) -> SkillResult {
        self.hold(format!("follow_player {} {}", player, distance), cancel).await
    }

    async fn avoid_enemies(&self, distance: f64, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("avoid_enemies {}", distance), None).await
    }

    async fn defend_self(&self, range: f64, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("defend_self {}", range), None).await
    }

    async fn dodge(&self, projectile: &Entity, distance: f64, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("dodge {} {}", projectile.name, distance), None).await
    }

    async fn attack_entity(&self, target: &Entity, kill: bool, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("attack_entity {} {}", target.name, kill), None).await
    }

    async fn attack_nearest(&self, entity_type: &str, kill: bool, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("attack_nearest {} {}", entity_type, kill), None).await
    }

    async fn pickup_nearby_items(&self, _cancel: &CancellationToken) -> SkillResult {
        self.quick("pickup_nearby_items".to_string(), None).await
    }

    async fn place_block(&self, block_type: &str, at: Vec3, _cancel: &CancellationToken) -> SkillResult {
        self.quick(
            format!("place_block {} {} {} {}", block_type, at.x, at.y, at.z),
            Some(format!("Placed {}.", block_type)),
        )
        .await
    }

    async fn collect_block(&self, block_type: &str, count: u32, _cancel: &CancellationToken) -> SkillResult {
        self.quick(
            format!("collect_block {} {}", block_type, count),
            Some(format!("Collected {} {}.", count, block_type)),
        )
        .await
    }

    async fn craft_recipe(&self, recipe: &str, count: u32, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("craft_recipe {} {}", recipe, count), None).await
    }

    async fn smelt_item(&self, item: &str, count: u32, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("smelt_item {} {}", item, count), None).await
    }

    async fn give_to_player(&self, item: &str, player: &str, count: u32, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("give_to_player {} {} {}", item, player, count), None).await
    }

    async fn go_to_bed(&self, _cancel: &CancellationToken) -> SkillResult {
        self.quick("go_to_bed".to_string(), None).await
    }

    async fn activate_nearest_block(&self, block_type: &str, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("activate_nearest_block {}", block_type), None).await
    }

    async fn consume(&self, item: &str, _cancel: &CancellationToken) -> SkillResult {
        self.quick(format!("consume {}", item), Some(format!("Ate {}.", item))).await
    }

    async fn stay(&self, cancel: &CancellationToken) -> SkillResult {
        self.hold("stay".to_string(), cancel).await
    }

    async fn store_items_in_nearest_container(&self, _cancel: &CancellationToken) -> SkillResult {
        self.quick("store_items".to_string(), None).await
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Replays scripted replies, then repeats the last one forever.
pub struct MockProvider {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    pub calls: AtomicUsize,
}

impl MockProvider {
    pub fn scripted(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(String::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn repeating(reply: &str) -> Self {
        Self::scripted(&[reply])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = match self.replies.lock().pop_front() {
            Some(reply) => {
                *self.last.lock() = reply.clone();
                reply
            }
            None => self.last.lock().clone(),
        };
        Ok(CompletionResponse::text(reply))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.name = "andy".to_string();
    config.scheduler.tick_interval_ms = 50;
    config.executor.cancel_grace_ms = 100;
    config
}

/// An assembled agent plus handles on its fakes.
pub struct Harness {
    pub agent: Agent,
    pub world: Arc<FakeWorld>,
    pub body: Arc<RecordingBody>,
    pub skills: Arc<ScriptedSkills>,
    pub provider: Arc<MockProvider>,
    pub history: Arc<InMemoryHistory>,
}

pub fn harness(provider: MockProvider) -> Harness {
    harness_with(provider, Vec::new())
}

/// Build an agent with the given behaviors (none means no reactive modes).
pub fn harness_with(provider: MockProvider, behaviors: Vec<Box<dyn Behavior>>) -> Harness {
    harness_with_config(provider, behaviors, test_config())
}

pub fn harness_with_config(provider: MockProvider, behaviors: Vec<Box<dyn Behavior>>, config: Config) -> Harness {
    let world = Arc::new(FakeWorld::new());
    let body = Arc::new(RecordingBody::default());
    let skills = Arc::new(ScriptedSkills::default());
    let provider = Arc::new(provider);
    let history = Arc::new(InMemoryHistory::new("andy", 40));

    let agent = AgentBuilder::new(config)
        .world(world.clone())
        .body(body.clone())
        .skills(skills.clone())
        .provider(provider.clone())
        .history(history.clone())
        .behaviors(behaviors)
        .build()
        .expect("agent builds");

    Harness {
        agent,
        world,
        body,
        skills,
        provider,
        history,
    }
}
