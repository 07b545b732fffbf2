//! Fixed-period mode scheduler.
//!
//! Every tick the scheduler walks the [`ModeRegistry`] in priority order,
//! lets each eligible mode look at the world, and submits at most one mode
//! action to the [`ActionExecutor`]. Scanning stops at the first active mode,
//! so a higher-priority mode always gets the first chance and lower-priority
//! modes get theirs on a later tick.

use std::sync::Arc;
use std::time::Duration;

use kiln_core::config::SchedulerConfig;
use kiln_core::{Body, Skills, World};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::executor::{ActionExecutor, ExecutorSnapshot};
use crate::modes::{InterruptScope, Mode, ModeAction, ModeContext, ModeRegistry};

/// Default time between tick starts.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(300);

/// Whether `mode` may run its update given the executor state.
///
/// A mode needs to be enabled, not paused and not already running an action.
/// It is then eligible when it is *available* (scope `All`, or the agent is
/// idle) or when it may *interrupt* the current action (the action is
/// interruptible and the scope is `Defaults` or names the resumable action).
pub fn is_eligible(mode: &Mode, executor: &ExecutorSnapshot) -> bool {
    if !mode.is_enabled() || mode.is_paused() || mode.is_active() {
        return false;
    }

    let available = *mode.scope() == InterruptScope::All || executor.is_idle();
    let interruptible = executor.interruptible
        && match mode.scope() {
            InterruptScope::Defaults => true,
            InterruptScope::Named(name) => executor.resume_name.as_deref() == Some(name.as_str()),
            InterruptScope::All | InterruptScope::Idle => false,
        };

    available || interruptible
}

/// Drives the mode registry against one agent's executor.
pub struct ModeScheduler {
    modes: Arc<ModeRegistry>,
    executor: Arc<ActionExecutor>,
    world: Arc<dyn World>,
    body: Arc<dyn Body>,
    skills: Arc<dyn Skills>,
    interval: Duration,
    auto_resume: bool,
}

impl ModeScheduler {
    pub fn new(
        modes: Arc<ModeRegistry>,
        executor: Arc<ActionExecutor>,
        world: Arc<dyn World>,
        body: Arc<dyn Body>,
        skills: Arc<dyn Skills>,
    ) -> Self {
        Self {
            modes,
            executor,
            world,
            body,
            skills,
            interval: DEFAULT_TICK_INTERVAL,
            auto_resume: false,
        }
    }

    /// Apply `[scheduler]` settings.
    pub fn with_config(mut self, config: &SchedulerConfig) -> Self {
        self.interval = config.tick_interval();
        self.auto_resume = config.auto_resume;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Restart the stored resumable action whenever the agent goes idle.
    pub fn with_auto_resume(mut self, enabled: bool) -> Self {
        self.auto_resume = enabled;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Evaluate the registry once.
    ///
    /// Returns the name of the mode that submitted an action, if any.
    #[instrument(level = "trace", skip(self))]
    pub async fn tick(&self) -> Option<&'static str> {
        if self.executor.is_idle() {
            self.modes.unpause_all();
        }

        let mut started = None;
        for mode in self.modes.iter() {
            let snapshot = self.executor.snapshot();
            if is_eligible(mode, &snapshot) {
                let ctx = ModeContext {
                    world: self.world.clone(),
                    body: self.body.clone(),
                    skills: self.skills.clone(),
                    idle: snapshot.is_idle(),
                    now: Instant::now(),
                };
                if let Some(action) = mode.update(&ctx).await {
                    self.submit(mode.clone(), action);
                    started = Some(mode.name());
                }
            }
            if mode.is_active() {
                break;
            }
        }

        if started.is_none() && self.auto_resume && self.modes.active_mode().is_none() {
            self.spawn_resume();
        }

        started
    }

    /// Tick on a fixed period until `cancel` fires.
    ///
    /// Tick starts are spaced by the interval; a tick that overruns is
    /// followed immediately by the next one, without any catch-up burst.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Mode scheduler started");
        loop {
            let start = Instant::now();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }

            let remaining = self.interval.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }
        info!("Mode scheduler stopped");
    }

    /// Mark the mode active and run its action without blocking the tick.
    fn submit(&self, mode: Arc<Mode>, action: ModeAction) {
        mode.set_active(true);
        info!(mode = %mode.name(), "Mode triggered");

        let executor = self.executor.clone();
        tokio::spawn(async move {
            let outcome = executor.run(move |token| action(token), None).await;
            mode.set_active(false);
            debug!(
                mode = %mode.name(),
                interrupted = outcome.interrupted,
                message = %outcome.message,
                "Mode action finished"
            );
        });
    }

    fn spawn_resume(&self) {
        if !self.executor.is_idle() || !self.executor.snapshot().has_resumable {
            return;
        }
        let executor = self.executor.clone();
        tokio::spawn(async move {
            if let Some(outcome) = executor.resume().await {
                debug!(interrupted = outcome.interrupted, "Resumed action finished");
            }
        });
    }
}
