//! Serialized, resumable action executor.
//!
//! [`ActionExecutor`] owns the single slot through which every action that
//! moves the agent's body must pass. Reactive modes and the dispatch loop are
//! peers contending for it; the executor is the only source of truth for
//! "is the agent busy".
//!
//! ## Lifecycle of a submission
//!
//! ```text
//! run(action)
//!   ├─> cancel current holder's token (preempt)
//!   ├─> wait for the FIFO slot
//!   ├─> superseded while waiting?  -> Outcome { interrupted }
//!   ├─> spawn action(token) under a lease
//!   ├─> race: completion | cancellation | timeout
//!   │     └─> on cancellation: grace period, then abort
//!   └─> lease dropped: slot released, idle handling if nothing is queued
//! ```
//!
//! Cancellation is cooperative. Every action receives a
//! [`CancellationToken`] and is expected to return soon after it fires. An
//! action that ignores its token is aborted once the grace period runs out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use kiln_core::config::ExecutorConfig;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Mutex as SlotMutex};
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Boxed future produced by an action.
pub type ActionFuture = BoxFuture<'static, anyhow::Result<Option<String>>>;

/// A re-invocable action, kept so it can be restarted after preemption.
pub type ResumableAction = Arc<dyn Fn(CancellationToken) -> ActionFuture + Send + Sync>;

type OnceAction = Box<dyn FnOnce(CancellationToken) -> ActionFuture + Send>;

/// Default time an action gets to return after its token fires.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(500);

// ============================================================================
// Outcome & Snapshot
// ============================================================================

/// Result of a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Text returned by the action, its failure text, or a timeout notice.
    pub message: String,
    /// Cancellation fired before the action completed on its own.
    pub interrupted: bool,
    /// The timeout elapsed. Implies `interrupted`.
    pub timed_out: bool,
}

impl ActionOutcome {
    fn superseded() -> Self {
        Self {
            message: String::new(),
            interrupted: true,
            timed_out: false,
        }
    }

    /// Text worth reporting back to the conversation.
    ///
    /// A plain interruption reports nothing; anything else reports its
    /// message when there is one.
    pub fn into_report(self) -> Option<String> {
        if self.interrupted && !self.timed_out {
            return None;
        }
        if self.message.is_empty() {
            None
        } else {
            Some(self.message)
        }
    }
}

/// Point-in-time view of the executor flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorSnapshot {
    pub executing: bool,
    pub generating: bool,
    pub interruptible: bool,
    pub resume_name: Option<String>,
    pub has_resumable: bool,
}

impl ExecutorSnapshot {
    pub fn is_idle(&self) -> bool {
        !self.executing && !self.generating
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Receives the "became idle" transition.
///
/// `on_idle` runs synchronously on the task that released the slot, before
/// any queued work can observe the executor as idle.
pub trait ExecutorObserver: Send + Sync {
    fn on_idle(&self) {}
}

/// Observer that ignores every notification.
pub struct NoOpObserver;

impl ExecutorObserver for NoOpObserver {}

// ============================================================================
// Executor
// ============================================================================

struct Holder {
    ticket: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct ExecState {
    executing: bool,
    /// Model completions currently awaited.
    generating: usize,
    interruptible: bool,
    resume_name: Option<String>,
    resume_action: Option<ResumableAction>,
    resume_timeout: Option<Duration>,
    holder: Option<Holder>,
    /// Submissions (and stops) currently waiting for the slot.
    waiting: usize,
    next_ticket: u64,
    latest_ticket: u64,
}

impl ExecState {
    fn is_idle(&self) -> bool {
        !self.executing && self.generating == 0
    }

    fn settled(&self) -> bool {
        self.is_idle() && self.waiting == 0
    }
}

/// The single action slot of one agent.
pub struct ActionExecutor {
    state: Mutex<ExecState>,
    slot: SlotMutex<()>,
    cancel_grace: Duration,
    observer: RwLock<Arc<dyn ExecutorObserver>>,
    idle_tx: watch::Sender<bool>,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CANCEL_GRACE)
    }
}

impl ActionExecutor {
    /// Create an executor with the given cancellation grace period.
    pub fn new(cancel_grace: Duration) -> Self {
        let (idle_tx, _) = watch::channel(true);
        Self {
            state: Mutex::new(ExecState::default()),
            slot: SlotMutex::new(()),
            cancel_grace,
            observer: RwLock::new(Arc::new(NoOpObserver)),
            idle_tx,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.cancel_grace())
    }

    /// Install the idle observer.
    pub fn set_observer(&self, observer: Arc<dyn ExecutorObserver>) {
        *self.observer.write() = observer;
    }

    /// Builder-style variant of [`set_observer`](Self::set_observer).
    pub fn with_observer(self, observer: Arc<dyn ExecutorObserver>) -> Self {
        self.set_observer(observer);
        self
    }

    /// Watch channel carrying the current idle state.
    pub fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.idle_tx.subscribe()
    }

    /// True iff no action holds the slot and no completion is being awaited.
    pub fn is_idle(&self) -> bool {
        self.state.lock().is_idle()
    }

    pub fn is_executing(&self) -> bool {
        self.state.lock().executing
    }

    pub fn is_interruptible(&self) -> bool {
        self.state.lock().interruptible
    }

    pub fn resume_name(&self) -> Option<String> {
        self.state.lock().resume_name.clone()
    }

    pub fn snapshot(&self) -> ExecutorSnapshot {
        let state = self.state.lock();
        ExecutorSnapshot {
            executing: state.executing,
            generating: state.generating > 0,
            interruptible: state.interruptible,
            resume_name: state.resume_name.clone(),
            has_resumable: state.resume_action.is_some(),
        }
    }

    /// Mark the start (`true`) or end (`false`) of one language-model completion.
    ///
    /// Completions are counted, so concurrent conversations keep the agent
    /// busy until the last one returns. Prefer [`generating`](Self::generating),
    /// which cannot leave the count unbalanced.
    pub fn set_generating(&self, generating: bool) {
        {
            let mut state = self.state.lock();
            if generating {
                state.generating += 1;
            } else {
                state.generating = state.generating.saturating_sub(1);
            }
        }
        if generating {
            self.idle_tx.send_replace(false);
        } else {
            self.notify_if_settled();
        }
    }

    /// Count one completion as in flight until the guard is dropped.
    pub fn generating(&self) -> GeneratingGuard<'_> {
        self.set_generating(true);
        GeneratingGuard { executor: self }
    }

    /// Allow or forbid interrupt-scoped modes from preempting the current action.
    pub fn set_interruptible(&self, interruptible: bool) {
        self.state.lock().interruptible = interruptible;
    }

    /// Run an action once.
    ///
    /// Preempts whatever holds the slot, then runs `action` until it returns,
    /// its token fires, or `timeout` elapses (`None` disables the timeout).
    pub async fn run<F, Fut>(&self, action: F, timeout: Option<Duration>) -> ActionOutcome
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        self.submit(Box::new(move |token| action(token).boxed()), timeout)
            .await
    }

    /// Run an action and remember it under `resume_name`.
    ///
    /// The name replaces any previous resumable identity. The action is kept
    /// so [`resume`](Self::resume) can restart it once the agent is idle again.
    pub async fn run_resumable<F, Fut>(
        &self,
        action: F,
        resume_name: impl Into<String>,
        timeout: Option<Duration>,
    ) -> ActionOutcome
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        let resume_name = resume_name.into();
        let action: ResumableAction = Arc::new(move |token| action(token).boxed());
        {
            let mut state = self.state.lock();
            debug!(name = %resume_name, "Recording resumable action");
            state.resume_name = Some(resume_name);
            state.resume_action = Some(action.clone());
            state.resume_timeout = timeout;
        }
        self.submit(Box::new(move |token| action(token)), timeout).await
    }

    /// Restart the stored resumable action if the agent is idle.
    ///
    /// Returns `None` when there is nothing to resume or the agent is busy.
    pub async fn resume(&self) -> Option<ActionOutcome> {
        let (action, timeout, name) = {
            let state = self.state.lock();
            if !state.settled() {
                return None;
            }
            let action = state.resume_action.clone()?;
            (action, state.resume_timeout, state.resume_name.clone())
        };
        info!(name = ?name, "Resuming action");
        Some(self.submit(Box::new(move |token| action(token)), timeout).await)
    }

    /// Forget the resumable identity without touching a running action.
    pub fn cancel_resume(&self) {
        let mut state = self.state.lock();
        if let Some(name) = state.resume_name.take() {
            debug!(name = %name, "Cancelled resume");
        }
        state.resume_action = None;
        state.resume_timeout = None;
    }

    /// Cancel the running action and anything queued, wait for the slot to
    /// drain, and clear the resumable identity.
    ///
    /// Calling this while idle only clears the resumable identity.
    pub async fn stop(&self) {
        let was_busy = {
            let mut state = self.state.lock();
            let was_busy = state.executing || state.waiting > 0;
            state.next_ticket += 1;
            state.latest_ticket = state.next_ticket;
            if let Some(holder) = &state.holder {
                holder.token.cancel();
            }
            state.waiting += 1;
            was_busy
        };

        {
            let wait = WaitGuard { executor: self };
            let _slot = self.slot.lock().await;
            drop(wait);
            let mut state = self.state.lock();
            state.resume_name = None;
            state.resume_action = None;
            state.resume_timeout = None;
        }

        if was_busy {
            info!("Executor stopped");
            self.notify_if_settled();
        }
    }

    async fn submit(&self, action: OnceAction, timeout: Option<Duration>) -> ActionOutcome {
        let ticket = {
            let mut state = self.state.lock();
            state.next_ticket += 1;
            let ticket = state.next_ticket;
            state.latest_ticket = ticket;
            state.waiting += 1;
            if let Some(holder) = &state.holder {
                info!(holder = holder.ticket, by = ticket, "Preempting running action");
                holder.token.cancel();
            }
            ticket
        };

        let wait = WaitGuard { executor: self };
        let slot = self.slot.lock().await;
        drop(wait);

        let token = CancellationToken::new();
        let mut lease = {
            let mut state = self.state.lock();
            if state.latest_ticket != ticket {
                drop(state);
                drop(slot);
                debug!(ticket, "Submission superseded before it started");
                self.notify_if_settled();
                return ActionOutcome::superseded();
            }
            state.holder = Some(Holder {
                ticket,
                token: token.clone(),
            });
            state.executing = true;
            state.interruptible = true;
            SlotLease {
                executor: self,
                ticket,
                abort: None,
            }
        };
        self.idle_tx.send_replace(false);
        debug!(ticket, "Action started");

        let mut task = tokio::spawn(action(token.clone()));
        lease.abort = Some(task.abort_handle());

        let timer = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        let race = tokio::select! {
            biased;
            joined = &mut task => Race::Finished(joined),
            _ = token.cancelled() => Race::Cancelled,
            _ = &mut timer => {
                token.cancel();
                Race::TimedOut
            }
        };

        // A token cancelled after the action already returned does not count.
        let (joined, interrupted, timed_out) = match race {
            Race::Finished(joined) => (Some(joined), false, false),
            Race::Cancelled => (self.grace(&mut task, ticket).await, true, false),
            Race::TimedOut => (self.grace(&mut task, ticket).await, true, true),
        };

        let mut message = match joined {
            Some(Ok(Ok(Some(text)))) => text,
            Some(Ok(Ok(None))) | None => String::new(),
            Some(Ok(Err(e))) => format!("Action failed: {:#}", e),
            Some(Err(e)) if e.is_panic() => "Action panicked.".to_string(),
            Some(Err(_)) => String::new(),
        };

        if interrupted && !timed_out {
            message.clear();
        }
        if timed_out && message.is_empty() {
            let limit = timeout.unwrap_or_default();
            message = format!("Action timed out after {}ms.", limit.as_millis());
        }

        debug!(ticket, interrupted, timed_out, "Action finished");
        drop(lease);
        drop(slot);

        ActionOutcome {
            message,
            interrupted,
            timed_out,
        }
    }

    /// Give a cancelled action `cancel_grace` to return, then abort it.
    async fn grace(
        &self,
        task: &mut tokio::task::JoinHandle<anyhow::Result<Option<String>>>,
        ticket: u64,
    ) -> Option<Result<anyhow::Result<Option<String>>, JoinError>> {
        match tokio::time::timeout(self.cancel_grace, &mut *task).await {
            Ok(joined) => Some(joined),
            Err(_) => {
                warn!(
                    ticket,
                    grace_ms = self.cancel_grace.as_millis() as u64,
                    "Action ignored cancellation, aborting"
                );
                task.abort();
                None
            }
        }
    }

    fn notify_if_settled(&self) {
        if !self.state.lock().settled() {
            return;
        }
        let observer = self.observer.read().clone();
        observer.on_idle();
        self.idle_tx.send_replace(true);
        debug!("Agent is idle");
    }
}

enum Race {
    Finished(Result<anyhow::Result<Option<String>>, JoinError>),
    Cancelled,
    TimedOut,
}

/// One in-flight model completion. See [`ActionExecutor::generating`].
pub struct GeneratingGuard<'a> {
    executor: &'a ActionExecutor,
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.executor.set_generating(false);
    }
}

/// Decrements the waiter count even if the waiting future is dropped.
struct WaitGuard<'a> {
    executor: &'a ActionExecutor,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.executor.state.lock();
        state.waiting = state.waiting.saturating_sub(1);
    }
}

/// Ownership of the slot by one running action.
///
/// Dropping the lease aborts the action's task and clears the executing
/// flags, so a caller that abandons `run` never leaves the slot held.
struct SlotLease<'a> {
    executor: &'a ActionExecutor,
    ticket: u64,
    abort: Option<AbortHandle>,
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
        {
            let mut state = self.executor.state.lock();
            if state.holder.as_ref().map(|h| h.ticket) == Some(self.ticket) {
                state.holder = None;
            }
            state.executing = false;
            state.interruptible = false;
        }
        self.executor.notify_if_settled();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingObserver {
        idle_calls: AtomicUsize,
    }

    impl ExecutorObserver for CountingObserver {
        fn on_idle(&self) {
            self.idle_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_run_returns_action_text() {
        let executor = ActionExecutor::default();
        let outcome = executor
            .run(|_| async { Ok(Some("Collected 3 oak_log.".to_string())) }, None)
            .await;

        assert_eq!(outcome.message, "Collected 3 oak_log.");
        assert!(!outcome.interrupted);
        assert!(!outcome.timed_out);
        assert!(executor.is_idle());
    }

    #[tokio::test]
    async fn test_failure_releases_slot() {
        let executor = ActionExecutor::default();
        let outcome = executor
            .run(|_| async { Err(anyhow::anyhow!("no path to target")) }, None)
            .await;

        assert!(outcome.message.contains("no path to target"));
        assert!(!outcome.interrupted);
        assert!(executor.is_idle());

        let next = executor.run(|_| async { Ok(Some("ok".into())) }, None).await;
        assert_eq!(next.message, "ok");
    }

    #[tokio::test]
    async fn test_panic_releases_slot() {
        let executor = ActionExecutor::default();
        let outcome = executor
            .run(
                |_| async {
                    let explode = true;
                    if explode {
                        panic!("boom");
                    }
                    Ok(None)
                },
                None,
            )
            .await;
        assert_eq!(outcome.message, "Action panicked.");
        assert!(executor.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires() {
        let executor = ActionExecutor::default();
        let start = tokio::time::Instant::now();
        let outcome = executor
            .run(
                |token| async move {
                    token.cancelled().await;
                    Ok(None)
                },
                Some(Duration::from_millis(100)),
            )
            .await;

        assert!(outcome.interrupted);
        assert!(outcome.timed_out);
        assert_eq!(outcome.message, "Action timed out after 100ms.");
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stubborn_action_is_aborted_after_grace() {
        let executor = ActionExecutor::new(Duration::from_millis(50));
        let outcome = executor
            .run(
                |_| async {
                    std::future::pending::<()>().await;
                    Ok(None)
                },
                Some(Duration::from_millis(100)),
            )
            .await;

        assert!(outcome.timed_out);
        assert!(executor.is_idle());
    }

    #[tokio::test]
    async fn test_stop_when_idle_clears_resume() {
        let observer = Arc::new(CountingObserver {
            idle_calls: AtomicUsize::new(0),
        });
        let executor = ActionExecutor::default().with_observer(observer.clone());

        executor
            .run_resumable(|_| async { Ok(None) }, "followPlayer", None)
            .await;
        assert_eq!(executor.resume_name().as_deref(), Some("followPlayer"));
        let calls_before = observer.idle_calls.load(Ordering::SeqCst);

        executor.stop().await;
        executor.stop().await;

        assert!(executor.resume_name().is_none());
        assert!(!executor.snapshot().has_resumable);
        assert!(executor.is_idle());
        assert_eq!(observer.idle_calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_cancel_resume_keeps_action_running_state() {
        let executor = ActionExecutor::default();
        executor
            .run_resumable(|_| async { Ok(None) }, "collectAllBlocks", None)
            .await;
        executor.cancel_resume();
        assert!(executor.resume_name().is_none());
        assert!(executor.resume().await.is_none());
    }

    #[tokio::test]
    async fn test_generating_counts_as_busy() {
        let executor = ActionExecutor::default();
        let mut idle = executor.subscribe_idle();

        executor.set_generating(true);
        assert!(!executor.is_idle());
        assert!(!*idle.borrow_and_update());

        executor.set_generating(false);
        assert!(executor.is_idle());
        assert!(*idle.borrow_and_update());
    }

    #[tokio::test]
    async fn test_overlapping_generations_keep_agent_busy() {
        let observer = Arc::new(CountingObserver {
            idle_calls: AtomicUsize::new(0),
        });
        let executor = ActionExecutor::default().with_observer(observer.clone());

        let first = executor.generating();
        let second = executor.generating();
        drop(first);
        assert!(!executor.is_idle());
        assert!(executor.snapshot().generating);
        assert_eq!(observer.idle_calls.load(Ordering::SeqCst), 0);

        drop(second);
        assert!(executor.is_idle());
        assert_eq!(observer.idle_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_outcome_report() {
        let interrupted = ActionOutcome {
            message: "half done".into(),
            interrupted: true,
            timed_out: false,
        };
        assert_eq!(interrupted.into_report(), None);

        let timed_out = ActionOutcome {
            message: "Action timed out after 10ms.".into(),
            interrupted: true,
            timed_out: true,
        };
        assert_eq!(timed_out.into_report().as_deref(), Some("Action timed out after 10ms."));

        assert_eq!(ActionOutcome::default().into_report(), None);
    }
}
