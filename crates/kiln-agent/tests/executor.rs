mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use common::ScriptedSkills;
use kiln_agent::{ActionExecutor, ExecutorObserver};
use kiln_core::Skills;

struct CountingObserver(AtomicUsize);

impl ExecutorObserver for CountingObserver {
    fn on_idle(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_actions_never_overlap() {
    let executor = Arc::new(ActionExecutor::new(Duration::from_millis(100)));
    let skills = Arc::new(ScriptedSkills::default());

    let mut handles = Vec::new();
    for i in 0..6 {
        let executor = executor.clone();
        let skills = skills.clone();
        handles.push(tokio::spawn(async move {
            executor
                .run(
                    move |cancel| async move { skills.move_away(i as f64, &cancel).await },
                    None,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(skills.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(skills.in_flight.load(Ordering::SeqCst), 0);
    assert!(executor.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_new_submission_preempts_holder() {
    let executor = Arc::new(ActionExecutor::new(Duration::from_millis(100)));
    let skills = Arc::new(ScriptedSkills::default());

    let follow = {
        let executor = executor.clone();
        let skills = skills.clone();
        tokio::spawn(async move {
            executor
                .run_resumable(
                    move |cancel| {
                        let skills = skills.clone();
                        async move { skills.follow_player("Bob", 3.0, &cancel).await }
                    },
                    "followPlayer",
                    None,
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(executor.is_executing());

    let skills_for_move = skills.clone();
    let outcome = executor
        .run(
            move |cancel| async move { skills_for_move.move_away(4.0, &cancel).await },
            None,
        )
        .await;
    assert_eq!(outcome.message, "Moved away 4 blocks.");

    let preempted = follow.await.unwrap();
    assert!(preempted.interrupted);
    assert_eq!(preempted.into_report(), None);
    assert_eq!(skills.max_in_flight.load(Ordering::SeqCst), 1);

    // The resumable identity survives preemption.
    assert_eq!(executor.resume_name().as_deref(), Some("followPlayer"));
}

#[tokio::test]
async fn test_finished_action_keeps_result_when_preempted_late() {
    let executor = Arc::new(ActionExecutor::new(Duration::from_millis(100)));
    let finished = Arc::new(Notify::new());

    // Submits as soon as the first action has returned, before its caller
    // has observed the completion.
    let late = {
        let executor = executor.clone();
        let finished = finished.clone();
        tokio::spawn(async move {
            finished.notified().await;
            executor
                .run(|_| async { Ok(Some("Moved away 2 blocks.".to_string())) }, None)
                .await
        })
    };
    tokio::task::yield_now().await;

    let first = executor
        .run(
            move |_| async move {
                finished.notify_one();
                Ok(Some("Collected 3 oak_log.".to_string()))
            },
            None,
        )
        .await;

    assert!(!first.interrupted);
    assert_eq!(first.into_report().as_deref(), Some("Collected 3 oak_log."));

    let second = late.await.unwrap();
    assert_eq!(second.message, "Moved away 2 blocks.");
    assert!(executor.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
    let executor =
        Arc::new(ActionExecutor::new(Duration::from_millis(100)).with_observer(observer.clone()));
    let skills = Arc::new(ScriptedSkills::default());

    let held = {
        let executor = executor.clone();
        let skills = skills.clone();
        tokio::spawn(async move {
            executor
                .run(move |cancel| async move { skills.stay(&cancel).await }, None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(executor.is_executing());

    executor.stop().await;
    let outcome = held.await.unwrap();
    assert!(outcome.interrupted);
    assert!(executor.is_idle());
    let after_first = observer.0.load(Ordering::SeqCst);
    assert!(after_first >= 1);

    executor.stop().await;
    executor.stop().await;
    assert!(executor.is_idle());
    assert_eq!(observer.0.load(Ordering::SeqCst), after_first);
    assert_eq!(skills.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_reports_and_releases() {
    let executor = ActionExecutor::new(Duration::from_millis(100));
    let skills = Arc::new(ScriptedSkills::default());

    let start = tokio::time::Instant::now();
    let outcome = executor
        .run(
            move |cancel| async move { skills.stay(&cancel).await },
            Some(Duration::from_millis(100)),
        )
        .await;

    assert!(outcome.timed_out);
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(
        outcome.into_report().as_deref(),
        Some("Action timed out after 100ms.")
    );
    assert!(executor.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_resume_restarts_last_resumable() {
    let executor = Arc::new(ActionExecutor::new(Duration::from_millis(100)));
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    executor
        .run_resumable(
            move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            },
            "collectAllBlocks",
            None,
        )
        .await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    assert!(executor.resume().await.is_some());
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    executor.cancel_resume();
    assert!(executor.resume().await.is_none());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}
