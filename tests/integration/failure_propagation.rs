//! Failure handling and cancellation across a full run.

use crate::support::{register, ScriptedRunner};
use maestro::core::task::TaskStatus;
use maestro::orchestration::ParallelExecutor;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_failure_skips_downstream_stages() {
    let (manager, ids) = register("@pm Plan -> @builder Build -> @qa Verify");
    let runner = Arc::new(ScriptedRunner::new().failing("builder"));

    let executor = ParallelExecutor::new(Arc::clone(&manager), Arc::clone(&runner) as _);
    let report = executor.run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.completed, vec![ids[0].clone()]);
    assert_eq!(report.failed, vec![ids[1].clone()]);
    assert_eq!(report.skipped, vec![ids[2].clone()]);
    // qa never reached the capability.
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);

    let qa = manager.read().await.get_result(&ids[2]).cloned().unwrap();
    assert_eq!(qa.error.as_deref(), Some("Skipped: all dependencies failed"));
}

#[tokio::test]
async fn test_partial_parent_failure_still_runs_dependent() {
    let (manager, ids) = register("@pm,ba Plan -> @qa Verify");
    let runner = Arc::new(ScriptedRunner::new().failing("ba"));

    let executor = ParallelExecutor::new(manager, Arc::clone(&runner) as _);
    let report = executor.run().await.unwrap();

    assert_eq!(report.failed, vec![ids[1].clone()]);
    assert!(report.skipped.is_empty());
    assert!(report.completed.contains(&ids[2]));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 3);

    // The dependent saw the surviving parent's section first.
    let qa = &report.results[&ids[2]];
    assert_eq!(qa.output, "qa done: ## Output from pm");
}

#[tokio::test]
async fn test_sibling_failure_does_not_abort_fanout() {
    let (manager, ids) = register("@pm,ba,qa Review the design");
    let runner = Arc::new(ScriptedRunner::new().failing("ba"));

    let executor = ParallelExecutor::new(manager, runner).with_max_concurrent(3);
    let report = executor.run().await.unwrap();

    assert_eq!(report.completed, vec![ids[0].clone(), ids[2].clone()]);
    assert_eq!(report.failed, vec![ids[1].clone()]);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_cancel_before_dispatch_reaches_no_agent() {
    let (manager, ids) = register("@pm Plan -> @builder Build");
    let runner = Arc::new(ScriptedRunner::new());

    {
        let mut manager = manager.write().await;
        assert!(manager.cancel_task(&ids[0]).unwrap());
    }

    let executor = ParallelExecutor::new(Arc::clone(&manager), Arc::clone(&runner) as _);
    let report = executor.run().await.unwrap();

    assert!(report.cancellation_occurred());
    assert_eq!(report.cancelled, vec![ids[0].clone()]);
    assert_eq!(report.skipped, vec![ids[1].clone()]);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_running_task_mid_flight() {
    let (manager, ids) = register("@pm Plan -> @builder Build");
    let mut runner = ScriptedRunner::new();
    runner.delay = Duration::from_secs(30);
    let runner = Arc::new(runner);

    let executor = ParallelExecutor::new(Arc::clone(&manager), Arc::clone(&runner) as _);
    let run = tokio::spawn(async move { executor.run().await });

    // Wait until the first task is actually in flight, then cancel it.
    loop {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = manager.read().await.get_task(&ids[0]).unwrap().status;
        if status == TaskStatus::Running {
            break;
        }
    }
    assert!(manager.write().await.cancel_task(&ids[0]).unwrap());

    let report = run.await.unwrap().unwrap();
    assert!(report.cancellation_occurred());
    assert_eq!(report.cancelled, vec![ids[0].clone()]);
    assert_eq!(report.skipped, vec![ids[1].clone()]);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
}
