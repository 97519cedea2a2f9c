use super::*;
use crate::event::TaskEvent;
use crate::event_bus::ChannelHandler;
use crate::testing::{Harness, collect_until_finished, cooperative, gated, instant_success, work_fn};
use crate::work_unit::{WorkOutcome, WorkUnitFailure};
use filetask_store::TaskLogQuery;

async fn only_log(h: &Harness, task_id: TaskId) -> filetask_store::TaskLog {
    let page = TaskLogStore::list(h.store.as_ref(), &TaskLogQuery::new().task(task_id))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    page.items.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_add_task_runs_to_success() {
    let h = Harness::new(instant_success());
    let task = h.task("movies").await;

    let handle = h.queue.add_task(task.id).await.unwrap();
    // acceptance is visible before the runner gets a chance to run
    let snapshot = h.queue.get_task_status(task.id).unwrap();
    assert_eq!(snapshot.status, JobStatus::Pending);
    assert_eq!(snapshot.job_id, handle.job_id);
    let accepted = h.reload(&task).await;
    assert!(accepted.running);
    assert_eq!(accepted.last_run_at, Some(snapshot.accepted_at));
    assert_eq!(only_log(&h, task.id).await.status, JobStatus::Pending);

    assert_eq!(handle.wait().await, JobStatus::Success);

    let log = only_log(&h, task.id).await;
    assert_eq!(log.status, JobStatus::Success);
    assert!(log.end_time.is_some());
    assert_eq!(log.message.as_deref(), Some("done"));
    assert!(!h.reload(&task).await.running);
    assert!(h.queue.get_task_status(task.id).is_none());
}

#[tokio::test]
async fn test_second_add_is_rejected_until_first_finishes() {
    let (unit, gate) = gated();
    let h = Harness::new(unit);
    let task = h.task("tv").await;

    let first = h.queue.add_task(task.id).await.unwrap();
    let second = h.queue.add_task(task.id).await;
    assert!(matches!(second, Err(EngineError::TaskAlreadyRunning(id)) if id == task.id));

    gate.add_permits(1);
    assert_eq!(first.wait().await, JobStatus::Success);

    let third = h.queue.add_task(task.id).await.unwrap();
    assert_ne!(third.job_id, first.job_id);
    gate.add_permits(1);
    assert_eq!(third.wait().await, JobStatus::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_accept_exactly_one() {
    let (unit, gate) = gated();
    let h = Harness::new(unit);
    let task_id = h.task("race").await.id;

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let queue = h.queue.clone();
            tokio::spawn(async move { queue.add_task(task_id).await })
        })
        .collect();

    let mut accepted = Vec::new();
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(handle) => accepted.push(handle),
            Err(EngineError::TaskAlreadyRunning(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(accepted.len(), 1);

    gate.add_permits(1);
    assert_eq!(accepted[0].wait().await, JobStatus::Success);
    assert_eq!(only_log(&h, task_id).await.status, JobStatus::Success);
}

#[tokio::test]
async fn test_different_tasks_run_independently() {
    let (unit, gate) = gated();
    let h = Harness::new(unit);
    let a = h.task("a").await;
    let b = h.task("b").await;

    let ha = h.queue.add_task(a.id).await.unwrap();
    let hb = h.queue.add_task(b.id).await.unwrap();
    assert_eq!(h.queue.active_count(), 2);

    gate.add_permits(2);
    assert_eq!(ha.wait().await, JobStatus::Success);
    assert_eq!(hb.wait().await, JobStatus::Success);
    assert!(h.queue.active_jobs().is_empty());
}

#[tokio::test]
async fn test_failure_is_recorded() {
    let h = Harness::new(work_fn(|_ctx| async {
        Err(WorkUnitFailure::new("source directory missing"))
    }));
    let task = h.task("broken").await;
    let (handler, mut rx) = ChannelHandler::channel();
    h.bus.subscribe(task.id, handler);

    let handle = h.queue.add_task(task.id).await.unwrap();
    assert_eq!(handle.wait().await, JobStatus::Failed);

    let log = only_log(&h, task.id).await;
    assert_eq!(log.status, JobStatus::Failed);
    assert_eq!(log.error.as_deref(), Some("source directory missing"));

    let events = collect_until_finished(&mut rx).await;
    assert!(matches!(
        events.last(),
        Some(TaskEvent::Finished { status: JobStatus::Failed, error: Some(e), .. }) if e == "source directory missing"
    ));
}

#[tokio::test]
async fn test_panic_is_contained() {
    let h = Harness::new(work_fn(|ctx| async move {
        if ctx.task_id() == 1 {
            panic!("boom");
        }
        Ok(WorkOutcome::default())
    }));
    let bad = h.task("bad").await;
    let good = h.task("good").await;

    let handle = h.queue.add_task(bad.id).await.unwrap();
    assert_eq!(handle.wait().await, JobStatus::Failed);
    let log = only_log(&h, bad.id).await;
    assert_eq!(log.error.as_deref(), Some("work unit panicked: boom"));
    assert!(!h.reload(&bad).await.running);

    let handle = h.queue.add_task(good.id).await.unwrap();
    assert_eq!(handle.wait().await, JobStatus::Success);
    // the panicking task can run again
    assert!(h.queue.add_task(bad.id).await.is_ok());
}

#[tokio::test]
async fn test_progress_events_are_ordered() {
    let h = Harness::new(work_fn(|ctx| async move {
        for value in [10, 5, 50, 50, 100] {
            ctx.report_progress(value);
            tokio::task::yield_now().await;
        }
        Ok(WorkOutcome::default())
    }));
    let task = h.task("progress").await;
    let (handler, mut rx) = ChannelHandler::channel();
    h.bus.subscribe(task.id, handler);

    let handle = h.queue.add_task(task.id).await.unwrap();
    let events = collect_until_finished(&mut rx).await;
    handle.wait().await;

    assert!(matches!(events.first(), Some(TaskEvent::Started { .. })));
    let values: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![10, 10, 50, 50, 100]);
    assert!(events.iter().all(|e| e.job_id() == handle.job_id));

    // nothing after the terminal event
    let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn test_stop_running_job_cooperatively() {
    let h = Harness::new(cooperative());
    let task = h.task("long").await;
    let (handler, mut rx) = ChannelHandler::channel();
    h.bus.subscribe(task.id, handler);

    let handle = h.queue.add_task(task.id).await.unwrap();
    // wait until the work unit is actually running
    loop {
        if let Some(TaskEvent::Progress { .. }) = rx.recv().await {
            break;
        }
    }
    h.queue.stop_task(task.id).await.unwrap();
    assert_eq!(handle.wait().await, JobStatus::Stopped);

    let log = only_log(&h, task.id).await;
    assert_eq!(log.status, JobStatus::Stopped);
    assert!(log.end_time.is_some());
    assert!(log.message.unwrap().starts_with("cancelled at"));
    assert!(!h.reload(&task).await.running);
}

#[tokio::test]
async fn test_stop_before_checkpoint_still_finalizes_stopped() {
    let (unit, gate) = gated();
    let h = Harness::new(unit);
    let task = h.task("unaware").await;

    let handle = h.queue.add_task(task.id).await.unwrap();
    while h.queue.get_task_status(task.id).map(|s| s.status) != Some(JobStatus::Running) {
        tokio::task::yield_now().await;
    }
    h.queue.stop_task(task.id).await.unwrap();
    assert!(h.queue.get_task_status(task.id).unwrap().cancel_requested);

    // the unit never looks at the flag and finishes normally
    gate.add_permits(1);
    assert_eq!(handle.wait().await, JobStatus::Stopped);
    let log = only_log(&h, task.id).await;
    assert_eq!(log.status, JobStatus::Stopped);
    assert!(log.end_time.is_some());
}

#[tokio::test]
async fn test_stop_pending_job_never_runs() {
    let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = runs.clone();
    let h = Harness::new(work_fn(move |_ctx| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        async { Ok(WorkOutcome::default()) }
    }));
    let task = h.task("pending").await;
    let (handler, mut rx) = ChannelHandler::channel();
    h.bus.subscribe(task.id, handler);

    // current-thread runtime: the runner cannot start before we yield
    let handle = h.queue.add_task(task.id).await.unwrap();
    h.queue.stop_task(task.id).await.unwrap();

    assert_eq!(handle.try_status(), Some(JobStatus::Stopped));
    assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);

    let events = collect_until_finished(&mut rx).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        TaskEvent::Finished {
            status: JobStatus::Stopped,
            ..
        }
    ));

    let log = only_log(&h, task.id).await;
    assert_eq!(log.status, JobStatus::Stopped);
    assert!(log.end_time.is_some());
    assert!(!h.reload(&task).await.running);
}

#[tokio::test]
async fn test_error_cases() {
    let h = Harness::new(instant_success());
    assert!(matches!(
        h.queue.add_task(404).await,
        Err(EngineError::TaskNotFound(404))
    ));
    assert!(matches!(
        h.queue.stop_task(404).await,
        Err(EngineError::TaskNotRunning(404))
    ));
    let stats = h.store.stats(None).await.unwrap();
    assert_eq!(stats.total, 0);
}

#[tokio::test]
async fn test_trigger_fires_add_task() {
    let h = Harness::new(instant_success());
    let task = h.task("cron").await;
    h.queue.fire(task.id).await.unwrap();
    assert!(h.queue.get_task_status(task.id).is_some());
}

#[tokio::test]
async fn test_shutdown_stops_jobs_and_rejects_new_work() {
    let h = Harness::new(cooperative());
    let a = h.task("a").await;
    let b = h.task("b").await;
    let ha = h.queue.add_task(a.id).await.unwrap();
    let hb = h.queue.add_task(b.id).await.unwrap();
    tokio::task::yield_now().await;

    assert!(h.queue.shutdown(Duration::from_secs(2)).await);
    assert_eq!(ha.try_status(), Some(JobStatus::Stopped));
    assert_eq!(hb.try_status(), Some(JobStatus::Stopped));
    assert!(matches!(
        h.queue.add_task(a.id).await,
        Err(EngineError::ShuttingDown)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_records_token_driven_exit_as_stopped() {
    // The unit returns the moment its token trips, racing the queue's
    // own cancel bookkeeping on another worker thread.
    for _ in 0..20 {
        let h = Harness::new(work_fn(|ctx| async move {
            ctx.cancellation_token().cancelled().await;
            Ok(WorkOutcome::with_message("token tripped"))
        }));
        let task = h.task("interrupted").await;
        let handle = h.queue.add_task(task.id).await.unwrap();
        while h.queue.get_task_status(task.id).map(|s| s.status) != Some(JobStatus::Running) {
            tokio::task::yield_now().await;
        }

        assert!(h.queue.shutdown(Duration::from_secs(2)).await);
        assert_eq!(handle.wait().await, JobStatus::Stopped);
        let log = only_log(&h, task.id).await;
        assert_eq!(log.status, JobStatus::Stopped);
        assert!(!h.reload(&task).await.running);
    }
}

#[tokio::test]
async fn test_shutdown_times_out_on_stuck_job() {
    let (unit, _gate) = gated();
    let h = Harness::new(unit);
    let task = h.task("stuck").await;
    h.queue.add_task(task.id).await.unwrap();
    tokio::task::yield_now().await;

    assert!(!h.queue.shutdown(Duration::from_millis(50)).await);
}
