use super::*;
use chrono::Timelike;
use std::time::Duration;

#[derive(Default)]
struct RecordingTrigger {
    fired: Mutex<Vec<TaskId>>,
    reject: bool,
}

#[async_trait]
impl TaskTrigger for RecordingTrigger {
    async fn fire(&self, task_id: TaskId) -> Result<(), EngineError> {
        self.fired.lock().push(task_id);
        if self.reject {
            return Err(EngineError::TaskAlreadyRunning(task_id));
        }
        Ok(())
    }
}

impl RecordingTrigger {
    fn count(&self, task_id: TaskId) -> usize {
        self.fired.lock().iter().filter(|id| **id == task_id).count()
    }
}

fn task(id: TaskId, cron: Option<&str>) -> Task {
    let now = Utc::now();
    Task {
        id,
        name: format!("task-{}", id),
        source_path: "/src".into(),
        target_path: "/dst".into(),
        cron: cron.map(String::from),
        enabled: true,
        overwrite: false,
        running: false,
        last_run_at: None,
        created_at: now,
        updated_at: now,
    }
}

const EVERY_SECOND: &str = "* * * * * *";

#[tokio::test]
async fn test_schedule_and_unschedule() {
    let scheduler = CronScheduler::new(Arc::new(RecordingTrigger::default()));
    scheduler.schedule_task(&task(1, Some("*/1 * * * *"))).unwrap();

    assert!(scheduler.is_scheduled(1));
    assert_eq!(scheduler.timer_count(), 1);
    assert_eq!(scheduler.cron_expression(1).as_deref(), Some("*/1 * * * *"));
    let next = scheduler.next_fire_time(1).unwrap();
    assert!(next > Utc::now());

    assert!(scheduler.unschedule_task(1));
    assert!(!scheduler.unschedule_task(1));
    assert_eq!(scheduler.timer_count(), 0);
    assert!(scheduler.next_fire_time(1).is_none());
}

#[tokio::test]
async fn test_invalid_cron_is_rejected() {
    let scheduler = CronScheduler::new(Arc::new(RecordingTrigger::default()));
    let err = scheduler.schedule_task(&task(1, Some("every day"))).unwrap_err();
    assert!(matches!(err, EngineError::InvalidSchedule { .. }));
    let err = scheduler.schedule_task(&task(2, None)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidSchedule { .. }));
    assert_eq!(scheduler.timer_count(), 0);
}

#[tokio::test]
async fn test_reschedule_keeps_single_timer() {
    let trigger = Arc::new(RecordingTrigger::default());
    let scheduler = CronScheduler::new(trigger.clone());
    scheduler.schedule_task(&task(1, Some(EVERY_SECOND))).unwrap();
    scheduler.schedule_task(&task(1, Some(EVERY_SECOND))).unwrap();
    assert_eq!(scheduler.timer_count(), 1);

    tokio::time::sleep(Duration::from_millis(3200)).await;
    let fired = trigger.count(1);
    // one timer firing once a second, never two
    assert!((2..=4).contains(&fired), "fired {} times", fired);
}

#[tokio::test]
async fn test_scheduling_does_not_fire_immediately() {
    let trigger = Arc::new(RecordingTrigger::default());
    let scheduler = CronScheduler::new(trigger.clone());
    scheduler.schedule_task(&task(1, Some("0 0 1 1 *"))).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trigger.count(1), 0);
    assert_eq!(scheduler.fire_count(1), Some(0));
}

#[tokio::test]
async fn test_rejected_fire_keeps_timer_armed() {
    let trigger = Arc::new(RecordingTrigger {
        reject: true,
        ..Default::default()
    });
    let scheduler = CronScheduler::new(trigger.clone());
    scheduler.schedule_task(&task(3, Some(EVERY_SECOND))).unwrap();

    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert!(trigger.count(3) >= 2);
    assert!(scheduler.is_scheduled(3));
}

#[tokio::test]
async fn test_unschedule_stops_firing() {
    let trigger = Arc::new(RecordingTrigger::default());
    let scheduler = CronScheduler::new(trigger.clone());
    scheduler.schedule_task(&task(1, Some(EVERY_SECOND))).unwrap();
    scheduler.unschedule_task(1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(trigger.count(1), 0);
}

#[tokio::test]
async fn test_shutdown_and_drop_disarm_all() {
    let trigger = Arc::new(RecordingTrigger::default());
    let scheduler = CronScheduler::new(trigger.clone());
    for id in 1..=3 {
        scheduler.schedule_task(&task(id, Some(EVERY_SECOND))).unwrap();
    }
    assert_eq!(scheduler.scheduled_ids(), vec![1, 2, 3]);
    assert_eq!(scheduler.shutdown(), 3);
    assert_eq!(scheduler.timer_count(), 0);

    let dropped = CronScheduler::new(trigger.clone());
    dropped.schedule_task(&task(4, Some(EVERY_SECOND))).unwrap();
    drop(dropped);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(trigger.fired.lock().is_empty());
}

#[test]
fn test_next_occurrence_follows_timezone() {
    let schedule = parse_cron("0 3 * * *").unwrap();
    let after = Utc::now();

    let utc = next_occurrence(&schedule, after, ScheduleTimezone::Utc).unwrap();
    assert_eq!(utc.hour(), 3);
    assert_eq!(utc.minute(), 0);

    let local = next_occurrence(&schedule, after, ScheduleTimezone::Local).unwrap();
    assert_eq!(local.with_timezone(&Local).hour(), 3);
    assert!(local > after);
}

#[tokio::test]
async fn test_scheduler_defaults_to_local_time() {
    let trigger = Arc::new(RecordingTrigger::default());
    assert_eq!(
        CronScheduler::new(trigger.clone()).timezone(),
        ScheduleTimezone::Local
    );

    let scheduler = CronScheduler::new(trigger).with_timezone(ScheduleTimezone::Utc);
    scheduler.schedule_task(&task(1, Some("30 6 * * *"))).unwrap();
    let next = scheduler.next_fire_time(1).unwrap();
    assert_eq!((next.hour(), next.minute()), (6, 30));
}
