use super::*;
use chrono::Duration;

fn task(id: TaskId, name: &str, enabled: bool) -> Task {
    let now = Utc::now();
    Task {
        id,
        name: name.into(),
        source_path: format!("/mnt/{}", name),
        target_path: "/srv/strm".into(),
        cron: None,
        enabled,
        overwrite: false,
        running: false,
        last_run_at: None,
        created_at: now + Duration::seconds(id),
        updated_at: now,
    }
}

#[test]
fn test_page_request_clamps() {
    let req = PageRequest::new(0, 10_000);
    assert_eq!(req.page, 1);
    assert_eq!(req.page_size, MAX_PAGE_SIZE);
    assert_eq!(req.offset(), 0);

    let req = PageRequest::new(3, 20);
    assert_eq!(req.offset(), 40);
    assert_eq!(req.limit(), 20);

    assert_eq!(PageRequest::new(1, 0).limit(), 1);
}

#[test]
fn test_page_from_sorted() {
    let page = Page::from_sorted((1..=25).collect::<Vec<_>>(), PageRequest::new(3, 10));
    assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
    assert_eq!(page.total, 25);
    assert_eq!(page.page_count(), 3);

    let empty = Page::from_sorted((1..=5).collect::<Vec<_>>(), PageRequest::new(4, 10));
    assert!(empty.items.is_empty());
    assert_eq!(empty.total, 5);
}

#[test]
fn test_task_query_keyword_is_case_insensitive() {
    let q = TaskQuery::new().keyword("  MOV ");
    assert!(q.matches(&task(1, "movies", true)));
    assert!(!q.matches(&task(2, "shows", true)));

    // blank keyword is ignored
    assert!(TaskQuery::new().keyword("   ").matches(&task(2, "shows", true)));
}

#[test]
fn test_task_query_flags() {
    let q = TaskQuery::new().enabled(false);
    assert!(!q.matches(&task(1, "a", true)));
    assert!(q.matches(&task(2, "b", false)));

    let mut running = task(3, "c", true);
    running.running = true;
    assert!(TaskQuery::new().running(true).matches(&running));
    assert!(!TaskQuery::new().running(false).matches(&running));
}

#[test]
fn test_task_sort() {
    let mut tasks = vec![task(2, "b", true), task(1, "c", true), task(3, "a", true)];
    TaskQuery::new().sort_tasks(&mut tasks);
    let ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);

    TaskQuery::new()
        .sort(TaskSort::Name, SortOrder::Asc)
        .sort_tasks(&mut tasks);
    let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_log_query_range_is_inclusive() {
    let t0 = Utc::now();
    let log = TaskLog {
        id: 1,
        task_id: 4,
        status: JobStatus::Success,
        start_time: t0,
        end_time: Some(t0),
        message: None,
        error: None,
    };
    assert!(TaskLogQuery::new().between(Some(t0), Some(t0)).matches(&log));
    assert!(!TaskLogQuery::new()
        .between(Some(t0 + Duration::seconds(1)), None)
        .matches(&log));
    assert!(!TaskLogQuery::new().task(5).matches(&log));
    assert!(!TaskLogQuery::new().status(JobStatus::Failed).matches(&log));
    assert!(TaskLogQuery::new().task(4).status(JobStatus::Success).matches(&log));
}

#[test]
fn test_file_history_query() {
    let entry = FileHistory {
        id: 1,
        task_id: Some(1),
        file_name: "Alien.strm".into(),
        source_path: "/mnt/movies/Alien.mkv".into(),
        target_file_path: "/srv/strm/Alien.strm".into(),
        file_type: FileType::Strm,
        file_suffix: "mkv".into(),
        file_size: 42,
        created_at: Utc::now(),
    };
    assert!(FileHistoryQuery::new().keyword("alien").matches(&entry));
    assert!(FileHistoryQuery::new().suffix(".MKV").matches(&entry));
    assert!(!FileHistoryQuery::new().suffix("mp4").matches(&entry));
    assert!(!FileHistoryQuery::new().file_type(FileType::Copy).matches(&entry));
}

#[test]
fn test_stats_record() {
    let mut stats = TaskLogStats::default();
    stats.record(JobStatus::Success, 3);
    stats.record(JobStatus::Failed, 1);
    stats.record(JobStatus::Running, 1);
    assert_eq!(stats.total, 5);
    assert_eq!(stats.success_rate(), Some(75.0));
    assert_eq!(TaskLogStats::default().success_rate(), None);
}
