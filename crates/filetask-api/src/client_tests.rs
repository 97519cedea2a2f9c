use super::*;
use crate::server::ApiServer;
use crate::testing::Harness;
use filetask_store::{DetectionType, JobStatus};
use tokio::net::TcpListener;

async fn serve() -> (Harness, ApiServer, ApiClient) {
    let harness = Harness::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = ApiServer::start(listener, harness.state.clone()).unwrap();
    let client = ApiClient::new(server.base_url());
    (harness, server, client)
}

#[test]
fn test_take_line_handles_split_chunks() {
    let mut buffer = b"{\"a\":1}\n{\"b\"".to_vec();
    assert_eq!(take_line(&mut buffer).as_deref(), Some(&b"{\"a\":1}"[..]));
    assert_eq!(take_line(&mut buffer), None);
    buffer.extend_from_slice(b":2}\n");
    assert_eq!(take_line(&mut buffer).as_deref(), Some(&b"{\"b\":2}"[..]));
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_client_round_trips_task_operations() {
    let (_harness, server, client) = serve().await;

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");

    let task = client
        .create_task(&NewTask::new("movies", "/mnt/in", "/srv/out").with_cron("0 3 * * *"))
        .await
        .unwrap();
    let fetched = client.get_task(task.id).await.unwrap();
    assert_eq!(fetched, task);

    let updated = client
        .update_task(
            task.id,
            &UpdateTaskRequest {
                name: Some("films".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "films");
    assert_eq!(updated.cron.as_deref(), Some("0 3 * * *"));

    let page = client
        .list_tasks(&TaskListParams {
            keyword: Some("film".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    client.delete_task(task.id).await.unwrap();
    let err = client.get_task(task.id).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), format!("Task not found: {}", task.id));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_event_stream_follows_a_run() {
    let (harness, server, client) = serve().await;
    let task = harness.task("live").await;

    let mut events = client.task_events(task.id).await.unwrap();
    let accepted = client.execute_task(task.id).await.unwrap();

    let conflict = client.execute_task(task.id).await.unwrap_err();
    assert_eq!(conflict.status(), Some(409));

    let mut seen = Vec::new();
    loop {
        let event = events.next().await.unwrap().expect("stream ended early");
        assert_eq!(event.job_id(), accepted.job_id);
        if matches!(event, TaskEvent::Progress { progress: 50, .. }) {
            client.stop_task(task.id).await.unwrap();
        }
        let done = event.is_terminal();
        seen.push(event);
        if done {
            break;
        }
    }
    assert!(matches!(seen[0], TaskEvent::Started { .. }));
    assert!(matches!(
        seen.last(),
        Some(TaskEvent::Finished {
            status: JobStatus::Stopped,
            ..
        })
    ));

    match client.task_status(task.id).await.unwrap() {
        TaskStatusReport::Idle { last_log: Some(log) } => assert_eq!(log.status, JobStatus::Stopped),
        other => panic!("expected idle status, got {:?}", other),
    }
    let logs = client.task_logs(task.id, &LogListParams::default()).await.unwrap();
    assert_eq!(logs.total, 1);

    drop(events);
    harness.state.orchestrator.shutdown(Duration::from_secs(1)).await;
    server.stop().await;
}

#[tokio::test]
async fn test_client_invalid_strm_operations() {
    let (harness, server, client) = serve().await;
    let task = harness.task("movies").await;
    filetask_store::FileHistoryStore::create(
        harness.store.as_ref(),
        filetask_store::NewFileHistory {
            task_id: Some(task.id),
            file_name: "a.mkv".into(),
            source_path: "/nonexistent/a.mkv".into(),
            target_file_path: "/nonexistent/a.strm".into(),
            file_type: filetask_store::FileType::Strm,
            file_suffix: "mkv".into(),
            file_size: 1,
        },
    )
    .await
    .unwrap();

    let report = client
        .check_invalid(&CheckRequest {
            task_id: Some(task.id),
            detection_type: Some(DetectionType::Auto),
        })
        .await
        .unwrap();
    assert_eq!(report, CheckReport { checked: 1, invalid: 1 });

    let page = client.list_invalid(&InvalidListParams::default()).await.unwrap();
    assert_eq!(page.items[0].detection_type, DetectionType::Auto);
    let id = page.items[0].id;

    let changed = client
        .mark_invalid(&StatusChangeRequest {
            ids: vec![id],
            status: filetask_store::InvalidStatus::Confirmed,
            note: None,
        })
        .await
        .unwrap();
    assert_eq!(changed, 1);
    let stats = client.invalid_stats(&RangeParams::default()).await.unwrap();
    assert_eq!(stats.confirmed, 1);

    assert_eq!(client.delete_invalid(&[id]).await.unwrap(), 1);
    assert_eq!(client.clear_history().await.unwrap(), 1);

    let err = client.delete_history(&[]).await.unwrap_err();
    assert_eq!(err.status(), Some(400));

    server.stop().await;
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = ApiClient::new(format!("http://{}", addr))
        .health()
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unreachable { .. }));
    assert_eq!(err.status(), None);
}
