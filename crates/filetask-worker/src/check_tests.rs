use super::*;
use crate::{StrmWorkUnit, WorkerSettings};
use filetask_engine::{WorkContext, WorkUnit};
use filetask_store::{
    InvalidStatus, InvalidStrmFile, InvalidStrmQuery, MemoryStore, NewFileHistory, NewTask, Task, TaskStore,
};
use std::fs;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    store: Arc<MemoryStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    fn write(&self, relative: &str, body: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        path
    }

    async fn history(&self, task_id: Option<TaskId>, source: &Path, target: &Path) -> FileHistory {
        FileHistoryStore::create(
            self.store.as_ref(),
            NewFileHistory {
                task_id,
                file_name: source.file_name().unwrap().to_string_lossy().into_owned(),
                source_path: source.display().to_string(),
                target_file_path: target.display().to_string(),
                file_type: FileType::Strm,
                file_suffix: "mkv".into(),
                file_size: 1,
            },
        )
        .await
        .unwrap()
    }

    fn checker(&self) -> StrmChecker {
        StrmChecker::new(self.store.clone(), self.store.clone())
    }

    async fn invalid(&self) -> Vec<InvalidStrmFile> {
        self.store
            .list_invalid(&InvalidStrmQuery::new())
            .await
            .unwrap()
            .items
    }

    async fn reason_of(&self, history: &FileHistory) -> Option<InvalidReason> {
        self.invalid()
            .await
            .into_iter()
            .find(|r| r.file_history_id == history.id)
            .map(|r| r.reason)
    }
}

#[test]
fn test_pointer_forms() {
    assert_eq!(parse_pointer("http://nas:5244/d/a.mkv"), Ok(Pointer::Url));
    assert_eq!(parse_pointer("https://nas/a%20b.mkv"), Ok(Pointer::Url));
    assert_eq!(
        parse_pointer("/mnt/media/a.mkv"),
        Ok(Pointer::Path(PathBuf::from("/mnt/media/a.mkv")))
    );
    assert!(parse_pointer("").is_err());
    assert!(parse_pointer("media/a.mkv").is_err());
    assert!(parse_pointer("ftp://nas/a.mkv").unwrap_err().contains("scheme"));
    assert!(parse_pointer("http://").is_err());
}

#[tokio::test]
async fn test_detects_each_failure_kind() {
    let fx = Fixture::new();
    let media = fx.write("media/ok.mkv", "video");

    let ok_target = fx.write("out/ok.strm", &media.display().to_string());
    let ok = fx.history(None, &media, &ok_target).await;

    let gone_target = fx.path("out/gone.strm");
    let gone = fx.history(None, &media, &gone_target).await;

    let relative_target = fx.write("out/relative.strm", "media/ok.mkv");
    let relative = fx.history(None, &media, &relative_target).await;

    let lost_media = fx.path("media/lost.mkv");
    let lost_target = fx.write("out/lost.strm", &lost_media.display().to_string());
    let lost = fx.history(None, &lost_media, &lost_target).await;

    let url_target = fx.write("out/remote.strm", "http://nas:5244/d/lost.mkv\n");
    let remote = fx.history(None, &lost_media, &url_target).await;

    // copied sidecars are not pointers and are never checked
    FileHistoryStore::create(
        fx.store.as_ref(),
        NewFileHistory {
            task_id: None,
            file_name: "ok.srt".into(),
            source_path: fx.path("media/ok.srt").display().to_string(),
            target_file_path: fx.path("out/ok.srt").display().to_string(),
            file_type: FileType::Copy,
            file_suffix: "srt".into(),
            file_size: 1,
        },
    )
    .await
    .unwrap();

    let report = fx.checker().check(None, DetectionType::Manual).await.unwrap();
    assert_eq!(report, CheckReport { checked: 5, invalid: 4 });

    assert_eq!(fx.reason_of(&ok).await, None);
    assert_eq!(fx.reason_of(&gone).await, Some(InvalidReason::StrmFileNotFound));
    assert_eq!(fx.reason_of(&relative).await, Some(InvalidReason::UrlInvalid));
    assert_eq!(fx.reason_of(&lost).await, Some(InvalidReason::FileNotFound));
    assert_eq!(fx.reason_of(&remote).await, Some(InvalidReason::FileNotFound));

    let remote_row = fx
        .invalid()
        .await
        .into_iter()
        .find(|r| r.file_history_id == remote.id)
        .unwrap();
    assert_eq!(remote_row.strm_url.as_deref(), Some("http://nas:5244/d/lost.mkv"));
    assert_eq!(remote_row.detection_type, DetectionType::Manual);
    assert_eq!(remote_row.status, InvalidStatus::Pending);
}

#[tokio::test]
async fn test_recheck_updates_instead_of_duplicating() {
    let fx = Fixture::new();
    let target = fx.path("out/gone.strm");
    let history = fx.history(None, &fx.path("media/a.mkv"), &target).await;

    fx.checker().check(None, DetectionType::Auto).await.unwrap();
    let first = fx.invalid().await;
    assert_eq!(first.len(), 1);
    fx.store
        .set_status(&[first[0].id], InvalidStatus::Ignored, Some("known".into()))
        .await
        .unwrap();

    fx.checker().check(None, DetectionType::Manual).await.unwrap();
    let again = fx.invalid().await;
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].file_history_id, history.id);
    assert_eq!(again[0].status, InvalidStatus::Ignored);
    assert_eq!(again[0].detection_type, DetectionType::Manual);
}

#[tokio::test]
async fn test_task_scope_and_generated_files() {
    let fx = Fixture::new();
    fx.write("src/Film/film.mkv", "video");
    fx.write("src/Show/e01.mkv", "video");
    let task: Task = TaskStore::create(
        fx.store.as_ref(),
        NewTask::new(
            "movies",
            fx.path("src").display().to_string(),
            fx.path("dst").display().to_string(),
        ),
    )
    .await
    .unwrap();
    StrmWorkUnit::new(fx.store.clone(), WorkerSettings::new(["mkv"], ["srt"]))
        .run(&task, WorkContext::detached(task.id))
        .await
        .unwrap();

    // a row from another task that is broken
    fx.history(Some(task.id + 1), &fx.path("x.mkv"), &fx.path("none.strm"))
        .await;

    let report = fx.checker().check(Some(task.id), DetectionType::Auto).await.unwrap();
    assert_eq!(report, CheckReport { checked: 2, invalid: 0 });

    fs::remove_file(fx.path("src/Show/e01.mkv")).unwrap();
    let report = fx.checker().check(Some(task.id), DetectionType::Auto).await.unwrap();
    assert_eq!(report, CheckReport { checked: 2, invalid: 1 });
    let rows = fx.invalid().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reason, InvalidReason::FileNotFound);
    assert_eq!(rows[0].file_name, "e01.mkv");
}
