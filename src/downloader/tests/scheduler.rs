use super::*;
use std::sync::atomic::Ordering;

async fn add(downloader: &MediaDownloader, url: &str) -> TaskId {
    downloader
        .add_task(url, None, TaskOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_download_completes_and_writes_file() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let id = add(&downloader, VIDEO_URL).await;
    let mut events = downloader.subscribe();

    let handle = downloader.start_download(&id).await.unwrap();
    assert_eq!(handle.task_id(), &id);
    let outcome = handle.wait().await.unwrap();

    let TaskOutcome::Completed { path } = outcome else {
        panic!("expected completion");
    };
    assert!(path.exists());

    let task = downloader.get_task(&id).unwrap();
    assert_eq!(task.status, Status::Completed);
    assert_eq!(task.progress, Progress::Exact(100.0));
    assert_eq!(task.result_path.as_ref(), Some(&path));
    assert!(task.started_at.is_some() && task.finished_at.is_some());

    assert!(matches!(events.recv().await.unwrap(), Event::Started { id: started } if started == id));
    assert!(matches!(events.recv().await.unwrap(), Event::Completed { id: done, .. } if done == id));
    assert_eq!(downloader.active_count().await, 0);
}

#[tokio::test]
async fn test_start_creates_output_directory() {
    let (downloader, temp_dir) = create_test_downloader().await;
    let nested = temp_dir.path().join("a").join("b").join("c");

    let id = downloader
        .add_task(VIDEO_URL, Some(nested.clone()), TaskOptions::default())
        .await
        .unwrap();
    let outcome = downloader.start_download(&id).await.unwrap().wait().await.unwrap();

    assert!(outcome.is_completed());
    assert!(nested.is_dir());
}

#[tokio::test]
async fn test_unwritable_output_directory_fails_task() {
    let (downloader, temp_dir) = create_test_downloader().await;
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let id = downloader
        .add_task(VIDEO_URL, Some(blocker.join("out")), TaskOptions::default())
        .await
        .unwrap();

    let result = downloader.start_download(&id).await;
    assert!(matches!(result, Err(Error::Io(_))), "got {result:?}");

    let task = downloader.get_task(&id).unwrap();
    assert_eq!(task.status, Status::Failed);
    assert!(task.error_message.unwrap().contains("output directory"));
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let backend = ScriptedBackend::new().with_hold(Duration::from_millis(200));
    let (downloader, _backend, _temp_dir) = create_test_downloader_with(backend, |_| {});
    let id = add(&downloader, VIDEO_URL).await;

    let handle = downloader.start_download(&id).await.unwrap();
    match downloader.start_download(&id).await {
        Err(Error::Download(DownloadError::InvalidState {
            operation,
            current_state,
            ..
        })) => {
            assert_eq!(operation, "start");
            assert!(current_state.is_active());
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }

    assert!(handle.wait().await.unwrap().is_completed());

    // Terminal tasks are rejected too
    let result = downloader.start_download(&id).await;
    assert!(matches!(
        result,
        Err(Error::Download(DownloadError::InvalidState {
            current_state: Status::Completed,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_start_unknown_task() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let result = downloader.start_download(&TaskId::from("missing")).await;
    assert!(matches!(result, Err(Error::TaskNotFound(_))));
}

#[tokio::test]
async fn test_concurrency_never_exceeds_capacity() {
    let backend = ScriptedBackend::new()
        .with_percent_ticks(&[0, 50, 100])
        .with_tick_delay(Duration::from_millis(20))
        .with_hold(Duration::from_millis(60));
    let (downloader, backend, _temp_dir) = create_test_downloader_with(backend, |config| {
        config.download.max_workers = 2;
    });

    let mut handles = Vec::new();
    for i in 0..6 {
        let id = add(&downloader, &format!("https://example.org/video/{i}")).await;
        handles.push(downloader.start_download(&id).await.unwrap());
    }

    // Sample registry state while the batch drains
    let mut max_downloading = 0;
    while downloader.active_count().await > 0 {
        let downloading = downloader
            .list_tasks()
            .iter()
            .filter(|task| task.status == Status::Downloading)
            .count();
        max_downloading = max_downloading.max(downloading);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    for handle in handles {
        assert!(handle.wait().await.unwrap().is_completed());
    }
    assert!(max_downloading <= 2, "saw {max_downloading} downloading tasks");
    assert!(backend.peak_running.load(Ordering::SeqCst) <= 2);
    assert_eq!(backend.transfers.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_cancel_running_and_queued_tasks() {
    let backend = ScriptedBackend::new().with_hold(Duration::from_secs(30));
    let (downloader, backend, _temp_dir) = create_test_downloader_with(backend, |config| {
        config.download.max_workers = 1;
    });

    let running = add(&downloader, "https://example.org/running").await;
    let queued = add(&downloader, "https://example.org/queued").await;
    let running_handle = downloader.start_download(&running).await.unwrap();
    let queued_handle = downloader.start_download(&queued).await.unwrap();

    wait_for_status(&downloader, &running, Status::Downloading).await;
    assert_eq!(downloader.get_task(&queued).unwrap().status, Status::Queued);
    assert_eq!(downloader.active_count().await, 2);

    downloader.cancel(&queued).await.unwrap();
    let outcome = queued_handle.wait().await.unwrap();
    assert!(matches!(
        outcome,
        TaskOutcome::Failed { ref failure } if failure.kind == FailureKind::Cancelled
    ));

    running_handle.cancel();
    let outcome = running_handle.wait().await.unwrap();
    assert!(matches!(
        outcome,
        TaskOutcome::Failed { ref failure } if failure.kind == FailureKind::Cancelled
    ));

    for id in [&running, &queued] {
        let task = downloader.get_task(id).unwrap();
        assert_eq!(task.status, Status::Failed);
        assert_eq!(task.failure, Some(FailureKind::Cancelled));
    }
    assert_eq!(backend.transfers.load(Ordering::SeqCst), 1, "queued task never ran");
    assert_eq!(downloader.active_count().await, 0);
}

#[tokio::test]
async fn test_cancel_requires_active_execution() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let id = add(&downloader, VIDEO_URL).await;

    let result = downloader.cancel(&id).await;
    assert!(matches!(
        result,
        Err(Error::Download(DownloadError::NotActive { .. }))
    ));

    let result = downloader.cancel(&TaskId::from("missing")).await;
    assert!(matches!(result, Err(Error::TaskNotFound(_))));
}

#[tokio::test]
async fn test_engine_failures_are_classified() {
    let cases = [
        (
            "ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate for some users.",
            FailureKind::AgeRestricted,
        ),
        (
            "ERROR: [youtube] abc: The uploader has not made this video available in your country",
            FailureKind::GeoRestricted,
        ),
        ("ERROR: [youtube] abc: Private video", FailureKind::Unavailable),
        ("ERROR: unable to write data: disk full", FailureKind::Generic),
    ];

    for (message, expected) in cases {
        let backend = ScriptedBackend::new().failing_with(message);
        let (downloader, _backend, _temp_dir) = create_test_downloader_with(backend, |_| {});
        let id = add(&downloader, VIDEO_URL).await;
        let mut events = downloader.subscribe();

        let outcome = downloader.start_download(&id).await.unwrap().wait().await.unwrap();
        let TaskOutcome::Failed { failure } = outcome else {
            panic!("expected failure for {message}");
        };
        assert_eq!(failure.kind, expected, "{message}");

        let task = downloader.get_task(&id).unwrap();
        assert_eq!(task.status, Status::Failed);
        assert_eq!(task.failure, Some(expected));
        assert_eq!(task.error_message.as_deref(), Some(message));

        let _started = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            Event::Failed { id: failed, kind, .. } => {
                assert_eq!(failed, id);
                assert_eq!(kind, expected);
            }
            other => panic!("expected Failed event, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_backend_panic_fails_only_that_task() {
    let (downloader, _backend, _temp_dir) =
        create_test_downloader_with(ScriptedBackend::new().panicking(), |_| {});
    let id = add(&downloader, VIDEO_URL).await;

    let outcome = downloader.start_download(&id).await.unwrap().wait().await.unwrap();
    assert!(matches!(
        outcome,
        TaskOutcome::Failed { ref failure } if failure.kind == FailureKind::Generic
    ));
    assert_eq!(downloader.get_task(&id).unwrap().status, Status::Failed);
    assert_eq!(downloader.active_count().await, 0);
}

#[tokio::test]
async fn test_wait_timeout_does_not_stop_work() {
    let backend = ScriptedBackend::new().with_hold(Duration::from_millis(300));
    let (downloader, _backend, _temp_dir) = create_test_downloader_with(backend, |_| {});
    let id = add(&downloader, VIDEO_URL).await;

    let mut handle: DownloadHandle = downloader.start_download(&id).await.unwrap();
    let early = handle.wait_timeout(Duration::from_millis(10)).await.unwrap();
    assert!(early.is_none());

    let outcome = handle.wait_timeout(Duration::from_secs(5)).await.unwrap();
    assert!(outcome.as_ref().is_some_and(TaskOutcome::is_completed));

    // The outcome is kept for later calls
    let again = handle.wait_timeout(Duration::from_millis(1)).await.unwrap();
    assert_eq!(again, outcome);
    assert!(handle.wait().await.unwrap().is_completed());
}
