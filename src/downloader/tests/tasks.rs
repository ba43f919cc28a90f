use super::*;

#[tokio::test]
async fn test_add_task_classifies_and_describes() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let mut events = downloader.subscribe();

    let id = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();

    let task = downloader.get_task(&id).unwrap();
    assert_eq!(task.platform, Platform::Youtube);
    assert_eq!(task.status, Status::Pending);
    assert_eq!(task.title, SCRIPTED_TITLE);
    assert_eq!(task.uploader.as_deref(), Some("uploader"));
    assert_eq!(task.progress, Progress::Exact(0.0));
    assert_eq!(
        task.output_directory,
        downloader.get_config().download.default_output_dir
    );

    match events.recv().await.unwrap() {
        Event::Added {
            id: added,
            platform,
            title,
        } => {
            assert_eq!(added, id);
            assert_eq!(platform, Platform::Youtube);
            assert_eq!(title, SCRIPTED_TITLE);
        }
        other => panic!("expected Added event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_platform_classification_examples() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let cases = [
        (VIDEO_URL, Platform::Youtube),
        (
            "https://pornhub.com/view_video.php?viewkey=x",
            Platform::Pornhub,
        ),
        ("https://example.org/video", Platform::Generic),
    ];
    for (url, expected) in cases {
        let id = downloader
            .add_task(url, None, TaskOptions::default())
            .await
            .unwrap();
        assert_eq!(downloader.get_task(&id).unwrap().platform, expected, "{url}");
    }
}

#[tokio::test]
async fn test_same_url_gets_distinct_ids() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let first = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();
    let second = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(downloader.list_tasks().len(), 2);
}

#[tokio::test]
async fn test_metadata_failure_yields_unknown_title() {
    let backend = ScriptedBackend::new().with_metadata_errors(&["Video unavailable"]);
    let (downloader, backend, _temp_dir) = create_test_downloader_with(backend, |_| {});

    let id = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();

    let task = downloader.get_task(&id).unwrap();
    assert_eq!(task.title, UNKNOWN_TITLE);
    assert_eq!(task.uploader, None);
    assert_eq!(task.status, Status::Pending);
    assert_eq!(
        backend.metadata_calls.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "permanent errors are not retried"
    );
}

#[tokio::test]
async fn test_transient_metadata_failure_is_retried() {
    let backend = ScriptedBackend::new()
        .with_metadata_errors(&["Read timed out", "HTTP Error 503: Service Unavailable"]);
    let (downloader, backend, _temp_dir) = create_test_downloader_with(backend, |_| {});

    let id = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();

    assert_eq!(downloader.get_task(&id).unwrap().title, SCRIPTED_TITLE);
    assert_eq!(
        backend.metadata_calls.load(std::sync::atomic::Ordering::SeqCst),
        3
    );
}

#[tokio::test]
async fn test_metadata_lookup_can_be_disabled() {
    let (downloader, backend, _temp_dir) =
        create_test_downloader_with(ScriptedBackend::new(), |config| {
            config.metadata.fetch_metadata = false;
        });

    let id = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();

    assert_eq!(downloader.get_task(&id).unwrap().title, UNKNOWN_TITLE);
    assert_eq!(
        backend.metadata_calls.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn test_disabled_platform_is_rejected() {
    let (downloader, _backend, _temp_dir) =
        create_test_downloader_with(ScriptedBackend::new(), |config| {
            config
                .platforms
                .entry(Platform::Pornhub)
                .or_default()
                .enabled = false;
        });

    let result = downloader
        .add_task(
            "https://www.pornhub.com/view_video.php?viewkey=x",
            None,
            TaskOptions::default(),
        )
        .await;

    match result {
        Err(Error::PlatformDisabled { platform }) => assert_eq!(platform, Platform::Pornhub),
        other => panic!("expected PlatformDisabled, got {other:?}"),
    }
    assert!(downloader.list_tasks().is_empty(), "registry must be unchanged");
}

#[tokio::test]
async fn test_quality_falls_back_to_platform_preference() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    // Default youtube preference starts with 1080
    let preferred = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();
    assert_eq!(
        downloader.get_task(&preferred).unwrap().quality,
        Quality::MaxHeight(1080)
    );

    // Generic prefers "best"
    let generic = downloader
        .add_task("https://example.org/clip", None, TaskOptions::default())
        .await
        .unwrap();
    let task = downloader.get_task(&generic).unwrap();
    assert_eq!(task.quality, Quality::Best);
    assert_eq!(task.container_format, "mp4");

    // Caller options win
    let explicit = downloader
        .add_task(
            VIDEO_URL,
            None,
            TaskOptions {
                quality: Some(Quality::Worst),
                container_format: Some("webm".to_string()),
                audio_only: true,
            },
        )
        .await
        .unwrap();
    let task = downloader.get_task(&explicit).unwrap();
    assert_eq!(task.quality, Quality::Worst);
    assert_eq!(task.container_format, "webm");
    assert!(task.audio_only);
}

#[tokio::test]
async fn test_get_unknown_task() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let result = downloader.get_task(&TaskId::from("missing"));
    assert!(matches!(result, Err(Error::TaskNotFound(_))));
}

#[tokio::test]
async fn test_remove_task() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let id = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();
    let mut events = downloader.subscribe();

    assert!(downloader.remove_task(&id).await);
    assert!(!downloader.remove_task(&id).await, "second removal is a no-op");
    assert!(matches!(
        downloader.get_task(&id),
        Err(Error::TaskNotFound(_))
    ));

    match events.recv().await.unwrap() {
        Event::Removed { id: removed } => assert_eq!(removed, id),
        other => panic!("expected Removed event, got {other:?}"),
    }
    assert!(events.try_recv().is_err(), "no event for the no-op removal");
}

#[tokio::test]
async fn test_remove_finished_tasks() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let done = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();
    let pending = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();

    let outcome = downloader.start_download(&done).await.unwrap().wait().await.unwrap();
    assert!(outcome.is_completed());

    assert_eq!(downloader.remove_finished_tasks(), 1);
    assert!(downloader.get_task(&done).is_err());
    assert_eq!(downloader.get_task(&pending).unwrap().status, Status::Pending);
    assert_eq!(downloader.remove_finished_tasks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_added_task_is_visible_to_event_subscribers() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    for _ in 0..50 {
        let mut events = downloader.subscribe();
        let watcher = downloader.clone();
        let lookup = tokio::spawn(async move {
            loop {
                if let Event::Added { id, .. } = events.recv().await.unwrap() {
                    return watcher.get_task(&id).map(|task| task.status);
                }
            }
        });

        downloader
            .add_task(VIDEO_URL, None, TaskOptions::default())
            .await
            .unwrap();

        let status = lookup.await.unwrap();
        assert!(
            matches!(status, Ok(Status::Pending)),
            "task should be registered before Added is sent, got {status:?}"
        );
    }
}

#[tokio::test]
async fn test_removing_running_task_sends_no_terminal_event() {
    let backend = ScriptedBackend::new().with_hold(Duration::from_secs(60));
    let (downloader, _backend, _temp_dir) = create_test_downloader_with(backend, |_| {});
    let id = downloader
        .add_task(VIDEO_URL, None, TaskOptions::default())
        .await
        .unwrap();
    let mut events = downloader.subscribe();

    let handle = downloader.start_download(&id).await.unwrap();
    wait_for_status(&downloader, &id, Status::Downloading).await;
    assert!(downloader.remove_task(&id).await);

    let outcome = handle.wait().await.unwrap();
    assert!(matches!(
        outcome,
        TaskOutcome::Failed { ref failure } if failure.kind == FailureKind::Cancelled
    ));
    assert!(matches!(downloader.get_task(&id), Err(Error::TaskNotFound(_))));
    assert_eq!(downloader.active_count().await, 0);

    let mut removed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::Removed { id: gone } => {
                assert_eq!(gone, id);
                removed = true;
            }
            Event::Failed { .. } | Event::Completed { .. } => {
                panic!("terminal event for a removed task: {event:?}")
            }
            _ => {}
        }
    }
    assert!(removed);
}
