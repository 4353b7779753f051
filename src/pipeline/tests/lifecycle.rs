use super::*;
use crate::db::Database;
use crate::pipeline::test_helpers::Finish;
use tempfile::tempdir;

#[tokio::test]
async fn test_shutdown_rejects_new_jobs() {
    let (pipeline, _temp_dir) =
        create_test_pipeline(ScriptedEngine::downloads(), Arc::new(MemoryResolver::default())).await;
    let mut events = pipeline.subscribe();

    pipeline.shutdown().await.unwrap();

    assert!(!pipeline.is_accepting());
    assert!(matches!(
        pipeline
            .create_job(new_job("https://example.com/v/1", None))
            .await,
        Err(Error::ShuttingDown)
    ));

    let shutdown = std::iter::from_fn(|| events.try_recv().ok())
        .any(|event| matches!(event, Event::Shutdown));
    assert!(shutdown);
}

#[tokio::test]
async fn test_shutdown_waits_for_running_jobs() {
    let resolver = Arc::new(MemoryResolver::default().with("a", MemoryDestination::default()));
    let (pipeline, _temp_dir) =
        create_test_pipeline(ScriptedEngine::downloads(), Arc::clone(&resolver)).await;

    let job = pipeline
        .create_job(new_job("https://example.com/v/1", Some(&["a"])))
        .await
        .unwrap();
    pipeline.shutdown().await.unwrap();

    // Whatever finished inside the grace period is terminal once shutdown returns
    let job = pipeline.get_job(job.id).await.unwrap();
    assert!(job.status.is_terminal(), "status {}", job.status);
}

#[tokio::test]
async fn test_shutdown_cancels_stalled_fetch_after_grace() {
    let engine = ScriptedEngine::new(vec!["downloading"], Finish::Stall);
    let (pipeline, _temp_dir) =
        create_test_pipeline(engine, Arc::new(MemoryResolver::default())).await;

    let job = pipeline
        .create_job(new_job("https://example.com/v/1", None))
        .await
        .unwrap();
    pipeline.shutdown().await.unwrap();

    let job = pipeline.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let failure = job.meta.error.unwrap();
    assert_eq!(failure.code, "cancelled");
    assert_eq!(failure.stage, Some(Stage::Fetching));
}

#[tokio::test]
async fn test_startup_fails_interrupted_jobs() {
    let temp_dir = tempdir().unwrap();
    let config = test_config(&temp_dir);
    let db = Arc::new(
        Database::new(&config.persistence.database_path)
            .await
            .unwrap(),
    );

    let mut fetching = JobRecord::new(new_job("https://example.com/v/1", None));
    fetching.status = JobStatus::Fetching;
    let mut uploading = JobRecord::new(new_job("https://example.com/v/2", Some(&["a"])));
    uploading.status = JobStatus::Uploading;
    let mut completed = JobRecord::new(new_job("https://example.com/v/3", None));
    completed.status = JobStatus::Completed;
    for job in [&fetching, &uploading, &completed] {
        db.save_job(job).await.unwrap();
    }

    let pipeline = Pipeline::with_collaborators(
        config,
        Arc::clone(&db),
        Arc::new(ScriptedEngine::downloads()),
        Arc::new(MemoryResolver::default()),
    )
    .await
    .unwrap();

    let fetching = pipeline.get_job(fetching.id).await.unwrap();
    assert_eq!(fetching.status, JobStatus::Failed);
    let failure = fetching.meta.error.unwrap();
    assert_eq!(failure.code, "interrupted");
    assert_eq!(failure.stage, Some(Stage::Fetching));

    let uploading = pipeline.get_job(uploading.id).await.unwrap();
    assert_eq!(uploading.status, JobStatus::Failed);
    assert_eq!(uploading.meta.error.unwrap().stage, Some(Stage::Uploading));

    let completed = pipeline.get_job(completed.id).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert!(completed.meta.error.is_none());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(&temp_dir);
    config.executor.workers = 0;

    match Pipeline::new(config).await {
        Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("executor.workers")),
        Err(other) => panic!("expected config error, got {other:?}"),
        Ok(_) => panic!("expected config error"),
    }
}

#[tokio::test]
async fn test_callback_faults_are_republished() {
    let (pipeline, _temp_dir) =
        create_test_pipeline(ScriptedEngine::downloads(), Arc::new(MemoryResolver::default())).await;
    let mut events = pipeline.subscribe();

    let handle = pipeline.executor().submit("probe", async { Ok(1u8) });
    handle.on_complete(|_| async { Err(Error::Execution("callback broke".into())) });
    handle.wait().await;

    let fault = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if let Event::Fault { task, error } = events.recv().await.unwrap() {
                return (task, error);
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(fault.0, "probe");
    assert!(fault.1.contains("callback broke"));
}
