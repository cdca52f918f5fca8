use rust_swarm::{
    engine::MemoryEngine,
    session::{
        NoticeKind, ServiceEvent, SessionError, SessionServiceConfig, TransferId, start_service,
    },
};
use std::{path::PathBuf, time::Duration};

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir().join(format!("rust-swarm-lifecycle-{tag}-{nanos}"))
}

#[tokio::test(start_paused = true)]
async fn transfer_runs_to_completion_and_lands_in_ledger() {
    let root = temp_dir("complete");
    let mut cfg = SessionServiceConfig::from_data_dir(&root);
    cfg.completion_grace = Duration::from_secs(2);
    let (engine, control, engine_rx) = MemoryEngine::new();
    let (handle, join) = start_service(cfg, engine, engine_rx)
        .await
        .expect("start");
    let mut events = handle.subscribe();

    let id = handle
        .start_transfer("magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA&dn=x")
        .await
        .expect("start transfer");
    assert_eq!(id, TransferId([0xaa; 20]));

    assert!(control.metadata(id, "movie.mkv", 4096).await);
    assert!(control.progress(id, 4096, 4096, 1024, 2).await);
    assert!(control.complete(id).await);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let during = handle.query_status().await.expect("status");
    assert_eq!(during.active.len(), 1);
    assert_eq!(during.active[0].progress, 100.0);
    assert!(during.active[0].done);
    assert_eq!(during.completed.len(), 1);
    assert_eq!(during.completed[0].name, "movie.mkv");
    assert_eq!(during.completed[0].size_bytes, 4096);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let after = handle.query_status().await.expect("status");
    assert!(after.active.is_empty());
    assert_eq!(after.stats.completed_files, 1);
    // Still seeding.
    assert!(control.contains(id));

    let mut kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if let ServiceEvent::Notice(n) = ev {
            kinds.push(n.event_kind);
        }
    }
    assert_eq!(kinds, vec![NoticeKind::MetadataFetched, NoticeKind::Completed]);

    handle.shutdown().await.expect("shutdown");
    join.await.expect("join").expect("service");
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn handle_reports_closed_channel_after_shutdown() {
    let root = temp_dir("closed");
    let (engine, _control, engine_rx) = MemoryEngine::new();
    let (handle, join) = start_service(SessionServiceConfig::from_data_dir(&root), engine, engine_rx)
        .await
        .expect("start");
    handle.shutdown().await.expect("shutdown");
    join.await.expect("join").expect("service");

    let err = handle
        .start_transfer("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567")
        .await
        .expect_err("closed");
    assert!(matches!(err, SessionError::ChannelClosed));
    let _ = std::fs::remove_dir_all(&root);
}
