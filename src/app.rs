use crate::{
    api,
    config::Config,
    engine::MemoryEngine,
    session::{SessionServiceConfig, join_service, start_service},
};
use anyhow::Context;
use tokio::time::Duration;

const API_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        log = %config.general.log_level,
        data_dir = %config.general.data_dir,
        "starting app"
    );

    let session_cfg = SessionServiceConfig::from_config(&config);
    tracing::info!(
        downloads = %session_cfg.download_dir.display(),
        state = %session_cfg.state_path.display(),
        trackers = session_cfg.add_options.announce.len(),
        "session service config"
    );

    // Only the in-process engine ships with this crate; embedders pass their own
    // `SwarmEngine` to `start_service`.
    tracing::warn!("no swarm backend linked; using in-memory engine");
    let (engine, _engine_control, engine_rx) = MemoryEngine::new();

    let (sessions, service_join) = start_service(session_cfg, engine, engine_rx)
        .await
        .context("failed to start session service")?;
    let mut service_done = Box::pin(join_service(service_join));

    let api_server = if config.api.enabled {
        Some(api::serve(&config.api, sessions.clone()).await?)
    } else {
        tracing::info!("api disabled");
        None
    };

    tracing::info!("press Ctrl+C to stop");
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            tracing::warn!("received Ctrl+C");
        }
        res = &mut service_done => {
            tracing::error!("session service exited unexpectedly");
            res.context("session service failed")?;
            anyhow::bail!("session service stopped");
        }
    }

    tracing::info!("shutting down gracefully");
    if let Err(err) = sessions.shutdown().await {
        tracing::warn!(error = %err, "session service shutdown request failed");
    }
    if let Err(err) = service_done.await {
        tracing::warn!(error = %err, "session service ended with error");
    }

    if let Some(server) = api_server {
        match tokio::time::timeout(API_STOP_TIMEOUT, server.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "api server ended with error"),
            Err(_) => tracing::warn!(
                timeout_secs = API_STOP_TIMEOUT.as_secs(),
                "api server did not stop in time; open event streams dropped"
            ),
        }
    }

    tracing::info!("stopped");
    Ok(())
}
