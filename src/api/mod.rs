use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ApiConfig;
use crate::session::SessionServiceHandle;

mod error;
mod handlers;
mod router;


/// Request bodies above this size are rejected with 413.
pub(crate) const MAX_JSON_BODY: usize = 8 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub(crate) sessions: SessionServiceHandle,
}

impl ApiState {
    pub fn new(sessions: SessionServiceHandle) -> Self {
        Self { sessions }
    }
}

/// Running HTTP server. Dropping it leaves the server running; call [`ApiServer::stop`].
pub struct ApiServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<std::io::Result<()>>,
}

impl ApiServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting connections and waits for open requests to finish.
    /// Long-lived event streams keep this pending; callers bound it with a timeout.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join.await??;
        Ok(())
    }
}

pub async fn serve(cfg: &ApiConfig, sessions: SessionServiceHandle) -> anyhow::Result<ApiServer> {
    let bind_ip: std::net::IpAddr = cfg
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid api.host '{}': {e}", cfg.host))?;
    let listener = tokio::net::TcpListener::bind(SocketAddr::new(bind_ip, cfg.port)).await?;
    let addr = listener.local_addr()?;

    let app = router::build_app(ApiState::new(sessions));
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tracing::info!(addr = %addr, "api server listening");
    let join = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        join,
    })
}
