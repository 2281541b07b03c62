use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use crate::http::connection::Connection;
use crate::server::state::AppState;

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.server.listen_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    serve(listener, state).await
}

/// Accepts connections until the listener fails, running each one on its own
/// task. At most `max_connections` run at once; when all are busy the loop
/// waits for one to finish, waking every poll interval to log the backlog.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    let server = &state.config.server;
    let limit = Arc::new(Semaphore::new(server.max_connections));
    let poll = server.poll_interval();

    loop {
        let permit = loop {
            match tokio::time::timeout(poll, Arc::clone(&limit).acquire_owned()).await {
                Ok(permit) => break permit.context("connection limiter closed")?,
                Err(_) => {
                    tracing::debug!(max = server.max_connections, "Connection limit reached, waiting");
                }
            }
        };

        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // e.g. EMFILE; back off instead of spinning
                tracing::error!(error = %e, "Accept failed");
                tokio::time::sleep(poll).await;
                continue;
            }
        };
        info!("Accepted connection from {}", peer);

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            let _permit = permit;
            let mut conn = Connection::new(socket, peer, shared);
            if let Err(e) = conn.run().await {
                tracing::error!(peer = %peer, error = %e, "Connection error");
            }
        });
    }
}
