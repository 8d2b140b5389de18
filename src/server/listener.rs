// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    cfg::config::Config,
    journal::JournalHandle,
    server::{Stores, session::SessionChannel},
    state_machine::session_states::{SessionCtx, run_session},
};

pub async fn bind(cfg: &Config) -> Result<TcpListener> {
    TcpListener::bind(cfg.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr()))
}

/// Accept loop: one task per connection, tracked so the shutdown supervisor
/// can see what is still live. Ends when shutdown is requested.
pub async fn serve(
    listener: TcpListener,
    stores: Arc<Stores>,
    journal: JournalHandle,
    cfg: Arc<Config>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "server started");
    }
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    info!(%peer, "received connection");
                    let stores = stores.clone();
                    let journal = journal.clone();
                    let cfg = cfg.clone();
                    let shutdown = shutdown.clone();
                    sessions.spawn(handle_connection(
                        stream, peer, stores, journal, cfg, shutdown,
                    ));
                },
                Err(e) => warn!("accept failed: {e}"),
            },
        }
    }
    info!("stopped accepting connections");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    stores: Arc<Stores>,
    journal: JournalHandle,
    cfg: Arc<Config>,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, "set_nodelay failed: {e}");
    }
    let channel = SessionChannel::new(stream, &cfg, shutdown);
    let mut ctx = SessionCtx::new(channel, stores, journal, cfg, peer);
    match run_session(&mut ctx).await {
        Ok(()) => debug!(%peer, "session closed"),
        Err(e) => warn!(%peer, "session failed: {e:#}"),
    }
}
