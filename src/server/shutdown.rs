// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The shutdown supervisor.
//!
//! Sequence: stop accepting (the listener observes the token), take writer
//! exclusivity on each pool within its deadline, snapshot every store, log
//! the clean-shutdown marker, and only then unlink the journal. If anything
//! in the sequence fails or the global deadline passes, the process exits
//! without touching the journal: it is the crash-consistency fallback and
//! the next start recovers from it.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

use crate::{cfg::config::Config, journal, server::Stores, store::snapshot};

/// Waits for the shutdown trigger and drives the sequence to completion.
/// On success the caller lets the process exit normally; a failure is the
/// escalation path (forced exit, journal retained).
pub async fn run(
    cfg: Arc<Config>,
    stores: Arc<Stores>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
) -> Result<()> {
    shutdown.cancelled().await;
    info!(active_sessions = sessions.len(), "safe shutdown started");
    sessions.close();

    let deadline = cfg.runtime.shutdown_deadline;
    let watchdog = tokio::spawn(async move {
        sleep(deadline).await;
        error!("safe shutdown timed out, exiting");
        std::process::exit(2);
    });

    let res = execute(&cfg, &stores).await;
    watchdog.abort();
    if res.is_ok() {
        info!("safe shutdown successfully completed");
    }
    res
}

/// The quiesce → snapshot → journal-delete sequence itself.
pub async fn execute(cfg: &Config, stores: &Stores) -> Result<()> {
    let deadline = cfg.runtime.store_write_deadline;

    {
        let main = stores
            .main
            .write_with_deadline(deadline)
            .await
            .context("quiescing the main store")?;
        snapshot::export(&main, &cfg.main_db_path()).await?;
        info!("saved main store");
    }
    {
        let users = stores
            .users
            .write_with_deadline(deadline)
            .await
            .context("quiescing the user stores")?;
        snapshot::export(&users.privileged, &cfg.priv_users_db_path()).await?;
        snapshot::export(&users.normal, &cfg.norm_users_db_path()).await?;
        info!("saved user stores");
    }

    journal::retire(&cfg.journal_path()).await?;
    Ok(())
}
