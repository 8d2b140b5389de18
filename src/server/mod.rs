// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use tracing::info;

use crate::{
    auth::UserTables,
    cfg::config::Config,
    journal,
    models::record::StoreKind,
    store::{coordinator::Coordinator, snapshot, sorted::SortedStore},
};

pub mod console;
pub mod listener;
pub mod session;
pub mod shutdown;

/// The three runtime stores behind their two coordinators. Worker tasks
/// share this through an `Arc`; all mutation goes through the coordinators.
#[derive(Debug)]
pub struct Stores {
    pub main: Coordinator<SortedStore>,
    pub users: Coordinator<UserTables>,
}

impl Stores {
    /// Imports every table from disk. A journal left behind by an unclean
    /// shutdown means the main snapshot is stale by exactly the journal's
    /// contents, so it is replayed before anything is served.
    pub async fn load(cfg: &Config) -> Result<Self> {
        let mut main = snapshot::import(&cfg.main_db_path(), StoreKind::Main).await?;
        let journal_path = cfg.journal_path();
        if journal::needs_recovery(&journal_path) {
            info!("recovering main store from {}", journal_path.display());
            let applied = journal::replay(&journal_path, &mut main).await?;
            info!(applied, "successfully recovered main store");
        }
        let privileged =
            snapshot::import(&cfg.priv_users_db_path(), StoreKind::User).await?;
        let normal = snapshot::import(&cfg.norm_users_db_path(), StoreKind::User).await?;
        Ok(Self {
            main: Coordinator::new(main),
            users: Coordinator::new(UserTables::new(privileged, normal)),
        })
    }
}
