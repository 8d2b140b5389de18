// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use phonebook_server_rs::{
    cfg::{
        cli::{self, CliAction},
        config::{Config, DEFAULT_PORT},
        logger::init_logger,
    },
    journal,
    server::{Stores, console, listener, shutdown},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = match cli::parse_args(std::env::args().skip(1))? {
        CliAction::Help => {
            println!("{}", cli::USAGE);
            return Ok(());
        },
        CliAction::Run(args) => args,
    };

    // Load config
    let mut cfg = match &args.config {
        Some(path) => cli::resolve_config_path(path)
            .and_then(Config::load_from_file)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        cfg.server.port = port;
    } else if cfg.server.port == DEFAULT_PORT {
        println!(
            "The port has not been selected,\nso the default one will be used.\n(execute with -h for help)\n"
        );
    }
    let cfg = Arc::new(cfg);

    std::fs::create_dir_all(cfg.log_dir()).with_context(|| {
        format!("failed to create {}", cfg.log_dir().display())
    })?;
    let logger_config = cfg.runtime.resources_dir.join("logger.yaml");
    let _logger = init_logger(
        logger_config.exists().then_some(logger_config.as_path()),
        &cfg.log_dir(),
    )?;

    info!("server is starting");

    // A journal on disk means the last shutdown was forced; Stores::load
    // replays it over the main snapshot before anything is served.
    let stores = Arc::new(Stores::load(&cfg).await?);

    let shutdown = CancellationToken::new();
    let (journal, _journal_task) = journal::spawn(
        &cfg.journal_path(),
        cfg.runtime.journal_queue_depth,
        shutdown.clone(),
    )
    .await?;

    let listener = listener::bind(&cfg).await?;

    let sessions = TaskTracker::new();
    tokio::spawn(listener::serve(
        listener,
        stores.clone(),
        journal.clone(),
        cfg.clone(),
        shutdown.clone(),
        sessions.clone(),
    ));
    tokio::spawn(console::run(
        stores.clone(),
        journal.clone(),
        cfg.clone(),
        shutdown.clone(),
    ));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("safe shutdown requested");
                shutdown.cancel();
            }
        });
    }
    drop(journal);

    if let Err(e) = shutdown::run(cfg, stores, shutdown, sessions).await {
        // Escalation: exit without unlinking the journal so the next start
        // recovers from it.
        error!("safe shutdown failed: {e:#}");
        drop(_logger);
        std::process::exit(2);
    }
    Ok(())
}
