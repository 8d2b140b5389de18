// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The append-only recovery journal.
//!
//! One line per acknowledged mutation: `1key:value\n` for add/overwrite,
//! `0key:\n` for delete. A single writer task owns the file; sessions and
//! the operator console submit records through a bounded queue and get an
//! acknowledgement only after the line has been fsync'd. SUCCESS is never
//! sent to a client before that acknowledgement arrives.
//!
//! The file is opened in append mode: after a crash recovery the replayed
//! records stay in place and new mutations append behind them, which keeps
//! invariant "snapshot + journal = current state" until the next clean
//! shutdown deletes the file.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::{
    models::{
        record::{Record, StoreKind},
        validate::KEY_VALUE_SEPARATOR,
    },
    store::sorted::{SortedStore, StoreError},
};

const OP_ADD: char = '1';
const OP_DEL: char = '0';

/// A mutation to be made durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    Add(Record),
    Del(String),
}

impl JournalOp {
    fn to_line(&self) -> String {
        match self {
            JournalOp::Add(record) => format!("{OP_ADD}{record}\n"),
            JournalOp::Del(key) => format!("{OP_DEL}{key}{KEY_VALUE_SEPARATOR}\n"),
        }
    }
}

struct JournalRequest {
    line: String,
    ack: oneshot::Sender<Result<()>>,
}

/// Cheap handle cloned into every session and the console.
#[derive(Clone)]
pub struct JournalHandle {
    tx: mpsc::Sender<JournalRequest>,
}

impl JournalHandle {
    /// Queues a mutation record and returns a receiver that resolves once
    /// the line is on disk. Queue order defines replay order, so callers
    /// submit while still holding the store's writer guard and only await
    /// the receiver after dropping it.
    pub async fn submit(&self, op: JournalOp) -> Result<oneshot::Receiver<Result<()>>> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(JournalRequest {
                line: op.to_line(),
                ack,
            })
            .await
            .map_err(|_| anyhow!("journal writer is gone"))?;
        Ok(rx)
    }

    /// Submit-and-wait convenience for callers that hold no guard.
    pub async fn append(&self, op: JournalOp) -> Result<()> {
        let rx = self.submit(op).await?;
        rx.await.map_err(|_| anyhow!("journal writer dropped the request"))?
    }
}

/// Opens the journal file (append, create) and spawns the writer task.
/// The task exits once every handle has been dropped and the queue drained.
pub async fn spawn(
    path: &Path,
    queue_depth: usize,
    shutdown: CancellationToken,
) -> Result<(JournalHandle, JoinHandle<()>)> {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open journal {}", path.display()))?;
    let (tx, rx) = mpsc::channel(queue_depth);
    let task = tokio::spawn(run_writer(file, path.to_path_buf(), rx, shutdown));
    Ok((JournalHandle { tx }, task))
}

async fn run_writer(
    mut file: File,
    path: PathBuf,
    mut rx: mpsc::Receiver<JournalRequest>,
    shutdown: CancellationToken,
) {
    while let Some(req) = rx.recv().await {
        let res = write_record(&mut file, &req.line).await;
        if let Err(e) = &res {
            // Non-recoverable: the journal is the crash-consistency fallback.
            // Leave the file in place and ask for a safe shutdown.
            error!("journal {} write failed: {e:#}", path.display());
            shutdown.cancel();
        }
        let _ = req.ack.send(res);
    }
}

async fn write_record(file: &mut File, line: &str) -> Result<()> {
    file.write_all(line.as_bytes())
        .await
        .context("failed to append journal record")?;
    file.sync_data().await.context("failed to fsync journal")?;
    Ok(())
}

/// Whether a journal file is present, i.e. the last shutdown was not clean.
pub fn needs_recovery(path: &Path) -> bool {
    path.exists()
}

/// Deletes the journal after a clean shutdown has committed fresh snapshots.
pub async fn retire(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e)
            .with_context(|| format!("failed to unlink journal {}", path.display())),
    }
}

fn parse_entry(line: &str) -> Result<JournalOp> {
    let mut chars = line.chars();
    let op = chars.next().context("empty journal line")?;
    let rest = chars.as_str();
    if !StoreKind::Main.check_line(rest) {
        bail!("invalid journal record: {line:?}");
    }
    match op {
        OP_ADD => Ok(JournalOp::Add(Record::parse(rest, StoreKind::Main)?)),
        OP_DEL => {
            let (key, _) = rest
                .split_once(KEY_VALUE_SEPARATOR)
                .context("journal delete record without separator")?;
            Ok(JournalOp::Del(key.to_string()))
        },
        other => bail!("unknown journal opcode: {other:?}"),
    }
}

/// Replays the journal onto a freshly imported snapshot. Invalid lines are
/// logged and skipped; deleting an absent key is a no-op, exactly as the
/// live DEL path treats it.
pub async fn replay(path: &Path, store: &mut SortedStore) -> Result<u64> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to open journal {}", path.display()));
        },
    };
    let mut lines = BufReader::new(file).lines();
    let mut applied = 0u64;
    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("failed to read journal {}", path.display()))?
    {
        match parse_entry(&line) {
            Ok(JournalOp::Add(record)) => match store.insert_or_replace(record) {
                Ok(_) => applied += 1,
                Err(StoreError::CapacityExhausted) => {
                    bail!("maximum store size reached while recovering the journal");
                },
                Err(StoreError::InvalidRecord(e)) => warn!("skipping journal add: {e}"),
            },
            Ok(JournalOp::Del(key)) => {
                store.remove(&key);
                applied += 1;
            },
            Err(e) => warn!("skipping journal line: {e}"),
        }
    }
    Ok(applied)
}
