// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Snapshot export/import, one `key:value` record per line.
//!
//! Export commits atomically: the full store is written and synced to
//! `<path>.tmp`, the old snapshot is unlinked, the temp file is hard-linked
//! into place, and the temp name is unlinked. A crash anywhere in that
//! sequence leaves either the old snapshot or the new one under `path`,
//! never a partial file.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use tokio::{
    fs::{self, File},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter},
};
use tracing::warn;

use crate::{
    models::record::{Record, StoreKind},
    store::sorted::{SortedStore, StoreError},
};

/// Size of the line reader's fixed buffer.
const LINE_BUFFER_SIZE: usize = 4096;

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Writes the full store to `path`, atomically.
pub async fn export(store: &SortedStore, path: &Path) -> Result<()> {
    let tmp = tmp_path(path);

    let file = File::create(&tmp)
        .await
        .with_context(|| format!("failed to create {}", tmp.display()))?;
    let mut out = BufWriter::new(file);
    for record in store.iter() {
        out.write_all(format!("{record}\n").as_bytes())
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
    }
    out.flush()
        .await
        .with_context(|| format!("failed to flush {}", tmp.display()))?;
    out.into_inner()
        .sync_all()
        .await
        .with_context(|| format!("failed to sync {}", tmp.display()))?;

    match fs::remove_file(path).await {
        Ok(()) => {},
        Err(e) if e.kind() == ErrorKind::NotFound => {},
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to unlink {}", path.display()));
        },
    }
    fs::hard_link(&tmp, path)
        .await
        .with_context(|| format!("failed to link {} into place", tmp.display()))?;
    fs::remove_file(&tmp)
        .await
        .with_context(|| format!("failed to unlink {}", tmp.display()))?;
    Ok(())
}

/// Counts lines to presize the store before importing. A missing file counts
/// as zero lines.
async fn count_lines(path: &Path) -> Result<usize> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open {}", path.display()));
        },
    };
    let mut reader = BufReader::with_capacity(LINE_BUFFER_SIZE, file);
    let mut count = 0;
    loop {
        let buf = reader
            .fill_buf()
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        if buf.is_empty() {
            break;
        }
        count += buf.iter().filter(|&&b| b == b'\n').count();
        let n = buf.len();
        reader.consume(n);
    }
    Ok(count)
}

/// Loads a store from a snapshot file. Invalid lines are logged and skipped;
/// a missing file yields an empty store. Snapshots produced by [`export`]
/// arrive in ascending key order, so every insert takes the append path.
pub async fn import(path: &Path, kind: StoreKind) -> Result<SortedStore> {
    let expected = count_lines(path).await?;
    let mut store = SortedStore::with_capacity(kind, expected);

    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(store),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open {}", path.display()));
        },
    };
    let mut lines = BufReader::with_capacity(LINE_BUFFER_SIZE, file).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("failed to read {}", path.display()))?
    {
        match Record::parse(&line, kind) {
            Ok(record) => match store.insert_or_replace(record) {
                Ok(_) => {},
                Err(StoreError::CapacityExhausted) => {
                    bail!(
                        "maximum store size reached while importing {}",
                        path.display()
                    );
                },
                Err(StoreError::InvalidRecord(e)) => {
                    warn!("skipping record from {}: {e}", path.display());
                },
            },
            Err(e) => warn!("skipping line from {}: {e}", path.display()),
        }
    }
    Ok(store)
}
