// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Readers–writer arbitration for a store pool.
//!
//! Discipline: up to [`READ_TOKENS`] concurrent readers, at most one writer
//! excluding all readers, and a pending writer gates new readers so neither
//! side starves. The lock is FIFO-fair, which gives exactly that ordering:
//! once a writer queues, later readers wait behind it.
//!
//! Guards are held only for the duration of the store operation itself:
//! never across socket I/O, and across disk I/O only on the snapshot path,
//! where the writer keeps exclusivity for the whole export.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::timeout,
};

/// Bound on concurrent readers per pool. A tuning knob, not a correctness
/// requirement.
pub const READ_TOKENS: u32 = 20;

#[derive(Debug)]
pub struct Coordinator<T> {
    inner: RwLock<T>,
}

impl<T> Coordinator<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::with_max_readers(value, READ_TOKENS),
        }
    }

    /// Acquires one of the reader tokens. Queues behind any pending writer.
    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().await
    }

    /// Acquires writer exclusivity, draining all reader tokens first.
    pub async fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().await
    }

    /// Writer acquisition with a deadline; used by the shutdown supervisor,
    /// which must not hang behind a stuck session.
    pub async fn write_with_deadline(
        &self,
        deadline: Duration,
    ) -> Result<RwLockWriteGuard<'_, T>> {
        timeout(deadline, self.inner.write())
            .await
            .context("timed out acquiring writer exclusivity")
    }
}
