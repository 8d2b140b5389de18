// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The in-memory sorted table backing every store.
//!
//! Records are kept in a contiguous array, strictly ascending by key under
//! byte-wise comparison, with no duplicates. Lookup is a binary search that
//! also yields the insertion index on a miss, so insert and remove are a
//! single shift of the tail. Capacity doubles on demand and is capped at
//! 2^[`MAX_POWER`] records; removal never shrinks it, the space is reused.

use std::cmp::Ordering;

use thiserror::Error;

use crate::models::record::{InvalidRecord, Record, StoreKind};

/// Power-of-two bound on any store's record count.
pub const MAX_POWER: u32 = 16;
/// Hard cap on the number of records per store.
pub const MAX_RECORDS: usize = 1 << MAX_POWER;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store reached its maximum size of {MAX_RECORDS} records")]
    CapacityExhausted,
    #[error(transparent)]
    InvalidRecord(#[from] InvalidRecord),
}

/// What [`SortedStore::insert_or_replace`] actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    Replaced,
}

#[derive(Debug)]
pub struct SortedStore {
    kind: StoreKind,
    records: Vec<Record>,
    capacity: usize,
}

impl SortedStore {
    pub fn new(kind: StoreKind) -> Self {
        Self::with_capacity(kind, 0)
    }

    /// Presizes for `expected` records, rounding the capacity up to the next
    /// power of two within [1, 2^16]. Used by the snapshot importer, which
    /// knows the line count up front.
    pub fn with_capacity(kind: StoreKind, expected: usize) -> Self {
        let capacity = expected.next_power_of_two().clamp(1, MAX_RECORDS);
        Self {
            kind,
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Binary search by key. `Ok(i)` means `records[i].key == key`; `Err(i)`
    /// is the index at which inserting `key` keeps the array sorted.
    ///
    /// Keys outside the current range short-circuit, so importing an already
    /// sorted snapshot hits the append path on every line.
    pub fn locate(&self, key: &str) -> Result<usize, usize> {
        let n = self.records.len();
        if n == 0 {
            return Err(0);
        }
        if key > self.records[n - 1].key.as_str() {
            return Err(n);
        }
        let mut lo = 0usize;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let half = lo + (hi - lo) / 2;
            match key.cmp(self.records[half].key.as_str()) {
                Ordering::Less => hi = half,
                Ordering::Greater => lo = half,
                Ordering::Equal => return Ok(half),
            }
        }
        match key.cmp(self.records[lo].key.as_str()) {
            Ordering::Equal => Ok(lo),
            Ordering::Less => Err(lo),
            Ordering::Greater => {
                if key == self.records[hi].key {
                    Ok(hi)
                } else {
                    Err(hi)
                }
            },
        }
    }

    /// Looks a record up by key. An invalid key can match nothing.
    pub fn get(&self, key: &str) -> Option<&Record> {
        if !self.kind.check_key(key) {
            return None;
        }
        self.locate(key).ok().map(|i| &self.records[i])
    }

    /// Inserts a record, replacing the value in place when the key already
    /// exists. Fails when the record does not validate for this store's kind
    /// or when a new key would push the store past 2^16 records.
    pub fn insert_or_replace(
        &mut self,
        record: Record,
    ) -> Result<InsertOutcome, StoreError> {
        if !self.kind.check_key(&record.key) || !self.kind.check_value(&record.value) {
            return Err(InvalidRecord {
                kind: self.kind,
                line: record.to_string(),
            }
            .into());
        }
        match self.locate(&record.key) {
            Ok(i) => {
                self.records[i] = record;
                Ok(InsertOutcome::Replaced)
            },
            Err(i) => {
                self.grow_for_one()?;
                self.records.insert(i, record);
                Ok(InsertOutcome::Added)
            },
        }
    }

    /// Removes the record with `key`, returning it. The tail shifts down by
    /// one; capacity is left as-is.
    pub fn remove(&mut self, key: &str) -> Option<Record> {
        if !self.kind.check_key(key) {
            return None;
        }
        match self.locate(key) {
            Ok(i) => Some(self.records.remove(i)),
            Err(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    fn grow_for_one(&mut self) -> Result<(), StoreError> {
        if self.records.len() < self.capacity {
            return Ok(());
        }
        if self.capacity >= MAX_RECORDS {
            return Err(StoreError::CapacityExhausted);
        }
        self.capacity *= 2;
        self.records.reserve_exact(self.capacity - self.records.len());
        Ok(())
    }
}
