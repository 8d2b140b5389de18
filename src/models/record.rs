// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use thiserror::Error;

use crate::models::validate::{
    self, HASH_LEN, KEY_VALUE_SEPARATOR, MAX_NAME_LEN, MAX_NUMBERS_LEN,
    MAX_USERNAME_LEN,
};

/// Which kind of table a record belongs to. The kind selects the key and
/// value validators and the maximum serialized line length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Directory records: name → comma-joined phone numbers.
    Main,
    /// Credential records: username → sha512-crypt hash tail.
    User,
}

impl StoreKind {
    pub fn check_key(self, key: &str) -> bool {
        match self {
            StoreKind::Main => validate::check_name(key),
            StoreKind::User => validate::check_username(key),
        }
    }

    pub fn check_value(self, value: &str) -> bool {
        match self {
            StoreKind::Main => validate::check_numbers(value),
            StoreKind::User => validate::check_hash(value),
        }
    }

    pub fn max_line_len(self) -> usize {
        match self {
            StoreKind::Main => MAX_NAME_LEN + 1 + MAX_NUMBERS_LEN,
            StoreKind::User => MAX_USERNAME_LEN + 1 + HASH_LEN,
        }
    }

    /// Whether `line` is a valid serialized record of this kind:
    /// `key:value`, both halves valid, single separator implied by charsets.
    pub fn check_line(self, line: &str) -> bool {
        if line.is_empty() || line.len() > self.max_line_len() {
            return false;
        }
        match line.split_once(KEY_VALUE_SEPARATOR) {
            Some((key, value)) => self.check_key(key) && self.check_value(value),
            None => false,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::Main => "main",
            StoreKind::User => "user",
        })
    }
}

#[derive(Debug, Error)]
#[error("invalid {kind} record: {line:?}")]
pub struct InvalidRecord {
    pub kind: StoreKind,
    pub line: String,
}

/// One `(key, value)` pair. An empty value means the record carries no value
/// (a directory entry with no numbers); the serialized form is then `key:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parses and validates a `key:value` line against the store kind.
    pub fn parse(line: &str, kind: StoreKind) -> Result<Self, InvalidRecord> {
        if !kind.check_line(line) {
            return Err(InvalidRecord {
                kind,
                line: line.to_string(),
            });
        }
        let (key, value) = line
            .split_once(KEY_VALUE_SEPARATOR)
            .ok_or_else(|| InvalidRecord {
                kind,
                line: line.to_string(),
            })?;
        Ok(Self::new(key, value))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, KEY_VALUE_SEPARATOR, self.value)
    }
}
