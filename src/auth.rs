// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Credential tables and the authentication check.
//!
//! Both user tables live behind the single User-pool coordinator, so a
//! promote/demote (remove from one table, add to the other) happens inside
//! one writer section and no reader can ever observe a username in both
//! tables, or in neither, mid-move.
//!
//! Passwords never reach the server in cleartext: clients send the 86-char
//! b64 tail of a sha512-crypt (`$6$`) hash and the server compares hashes.
//! The operator console runs the same KDF locally when creating users. The
//! salt is the original protocol's fixed empty salt; `hash_password` is the
//! only place that would change for per-user salts.

use anyhow::{Result, anyhow, ensure};
use sha_crypt::{ROUNDS_DEFAULT, Sha512Params, sha512_crypt_b64};

use crate::{
    models::{
        protocol::Permission,
        record::{Record, StoreKind},
        validate,
    },
    store::{
        coordinator::Coordinator,
        sorted::{SortedStore, StoreError},
    },
};

/// Which credential table an operator command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserClass {
    Privileged,
    Normal,
}

/// The two credential tables, guarded together by one coordinator.
#[derive(Debug)]
pub struct UserTables {
    pub privileged: SortedStore,
    pub normal: SortedStore,
}

impl UserTables {
    pub fn new(privileged: SortedStore, normal: SortedStore) -> Self {
        Self { privileged, normal }
    }

    pub fn empty() -> Self {
        Self::new(
            SortedStore::new(StoreKind::User),
            SortedStore::new(StoreKind::User),
        )
    }

    fn table_mut(&mut self, class: UserClass) -> &mut SortedStore {
        match class {
            UserClass::Privileged => &mut self.privileged,
            UserClass::Normal => &mut self.normal,
        }
    }

    /// Adds or overwrites a credential record in `class`'s table and drops
    /// the username from the other table. Returns `true` when the user moved
    /// across tables (a promotion or demotion). On failure nothing moves.
    pub fn upsert(
        &mut self,
        class: UserClass,
        record: Record,
    ) -> Result<bool, StoreError> {
        let username = record.key.clone();
        self.table_mut(class).insert_or_replace(record)?;
        let other = match class {
            UserClass::Privileged => UserClass::Normal,
            UserClass::Normal => UserClass::Privileged,
        };
        Ok(self.table_mut(other).remove(&username).is_some())
    }

    /// Removes a username from `class`'s table only.
    pub fn remove(&mut self, class: UserClass, username: &str) -> bool {
        self.table_mut(class).remove(username).is_some()
    }
}

/// What a login attempt resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted(Permission),
    UnknownUser,
    WrongPassword,
}

/// Looks the username up (Normal table first, then Privileged) and compares
/// the presented hash. Takes one reader token on the User coordinator.
pub async fn authenticate(
    users: &Coordinator<UserTables>,
    username: &str,
    hash: &str,
) -> AuthOutcome {
    let tables = users.read().await;
    if let Some(record) = tables.normal.get(username) {
        return if record.value == hash {
            AuthOutcome::Granted(Permission::Read)
        } else {
            AuthOutcome::WrongPassword
        };
    }
    if let Some(record) = tables.privileged.get(username) {
        return if record.value == hash {
            AuthOutcome::Granted(Permission::ReadWrite)
        } else {
            AuthOutcome::WrongPassword
        };
    }
    AuthOutcome::UnknownUser
}

/// Runs the sha512-crypt KDF over a cleartext password and returns the
/// 86-char b64 tail that the credential tables store.
pub fn hash_password(password: &str) -> Result<String> {
    let params = Sha512Params::new(ROUNDS_DEFAULT)
        .map_err(|e| anyhow!("invalid sha512-crypt parameters: {e:?}"))?;
    let hash = sha512_crypt_b64(password.as_bytes(), b"", &params)
        .map_err(|e| anyhow!("sha512-crypt failed: {e:?}"))?;
    ensure!(validate::check_hash(&hash), "generated an invalid hash");
    Ok(hash)
}
