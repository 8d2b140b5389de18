// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use phonebook_server_rs::{
    auth::{self, AuthOutcome, UserClass, UserTables},
    models::{protocol::Permission, record::Record, validate},
    store::coordinator::Coordinator,
};

use crate::unit_tests::fake_hash;

fn seeded_tables() -> UserTables {
    let mut tables = UserTables::empty();
    tables
        .upsert(
            UserClass::Privileged,
            Record::new("alice", fake_hash('a')),
        )
        .expect("seed alice");
    tables
        .upsert(UserClass::Normal, Record::new("bob", fake_hash('b')))
        .expect("seed bob");
    tables
}

#[test]
fn hash_password_yields_a_valid_hash() -> Result<()> {
    let hash = auth::hash_password("wonderland1")?;
    assert_eq!(hash.len(), validate::HASH_LEN);
    assert!(validate::check_hash(&hash));

    // Same KDF and salt on both ends, so the client-side hash matches.
    assert_eq!(hash, auth::hash_password("wonderland1")?);
    assert_ne!(hash, auth::hash_password("wonderland2")?);
    Ok(())
}

#[tokio::test]
async fn authenticate_resolves_permissions() {
    let users = Coordinator::new(seeded_tables());

    assert_eq!(
        auth::authenticate(&users, "alice", &fake_hash('a')).await,
        AuthOutcome::Granted(Permission::ReadWrite)
    );
    assert_eq!(
        auth::authenticate(&users, "bob", &fake_hash('b')).await,
        AuthOutcome::Granted(Permission::Read)
    );
    assert_eq!(
        auth::authenticate(&users, "alice", &fake_hash('x')).await,
        AuthOutcome::WrongPassword
    );
    assert_eq!(
        auth::authenticate(&users, "carol", &fake_hash('a')).await,
        AuthOutcome::UnknownUser
    );
}

#[test]
fn promote_moves_the_user_between_tables() {
    let mut tables = seeded_tables();

    let moved = tables
        .upsert(UserClass::Privileged, Record::new("bob", fake_hash('b')))
        .expect("promote bob");
    assert!(moved);
    assert!(tables.privileged.get("bob").is_some());
    assert!(tables.normal.get("bob").is_none());

    let moved = tables
        .upsert(UserClass::Normal, Record::new("bob", fake_hash('b')))
        .expect("demote bob");
    assert!(moved);
    assert!(tables.privileged.get("bob").is_none());
    assert!(tables.normal.get("bob").is_some());
}

#[test]
fn upsert_without_a_move_reports_false() {
    let mut tables = seeded_tables();
    let moved = tables
        .upsert(UserClass::Normal, Record::new("carol", fake_hash('c')))
        .expect("add carol");
    assert!(!moved);
    assert!(tables.normal.get("carol").is_some());

    // Overwriting the password of an existing user is not a move either.
    let moved = tables
        .upsert(UserClass::Normal, Record::new("carol", fake_hash('d')))
        .expect("rehash carol");
    assert!(!moved);
    assert_eq!(tables.normal.get("carol").expect("present").value, fake_hash('d'));
}

#[test]
fn a_username_never_lives_in_both_tables() {
    let mut tables = seeded_tables();
    for class in [
        UserClass::Privileged,
        UserClass::Normal,
        UserClass::Normal,
        UserClass::Privileged,
    ] {
        tables
            .upsert(class, Record::new("bob", fake_hash('b')))
            .expect("move bob");
        let in_priv = tables.privileged.get("bob").is_some();
        let in_norm = tables.normal.get("bob").is_some();
        assert!(in_priv ^ in_norm);
    }
}

#[test]
fn remove_only_touches_the_requested_table() {
    let mut tables = seeded_tables();
    assert!(!tables.remove(UserClass::Privileged, "bob"));
    assert!(tables.normal.get("bob").is_some());
    assert!(tables.remove(UserClass::Normal, "bob"));
    assert!(tables.normal.get("bob").is_none());
}
