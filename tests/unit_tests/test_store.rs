// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use phonebook_server_rs::{
    models::record::StoreKind,
    store::sorted::{InsertOutcome, MAX_RECORDS, SortedStore, StoreError},
};

use crate::unit_tests::main_record;

fn keys(store: &SortedStore) -> Vec<&str> {
    store.iter().map(|r| r.key.as_str()).collect()
}

#[test]
fn insert_keeps_keys_sorted_and_unique() {
    let mut store = SortedStore::new(StoreKind::Main);
    for key in ["Mario", "Anna", "Zeno", "Luca", "Bea"] {
        store
            .insert_or_replace(main_record(key, "1"))
            .expect("insert");
    }
    assert_eq!(keys(&store), vec!["Anna", "Bea", "Luca", "Mario", "Zeno"]);

    let mut sorted = keys(&store);
    sorted.dedup();
    assert_eq!(sorted.len(), store.len());
}

#[test]
fn locate_reports_match_and_insertion_index() {
    let mut store = SortedStore::new(StoreKind::Main);
    for key in ["b", "d", "f"] {
        store
            .insert_or_replace(main_record(key, "1"))
            .expect("insert");
    }
    assert_eq!(store.locate("b"), Ok(0));
    assert_eq!(store.locate("d"), Ok(1));
    assert_eq!(store.locate("f"), Ok(2));
    assert_eq!(store.locate("a"), Err(0));
    assert_eq!(store.locate("c"), Err(1));
    assert_eq!(store.locate("e"), Err(2));
    assert_eq!(store.locate("g"), Err(3));
}

#[test]
fn get_on_empty_store_misses() {
    let store = SortedStore::new(StoreKind::Main);
    assert!(store.get("Mario").is_none());
}

#[test]
fn overwrite_replaces_value_in_place() {
    let mut store = SortedStore::new(StoreKind::Main);
    assert_eq!(
        store
            .insert_or_replace(main_record("Mario", "111"))
            .expect("insert"),
        InsertOutcome::Added
    );
    assert_eq!(
        store
            .insert_or_replace(main_record("Mario", "222"))
            .expect("overwrite"),
        InsertOutcome::Replaced
    );
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("Mario").expect("present").value, "222");
}

#[test]
fn identical_adds_are_idempotent() {
    let mut one = SortedStore::new(StoreKind::Main);
    let mut two = SortedStore::new(StoreKind::Main);
    one.insert_or_replace(main_record("Mario", "123"))
        .expect("insert");
    two.insert_or_replace(main_record("Mario", "123"))
        .expect("insert");
    two.insert_or_replace(main_record("Mario", "123"))
        .expect("repeat");
    assert_eq!(one.records(), two.records());
}

#[test]
fn remove_shifts_the_tail_down() {
    let mut store = SortedStore::new(StoreKind::Main);
    for key in ["a", "b", "c"] {
        store
            .insert_or_replace(main_record(key, "1"))
            .expect("insert");
    }
    assert!(store.remove("b").is_some());
    assert_eq!(keys(&store), vec!["a", "c"]);
    assert!(store.remove("b").is_none());
    assert_eq!(store.len(), 2);
}

#[test]
fn invalid_keys_never_touch_state() {
    let mut store = SortedStore::new(StoreKind::Main);
    store
        .insert_or_replace(main_record("Mario", "1"))
        .expect("insert");

    assert!(matches!(
        store.insert_or_replace(main_record("Mario;Rossi", "1")),
        Err(StoreError::InvalidRecord(_))
    ));
    assert!(matches!(
        store.insert_or_replace(main_record("Mario", "12x")),
        Err(StoreError::InvalidRecord(_))
    ));
    assert!(store.get("Mario;Rossi").is_none());
    assert!(store.remove("Mario;Rossi").is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn capacity_doubles_up_to_the_hard_cap() {
    let mut store = SortedStore::new(StoreKind::Main);
    assert_eq!(store.capacity(), 1);
    for i in 0..MAX_RECORDS {
        store
            .insert_or_replace(main_record(&format!("{i:06}"), "1"))
            .expect("insert below the cap");
    }
    assert_eq!(store.len(), MAX_RECORDS);
    assert_eq!(store.capacity(), MAX_RECORDS);

    // A new key has nowhere to go; overwriting an existing one still works.
    assert!(matches!(
        store.insert_or_replace(main_record("overflow", "1")),
        Err(StoreError::CapacityExhausted)
    ));
    assert_eq!(
        store
            .insert_or_replace(main_record("000000", "2"))
            .expect("overwrite at the cap"),
        InsertOutcome::Replaced
    );

    // Removal frees a slot for a different key.
    assert!(store.remove("000000").is_some());
    store
        .insert_or_replace(main_record("overflow", "1"))
        .expect("insert after remove");
}

#[test]
fn with_capacity_presizes_to_a_power_of_two() {
    let store = SortedStore::with_capacity(StoreKind::Main, 5);
    assert_eq!(store.capacity(), 8);
    let store = SortedStore::with_capacity(StoreKind::Main, 0);
    assert_eq!(store.capacity(), 1);
    let store = SortedStore::with_capacity(StoreKind::Main, MAX_RECORDS * 4);
    assert_eq!(store.capacity(), MAX_RECORDS);
}

#[test]
fn value_may_be_empty() {
    let mut store = SortedStore::new(StoreKind::Main);
    store
        .insert_or_replace(main_record("Mario", ""))
        .expect("insert without numbers");
    assert_eq!(store.get("Mario").expect("present").value, "");
}
