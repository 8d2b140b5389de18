// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use phonebook_server_rs::models::{record::StoreKind, validate};

use crate::unit_tests::fake_hash;

#[test]
fn name_length_bounds() {
    assert!(validate::check_name(&"a".repeat(100)));
    assert!(!validate::check_name(&"a".repeat(101)));
    assert!(!validate::check_name(""));
}

#[test]
fn name_charset() {
    assert!(validate::check_name("Mario Rossi"));
    assert!(validate::check_name("O'Brian"));
    assert!(!validate::check_name("Mario;Rossi"));
    assert!(!validate::check_name("Mario:Rossi"));
    assert!(!validate::check_name("Mario,Rossi"));
    assert!(!validate::check_name("Mario\nRossi"));
}

#[test]
fn number_bounds_and_charset() {
    assert!(validate::check_number("+390123456789"));
    assert!(validate::check_number(&"1".repeat(14)));
    assert!(!validate::check_number(&"1".repeat(15)));
    assert!(!validate::check_number(""));
    assert!(!validate::check_number("12a4"));
}

#[test]
fn number_list_bounds() {
    let ten = vec!["1234567"; 10].join(",");
    let eleven = vec!["1234567"; 11].join(",");
    assert!(validate::check_numbers(&ten));
    assert!(!validate::check_numbers(&eleven));
    assert!(validate::check_numbers(""));
    assert!(!validate::check_numbers("123,"));
    assert!(!validate::check_numbers(",123"));
}

#[test]
fn username_and_password() {
    assert!(validate::check_username("bob"));
    assert!(validate::check_username("b-ob_1"));
    assert!(!validate::check_username("bob!"));
    assert!(!validate::check_username(""));

    assert!(validate::check_password("builder99"));
    assert!(!validate::check_password("sixchr"));
    assert!(validate::check_password("exact#7"));
}

#[test]
fn hash_is_exactly_86_chars() {
    assert!(validate::check_hash(&fake_hash('x')));
    assert!(validate::check_hash(&format!("{}./", "x".repeat(84))));
    assert!(!validate::check_hash(&"x".repeat(85)));
    assert!(!validate::check_hash(&"x".repeat(87)));
    assert!(!validate::check_hash(&format!("{}!", "x".repeat(85))));
}

#[test]
fn token_is_exactly_80_chars_over_the_charset() {
    assert!(validate::check_token(&[b'a'; 80]));
    assert!(validate::check_token(&[b'{'; 80]));
    assert!(!validate::check_token(&[b'a'; 79]));
    assert!(!validate::check_token(&[b'a'; 81]));
    assert!(!validate::check_token(&[b';'; 80]));
}

#[test]
fn record_lines() {
    assert!(StoreKind::Main.check_line("Mario Rossi:1234567,+3900"));
    assert!(StoreKind::Main.check_line("Mario:"));
    assert!(!StoreKind::Main.check_line(":123"));
    assert!(!StoreKind::Main.check_line("Mario"));
    assert!(!StoreKind::Main.check_line("Mario:123:456"));

    assert!(StoreKind::User.check_line(&format!("alice:{}", fake_hash('h'))));
    assert!(!StoreKind::User.check_line("alice:short"));
    assert!(!StoreKind::User.check_line(&fake_hash('h')));
}

#[test]
fn format_name_title_cases_every_word() {
    assert_eq!(validate::format_name("mario ROSSI"), "Mario Rossi");
    assert_eq!(validate::format_name("o'brian"), "O'Brian");
    assert_eq!(validate::format_name("ANNA"), "Anna");
}
