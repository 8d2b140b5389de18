// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Field validators for everything that crosses the wire or the disk.
//!
//! All fields are ASCII; a field is valid when every byte is alphanumeric or
//! part of the field's extra charset, and the length bounds hold. There are
//! no escape sequences anywhere in the formats; the separators `:` `;` `,`
//! are simply forbidden inside fields.

/// Charset of the random session token (and of generated passwords).
pub const TOKEN_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890-_<'>?/#&@+-=()[]{}";

const NAME_EXTRA: &[u8] = b" '";
const USERNAME_EXTRA: &[u8] = b"-_";
const PASSWORD_EXTRA: &[u8] = b"-_<'>?/#&@+-=()[]{}";
const HASH_EXTRA: &[u8] = b"./";

pub const KEY_VALUE_SEPARATOR: char = ':';
pub const NUMBER_SEPARATOR: char = ',';

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_NUMBER_LEN: usize = 14;
pub const MAX_NUMBERS: usize = 10;
pub const MAX_NUMBERS_LEN: usize = (MAX_NUMBER_LEN + 1) * MAX_NUMBERS - 1;
pub const MAX_USERNAME_LEN: usize = 100;
pub const MIN_PASSWORD_LEN: usize = 7;
pub const MAX_PASSWORD_LEN: usize = 100;
pub const HASH_LEN: usize = 86;

fn check_generic(s: &str, extra: &[u8], max_len: usize) -> bool {
    if s.is_empty() || s.len() > max_len {
        return false;
    }
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || extra.contains(&b))
}

/// A directory name: alphanumerics, spaces and `'`, at most 100 chars.
pub fn check_name(name: &str) -> bool {
    check_generic(name, NAME_EXTRA, MAX_NAME_LEN)
}

/// A single phone number: digits and `+`, at most 14 chars.
pub fn check_number(num: &str) -> bool {
    !num.is_empty()
        && num.len() <= MAX_NUMBER_LEN
        && num.bytes().all(|b| b.is_ascii_digit() || b == b'+')
}

/// A comma-joined number list: up to 10 numbers, each valid on its own.
/// The empty string is valid (a record may carry no numbers at all).
pub fn check_numbers(nums: &str) -> bool {
    if nums.is_empty() {
        return true;
    }
    if nums.len() > MAX_NUMBERS_LEN {
        return false;
    }
    let mut count = 0;
    for num in nums.split(NUMBER_SEPARATOR) {
        count += 1;
        if count > MAX_NUMBERS || !check_number(num) {
            return false;
        }
    }
    true
}

/// A username: alphanumerics, `-` and `_`, at most 100 chars.
pub fn check_username(username: &str) -> bool {
    check_generic(username, USERNAME_EXTRA, MAX_USERNAME_LEN)
}

/// A cleartext password, before hashing: at least 7 chars.
pub fn check_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LEN
        && check_generic(password, PASSWORD_EXTRA, MAX_PASSWORD_LEN)
}

/// The 86-char b64 tail of a sha512-crypt hash.
pub fn check_hash(hash: &str) -> bool {
    hash.len() == HASH_LEN && check_generic(hash, HASH_EXTRA, HASH_LEN)
}

/// An issued session token: exactly 80 bytes over [`TOKEN_CHARSET`].
pub fn check_token(token: &[u8]) -> bool {
    token.len() == crate::models::protocol::SESSION_TOKEN_LEN
        && token
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || TOKEN_CHARSET.contains(b))
}

/// Title-cases a name word by word; both space and `'` start a new word.
/// Used on operator console input only; clients must send valid names as-is.
pub fn format_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.extend(c.to_lowercase());
        }
        if c == ' ' || c == '\'' {
            upper = true;
        }
    }
    out
}
