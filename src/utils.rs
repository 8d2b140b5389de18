// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rand::RngExt;

use crate::models::{protocol::SESSION_TOKEN_LEN, validate::TOKEN_CHARSET};

/// Generates the 80-char random session token issued at login. Every byte is
/// drawn from [`TOKEN_CHARSET`], so issued tokens always pass the token
/// validator.
pub fn random_token() -> [u8; SESSION_TOKEN_LEN] {
    let mut rng = rand::rng();
    std::array::from_fn(|_| TOKEN_CHARSET[rng.random_range(0..TOKEN_CHARSET.len())])
}
