// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire protocol bytes and frame parsing.
//!
//! The protocol is cleartext and framed by socket read boundaries: one
//! `read()` yields one frame, at most [`MAX_FRAME_LEN`] bytes.
//!
//! ```text
//! login request:  '0' username ':' hash
//! login response: status, then on success: permission byte + 80-char token
//! request:        OP TOKEN80 ';' DATA
//! response:       status, then on SEARCH success: "key:value"
//! ```
//!
//! Request frames are parsed by position, never by scanning: byte 0 is the
//! opcode, bytes 1..81 the token, byte 81 must be `;`, the data starts at 82.

use std::convert::TryFrom;

use thiserror::Error;

/// Length of the session token issued at login.
pub const SESSION_TOKEN_LEN: usize = 80;
/// Maximum frame size; a read that fills the whole buffer is rejected.
pub const MAX_FRAME_LEN: usize = 4096;

/// Offset of the `;` separator inside an authenticated request frame.
pub const SEPARATOR_OFFSET: usize = 1 + SESSION_TOKEN_LEN;
/// Offset of the data field inside an authenticated request frame.
pub const DATA_OFFSET: usize = SEPARATOR_OFFSET + 1;
/// Shortest parseable authenticated frame: opcode + token + `;` + one byte.
pub const MIN_REQUEST_LEN: usize = DATA_OFFSET + 1;

pub const QUERY_ITEMS_SEPARATOR: u8 = b';';

/// Request opcodes, first byte of every client frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    TokenReq = b'0',
    Search = b'1',
    Add = b'2',
    Del = b'3',
}

/// Returned when the first frame byte is not a defined opcode.
#[derive(Debug, Error)]
#[error("invalid request opcode: 0x{0:02x}")]
pub struct UnknownRequest(pub u8);

impl TryFrom<u8> for RequestKind {
    type Error = UnknownRequest;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            b'0' => Self::TokenReq,
            b'1' => Self::Search,
            b'2' => Self::Add,
            b'3' => Self::Del,
            other => return Err(UnknownRequest(other)),
        })
    }
}

/// Response status, first byte of every server reply.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success = b'0',
    Fail = b'1',
    InvalidRequest = b'2',
    InvalidUsername = b'3',
    InvalidPassword = b'4',
    TooManyTries = b'5',
}

impl ResponseStatus {
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Permission tier assigned at login, echoed to the client as one byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read = b'1',
    ReadWrite = b'2',
}

impl Permission {
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn can_write(self) -> bool {
        matches!(self, Permission::ReadWrite)
    }
}

/// Why a frame failed to parse. Every variant is answered with
/// [`ResponseStatus::InvalidRequest`] and the session closes.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame shorter than the minimum request length")]
    TooShort,
    #[error("missing `;` at the fixed separator position")]
    MissingSeparator,
    #[error(transparent)]
    UnknownRequest(#[from] UnknownRequest),
    #[error("frame data is not valid UTF-8")]
    NotText,
}

/// A parsed login frame: `username:hash` after the `'0'` opcode byte.
/// Only the shape is checked here; field charsets are the caller's job.
#[derive(Debug)]
pub struct LoginFrame<'a> {
    pub record: &'a str,
}

/// A parsed authenticated request frame.
#[derive(Debug)]
pub struct RequestFrame<'a> {
    pub kind: RequestKind,
    pub token: &'a [u8],
    pub data: &'a str,
}

/// Splits a login frame. The leading `'0'` has already been consumed by the
/// session state machine; `body` is everything after it.
pub fn parse_login_frame(body: &[u8]) -> Result<LoginFrame<'_>, FrameError> {
    let record = std::str::from_utf8(body).map_err(|_| FrameError::NotText)?;
    Ok(LoginFrame { record })
}

/// Splits an authenticated request frame by position.
pub fn parse_request_frame(frame: &[u8]) -> Result<RequestFrame<'_>, FrameError> {
    if frame.len() < MIN_REQUEST_LEN {
        return Err(FrameError::TooShort);
    }
    if frame[SEPARATOR_OFFSET] != QUERY_ITEMS_SEPARATOR {
        return Err(FrameError::MissingSeparator);
    }
    let kind = RequestKind::try_from(frame[0])?;
    let token = &frame[1..SEPARATOR_OFFSET];
    let data =
        std::str::from_utf8(&frame[DATA_OFFSET..]).map_err(|_| FrameError::NotText)?;
    Ok(RequestFrame { kind, token, data })
}
