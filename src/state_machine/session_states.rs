// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-connection protocol state machine:
//! `AwaitLogin` → `Serve(permission, token)` → closed.
//!
//! Each step handles exactly one request frame and writes at most one
//! response, so request/response pairs are strictly serialised within a
//! session. Closing is expressed as `Transition::Done`: `Ok` for the quiet
//! cases (peer close, timeout, protocol violation) and `Err` for genuine
//! I/O or journal failures, which the connection handler logs.

use std::{future::Future, net::SocketAddr, pin::Pin, sync::Arc};

use anyhow::{Result, anyhow};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    auth::{self, AuthOutcome},
    cfg::config::Config,
    journal::{JournalHandle, JournalOp},
    models::{
        protocol::{self, Permission, RequestKind, ResponseStatus, SESSION_TOKEN_LEN},
        record::{Record, StoreKind},
        validate,
    },
    server::{Stores, session::SessionChannel},
    state_machine::common::{StateMachine, Transition},
    store::sorted::StoreError,
    utils::random_token,
};

pub struct SessionCtx {
    pub channel: SessionChannel,
    pub stores: Arc<Stores>,
    pub journal: JournalHandle,
    pub cfg: Arc<Config>,
    pub peer: SocketAddr,
}

impl SessionCtx {
    pub fn new(
        channel: SessionChannel,
        stores: Arc<Stores>,
        journal: JournalHandle,
        cfg: Arc<Config>,
        peer: SocketAddr,
    ) -> Self {
        Self {
            channel,
            stores,
            journal,
            cfg,
            peer,
        }
    }

    async fn reply_status(&mut self, status: ResponseStatus) -> Result<()> {
        self.channel.write_frame(&[status.as_byte()]).await
    }
}

type SessionStepOut = Transition<SessionStates, Result<()>>;

pub enum SessionStates {
    AwaitLogin(AwaitLogin),
    Serve(Serve),
}

/// Waiting for a `'0' username:hash` frame; counts failed attempts.
#[derive(Debug, Default)]
pub struct AwaitLogin {
    attempts: u32,
}

impl StateMachine<SessionCtx, SessionStepOut> for AwaitLogin {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = SessionStepOut> + Send + 'a>>
    where
        Self: 'a,
        SessionCtx: 'a;

    fn step<'a>(&'a mut self, ctx: &'a mut SessionCtx) -> Self::StepResult<'a> {
        Box::pin(async move {
            let frame = match ctx.channel.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Transition::Done(Ok(())),
                Err(e) => return Transition::Done(Err(e)),
            };

            // The only acceptable first byte before login is TOKEN_REQ.
            if frame.first() != Some(&(RequestKind::TokenReq as u8)) {
                debug!(peer = %ctx.peer, "first frame is not a login request");
                return Transition::Done(Ok(()));
            }
            let record = match protocol::parse_login_frame(&frame[1..]) {
                Ok(login) if StoreKind::User.check_line(login.record) => login.record,
                _ => {
                    let _ = ctx.reply_status(ResponseStatus::InvalidRequest).await;
                    return Transition::Done(Ok(()));
                },
            };
            let Some((username, hash)) =
                record.split_once(validate::KEY_VALUE_SEPARATOR)
            else {
                let _ = ctx.reply_status(ResponseStatus::InvalidRequest).await;
                return Transition::Done(Ok(()));
            };

            match auth::authenticate(&ctx.stores.users, username, hash).await {
                AuthOutcome::Granted(permission) => {
                    let token = random_token();
                    let mut resp = Vec::with_capacity(2 + SESSION_TOKEN_LEN);
                    resp.push(ResponseStatus::Success.as_byte());
                    resp.push(permission.as_byte());
                    resp.extend_from_slice(&token);
                    if let Err(e) = ctx.channel.write_frame(&resp).await {
                        return Transition::Done(Err(e));
                    }
                    info!(
                        peer = %ctx.peer,
                        username,
                        permission = ?permission,
                        "user logged in"
                    );
                    Transition::Next(
                        SessionStates::Serve(Serve { permission, token }),
                        Ok(()),
                    )
                },
                outcome => {
                    self.attempts += 1;
                    let status = match outcome {
                        AuthOutcome::UnknownUser => ResponseStatus::InvalidUsername,
                        _ => ResponseStatus::InvalidPassword,
                    };
                    debug!(peer = %ctx.peer, username, attempt = self.attempts, ?status, "login failed");

                    // Rate-limit brute force: the delay comes before any
                    // response byte leaves the server.
                    sleep(ctx.cfg.runtime.failed_login_sleep).await;

                    if self.attempts < ctx.cfg.runtime.max_login_attempts {
                        match ctx.reply_status(status).await {
                            Ok(()) => Transition::Stay(Ok(())),
                            Err(e) => Transition::Done(Err(e)),
                        }
                    } else {
                        let _ = ctx.reply_status(ResponseStatus::TooManyTries).await;
                        Transition::Done(Ok(()))
                    }
                },
            }
        })
    }
}

/// Authenticated request loop. Every frame must carry the issued token,
/// byte-exact, at its fixed position.
pub struct Serve {
    permission: Permission,
    token: [u8; SESSION_TOKEN_LEN],
}

impl StateMachine<SessionCtx, SessionStepOut> for Serve {
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = SessionStepOut> + Send + 'a>>
    where
        Self: 'a,
        SessionCtx: 'a;

    fn step<'a>(&'a mut self, ctx: &'a mut SessionCtx) -> Self::StepResult<'a> {
        Box::pin(async move {
            let frame = match ctx.channel.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Transition::Done(Ok(())),
                Err(e) => return Transition::Done(Err(e)),
            };

            let request = match protocol::parse_request_frame(&frame) {
                Ok(request) => request,
                Err(e) => {
                    debug!(peer = %ctx.peer, "malformed frame: {e}");
                    let _ = ctx.reply_status(ResponseStatus::InvalidRequest).await;
                    return Transition::Done(Ok(()));
                },
            };
            if request.token != self.token {
                debug!(peer = %ctx.peer, "session token mismatch");
                let _ = ctx.reply_status(ResponseStatus::InvalidRequest).await;
                return Transition::Done(Ok(()));
            }

            match request.kind {
                RequestKind::TokenReq => {
                    let _ = ctx.reply_status(ResponseStatus::InvalidRequest).await;
                    Transition::Done(Ok(()))
                },
                RequestKind::Search => {
                    let name = request.data;
                    if !validate::check_name(name) {
                        return Transition::Done(Ok(()));
                    }
                    let resp = {
                        let main = ctx.stores.main.read().await;
                        match main.get(name) {
                            Some(record) => {
                                let mut resp = vec![ResponseStatus::Success.as_byte()];
                                resp.extend_from_slice(record.to_string().as_bytes());
                                resp
                            },
                            None => vec![ResponseStatus::Fail.as_byte()],
                        }
                    };
                    match ctx.channel.write_frame(&resp).await {
                        Ok(()) => Transition::Stay(Ok(())),
                        Err(e) => Transition::Done(Err(e)),
                    }
                },
                RequestKind::Add => {
                    if !self.permission.can_write() {
                        warn!(peer = %ctx.peer, "ADD without write permission");
                        return Transition::Done(Ok(()));
                    }
                    let record = match Record::parse(request.data, StoreKind::Main) {
                        Ok(record) => record,
                        Err(e) => {
                            debug!(peer = %ctx.peer, "rejected ADD: {e}");
                            return Transition::Done(Ok(()));
                        },
                    };
                    mutate(ctx, MainMutation::Add(record)).await
                },
                RequestKind::Del => {
                    if !self.permission.can_write() {
                        warn!(peer = %ctx.peer, "DEL without write permission");
                        return Transition::Done(Ok(()));
                    }
                    if !validate::check_name(request.data) {
                        debug!(peer = %ctx.peer, "rejected DEL: invalid name");
                        return Transition::Done(Ok(()));
                    }
                    mutate(ctx, MainMutation::Del(request.data.to_string())).await
                },
            }
        })
    }
}

enum MainMutation {
    Add(Record),
    Del(String),
}

/// Applies a mutation to the main store and journals it. The journal record
/// is queued while the writer guard is still held, so the journal's order is
/// the linearization order; the fsync acknowledgement is awaited after the
/// guard is dropped, and SUCCESS is sent only once it arrives.
async fn mutate(ctx: &mut SessionCtx, mutation: MainMutation) -> SessionStepOut {
    let pending = {
        let mut main = ctx.stores.main.write().await;
        match mutation {
            MainMutation::Add(record) => {
                match main.insert_or_replace(record.clone()) {
                    Ok(_) => Some(ctx.journal.submit(JournalOp::Add(record)).await),
                    Err(StoreError::CapacityExhausted) => None,
                    Err(e) => {
                        // The record was validated at the protocol layer.
                        warn!(peer = %ctx.peer, "ADD rejected by store: {e}");
                        None
                    },
                }
            },
            MainMutation::Del(key) => match main.remove(&key) {
                Some(_) => Some(ctx.journal.submit(JournalOp::Del(key)).await),
                None => None,
            },
        }
    };

    let Some(pending) = pending else {
        return match ctx.reply_status(ResponseStatus::Fail).await {
            Ok(()) => Transition::Stay(Ok(())),
            Err(e) => Transition::Done(Err(e)),
        };
    };

    let durable = match pending {
        Ok(rx) => match rx.await {
            Ok(res) => res,
            Err(_) => Err(anyhow!("journal writer dropped the request")),
        },
        Err(e) => Err(e),
    };
    match durable {
        Ok(()) => match ctx.reply_status(ResponseStatus::Success).await {
            Ok(()) => Transition::Stay(Ok(())),
            Err(e) => Transition::Done(Err(e)),
        },
        // The in-memory mutation stands, but the client never sees SUCCESS
        // for it; the journal writer has already requested a safe shutdown.
        Err(e) => Transition::Done(Err(e)),
    }
}

pub async fn run_session(ctx: &mut SessionCtx) -> Result<()> {
    let mut state = SessionStates::AwaitLogin(AwaitLogin::default());
    loop {
        let tr = match &mut state {
            SessionStates::AwaitLogin(s) => s.step(ctx).await,
            SessionStates::Serve(s) => s.step(ctx).await,
        };

        match tr {
            Transition::Next(next_state, _r) => {
                state = next_state;
            },
            Transition::Stay(Ok(())) => {},
            Transition::Stay(Err(e)) => return Err(e),
            Transition::Done(r) => return r,
        }
    }
}
