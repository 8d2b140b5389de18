// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result, ensure};
use phonebook_server_rs::{
    auth,
    cfg::config::Config,
    journal,
    models::protocol::{MAX_FRAME_LEN, SESSION_TOKEN_LEN},
    server::{Stores, listener},
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

pub const ALICE_PASSWORD: &str = "wonderland1";
pub const BOB_PASSWORD: &str = "builder99";

/// A server running against a scratch resources directory on an ephemeral
/// loopback port, with `alice` privileged and `bob` normal.
pub struct TestServer {
    pub addr: SocketAddr,
    pub cfg: Arc<Config>,
    pub stores: Arc<Stores>,
    pub shutdown: CancellationToken,
    _tmp: TempDir,
}

/// Builds a config rooted in a scratch directory, with the login rate-limit
/// sleep disabled so lockout tests run in milliseconds.
pub fn test_config(tmp: &TempDir) -> Config {
    let mut cfg = Config::default();
    cfg.server.bind = "127.0.0.1".to_string();
    cfg.server.port = 0;
    cfg.runtime.resources_dir = tmp.path().to_path_buf();
    cfg.runtime.failed_login_sleep = Duration::ZERO;
    cfg
}

pub async fn spawn_server() -> Result<TestServer> {
    let tmp = TempDir::new()?;
    let cfg = test_config(&tmp);

    let alice_hash = auth::hash_password(ALICE_PASSWORD)?;
    let bob_hash = auth::hash_password(BOB_PASSWORD)?;
    std::fs::write(cfg.priv_users_db_path(), format!("alice:{alice_hash}\n"))?;
    std::fs::write(cfg.norm_users_db_path(), format!("bob:{bob_hash}\n"))?;

    let cfg = Arc::new(cfg);
    let stores = Arc::new(Stores::load(&cfg).await?);
    let shutdown = CancellationToken::new();
    let (journal, _task) = journal::spawn(
        &cfg.journal_path(),
        cfg.runtime.journal_queue_depth,
        shutdown.clone(),
    )
    .await?;

    let socket = TcpListener::bind("127.0.0.1:0").await?;
    let addr = socket.local_addr()?;
    let sessions = TaskTracker::new();
    tokio::spawn(listener::serve(
        socket,
        stores.clone(),
        journal,
        cfg.clone(),
        shutdown.clone(),
        sessions,
    ));

    Ok(TestServer {
        addr,
        cfg,
        stores,
        shutdown,
        _tmp: tmp,
    })
}

pub async fn connect(server: &TestServer) -> Result<TcpStream> {
    TcpStream::connect(server.addr)
        .await
        .context("failed to connect to the test server")
}

/// Reads one response frame; an empty vec means the server closed the
/// connection.
pub async fn recv(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut buf = [0u8; MAX_FRAME_LEN];
    let n = stream.read(&mut buf).await?;
    Ok(buf[..n].to_vec())
}

pub async fn send(stream: &mut TcpStream, frame: &[u8]) -> Result<()> {
    stream.write_all(frame).await?;
    Ok(())
}

/// Logs in and returns `(permission byte, token)`.
pub async fn login(
    stream: &mut TcpStream,
    username: &str,
    password: &str,
) -> Result<(u8, Vec<u8>)> {
    let hash = auth::hash_password(password)?;
    send(stream, format!("0{username}:{hash}").as_bytes()).await?;
    let resp = recv(stream).await?;
    ensure!(
        resp.first() == Some(&b'0'),
        "login rejected: {:?}",
        resp.first()
    );
    ensure!(resp.len() == 2 + SESSION_TOKEN_LEN, "short login response");
    Ok((resp[1], resp[2..].to_vec()))
}

/// Builds an authenticated request frame: `OP TOKEN ';' DATA`.
pub fn request(op: u8, token: &[u8], data: &str) -> Vec<u8> {
    let mut frame = vec![op];
    frame.extend_from_slice(token);
    frame.push(b';');
    frame.extend_from_slice(data.as_bytes());
    frame
}
