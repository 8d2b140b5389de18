// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use phonebook_server_rs::{auth, models::protocol::SESSION_TOKEN_LEN};

use crate::integration_tests::common::{
    ALICE_PASSWORD, BOB_PASSWORD, connect, login, recv, request, send, spawn_server,
};

#[tokio::test]
async fn add_search_del_round_trip() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;

    let (permission, token) = login(&mut stream, "alice", ALICE_PASSWORD).await?;
    assert_eq!(permission, b'2');
    assert_eq!(token.len(), SESSION_TOKEN_LEN);

    // Searching an empty store misses.
    send(&mut stream, &request(b'1', &token, "Mario Rossi")).await?;
    assert_eq!(recv(&mut stream).await?, b"1");

    send(&mut stream, &request(b'2', &token, "Mario Rossi:1234567,+3900")).await?;
    assert_eq!(recv(&mut stream).await?, b"0");

    send(&mut stream, &request(b'1', &token, "Mario Rossi")).await?;
    assert_eq!(recv(&mut stream).await?, b"0Mario Rossi:1234567,+3900");

    send(&mut stream, &request(b'3', &token, "Mario Rossi")).await?;
    assert_eq!(recv(&mut stream).await?, b"0");

    send(&mut stream, &request(b'1', &token, "Mario Rossi")).await?;
    assert_eq!(recv(&mut stream).await?, b"1");

    // The acknowledged mutations are all on the journal, in order.
    let journal = std::fs::read_to_string(server.cfg.journal_path())?;
    assert_eq!(journal, "1Mario Rossi:1234567,+3900\n0Mario Rossi:\n");
    Ok(())
}

#[tokio::test]
async fn overwrite_keeps_a_single_record() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;
    let (_, token) = login(&mut stream, "alice", ALICE_PASSWORD).await?;

    send(&mut stream, &request(b'2', &token, "Mario:111")).await?;
    assert_eq!(recv(&mut stream).await?, b"0");
    send(&mut stream, &request(b'2', &token, "Mario:222")).await?;
    assert_eq!(recv(&mut stream).await?, b"0");

    send(&mut stream, &request(b'1', &token, "Mario")).await?;
    assert_eq!(recv(&mut stream).await?, b"0Mario:222");

    let main = server.stores.main.read().await;
    assert_eq!(main.len(), 1);
    Ok(())
}

#[tokio::test]
async fn read_only_user_cannot_mutate() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;

    let (permission, token) = login(&mut stream, "bob", BOB_PASSWORD).await?;
    assert_eq!(permission, b'1');

    // SEARCH is allowed...
    send(&mut stream, &request(b'1', &token, "Anyone")).await?;
    assert_eq!(recv(&mut stream).await?, b"1");

    // ...ADD closes the session with no response and no journal entry.
    send(&mut stream, &request(b'2', &token, "Foo:1")).await?;
    assert!(recv(&mut stream).await?.is_empty());
    assert_eq!(std::fs::read_to_string(server.cfg.journal_path())?, "");
    Ok(())
}

#[tokio::test]
async fn token_must_match_byte_for_byte() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;
    let (_, token) = login(&mut stream, "alice", ALICE_PASSWORD).await?;

    let mut forged = token.clone();
    forged[40] = if forged[40] == b'a' { b'b' } else { b'a' };
    send(&mut stream, &request(b'1', &forged, "Mario")).await?;
    assert_eq!(recv(&mut stream).await?, b"2");
    assert!(recv(&mut stream).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_frames_terminate_the_session() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;
    let (_, token) = login(&mut stream, "alice", ALICE_PASSWORD).await?;

    // Separator in the wrong place.
    let mut frame = request(b'1', &token, "Mario");
    frame[1 + SESSION_TOKEN_LEN] = b':';
    send(&mut stream, &frame).await?;
    assert_eq!(recv(&mut stream).await?, b"2");
    assert!(recv(&mut stream).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_opcode_terminates_the_session() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;
    let (_, token) = login(&mut stream, "alice", ALICE_PASSWORD).await?;

    send(&mut stream, &request(b'9', &token, "Mario")).await?;
    assert_eq!(recv(&mut stream).await?, b"2");
    assert!(recv(&mut stream).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn wrong_password_then_lockout() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;

    let wrong_hash = auth::hash_password("not the password")?;
    for _ in 0..4 {
        send(&mut stream, format!("0alice:{wrong_hash}").as_bytes()).await?;
        assert_eq!(recv(&mut stream).await?, b"4");
    }
    // The fifth failure answers TOO_MANY_TRY and closes the socket.
    send(&mut stream, format!("0alice:{wrong_hash}").as_bytes()).await?;
    assert_eq!(recv(&mut stream).await?, b"5");
    assert!(recv(&mut stream).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_username_is_distinguished() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;

    let hash = auth::hash_password(ALICE_PASSWORD)?;
    send(&mut stream, format!("0nobody:{hash}").as_bytes()).await?;
    assert_eq!(recv(&mut stream).await?, b"3");

    // The same socket may retry with valid credentials.
    let (permission, _) = login(&mut stream, "alice", ALICE_PASSWORD).await?;
    assert_eq!(permission, b'2');
    Ok(())
}

#[tokio::test]
async fn invalid_login_record_is_rejected() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;

    send(&mut stream, b"0alice:notahash").await?;
    assert_eq!(recv(&mut stream).await?, b"2");
    assert!(recv(&mut stream).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn first_frame_must_be_a_login() -> Result<()> {
    let server = spawn_server().await?;
    let mut stream = connect(&server).await?;

    send(&mut stream, b"1Mario").await?;
    assert!(recv(&mut stream).await?.is_empty());
    Ok(())
}
