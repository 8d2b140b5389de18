// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{cfg::config::Config, models::protocol::MAX_FRAME_LEN};

pub(crate) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow!("{label} cancelled")),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow!("{label} timeout")),
            }
        }
    }
}

/// One client connection. The protocol is framed by read boundaries: a
/// single `read()` yields a whole frame and a single `write_all()` sends a
/// whole response, so the channel owns a fixed frame buffer and nothing is
/// ever spliced across reads.
#[derive(Debug)]
pub struct SessionChannel {
    stream: TcpStream,
    read_timeout: Duration,
    write_timeout: Duration,
    cancel: CancellationToken,
    buf: Box<[u8; MAX_FRAME_LEN]>,
}

impl SessionChannel {
    pub fn new(stream: TcpStream, cfg: &Config, cancel: CancellationToken) -> Self {
        Self {
            stream,
            read_timeout: cfg.runtime.session_read_timeout,
            write_timeout: cfg.runtime.socket_write_timeout,
            cancel,
            buf: Box::new([0u8; MAX_FRAME_LEN]),
        }
    }

    /// Reads the next frame. `None` ends the session quietly: peer close,
    /// idle timeout, shutdown request, or a frame that fills the whole
    /// buffer. Genuine I/O errors surface as `Err` so the caller can log
    /// them distinctly, but they end the session just the same.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let n = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(None),
            res = timeout(self.read_timeout, self.stream.read(self.buf.as_mut_slice())) => {
                match res {
                    Err(_) => {
                        debug!("session read timed out");
                        return Ok(None);
                    },
                    Ok(Ok(0)) => return Ok(None),
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(e).context("session read failed"),
                }
            },
        };
        if n == self.buf.len() {
            debug!("dropping oversized frame");
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }

    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        io_with_timeout(
            "session write",
            self.stream.write_all(frame),
            self.write_timeout,
            &self.cancel,
        )
        .await
    }
}
