/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Output side of the scheduler: where finished telegrams go.

use std::future::Future;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::telegram::Telegram;

/// Accepts one telegram per second for transmission.
///
/// Transmission is fire-and-forget: the scheduler logs an `Err` and moves
/// on, it never retries.
pub trait TelegramSink: Send {
    fn transmit(&mut self, telegram: &Telegram) -> impl Future<Output = io::Result<()>> + Send;
}

/// Writes each telegram's 17 bytes to an async writer and flushes.
///
/// Use with a serial device node opened as a `tokio::fs::File`, with
/// `tokio::io::stdout()`, or with any other tokio writer.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: AsyncWrite + Unpin + Send> TelegramSink for WriterSink<W> {
    async fn transmit(&mut self, telegram: &Telegram) -> io::Result<()> {
        self.writer.write_all(telegram.as_bytes()).await?;
        // Device nodes behind tokio::fs::File only hit the wire on flush.
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{SyncState, WallClock};

    #[tokio::test]
    async fn writer_sink_writes_whole_frames() {
        let mut sink = WriterSink::new(Vec::new());
        let unset = Telegram::format(&WallClock::EPOCH, SyncState::Unset);
        sink.transmit(&unset).await.unwrap();
        sink.transmit(&unset).await.unwrap();

        let written = sink.into_inner();
        assert_eq!(written.len(), 34);
        assert_eq!(&written[..17], b"O?L000000F000000\r");
        assert_eq!(&written[17..], b"O?L000000F000000\r");
    }

    #[tokio::test]
    async fn write_errors_are_reported_to_the_caller() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut sink = WriterSink::new(client);
        let t = Telegram::format(&WallClock::EPOCH, SyncState::Synced);
        assert!(sink.transmit(&t).await.is_err());
    }
}
