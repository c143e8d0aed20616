/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Receiving-clock simulator.
//!
//! Reads an IF482 byte stream, decodes every CR-terminated telegram and
//! reports, per frame:
//!   • the announced time and monitoring state
//!   • the arrival phase relative to the local system-clock second
//!   • whether the announced second follows the previous one
//!
//! Usage:
//!   if482-gen --stdout | clock-sim
//!   clock-sim --input /dev/ttyUSB1

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, Timelike};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use if482_gen::telegram::{DecodedTelegram, Telegram, TERMINATOR};

#[derive(Debug, Parser)]
#[command(name = "clock-sim", about = "IF482 receiving-clock simulator")]
struct Cli {
    /// Serial device or file to read from.  Reads stdin when omitted.
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Stop after this many telegrams (0 = run until end of input).
    #[arg(short = 'n', long = "count", default_value_t = 0)]
    count: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let input: Box<dyn AsyncRead + Unpin + Send> = match &cli.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Cannot open input: {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let stats = receive(BufReader::new(input), cli.count, || Local::now().naive_local()).await?;
    info!(
        received = stats.received,
        rejected = stats.rejected,
        out_of_sequence = stats.out_of_sequence,
        mismatched = stats.mismatched,
        "Input closed"
    );
    Ok(())
}

#[derive(Debug, Default)]
struct Stats {
    received: u64,
    rejected: u64,
    out_of_sequence: u64,
    /// Frames whose announced second is not the local second nearest arrival.
    mismatched: u64,
}

/// Second of the local clock nearest `arrival`.
///
/// A correctly timed telegram ends just before the second it announces, so
/// it is compared against the rounded arrival time rather than the current
/// second.
fn nearest_second(arrival: NaiveDateTime) -> u32 {
    (arrival + chrono::Duration::milliseconds(500)).second()
}

async fn receive<R, C>(mut reader: BufReader<R>, limit: u64, mut now: C) -> Result<Stats>
where
    R: AsyncRead + Unpin,
    C: FnMut() -> NaiveDateTime,
{
    let mut stats = Stats::default();
    let mut previous: Option<DecodedTelegram> = None;
    let mut frame = Vec::with_capacity(32);

    loop {
        frame.clear();
        let n = reader
            .read_until(TERMINATOR, &mut frame)
            .await
            .context("Read from input failed")?;
        if n == 0 {
            break;
        }
        // Phase of arrival within the local second; a telegram should end
        // right at the start of the second it announces.
        let arrival = now();
        let phase_ms = arrival.nanosecond().min(999_999_999) / 1_000_000;

        let decoded = match Telegram::parse(trim_leading_noise(&frame)) {
            Ok(d) => d,
            Err(e) => {
                stats.rejected += 1;
                warn!(error = %e, raw = ?String::from_utf8_lossy(&frame), "Rejected frame");
                continue;
            }
        };
        stats.received += 1;

        if !decoded.has_time() {
            warn!(phase_ms, "Sender reports no valid time");
        } else {
            let weekday = decoded
                .weekday
                .map_or_else(|| "-".to_string(), |w| w.to_string());
            info!(
                phase_ms,
                state = ?decoded.state,
                season = ?decoded.season,
                weekday = %weekday,
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                decoded.year,
                decoded.month,
                decoded.day,
                decoded.hour,
                decoded.minute,
                decoded.second,
            );
            let local = nearest_second(arrival);
            if u32::from(decoded.second) != local {
                stats.mismatched += 1;
                warn!(
                    phase_ms,
                    announced = decoded.second,
                    local,
                    "Announced second differs from local clock"
                );
            }
        }

        if let Some(prev) = previous.filter(|p| p.has_time() && decoded.has_time()) {
            if decoded.second != (prev.second + 1) % 60 {
                stats.out_of_sequence += 1;
                warn!(
                    previous = prev.second,
                    current = decoded.second,
                    "Telegram out of sequence"
                );
            }
        }
        previous = Some(decoded);

        if limit != 0 && stats.received >= limit {
            break;
        }
    }
    Ok(stats)
}

/// Drop bytes before the start marker (line noise, partial first frame).
fn trim_leading_noise(frame: &[u8]) -> &[u8] {
    match frame.iter().position(|&b| b == b'O') {
        Some(start) => &frame[start..],
        None => frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 8, 6)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    fn fixed(arrival: NaiveDateTime) -> impl FnMut() -> NaiveDateTime {
        move || arrival
    }

    #[tokio::test]
    async fn frame_ending_just_before_its_second_is_not_flagged() {
        // Sent at offset 982 ms, fully received ~16 ms before 17:04:00.
        let stream: &[u8] = b"OAL1608066170400\r";
        let stats = receive(BufReader::new(stream), 0, fixed(at(17, 3, 59, 984)))
            .await
            .unwrap();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.mismatched, 0);
    }

    #[tokio::test]
    async fn frame_a_whole_second_off_is_flagged() {
        let stream: &[u8] = b"OAL1608066170400\r";
        let stats = receive(BufReader::new(stream), 0, fixed(at(17, 3, 58, 984)))
            .await
            .unwrap();
        assert_eq!(stats.mismatched, 1);
    }

    #[test]
    fn nearest_second_rounds_across_minute_boundary() {
        assert_eq!(nearest_second(at(17, 3, 59, 984)), 0);
        assert_eq!(nearest_second(at(17, 4, 0, 10)), 0);
        assert_eq!(nearest_second(at(17, 4, 0, 499)), 0);
        assert_eq!(nearest_second(at(17, 4, 0, 500)), 1);
    }

    #[tokio::test]
    async fn counts_good_bad_and_out_of_sequence_frames() {
        let stream: &[u8] =
            b"OAL1608066170400\rOAL1608066170401\rgarbage\rOAL1608066170403\rO?L000000F000000\r";
        let stats = receive(BufReader::new(stream), 0, fixed(at(17, 3, 59, 984))).await.unwrap();
        assert_eq!(stats.received, 4);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.out_of_sequence, 1);
    }

    #[tokio::test]
    async fn partial_leading_frame_is_recovered() {
        let stream: &[u8] = b"\x00\x7fOAL1608066170400\r";
        let stats = receive(BufReader::new(stream), 0, fixed(at(17, 3, 59, 984))).await.unwrap();
        assert_eq!(stats.received, 1);
    }

    #[tokio::test]
    async fn stops_after_limit() {
        let stream: &[u8] = b"OAL1608066170400\rOAL1608066170401\rOAL1608066170402\r";
        let stats = receive(BufReader::new(stream), 2, fixed(at(17, 3, 59, 984))).await.unwrap();
        assert_eq!(stats.received, 2);
    }
}
