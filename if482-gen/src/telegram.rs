/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! IF482 telegram encoding and decoding.
//!
//! An IF482 telegram is 17 ASCII bytes, sent once per second at 9600 bit/s
//! 7E1.  It *ends* at the beginning of the second it announces.
//!
//! ```text
//! Byte  Meaning             ASCII
//!  1    Start of telegram   O
//!  2    Monitoring          A (synced) / M (stale) / ? (never set)
//!  3    Time season         W / S / U / L   (only L is generated)
//!  4-5  Year               00..99
//!  6-7  Month              01..12
//!  8-9  Day                01..31
//! 10    Day of week         1..7, or F = unspecified / invalid
//! 11-12 Hours               00..23
//! 13-14 Minutes             00..59
//! 15-16 Seconds             00..59
//! 17    End of telegram     CR
//! ```
//!
//! Example from the protocol documentation: `"OAL160806F170400"`.

use thiserror::Error;

use crate::time::{SyncState, WallClock};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Length of one complete telegram including the terminating CR.
pub const TELEGRAM_LEN: usize = 17;

/// Length of the printable payload (everything but the CR).
pub const PAYLOAD_LEN: usize = TELEGRAM_LEN - 1;

pub const START_MARKER: u8 = b'O';
pub const TERMINATOR: u8 = b'\r';

/// Weekday byte meaning "no valid weekday".  Digits `0`, `8` and `9` are
/// also out of range, but `0` already fills the other invalid fields, so the
/// protocol uses a character that cannot be mistaken for a digit.
pub const INVALID_WEEKDAY: u8 = b'F';

const MONITOR_SYNCED: u8 = b'A';
const MONITOR_STALE: u8 = b'M';
const MONITOR_UNSET: u8 = b'?';

// Byte offsets of the numeric fields within the frame.
const YEAR: usize = 3;
const MONTH: usize = 5;
const DAY: usize = 7;
const WEEKDAY: usize = 9;
const HOUR: usize = 10;
const MINUTE: usize = 12;
const SECOND: usize = 14;

// ── Season ────────────────────────────────────────────────────────────────────

/// Time-season code (byte 3).
///
/// The generator always emits [`Season::Local`]; the other codes are
/// recognised when decoding frames from other senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    /// `W` – standard (winter) time.
    Standard,
    /// `S` – daylight saving (summer) time.
    Summer,
    /// `U` – UTC.
    Utc,
    /// `L` – local time.
    Local,
}

impl Season {
    pub fn as_byte(self) -> u8 {
        match self {
            Season::Standard => b'W',
            Season::Summer => b'S',
            Season::Utc => b'U',
            Season::Local => b'L',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'W' => Some(Season::Standard),
            b'S' => Some(Season::Summer),
            b'U' => Some(Season::Utc),
            b'L' => Some(Season::Local),
            _ => None,
        }
    }
}

fn monitoring_byte(state: SyncState) -> u8 {
    match state {
        SyncState::Synced => MONITOR_SYNCED,
        SyncState::StaleSync => MONITOR_STALE,
        SyncState::Unset => MONITOR_UNSET,
    }
}

fn monitoring_state(b: u8) -> Option<SyncState> {
    match b {
        MONITOR_SYNCED => Some(SyncState::Synced),
        MONITOR_STALE => Some(SyncState::StaleSync),
        MONITOR_UNSET => Some(SyncState::Unset),
        _ => None,
    }
}

// ── Telegram ──────────────────────────────────────────────────────────────────

/// One complete, wire-ready IF482 frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Telegram([u8; TELEGRAM_LEN]);

impl Telegram {
    /// Encode `clock` with the monitoring byte for `state`.
    ///
    /// Never fails.  When `state` is [`SyncState::Unset`] the clock fields are
    /// ignored: every digit is `'0'` and the weekday is [`INVALID_WEEKDAY`].
    pub fn format(clock: &WallClock, state: SyncState) -> Self {
        let mut buf = *b"O?L000000F000000\r";
        buf[1] = monitoring_byte(state);
        buf[2] = Season::Local.as_byte();

        if state != SyncState::Unset {
            put2(&mut buf, YEAR, (clock.year % 100) as u8);
            put2(&mut buf, MONTH, clock.month);
            put2(&mut buf, DAY, clock.day);
            buf[WEEKDAY] = b'0' + clock.weekday % 10;
            put2(&mut buf, HOUR, clock.hour);
            put2(&mut buf, MINUTE, clock.minute);
            put2(&mut buf, SECOND, clock.second);
        }

        Telegram(buf)
    }

    pub fn as_bytes(&self) -> &[u8; TELEGRAM_LEN] {
        &self.0
    }

    /// Decode a received frame.
    ///
    /// Accepts either the full 17-byte frame or the 16-byte payload without
    /// the trailing CR.
    pub fn parse(bytes: &[u8]) -> Result<DecodedTelegram, TelegramError> {
        let payload = bytes.strip_suffix(&[TERMINATOR]).unwrap_or(bytes);
        if payload.len() != PAYLOAD_LEN {
            return Err(TelegramError::BadLength { len: bytes.len() });
        }

        if payload[0] != START_MARKER {
            return Err(TelegramError::BadStartMarker(payload[0]));
        }
        let state = monitoring_state(payload[1]).ok_or(TelegramError::BadMonitoring(payload[1]))?;
        let season = Season::from_byte(payload[2]).ok_or(TelegramError::BadSeason(payload[2]))?;

        let weekday = match payload[WEEKDAY] {
            INVALID_WEEKDAY => None,
            b => Some(digit(b, WEEKDAY)?),
        };

        let decoded = DecodedTelegram {
            state,
            season,
            year: 2000 + u16::from(get2(payload, YEAR)?),
            month: get2(payload, MONTH)?,
            day: get2(payload, DAY)?,
            weekday,
            hour: get2(payload, HOUR)?,
            minute: get2(payload, MINUTE)?,
            second: get2(payload, SECOND)?,
        };

        if state != SyncState::Unset {
            decoded.check_ranges()?;
        }
        Ok(decoded)
    }
}

impl std::fmt::Display for Telegram {
    /// Prints the printable payload; the CR is omitted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Every byte written by `format` is ASCII.
        for &b in &self.0[..PAYLOAD_LEN] {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Telegram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Telegram(\"{self}\\r\")")
    }
}

fn put2(buf: &mut [u8; TELEGRAM_LEN], at: usize, value: u8) {
    buf[at] = b'0' + (value / 10) % 10;
    buf[at + 1] = b'0' + value % 10;
}

fn digit(b: u8, position: usize) -> Result<u8, TelegramError> {
    if b.is_ascii_digit() {
        Ok(b - b'0')
    } else {
        Err(TelegramError::NotADigit {
            position: position + 1,
            byte: b,
        })
    }
}

fn get2(payload: &[u8], at: usize) -> Result<u8, TelegramError> {
    Ok(digit(payload[at], at)? * 10 + digit(payload[at + 1], at + 1)?)
}

// ── DecodedTelegram ───────────────────────────────────────────────────────────

/// Field values of a received telegram.
///
/// For frames with monitoring byte `?` the numeric fields are whatever the
/// sender put there (normally all zero) and carry no time information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedTelegram {
    pub state: SyncState,
    pub season: Season,
    /// Absolute year (`2000 + yy`).
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// `None` when the sender transmitted the `F` sentinel.
    pub weekday: Option<u8>,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DecodedTelegram {
    /// `true` if the frame carries a usable time (the sender's clock was set).
    pub fn has_time(&self) -> bool {
        self.state != SyncState::Unset
    }

    fn check_ranges(&self) -> Result<(), TelegramError> {
        let checks: [(&'static str, u8, u8, u8); 6] = [
            ("month", self.month, 1, 12),
            ("day", self.day, 1, 31),
            ("weekday", self.weekday.unwrap_or(1), 1, 7),
            ("hour", self.hour, 0, 23),
            ("minute", self.minute, 0, 59),
            ("second", self.second, 0, 59),
        ];
        for (field, value, min, max) in checks {
            if !(min..=max).contains(&value) {
                return Err(TelegramError::OutOfRange { field, value });
            }
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a received byte sequence is not a valid IF482 telegram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelegramError {
    #[error("telegram has {len} bytes, expected 17 (or 16 without CR)")]
    BadLength { len: usize },

    #[error("telegram starts with 0x{0:02x}, expected 'O'")]
    BadStartMarker(u8),

    #[error("unknown monitoring byte 0x{0:02x} (expected 'A', 'M' or '?')")]
    BadMonitoring(u8),

    #[error("unknown time-season byte 0x{0:02x} (expected 'W', 'S', 'U' or 'L')")]
    BadSeason(u8),

    /// `position` is 1-based, matching the byte table of the protocol.
    #[error("byte {position} is 0x{byte:02x}, expected an ASCII digit")]
    NotADigit { position: usize, byte: u8 },

    #[error("{field} value {value} is out of range")]
    OutOfRange { field: &'static str, value: u8 },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// 2016-08-06 17:04:00, a Saturday.
    fn sample() -> WallClock {
        WallClock {
            year: 2016,
            month: 8,
            day: 6,
            weekday: 6,
            hour: 17,
            minute: 4,
            second: 0,
        }
    }

    // ── format ────────────────────────────────────────────────────────────────

    #[test]
    fn synced_frame_matches_expected_bytes() {
        let t = Telegram::format(&sample(), SyncState::Synced);
        assert_eq!(t.as_bytes(), b"OAL1608066170400\r");
    }

    #[test]
    fn frame_layout_invariants() {
        let t = Telegram::format(&sample(), SyncState::Synced);
        let b = t.as_bytes();
        assert_eq!(b.len(), TELEGRAM_LEN);
        assert_eq!(b[0], b'O');
        assert_eq!(b[1], b'A');
        assert_eq!(b[2], b'L');
        assert_eq!(b[16], b'\r');
    }

    #[test]
    fn stale_sync_only_changes_monitoring_byte() {
        let synced = Telegram::format(&sample(), SyncState::Synced);
        let stale = Telegram::format(&sample(), SyncState::StaleSync);
        assert_eq!(stale.as_bytes()[1], b'M');
        assert_eq!(synced.as_bytes()[2..], stale.as_bytes()[2..]);
    }

    #[test]
    fn unset_emits_zeroes_and_weekday_sentinel() {
        let t = Telegram::format(&sample(), SyncState::Unset);
        assert_eq!(t.as_bytes(), b"O?L000000F000000\r");
    }

    #[test]
    fn year_is_reduced_mod_100_and_fields_zero_padded() {
        let t = WallClock {
            year: 2105,
            month: 1,
            day: 2,
            weekday: 3,
            hour: 4,
            minute: 5,
            second: 9,
        };
        assert_eq!(
            Telegram::format(&t, SyncState::Synced).as_bytes(),
            b"OAL0501023040509\r"
        );
    }

    #[test]
    fn formatting_is_idempotent() {
        for state in [SyncState::Synced, SyncState::StaleSync, SyncState::Unset] {
            assert_eq!(
                Telegram::format(&sample(), state),
                Telegram::format(&sample(), state)
            );
        }
    }

    #[test]
    fn out_of_range_fields_still_yield_ascii_digits() {
        let garbage = WallClock {
            year: u16::MAX,
            month: 255,
            day: 200,
            weekday: 99,
            hour: 250,
            minute: 128,
            second: 255,
        };
        let t = Telegram::format(&garbage, SyncState::Synced);
        assert!(t.as_bytes()[3..16].iter().all(u8::is_ascii_digit));
        assert_eq!(t.as_bytes().len(), TELEGRAM_LEN);
    }

    #[test]
    fn display_omits_carriage_return() {
        let t = Telegram::format(&sample(), SyncState::Synced);
        assert_eq!(t.to_string(), "OAL1608066170400");
    }

    // ── parse ─────────────────────────────────────────────────────────────────

    #[test]
    fn parses_documentation_example() {
        let d = Telegram::parse(b"OAL160806F170400").unwrap();
        assert_eq!(d.state, SyncState::Synced);
        assert_eq!(d.season, Season::Local);
        assert_eq!((d.year, d.month, d.day), (2016, 8, 6));
        assert_eq!(d.weekday, None);
        assert_eq!((d.hour, d.minute, d.second), (17, 4, 0));
        assert!(d.has_time());
    }

    #[test]
    fn parses_own_output() {
        let t = Telegram::format(&sample(), SyncState::StaleSync);
        let d = Telegram::parse(t.as_bytes()).unwrap();
        assert_eq!(d.state, SyncState::StaleSync);
        assert_eq!(d.weekday, Some(6));
        assert_eq!(d.second, 0);
    }

    #[test]
    fn unset_frame_parses_without_range_checks() {
        let d = Telegram::parse(b"O?L000000F000000\r").unwrap();
        assert!(!d.has_time());
        assert_eq!(d.month, 0);
    }

    #[test]
    fn other_season_codes_are_accepted() {
        assert_eq!(
            Telegram::parse(b"OAU1608066170400").unwrap().season,
            Season::Utc
        );
        assert_eq!(
            Telegram::parse(b"OAW1608066170400").unwrap().season,
            Season::Standard
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            Telegram::parse(b"OAL16080661704"),
            Err(TelegramError::BadLength { len: 14 })
        );
    }

    #[test]
    fn rejects_bad_markers() {
        assert_eq!(
            Telegram::parse(b"XAL1608066170400"),
            Err(TelegramError::BadStartMarker(b'X'))
        );
        assert_eq!(
            Telegram::parse(b"OZL1608066170400"),
            Err(TelegramError::BadMonitoring(b'Z'))
        );
        assert_eq!(
            Telegram::parse(b"OAQ1608066170400"),
            Err(TelegramError::BadSeason(b'Q'))
        );
    }

    #[test]
    fn rejects_non_digit_with_one_based_position() {
        assert_eq!(
            Telegram::parse(b"OAL16x8066170400"),
            Err(TelegramError::NotADigit {
                position: 6,
                byte: b'x'
            })
        );
    }

    #[test]
    fn rejects_out_of_range_fields_when_synced() {
        assert!(matches!(
            Telegram::parse(b"OAL1613066170400"),
            Err(TelegramError::OutOfRange { field: "month", .. })
        ));
        assert!(matches!(
            Telegram::parse(b"OAL1608066250400"),
            Err(TelegramError::OutOfRange { field: "hour", .. })
        ));
        assert!(matches!(
            Telegram::parse(b"OAL1608068170400"),
            Err(TelegramError::OutOfRange {
                field: "weekday",
                ..
            })
        ));
    }
}
