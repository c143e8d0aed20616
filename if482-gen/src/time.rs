/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall-clock data types and the time-source seam.
//!
//! The generator never keeps time itself.  It takes one [`TimeSnapshot`] per
//! second from a [`TimeSource`] (an RTC, the host clock, or a test fixture)
//! and only ever reads it.
//!
//! ```text
//! TimeSource ──snapshot()──►  TimeSnapshot { clock: WallClock, state: SyncState }
//!                                   │
//!                                   └─ next_second() ──► telegram for t + 1
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;

// ── SyncState ─────────────────────────────────────────────────────────────────

/// Whether the time source currently holds a value known to be accurate.
///
/// Drives the monitoring byte of every telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Time is set and was recently confirmed by a reference.
    #[default]
    Synced,
    /// Time was set once but the last synchronisation attempt did not succeed.
    StaleSync,
    /// Time has never been set; the clock fields carry no information.
    Unset,
}

// ── WallClock ─────────────────────────────────────────────────────────────────

/// A broken-down local time as delivered by an RTC.
///
/// Field ranges: `year ≥ 2000`, `month 1–12`, `day 1–31`, `weekday 1–7`
/// (ISO 8601, Monday = 1), `hour 0–23`, `minute 0–59`, `second 0–59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WallClock {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl WallClock {
    /// Start of the RTC epoch, 2000-01-01 00:00:00 (a Saturday).
    ///
    /// Used as the placeholder value of sources that have never been set.
    pub const EPOCH: WallClock = WallClock {
        year: 2000,
        month: 1,
        day: 1,
        weekday: 6,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Decompose a chrono date-time.  Sub-second precision is dropped.
    pub fn from_naive(dt: NaiveDateTime) -> Self {
        WallClock {
            year: dt.year().clamp(0, i32::from(u16::MAX)) as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            weekday: dt.weekday().number_from_monday() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        }
    }

    /// Recompose into a chrono date-time, or `None` if the fields do not name
    /// a real calendar instant.  The stored weekday is not consulted.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
        )
    }

    /// The instant one second later, with calendar rollover and a recomputed
    /// weekday.
    ///
    /// Returns `None` when `self` is not a valid calendar instant.
    pub fn next_second(&self) -> Option<WallClock> {
        let next = self.to_naive()?.checked_add_signed(Duration::seconds(1))?;
        Some(WallClock::from_naive(next))
    }
}

impl std::fmt::Display for WallClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} (wd {})",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.weekday
        )
    }
}

// ── TimeSnapshot / TimeSource ─────────────────────────────────────────────────

/// One consistent read of a time source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSnapshot {
    pub clock: WallClock,
    pub state: SyncState,
}

/// Anything that can report the current wall-clock time and its sync state.
///
/// Implementations are read from the scheduler task once per second and
/// during start-up alignment, so `snapshot()` must be cheap and must not
/// block.
pub trait TimeSource: Send + Sync {
    fn snapshot(&self) -> TimeSnapshot;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn snapshot(&self) -> TimeSnapshot {
        (**self).snapshot()
    }
}

// ── SystemClock ───────────────────────────────────────────────────────────────

/// Host local time via `chrono::Local`.
///
/// The host clock is assumed to be disciplined by the operating system (NTP
/// or similar), so the reported [`SyncState`] is whatever the operator
/// configured.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    state: SyncState,
}

impl SystemClock {
    pub fn new(state: SyncState) -> Self {
        Self { state }
    }
}

impl TimeSource for SystemClock {
    fn snapshot(&self) -> TimeSnapshot {
        TimeSnapshot {
            clock: WallClock::from_naive(Local::now().naive_local()),
            state: self.state,
        }
    }
}

// ── ManualClock ───────────────────────────────────────────────────────────────

/// A settable time source for tests and bench setups.
///
/// Clones share the same underlying value, so a test can keep one handle and
/// move another into the scheduler.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<TimeSnapshot>>,
}

impl ManualClock {
    pub fn new(clock: WallClock, state: SyncState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimeSnapshot { clock, state })),
        }
    }

    /// A clock that has never been set.
    pub fn unset() -> Self {
        Self::new(WallClock::EPOCH, SyncState::Unset)
    }

    pub fn set(&self, clock: WallClock) {
        self.lock().clock = clock;
    }

    pub fn set_state(&self, state: SyncState) {
        self.lock().state = state;
    }

    /// Step the clock forward by `secs` seconds.
    ///
    /// Invalid stored values are left untouched.
    pub fn advance(&self, secs: u32) {
        let mut snap = self.lock();
        for _ in 0..secs {
            match snap.clock.next_second() {
                Some(next) => snap.clock = next,
                None => break,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimeSnapshot> {
        // A panicked writer cannot leave a TimeSnapshot half-written.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimeSource for ManualClock {
    fn snapshot(&self) -> TimeSnapshot {
        *self.lock()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn wc(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> WallClock {
        let dt = NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())
            .unwrap()
            .and_hms_opt(hour.into(), minute.into(), second.into())
            .unwrap();
        WallClock::from_naive(dt)
    }

    // ── from_naive ────────────────────────────────────────────────────────────

    #[test]
    fn weekday_is_iso_monday_based() {
        // 2016-08-06 was a Saturday
        assert_eq!(wc(2016, 8, 6, 17, 4, 0).weekday, 6);
        // 2016-08-07 was a Sunday
        assert_eq!(wc(2016, 8, 7, 0, 0, 0).weekday, 7);
        // 2016-08-08 was a Monday
        assert_eq!(wc(2016, 8, 8, 0, 0, 0).weekday, 1);
    }

    #[test]
    fn epoch_constant_matches_calendar() {
        assert_eq!(wc(2000, 1, 1, 0, 0, 0), WallClock::EPOCH);
    }

    // ── next_second ───────────────────────────────────────────────────────────

    #[test]
    fn next_second_within_minute() {
        let t = wc(2016, 8, 6, 17, 4, 0);
        assert_eq!(t.next_second().unwrap(), wc(2016, 8, 6, 17, 4, 1));
    }

    #[test]
    fn next_second_rolls_over_minute_and_hour() {
        assert_eq!(
            wc(2016, 8, 6, 17, 4, 59).next_second().unwrap(),
            wc(2016, 8, 6, 17, 5, 0)
        );
        assert_eq!(
            wc(2016, 8, 6, 17, 59, 59).next_second().unwrap(),
            wc(2016, 8, 6, 18, 0, 0)
        );
    }

    #[test]
    fn next_second_rolls_over_day_and_updates_weekday() {
        let next = wc(2016, 8, 6, 23, 59, 59).next_second().unwrap();
        assert_eq!(next, wc(2016, 8, 7, 0, 0, 0));
        assert_eq!(next.weekday, 7);
    }

    #[test]
    fn next_second_rolls_over_month_and_year() {
        assert_eq!(
            wc(2016, 8, 31, 23, 59, 59).next_second().unwrap(),
            wc(2016, 9, 1, 0, 0, 0)
        );
        assert_eq!(
            wc(2016, 12, 31, 23, 59, 59).next_second().unwrap(),
            wc(2017, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn next_second_honours_leap_years() {
        assert_eq!(
            wc(2024, 2, 28, 23, 59, 59).next_second().unwrap(),
            wc(2024, 2, 29, 0, 0, 0)
        );
        assert_eq!(
            wc(2023, 2, 28, 23, 59, 59).next_second().unwrap(),
            wc(2023, 3, 1, 0, 0, 0)
        );
    }

    #[test]
    fn next_second_rejects_impossible_dates() {
        let bogus = WallClock {
            month: 2,
            day: 30,
            ..WallClock::EPOCH
        };
        assert!(bogus.next_second().is_none());
    }

    // ── ManualClock ───────────────────────────────────────────────────────────

    #[test]
    fn manual_clock_clones_share_state() {
        let a = ManualClock::new(wc(2016, 8, 6, 17, 4, 0), SyncState::Synced);
        let b = a.clone();
        a.advance(61);
        assert_eq!(b.snapshot().clock, wc(2016, 8, 6, 17, 5, 1));

        b.set_state(SyncState::StaleSync);
        assert_eq!(a.snapshot().state, SyncState::StaleSync);
    }

    #[test]
    fn unset_manual_clock_reports_unset() {
        assert_eq!(ManualClock::unset().snapshot().state, SyncState::Unset);
    }

    #[test]
    fn system_clock_reports_configured_state() {
        let snap = SystemClock::new(SyncState::StaleSync).snapshot();
        assert_eq!(snap.state, SyncState::StaleSync);
        assert!(snap.clock.year >= 2000);
        assert!((1..=7).contains(&snap.clock.weekday));
    }
}
