//! Second-synchronous telegram scheduler.
//!
//! [`TelegramScheduler`] owns the cadence of the output line.  Once per
//! second-boundary edge it snapshots the time source, waits until the
//! configured offset into the second has been reached, and transmits the
//! telegram for the *following* second, so the frame ends as the second it
//! announces begins at the receiver.
//!
//! ```text
//!  edge n                       edge n+1
//!    │◄──────── offset ────────►│
//!    │  snapshot t              ├─ "OAL…(t+1)\r" on the wire ─┤
//!    ▼                          ▼                              ▼
//! ───┼──────────────────────────┼──────────────────────────────┼──►
//! ```
//!
//! # Timing model
//!
//! | Step | Mechanism |
//! |---|---|
//! | Start-up alignment | poll the time source every 1 ms until its second changes (once) |
//! | Wait for edge | [`EdgeReceiver::wait`], no timeout unless a watchdog is set |
//! | Offset delay | `sleep_until(edge_tick + offset)` on the edge's own monotonic clock |
//!
//! The delay is an absolute deadline derived from the edge timestamp, never a
//! relative sleep, so scheduling latency in one second does not carry into
//! the next.
//!
//! # Example
//! ```rust,ignore
//! let clock = MonotonicClock::new();
//! let (notifier, edges) = edge_channel(clock);
//! SystemPps::spawn(notifier);
//! let scheduler = TelegramScheduler::new(source, sink, edges, clock, offset);
//! scheduler.run().await;
//! ```

pub mod sink;

pub use sink::{TelegramSink, WriterSink};

use std::ops::RangeInclusive;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::TransmitOffset;
use crate::signal::{Edge, EdgeReceiver, MonotonicClock, Tick, TICKS_PER_SECOND};
use crate::telegram::Telegram;
use crate::time::{SyncState, TimeSnapshot, TimeSource};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Maximum tolerated deviation of the transmit instant, and of the edge
/// period, before a warning is logged.
pub const JITTER_BUDGET_MS: Tick = 50;

/// Sampling period of the start-up alignment poll.
const ALIGN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Give up waiting for the time source to advance after this long.
const ALIGN_TIMEOUT: Duration = Duration::from_secs(2);

/// Years the telegram's two-digit year field can represent.
const ENCODABLE_YEARS: RangeInclusive<u16> = 2000..=2099;

// ── TelegramScheduler ─────────────────────────────────────────────────────────

/// The per-line telegram worker.
///
/// One instance drives one output line.  It holds its own reference tick,
/// offset, time source and sink; nothing is global.
pub struct TelegramScheduler<S, K> {
    source: S,
    sink: K,
    edges: EdgeReceiver,
    clock: MonotonicClock,
    offset: TransmitOffset,
    watchdog: Option<Duration>,

    /// Tick recorded at start-up alignment.
    reference: Option<Tick>,
    /// Tick of the previous edge, for period monitoring.
    last_edge: Option<Tick>,
}

impl<S: TimeSource, K: TelegramSink> TelegramScheduler<S, K> {
    pub fn new(
        source: S,
        sink: K,
        edges: EdgeReceiver,
        clock: MonotonicClock,
        offset: TransmitOffset,
    ) -> Self {
        Self {
            source,
            sink,
            edges,
            clock,
            offset,
            watchdog: None,
            reference: None,
            last_edge: None,
        }
    }

    /// Log a warning whenever no edge has arrived for `timeout`.
    ///
    /// The scheduler keeps waiting afterwards; nothing is transmitted without
    /// an edge.
    pub fn with_watchdog(mut self, timeout: Duration) -> Self {
        self.watchdog = Some(timeout);
        self
    }

    pub fn reference_tick(&self) -> Option<Tick> {
        self.reference
    }

    // ── Public entry points ───────────────────────────────────────────────────

    /// Align to the time source, then serve edges for the rest of the
    /// process lifetime.
    pub async fn run(mut self) {
        let reference = self.align().await;
        info!(
            reference_tick = reference,
            offset_ms = self.offset.as_millis(),
            watchdog = ?self.watchdog,
            "Telegram scheduler aligned, waiting for second-boundary edges"
        );

        loop {
            let edge = self.next_edge().await;
            self.on_edge(edge).await;
        }
    }

    /// Busy-poll the time source until its second value changes and record
    /// the monotonic reference tick at that point.
    ///
    /// Only meant to run once, at start-up.  Edges posted before alignment
    /// completes predate the reference and are discarded.
    pub async fn align(&mut self) -> Tick {
        let initial = self.source.snapshot().clock.second;
        let give_up = Instant::now() + ALIGN_TIMEOUT;

        loop {
            tokio::time::sleep(ALIGN_POLL_INTERVAL).await;
            if self.source.snapshot().clock.second != initial {
                break;
            }
            if Instant::now() >= give_up {
                warn!(
                    timeout_ms = ALIGN_TIMEOUT.as_millis() as u64,
                    "Time source did not advance, aligning to current tick"
                );
                break;
            }
        }

        let reference = self.clock.ticks();
        self.reference = Some(reference);
        self.edges.discard_pending();
        debug!(reference_tick = reference, "Aligned to second boundary");
        reference
    }

    /// Serve one edge: snapshot the time, wait for the offset instant, and
    /// transmit the telegram for the next second.
    ///
    /// Returns the telegram that was handed to the sink.  Sink errors are
    /// logged and otherwise ignored.
    pub async fn on_edge(&mut self, edge: Edge) -> Telegram {
        let snapshot = self.source.snapshot();
        self.check_edge(edge);

        let reference = *self.reference.get_or_insert(edge.tick);
        let wake = edge.tick.saturating_sub(reference);
        let due = reference + wake + self.offset.as_millis();
        tokio::time::sleep_until(self.clock.instant_at(due)).await;

        let telegram = telegram_for(&snapshot);
        let sent_at = self.clock.ticks();
        if let Err(e) = self.sink.transmit(&telegram).await {
            warn!(error = %e, telegram = %telegram, "Telegram write failed, frame dropped");
        }

        let late = sent_at.saturating_sub(due);
        if late > JITTER_BUDGET_MS {
            warn!(
                edge_tick = edge.tick,
                due_tick = due,
                late_ms = late,
                "Telegram transmitted outside the jitter budget"
            );
        }
        debug!(edge_tick = edge.tick, sent_tick = sent_at, telegram = %telegram, "Telegram sent");

        telegram
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    async fn next_edge(&mut self) -> Edge {
        let Some(limit) = self.watchdog else {
            return self.edges.wait().await;
        };
        loop {
            match tokio::time::timeout(limit, self.edges.wait()).await {
                Ok(edge) => return edge,
                Err(_) => warn!(
                    silent_ms = limit.as_millis() as u64,
                    "No second-boundary edge received, telegram output stalled"
                ),
            }
        }
    }

    fn check_edge(&mut self, edge: Edge) {
        if edge.coalesced > 0 {
            warn!(
                edge_tick = edge.tick,
                coalesced = edge.coalesced,
                "Edges arrived faster than they were served, older edges dropped"
            );
        }

        if let Some(prev) = self.last_edge {
            let period = edge.tick.saturating_sub(prev);
            let expected = TICKS_PER_SECOND * (edge.coalesced + 1);
            if period.abs_diff(expected) > JITTER_BUDGET_MS {
                warn!(
                    edge_tick = edge.tick,
                    period_ms = period,
                    expected_ms = expected,
                    "Irregular second-boundary period"
                );
            }
        }
        self.last_edge = Some(edge.tick);
    }
}

/// The telegram announcing the second after `snapshot`.
///
/// A snapshot that is unset, whose fields are not a real calendar instant,
/// or whose year the two-digit field cannot carry yields the "time invalid"
/// frame.
pub fn telegram_for(snapshot: &TimeSnapshot) -> Telegram {
    if snapshot.state == SyncState::Unset {
        return Telegram::format(&snapshot.clock, SyncState::Unset);
    }
    match snapshot.clock.next_second() {
        Some(next) if ENCODABLE_YEARS.contains(&next.year) => {
            Telegram::format(&next, snapshot.state)
        }
        Some(next) => {
            warn!(clock = %next, "Time source is outside 2000-2099, sending invalid-time telegram");
            Telegram::format(&snapshot.clock, SyncState::Unset)
        }
        None => {
            warn!(clock = %snapshot.clock, "Time source returned an invalid date, sending invalid-time telegram");
            Telegram::format(&snapshot.clock, SyncState::Unset)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
