/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Second-boundary edge delivery.
//!
//! A one-pulse-per-second source (an RTC square-wave pin on hardware, or
//! [`SystemPps`] on a host) captures a monotonic [`Tick`] at each edge and
//! hands it to the scheduler through a single-slot handoff:
//!
//! ```text
//! edge ──► EdgeNotifier::signal()        EdgeReceiver::wait() ──► scheduler
//!            │ (count+1, tick) stored       ▲
//!            │ as one atomic word           │ count changed?
//!            └ notify_one() ────────────────┘
//! ```
//!
//! Only the most recent edge matters.  An edge that arrives while the
//! previous one is still unread overwrites it, and the receiver is told how
//! many were coalesced.  The producer side never awaits, allocates, or
//! formats anything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Monotonic time in milliseconds since a [`MonotonicClock`]'s origin.
pub type Tick = u64;

pub const TICKS_PER_SECOND: Tick = 1_000;

// ── MonotonicClock ────────────────────────────────────────────────────────────

/// Millisecond tick counter shared by the edge producer and the scheduler.
///
/// Built on `tokio::time::Instant`, so it follows the paused test clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn ticks(&self) -> Tick {
        self.origin.elapsed().as_millis() as Tick
    }

    /// The instant corresponding to `tick`, for absolute-deadline sleeps.
    pub fn instant_at(&self, tick: Tick) -> Instant {
        self.origin + Duration::from_millis(tick)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

// ── Edge handoff ──────────────────────────────────────────────────────────────

/// One observed second boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Tick captured at the edge.
    pub tick: Tick,
    /// Edges overwritten before this one was read.
    pub coalesced: u64,
}

/// Low bits of the slot word hold the tick, high bits the edge count.
const TICK_BITS: u32 = 48;
const TICK_MASK: u64 = (1 << TICK_BITS) - 1;
const COUNT_MASK: u64 = (1 << (64 - TICK_BITS)) - 1;

fn pack(count: u64, tick: Tick) -> u64 {
    ((count & COUNT_MASK) << TICK_BITS) | (tick & TICK_MASK)
}

fn unpack(word: u64) -> (u64, Tick) {
    (word >> TICK_BITS, word & TICK_MASK)
}

#[derive(Debug)]
struct EdgeSlot {
    /// Edge count and latest tick, updated together so a reader never pairs
    /// one edge's count with another edge's tick.
    word: AtomicU64,
    notify: Notify,
}

/// Create a connected producer/consumer pair.
pub fn edge_channel(clock: MonotonicClock) -> (EdgeNotifier, EdgeReceiver) {
    let slot = Arc::new(EdgeSlot {
        word: AtomicU64::new(0),
        notify: Notify::new(),
    });
    (
        EdgeNotifier {
            slot: Arc::clone(&slot),
            clock,
        },
        EdgeReceiver { slot, seen: 0 },
    )
}

/// Producer half, owned by whatever observes the physical edge.
#[derive(Debug)]
pub struct EdgeNotifier {
    slot: Arc<EdgeSlot>,
    clock: MonotonicClock,
}

impl EdgeNotifier {
    /// Capture the current tick and post it.
    pub fn signal(&self) {
        self.signal_at(self.clock.ticks());
    }

    /// Post an edge captured at `tick`.
    pub fn signal_at(&self, tick: Tick) {
        // The closure always returns Some, so the update cannot fail.
        let _ = self
            .slot
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (count, _) = unpack(word);
                Some(pack(count + 1, tick))
            });
        self.slot.notify.notify_one();
    }
}

/// Consumer half, owned by the scheduler.  Not `Clone`: there is exactly one
/// consumer.
#[derive(Debug)]
pub struct EdgeReceiver {
    slot: Arc<EdgeSlot>,
    seen: u64,
}

impl EdgeReceiver {
    /// Suspend until an edge newer than the last one returned is posted.
    ///
    /// Cancel-safe: dropping the future loses nothing.
    pub async fn wait(&mut self) -> Edge {
        loop {
            if let Some(edge) = self.take() {
                return edge;
            }
            // notify_one() stores a permit when nobody is waiting, so an edge
            // posted between take() and here still wakes us.
            self.slot.notify.notified().await;
        }
    }

    /// Forget any edge posted so far.
    pub fn discard_pending(&mut self) {
        self.seen = unpack(self.slot.word.load(Ordering::Acquire)).0;
    }

    fn take(&mut self) -> Option<Edge> {
        let (count, tick) = unpack(self.slot.word.load(Ordering::Acquire));
        if count == self.seen {
            return None;
        }
        let coalesced = count.wrapping_sub(self.seen).wrapping_sub(1) & COUNT_MASK;
        self.seen = count;
        Some(Edge { tick, coalesced })
    }
}

// ── SystemPps ─────────────────────────────────────────────────────────────────

/// Software pulse-per-second source for hosts without a PPS input.
///
/// Sleeps to every whole second of the host's local clock and signals an
/// edge.  Each sleep is computed afresh from the wall clock, so the pulse
/// follows clock steps instead of accumulating timer drift.
pub struct SystemPps;

impl SystemPps {
    pub fn spawn(notifier: EdgeNotifier) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("software PPS started (host clock second boundaries)");
            loop {
                tokio::time::sleep(until_next_second()).await;
                notifier.signal();
                debug!("PPS edge");
            }
        })
    }
}

fn until_next_second() -> Duration {
    // nanosecond() exceeds 999_999_999 during a leap second
    let nanos = u64::from(Local::now().nanosecond()).min(999_999_999);
    Duration::from_nanos(1_000_000_000 - nanos)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
