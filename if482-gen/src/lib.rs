/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! IF482 time-telegram generator.
//!
//! Turns a wall-clock time source into one 17-byte IF482 telegram per
//! second, emitted at a fixed offset after each second-boundary edge so a
//! downstream clock can resynchronise to it.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── time        – WallClock / SyncState and the TimeSource seam
//! ├── telegram    – 17-byte frame encoding (and decoding for receivers)
//! ├── signal      – monotonic ticks, single-slot edge handoff, software PPS
//! ├── scheduler/  – alignment, drift-free offset delay, output sink
//! └── config/     – YAML configuration, serial line framing, offset bounds
//! ```

pub mod config;
pub mod scheduler;
pub mod signal;
pub mod telegram;
pub mod time;
