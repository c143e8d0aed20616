//! Generator configuration loading and validation.
//!
//! The expected YAML structure is (every key optional):
//! ```yaml
//! telegram:
//!   offset_ms: 982
//! output:
//!   device: /dev/ttyUSB0
//! clock:
//!   sync_state: synced
//! watchdog_ms: 3000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::telegram::TELEGRAM_LEN;
use crate::time::SyncState;

// ── Serial line ───────────────────────────────────────────────────────────────

/// Parity bit setting of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Character framing of the telegram output line.
///
/// The generator does not program the UART; these values describe what the
/// device must be set to and are used to compute transmission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialLine {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl SerialLine {
    /// 9600 bit/s, 7 data bits, even parity, 1 stop bit, no flow control.
    pub const IF482: SerialLine = SerialLine {
        baud_rate: 9_600,
        data_bits: 7,
        parity: Parity::Even,
        stop_bits: 1,
    };

    /// Bit times per character, start bit included.
    pub fn bits_per_char(&self) -> u32 {
        let parity = match self.parity {
            Parity::None => 0,
            Parity::Even | Parity::Odd => 1,
        };
        1 + u32::from(self.data_bits) + parity + u32::from(self.stop_bits)
    }

    /// Time on the wire for `bytes` back-to-back characters.
    pub fn transmission_time(&self, bytes: usize) -> Duration {
        let bits = bytes as u64 * u64::from(self.bits_per_char());
        Duration::from_micros(bits * 1_000_000 / u64::from(self.baud_rate))
    }
}

impl std::fmt::Display for SerialLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate, self.data_bits, parity, self.stop_bits
        )
    }
}

// ── TransmitOffset ────────────────────────────────────────────────────────────

/// Delay from a second-boundary edge to the start of telegram transmission.
///
/// Always satisfies `offset + transmission_time(17 bytes) < 1 s`, so the
/// telegram is completely on the wire before the next edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitOffset {
    millis: u64,
}

impl TransmitOffset {
    /// Validate `millis` against the telegram's time on `line`.
    pub fn new(millis: u64, line: &SerialLine) -> Result<Self, ConfigError> {
        let max_ms = Self::max_for(line);
        if millis > max_ms {
            return Err(ConfigError::OffsetOutOfRange {
                offset_ms: millis,
                max_ms,
            });
        }
        Ok(Self { millis })
    }

    /// Largest offset whose telegram still ends before the next second.
    ///
    /// 982 ms for [`SerialLine::IF482`] (17 × 10 bits at 9600 bit/s = 17.7 ms).
    pub fn max_for(line: &SerialLine) -> u64 {
        let on_wire_us = line.transmission_time(TELEGRAM_LEN).as_micros() as u64;
        // strictly below 1 s − on_wire
        1_000_000_u64.saturating_sub(on_wire_us).saturating_sub(1) / 1_000
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

/// Validation failures for an otherwise well-formed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "transmit offset {offset_ms}ms leaves no room for the telegram before the next second (max {max_ms}ms)"
    )]
    OffsetOutOfRange { offset_ms: u64, max_ms: u64 },

    #[error("watchdog timeout must be at least one second, got {ms}ms")]
    WatchdogTooShort { ms: u64 },
}

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    telegram: TelegramSection,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    clock: ClockSection,
    watchdog_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TelegramSection {
    offset_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputSection {
    device: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClockSection {
    #[serde(default)]
    sync_state: SyncState,
}

// ── GeneratorConfig ───────────────────────────────────────────────────────────

/// Everything the generator needs at start-up.  Fixed for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Transmit offset in milliseconds (validated by [`Self::offset`]).
    pub offset_ms: u64,
    /// Serial device node to write telegrams to; `None` writes to stdout.
    pub device: Option<PathBuf>,
    /// Sync state reported for the host clock.
    pub sync_state: SyncState,
    /// Warn when no edge arrives for this long; `None` waits silently forever.
    pub watchdog_ms: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            offset_ms: TransmitOffset::max_for(&SerialLine::IF482),
            device: None,
            sync_state: SyncState::Synced,
            watchdog_ms: None,
        }
    }
}

impl GeneratorConfig {
    /// Parse `path`.  Keys missing from the file keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid YAML for
    /// this schema.  Value ranges are checked separately by
    /// [`offset`](Self::offset) and [`watchdog`](Self::watchdog).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading generator configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        // An empty document deserialises as unit, not as an empty map.
        let file: ConfigFile = if content.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?
        };

        let defaults = Self::default();
        let cfg = Self {
            offset_ms: file.telegram.offset_ms.unwrap_or(defaults.offset_ms),
            device: file.output.device,
            sync_state: file.clock.sync_state,
            watchdog_ms: file.watchdog_ms,
        };

        debug!(
            offset_ms = cfg.offset_ms,
            device = ?cfg.device,
            sync_state = ?cfg.sync_state,
            watchdog_ms = ?cfg.watchdog_ms,
            "Parsed configuration"
        );
        Ok(cfg)
    }

    /// The validated transmit offset for the IF482 line.
    pub fn offset(&self) -> Result<TransmitOffset, ConfigError> {
        TransmitOffset::new(self.offset_ms, &SerialLine::IF482)
    }

    /// The validated watchdog timeout, if one is configured.
    pub fn watchdog(&self) -> Result<Option<Duration>, ConfigError> {
        match self.watchdog_ms {
            None => Ok(None),
            Some(ms) if ms < 1_000 => Err(ConfigError::WatchdogTooShort { ms }),
            Some(ms) => Ok(Some(Duration::from_millis(ms))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
