//! MCP3008 10-bit, 8-channel ADC over SPI.
//!
//! Single-ended reads only.  Each conversion is one 3-byte full-duplex
//! transfer: start bit, then `SGL/DIFF=1` plus the channel number in the
//! high nibble of the second byte; the 10-bit result comes back in the low
//! two bits of byte 1 and all of byte 2.
//!
//! Frame building and decoding are plain functions so they can be tested
//! off the Pi; the driver itself needs the `adc` feature.

#[cfg(feature = "adc")]
use anyhow::Context;
#[cfg(feature = "adc")]
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

#[cfg(feature = "adc")]
use crate::sensor::{Sample, SensorSource};

/// Highest single-ended channel index.
pub const MAX_CHANNEL: u8 = 7;

/// Full-scale reading (10 bits).
pub const FULL_SCALE: u16 = 1023;

/// SPI clock.  The part is good for 1.35 MHz at 2.7 V.
#[cfg(feature = "adc")]
const SPI_CLOCK_HZ: u32 = 1_350_000;

const START_BIT: u8 = 0x01;
const SINGLE_ENDED: u8 = 0x08;

/// Build the transmit frame for a single-ended read on `channel`.
pub fn command_for_channel(channel: u8) -> [u8; 3] {
    [START_BIT, (SINGLE_ENDED | (channel & MAX_CHANNEL)) << 4, 0x00]
}

/// Extract the 10-bit conversion result from a received frame.
pub fn decode(rx: [u8; 3]) -> u16 {
    (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2])
}

/// Map a raw conversion onto 0–100.
pub fn to_percent(raw: u16) -> f64 {
    f64::from(raw.min(FULL_SCALE)) / 10.23
}

// ---------------------------------------------------------------------------
// Driver (requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------

#[cfg(feature = "adc")]
pub struct Mcp3008 {
    spi: Spi,
}

#[cfg(feature = "adc")]
impl Mcp3008 {
    /// Open SPI0 with chip-select CE0.
    pub fn new() -> anyhow::Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)
            .context("failed to open SPI0/CE0 for MCP3008")?;
        tracing::info!(clock_hz = SPI_CLOCK_HZ, "mcp3008 initialised");
        Ok(Self { spi })
    }

    pub fn read_raw(&mut self, channel: u8) -> anyhow::Result<u16> {
        anyhow::ensure!(
            channel <= MAX_CHANNEL,
            "MCP3008 channel {channel} out of range (0–{MAX_CHANNEL})"
        );
        let tx = command_for_channel(channel);
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .with_context(|| format!("spi transfer failed on channel {channel}"))?;
        Ok(decode(rx))
    }
}

#[cfg(feature = "adc")]
impl SensorSource for Mcp3008 {
    fn read(&mut self, channel: u8) -> anyhow::Result<Sample> {
        let raw = self.read_raw(channel)?;
        Ok(Sample {
            raw: i32::from(raw),
            value: to_percent(raw),
        })
    }

    fn name(&self) -> &'static str {
        "mcp3008"
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
