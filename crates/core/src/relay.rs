//! Relay output driving the valve.  The `gpio` feature gates the real rppal
//! driver; the simulated relay keeps state in memory and logs changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

/// Something that can be switched on and off.
///
/// A failed `set` means the hardware is no longer under control; callers
/// treat it as fatal.
pub trait Actuator: Send {
    fn set(&mut self, on: bool) -> Result<()>;
    fn is_on(&self) -> bool;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn set(&mut self, on: bool) -> Result<()> {
        (**self).set(on)
    }

    fn is_on(&self) -> bool {
        (**self).is_on()
    }
}

fn label(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

// ---------------------------------------------------------------------------
// Real GPIO relay (requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
pub struct GpioRelay {
    pin: OutputPin,
    active_low: bool, // many relay boards are active-low
    on: bool,
}

#[cfg(feature = "gpio")]
impl GpioRelay {
    pub fn new(bcm_pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new()?;
        let pin = gpio.get(bcm_pin)?.into_output();
        let mut relay = Self {
            pin,
            active_low,
            on: true,
        };
        // Fail-safe: OFF at startup.
        relay.set(false)?;
        tracing::info!(pin = bcm_pin, active_low, "gpio relay initialised");
        Ok(relay)
    }
}

#[cfg(feature = "gpio")]
impl Actuator for GpioRelay {
    fn set(&mut self, on: bool) -> Result<()> {
        // active-low: LOW = ON, HIGH = OFF
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.on = on;
        tracing::info!(relay = label(on), "relay switched");
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

// ---------------------------------------------------------------------------
// Simulated relay (development, no hardware)
// ---------------------------------------------------------------------------

/// Shared "water is flowing" flag read by the humidity simulator.
pub type WateringFlag = Arc<AtomicBool>;

#[derive(Default)]
pub struct SimulatedRelay {
    on: bool,
    watering: Option<WateringFlag>,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror the relay state into `flag` so a simulator can react to it.
    pub fn with_watering_flag(flag: WateringFlag) -> Self {
        Self {
            on: false,
            watering: Some(flag),
        }
    }
}

impl Actuator for SimulatedRelay {
    fn set(&mut self, on: bool) -> Result<()> {
        self.on = on;
        if let Some(flag) = &self.watering {
            flag.store(on, Ordering::Relaxed);
        }
        tracing::info!(relay = label(on), "[sim] relay switched");
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

/// Open the GPIO relay on `bcm_pin`.  Fails when built without the `gpio`
/// feature or when the pin cannot be claimed.
pub fn open_gpio(bcm_pin: u8, active_low: bool) -> Result<Box<dyn Actuator>> {
    #[cfg(feature = "gpio")]
    {
        Ok(Box::new(GpioRelay::new(bcm_pin, active_low)?))
    }
    #[cfg(not(feature = "gpio"))]
    {
        let _ = (bcm_pin, active_low);
        anyhow::bail!("built without the `gpio` feature")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
