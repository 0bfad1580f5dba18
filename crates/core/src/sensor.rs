//! Sensor capability: anything that can produce a reading for a channel.

/// One reading from a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Device-native value (e.g. 0–1023 for a 10-bit ADC).
    pub raw: i32,
    /// Normalised to 0–100.
    pub value: f64,
}

pub trait SensorSource: Send {
    /// Read `channel`.  Errors are transient from the caller's point of
    /// view: it keeps its last value and tries again next tick.
    fn read(&mut self, channel: u8) -> anyhow::Result<Sample>;

    /// Air temperature in °C, for sources that carry a thermometer.
    fn temperature(&mut self) -> anyhow::Result<Option<f64>> {
        Ok(None)
    }

    /// Short label for logs and status output.
    fn name(&self) -> &'static str;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read(&mut self, channel: u8) -> anyhow::Result<Sample> {
        (**self).read(channel)
    }

    fn temperature(&mut self) -> anyhow::Result<Option<f64>> {
        (**self).temperature()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Open the MCP3008 on SPI0.  Fails when built without the `adc` feature or
/// when the bus cannot be opened; callers fall back to a simulator.
pub fn open_adc() -> anyhow::Result<Box<dyn SensorSource>> {
    #[cfg(feature = "adc")]
    {
        Ok(Box::new(crate::adc::Mcp3008::new()?))
    }
    #[cfg(not(feature = "adc"))]
    {
        anyhow::bail!("built without the `adc` feature")
    }
}
