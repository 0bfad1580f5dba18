//! Simulated tank for running off the Pi.
//!
//! The probes are stacked bottom (channel 0) to top.  The tank holds a
//! column of water with a layer of oil floating on it; both boundaries drift
//! slowly, so channels change material from time to time.  Readings are the
//! nominal value of the material around the probe plus noise.

use rpi_control::sim::{as_sample, gaussian};
use rpi_control::{Sample, SensorSource};

const IN_WATER: f64 = 75.0;
const IN_OIL: f64 = 35.0;
const IN_AIR: f64 = 8.0;
const NOISE_SIGMA: f64 = 3.0;

pub struct TankSim {
    probes: u8,
    /// Height of the water surface, in probe spacings from the bottom.
    water_level: f64,
    oil_thickness: f64,
    drift_sigma: f64,
}

impl TankSim {
    pub fn new(probes: u8) -> Self {
        let probes = probes.max(1);
        Self {
            probes,
            water_level: f64::from(probes) * (0.3 + 0.3 * fastrand::f64()),
            oil_thickness: 1.5 + fastrand::f64(),
            drift_sigma: 0.02,
        }
    }

    /// Nominal reading for a probe at `channel`, noise-free.
    pub fn nominal(&self, channel: u8) -> f64 {
        let height = f64::from(channel) + 0.5;
        if height < self.water_level {
            IN_WATER
        } else if height < self.water_level + self.oil_thickness {
            IN_OIL
        } else {
            IN_AIR
        }
    }

    fn drift(&mut self) {
        let top = f64::from(self.probes);
        self.water_level = (self.water_level + gaussian(0.0, self.drift_sigma)).clamp(0.0, top);
        self.oil_thickness =
            (self.oil_thickness + gaussian(0.0, self.drift_sigma / 2.0)).clamp(0.5, 3.0);
    }
}

impl SensorSource for TankSim {
    fn read(&mut self, channel: u8) -> anyhow::Result<Sample> {
        anyhow::ensure!(
            channel < self.probes,
            "tank has {} probes, no channel {channel}",
            self.probes
        );
        // Drift once per sweep.
        if channel == 0 {
            self.drift();
        }
        Ok(as_sample(self.nominal(channel) + gaussian(0.0, NOISE_SIGMA)))
    }

    fn name(&self) -> &'static str {
        "tank-sim"
    }
}
