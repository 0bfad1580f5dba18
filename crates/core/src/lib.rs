//! Building blocks shared by the Raspberry Pi control programs: sensor and
//! actuator capabilities, smoothing, threshold classification, and the timed
//! actuation sequencer.

pub mod adc;
pub mod classify;
pub mod climate;
pub mod config;
pub mod relay;
pub mod sensor;
pub mod sequencer;
pub mod shutdown;
pub mod sim;
pub mod smoothing;
pub mod status;
pub mod timer;

pub use classify::{Band, Thresholds};
pub use relay::{Actuator, SimulatedRelay, WateringFlag};
pub use sensor::{Sample, SensorSource};
pub use sequencer::{Cycle, Phase, Sequencer, Status};
pub use shutdown::Shutdown;
pub use smoothing::Smoother;
pub use status::{StatusBoard, StatusReader};
