pub mod bmp280;
pub mod config;
pub mod display;
pub mod history;
pub mod paths;
pub mod report;
pub mod sensor;
pub mod station;
pub mod types;

pub use config::{HardwareConfig, NetworkConfig, ReportConfig, SamplingConfig, StationConfig};
pub use display::{draw_frame, DisplayFrame, DisplayLine, TextSize};
pub use history::{RollingBuffer, SeriesLists, WeatherHistory, HISTORY_CAPACITY};
pub use paths::*;
pub use report::{load_template, ReportError, ReportTemplate};
pub use sensor::{ClimateSensor, PressureSensor, SensorError};
pub use station::{sample, summary, LinkAction, LinkWatch, SamplingSchedule};
pub use types::{ClimateReading, CycleOutcome, Quantity};
