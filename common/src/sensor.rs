use thiserror::Error;

use crate::types::ClimateReading;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("{sensor}: bus error ({details})")]
    Bus {
        sensor: &'static str,
        details: String,
    },
    #[error("{sensor}: not ready")]
    NotReady { sensor: &'static str },
    #[error("{sensor}: invalid reading {value}")]
    InvalidReading { sensor: &'static str, value: f32 },
    #[error("{sensor}: unsupported chip")]
    UnknownDevice { sensor: &'static str },
    #[error("{sensor}: {details}")]
    Device {
        sensor: &'static str,
        details: String,
    },
}

impl SensorError {
    pub fn sensor(&self) -> &'static str {
        match self {
            Self::Bus { sensor, .. }
            | Self::NotReady { sensor }
            | Self::InvalidReading { sensor, .. }
            | Self::UnknownDevice { sensor }
            | Self::Device { sensor, .. } => sensor,
        }
    }
}

pub trait PressureSensor {
    fn read_pressure_pa(&mut self) -> Result<f32, SensorError>;
}

pub trait ClimateSensor {
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError>;
}

impl<T: PressureSensor + ?Sized> PressureSensor for &mut T {
    fn read_pressure_pa(&mut self) -> Result<f32, SensorError> {
        (**self).read_pressure_pa()
    }
}

impl<T: ClimateSensor + ?Sized> ClimateSensor for &mut T {
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError> {
        (**self).read_climate()
    }
}

pub fn finite(sensor: &'static str, value: f32) -> Result<f32, SensorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::InvalidReading { sensor, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_names_the_sensor() {
        let err = SensorError::Bus {
            sensor: "SHT4x",
            details: "nack".to_string(),
        };
        assert_eq!(err.to_string(), "SHT4x: bus error (nack)");
        assert_eq!(err.sensor(), "SHT4x");

        let err = SensorError::UnknownDevice { sensor: "BMP280" };
        assert_eq!(err.to_string(), "BMP280: unsupported chip");
    }

    #[test]
    fn non_finite_values_are_rejected() {
        assert_eq!(finite("BMP280", 101_325.0), Ok(101_325.0));
        assert!(matches!(
            finite("BMP280", f32::NAN),
            Err(SensorError::InvalidReading { sensor: "BMP280", .. })
        ));
        assert!(finite("SHT4x", f32::INFINITY).is_err());
    }
}
