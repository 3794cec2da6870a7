use crate::sensor::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Pressure,
    Temperature,
    Humidity,
}

impl Quantity {
    pub const ALL: [Quantity; 3] = [Self::Pressure, Self::Temperature, Self::Humidity];

    pub fn labels_token(self) -> &'static str {
        match self {
            Self::Pressure => "%PRESSURE_LABELS%",
            Self::Temperature => "%TEMPERATURE_LABELS%",
            Self::Humidity => "%HUMIDITY_LABELS%",
        }
    }

    pub fn data_token(self) -> &'static str {
        match self {
            Self::Pressure => "%PRESSURE_DATA%",
            Self::Temperature => "%TEMPERATURE_DATA%",
            Self::Humidity => "%HUMIDITY_DATA%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub pressure_pa: Result<f32, SensorError>,
    pub climate: Result<ClimateReading, SensorError>,
}

impl CycleOutcome {
    pub fn is_complete(&self) -> bool {
        self.pressure_pa.is_ok() && self.climate.is_ok()
    }

    pub fn errors(&self) -> impl Iterator<Item = &SensorError> {
        self.pressure_pa
            .as_ref()
            .err()
            .into_iter()
            .chain(self.climate.as_ref().err())
    }
}
