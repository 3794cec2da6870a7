use std::time::{Duration, Instant};

use crate::{
    config::SamplingConfig,
    sensor::{ClimateSensor, PressureSensor},
    types::CycleOutcome,
};

pub fn sample<P, C>(pressure: &mut P, climate: &mut C) -> CycleOutcome
where
    P: PressureSensor + ?Sized,
    C: ClimateSensor + ?Sized,
{
    CycleOutcome {
        pressure_pa: pressure.read_pressure_pa(),
        climate: climate.read_climate(),
    }
}

pub fn summary(outcome: &CycleOutcome) -> String {
    let pressure = match &outcome.pressure_pa {
        Ok(pa) => format!("{:.0}hPa", pa / 100.0),
        Err(err) => format!("pressure error ({err})"),
    };
    let climate = match &outcome.climate {
        Ok(reading) => format!(
            "{:.1}C, {:.1}%",
            reading.temperature_c, reading.humidity_pct
        ),
        Err(err) => format!("climate error ({err})"),
    };
    format!("{pressure}, {climate}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingSchedule {
    interval: Duration,
}

impl SamplingSchedule {
    pub fn from_config(config: &SamplingConfig) -> Self {
        let mut config = config.clone();
        config.sanitize();
        Self {
            interval: Duration::from_millis(config.interval_ms),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    // Whole-second slices so the caller can feed the watchdog between them.
    pub fn slices(&self) -> impl Iterator<Item = Duration> {
        let total_ms = self.interval.as_millis() as u64;
        let whole = total_ms / 1_000;
        let rest = total_ms % 1_000;
        (0..whole)
            .map(|_| Duration::from_secs(1))
            .chain((rest > 0).then(|| Duration::from_millis(rest)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Connected,
    Waiting,
    Reconnect,
}

// Tracks how long the network link has been down. Asks for a reconnect once
// per `retry_after` while it stays down; it never gives up on the link.
#[derive(Debug, Clone)]
pub struct LinkWatch {
    retry_after: Duration,
    down_since: Option<Instant>,
}

impl LinkWatch {
    pub fn new(retry_after: Duration) -> Self {
        Self {
            retry_after,
            down_since: None,
        }
    }

    pub fn observe(&mut self, connected: bool, now: Instant) -> LinkAction {
        if connected {
            self.down_since = None;
            return LinkAction::Connected;
        }

        match self.down_since {
            Some(since) if now.saturating_duration_since(since) >= self.retry_after => {
                self.down_since = Some(now);
                LinkAction::Reconnect
            }
            Some(_) => LinkAction::Waiting,
            None => {
                self.down_since = Some(now);
                LinkAction::Waiting
            }
        }
    }
}
